pub mod formatter;

pub use formatter::{
    format_json, format_order, format_result_table, format_validation_errors, format_value,
    should_use_colors, write_result,
};
