pub mod builtins;
pub mod config;
pub mod context;
pub mod deps;
pub mod engine;
pub mod error;
pub mod expr;
pub mod normalize;
pub mod reduce;
pub mod selection;
pub mod shape;
pub mod template;
pub mod trampoline;
pub mod validation;
pub mod value;

pub use builtins::Builtin;
pub use config::*;
pub use engine::{EngineResult, ScoringEngine};
pub use error::{ScoringError, ScoringResult};
pub use normalize::{crash_key, normalize_inputs, retain_declared_inputs, NormalizedInputs};
pub use selection::{median, Aggregator, Criterion};
pub use shape::Shape;
pub use template::{ExecutionMode, TrampolineTemplate};
pub use trampoline::execution_score;
pub use validation::validate_schema;
pub use value::{to_float, Value};
