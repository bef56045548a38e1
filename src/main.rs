use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, warn};

use gym_score::config::{self, Config};
use gym_score::output;
use gym_score::scoring::{
    retain_declared_inputs, validate_schema, ExecutionMode, Schema, ScoringEngine,
    TrampolineTemplate, DEFAULT_ELEMENTS,
};

const EXIT_SUCCESS: i32 = 0;
const EXIT_SCORING: i32 = 1;
const EXIT_IO: i32 = 2;
const EXIT_SCHEMA: i32 = 4;

#[derive(Subcommand, Debug)]
enum Commands {
    /// Score one set of judge inputs against a schema
    Compute {
        /// Schema document (JSON or YAML)
        #[arg(short, long)]
        schema: PathBuf,

        /// Raw inputs document: field code -> value
        #[arg(short, long)]
        inputs: PathBuf,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,

        /// Also write the JSON result to this file
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Lint a schema and list every problem
    Validate {
        #[arg(short, long)]
        schema: PathBuf,
    },
    /// Print the order computed fields are evaluated in
    Order {
        #[arg(short, long)]
        schema: PathBuf,
    },
    /// Print the default trampoline schema
    Template {
        /// Execution judges
        #[arg(long, default_value_t = 3)]
        judges: usize,

        /// Judge scores that count (defaults to all judges)
        #[arg(long)]
        valid: Option<usize>,

        /// Selection criterion for execution scores
        #[arg(long, default_value = "totes")]
        criteria: String,

        /// Elements per routine
        #[arg(long, default_value_t = DEFAULT_ELEMENTS)]
        elements: usize,

        /// One execution score per judge instead of per-element deductions
        #[arg(long)]
        manual: bool,

        /// Print JSON instead of YAML
        #[arg(long)]
        json: bool,
    },
}

#[derive(Parser, Debug)]
#[command(name = "gym-score")]
#[command(about = "Schema-driven gymnastics and trampoline scoring", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to config file (defaults to ~/.config/gym-score/config.yaml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Load a schema document, mapping failures to exit codes.
fn load_schema(path: &Path) -> Result<Schema, i32> {
    let doc = config::load_document(path).map_err(|e| {
        eprintln!("Error: {:#}", e);
        EXIT_IO
    })?;
    Schema::from_json(doc).map_err(|e| {
        eprintln!("{}: {}", path.display(), e);
        EXIT_SCHEMA
    })
}

fn build_engine(path: &Path) -> Result<ScoringEngine, i32> {
    let schema = load_schema(path)?;
    ScoringEngine::new(schema).map_err(|e| {
        eprintln!("{}: {}", path.display(), e);
        EXIT_SCHEMA
    })
}

fn run_compute(
    schema: &Path,
    inputs: &Path,
    json: bool,
    out: Option<&Path>,
    settings: &Config,
    use_colors: bool,
) -> Result<(), i32> {
    let engine = build_engine(schema)?;
    let raw = config::load_inputs(inputs).map_err(|e| {
        eprintln!("Error: {:#}", e);
        EXIT_IO
    })?;

    let (raw, dropped) = retain_declared_inputs(engine.schema(), raw);
    for key in &dropped {
        warn!(key = %key, "input is not declared by the schema, ignoring");
    }

    let result = engine.compute(&raw).map_err(|e| {
        eprintln!("Scoring error: {}", e);
        EXIT_SCORING
    })?;

    if json {
        let text = output::format_json(&result).map_err(|e| {
            eprintln!("Error: {:#}", e);
            EXIT_IO
        })?;
        println!("{}", text);
    } else {
        println!(
            "{}",
            output::format_result_table(&result, engine.schema(), settings.precision, use_colors)
        );
    }

    if let Some(path) = out {
        output::write_result(path, &result).map_err(|e| {
            eprintln!("Error: {:#}", e);
            EXIT_IO
        })?;
        debug!(path = %path.display(), "result written");
    }
    Ok(())
}

fn run_validate(schema: &Path, use_colors: bool) -> Result<(), i32> {
    let schema_doc = load_schema(schema)?;
    match validate_schema(&schema_doc) {
        Ok(()) => {
            println!(
                "Schema OK: {} fields, {} computed",
                schema_doc.fields.len(),
                schema_doc.computed.len()
            );
            Ok(())
        }
        Err(errors) => {
            eprintln!("{}", output::format_validation_errors(&errors, use_colors));
            Err(EXIT_SCHEMA)
        }
    }
}

fn run_order(schema: &Path, use_colors: bool) -> Result<(), i32> {
    let engine = build_engine(schema)?;
    println!("{}", output::format_order(&engine.evaluation_order(), use_colors));
    Ok(())
}

fn run_template(template: TrampolineTemplate, json: bool) -> Result<(), i32> {
    let schema = template.build();
    let text = if json {
        serde_json::to_string_pretty(&schema).map_err(|e| e.to_string())
    } else {
        serde_saphyr::to_string(&schema).map_err(|e| e.to_string())
    };
    match text {
        Ok(text) => {
            println!("{}", text.trim_end());
            Ok(())
        }
        Err(e) => {
            eprintln!("Failed to serialize template: {}", e);
            Err(EXIT_IO)
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let start_time = Instant::now();

    // Load settings
    let config_path = cli.config.map(PathBuf::from);
    let settings = match config::load_config(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {:#}", e);
            std::process::exit(EXIT_IO);
        }
    };

    if let Err(e) = gym_score::telemetry::init(&settings.log_level, cli.verbose) {
        eprintln!("{}", e);
    }
    let use_colors = output::should_use_colors(settings.color);

    let outcome = match cli.command {
        Commands::Compute {
            schema,
            inputs,
            json,
            out,
        } => run_compute(&schema, &inputs, json, out.as_deref(), &settings, use_colors),
        Commands::Validate { schema } => run_validate(&schema, use_colors),
        Commands::Order { schema } => run_order(&schema, use_colors),
        Commands::Template {
            judges,
            valid,
            criteria,
            elements,
            manual,
            json,
        } => {
            let template = TrampolineTemplate {
                judges,
                valid: valid.unwrap_or(judges),
                criteria,
                elements,
                execution: Some(if manual {
                    ExecutionMode::Manual
                } else {
                    ExecutionMode::Elements
                }),
                ..Default::default()
            };
            run_template(template, json)
        }
    };

    debug!(elapsed = ?start_time.elapsed(), "done");

    match outcome {
        Ok(()) => std::process::exit(EXIT_SUCCESS),
        Err(code) => std::process::exit(code),
    }
}
