//! Command-line front end for the notebook grader.
//!
//! ```bash
//! # Grade a notebook (key from GROQ_API_KEY or LLM_API_KEY)
//! notebook-grader evaluate homework.ipynb
//!
//! # Inspect what would be sent, without calling the model
//! notebook-grader context homework.ipynb --max-chars 4000
//!
//! # Print the evaluation JSON schema
//! notebook-grader schema
//! ```
//!
//! Exit codes: 0 success, 1 usage/config/IO error, 2 invalid notebook,
//! 3 generation failure, 4 model output failed validation.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use grading::{build_context, evaluation_schema, parse_notebook, ContextLimits, ParseLimits};
use notebook_grader::pipeline::{evaluate_with_report, PipelineLimits};
use notebook_grader::prompts::render_user_prompt;
use notebook_grader::telemetry::append_telemetry;
use notebook_grader::{GenerationClient, GeneratorConfig};
use tracing::info;

const FORMAT_EXIT_CODE: i32 = 2;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Grade a notebook and print the evaluation record as JSON
    Evaluate {
        /// Path to the .ipynb file
        path: PathBuf,

        /// Model name (overrides LLM_MODEL and the config file)
        #[arg(long)]
        model: Option<String>,

        /// Log every generation attempt
        #[arg(long, default_value_t = false)]
        debug: bool,

        /// TOML config file; environment variables still take precedence
        #[arg(long)]
        config: Option<PathBuf>,

        /// Append a JSON line describing the run to this file
        #[arg(long)]
        telemetry: Option<PathBuf>,

        #[command(flatten)]
        limits: LimitArgs,
    },

    /// Parse a notebook and print the context sent to the model (no network)
    Context {
        /// Path to the .ipynb file
        path: PathBuf,

        /// Print the full user prompt instead of the bare context
        #[arg(long, default_value_t = false)]
        prompt: bool,

        #[command(flatten)]
        limits: LimitArgs,
    },

    /// Print the JSON schema of the evaluation record
    Schema,
}

#[derive(Args, Debug)]
struct LimitArgs {
    /// Maximum number of parsed cells rendered into the context
    #[arg(long)]
    max_cells: Option<usize>,

    /// Character cap on the rendered context
    #[arg(long)]
    max_chars: Option<usize>,
}

impl LimitArgs {
    fn to_limits(&self) -> PipelineLimits {
        let defaults = ContextLimits::default();
        PipelineLimits {
            parse: ParseLimits::default(),
            context: ContextLimits {
                max_cells: self.max_cells.unwrap_or(defaults.max_cells),
                max_chars: self.max_chars.unwrap_or(defaults.max_chars),
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let verbose = matches!(cli.command, Command::Evaluate { debug: true, .. });
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| (if verbose { "debug" } else { "info" }).into()),
        )
        .init();

    let code = match cli.command {
        Command::Evaluate {
            path,
            model,
            debug,
            config,
            telemetry,
            limits,
        } => {
            run_evaluate(
                &path,
                model,
                debug,
                config.as_deref(),
                telemetry.as_deref(),
                &limits.to_limits(),
            )
            .await?
        }
        Command::Context {
            path,
            prompt,
            limits,
        } => run_context(&path, prompt, &limits.to_limits())?,
        Command::Schema => {
            println!("{}", serde_json::to_string_pretty(&evaluation_schema())?);
            0
        }
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

/// Run the pipeline and return the process exit code.
async fn run_evaluate(
    path: &Path,
    model: Option<String>,
    debug: bool,
    config_path: Option<&Path>,
    telemetry_path: Option<&Path>,
    limits: &PipelineLimits,
) -> Result<i32> {
    if let Err(code) = check_notebook_path(path) {
        return Ok(code);
    }

    let mut config = match config_path {
        Some(file) => GeneratorConfig::from_file(file)?,
        None => GeneratorConfig::from_env()?,
    };
    if let Some(model) = model {
        config = config.with_model(model);
    }
    if debug {
        config = config.with_debug(true);
    }
    info!(model = %config.model, base_url = %config.base_url, "Notebook grader starting");

    let client = GenerationClient::new(&config)?;
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = display_name(path);

    let report = evaluate_with_report(&bytes, &filename, &client, limits).await;
    if let Some(telemetry_path) = telemetry_path {
        append_telemetry(&report.telemetry, telemetry_path);
    }

    match report.result {
        Ok(response) => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(0)
        }
        Err(e) => {
            eprintln!("error: {e}");
            Ok(e.exit_code())
        }
    }
}

/// Parse and render without calling the model; returns the process exit code.
fn run_context(path: &Path, prompt: bool, limits: &PipelineLimits) -> Result<i32> {
    if let Err(code) = check_notebook_path(path) {
        return Ok(code);
    }

    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let cells = match parse_notebook(&bytes, &limits.parse) {
        Ok(cells) => cells,
        Err(e) => {
            eprintln!("error: {e}");
            return Ok(FORMAT_EXIT_CODE);
        }
    };
    let blocks_text = build_context(&cells, limits.context);

    if prompt {
        println!("{}", render_user_prompt(&display_name(path), &blocks_text));
    } else {
        println!("{blocks_text}");
    }
    Ok(0)
}

/// Reject anything not named `*.ipynb` with the format exit code.
fn check_notebook_path(path: &Path) -> std::result::Result<(), i32> {
    if display_name(path).ends_with(".ipynb") {
        Ok(())
    } else {
        eprintln!("error: Only .ipynb files are supported.");
        Err(FORMAT_EXIT_CODE)
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
