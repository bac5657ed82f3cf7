use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use synthetic_bolus::config::{BolusConfig, ConfigError, RunPaths};
use synthetic_bolus::pipeline::{self, GenerationReport, PipelineError, ValidationReport};
use thiserror::Error;
use tracing::{Level, error};

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Could not serialize report: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(version, about = "Burn bolus structures into a CT series", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    #[arg(
        help = "JSON configuration file",
        long = "config",
        short = 'c',
        global = true
    )]
    config: Option<PathBuf>,

    #[arg(
        help = "Enable verbose logging",
        long = "verbose",
        short = 'v',
        global = true,
        default_value = "false"
    )]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the structures of the structure set and the selectable bolus ROIs
    Structures {
        #[arg(help = "Directory with the CT series and its structure set")]
        input: PathBuf,
    },

    /// Write a CT series with the selected ROIs burned in
    Generate {
        #[arg(help = "Directory with the CT series and its structure set")]
        input: PathBuf,

        #[arg(help = "Output directory for the derived series")]
        output: PathBuf,

        #[arg(help = "ROI number to burn in", long = "roi", required = true)]
        roi: Vec<i32>,

        #[arg(help = "Override the configured margin, in voxels", long = "margin")]
        margin: Option<usize>,

        #[arg(help = "Validate the written series afterwards", long = "validate")]
        validate: bool,
    },

    /// Report which slices of a derived series differ from the input
    Validate {
        #[arg(help = "Directory with the original CT series")]
        input: PathBuf,

        #[arg(help = "Directory with the derived series")]
        output: PathBuf,
    },
}

#[derive(Serialize)]
struct GenerateOutput {
    generation: GenerationReport,
    validation: Option<ValidationReport>,
}

fn main() {
    let args = Args::parse();

    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    if let Err(e) = tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .finish(),
    ) {
        eprintln!("[ERROR] Could not set up global logging subscriber: {e}");
    }

    if let Err(e) = run(args) {
        error!("{e}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), CliError> {
    let mut config = match &args.config {
        Some(path) => BolusConfig::from_json_file(path)?,
        None => BolusConfig::default(),
    };

    let json = match args.command {
        Command::Structures { input } => {
            serde_json::to_string_pretty(&pipeline::list_structures(&input)?)?
        }
        Command::Generate {
            input,
            output,
            roi,
            margin,
            validate,
        } => {
            if let Some(margin) = margin {
                config.margin = margin;
            }
            let paths = RunPaths::new(input, output);
            let generation = pipeline::generate(&paths, &config, &roi)?;
            let validation = if validate {
                Some(pipeline::validate(&paths, Some(&generation.mask_uids))?)
            } else {
                None
            };
            serde_json::to_string_pretty(&GenerateOutput {
                generation,
                validation,
            })?
        }
        Command::Validate { input, output } => {
            serde_json::to_string_pretty(&pipeline::validate(&RunPaths::new(input, output), None)?)?
        }
    };

    println!("{json}");
    Ok(())
}
