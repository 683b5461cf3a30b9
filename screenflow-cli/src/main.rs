//! screenflow CLI entry point.
//!
//! ```text
//! screenflow locate <screenshot> <template> [--area x,y,w,h]
//! screenflow compare <a> <b> [--threshold 0.01]
//! screenflow probe <input.h264> [--limit-ms 10000]
//! screenflow --config <path>    Load a custom config TOML
//! screenflow --gen-config       Write default config to stdout
//! screenflow --json ...         Print reports as JSON
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use screenflow_cli::commands;
use screenflow_cli::config::CliConfig;
use screenflow_core::Rect;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "screenflow", about = "Offline tooling for screenflow vision and frames")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "screenflow.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Print reports as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Locate a template once in a screenshot.
    Locate {
        screenshot: PathBuf,
        template: PathBuf,
        /// Only accept a location inside `x,y,width,height`.
        #[arg(long, value_parser = parse_rect)]
        area: Option<Rect>,
    },
    /// Measure the change ratio between two screenshots.
    Compare {
        a: PathBuf,
        b: PathBuf,
        /// Ratio below which the pair counts as static.
        #[arg(long, default_value_t = 0.01)]
        threshold: f64,
    },
    /// Pipe raw video through the configured transcoder and decode it.
    Probe {
        input: PathBuf,
        /// Give up after this many milliseconds.
        #[arg(long, default_value_t = 10_000)]
        limit_ms: u64,
    },
}

fn parse_rect(s: &str) -> Result<Rect, String> {
    let parts: Vec<i32> = s
        .split(',')
        .map(|p| p.trim().parse::<i32>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid area {s:?}: {e}"))?;
    match parts[..] {
        [x, y, w, h] if w > 0 && h > 0 => Ok(Rect::new(x, y, w, h)),
        _ => Err(format!("area must be x,y,width,height with a positive size, got {s:?}")),
    }
}

fn print_report<T: Serialize + std::fmt::Debug>(report: &T, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{report:#?}");
    }
    Ok(())
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        println!("{}", CliConfig::default_toml()?);
        return Ok(());
    }

    let config = CliConfig::load(&cli.config);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("screenflow v{}", env!("CARGO_PKG_VERSION"));

    let Some(command) = cli.command else {
        eprintln!("no command given; see --help");
        std::process::exit(2);
    };

    match command {
        Command::Locate {
            screenshot,
            template,
            area,
        } => {
            let vision = config.to_vision_config();
            info!(algorithm = %vision.algorithm, max_side = vision.max_side, "locating");
            let screenshot = commands::load_image(&screenshot)?;
            let template = commands::load_image(&template)?;
            let report = commands::locate(&screenshot, &template, &vision, area)?;
            print_report(&report, cli.json)?;
            if !report.matched {
                std::process::exit(1);
            }
        }
        Command::Compare { a, b, threshold } => {
            let a = commands::load_image(&a)?;
            let b = commands::load_image(&b)?;
            let report = commands::compare(&a, &b, threshold, config.vision.pixel_threshold);
            print_report(&report, cli.json)?;
        }
        Command::Probe { input, limit_ms } => {
            info!(program = %config.transcoder.program, "probing transcoder");
            let report = commands::probe(
                &config.transcoder,
                &input,
                Duration::from_millis(limit_ms),
            )
            .await?;
            print_report(&report, cli.json)?;
        }
    }

    Ok(())
}
