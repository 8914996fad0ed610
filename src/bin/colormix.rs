//! colormix - inject mixing-hotend color changes into sliced G-code
//!
//! Reads a G-code file and a JSON job configuration, runs the color-change
//! pipeline and writes the result into the chosen output directory, named
//! after the time, the number of colors and the strategies used.

use clap::Parser;
use colormix::config::ColorChangeConfig;
use colormix::gcode::GCode;
use colormix::pipeline::ColorChangePipeline;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "colormix")]
#[command(about = "Inject color changes and pressure compensation into G-code")]
struct Cli {
    /// Sliced G-code file to process
    input: PathBuf,

    /// JSON job configuration
    #[arg(long, short)]
    config: PathBuf,

    /// Directory for the output file
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "colormix=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> colormix::Result<()> {
    info!("Loading configuration from: {}", cli.config.display());
    let config = ColorChangeConfig::from_file(&cli.config)?;

    info!("Processing: {}", cli.input.display());
    let raw = GCode::read_from_file(&cli.input)?;
    let output = ColorChangePipeline::new(config).run(raw.content())?;

    let timestamp = chrono::Local::now().naive_local();
    let path = cli
        .output_dir
        .join(output.file_name(&timestamp, &cli.input));
    output.gcode.write_to_file(&path)?;

    info!(
        events = output.events.len(),
        "Wrote {}",
        path.display()
    );
    Ok(())
}
