use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

mod replay;
mod report;
mod simulate;

use replay::replay_capture;
use simulate::run_simulation;

/// powermon command line tools
#[derive(Parser)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version = env!("CARGO_PKG_VERSION"),
    about = env!("CARGO_PKG_DESCRIPTION"),
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Sampler revision selection for captures.
#[derive(Clone, Copy, ValueEnum)]
enum RevisionArg {
    /// 15-bit words, dedicated zero-cross queue only.
    A,
    /// Zero-cross indicator in bit 15 of the data word.
    B,
}

impl From<RevisionArg> for powermon::Revision {
    fn from(arg: RevisionArg) -> Self {
        match arg {
            RevisionArg::A => powermon::Revision::A,
            RevisionArg::B => powermon::Revision::B,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a capture of raw 16-bit sampler words (accepts gzip; use '-' for stdin)
    Replay {
        /// Input file to read (use '-' for stdin)
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Sampler revision the capture was taken with
        #[arg(long, value_enum, default_value = "a")]
        revision: RevisionArg,
    },
    /// Run the decoder against synthetic bus traffic and report the result
    Simulate {
        /// How long to run, in seconds
        #[arg(long, default_value_t = 2)]
        seconds: u64,
        /// Triac firing delay after the zero crossing, in microseconds
        #[arg(long = "gi-delay-us", default_value_t = 3000)]
        gi_delay_us: u64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay { file, revision } => {
            replay_capture(&file, revision.into())?;
        }
        Commands::Simulate {
            seconds,
            gi_delay_us,
        } => {
            run_simulation(Duration::from_secs(seconds), gi_delay_us)?;
        }
    }

    Ok(())
}
