//! mediapress CLI - compress text, images and video from the command line.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use log::{error, LevelFilter};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use mediapress::controller::{CodecKind, Controller, ControllerConfig, Mode};

/// mediapress - lossless text codecs and lossy DCT image/video codecs
#[derive(Parser, Debug)]
#[command(name = "mediapress")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// More log output (repeat for debug and trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compress a file
    Compress {
        /// Codec name (see `list`)
        codec: String,

        /// Source file
        source: PathBuf,

        #[command(flatten)]
        settings: Settings,
    },

    /// Decompress an artifact produced by `compress`
    Decompress {
        /// Codec name (see `list`)
        codec: String,

        /// Artifact file
        source: PathBuf,

        #[command(flatten)]
        settings: Settings,
    },

    /// List available codecs
    List,
}

#[derive(Args, Debug)]
struct Settings {
    /// Directory the output is written to
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// DCT quality factor (1-100)
    #[arg(long, default_value = "50")]
    quality: u8,

    /// Images with a longer side are downscaled first
    #[arg(long, default_value = "6000")]
    max_dimension: u32,

    /// Frames per video batch
    #[arg(long, default_value = "64")]
    batch_size: usize,

    /// Worker threads for video (defaults to available parallelism)
    #[arg(long)]
    workers: Option<usize>,

    /// Do not write the reconstructed image preview
    #[arg(long)]
    no_preview: bool,
}

impl Settings {
    fn into_config(self) -> ControllerConfig {
        let defaults = ControllerConfig::default();
        ControllerConfig {
            output_dir: self.output_dir,
            image_quality: self.quality,
            max_dimension: self.max_dimension,
            video_quality: self.quality,
            batch_size: self.batch_size,
            workers: self.workers.unwrap_or(defaults.workers),
            preview: !self.no_preview,
        }
    }
}

fn level(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Error;
    }
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = TermLogger::init(
        level(cli.verbose, cli.quiet),
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    ) {
        eprintln!("cannot initialize logging: {e}");
    }

    let (mode, codec, source, settings) = match cli.command {
        Commands::List => {
            for kind in CodecKind::ALL {
                println!("{kind}");
            }
            return ExitCode::SUCCESS;
        }
        Commands::Compress {
            codec,
            source,
            settings,
        } => (Mode::Compress, codec, source, settings),
        Commands::Decompress {
            codec,
            source,
            settings,
        } => (Mode::Decompress, codec, source, settings),
    };

    let result = codec
        .parse::<CodecKind>()
        .and_then(|kind| Controller::new(settings.into_config()).run(kind, mode, &source));

    match result {
        Ok(outcome) => {
            println!("Output: {}", outcome.destination.display());
            println!(
                "Size: {} bytes ({:.2} MB)",
                outcome.artifact_size,
                outcome.size_mb()
            );
            if let Some(preview) = outcome.preview {
                println!("Preview: {}", preview.display());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
