//! wsi-tiler - Turn annotated Whole Slide Images into training tiles.
//!
//! This binary parses the command line, installs logging and runs the
//! requested subcommand.

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wsi_tiler::{
    annotation::read_ndpa,
    config::{CheckArgs, Cli, Command, PreprocessArgs},
    preprocess::SlidePreprocessor,
    slide::{annotation_path_for, open_slide, SlideReport, SlideSource},
};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = cli.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    match cli.command {
        Command::Preprocess(args) => run_preprocess(args),
        Command::Check(args) => run_check(args),
    }
}

fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "wsi_tiler=debug"
    } else {
        "wsi_tiler=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

// =============================================================================
// Preprocess Command
// =============================================================================

fn run_preprocess(args: PreprocessArgs) -> ExitCode {
    let options = args.to_options();
    info!(
        "Tiling level {} with {} px tiles (overlap {}, rotate {})",
        options.level, options.tile_size, options.overlap, options.rotate
    );

    let preprocessor = SlidePreprocessor::new(options);
    let summary = match preprocessor.preprocess(&args.input_folder, &args.output_folder) {
        Ok(summary) => summary,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    if args.json {
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                error!("Failed to serialize summary: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        println!(
            "{} slide(s) found: {} processed, {} skipped, {} failed; {} tile(s) written",
            summary.slides_found,
            summary.slides_processed,
            summary.slides_skipped,
            summary.slides_failed,
            summary.tiles_written
        );
    }

    if summary.slides_failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

// =============================================================================
// Check Command
// =============================================================================

fn run_check(args: CheckArgs) -> ExitCode {
    let slide = match open_slide(&args.slide) {
        Ok(slide) => slide,
        Err(e) => {
            error!("Cannot open {}: {}", args.slide.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let mut report = SlideReport::from_tiff(args.slide.display().to_string(), &slide);
    let annotation_path = args
        .annotations
        .clone()
        .unwrap_or_else(|| annotation_path_for(&args.slide, &args.annotation_suffix));
    report.annotation_file = Some(annotation_path.display().to_string());

    let mut ok = true;
    match slide.calibration() {
        Ok(calibration) => match read_ndpa(&annotation_path, calibration, args.mask.to_policy()) {
            Ok(collection) => report.annotations = Some(collection.len()),
            Err(e) => {
                error!("Cannot read annotations: {}", e);
                ok = false;
            }
        },
        Err(e) => {
            error!("Cannot place annotations: {}", e);
            ok = false;
        }
    }

    if args.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                error!("Failed to serialize report: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        println!("{}", report.to_text());
    }

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
