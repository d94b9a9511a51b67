use clap::Parser;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};
use vodcut_engine::{
    CancellationToken, CropRange, DownloadOptions, EngineConfig, VodDownloader,
};

mod cli;
mod error;
mod progress;
mod time;

use cli::CliArgs;
use error::AppError;
use progress::ProgressManager;
use time::parse_time;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() {
    if let Err(e) = bootstrap() {
        if e.is_cancelled() {
            eprintln!("Cancelled");
        } else {
            eprintln!("Error: {e}");
            error!(error = ?e, "Application failed");
        }
        std::process::exit(1);
    }
}

#[tokio::main]
async fn bootstrap() -> Result<(), AppError> {
    let args = CliArgs::parse();
    init_logging(args.verbose)?;

    let options = build_options(&args)?;
    options.validate()?;

    let progress = if args.no_progress {
        ProgressManager::new_disabled()
    } else {
        ProgressManager::new()
    };

    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling download");
            signal_token.cancel();
        }
    });

    info!(
        video = %options.video_id,
        output = %options.output.display(),
        threads = options.download_threads,
        "Starting download"
    );
    debug!(crop = ?options.crop, quality = ?options.quality, "Download options");

    let downloader = VodDownloader::new(options, EngineConfig::default())?;
    match downloader.run(Some(progress.callback()), &token).await {
        Ok(path) => {
            progress.finish("Done");
            info!("Saved {}", path.display());
            Ok(())
        }
        Err(e) => {
            progress.abandon();
            Err(e.into())
        }
    }
}

fn build_options(args: &CliArgs) -> Result<DownloadOptions, AppError> {
    let crop = CropRange::new(
        args.beginning.as_deref().map(parse_time).transpose()?,
        args.ending.as_deref().map(parse_time).transpose()?,
    );
    if crop.is_empty_window() {
        return Err(AppError::InvalidInput(
            "--beginning must be before --ending".to_string(),
        ));
    }

    let mut builder = DownloadOptions::builder(args.id.clone().unwrap_or_default(), &args.output)
        .with_crop(crop)
        .with_download_threads(args.threads)
        .with_ffmpeg_path(&args.ffmpeg_path);
    if let Some(url) = &args.playlist_url {
        builder = builder.with_playlist_url(url);
    }
    if let Some(quality) = &args.quality {
        builder = builder.with_quality(quality);
    }
    if let Some(temp) = &args.temp_path {
        builder = builder.with_temp_root(temp);
    }
    if let Some(oauth) = &args.oauth {
        builder = builder.with_oauth(oauth);
    }
    Ok(builder.build())
}

fn init_logging(verbose: bool) -> Result<(), AppError> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(verbose)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .map_err(|e| AppError::Initialization(e.to_string()))
}
