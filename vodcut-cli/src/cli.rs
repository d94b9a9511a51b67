use clap::Parser;
use std::path::PathBuf;

/// Define CLI arguments
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Download a VOD, optionally cropped to a time window",
    long_about = "Downloads a VOD as HLS segments in parallel, joins them in playlist order and\n\
                  remuxes the result with ffmpeg. Cropping keeps only the segments covering the\n\
                  requested window and trims to the exact boundaries during the remux."
)]
pub struct CliArgs {
    /// VOD id
    #[arg(
        short = 'u',
        long = "id",
        required_unless_present = "playlist_url",
        help = "ID of the VOD to download"
    )]
    pub id: Option<String>,

    /// Output file
    #[arg(short, long, help = "Path of the video file to write, e.g. vod.mp4")]
    pub output: PathBuf,

    /// Quality label prefix
    #[arg(
        short,
        long,
        help = "Quality to download, e.g. 1080p60 or 720p. Falls back to the best quality"
    )]
    pub quality: Option<String>,

    /// Crop start
    #[arg(
        short,
        long,
        help = "Start of the window to keep: seconds, 1h2m3s or HH:MM:SS"
    )]
    pub beginning: Option<String>,

    /// Crop end
    #[arg(
        short,
        long,
        help = "End of the window to keep: seconds, 1h2m3s or HH:MM:SS"
    )]
    pub ending: Option<String>,

    /// Parallel segment downloads
    #[arg(short, long, default_value_t = 4, help = "Number of parallel segment downloads")]
    pub threads: usize,

    /// OAuth token
    #[arg(long, help = "OAuth token used to access subscriber-only VODs")]
    pub oauth: Option<String>,

    /// Media playlist URL
    #[arg(
        long,
        help = "Download from this media playlist URL instead of resolving the VOD id"
    )]
    pub playlist_url: Option<String>,

    /// ffmpeg binary
    #[arg(long, default_value = "ffmpeg", help = "Path to the ffmpeg executable")]
    pub ffmpeg_path: PathBuf,

    /// Temp directory
    #[arg(long, help = "Directory for temporary files (default: system temp dir)")]
    pub temp_path: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable detailed debug logging")]
    pub verbose: bool,

    /// Disable progress bars
    #[arg(long, help = "Disable progress bars")]
    pub no_progress: bool,
}
