use clap::Parser;
use std::path::PathBuf;
use uuid::Uuid;

// Build version with engine defaults
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Timing: 2500ms min frame, 200ms per word, 3 audio items\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Flatten narratives (frames of images, text and audio) into timed media lists
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Store file (JSON). Default: comme_store.json in the data directory
    #[arg(value_name = "STORE")]
    pub store: Option<PathBuf>,

    /// Narrative to flatten (default: first narrative)
    #[arg(short = 'n', long = "narrative", value_name = "UUID")]
    pub narrative: Option<Uuid>,

    /// Output the per-frame export list instead of the playback timeline
    #[arg(short = 'e', long = "export")]
    pub export: bool,

    /// Flatten every narrative in the store
    #[arg(short = 'a', long = "all")]
    pub all: bool,

    /// Frame to report the start time of
    #[arg(long = "start-frame", value_name = "UUID")]
    pub start_frame: Option<Uuid>,

    /// Image crossfade adjustment in ms (0 disables offsets)
    #[arg(short = 'i', long = "image-adjustment", value_name = "MS", default_value_t = 0)]
    pub image_adjustment: i32,

    /// Remove deleted rows and their files, then save the store
    #[arg(long = "sweep")]
    pub sweep: bool,

    /// Pretty-print JSON output
    #[arg(short = 'p', long = "pretty")]
    pub pretty: bool,

    /// Minimum frame duration in ms (overrides config)
    #[arg(long = "min-frame-duration", value_name = "MS")]
    pub min_frame_duration: Option<i32>,

    /// Duration per word of text in ms (overrides config)
    #[arg(long = "word-duration", value_name = "MS")]
    pub word_duration: Option<i32>,

    /// Enable debug logging to file (default: comme.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,
}
