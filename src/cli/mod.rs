use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "douyin-mcp",
    about = "Douyin MCP server - resolve share links to watermark-free videos and extract spoken text",
    version,
    long_about = "Serves two tools over an HTTP tool-calling endpoint: get_download_link resolves a Douyin share link into a watermark-free video URL with metadata, and extract_text transcribes the video's audio using a speech recognition service. Both tools can also be run directly from the command line."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP tool server
    Serve {
        /// Address to bind (overrides config and HOST)
        #[arg(long, value_name = "HOST")]
        host: Option<String>,

        /// Port to listen on (overrides config and PORT)
        #[arg(short, long, value_name = "PORT")]
        port: Option<u16>,
    },

    /// Resolve a share link into its watermark-free download URL
    Link {
        /// Share link or the full share text copied from the app
        #[arg(value_name = "SHARE")]
        share: String,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Output file path (prints to console if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Download the watermark-free video into this directory
        #[arg(long, value_name = "DIR")]
        download: Option<PathBuf>,
    },

    /// Extract the spoken text of a shared video
    Text {
        /// Share link or the full share text copied from the app
        #[arg(value_name = "SHARE")]
        share: String,

        /// Speech recognition model (configured default if not specified)
        #[arg(short, long, value_name = "MODEL")]
        model: Option<String>,

        /// Output file path (prints to console if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Show configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },

    /// List the tools the server exposes
    Tools,
}

#[derive(ValueEnum, Clone, Debug)]
pub enum OutputFormat {
    /// Human readable summary
    Text,
    /// JSON, as returned by the tool
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}
