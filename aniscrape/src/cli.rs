use clap::{Parser, Subcommand};

/// 动画/漫画站点解析工具，结果以 JSON 输出
#[derive(Debug, Parser)]
#[command(name = "aniscrape", version)]
#[command(about = "Resolve anime and manga pages into structured records", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Parse a series, catalogue or search page
    Listing {
        url: String,
        /// Page number, starting from 1
        #[arg(short, long)]
        page: Option<u32>,
    },
    /// Parse an episode or chapter page
    Detail { url: String },
    /// Parse an episode page and resolve a playable stream
    Play {
        url: String,
        /// Preferred resolution, e.g. `720p` or a regex like `(720|1080)p`
        #[arg(short, long)]
        quality: Option<String>,
    },
    /// Search a source by keyword
    Search {
        /// Source name (`anime` or `manga`)
        source: String,
        query: String,
        #[arg(short, long)]
        page: Option<u32>,
    },
    /// Build a resized image URL
    Asset {
        path: String,
        #[arg(short, long, default_value_t = 256)]
        width: u32,
        #[arg(short, long, default_value_t = 75)]
        quality: u8,
        #[arg(short, long, default_value = "manga")]
        source: String,
    },
}
