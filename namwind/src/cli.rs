use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(about = "NAM analysis wind extraction CLI.")]
pub struct Cli {
    /// JSON run inputs: dates, data path, site and pressure levels
    #[arg(
        env = "NAMWIND_CONFIG",
        short,
        long,
        default_value = "nam_download_inputs.json"
    )]
    pub config: PathBuf,
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scrape the daily listings and write the URL list
    CollectUrls,
    /// Download every listed file and write the wind CSV
    Extract {
        /// URL list to read instead of the one in the data path
        #[arg(long)]
        urls: Option<PathBuf>,
    },
    /// Collect URLs, then extract
    Run,
}
