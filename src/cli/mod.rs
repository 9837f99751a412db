//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "ragprobe",
    version,
    about = "Semantic retrieval pipeline with needle-in-a-haystack evaluation",
    long_about = "Ragprobe chunks and indexes documents for semantic search, and evaluates \
                  retrieval and long-context accuracy with needle-in-a-haystack tests."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/ragprobe/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest local text files and run a query against them
    Search {
        /// Search query text
        query: String,

        /// Text files to ingest before searching
        #[arg(short, long, value_name = "FILE", required = true)]
        file: Vec<PathBuf>,

        /// Maximum number of results to return
        #[arg(short, long, default_value = "5")]
        limit: usize,

        /// Rerank the candidate set before returning results
        #[arg(long)]
        rerank: bool,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Run the needle-in-a-haystack retrieval accuracy test
    Needle {
        /// The needle fact to plant
        #[arg(long, default_value = "重要信息：宝藏在山顶")]
        needle: String,

        /// Query used to find the needle (defaults to the needle itself)
        #[arg(short, long)]
        query: Option<String>,

        /// Number of filler documents in the haystack
        #[arg(long, default_value = "100")]
        haystack_size: usize,

        /// Number of results to retrieve
        #[arg(short, long, default_value = "5")]
        limit: usize,

        /// Seed for reproducible haystack synthesis
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Repeat the test over several haystack sizes (comma-separated)
        #[arg(long, value_delimiter = ',')]
        sizes: Option<Vec<usize>>,

        /// Trials per haystack size when --sizes is given
        #[arg(long, default_value = "5")]
        trials: usize,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Run the long-context position test against the configured model
    LongContext {
        /// Context length budgets in characters (comma-separated)
        #[arg(long, value_delimiter = ',', default_value = "1000,4000")]
        lengths: Vec<usize>,

        /// Needle positions: beginning, middle, end, or a fraction in [0,1]
        #[arg(long, value_delimiter = ',', default_value = "beginning,middle,end")]
        positions: Vec<String>,

        /// Trials per (length, position) cell
        #[arg(long, default_value = "3")]
        trials: usize,

        /// Maximum concurrent trials
        #[arg(long, default_value = "4")]
        concurrency: usize,

        /// Seed for random needle generation
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,

    /// Write the default configuration to a file
    Init {
        /// Output path (defaults to the standard location)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
