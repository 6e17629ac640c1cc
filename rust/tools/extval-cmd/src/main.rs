use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod utils;

#[derive(Parser)]
#[command(name = "extval-cmd")]
#[command(about = "Command-line utility for external values files")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a key=value source file and report its ranges and encoding
    Parse {
        /// Scaling factor to evaluate the in-memory encoding with
        #[arg(short, long)]
        scaling_factor: Option<i64>,

        /// Source file to parse
        file: String,
    },

    /// Encode a source file into a trie hash table file
    Build {
        /// Source file to encode
        file: String,

        /// Output .amt file
        output: String,
    },

    /// Display the header of a trie hash table file
    Inspect {
        /// Verify the checksum of the table body
        #[arg(long)]
        verify: bool,

        /// .amt file to inspect
        file: String,
    },

    /// Look keys up in a trie hash table file
    Lookup {
        /// .amt file to read
        file: String,

        /// Keys to look up
        #[arg(required = true, allow_negative_numbers = true)]
        keys: Vec<i64>,
    },

    /// Run the refresh service for the maps of a JSON config until Ctrl-C
    Serve {
        /// Path to the JSON config
        #[arg(short, long)]
        config: String,

        /// Root of the working directories, overrides the config
        #[arg(short, long)]
        data_dir: Option<String>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Parse {
            scaling_factor,
            file,
        } => commands::parse::run(scaling_factor, file),
        Commands::Build { file, output } => commands::build::run(file, output),
        Commands::Inspect { verify, file } => commands::inspect::run(verify, file),
        Commands::Lookup { file, keys } => commands::lookup::run(file, keys),
        Commands::Serve { config, data_dir } => commands::serve::run(config, data_dir),
    }
}
