use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
pub struct Cli {
    /// Image file
    #[arg(long, short)]
    pub image: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create an empty image and format it
    Format {
        /// Image size in MiB
        #[arg(long, short, default_value_t = 16)]
        size: u64,
    },

    /// Copy a host directory tree into the image
    Pack {
        /// Host directory
        #[arg(long, short)]
        source: PathBuf,

        /// Destination directory in the image
        #[arg(long, short, default_value = "/")]
        target: String,
    },

    /// List a directory in the image
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },

    /// Print a file in the image
    Cat { path: String },
}
