use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "lanzou")]
#[command(about = "Browse, upload to and download from a Lanzou cloud drive")]
#[command(version)]
pub struct Cli {
    /// Transfers running at once (overrides LANZOU_CONCURRENCY)
    #[arg(short = 'j', long, global = true)]
    pub concurrency: Option<usize>,

    /// Bytes read per upload chunk (overrides LANZOU_CHUNK_SIZE)
    #[arg(
        long,
        global = true,
        value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
    )]
    pub chunk_size: Option<usize>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List a folder; the drive root by default
    Ls {
        #[arg(default_value = "-1", allow_hyphen_values = true)]
        folder: String,
    },

    /// Create a folder
    Mkdir {
        #[arg(allow_hyphen_values = true)]
        parent: String,
        name: String,
        /// Folder description
        #[arg(long)]
        desc: Option<String>,
    },

    /// Rename a file, or a folder with --folder
    Rename {
        id: String,
        name: String,
        #[arg(long)]
        folder: bool,
    },

    /// Delete a file, or a folder with --folder
    Rm {
        id: String,
        #[arg(long)]
        folder: bool,
    },

    /// Set the extraction code of a file, or a folder with --folder; omit
    /// the code to remove it
    Passwd {
        id: String,
        code: Option<String>,
        #[arg(long)]
        folder: bool,
    },

    /// Set the description of a file, or a folder with --folder
    Desc {
        id: String,
        text: String,
        #[arg(long)]
        folder: bool,
    },

    /// Move a file, or a folder with --folder, into another folder
    Mv {
        id: String,
        #[arg(allow_hyphen_values = true)]
        dest: String,
        #[arg(long)]
        folder: bool,
    },

    /// Find share links in a piece of text and show what they point to
    Share { text: String },

    /// Upload files and directories
    Upload {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Destination folder id
        #[arg(long, default_value = "-1", allow_hyphen_values = true)]
        folder: String,
        /// How deep the destination folder sits below the root
        #[arg(long, default_value_t = 0)]
        depth: usize,
        /// Extraction code to set on every uploaded file
        #[arg(long)]
        pwd: Option<String>,
        /// Description to set on every uploaded file
        #[arg(long)]
        desc: Option<String>,
    },

    /// Download files by id or share link
    Download {
        #[arg(required = true)]
        targets: Vec<String>,
        /// Output directory (overrides LANZOU_DOWNLOAD_DIR)
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Extraction code for password-protected share links
        #[arg(long)]
        pwd: Option<String>,
        /// Folder holding the file ids, used to look up their names
        #[arg(long, default_value = "-1", allow_hyphen_values = true)]
        from: String,
    },
}
