use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(
    name = "investicat",
    about = "Extract timeline events from investigative documents into graph JSON",
    version
)]
pub struct Cli {
    /// Document(s) to process
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Output file for one document, or output directory for several
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Use pattern extraction only, never call the model
    #[arg(long = "no-ai")]
    pub no_ai: bool,

    /// JSON configuration file; environment variables override it
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Don't print the per-document summary
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,
}
