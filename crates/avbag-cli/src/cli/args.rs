use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "avbag",
    version,
    about = "Preprocess audiovisual bags: substitute placeholder files, drop invisible files and add streaming copies"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Convert every bag below INPUT_DIR into revisions in OUTPUT_DIR
    Convert(ConvertArgs),
    /// Check the manifests of a single bag against its files
    Verify(VerifyArgs),
    Version,
}

#[derive(Parser, Debug)]
pub struct ConvertArgs {
    /// Directory with `<bag-parent>/<bag>` trees
    pub input_dir: PathBuf,

    /// Directory receiving the revisions; one entry per revision
    pub output_dir: PathBuf,

    #[arg(long, env = "AVBAG_CONFIG", default_value = "avbag.yaml")]
    pub config: PathBuf,

    /// Overrides `staging_dir` from the configuration
    #[arg(long)]
    pub staging_dir: Option<PathBuf>,

    /// Keep the input bags after conversion
    #[arg(long)]
    pub keep_input: bool,
}

#[derive(Parser, Debug)]
pub struct VerifyArgs {
    /// Root of the bag (the directory holding bagit.txt)
    pub bag_dir: PathBuf,
}
