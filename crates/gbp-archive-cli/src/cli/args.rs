use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "gbp-archive",
    version,
    about = "Dump and restore Gentoo Build Publisher builds"
)]
pub struct Cli {
    #[command(flatten)]
    pub store: StoreArgs,

    #[command(subcommand)]
    pub cmd: Command,
}

/// Where the records database and artifact storage live.
#[derive(Args, Debug, Clone, Default)]
pub struct StoreArgs {
    /// YAML config file
    #[arg(long, global = true, env = "GBP_ARCHIVE_CONFIG")]
    pub config: Option<PathBuf>,

    /// SQLite records database (overrides config)
    #[arg(long, global = true, env = "GBP_RECORDS_DB")]
    pub records_db: Option<PathBuf>,

    /// Artifact storage root (overrides config)
    #[arg(long, global = true, env = "GBP_STORAGE_ROOT")]
    pub storage_root: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Dump builds to a file
    Dump(DumpArgs),
    /// Restore a gbp dump
    Restore(RestoreArgs),
}

#[derive(Args, Debug, Clone)]
pub struct DumpArgs {
    /// Verbose mode: list builds dumped (-vv adds more detail)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Filename to dump builds to ("-" for standard out)
    #[arg(short = 'f', long = "file", default_value = "-")]
    pub file: PathBuf,

    /// Only dump builds completed on or after DATE (YYYY-MM-DD)
    #[arg(short = 'N', long, value_name = "DATE")]
    pub newer: Option<NaiveDate>,

    /// List the builds that would be dumped and exit
    #[arg(short, long)]
    pub list: bool,

    /// <machine>, <machine>.<build_id>, <machine>@<tag> or <machine>@ (published).
    /// With none, every build is dumped.
    #[arg(value_name = "BUILDSPEC")]
    pub buildspecs: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct RestoreArgs {
    /// Verbose mode: list builds restored (-vv adds archive metadata)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Filename to restore builds from ("-" for standard in)
    #[arg(short = 'f', long = "file", default_value = "-")]
    pub file: PathBuf,

    /// List the builds in the archive and exit
    #[arg(short, long)]
    pub list: bool,
}

/// `-` stands for stdin/stdout.
pub fn is_stdio(path: &Path) -> bool {
    path.as_os_str() == "-"
}
