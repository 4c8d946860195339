use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

const BUILD_INFO_HUMAN: &str = env!("BUILD_INFO_HUMAN");

#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(
    name = "mergerbot",
    about = "Apply configured rules to changed pull requests: comment, label, and assign milestones"
)]
#[command(long_version = BUILD_INFO_HUMAN)]
pub struct RunOptions {
    /// Path to the YAML configuration
    #[arg(short = 'c', long, value_name = "PATH", default_value = "conf.yaml")]
    pub config: PathBuf,

    /// Evaluate rules without acting and without updating the cache
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

/// Parses command-line arguments into run options.
pub fn parse_args<I, T>(args: I) -> Result<RunOptions>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Ok(RunOptions::try_parse_from(args)?)
}
