use anyhow::Result;
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version = env!("CARGO_PKG_VERSION"),
    about = env!("CARGO_PKG_DESCRIPTION"),
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render the boot script (or bucket manifest) for the given profile
    Render(RenderArgs),

    /// Provision the profile's host over SSH
    Apply(ApplyArgs),

    /// Validate the given YAML profile
    Validate(ValidateArgs),

    /// Show the AMI lookup for the given profile
    Ami(AmiArgs),

    /// Generate shell completion scripts
    Completions(CompletionsArgs),
}

impl Commands {
    /// Log level of the subcommand, if it takes one.
    pub fn log_level(&self) -> Option<LogLevel> {
        match self {
            Self::Render(opts) => Some(opts.common.log_level),
            Self::Apply(opts) => Some(opts.common.log_level),
            Self::Validate(opts) => Some(opts.common.log_level),
            Self::Ami(opts) => Some(opts.common.log_level),
            Self::Completions(_) => None,
        }
    }
}

/// Arguments shared by every profile-driven subcommand.
#[derive(Args, Debug)]
pub struct CommonArgs {
    /// Path to the YAML file defining the profile
    #[arg(short, long, default_value = "profile.yaml")]
    pub file: Utf8PathBuf,

    /// Set the log level
    #[arg(short, long, default_value = "info")]
    pub log_level: LogLevel,
}

#[derive(Args, Debug)]
pub struct RenderArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Write to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<Utf8PathBuf>,

    /// Encode the user data as base64 (always on for launch templates)
    #[arg(long)]
    pub base64: bool,

    /// Print the delivery manifest instead of the script
    #[arg(long)]
    pub manifest: bool,
}

#[derive(Args, Debug)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Do not run, just show what would be done
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Args, Debug)]
pub struct AmiArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Override the profile's AMI family (al2023, debian, ubuntu)
    #[arg(long)]
    pub family: Option<String>,

    /// Select an image from saved `aws ec2 describe-images` JSON output
    #[arg(long)]
    pub images: Option<Utf8PathBuf>,
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Verbosity of log output, mapped onto `tracing` levels.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

pub fn parse_args() -> Result<Cli> {
    Ok(Cli::parse())
}
