use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "blackshannon",
    version,
    about = "Web stack fingerprinting and two-stage SQL injection testing"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fingerprint a target, then detect and exploit injection points
    Scan(ScanArgs),
    /// Fingerprint a target only
    Fingerprint(FingerprintArgs),
    /// Validate a configuration file
    Validate(ValidateArgs),
}

#[derive(Args, Clone)]
pub struct ScanArgs {
    /// Target web application URL (http or https)
    #[arg(short, long)]
    pub target: String,

    /// YAML configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Output directory for results (overrides output.directory)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Backend round trips allowed per exploited parameter
    #[arg(long)]
    pub max_iterations: Option<u32>,

    /// Exploit flagged parameters concurrently
    #[arg(long)]
    pub parallel: bool,

    /// Backend strategy: hybrid, inexpensive, capable
    #[arg(long)]
    pub strategy: Option<String>,

    /// Custom scan identifier
    #[arg(long)]
    pub scan_id: Option<String>,
}

#[derive(Args, Clone)]
pub struct FingerprintArgs {
    /// Target web application URL (http or https)
    #[arg(short, long)]
    pub target: String,

    /// YAML configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Print the profile as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Clone)]
pub struct ValidateArgs {
    /// Config file to validate
    pub config: String,
}
