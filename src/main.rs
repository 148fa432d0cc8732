use blackshannon::cli::{self, Commands};
use blackshannon::config;
use blackshannon::errors::ScanError;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    // Initialize logging
    let log_level = match (cli.quiet, cli.verbose) {
        (true, 0) => "warn",
        (_, 0) => "info",
        (_, 1) => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(!cli.no_color)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Scan(args) => cli::scan::handle_scan(args, cli.quiet).await,
        Commands::Fingerprint(args) => cli::scan::handle_fingerprint(args).await,
        Commands::Validate(args) => handle_validate(args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(exit_code(&e));
    }
}

fn exit_code(error: &ScanError) -> i32 {
    match error {
        ScanError::Unreachable(_) => 3,
        e if e.is_fatal() => 2,
        _ => 1,
    }
}

async fn handle_validate(args: cli::commands::ValidateArgs) -> Result<(), ScanError> {
    let path = std::path::PathBuf::from(&args.config);
    let _config = config::parse_config(&path).await?;
    println!("Configuration is valid: {}", args.config);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(&ScanError::Unreachable("http://down.test".into())), 3);
        assert_eq!(exit_code(&ScanError::Template("{{X}}".into())), 2);
        assert_eq!(exit_code(&ScanError::InvalidTarget("ftp://x".into())), 2);
        assert_eq!(exit_code(&ScanError::Cancelled("scan".into())), 1);
        assert_eq!(exit_code(&ScanError::BackendUnavailable("503".into())), 1);
    }
}
