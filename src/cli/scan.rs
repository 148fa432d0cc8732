use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::commands::{FingerprintArgs, ScanArgs};
use crate::config::{self, BlackShannonConfig, Strategy};
use crate::errors::ScanError;
use crate::fingerprint::FingerprintEngine;
use crate::pipeline::orchestrator::{validate_target, ScanOrchestrator};
use crate::probe::ProbeClient;
use crate::utils::formatting::format_duration;

pub async fn load_config(path: Option<&str>) -> Result<BlackShannonConfig, ScanError> {
    match path {
        Some(path) => config::parse_config(&PathBuf::from(path)).await,
        None => Ok(BlackShannonConfig::default()),
    }
}

/// Apply command-line overrides on top of the file configuration, then
/// re-run semantic validation.
pub fn apply_overrides(mut config: BlackShannonConfig, args: &ScanArgs) -> Result<BlackShannonConfig, ScanError> {
    if let Some(output) = &args.output {
        config.output.directory = output.clone();
    }
    if let Some(max) = args.max_iterations {
        config.exploitation.max_iterations = max;
    }
    if args.parallel {
        config.exploitation.parallel_parameters = true;
    }
    if let Some(strategy) = &args.strategy {
        config.llm.strategy = strategy.parse::<Strategy>().map_err(ScanError::Config)?;
    }
    config::validate_config(&config)?;
    Ok(config)
}

pub async fn handle_scan(args: ScanArgs, quiet: bool) -> Result<(), ScanError> {
    let config = apply_overrides(load_config(args.config.as_deref()).await?, &args)?;
    info!(target = %args.target, strategy = %config.llm.strategy, "Starting scan");

    let mut orchestrator = ScanOrchestrator::new(config, &args.target)?;
    if let Some(scan_id) = &args.scan_id {
        orchestrator = orchestrator.with_scan_id(scan_id.clone());
    }

    let cancel = CancellationToken::new();
    let orchestrator = orchestrator.with_cancel_token(cancel.clone());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing current turn and writing report");
            cancel.cancel();
        }
    });

    let outcome = orchestrator.run().await?;
    if !quiet {
        let report = &outcome.report;
        let counts = report.counts();
        let usage = &report.usage;
        println!("Scan {} finished in {}", report.scan_id, format_duration(report.duration_ms()));
        println!("  Stack:           {}", report.profile.summary);
        println!(
            "  Vulnerabilities: {} ({} exploited, {} potential; {} false positive(s) dismissed)",
            counts.vulnerabilities(),
            counts.exploited,
            counts.potential,
            counts.false_positives
        );
        println!(
            "  Backend calls:   {} inexpensive, {} balanced, {} capable",
            usage.inexpensive.calls, usage.balanced.calls, usage.capable.calls
        );
        println!("  Target requests: {}", report.requests.requests);
        println!("  Report:          {}", outcome.paths.markdown.display());
    }
    Ok(())
}

pub async fn handle_fingerprint(args: FingerprintArgs) -> Result<(), ScanError> {
    validate_target(&args.target)?;
    let config = load_config(args.config.as_deref()).await?;
    let client = ProbeClient::new(&config.target, &config.http)?;
    let profile = FingerprintEngine::new(client).analyze(&args.target).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&profile)?);
    } else {
        println!("{}", crate::reporting::formatter::format_profile_table(&profile));
        for note in &profile.degraded {
            println!("- degraded: {}", note);
        }
    }
    if !profile.is_reachable() {
        return Err(ScanError::Unreachable(args.target));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> ScanArgs {
        ScanArgs {
            target: "http://t.test".into(),
            config: None,
            output: Some("/tmp/bs-out".into()),
            max_iterations: Some(2),
            parallel: true,
            strategy: Some("cheap".into()),
            scan_id: None,
        }
    }

    #[test]
    fn test_overrides_applied() {
        let config = apply_overrides(BlackShannonConfig::default(), &args()).unwrap();
        assert_eq!(config.output.directory, "/tmp/bs-out");
        assert_eq!(config.exploitation.max_iterations, 2);
        assert!(config.exploitation.parallel_parameters);
        assert_eq!(config.llm.strategy, Strategy::Inexpensive);
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let mut a = args();
        a.max_iterations = Some(0);
        assert!(matches!(apply_overrides(BlackShannonConfig::default(), &a), Err(ScanError::Config(_))));
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let mut a = args();
        a.strategy = Some("fastest".into());
        assert!(apply_overrides(BlackShannonConfig::default(), &a).is_err());
    }
}
