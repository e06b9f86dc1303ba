//! `scan` subcommand: input checks, wiring and the final summary

use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::args::ScanArgs;
use crate::output::{format_duration, open_output};
use sslsearch_common::{ScanOptions, ScanStats, StageOptions};
use sslsearch_fingerprint::{JarmFingerprinter, ServerHeaderGrabber};
use sslsearch_orchestrator::{print_summary, Orchestrator, ResultSink};
use sslsearch_scanner_tls::{CertificateMatcher, TlsProber};
use sslsearch_target_resolver::TargetResolver;

pub async fn run_scan(args: ScanArgs) -> Result<()> {
    // everything fatal is checked before the first probe
    let blocks = TargetResolver::resolve(args.cidr.as_deref(), args.cidr_file.as_deref()).await?;
    let options = build_options(&args)?;
    options.validate()?;
    let matcher = CertificateMatcher::new(&options.keyword_pattern, &options.region_pattern)?;
    let file = open_output(&args.out, args.overwrite).await?;

    info!("Starting scan...");
    info!("CIDR blocks: {}", blocks.len());
    info!("Ports: {:?}", options.ports);
    info!("Keyword: {}  Region: {}", options.keyword_pattern, options.region_pattern);
    info!("Workers: {} (suffix {})", options.scan_workers, options.cidr_suffix);
    info!("Output: {}", args.out.display());

    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight work");
            cancel_ctrlc.cancel();
        }
    });

    let stats = Arc::new(ScanStats::new());
    let prober = TlsProber::new(
        options.timeout,
        options.scan_workers,
        matcher,
        stats.clone(),
        cancel.clone(),
    )?;
    let mut orchestrator =
        Orchestrator::new(options.clone(), Arc::new(prober), stats.clone(), cancel.clone());

    // header first, then JARM
    if options.server_header.enabled {
        let grabber = ServerHeaderGrabber::new(
            options.timeout,
            options.server_header.workers,
            cancel.clone(),
        )?;
        orchestrator.add_enricher(Arc::new(grabber), options.server_header.workers);
    }
    if options.jarm.enabled {
        let jarm = JarmFingerprinter::new(options.timeout, options.jarm_retries, cancel.clone());
        orchestrator.add_enricher(Arc::new(jarm), options.jarm.workers);
    }

    let mut sink = ResultSink::new(file, options.console_out);
    let scan_start = Instant::now();
    let report = orchestrator.run(blocks, &mut sink).await?;
    let scan_duration = scan_start.elapsed();

    print_summary(&stats.snapshot(), &report);
    info!("  Scan duration: {}", format_duration(scan_duration));
    Ok(())
}

fn build_options(args: &ScanArgs) -> Result<ScanOptions> {
    Ok(ScanOptions {
        ports: parse_ports(&args.ports)?,
        keyword_pattern: args.keyword_regex.clone(),
        region_pattern: args.region_regex.clone(),
        cidr_suffix: args.suffix,
        timeout: Duration::from_secs(args.timeout),
        scan_workers: args.threads,
        server_header: StageOptions {
            enabled: args.server_header,
            workers: args.server_header_threads,
        },
        jarm: StageOptions {
            enabled: args.jarm,
            workers: args.jarm_threads,
        },
        jarm_retries: args.jarm_retry_count,
        console_out: args.console_out,
        progress_interval: Duration::from_secs(args.progress_interval),
    })
}

/// Parses a port string like "80,443,1000-1010" into a vector of u16 ports
fn parse_ports(ports_str: &str) -> Result<Vec<u16>> {
    let mut ports = Vec::new();

    for part in ports_str.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if part.contains('-') {
            let range: Vec<&str> = part.split('-').collect();
            if range.len() != 2 {
                return Err(anyhow!("Invalid port range: {}", part));
            }

            let start: u16 = range[0]
                .trim()
                .parse()
                .with_context(|| format!("Invalid start port: {}", range[0]))?;
            let end: u16 = range[1]
                .trim()
                .parse()
                .with_context(|| format!("Invalid end port: {}", range[1]))?;

            if start > end {
                return Err(anyhow!("Invalid range: start > end"));
            }

            ports.extend(start..=end);
        } else {
            let port: u16 = part
                .parse()
                .with_context(|| format!("Invalid port: {}", part))?;
            ports.push(port);
        }
    }

    // a port listed twice would be probed twice per address
    ports.sort_unstable();
    ports.dedup();

    if ports.is_empty() {
        Err(anyhow!("No ports specified"))
    } else {
        Ok(ports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::{Cli, Commands};
    use clap::Parser;

    fn scan_args(extra: &[&str]) -> ScanArgs {
        let mut argv = vec!["sslsearch", "scan"];
        argv.extend_from_slice(extra);
        let Commands::Scan(args) = Cli::try_parse_from(argv).unwrap().command;
        args
    }

    #[test]
    fn test_parse_ports_single() {
        let ports = parse_ports("443").unwrap();
        assert_eq!(ports, vec![443]);
    }

    #[test]
    fn test_parse_ports_multiple() {
        let ports = parse_ports("443,8443,9443").unwrap();
        assert_eq!(ports, vec![443, 8443, 9443]);
    }

    #[test]
    fn test_parse_ports_range() {
        let ports = parse_ports("8000-8002").unwrap();
        assert_eq!(ports, vec![8000, 8001, 8002]);
    }

    #[test]
    fn test_parse_ports_mixed_and_duplicates() {
        let ports = parse_ports("8443,443,442-444").unwrap();
        assert_eq!(ports, vec![442, 443, 444, 8443]);
    }

    #[test]
    fn test_parse_ports_whitespace() {
        let ports = parse_ports(" 443 , 8443 ").unwrap();
        assert_eq!(ports, vec![443, 8443]);
    }

    #[test]
    fn test_parse_ports_empty() {
        assert!(parse_ports("").is_err());
        assert!(parse_ports("   ").is_err());
        assert!(parse_ports(",,,").is_err());
    }

    #[test]
    fn test_parse_ports_invalid() {
        assert!(parse_ports("abc").is_err());
        assert!(parse_ports("80-").is_err());
        assert!(parse_ports("-80").is_err());
        assert!(parse_ports("90-80").is_err());
        assert!(parse_ports("70000").is_err());
    }

    #[test]
    fn options_follow_flags() {
        let args = scan_args(&[
            "--cidr",
            "10.0.0.0/24",
            "-p",
            "443,8443",
            "--suffix",
            "6",
            "--timeout",
            "3",
            "--jarm",
            "--jarm-threads",
            "7",
            "--server-header",
        ]);
        let opts = build_options(&args).unwrap();
        assert_eq!(opts.ports, vec![443, 8443]);
        assert_eq!(opts.cidr_suffix, 6);
        assert_eq!(opts.timeout, Duration::from_secs(3));
        assert!(opts.jarm.enabled);
        assert_eq!(opts.jarm.workers, 7);
        assert!(opts.server_header.enabled);
        assert_eq!(opts.server_header.workers, 10);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn zero_workers_rejected() {
        let opts = build_options(&scan_args(&["-t", "0"])).unwrap();
        assert!(opts.validate().is_err());
    }

    #[tokio::test]
    async fn bad_regex_fails_before_scanning() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.log");
        let args = scan_args(&[
            "--cidr",
            "192.0.2.0/30",
            "-k",
            "(unclosed",
            "-o",
            out.to_str().unwrap(),
        ]);
        assert!(run_scan(args).await.is_err());
        // nothing was opened
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn missing_cidr_input_is_fatal() {
        assert!(run_scan(scan_args(&[])).await.is_err());
    }
}
