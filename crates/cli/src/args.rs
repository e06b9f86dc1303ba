use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sslsearch")]
#[command(version)]
#[command(
    about = "Search cloud CIDR ranges for TLS certificates matching a keyword",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Enable trace logging
    #[arg(long, global = true)]
    pub trace: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan CIDR ranges for matching certificates
    Scan(ScanArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ScanArgs {
    /// CIDR blocks, comma separated. Example: 3.5.140.0/22,13.34.37.64/27=ap-southeast-4
    #[arg(long)]
    pub cidr: Option<String>,

    /// File with one `CIDR [region]` per line, `-` for stdin
    #[arg(long)]
    pub cidr_file: Option<PathBuf>,

    /// Regex searched in the certificate subject and SANs
    #[arg(short = 'k', long, default_value = ".*")]
    pub keyword_regex: String,

    /// Regex the region must match
    #[arg(short = 'r', long, default_value = ".*")]
    pub region_regex: String,

    /// Ports to probe. Examples: 443 or 443,8443 or 8000-8010
    #[arg(short, long, default_value = "443")]
    pub ports: String,

    /// Output file, one JSON record per line
    #[arg(short, long, default_value = "output.log")]
    pub out: PathBuf,

    /// Overwrite the output file if it exists
    #[arg(long)]
    pub overwrite: bool,

    /// Scan workers
    #[arg(short = 't', long, default_value = "2000")]
    pub threads: usize,

    /// Each worker unit covers 2^suffix addresses
    #[arg(long, default_value = "4")]
    pub suffix: u8,

    /// TCP/TLS timeout in seconds
    #[arg(long, default_value = "10")]
    pub timeout: u64,

    /// Echo results to stdout
    #[arg(long)]
    pub console_out: bool,

    /// Enrich results with the HTTP Server header
    #[arg(long)]
    pub server_header: bool,

    /// Workers for server header enrichment
    #[arg(long, default_value = "10")]
    pub server_header_threads: usize,

    /// Enrich results with the JARM fingerprint
    #[arg(long)]
    pub jarm: bool,

    /// Attempts per JARM fingerprint
    #[arg(long, default_value = "3")]
    pub jarm_retry_count: u32,

    /// Workers for JARM enrichment
    #[arg(long, default_value = "50")]
    pub jarm_threads: usize,

    /// Seconds between progress lines (0 disables)
    #[arg(long, default_value = "10")]
    pub progress_interval: u64,
}
