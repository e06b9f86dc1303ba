//! Output file lifecycle and summary formatting

use std::io;
use std::path::Path;
use std::time::Duration;
use tokio::fs::{File, OpenOptions};

use sslsearch_common::{SslSearchError, SslSearchResult};

/// Open the results file. An existing file is only replaced with `overwrite`.
pub async fn open_output(path: &Path, overwrite: bool) -> SslSearchResult<File> {
    let mut opts = OpenOptions::new();
    opts.write(true);
    if overwrite {
        opts.create(true).truncate(true);
    } else {
        opts.create_new(true);
    }

    opts.open(path).await.map_err(|e| match e.kind() {
        io::ErrorKind::AlreadyExists => SslSearchError::Output(format!(
            "{} already exists, pass --overwrite to replace it",
            path.display()
        )),
        _ => SslSearchError::Output(format!("cannot open {}: {}", path.display(), e)),
    })
}

/// Format duration in a human-readable way
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if total_secs == 0 {
        format!("{}ms", millis)
    } else if total_secs < 60 {
        if millis > 0 {
            format!("{}.{:03}s", total_secs, millis)
        } else {
            format!("{}s", total_secs)
        }
    } else if total_secs < 3600 {
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        if secs > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}m", mins)
        }
    } else {
        let hours = total_secs / 3600;
        let mins = (total_secs % 3600) / 60;
        format!("{}h {}m", hours, mins)
    }
}
