use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// Console output filtered by `RUST_LOG` (default `info`), plus a debug-level
/// session log at `<dir>/<session>.log`.
pub fn init(dir: &Path, session: &str) -> Result<PathBuf> {
    let (path, file) = open_session_log(dir, session)?;

    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));

    let session_log = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .with_filter(EnvFilter::new("info,bgpstage=debug"));

    tracing_subscriber::registry()
        .with(console)
        .with(session_log)
        .try_init()
        .context("failed to install tracing subscriber")?;
    Ok(path)
}

/// Open `<dir>/<session>.log` for appending. Reruns of a session keep the
/// earlier runs' lines.
fn open_session_log(dir: &Path, session: &str) -> Result<(PathBuf, File)> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;
    let path = dir.join(format!("{session}.log"));
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    Ok((path, file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn session_log_appends_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");

        let (path, mut file) = open_session_log(&logs, "cluster_1").unwrap();
        writeln!(file, "first run").unwrap();
        drop(file);

        let (again, mut file) = open_session_log(&logs, "cluster_1").unwrap();
        assert_eq!(again, path);
        writeln!(file, "second run").unwrap();
        drop(file);

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "first run\nsecond run\n");
    }
}
