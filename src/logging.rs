//! Tracing setup: readable lines on stderr, plus JSON `combined.log` and
//! `error.log` files when a log directory is configured.

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

pub fn init(log_dir: Option<&Path>) -> Result<()> {
    let stderr = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        );

    let (combined, errors) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory {}", dir.display()))?;
            let combined = fmt::layer()
                .json()
                .with_writer(Arc::new(open_log(&dir.join("combined.log"))?))
                .with_filter(LevelFilter::INFO);
            let errors = fmt::layer()
                .json()
                .with_writer(Arc::new(open_log(&dir.join("error.log"))?))
                .with_filter(LevelFilter::ERROR);
            (Some(combined), Some(errors))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr)
        .with(combined)
        .with(errors)
        .try_init()
        .context("failed to install tracing subscriber")
}

fn open_log(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))
}
