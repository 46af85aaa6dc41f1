//! Startup settings, read from flags with environment fallbacks.
//!
//! Every value can come from the connector's `n8n_*` environment variables
//! (optionally via a `.env` file). Anything missing or invalid stops the
//! process before it serves a single request.

use anyhow::{Context, Result, bail};
use clap::Args;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use crate::auth::{Algorithm, Authenticator};
use crate::consts::{DEFAULT_PORT, DEFAULT_TIMEOUT_MINUTES, minutes};
use crate::tasks::{ExecutorConfig, ProcessSettings, RegistryPaths};

#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// Base32 TOTP secret shared with the orchestrator
    #[arg(long, env = "n8n_SECRET_PASSPHRASE", hide_env_values = true)]
    pub secret: String,

    /// HMAC algorithm used to derive one-time codes
    #[arg(long, env = "n8n_TOTP_ALGORITHM", value_enum, default_value_t = Algorithm::Sha1)]
    pub totp_algorithm: Algorithm,

    /// Executable that runs fusion programs
    #[arg(long, env = "n8n_UV_EXE")]
    pub fusion_exe: PathBuf,

    /// Working directory for fusion tasks
    #[arg(long, env = "n8n_FUSION_DIRECTORY")]
    pub fusion_dir: PathBuf,

    /// Fusion task time limit in minutes
    #[arg(long, env = "n8n_FUSION_TIMEOUT_MINUTES", default_value_t = DEFAULT_TIMEOUT_MINUTES)]
    pub fusion_timeout_minutes: u64,

    /// Working directory for script tasks
    #[arg(long, env = "n8n_SCRIPT_DIRECTORY")]
    pub script_dir: PathBuf,

    /// Script task time limit in minutes
    #[arg(long, env = "n8n_SCRIPT_TIMEOUT_MINUTES", default_value_t = DEFAULT_TIMEOUT_MINUTES)]
    pub script_timeout_minutes: u64,

    /// JSON file of fusion tasks
    #[arg(long, env = "n8n_FUSION_TASKS")]
    pub fusion_tasks: PathBuf,

    /// JSON file of script tasks
    #[arg(long, env = "n8n_SCRIPT_TASKS")]
    pub script_tasks: PathBuf,

    /// JSON file of write-file tasks
    #[arg(long, env = "n8n_WRITE_FILE_TASKS")]
    pub write_file_tasks: PathBuf,

    /// Directory for combined.log and error.log (stderr only when unset)
    #[arg(long, env = "n8n_LOG_DIRECTORY")]
    pub log_dir: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, env = "n8n_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(long, env = "n8n_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
}

impl Settings {
    /// Check what clap cannot: positive time limits, existing directories.
    pub fn validate(&self) -> Result<()> {
        if self.fusion_timeout_minutes == 0 {
            bail!("fusion timeout must be at least one minute");
        }
        if self.script_timeout_minutes == 0 {
            bail!("script timeout must be at least one minute");
        }
        require_dir("fusion working directory", &self.fusion_dir)?;
        require_dir("script working directory", &self.script_dir)?;
        Ok(())
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn authenticator(&self) -> Authenticator {
        Authenticator::new(self.secret.clone(), self.totp_algorithm)
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            fusion_exe: self.fusion_exe.clone(),
            fusion: ProcessSettings {
                working_dir: self.fusion_dir.clone(),
                timeout: minutes(self.fusion_timeout_minutes),
            },
            script: ProcessSettings {
                working_dir: self.script_dir.clone(),
                timeout: minutes(self.script_timeout_minutes),
            },
        }
    }

    pub fn registry_paths(&self) -> RegistryPaths {
        RegistryPaths {
            fusion: self.fusion_tasks.clone(),
            script: self.script_tasks.clone(),
            write_file: self.write_file_tasks.clone(),
        }
    }
}

fn require_dir(what: &str, path: &Path) -> Result<()> {
    let meta = std::fs::metadata(path)
        .with_context(|| format!("{what} {} is not accessible", path.display()))?;
    if !meta.is_dir() {
        bail!("{what} {} is not a directory", path.display());
    }
    Ok(())
}

/// Load `.env` from the working directory if there is one.
pub fn load_dotenv() -> Result<()> {
    match dotenvy::dotenv() {
        Ok(_) => Ok(()),
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(e).context("failed to load .env"),
    }
}
