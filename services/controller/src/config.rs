//! Configuration for the schedule controller.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use kss_reconcile::{DEFAULT_RELIST_INTERVAL, DEFAULT_RESYNC_INTERVAL, DEFAULT_WORKERS};

use crate::controller::ControllerConfig;

/// Default location of Schedule manifests.
pub const DEFAULT_SCHEDULES_PATH: &str = "/etc/kss/schedules";

/// Default timeout of a scale call.
pub const DEFAULT_SCALE_TIMEOUT: Duration = Duration::from_secs(10);

/// Schedule controller configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of reconcile workers.
    pub workers: usize,

    /// Interval between full resyncs.
    pub resync_interval: Duration,

    /// Interval between relists of the schedule source.
    pub relist_interval: Duration,

    /// Manifest file or directory holding Schedules.
    pub schedules_path: PathBuf,

    /// Scale API base URL. Scaling is a dry run when unset.
    pub api_server: Option<String>,

    /// File holding the bearer token for the scale API.
    pub token_path: Option<PathBuf>,

    /// Timeout of a single scale call.
    pub scale_timeout: Duration,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let workers = parse_var(&var, "KSS_WORKERS")?.unwrap_or(DEFAULT_WORKERS);
        if workers == 0 {
            bail!("KSS_WORKERS must be greater than zero");
        }

        let resync_interval = parse_var(&var, "KSS_RESYNC_INTERVAL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_RESYNC_INTERVAL);

        let relist_interval = parse_var(&var, "KSS_RELIST_INTERVAL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_RELIST_INTERVAL);

        let scale_timeout = parse_var(&var, "KSS_SCALE_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_SCALE_TIMEOUT);

        for (name, interval) in [
            ("KSS_RESYNC_INTERVAL_SECS", resync_interval),
            ("KSS_RELIST_INTERVAL_SECS", relist_interval),
            ("KSS_SCALE_TIMEOUT_SECS", scale_timeout),
        ] {
            if interval.is_zero() {
                bail!("{} must be greater than zero", name);
            }
        }

        let schedules_path = var("KSS_SCHEDULES_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SCHEDULES_PATH));

        let api_server = var("KSS_API_SERVER");
        let token_path = var("KSS_TOKEN_PATH").map(PathBuf::from);

        let log_level = var("KSS_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            workers,
            resync_interval,
            relist_interval,
            schedules_path,
            api_server,
            token_path,
            scale_timeout,
            log_level,
        })
    }

    /// Returns true when no scale API is configured.
    pub fn dry_run(&self) -> bool {
        self.api_server.is_none()
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            workers: self.workers,
            resync_interval: self.resync_interval,
        }
    }

    /// Read the bearer token, if one is configured.
    pub fn read_token(&self) -> Result<Option<String>> {
        let Some(path) = &self.token_path else {
            return Ok(None);
        };
        let token = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read token file {}", path.display()))?;
        Ok(Some(token.trim().to_string()))
    }
}

fn parse_var<T>(var: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    var(name)
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .with_context(|| format!("invalid value for {}: {:?}", name, value))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.workers, 2);
        assert_eq!(config.resync_interval, Duration::from_secs(30));
        assert_eq!(config.relist_interval, Duration::from_secs(60));
        assert_eq!(config.scale_timeout, Duration::from_secs(10));
        assert_eq!(config.schedules_path, PathBuf::from(DEFAULT_SCHEDULES_PATH));
        assert_eq!(config.log_level, "info");
        assert!(config.dry_run());
        assert!(config.read_token().unwrap().is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("KSS_WORKERS", "8"),
            ("KSS_RESYNC_INTERVAL_SECS", "5"),
            ("KSS_API_SERVER", "https://10.0.0.1:6443"),
            ("KSS_SCHEDULES_PATH", "/tmp/schedules.yaml"),
        ])
        .unwrap();

        assert_eq!(config.workers, 8);
        assert!(!config.dry_run());

        let controller = config.controller_config();
        assert_eq!(controller.workers, 8);
        assert_eq!(controller.resync_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_values_are_errors() {
        assert!(config(&[("KSS_WORKERS", "0")]).is_err());
        assert!(config(&[("KSS_WORKERS", "two")]).is_err());
        assert!(config(&[("KSS_RESYNC_INTERVAL_SECS", "-1")]).is_err());
        assert!(config(&[("KSS_SCALE_TIMEOUT_SECS", "0")]).is_err());
    }

    #[test]
    fn test_empty_values_use_defaults() {
        let config = config(&[("KSS_WORKERS", ""), ("KSS_API_SERVER", " ")]).unwrap();
        assert_eq!(config.workers, 2);
        assert!(config.dry_run());
    }

    #[test]
    fn test_read_token_trims() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        std::fs::write(&path, "abc123\n").unwrap();

        let config = config(&[("KSS_TOKEN_PATH", path.to_str().unwrap())]).unwrap();
        assert_eq!(config.read_token().unwrap().as_deref(), Some("abc123"));
    }
}
