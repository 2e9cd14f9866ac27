//! Orchestrator configuration
//!
//! Settings for the HTTP surface, the batch worker pool and the result cache.
//! Everything has a default; environment variables override them.

use phantast_engine::CacheLimits;
use std::net::SocketAddr;

/// Upper bound on the batch worker pool
pub const MAX_WORKERS: usize = 64;

/// Orchestrator configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Address the HTTP API listens on (e.g., "0.0.0.0:8080")
    pub bind_addr: String,

    /// Number of files processed concurrently by a batch job
    pub workers: usize,

    /// Maximum number of cached step results
    pub cache_max_entries: usize,

    /// Optional bound on the approximate bytes held by the cache
    pub cache_max_bytes: Option<usize>,

    /// Sub-folder of the input folder used when a job names no output folder
    pub output_dir_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            workers: 2,
            cache_max_entries: CacheLimits::default().max_entries,
            cache_max_bytes: None,
            output_dir_name: "processed".to_string(),
        }
    }
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - PHANTAST_BIND_ADDR (default: 0.0.0.0:8080)
    /// - PHANTAST_WORKERS (default: 2)
    /// - PHANTAST_CACHE_MAX_ENTRIES (default: 512)
    /// - PHANTAST_CACHE_MAX_BYTES (default: unbounded)
    /// - PHANTAST_OUTPUT_DIR_NAME (default: processed)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from any key lookup, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let bind_addr = lookup("PHANTAST_BIND_ADDR").unwrap_or(defaults.bind_addr);
        let workers = parse_var(&lookup, "PHANTAST_WORKERS")?.unwrap_or(defaults.workers);
        let cache_max_entries = parse_var(&lookup, "PHANTAST_CACHE_MAX_ENTRIES")?
            .unwrap_or(defaults.cache_max_entries);
        let cache_max_bytes = parse_var(&lookup, "PHANTAST_CACHE_MAX_BYTES")?;
        let output_dir_name =
            lookup("PHANTAST_OUTPUT_DIR_NAME").unwrap_or(defaults.output_dir_name);

        Ok(Self {
            bind_addr,
            workers,
            cache_max_entries,
            cache_max_bytes,
            output_dir_name,
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_addr.parse::<SocketAddr>().is_err() {
            anyhow::bail!("bind_addr '{}' is not a valid socket address", self.bind_addr);
        }

        if self.workers == 0 || self.workers > MAX_WORKERS {
            anyhow::bail!("workers must be between 1 and {}", MAX_WORKERS);
        }

        if self.cache_max_entries == 0 {
            anyhow::bail!("cache_max_entries must be greater than 0");
        }

        if self.cache_max_bytes == Some(0) {
            anyhow::bail!("cache_max_bytes must be greater than 0 when set");
        }

        let name = self.output_dir_name.trim();
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            anyhow::bail!("output_dir_name must be a plain folder name");
        }

        Ok(())
    }

    pub fn cache_limits(&self) -> CacheLimits {
        CacheLimits {
            max_entries: self.cache_max_entries,
            max_bytes: self.cache_max_bytes,
        }
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> anyhow::Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{} has invalid value '{}': {}", key, raw, e)),
        None => Ok(None),
    }
}
