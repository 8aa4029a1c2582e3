use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

/// Server settings, read once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub addr: SocketAddr,
    /// Root of the publicly served tree. Artifacts live in `<root>/maps`.
    pub public_root: PathBuf,
    /// Generator executable, e.g. `python`.
    pub program: String,
    /// Arguments placed before the selection, e.g. the script path.
    pub leading_args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// Upper bound on one generator run before it is killed.
    pub timeout: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let raw_addr = lookup("MAPGEN_ADDR").unwrap_or_else(|| "127.0.0.1:5000".to_string());
        let addr: SocketAddr = raw_addr
            .parse()
            .with_context(|| format!("invalid MAPGEN_ADDR {raw_addr:?}"))?;

        let public_root = lookup("MAPGEN_PUBLIC_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("public"));
        let program = lookup("MAPGEN_PROGRAM").unwrap_or_else(|| "python".to_string());
        let leading_args = lookup("MAPGEN_SCRIPT")
            .unwrap_or_else(|| "scripts/mapGenerator.py".to_string())
            .split_whitespace()
            .map(str::to_string)
            .collect();
        let working_dir = lookup("MAPGEN_WORKDIR")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);
        let timeout_secs = lookup("MAPGEN_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(300);

        Ok(Self {
            addr,
            public_root,
            program,
            leading_args,
            working_dir,
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    pub fn maps_dir(&self) -> PathBuf {
        self.public_root.join("maps")
    }
}
