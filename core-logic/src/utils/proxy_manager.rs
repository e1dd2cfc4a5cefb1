use crate::config::ProxyConfig;
use crate::error::InputError;
use crate::utils::wallet_manager::WalletManager;
use anyhow::Result;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{info, warn};

pub struct ProxyManager;

impl ProxyManager {
    const PROXY_PATTERN: &'static str =
        r"^([^:@\s]+):([^:@\s]+)@([a-zA-Z0-9.-]+|\d+\.\d+\.\d+\.\d+):(\d+)$";

    fn pattern() -> &'static Regex {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        PATTERN.get_or_init(|| {
            Regex::new(Self::PROXY_PATTERN).expect("proxy pattern is a valid regex")
        })
    }

    /// Parses one `user:pass@host:port` line. `line_no` is 1-based and only
    /// used for the error message.
    pub fn parse(value: &str, line_no: usize) -> Result<ProxyConfig, InputError> {
        let invalid = || InputError::InvalidProxy {
            line: line_no,
            value: value.to_string(),
        };

        let caps = Self::pattern().captures(value.trim()).ok_or_else(invalid)?;
        let port: u16 = caps[4].parse().map_err(|_| invalid())?;

        Ok(ProxyConfig {
            username: caps[1].to_string(),
            password: caps[2].to_string(),
            host: caps[3].to_string(),
            port,
        })
    }

    /// Loads proxies from a line-delimited file. A missing file means
    /// "no proxies"; a malformed line is fatal.
    pub fn load_proxies(path: &Path) -> Result<Vec<ProxyConfig>> {
        if !path.exists() {
            warn!("{} not found. Running without proxies.", path.display());
            return Ok(Vec::new());
        }

        let lines = WalletManager::read_lines(path)?;
        let mut proxies = Vec::with_capacity(lines.len());
        for (i, line) in lines.iter().enumerate() {
            proxies.push(Self::parse(line, i + 1)?);
        }

        info!("Loaded {} proxies from {}", proxies.len(), path.display());
        Ok(proxies)
    }
}
