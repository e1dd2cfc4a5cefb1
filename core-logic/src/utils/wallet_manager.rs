use crate::config::ProxyConfig;
use crate::error::{ConfigError, InputError};
use crate::utils::proxy_manager::ProxyManager;
use anyhow::Result;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::info;

/// Raw inputs a wallet batch is created from. Lists are positional: entry
/// `i` of each list belongs to the same wallet.
#[derive(Clone, Default)]
pub struct InputLists {
    pub private_keys: Vec<String>,
    pub proxies: Vec<ProxyConfig>,
    pub deposit_addresses: Vec<String>,
}

impl fmt::Debug for InputLists {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputLists")
            .field("private_keys", &format!("{} ***REDACTED***", self.private_keys.len()))
            .field("proxies", &self.proxies.len())
            .field("deposit_addresses", &self.deposit_addresses)
            .finish()
    }
}

pub struct WalletManager;

impl WalletManager {
    /// Reads a line-delimited list, skipping blank lines and `#` comments.
    pub fn read_lines(path: &Path) -> Result<Vec<String>, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            msg: e.to_string(),
        })?;

        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect())
    }

    /// Checks a private key is 32 bytes of hex, with or without `0x`.
    pub fn validate_key_format(key: &str, line_no: usize) -> Result<(), InputError> {
        let stripped = key.strip_prefix("0x").unwrap_or(key);
        match hex::decode(stripped) {
            Ok(bytes) if bytes.len() == 32 => Ok(()),
            _ => Err(InputError::InvalidKeyFormat { line: line_no }),
        }
    }

    /// Loads and validates the three input lists.
    ///
    /// With `replicate_proxy` set, the first proxy line is reused for every
    /// key (a rotating mobile proxy shared by the whole batch).
    pub fn load_inputs(
        keys_path: &Path,
        proxies_path: &Path,
        deposits_path: &Path,
        replicate_proxy: bool,
    ) -> Result<InputLists> {
        if !keys_path.exists() {
            return Err(ConfigError::FileNotFound {
                path: keys_path.display().to_string(),
            }
            .into());
        }

        let private_keys = Self::read_lines(keys_path)?;
        if private_keys.is_empty() {
            return Err(InputError::NoCredentials {
                path: keys_path.display().to_string(),
            }
            .into());
        }
        for (i, key) in private_keys.iter().enumerate() {
            Self::validate_key_format(key, i + 1)?;
        }

        let mut proxies = ProxyManager::load_proxies(proxies_path)?;
        if replicate_proxy {
            if let Some(first) = proxies.first().cloned() {
                proxies = vec![first; private_keys.len()];
            }
        }
        if proxies.len() > private_keys.len() {
            return Err(InputError::TooManyProxies {
                proxies: proxies.len(),
                keys: private_keys.len(),
            }
            .into());
        }

        let deposit_addresses = if deposits_path.exists() {
            Self::read_lines(deposits_path)?
        } else {
            Vec::new()
        };

        info!(
            "Loaded {} keys, {} proxies, {} deposit addresses",
            private_keys.len(),
            proxies.len(),
            deposit_addresses.len()
        );

        Ok(InputLists {
            private_keys,
            proxies,
            deposit_addresses,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const KEY_A: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
    const KEY_B: &str = "5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a";

    fn write_file(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_validate_key_format() {
        assert!(WalletManager::validate_key_format(KEY_A, 1).is_ok());
        assert!(WalletManager::validate_key_format(KEY_B, 1).is_ok());
        assert_eq!(
            WalletManager::validate_key_format("0x1234", 7),
            Err(InputError::InvalidKeyFormat { line: 7 })
        );
    }

    #[test]
    fn test_load_inputs_rejects_extra_proxies() {
        let dir = tempfile::tempdir().unwrap();
        let keys = write_file(dir.path(), "keys.txt", &format!("{}\n", KEY_A));
        let proxies = write_file(dir.path(), "proxies.txt", "a:b@h1:1\nc:d@h2:2\n");
        let deposits = dir.path().join("deposits.txt");

        let err = WalletManager::load_inputs(&keys, &proxies, &deposits, false).unwrap_err();
        assert!(err.to_string().contains("exceeds"));
    }

    #[test]
    fn test_load_inputs_replicates_mobile_proxy() {
        let dir = tempfile::tempdir().unwrap();
        let keys = write_file(
            dir.path(),
            "keys.txt",
            &format!("# comment\n{}\n\n{}\n", KEY_A, KEY_B),
        );
        let proxies = write_file(dir.path(), "proxies.txt", "a:b@mobile.host:9000\n");
        let deposits = dir.path().join("deposits.txt");

        let lists = WalletManager::load_inputs(&keys, &proxies, &deposits, true).unwrap();
        assert_eq!(lists.private_keys.len(), 2);
        assert_eq!(lists.proxies.len(), 2);
        assert_eq!(lists.proxies[1].host, "mobile.host");
        assert!(lists.deposit_addresses.is_empty());
    }
}
