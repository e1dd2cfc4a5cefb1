//! # Chain/Token Registry
//!
//! Immutable catalog of supported chains, built once at startup and passed
//! by reference to everything that resolves a chain name.

use core_logic::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Supported chains, in the fixed registry order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainName {
    Arbitrum,
    Base,
    Bsc,
    Optimism,
    Polygon,
    Linea,
    Zkera,
    Ethereum,
}

impl ChainName {
    pub const ALL: [ChainName; 8] = [
        ChainName::Arbitrum,
        ChainName::Base,
        ChainName::Bsc,
        ChainName::Optimism,
        ChainName::Polygon,
        ChainName::Linea,
        ChainName::Zkera,
        ChainName::Ethereum,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChainName::Arbitrum => "arbitrum",
            ChainName::Base => "base",
            ChainName::Bsc => "bsc",
            ChainName::Optimism => "optimism",
            ChainName::Polygon => "polygon",
            ChainName::Linea => "linea",
            ChainName::Zkera => "zkera",
            ChainName::Ethereum => "ethereum",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for ChainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownChain(pub String);

impl fmt::Display for UnknownChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown chain '{}'", self.0)
    }
}

impl std::error::Error for UnknownChain {}

impl FromStr for ChainName {
    type Err = UnknownChain;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        ChainName::ALL
            .into_iter()
            .find(|name| name.as_str() == lowered)
            .ok_or_else(|| UnknownChain(s.to_string()))
    }
}

/// A token on one chain. Identity is the symbol alone, so tokens from
/// different chains must never be compared with each other.
#[derive(Debug, Clone)]
pub struct Token {
    pub symbol: &'static str,
    pub decimals: u8,
    pub is_native: bool,
    pub contract_address: &'static str,
    pub price_id: Option<&'static str>,
    /// Decimal places used for display and for rounding send amounts.
    pub round_to: u32,
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.symbol == other.symbol
    }
}

impl Eq for Token {}

impl Token {
    const fn native(symbol: &'static str, price_id: &'static str, round_to: u32) -> Self {
        Self {
            symbol,
            decimals: 18,
            is_native: true,
            contract_address: ZERO_ADDRESS,
            price_id: Some(price_id),
            round_to,
        }
    }

    const fn usdc(contract_address: &'static str, decimals: u8) -> Self {
        Self {
            symbol: "usdc",
            decimals,
            is_native: false,
            contract_address,
            price_id: Some("33285"),
            round_to: 3,
        }
    }

    /// Rounds an amount to this token's display precision.
    pub fn round(&self, amount: f64) -> f64 {
        round_to(amount, self.round_to)
    }

    /// True when `amount` would be shown (and sent) as zero.
    pub fn is_dust(&self, amount: f64) -> bool {
        self.round(amount) <= 0.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.symbol.to_uppercase())
    }
}

pub fn round_to(value: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (value * factor).round() / factor
}

#[derive(Debug, Clone)]
pub struct Chain {
    pub name: ChainName,
    pub chain_id: u64,
    pub coin_symbol: &'static str,
    pub explorer: &'static str,
    pub rpc: String,
    pub okx_chain_name: &'static str,
    pub okx_withdrawal_fee: f64,
    tokens: Vec<Token>,
}

impl Chain {
    pub fn native_token(&self) -> &Token {
        // Every built-in chain lists its native token first.
        &self.tokens[0]
    }

    pub fn token(&self, symbol: &str) -> Option<&Token> {
        self.tokens
            .iter()
            .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn tx_url(&self, tx_hash: &str) -> String {
        format!("{}tx/{}", self.explorer, tx_hash)
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name.as_str().to_uppercase())
    }
}

#[derive(Debug, Clone)]
pub struct ChainRegistry {
    chains: Vec<Chain>,
}

impl ChainRegistry {
    /// Built-in catalog with public RPC endpoints, overridden per chain by
    /// `rpc_overrides`. Every endpoint must be a valid URL.
    pub fn new(rpc_overrides: &HashMap<ChainName, String>) -> Result<Self, ConfigError> {
        let mut chains = builtin_chains();
        for chain in &mut chains {
            if let Some(rpc) = rpc_overrides.get(&chain.name) {
                chain.rpc = rpc.trim().to_string();
            }
            if chain.rpc.is_empty() {
                return Err(ConfigError::MissingField {
                    field: format!("rpc.{}", chain.name),
                });
            }
            url::Url::parse(&chain.rpc).map_err(|e| ConfigError::InvalidValue {
                field: format!("rpc.{}", chain.name),
                reason: e.to_string(),
            })?;
        }
        Ok(Self { chains })
    }

    /// Registry with the built-in endpoints only.
    pub fn builtin() -> Self {
        Self {
            chains: builtin_chains(),
        }
    }

    pub fn get_chain_by_name(&self, name: &str) -> Option<&Chain> {
        name.parse::<ChainName>().ok().map(|n| self.chain(n))
    }

    pub fn chain(&self, name: ChainName) -> &Chain {
        &self.chains[name.index()]
    }

    pub fn get_chains(&self) -> &[Chain] {
        &self.chains
    }
}

fn builtin_chains() -> Vec<Chain> {
    let eth = || Token::native("eth", "80", 6);

    let chains = vec![
        Chain {
            name: ChainName::Arbitrum,
            chain_id: 42161,
            coin_symbol: "eth",
            explorer: "https://arbiscan.io/",
            rpc: "https://rpc.ankr.com/arbitrum".into(),
            okx_chain_name: "Arbitrum One",
            okx_withdrawal_fee: 0.0001,
            tokens: vec![
                eth(),
                Token::usdc("0xaf88d065e77c8cC2239327C5EDb3A432268e5831", 6),
            ],
        },
        Chain {
            name: ChainName::Base,
            chain_id: 8453,
            coin_symbol: "eth",
            explorer: "https://basescan.org/",
            rpc: "https://base-mainnet.public.blastapi.io".into(),
            okx_chain_name: "Base",
            okx_withdrawal_fee: 0.00004,
            tokens: vec![
                eth(),
                Token::usdc("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913", 6),
            ],
        },
        Chain {
            name: ChainName::Bsc,
            chain_id: 56,
            coin_symbol: "bnb",
            explorer: "https://bscscan.com/",
            rpc: "https://bsc-rpc.publicnode.com".into(),
            okx_chain_name: "BSC",
            okx_withdrawal_fee: 0.002,
            tokens: vec![
                Token::native("bnb", "2710", 6),
                Token::usdc("0x8AC76a51cc950d9822D68b83fE1Ad97B32Cd580d", 18),
            ],
        },
        Chain {
            name: ChainName::Optimism,
            chain_id: 10,
            coin_symbol: "eth",
            explorer: "https://optimistic.etherscan.io/",
            rpc: "https://rpc.ankr.com/optimism".into(),
            okx_chain_name: "Optimism",
            okx_withdrawal_fee: 0.00004,
            tokens: vec![
                eth(),
                Token::usdc("0x0b2C639c533813f4Aa9D7837CAf62653d097Ff85", 6),
            ],
        },
        Chain {
            name: ChainName::Polygon,
            chain_id: 137,
            coin_symbol: "matic",
            explorer: "https://polygonscan.com/",
            rpc: "https://1rpc.io/matic".into(),
            okx_chain_name: "Polygon",
            okx_withdrawal_fee: 0.1,
            tokens: vec![
                Token::native("matic", "33536", 4),
                Token::usdc("0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174", 6),
            ],
        },
        Chain {
            name: ChainName::Linea,
            chain_id: 59144,
            coin_symbol: "eth",
            explorer: "https://lineascan.build/",
            rpc: "https://linea.drpc.org".into(),
            okx_chain_name: "Linea",
            okx_withdrawal_fee: 0.0002,
            tokens: vec![
                eth(),
                Token::usdc("0x176211869cA2b568f2A7D4EE941E073a821EE1ff", 6),
            ],
        },
        Chain {
            name: ChainName::Zkera,
            chain_id: 324,
            coin_symbol: "eth",
            explorer: "https://explorer.zksync.io/",
            rpc: "https://mainnet.era.zksync.io".into(),
            okx_chain_name: "zkSync Era",
            okx_withdrawal_fee: 0.000041,
            tokens: vec![
                eth(),
                Token::usdc("0x3355df6D4c9C3035724Fd0e3914dE96A5a83aaf4", 6),
            ],
        },
        Chain {
            name: ChainName::Ethereum,
            chain_id: 1,
            coin_symbol: "eth",
            explorer: "https://etherscan.io/",
            rpc: "https://rpc.ankr.com/eth".into(),
            okx_chain_name: "ERC20",
            okx_withdrawal_fee: 0.0008,
            tokens: vec![
                eth(),
                Token::usdc("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48", 6),
            ],
        },
    ];

    debug_assert!(chains
        .iter()
        .zip(ChainName::ALL)
        .all(|(c, n)| c.name == n));
    chains
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_matches_chain_name_index() {
        let registry = ChainRegistry::builtin();
        for name in ChainName::ALL {
            assert_eq!(registry.chain(name).name, name);
        }
        assert_eq!(registry.get_chains().len(), 8);
        assert_eq!(registry.get_chains()[0].name, ChainName::Arbitrum);
        assert_eq!(registry.get_chains()[7].name, ChainName::Ethereum);
    }

    #[test]
    fn test_lookup_by_name() {
        let registry = ChainRegistry::builtin();
        assert_eq!(registry.get_chain_by_name("base").unwrap().chain_id, 8453);
        assert_eq!(registry.get_chain_by_name("ZKERA").unwrap().chain_id, 324);
        assert!(registry.get_chain_by_name("solana").is_none());
    }

    #[test]
    fn test_native_tokens() {
        let registry = ChainRegistry::builtin();
        let polygon = registry.chain(ChainName::Polygon);
        assert_eq!(polygon.native_token().symbol, "matic");
        assert_eq!(polygon.native_token().round_to, 4);
        assert!(registry.chain(ChainName::Bsc).token("USDC").is_some());
        assert_eq!(registry.chain(ChainName::Bsc).token("usdc").unwrap().decimals, 18);
    }

    #[test]
    fn test_token_dust_uses_display_precision() {
        let eth = ChainRegistry::builtin()
            .chain(ChainName::Base)
            .native_token()
            .clone();
        assert!(eth.is_dust(0.0000004));
        assert!(!eth.is_dust(0.000001));
        assert_eq!(eth.round(0.1234567), 0.123457);
    }

    #[test]
    fn test_rpc_override_must_be_a_url() {
        let mut overrides = HashMap::new();
        overrides.insert(ChainName::Base, "not a url".to_string());
        assert!(ChainRegistry::new(&overrides).is_err());

        overrides.insert(ChainName::Base, "https://base.example.org".to_string());
        let registry = ChainRegistry::new(&overrides).unwrap();
        assert_eq!(registry.chain(ChainName::Base).rpc, "https://base.example.org");
    }
}
