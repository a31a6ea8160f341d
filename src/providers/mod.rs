//! Bundled provider adapters

pub mod alternative_me;
pub mod blockchair;
pub mod coingecko;
pub mod coinmarketcap;
pub mod cryptopanic;
pub mod etherscan;
pub mod hyperliquid;
pub mod newsapi;
pub mod solana_rpc;
pub mod whale_alert;

pub use alternative_me::AlternativeMeProvider;
pub use blockchair::BlockchairProvider;
pub use coingecko::CoinGeckoProvider;
pub use coinmarketcap::CoinMarketCapProvider;
pub use cryptopanic::CryptoPanicProvider;
pub use etherscan::EtherscanProvider;
pub use hyperliquid::HyperliquidProvider;
pub use newsapi::NewsApiProvider;
pub use solana_rpc::SolanaRpcProvider;
pub use whale_alert::WhaleAlertProvider;

use std::str::FromStr;
use std::sync::Arc;

use crate::constants::{
    ALTERNATIVE_ME_API_URL, BLOCKCHAIR_API_URL, COINGECKO_API_URL, COINMARKETCAP_API_URL,
    CRYPTOPANIC_API_URL, ETHERSCAN_API_URL, HYPERLIQUID_API_URL, NEWSAPI_API_URL,
    SOLANA_RPC_URL, WHALE_ALERT_API_URL,
};
use crate::error::{ConfigError, ProviderError};
use crate::provider::ProviderAdapter;
use crate::types::Category;

/// Adapters shipped with the crate, addressable by name from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    CoinGecko,
    Hyperliquid,
    AlternativeMe,
    CoinMarketCap,
    CryptoPanic,
    NewsApi,
    WhaleAlert,
    Blockchair,
    Etherscan,
    SolanaRpc,
}

/// Whether an adapter needs a credential to be usable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRequirement {
    None,
    Optional,
    Required,
}

impl ProviderKind {
    pub fn all() -> &'static [ProviderKind] {
        &[
            ProviderKind::CoinGecko,
            ProviderKind::Hyperliquid,
            ProviderKind::AlternativeMe,
            ProviderKind::CoinMarketCap,
            ProviderKind::CryptoPanic,
            ProviderKind::NewsApi,
            ProviderKind::WhaleAlert,
            ProviderKind::Blockchair,
            ProviderKind::Etherscan,
            ProviderKind::SolanaRpc,
        ]
    }

    /// Configuration name, identical to the adapter's `provider_name`
    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::CoinGecko => "coingecko",
            ProviderKind::Hyperliquid => "hyperliquid",
            ProviderKind::AlternativeMe => "alternative_me",
            ProviderKind::CoinMarketCap => "coinmarketcap",
            ProviderKind::CryptoPanic => "cryptopanic",
            ProviderKind::NewsApi => "newsapi",
            ProviderKind::WhaleAlert => "whale_alert",
            ProviderKind::Blockchair => "blockchair",
            ProviderKind::Etherscan => "etherscan",
            ProviderKind::SolanaRpc => "solana_rpc",
        }
    }

    pub fn categories(&self) -> &'static [Category] {
        match self {
            ProviderKind::CoinGecko | ProviderKind::Hyperliquid => &[Category::Market],
            ProviderKind::AlternativeMe | ProviderKind::CoinMarketCap => &[Category::Sentiment],
            ProviderKind::CryptoPanic | ProviderKind::NewsApi => &[Category::News],
            ProviderKind::WhaleAlert => &[Category::Whale],
            ProviderKind::Blockchair => &[Category::Whale, Category::Blockchain],
            ProviderKind::Etherscan | ProviderKind::SolanaRpc => &[Category::Blockchain],
        }
    }

    pub fn key_requirement(&self) -> KeyRequirement {
        match self {
            ProviderKind::Hyperliquid | ProviderKind::AlternativeMe | ProviderKind::SolanaRpc => {
                KeyRequirement::None
            }
            ProviderKind::CoinGecko | ProviderKind::Blockchair => KeyRequirement::Optional,
            ProviderKind::CoinMarketCap
            | ProviderKind::CryptoPanic
            | ProviderKind::NewsApi
            | ProviderKind::WhaleAlert
            | ProviderKind::Etherscan => KeyRequirement::Required,
        }
    }

    /// Environment variable conventionally holding the credential
    pub fn default_api_key_env(&self) -> Option<&'static str> {
        match self {
            ProviderKind::CoinGecko => Some("COINGECKO_API_KEY"),
            ProviderKind::CoinMarketCap => Some("COINMARKETCAP_API_KEY"),
            ProviderKind::CryptoPanic => Some("CRYPTOPANIC_API_KEY"),
            ProviderKind::NewsApi => Some("NEWSAPI_API_KEY"),
            ProviderKind::WhaleAlert => Some("WHALE_ALERT_API_KEY"),
            ProviderKind::Blockchair => Some("BLOCKCHAIR_API_KEY"),
            ProviderKind::Etherscan => Some("ETHERSCAN_API_KEY"),
            ProviderKind::Hyperliquid | ProviderKind::AlternativeMe | ProviderKind::SolanaRpc => {
                None
            }
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::CoinGecko => COINGECKO_API_URL,
            ProviderKind::Hyperliquid => HYPERLIQUID_API_URL,
            ProviderKind::AlternativeMe => ALTERNATIVE_ME_API_URL,
            ProviderKind::CoinMarketCap => COINMARKETCAP_API_URL,
            ProviderKind::CryptoPanic => CRYPTOPANIC_API_URL,
            ProviderKind::NewsApi => NEWSAPI_API_URL,
            ProviderKind::WhaleAlert => WHALE_ALERT_API_URL,
            ProviderKind::Blockchair => BLOCKCHAIR_API_URL,
            ProviderKind::Etherscan => ETHERSCAN_API_URL,
            ProviderKind::SolanaRpc => SOLANA_RPC_URL,
        }
    }

    /// Constructs the adapter
    ///
    /// `api_key` is ignored by keyless adapters; a missing key for an
    /// adapter that requires one is a configuration error.
    pub fn build(
        &self,
        base_url: Option<&str>,
        api_key: Option<String>,
    ) -> Result<Arc<dyn ProviderAdapter>, ConfigError> {
        let base_url = base_url.unwrap_or_else(|| self.default_base_url());
        let name = self.name();
        let required_key = || {
            api_key.clone().ok_or_else(|| {
                ConfigError::invalid(format!("provider {name} requires an API key"))
            })
        };

        let client_err = |e: ProviderError| ConfigError::HttpClient(e.to_string());

        let adapter: Arc<dyn ProviderAdapter> = match self {
            ProviderKind::CoinGecko => {
                let provider = CoinGeckoProvider::with_base_url(base_url).map_err(client_err)?;
                Arc::new(match api_key.clone() {
                    Some(key) => provider.with_api_key(key),
                    None => provider,
                })
            }
            ProviderKind::Hyperliquid => {
                Arc::new(HyperliquidProvider::with_base_url(base_url).map_err(client_err)?)
            }
            ProviderKind::AlternativeMe => {
                Arc::new(AlternativeMeProvider::with_base_url(base_url).map_err(client_err)?)
            }
            ProviderKind::CoinMarketCap => Arc::new(
                CoinMarketCapProvider::with_base_url(base_url, required_key()?)
                    .map_err(client_err)?,
            ),
            ProviderKind::CryptoPanic => Arc::new(
                CryptoPanicProvider::with_base_url(base_url, required_key()?)
                    .map_err(client_err)?,
            ),
            ProviderKind::NewsApi => Arc::new(
                NewsApiProvider::with_base_url(base_url, required_key()?).map_err(client_err)?,
            ),
            ProviderKind::WhaleAlert => Arc::new(
                WhaleAlertProvider::with_base_url(base_url, required_key()?)
                    .map_err(client_err)?,
            ),
            ProviderKind::Blockchair => {
                let provider = BlockchairProvider::with_base_url(base_url).map_err(client_err)?;
                Arc::new(match api_key.clone() {
                    Some(key) => provider.with_api_key(key),
                    None => provider,
                })
            }
            ProviderKind::Etherscan => Arc::new(
                EtherscanProvider::with_base_url(base_url, required_key()?)
                    .map_err(client_err)?,
            ),
            ProviderKind::SolanaRpc => {
                Arc::new(SolanaRpcProvider::with_base_url(base_url).map_err(client_err)?)
            }
        };

        Ok(adapter)
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        ProviderKind::all()
            .iter()
            .find(|kind| kind.name() == name)
            .copied()
            .ok_or_else(|| ConfigError::UnknownProvider(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for kind in ProviderKind::all() {
            assert_eq!(kind.name().parse::<ProviderKind>().unwrap(), *kind);
        }
        assert!(matches!(
            "binance".parse::<ProviderKind>(),
            Err(ConfigError::UnknownProvider(_))
        ));
    }

    #[test]
    fn test_built_adapters_match_table() {
        for kind in ProviderKind::all() {
            let adapter = kind.build(None, Some("key".to_string())).unwrap();
            assert_eq!(adapter.provider_name(), kind.name());
            assert_eq!(adapter.categories(), kind.categories());
        }
    }

    #[test]
    fn test_required_key_is_enforced() {
        assert!(matches!(
            ProviderKind::Etherscan.build(None, None),
            Err(ConfigError::Invalid(_))
        ));
        assert!(ProviderKind::CoinGecko.build(None, None).is_ok());
        assert!(ProviderKind::SolanaRpc.build(None, None).is_ok());
    }
}
