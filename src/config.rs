// config.rs - Centralized configuration system

use log::debug;
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::aggregator::DEFAULT_DUST_THRESHOLD_USD;
use crate::connectors::hyperliquid::HYPERLIQUID_API_URL;
use crate::connectors::lighter::LIGHTER_API_URL;
use crate::connectors::ticker::BINANCE_SPOT_API_URL;
use crate::connectors::{BinanceTicker, ExecutorSet, HyperliquidClient, LighterClient, SshExecutor};
use crate::rebalancer::DEFAULT_BUFFER;
use crate::types::{AccountRef, EngineError, ExchangeFamily, Result};

/// Global configuration singleton
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Returns a reference to the global configuration.
/// If not yet initialized, uses the default configuration.
pub fn get_config() -> &'static Config {
    CONFIG.get().unwrap_or(&*DEFAULT_CONFIG)
}

/// Initializes configuration from the given file path.
pub async fn init_config<P: AsRef<Path>>(path: P) -> Result<()> {
    let config = Config::from_file(path).await?;
    CONFIG
        .set(config)
        .map_err(|_| EngineError::Config("Configuration already initialized".to_string()))
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub price: PriceConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub rebalance: RebalanceConfig,
    #[serde(default = "default_hyperliquid")]
    pub hyperliquid: HttpGatewayConfig,
    #[serde(default = "default_lighter")]
    pub lighter: HttpGatewayConfig,
    #[serde(default)]
    pub users: BTreeMap<String, UserConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,
    /// 未指定用户时使用
    pub default_user: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub ssh_host: String,
    pub run_script: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PriceConfig {
    pub api_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub dust_threshold_usd: Decimal,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RebalanceConfig {
    pub buffer: Decimal,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpGatewayConfig {
    pub api_url: String,
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UserConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub accounts: BTreeMap<String, AccountConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AccountConfig {
    /// 远端命令使用的key，缺省为账户id
    #[serde(default)]
    pub exchange_key: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub wallet_address: Option<String>,
}

fn default_http_timeout() -> u64 {
    10
}

fn default_hyperliquid() -> HttpGatewayConfig {
    HttpGatewayConfig {
        api_url: HYPERLIQUID_API_URL.to_string(),
        timeout_secs: default_http_timeout(),
    }
}

fn default_lighter() -> HttpGatewayConfig {
    HttpGatewayConfig {
        api_url: LIGHTER_API_URL.to_string(),
        timeout_secs: default_http_timeout(),
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        DEFAULT_CONFIG.general.clone()
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        DEFAULT_CONFIG.remote.clone()
    }
}

impl Default for PriceConfig {
    fn default() -> Self {
        DEFAULT_CONFIG.price.clone()
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        DEFAULT_CONFIG.display.clone()
    }
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        DEFAULT_CONFIG.rebalance.clone()
    }
}

/// Default configuration used when no config file is provided.
pub static DEFAULT_CONFIG: Lazy<Config> = Lazy::new(|| Config {
    general: GeneralConfig {
        log_level: String::from("info"),
        default_user: None,
    },
    remote: RemoteConfig {
        ssh_host: String::from("tixian"),
        run_script: String::from("./run.sh"),
        timeout_secs: 30,
    },
    price: PriceConfig {
        api_url: BINANCE_SPOT_API_URL.to_string(),
        timeout_secs: 5,
    },
    display: DisplayConfig {
        dust_threshold_usd: DEFAULT_DUST_THRESHOLD_USD,
    },
    rebalance: RebalanceConfig { buffer: DEFAULT_BUFFER },
    hyperliquid: default_hyperliquid(),
    lighter: default_lighter(),
    users: BTreeMap::new(),
});

impl Config {
    /// Load configuration from a file.
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file_format = path.as_ref().extension().and_then(|os| os.to_str());
        let mut file = File::open(path.as_ref())
            .await
            .map_err(|e| EngineError::Config(format!("Failed to open config file: {e}")))?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .await
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {e}")))?;
        Self::parse(&contents, file_format)
    }

    /// 按扩展名解析配置内容
    pub fn parse(contents: &str, format: Option<&str>) -> Result<Self> {
        match format {
            Some("toml") => toml::from_str(contents)
                .map_err(|e| EngineError::Config(format!("Failed to parse TOML config: {e:?}"))),
            Some("json") => serde_json::from_str(contents)
                .map_err(|e| EngineError::Config(format!("Failed to parse JSON config: {e:?}"))),
            Some("yaml") | Some("yml") => serde_yaml::from_str(contents)
                .map_err(|e| EngineError::Config(format!("Failed to parse YAML config: {e:?}"))),
            _ => Err(EngineError::Config("Unsupported config file format".to_string())),
        }
    }

    /// 要操作的用户：显式指定 > general.default_user > 唯一用户
    pub fn resolve_user<'a>(&'a self, user_id: Option<&'a str>) -> Result<&'a str> {
        if let Some(id) = user_id.or(self.general.default_user.as_deref()) {
            return if self.users.contains_key(id) {
                Ok(id)
            } else {
                Err(EngineError::Config(format!("用户不存在: {id}")))
            };
        }
        match self.users.keys().next() {
            Some(id) if self.users.len() == 1 => Ok(id.as_str()),
            _ => Err(EngineError::Config("需要指定用户".to_string())),
        }
    }

    /// 解析用户的全部账户；交易所家族在此确定一次
    pub fn account_refs(&self, user_id: &str) -> Result<Vec<AccountRef>> {
        let user = self
            .users
            .get(user_id)
            .ok_or_else(|| EngineError::Config(format!("用户不存在: {user_id}")))?;
        user.accounts
            .iter()
            .map(|(account_id, account)| {
                let key = account.exchange_key.as_deref().unwrap_or(account_id);
                let account_ref = AccountRef::new(user_id, account_id, key)
                    .map_err(|e| EngineError::Config(format!("账户 {account_id}: {e}")))?;
                Ok(match &account.name {
                    Some(name) => account_ref.with_display_name(name.clone()),
                    None => account_ref,
                })
            })
            .collect()
    }

    /// 钱包地址：`{USER}_{ACCOUNT}_WALLET_ADDRESS` > `{ACCOUNT}_WALLET_ADDRESS` > 配置文件
    pub fn wallet_address(&self, user_id: &str, account_id: &str) -> Option<String> {
        let account = account_id.to_ascii_uppercase();
        let scoped = format!("{}_{}_WALLET_ADDRESS", user_id.to_ascii_uppercase(), account);
        let shared = format!("{account}_WALLET_ADDRESS");
        std::env::var(&scoped)
            .or_else(|_| std::env::var(&shared))
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| {
                self.users
                    .get(user_id)?
                    .accounts
                    .get(account_id)?
                    .wallet_address
                    .clone()
                    .filter(|v| !v.trim().is_empty())
            })
    }

    /// 为用户构建执行器：默认走SSH，Hyperliquid/Lighter 配置了钱包地址时走直连HTTP
    pub fn build_executors(&self, user_id: &str) -> Result<ExecutorSet> {
        let ssh = SshExecutor::new(&self.remote.ssh_host, &self.remote.run_script, self.remote.timeout_secs);
        let mut executors = ExecutorSet::new(Arc::new(ssh));

        for account in self.account_refs(user_id)? {
            if !account.family.is_direct_http() {
                continue;
            }
            let Some(address) = self.wallet_address(user_id, &account.account_id) else {
                debug!("{} 未配置钱包地址，使用远端命令", account.display_name);
                continue;
            };
            executors = match account.family {
                ExchangeFamily::Hyperliquid => {
                    let client = HyperliquidClient::new(&self.hyperliquid.api_url, address, self.hyperliquid.timeout_secs)?;
                    executors.with_override(ExchangeFamily::Hyperliquid, Arc::new(client))
                }
                ExchangeFamily::Lighter => {
                    let client = LighterClient::new(&self.lighter.api_url, address, self.lighter.timeout_secs)?;
                    executors.with_override(ExchangeFamily::Lighter, Arc::new(client))
                }
                _ => executors,
            };
        }
        Ok(executors)
    }

    pub fn build_ticker(&self) -> Result<BinanceTicker> {
        BinanceTicker::new(&self.price.api_url, self.price.timeout_secs)
    }
}
