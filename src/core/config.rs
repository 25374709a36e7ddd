use crate::core::error::ExchangeError;

/// 交易所端点配置
#[derive(Debug, Clone)]
pub struct Config {
    pub name: String,
    pub testnet: bool,
    pub futures_base_url: String,
    pub ws_futures_url: String,
}

impl Config {
    pub fn new(testnet: bool) -> Self {
        let (futures_base_url, ws_futures_url) = if testnet {
            (
                "https://testnet.binancefuture.com".to_string(),
                "wss://stream.binancefuture.com/ws".to_string(),
            )
        } else {
            (
                "https://fapi.binance.com".to_string(),
                "wss://fstream.binance.com/ws".to_string(),
            )
        };

        Self {
            name: "Binance".to_string(),
            testnet,
            futures_base_url,
            ws_futures_url,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(false)
    }
}

/// API密钥配置
#[derive(Debug, Clone)]
pub struct ApiKeys {
    pub api_key: String,
    pub api_secret: String,
}

impl ApiKeys {
    /// 从环境变量加载API密钥
    pub fn from_env(env_prefix: &str) -> Result<Self, ExchangeError> {
        dotenv::dotenv().ok(); // 加载.env文件，忽略错误

        let prefix_upper = env_prefix.to_uppercase();

        let api_key = std::env::var(format!("{}_API_KEY", prefix_upper)).map_err(|_| {
            ExchangeError::ConfigError(format!("未找到{}的API_KEY环境变量", env_prefix))
        })?;

        // 尝试两种格式的密钥名称
        let api_secret = std::env::var(format!("{}_API_SECRET", prefix_upper))
            .or_else(|_| std::env::var(format!("{}_SECRET_KEY", prefix_upper)))
            .map_err(|_| {
                ExchangeError::ConfigError(format!(
                    "未找到{}的API_SECRET或SECRET_KEY环境变量",
                    env_prefix
                ))
            })?;

        Ok(ApiKeys {
            api_key,
            api_secret,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_selection() {
        let mainnet = Config::new(false);
        assert_eq!(mainnet.futures_base_url, "https://fapi.binance.com");
        assert_eq!(mainnet.ws_futures_url, "wss://fstream.binance.com/ws");

        let testnet = Config::new(true);
        assert_eq!(testnet.futures_base_url, "https://testnet.binancefuture.com");
    }
}
