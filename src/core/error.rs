use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("网络请求错误: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON序列化错误: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("YAML配置错误: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("API错误: {code} - {message}")]
    ApiError { code: i32, message: String },

    #[error("订单错误: {0}")]
    OrderError(String),

    #[error("订单未找到: ID {order_id} (交易对: {symbol})")]
    OrderNotFound { order_id: String, symbol: String },

    #[error("WebSocket错误: {0}")]
    WebSocketError(String),

    #[error("速率限制: {0}")]
    RateLimitError(String, Option<u64>),

    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("数据解析错误: {0}")]
    ParseError(String),

    #[error("超时错误: 操作 '{operation}' 超时 ({timeout_seconds}秒)")]
    TimeoutError {
        operation: String,
        timeout_seconds: u64,
    },

    #[error("其他错误: {0}")]
    Other(String),
}

impl ExchangeError {
    /// 判断错误是否可以重试
    pub fn is_retryable(&self) -> bool {
        match self {
            ExchangeError::NetworkError(_) => true,
            ExchangeError::TimeoutError { .. } => true,
            ExchangeError::RateLimitError(_, _) => true,
            ExchangeError::WebSocketError(_) => true,
            ExchangeError::ApiError { code, .. } => {
                // HTTP 5xx 错误通常可以重试
                *code >= 500 && *code < 600
            }
            _ => false,
        }
    }

    /// 获取建议的重试等待时间(秒)
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            ExchangeError::RateLimitError(_, retry_after) => *retry_after,
            ExchangeError::NetworkError(_) => Some(1),
            ExchangeError::TimeoutError { .. } => Some(2),
            ExchangeError::ApiError { code, .. } if *code >= 500 => Some(5),
            _ => None,
        }
    }

    /// 获取错误的严重程度
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ExchangeError::NetworkError(_) => ErrorSeverity::Warning,
            ExchangeError::TimeoutError { .. } => ErrorSeverity::Warning,
            ExchangeError::RateLimitError(_, _) => ErrorSeverity::Warning,
            ExchangeError::WebSocketError(_) => ErrorSeverity::Warning,
            ExchangeError::OrderNotFound { .. } => ErrorSeverity::Warning,
            ExchangeError::ConfigError(_) => ErrorSeverity::Critical,
            ExchangeError::ApiError { .. } if self.is_insufficient_margin() => {
                ErrorSeverity::Critical
            }
            ExchangeError::ApiError { code, .. } if *code >= 500 => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }

    /// 撤单时订单已不存在（已成交或已过期），属于良性竞态
    pub fn is_order_missing(&self) -> bool {
        match self {
            ExchangeError::OrderNotFound { .. } => true,
            ExchangeError::ApiError { code, message } => {
                *code == -2011 || message.contains("Unknown order")
            }
            _ => false,
        }
    }

    /// 保证金不足（Binance -2019）
    pub fn is_insufficient_margin(&self) -> bool {
        match self {
            ExchangeError::ApiError { code, message } => {
                *code == -2019 || message.to_lowercase().contains("insufficient")
            }
            _ => false,
        }
    }

    /// 订单参数非法（精度、最小名义价值、必填参数）
    pub fn is_invalid_order(&self) -> bool {
        match self {
            ExchangeError::ApiError { code, message } => {
                matches!(*code, -1111 | -1102 | -4164)
                    || message.contains("Precision")
                    || message.contains("notional")
            }
            _ => false,
        }
    }

    /// 客户端订单ID重复提交
    pub fn is_duplicate_order(&self) -> bool {
        match self {
            ExchangeError::ApiError { message, .. } => {
                message.to_lowercase().contains("duplicate")
            }
            _ => false,
        }
    }

    /// 触发限频（HTTP 429/418 或 -1003）
    pub fn is_rate_limited(&self) -> bool {
        match self {
            ExchangeError::RateLimitError(_, _) => true,
            ExchangeError::ApiError { code, .. } => {
                matches!(*code, 429 | 418 | -1003)
            }
            _ => false,
        }
    }

    /// 交易所维护或服务不可用
    pub fn is_exchange_unavailable(&self) -> bool {
        match self {
            ExchangeError::ApiError { code, message } => {
                (*code >= 500 && *code < 600) || *code == -1001 || message.contains("maintenance")
            }
            _ => false,
        }
    }

    /// 获取用户友好的错误描述
    pub fn user_friendly_message(&self) -> String {
        match self {
            ExchangeError::NetworkError(_) => "网络连接问题，请检查网络状态".to_string(),
            ExchangeError::RateLimitError(_, retry_after) => {
                if let Some(seconds) = retry_after {
                    format!("请求过于频繁，请等待{}秒后重试", seconds)
                } else {
                    "请求过于频繁，请稍后重试".to_string()
                }
            }
            ExchangeError::OrderNotFound { order_id, .. } => {
                format!("订单{}不存在或已过期", order_id)
            }
            _ => self.to_string(),
        }
    }
}

/// 错误严重程度
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorSeverity {
    Info,     // 信息性错误，通常不影响操作
    Warning,  // 警告性错误，可能影响性能但可以重试
    Error,    // 一般错误，需要用户处理
    Critical, // 严重错误，需要立即处理
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_missing_classification() {
        let err = ExchangeError::ApiError {
            code: -2011,
            message: "Unknown order sent.".to_string(),
        };
        assert!(err.is_order_missing());
        assert!(!err.is_insufficient_margin());

        let err = ExchangeError::OrderNotFound {
            order_id: "123".to_string(),
            symbol: "DOGEUSDC".to_string(),
        };
        assert!(err.is_order_missing());
        assert_eq!(err.severity(), ErrorSeverity::Warning);
    }

    #[test]
    fn test_margin_and_rate_limit_classification() {
        let margin = ExchangeError::ApiError {
            code: -2019,
            message: "Margin is insufficient.".to_string(),
        };
        assert!(margin.is_insufficient_margin());
        assert_eq!(margin.severity(), ErrorSeverity::Critical);

        let rate = ExchangeError::ApiError {
            code: -1003,
            message: "Too many requests.".to_string(),
        };
        assert!(rate.is_rate_limited());

        let server = ExchangeError::ApiError {
            code: 503,
            message: "Service unavailable".to_string(),
        };
        assert!(server.is_retryable());
        assert!(server.is_exchange_unavailable());
    }

    #[test]
    fn test_retry_after_and_friendly_message() {
        let rate = ExchangeError::RateLimitError("Too many requests.".to_string(), Some(3));
        assert!(rate.is_rate_limited());
        assert_eq!(rate.retry_after(), Some(3));
        assert!(rate.user_friendly_message().contains("等待3秒"));

        let timeout = ExchangeError::TimeoutError {
            operation: "下单".to_string(),
            timeout_seconds: 30,
        };
        assert_eq!(timeout.retry_after(), Some(2));
        assert!(timeout.is_retryable());

        let order = ExchangeError::OrderError("数量低于最小下单量".to_string());
        assert_eq!(order.retry_after(), None);
        assert!(!order.is_retryable());
        assert!(order.user_friendly_message().contains("订单错误"));
    }
}
