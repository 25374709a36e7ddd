/// 订单ID生成器
///
/// 为网格订单生成唯一且可识别的客户端订单ID，
/// 满足Binance合约的格式要求。
use crate::core::types::Side;
use chrono::Utc;
use rand::Rng;

/// 交易所订单ID规则
#[derive(Debug, Clone)]
pub struct ExchangeOrderIdRules {
    pub max_length: usize,
    pub allow_underscore: bool,
    pub allow_dash: bool,
}

impl ExchangeOrderIdRules {
    /// Binance规则
    pub fn binance() -> Self {
        Self {
            max_length: 36,          // 最大36个字符
            allow_underscore: false, // 不允许下划线
            allow_dash: false,       // 不允许横线
        }
    }

    /// 校验客户端订单ID是否符合规则
    pub fn validate(&self, order_id: &str) -> bool {
        if order_id.is_empty() || order_id.len() > self.max_length {
            return false;
        }
        order_id.chars().all(|c| {
            c.is_ascii_alphanumeric()
                || (c == '_' && self.allow_underscore)
                || (c == '-' && self.allow_dash)
        })
    }
}

/// 生成网格订单的客户端订单ID
///
/// 格式：grid + 方向标记(l/s) + 毫秒时间戳 + 4位随机十六进制
pub fn generate_grid_order_id(side: Side) -> String {
    let timestamp = Utc::now().timestamp_millis();
    let suffix: u16 = rand::thread_rng().gen();
    format!("grid{}{}{:04x}", side.tag(), timestamp, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binance_rules() {
        let rules = ExchangeOrderIdRules::binance();
        assert!(rules.validate("gridl17000000000001a2b"));
        assert!(!rules.validate("grid_long_1"));
        assert!(!rules.validate("grid-long-1"));
        assert!(!rules.validate(""));
        assert!(!rules.validate(&"a".repeat(37)));
    }

    #[test]
    fn test_generate_grid_order_id() {
        let rules = ExchangeOrderIdRules::binance();
        let id = generate_grid_order_id(Side::Long);
        assert!(id.starts_with("gridl"));
        assert!(rules.validate(&id));
        assert!(id.len() <= 36);

        let id = generate_grid_order_id(Side::Short);
        assert!(id.starts_with("grids"));
        assert!(rules.validate(&id));
    }
}
