use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};

use super::config::QuantitySettings;
use crate::core::types::SymbolRules;

/// 下单数量策略
///
/// 固定模式直接使用配置数量，动态模式按可用余额和风险系数计算，
/// 结果缓存一段时间避免每轮评估重复计算。所有路径的产出都不低于
/// 交易所最小名义价值对应的安全数量。
#[derive(Debug)]
pub struct QuantityPolicy {
    settings: QuantitySettings,
    fixed_quantity: f64,
    cached: Option<(DateTime<Utc>, f64)>,
}

impl QuantityPolicy {
    pub fn new(settings: &QuantitySettings, fixed_quantity: f64) -> Self {
        Self {
            settings: settings.clone(),
            fixed_quantity,
            cached: None,
        }
    }

    /// 满足最小名义价值的安全数量，留10%缓冲防止价格小幅波动后被拒单
    pub fn min_safe_quantity(&self, price: f64, rules: &SymbolRules) -> f64 {
        if price <= 0.0 {
            return rules.min_quantity;
        }
        let qty = rules.round_quantity(rules.min_notional * 1.1 / price);
        qty.max(rules.min_quantity)
    }

    /// 计算当前应使用的下单数量
    ///
    /// `available_balance`与`adjustment_ratio`由风控模块提供，
    /// 本方法不触发任何API调用。
    pub fn optimal_quantity(
        &mut self,
        now: DateTime<Utc>,
        price: f64,
        available_balance: f64,
        adjustment_ratio: f64,
        rules: &SymbolRules,
    ) -> f64 {
        if price <= 0.0 {
            warn!("⚠️ 价格无效({}), 使用保底数量", price);
            return rules.min_quantity;
        }

        if !self.settings.dynamic_enabled {
            return self.min_safe_quantity(price, rules).max(rules.round_quantity(self.fixed_quantity));
        }

        if let Some((cached_at, qty)) = self.cached {
            if now - cached_at < Duration::seconds(self.settings.cache_secs as i64) {
                return qty;
            }
        }

        let qty = self.compute_dynamic(price, available_balance, adjustment_ratio, rules);
        self.cached = Some((now, qty));
        qty
    }

    /// 对冲开仓数量：取最优数量的80%，两侧同时建仓时预留余量
    pub fn hedge_init_quantity(
        &mut self,
        now: DateTime<Utc>,
        price: f64,
        available_balance: f64,
        adjustment_ratio: f64,
        rules: &SymbolRules,
    ) -> f64 {
        let optimal = self.optimal_quantity(now, price, available_balance, adjustment_ratio, rules);
        let qty = rules.round_quantity(optimal * 0.8);
        qty.max(self.min_safe_quantity(price, rules))
    }

    /// 计算失败时的兜底数量
    pub fn fallback_quantity(&self, price: f64, rules: &SymbolRules) -> f64 {
        if price <= 0.0 {
            return rules.min_quantity;
        }
        let qty = rules.round_quantity(self.settings.min_order_value / price * 1.2);
        qty.max(rules.min_quantity)
    }

    pub fn invalidate_cache(&mut self) {
        self.cached = None;
    }

    fn compute_dynamic(
        &self,
        price: f64,
        available_balance: f64,
        adjustment_ratio: f64,
        rules: &SymbolRules,
    ) -> f64 {
        if available_balance <= 0.0 {
            warn!("⚠️ 可用余额无效({:.2}), 使用兜底数量", available_balance);
            return self.fallback_quantity(price, rules);
        }

        // 单笔比例和总资金占用两个口径取平均
        let by_single_order = available_balance * self.settings.single_order_ratio / price;
        let by_account_usage = available_balance * self.settings.account_usage_ratio
            / self.settings.concurrent_order_count as f64
            / price;
        let base = (by_single_order + by_account_usage) / 2.0 * adjustment_ratio;

        let min_qty = self.settings.min_order_value / price;
        let max_qty = self.settings.max_order_value / price;
        let clamped = base.clamp(min_qty, max_qty);

        let qty = rules
            .round_quantity(clamped)
            .max(self.min_safe_quantity(price, rules));
        debug!(
            "📊 动态数量: 单笔口径={:.2} 资金口径={:.2} 风险系数={} -> {}",
            by_single_order, by_account_usage, adjustment_ratio, qty
        );
        qty
    }
}
