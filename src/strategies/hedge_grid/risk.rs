use chrono::{DateTime, Duration, Utc};
use log::{info, warn};

use super::config::RiskSettings;
use crate::core::exchange::ExchangeGateway;
use crate::core::types::{AccountSummary, PositionDetail, Side};

/// 保证金风险档位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarginRisk {
    Low,
    Medium,
    High,
}

/// 减仓紧迫程度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    None,
    Medium,
    High,
}

/// 减仓决策，由引擎执行
#[derive(Debug, Clone)]
pub struct ReduceDecision {
    pub should_reduce: bool,
    pub reason: String,
    pub urgency: Urgency,
    pub suggested_ratio: f64,
}

impl ReduceDecision {
    fn hold() -> Self {
        Self {
            should_reduce: false,
            reason: String::new(),
            urgency: Urgency::None,
            suggested_ratio: 0.0,
        }
    }

    fn reduce(reason: &str, urgency: Urgency, ratio: f64) -> Self {
        Self {
            should_reduce: true,
            reason: reason.to_string(),
            urgency,
            suggested_ratio: ratio,
        }
    }
}

fn refresh_due(last: Option<DateTime<Utc>>, now: DateTime<Utc>, interval_secs: u64) -> bool {
    match last {
        Some(last) => now - last >= Duration::seconds(interval_secs as i64),
        None => true,
    }
}

/// 风控管理
///
/// 账户与持仓快照各自节流刷新，刷新失败时保留上次缓存，
/// 从未成功过则使用保守默认值。决策本身是纯函数，下单由引擎执行。
#[derive(Debug)]
pub struct RiskManager {
    settings: RiskSettings,
    account: AccountSummary,
    positions: Vec<PositionDetail>,
    last_account_refresh: Option<DateTime<Utc>>,
    last_position_refresh: Option<DateTime<Utc>>,
    tick_count: u64,
}

impl RiskManager {
    pub fn new(settings: &RiskSettings) -> Self {
        Self {
            settings: settings.clone(),
            account: Self::conservative_account(),
            positions: Vec::new(),
            last_account_refresh: None,
            last_position_refresh: None,
            tick_count: 0,
        }
    }

    /// 查询失败时的保守账户假设：半仓占用，余额偏小
    fn conservative_account() -> AccountSummary {
        AccountSummary {
            currency: "USDT".to_string(),
            total_equity: 1_000.0,
            available_balance: 500.0,
            used_margin: 500.0,
            unrealized_pnl: 0.0,
        }
    }

    /// 节流刷新账户快照
    pub async fn refresh_account(&mut self, gateway: &dyn ExchangeGateway, now: DateTime<Utc>) {
        if !refresh_due(self.last_account_refresh, now, self.settings.account_refresh_secs) {
            return;
        }
        self.last_account_refresh = Some(now);
        match gateway.fetch_account_summary().await {
            Ok(summary) => self.account = summary,
            Err(e) => warn!("⚠️ 刷新账户快照失败, 沿用上次数据: {}", e),
        }
    }

    /// 节流刷新持仓明细
    pub async fn refresh_positions(
        &mut self,
        gateway: &dyn ExchangeGateway,
        symbol: &str,
        now: DateTime<Utc>,
    ) {
        if !refresh_due(self.last_position_refresh, now, self.settings.position_refresh_secs) {
            return;
        }
        self.last_position_refresh = Some(now);
        match gateway.fetch_position_detail(symbol).await {
            Ok(positions) => self.positions = positions,
            Err(e) => warn!("⚠️ 刷新持仓明细失败, 沿用上次数据: {}", e),
        }
    }

    pub fn account(&self) -> &AccountSummary {
        &self.account
    }

    pub fn available_balance(&self) -> f64 {
        self.account.available_balance
    }

    pub fn position_detail(&self, side: Side) -> Option<&PositionDetail> {
        self.positions.iter().find(|p| p.side == side)
    }

    /// 按保证金占用比例分级
    pub fn classify_margin_risk(&self) -> MarginRisk {
        let ratio = self.account.margin_ratio();
        if ratio > self.settings.margin_high {
            MarginRisk::High
        } else if ratio > self.settings.margin_medium {
            MarginRisk::Medium
        } else {
            MarginRisk::Low
        }
    }

    /// 风险档位对应的下单数量系数
    pub fn adjustment_ratio(&self) -> f64 {
        match self.classify_margin_risk() {
            MarginRisk::High => 0.5,
            MarginRisk::Medium => 0.8,
            MarginRisk::Low => 1.0,
        }
    }

    /// 判断某侧持仓是否需要减仓，规则按优先级短路，只取第一条命中
    ///
    /// `notional`由调用方按台账持仓和最新价格计算，
    /// 浮盈数据来自缓存的持仓明细。
    pub fn should_reduce_position(&self, side: Side, notional: f64) -> ReduceDecision {
        let detail = match self.position_detail(side) {
            Some(d) if d.size > 0.0 => d,
            _ => return ReduceDecision::hold(),
        };

        // 规则1: 浮亏超过名义价值的止损比例
        if detail.unrealized_pnl < 0.0
            && detail.unrealized_pnl.abs() > notional * self.settings.stop_loss_ratio
        {
            return ReduceDecision::reduce("浮亏超过止损线", Urgency::High, 0.5);
        }

        // 规则2: 收益率极端恶化
        if detail.pnl_percentage < self.settings.extreme_loss_pct {
            return ReduceDecision::reduce("收益率极端恶化", Urgency::High, 0.3);
        }

        // 规则3: 保证金风险过高
        if self.classify_margin_risk() == MarginRisk::High {
            return ReduceDecision::reduce("保证金率过高", Urgency::Medium, 0.4);
        }

        ReduceDecision::hold()
    }

    /// 每个调度tick调用一次，按配置间隔输出风控指标
    pub fn log_metrics(&mut self) {
        self.tick_count += 1;
        let interval = self.settings.metrics_log_interval_ticks;
        if interval == 0 || self.tick_count % interval != 0 {
            return;
        }

        info!(
            "📊 风控指标: 权益={:.2} 可用={:.2} 保证金率={:.1}% 风险档位={:?}",
            self.account.total_equity,
            self.account.available_balance,
            self.account.margin_ratio() * 100.0,
            self.classify_margin_risk()
        );
        for p in &self.positions {
            info!(
                "📊 {}仓: 数量={} 开仓价={} 名义={:.2} 浮盈={:.4} ({:.2}%)",
                p.side,
                p.size,
                p.entry_price,
                p.notional_value(),
                p.unrealized_pnl,
                p.pnl_percentage
            );
        }
    }
}

#[cfg(test)]
impl RiskManager {
    pub(crate) fn set_positions_for_test(&mut self, positions: Vec<PositionDetail>) {
        self.positions = positions;
    }

    pub(crate) fn set_account_for_test(&mut self, account: AccountSummary) {
        self.account = account;
    }
}
