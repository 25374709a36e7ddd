use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};

use crate::core::types::{
    BookTick, Order, OrderSide, OrderStatus, OrderUpdateEvent, Side, SymbolRules,
};

/// 按持仓方向索引的一对值，统一多空两侧的控制流
#[derive(Debug, Clone, Copy, Default)]
pub struct PerSide<T> {
    pub long: T,
    pub short: T,
}

impl<T> PerSide<T> {
    pub fn get(&self, side: Side) -> &T {
        match side {
            Side::Long => &self.long,
            Side::Short => &self.short,
        }
    }

    pub fn get_mut(&mut self, side: Side) -> &mut T {
        match side {
            Side::Long => &mut self.long,
            Side::Short => &mut self.short,
        }
    }
}

/// 网格价位，挂单时记录，校验挂单时与最新中间价重算的理想价位比较
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridLevels {
    pub mid_price: f64,
    pub upper_price: f64,
    pub lower_price: f64,
}

impl GridLevels {
    pub fn from_mid(mid: f64, spacing: f64, rules: &SymbolRules) -> Self {
        Self {
            mid_price: mid,
            upper_price: rules.round_price(mid * (1.0 + spacing)),
            lower_price: rules.round_price(mid * (1.0 - spacing)),
        }
    }

    /// 止盈价：多头在上边界卖出，空头在下边界买入
    pub fn take_profit_price(&self, side: Side) -> f64 {
        match side {
            Side::Long => self.upper_price,
            Side::Short => self.lower_price,
        }
    }

    /// 补仓价：多头在下边界买入，空头在上边界卖出
    pub fn reentry_price(&self, side: Side) -> f64 {
        match side {
            Side::Long => self.lower_price,
            Side::Short => self.upper_price,
        }
    }
}

/// 对冲开仓状态
#[derive(Debug, Clone, Default)]
pub struct HedgeInitState {
    pub completed: bool,
    pub last_attempt: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl HedgeInitState {
    /// 距上次尝试是否已超过最小间隔
    pub fn attempt_allowed(&self, now: DateTime<Utc>, interval_secs: u64) -> bool {
        match self.last_attempt {
            Some(last) => now - last >= Duration::seconds(interval_secs as i64),
            None => true,
        }
    }

    /// 是否处于对冲开仓完成后的静默期
    pub fn in_grace_period(&self, now: DateTime<Utc>, grace_secs: u64) -> bool {
        match self.completed_at {
            Some(at) => self.completed && now - at < Duration::seconds(grace_secs as i64),
            None => false,
        }
    }

    pub fn mark_attempt(&mut self, now: DateTime<Utc>) {
        self.last_attempt = Some(now);
    }

    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.completed = true;
        self.completed_at = Some(now);
    }

    /// 双侧持仓重新归零时重置，允许下一轮对冲开仓
    pub fn reset(&mut self) {
        self.completed = false;
        self.completed_at = None;
    }
}

/// 待处理事件集合
///
/// 行情/订单回调只调用enqueue方法，调度循环只调用drain方法，
/// 引擎内部状态不会被回调直接触碰。
#[derive(Debug, Default)]
pub struct PendingEventSet {
    rebalance_immediately: bool,
    order_events: VecDeque<OrderUpdateEvent>,
    check_price_drift: bool,
    latest_tick: Option<BookTick>,
}

impl PendingEventSet {
    pub fn push_order_event(&mut self, event: OrderUpdateEvent) {
        self.rebalance_immediately = true;
        self.order_events.push_back(event);
    }

    pub fn push_tick(&mut self, tick: BookTick) {
        self.check_price_drift = true;
        self.latest_tick = Some(tick);
    }

    pub fn rebalance_pending(&self) -> bool {
        self.rebalance_immediately
    }

    pub fn drift_pending(&self) -> bool {
        self.check_price_drift
    }

    pub fn is_empty(&self) -> bool {
        !self.rebalance_immediately && !self.check_price_drift
    }

    /// 取走全部订单事件并清除rebalance标志
    pub fn take_rebalance(&mut self) -> Option<VecDeque<OrderUpdateEvent>> {
        if !self.rebalance_immediately {
            return None;
        }
        self.rebalance_immediately = false;
        Some(std::mem::take(&mut self.order_events))
    }

    /// 取走最新tick并清除drift标志
    pub fn take_drift(&mut self) -> Option<BookTick> {
        if !self.check_price_drift {
            return None;
        }
        self.check_price_drift = false;
        self.latest_tick.take()
    }
}

/// 持仓与挂单台账
///
/// 两条更新路径：`apply_snapshot`是权威来源，整体覆盖；
/// `apply_order_event`是尽力而为的增量，漂移由下一次快照纠正。
/// 事件携带的成交量为累计值（交易所`z`字段），台账按订单记录
/// 最近一次见到的累计成交，在本地求增量，因此同一事件重复推送
/// 不会重复记账。累计成交表在每次快照时清理为仍在场的订单。
#[derive(Debug, Default)]
pub struct PositionOrderLedger {
    positions: PerSide<f64>,
    /// 四个挂单聚合：多头买/多头卖/空头卖/空头买
    resting: PerSide<DirectionPair>,
    filled_seen: HashMap<String, f64>,
}

#[derive(Debug, Clone, Copy, Default)]
struct DirectionPair {
    buy: f64,
    sell: f64,
}

impl DirectionPair {
    fn get(&self, direction: OrderSide) -> f64 {
        match direction {
            OrderSide::Buy => self.buy,
            OrderSide::Sell => self.sell,
        }
    }

    fn get_mut(&mut self, direction: OrderSide) -> &mut f64 {
        match direction {
            OrderSide::Buy => &mut self.buy,
            OrderSide::Sell => &mut self.sell,
        }
    }
}

impl PositionOrderLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self, side: Side) -> f64 {
        *self.positions.get(side)
    }

    pub fn resting(&self, side: Side, direction: OrderSide) -> f64 {
        self.resting.get(side).get(direction)
    }

    /// 止盈腿挂单量（平仓方向）
    pub fn take_profit_qty(&self, side: Side) -> f64 {
        self.resting(side, side.closing_order_side())
    }

    /// 补仓腿挂单量（开仓方向）
    pub fn reentry_qty(&self, side: Side) -> f64 {
        self.resting(side, side.opening_order_side())
    }

    /// 双侧持仓是否同时为零
    pub fn both_sides_flat(&self) -> bool {
        self.position(Side::Long) == 0.0 && self.position(Side::Short) == 0.0
    }

    /// 持仓快照覆盖
    pub fn apply_position_snapshot(&mut self, long_size: f64, short_size: f64) {
        *self.positions.get_mut(Side::Long) = long_size.max(0.0);
        *self.positions.get_mut(Side::Short) = short_size.max(0.0);
    }

    /// 挂单快照覆盖：全部聚合按快照重建，增量记账造成的漂移在此归零
    pub fn apply_order_snapshot(&mut self, open_orders: &[Order]) {
        self.resting = PerSide::default();
        for order in open_orders {
            let slot = self
                .resting
                .get_mut(order.position_side)
                .get_mut(order.side);
            *slot += order.remaining.max(0.0);
        }

        // 重建累计成交基线：只保留仍在场的订单，基线对齐快照中的已成交量，
        // 避免快照前后的同一笔成交被重复记账
        self.filled_seen = open_orders
            .iter()
            .map(|o| (o.id.clone(), o.filled.max(0.0)))
            .collect();
    }

    /// 持仓与挂单的完整权威快照
    pub fn apply_snapshot(&mut self, long_size: f64, short_size: f64, open_orders: &[Order]) {
        self.apply_position_snapshot(long_size, short_size);
        self.apply_order_snapshot(open_orders);
    }

    /// 增量应用一条订单生命周期事件
    pub fn apply_order_event(&mut self, event: &OrderUpdateEvent) {
        let side = event.position_side;
        let direction = event.side;

        match event.status {
            OrderStatus::New => {
                let remaining = (event.quantity - event.cumulative_filled).max(0.0);
                *self.resting.get_mut(side).get_mut(direction) += remaining;
                self.filled_seen
                    .insert(event.order_id.clone(), event.cumulative_filled.max(0.0));
            }
            OrderStatus::PartiallyFilled | OrderStatus::Filled => {
                let last_seen = self
                    .filled_seen
                    .get(&event.order_id)
                    .copied()
                    .unwrap_or(0.0);
                let delta = (event.cumulative_filled - last_seen).max(0.0);

                let slot = self.resting.get_mut(side).get_mut(direction);
                *slot = (*slot - delta).max(0.0);

                let position = self.positions.get_mut(side);
                if direction == side.opening_order_side() {
                    *position += delta;
                } else {
                    *position = (*position - delta).max(0.0);
                }

                self.filled_seen
                    .insert(event.order_id.clone(), event.cumulative_filled.max(last_seen));
            }
            OrderStatus::Canceled | OrderStatus::Expired | OrderStatus::Rejected => {
                let remaining = (event.quantity - event.cumulative_filled).max(0.0);
                let slot = self.resting.get_mut(side).get_mut(direction);
                *slot = (*slot - remaining).max(0.0);
                self.filled_seen.remove(&event.order_id);
            }
        }
    }
}

/// API用量与行情节奏统计
///
/// 每分钟权重预算加安全系数，超出后跳过非必要的同步查询；
/// 滑动窗口内的价格样本用于识别快速行情，动态切换同步冷却时间。
#[derive(Debug)]
pub struct ApiUsageStats {
    minute_start: DateTime<Utc>,
    weight_used: u32,
    price_samples: VecDeque<(DateTime<Utc>, f64)>,
    last_order_sync: Option<DateTime<Utc>>,
    last_position_sync: Option<DateTime<Utc>>,
}

impl Default for ApiUsageStats {
    fn default() -> Self {
        Self {
            minute_start: Utc::now(),
            weight_used: 0,
            price_samples: VecDeque::new(),
            last_order_sync: None,
            last_position_sync: None,
        }
    }
}

impl ApiUsageStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn roll_minute(&mut self, now: DateTime<Utc>) {
        if now - self.minute_start >= Duration::seconds(60) {
            self.minute_start = now;
            self.weight_used = 0;
        }
    }

    /// 预算允许则记账并返回true，否则不记账返回false
    pub fn try_consume(
        &mut self,
        now: DateTime<Utc>,
        weight: u32,
        limit_per_minute: u32,
        safety_margin: f64,
    ) -> bool {
        self.roll_minute(now);
        let budget = (limit_per_minute as f64 * safety_margin) as u32;
        if self.weight_used + weight > budget {
            return false;
        }
        self.weight_used += weight;
        true
    }

    pub fn weight_used(&self) -> u32 {
        self.weight_used
    }

    /// 记录一个价格样本并丢弃窗口外的旧样本
    pub fn record_price(&mut self, now: DateTime<Utc>, mid: f64, window_secs: u64) {
        self.price_samples.push_back((now, mid));
        let cutoff = now - Duration::seconds(window_secs as i64);
        while let Some(&(ts, _)) = self.price_samples.front() {
            if ts < cutoff {
                self.price_samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// 窗口内价格波动幅度是否达到快速行情阈值
    pub fn is_fast_market(&self, threshold: f64) -> bool {
        if self.price_samples.len() < 2 {
            return false;
        }
        let mut min = f64::MAX;
        let mut max = f64::MIN;
        for &(_, price) in &self.price_samples {
            min = min.min(price);
            max = max.max(price);
        }
        min > 0.0 && (max - min) / min >= threshold
    }

    /// 挂单同步是否已过冷却时间（快速行情用短冷却）
    pub fn order_sync_allowed(
        &self,
        now: DateTime<Utc>,
        fast: bool,
        fast_cooldown_secs: u64,
        standard_cooldown_secs: u64,
    ) -> bool {
        let cooldown = if fast {
            fast_cooldown_secs
        } else {
            standard_cooldown_secs
        };
        match self.last_order_sync {
            Some(last) => now - last >= Duration::seconds(cooldown as i64),
            None => true,
        }
    }

    pub fn mark_order_sync(&mut self, now: DateTime<Utc>) {
        self.last_order_sync = Some(now);
    }

    /// 周期性挂单快照是否到期
    pub fn order_sync_due(&self, now: DateTime<Utc>, interval_secs: u64) -> bool {
        match self.last_order_sync {
            Some(last) => now - last >= Duration::seconds(interval_secs as i64),
            None => true,
        }
    }

    /// 周期性快照是否到期
    pub fn position_sync_due(&self, now: DateTime<Utc>, interval_secs: u64) -> bool {
        match self.last_position_sync {
            Some(last) => now - last >= Duration::seconds(interval_secs as i64),
            None => true,
        }
    }

    pub fn mark_position_sync(&mut self, now: DateTime<Utc>) {
        self.last_position_sync = Some(now);
    }
}

/// 单侧报价状态
#[derive(Debug, Clone, Copy, Default)]
pub struct SideQuote {
    /// 最近一次挂单时记录的网格价位
    pub levels: Option<GridLevels>,
    /// 当前报价组的目标数量
    pub target_quantity: f64,
    /// 最近一次下单时间（开仓冷却）
    pub last_order_time: Option<DateTime<Utc>>,
    /// 最近一次重新挂单时间（重挂冷却）
    pub last_requote_time: Option<DateTime<Utc>>,
}

impl SideQuote {
    /// 开仓下单冷却是否已过
    pub fn order_cooldown_elapsed(&self, now: DateTime<Utc>, cooldown_secs: u64) -> bool {
        match self.last_order_time {
            Some(last) => now - last >= Duration::seconds(cooldown_secs as i64),
            None => true,
        }
    }

    /// 重新挂单冷却是否已过
    pub fn requote_cooldown_elapsed(&self, now: DateTime<Utc>, cooldown_secs: u64) -> bool {
        match self.last_requote_time {
            Some(last) => now - last >= Duration::seconds(cooldown_secs as i64),
            None => true,
        }
    }
}

/// 引擎全部可变状态，仅由调度任务持锁访问
#[derive(Debug, Default)]
pub struct StrategyState {
    pub ledger: PositionOrderLedger,
    pub quotes: PerSide<SideQuote>,
    pub hedge: HedgeInitState,
    pub latest_tick: Option<BookTick>,
    /// 最近一次处理drift时的中间价，用于漂移阈值比较
    pub last_drift_mid: Option<f64>,
    /// 撤单发现订单已不在场时置位，提示调度器尽快做一次权威同步
    pub resync_requested: bool,
    pub api: ApiUsageStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event(
        order_id: &str,
        side: Side,
        direction: OrderSide,
        status: OrderStatus,
        quantity: f64,
        cumulative_filled: f64,
    ) -> OrderUpdateEvent {
        OrderUpdateEvent {
            symbol: "DOGEUSDC".to_string(),
            order_id: order_id.to_string(),
            client_order_id: None,
            side: direction,
            position_side: side,
            status,
            quantity,
            cumulative_filled,
            average_price: 0.12,
            reduce_only: direction == side.closing_order_side(),
        }
    }

    fn sample_order(
        id: &str,
        side: Side,
        direction: OrderSide,
        quantity: f64,
        filled: f64,
    ) -> Order {
        Order {
            id: id.to_string(),
            client_order_id: None,
            symbol: "DOGEUSDC".to_string(),
            side: direction,
            position_side: side,
            order_type: crate::core::types::OrderType::Limit,
            price: Some(0.12),
            quantity,
            filled,
            remaining: quantity - filled,
            reduce_only: false,
            status: OrderStatus::New,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_grid_levels() {
        let rules = SymbolRules {
            price_precision: 5,
            quantity_precision: 0,
            min_quantity: 1.0,
            min_notional: 5.0,
        };
        let levels = GridLevels::from_mid(0.12, 0.001, &rules);
        assert_eq!(levels.upper_price, 0.12012);
        assert_eq!(levels.lower_price, 0.11988);
        // 多头上边界止盈、下边界补仓；空头相反
        assert_eq!(levels.take_profit_price(Side::Long), levels.upper_price);
        assert_eq!(levels.reentry_price(Side::Long), levels.lower_price);
        assert_eq!(levels.take_profit_price(Side::Short), levels.lower_price);
        assert_eq!(levels.reentry_price(Side::Short), levels.upper_price);
    }

    #[test]
    fn test_ledger_new_adds_remaining() {
        let mut ledger = PositionOrderLedger::new();
        ledger.apply_order_event(&sample_event(
            "1",
            Side::Long,
            OrderSide::Buy,
            OrderStatus::New,
            100.0,
            0.0,
        ));
        assert_eq!(ledger.resting(Side::Long, OrderSide::Buy), 100.0);
        assert_eq!(ledger.position(Side::Long), 0.0);
    }

    #[test]
    fn test_ledger_fill_moves_into_position() {
        let mut ledger = PositionOrderLedger::new();
        ledger.apply_order_event(&sample_event(
            "1",
            Side::Long,
            OrderSide::Buy,
            OrderStatus::New,
            100.0,
            0.0,
        ));
        ledger.apply_order_event(&sample_event(
            "1",
            Side::Long,
            OrderSide::Buy,
            OrderStatus::Filled,
            100.0,
            100.0,
        ));
        assert_eq!(ledger.resting(Side::Long, OrderSide::Buy), 0.0);
        assert_eq!(ledger.position(Side::Long), 100.0);
    }

    #[test]
    fn test_ledger_take_profit_fill_reduces_position() {
        let mut ledger = PositionOrderLedger::new();
        ledger.apply_snapshot(100.0, 0.0, &[]);
        ledger.apply_order_event(&sample_event(
            "2",
            Side::Long,
            OrderSide::Sell,
            OrderStatus::New,
            100.0,
            0.0,
        ));
        ledger.apply_order_event(&sample_event(
            "2",
            Side::Long,
            OrderSide::Sell,
            OrderStatus::Filled,
            100.0,
            100.0,
        ));
        assert_eq!(ledger.position(Side::Long), 0.0);
        assert_eq!(ledger.resting(Side::Long, OrderSide::Sell), 0.0);
    }

    #[test]
    fn test_ledger_filled_event_idempotent() {
        let mut ledger = PositionOrderLedger::new();
        ledger.apply_order_event(&sample_event(
            "1",
            Side::Short,
            OrderSide::Sell,
            OrderStatus::New,
            50.0,
            0.0,
        ));
        let fill = sample_event(
            "1",
            Side::Short,
            OrderSide::Sell,
            OrderStatus::Filled,
            50.0,
            50.0,
        );
        ledger.apply_order_event(&fill);
        ledger.apply_order_event(&fill);
        // 相同累计值的重复推送不重复记账
        assert_eq!(ledger.position(Side::Short), 50.0);
        assert_eq!(ledger.resting(Side::Short, OrderSide::Sell), 0.0);
    }

    #[test]
    fn test_ledger_partial_then_full_fill() {
        let mut ledger = PositionOrderLedger::new();
        ledger.apply_order_event(&sample_event(
            "1",
            Side::Long,
            OrderSide::Buy,
            OrderStatus::New,
            100.0,
            0.0,
        ));
        ledger.apply_order_event(&sample_event(
            "1",
            Side::Long,
            OrderSide::Buy,
            OrderStatus::PartiallyFilled,
            100.0,
            30.0,
        ));
        assert_eq!(ledger.position(Side::Long), 30.0);
        assert_eq!(ledger.resting(Side::Long, OrderSide::Buy), 70.0);

        ledger.apply_order_event(&sample_event(
            "1",
            Side::Long,
            OrderSide::Buy,
            OrderStatus::Filled,
            100.0,
            100.0,
        ));
        assert_eq!(ledger.position(Side::Long), 100.0);
        assert_eq!(ledger.resting(Side::Long, OrderSide::Buy), 0.0);
    }

    #[test]
    fn test_ledger_clamping_never_negative() {
        let mut ledger = PositionOrderLedger::new();
        // 没有NEW直接来FILLED和CANCELED，聚合不得为负
        ledger.apply_order_event(&sample_event(
            "9",
            Side::Long,
            OrderSide::Sell,
            OrderStatus::Filled,
            80.0,
            80.0,
        ));
        ledger.apply_order_event(&sample_event(
            "8",
            Side::Short,
            OrderSide::Buy,
            OrderStatus::Canceled,
            40.0,
            0.0,
        ));
        assert_eq!(ledger.resting(Side::Long, OrderSide::Sell), 0.0);
        assert_eq!(ledger.resting(Side::Short, OrderSide::Buy), 0.0);
        assert_eq!(ledger.position(Side::Long), 0.0);
        assert_eq!(ledger.position(Side::Short), 0.0);
    }

    #[test]
    fn test_ledger_cancel_removes_remaining() {
        let mut ledger = PositionOrderLedger::new();
        ledger.apply_order_event(&sample_event(
            "1",
            Side::Long,
            OrderSide::Buy,
            OrderStatus::New,
            100.0,
            0.0,
        ));
        ledger.apply_order_event(&sample_event(
            "1",
            Side::Long,
            OrderSide::Buy,
            OrderStatus::PartiallyFilled,
            100.0,
            30.0,
        ));
        // 部分成交后撤单，剩余70从聚合中移除
        ledger.apply_order_event(&sample_event(
            "1",
            Side::Long,
            OrderSide::Buy,
            OrderStatus::Canceled,
            100.0,
            30.0,
        ));
        assert_eq!(ledger.resting(Side::Long, OrderSide::Buy), 0.0);
        assert_eq!(ledger.position(Side::Long), 30.0);
    }

    #[test]
    fn test_ledger_snapshot_overwrites_drift() {
        let mut ledger = PositionOrderLedger::new();
        // 制造漂移
        ledger.apply_order_event(&sample_event(
            "1",
            Side::Long,
            OrderSide::Buy,
            OrderStatus::New,
            999.0,
            0.0,
        ));
        ledger.apply_order_event(&sample_event(
            "2",
            Side::Short,
            OrderSide::Sell,
            OrderStatus::New,
            888.0,
            0.0,
        ));

        let snapshot_orders = vec![
            sample_order("10", Side::Long, OrderSide::Sell, 100.0, 0.0),
            sample_order("11", Side::Long, OrderSide::Buy, 50.0, 10.0),
            sample_order("12", Side::Short, OrderSide::Buy, 60.0, 0.0),
        ];
        ledger.apply_snapshot(100.0, 60.0, &snapshot_orders);

        assert_eq!(ledger.position(Side::Long), 100.0);
        assert_eq!(ledger.position(Side::Short), 60.0);
        assert_eq!(ledger.resting(Side::Long, OrderSide::Sell), 100.0);
        assert_eq!(ledger.resting(Side::Long, OrderSide::Buy), 40.0);
        assert_eq!(ledger.resting(Side::Short, OrderSide::Buy), 60.0);
        assert_eq!(ledger.resting(Side::Short, OrderSide::Sell), 0.0);
    }

    #[test]
    fn test_ledger_snapshot_prunes_filled_seen() {
        let mut ledger = PositionOrderLedger::new();
        ledger.apply_order_event(&sample_event(
            "1",
            Side::Long,
            OrderSide::Buy,
            OrderStatus::New,
            100.0,
            0.0,
        ));
        ledger.apply_order_event(&sample_event(
            "1",
            Side::Long,
            OrderSide::Buy,
            OrderStatus::Filled,
            100.0,
            100.0,
        ));
        // 快照后订单1不在场，其基线被清理；再次收到同样的FILLED会被当作新订单重放
        ledger.apply_snapshot(100.0, 0.0, &[]);
        assert_eq!(ledger.position(Side::Long), 100.0);

        // 仍在场的订单基线对齐快照已成交量
        let open = vec![sample_order("2", Side::Long, OrderSide::Sell, 100.0, 20.0)];
        ledger.apply_snapshot(80.0, 0.0, &open);
        ledger.apply_order_event(&sample_event(
            "2",
            Side::Long,
            OrderSide::Sell,
            OrderStatus::PartiallyFilled,
            100.0,
            20.0,
        ));
        // 快照已计入20的成交，重复推送无增量
        assert_eq!(ledger.position(Side::Long), 80.0);
    }

    #[test]
    fn test_ledger_snapshot_seeds_baseline_for_unseen_order() {
        let mut ledger = PositionOrderLedger::new();
        // 从未通过事件见过的订单，快照带入30的已成交基线
        let open = vec![sample_order("5", Side::Long, OrderSide::Buy, 100.0, 30.0)];
        ledger.apply_snapshot(30.0, 0.0, &open);
        assert_eq!(ledger.resting(Side::Long, OrderSide::Buy), 70.0);

        // 之后的全部成交只追加70的增量
        ledger.apply_order_event(&sample_event(
            "5",
            Side::Long,
            OrderSide::Buy,
            OrderStatus::Filled,
            100.0,
            100.0,
        ));
        assert_eq!(ledger.position(Side::Long), 100.0);
        assert_eq!(ledger.resting(Side::Long, OrderSide::Buy), 0.0);
    }

    #[test]
    fn test_pending_event_set_enqueue_drain() {
        let mut pending = PendingEventSet::default();
        assert!(pending.is_empty());
        assert!(pending.take_rebalance().is_none());
        assert!(pending.take_drift().is_none());

        pending.push_tick(BookTick::new(0.12, 0.1201));
        pending.push_order_event(sample_event(
            "1",
            Side::Long,
            OrderSide::Buy,
            OrderStatus::Filled,
            10.0,
            10.0,
        ));
        assert!(pending.rebalance_pending());
        assert!(pending.drift_pending());

        let events = pending.take_rebalance().unwrap();
        assert_eq!(events.len(), 1);
        assert!(!pending.rebalance_pending());
        // drift在rebalance之后仍保持待处理
        assert!(pending.drift_pending());

        let tick = pending.take_drift().unwrap();
        assert_eq!(tick.best_bid, 0.12);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_pending_event_set_keeps_latest_tick() {
        let mut pending = PendingEventSet::default();
        pending.push_tick(BookTick::new(0.12, 0.1201));
        pending.push_tick(BookTick::new(0.13, 0.1301));
        let tick = pending.take_drift().unwrap();
        assert_eq!(tick.best_bid, 0.13);
    }

    #[test]
    fn test_hedge_init_state() {
        let now = Utc::now();
        let mut hedge = HedgeInitState::default();
        assert!(hedge.attempt_allowed(now, 5));

        hedge.mark_attempt(now);
        assert!(!hedge.attempt_allowed(now + Duration::seconds(3), 5));
        assert!(hedge.attempt_allowed(now + Duration::seconds(5), 5));

        hedge.mark_completed(now);
        assert!(hedge.in_grace_period(now + Duration::seconds(10), 15));
        assert!(!hedge.in_grace_period(now + Duration::seconds(16), 15));

        hedge.reset();
        assert!(!hedge.completed);
        assert!(!hedge.in_grace_period(now, 15));
    }

    #[test]
    fn test_api_usage_budget() {
        let now = Utc::now();
        let mut api = ApiUsageStats::new();
        // 预算 1200 * 0.8 = 960
        assert!(api.try_consume(now, 900, 1_200, 0.8));
        assert!(!api.try_consume(now, 100, 1_200, 0.8));
        assert_eq!(api.weight_used(), 900);
        // 一分钟后窗口重置
        assert!(api.try_consume(now + Duration::seconds(61), 100, 1_200, 0.8));
    }

    #[test]
    fn test_fast_market_detection() {
        let now = Utc::now();
        let mut api = ApiUsageStats::new();
        api.record_price(now, 100.0, 10);
        api.record_price(now + Duration::seconds(2), 100.05, 10);
        assert!(!api.is_fast_market(0.002));

        api.record_price(now + Duration::seconds(4), 100.3, 10);
        assert!(api.is_fast_market(0.002));

        // 窗口外的旧样本被丢弃后不再触发
        api.record_price(now + Duration::seconds(20), 100.31, 10);
        assert!(!api.is_fast_market(0.002));
    }

    #[test]
    fn test_order_sync_cooldown_selection() {
        let now = Utc::now();
        let mut api = ApiUsageStats::new();
        assert!(api.order_sync_allowed(now, false, 1, 3));

        api.mark_order_sync(now);
        let later = now + Duration::seconds(2);
        // 常规冷却3秒未到，快速行情冷却1秒已到
        assert!(!api.order_sync_allowed(later, false, 1, 3));
        assert!(api.order_sync_allowed(later, true, 1, 3));
    }

    #[test]
    fn test_side_quote_cooldowns() {
        let now = Utc::now();
        let mut quote = SideQuote::default();
        assert!(quote.order_cooldown_elapsed(now, 10));
        quote.last_order_time = Some(now);
        assert!(!quote.order_cooldown_elapsed(now + Duration::seconds(9), 10));
        assert!(quote.order_cooldown_elapsed(now + Duration::seconds(10), 10));

        quote.last_requote_time = Some(now);
        assert!(!quote.requote_cooldown_elapsed(now + Duration::seconds(14), 15));
        assert!(quote.requote_cooldown_elapsed(now + Duration::seconds(15), 15));
    }
}
