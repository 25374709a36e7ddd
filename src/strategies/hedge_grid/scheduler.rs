use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{interval, MissedTickBehavior};

use super::config::{HedgeGridConfig, SyncSettings};
use super::engine::GridEngine;
use super::risk::RiskManager;
use super::state::{PendingEventSet, StrategyState};
use crate::core::exchange::ExchangeGateway;
use crate::core::types::{BookTick, OrderUpdateEvent, Side};

/// 事件调度器
///
/// 引擎状态的唯一消费者。固定tick驱动，订单事件(rebalance)优先于
/// 价格漂移(drift)，一个tick只处理其中一类，未处理的drift保留到
/// 下一个tick。权威同步只在这里发起，从不在行情回调里发起。
pub struct EventScheduler {
    symbol: String,
    drift_threshold: f64,
    tick_interval_secs: u64,
    sync: SyncSettings,
    gateway: Arc<dyn ExchangeGateway>,
    state: Arc<Mutex<StrategyState>>,
    pending: Arc<Mutex<PendingEventSet>>,
    running: Arc<RwLock<bool>>,
    engine: GridEngine,
    risk: RiskManager,
}

impl EventScheduler {
    pub fn new(
        config: &HedgeGridConfig,
        gateway: Arc<dyn ExchangeGateway>,
        state: Arc<Mutex<StrategyState>>,
        pending: Arc<Mutex<PendingEventSet>>,
        running: Arc<RwLock<bool>>,
        engine: GridEngine,
        risk: RiskManager,
    ) -> Self {
        Self {
            symbol: config.contract_symbol(),
            drift_threshold: config.grid.price_drift_threshold,
            tick_interval_secs: config.execution.tick_interval_secs,
            sync: config.sync.clone(),
            gateway,
            state,
            pending,
            running,
            engine,
            risk,
        }
    }

    /// 调度主循环，运行标志清除后清空剩余事件并退出
    pub async fn run(mut self) {
        info!("🚀 调度循环启动: tick间隔={}秒", self.tick_interval_secs);
        let mut ticker = interval(Duration::from_secs(self.tick_interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if !*self.running.read().await {
                self.drain_on_shutdown().await;
                break;
            }
            self.tick().await;
        }
        info!("✅ 调度循环退出");
    }

    /// 单个调度周期
    pub(super) async fn tick(&mut self) {
        let rebalance = self.pending.lock().await.take_rebalance();
        if let Some(events) = rebalance {
            self.handle_rebalance(events).await;
        } else {
            let drift = self.pending.lock().await.take_drift();
            if let Some(tick) = drift {
                self.handle_drift(tick).await;
            }
        }
        self.risk.log_metrics();
    }

    /// 订单事件处理：记账、立即权威同步、双侧评估
    async fn handle_rebalance(&mut self, events: VecDeque<OrderUpdateEvent>) {
        let now = Utc::now();
        debug!("处理{}条订单事件", events.len());

        self.risk.refresh_account(self.gateway.as_ref(), now).await;
        self.risk
            .refresh_positions(self.gateway.as_ref(), &self.symbol, now)
            .await;

        let mut state = self.state.lock().await;
        for event in &events {
            state.ledger.apply_order_event(event);
        }

        // 事件流是尽力而为的，尽快用权威挂单快照对齐一次台账
        self.sync_orders(&mut state, now, false).await;

        self.engine.evaluate(Side::Long, &mut state, &self.risk).await;
        self.engine.evaluate(Side::Short, &mut state, &self.risk).await;
        self.finish_cycle(&mut state, now).await;
    }

    /// 价格漂移处理：超过阈值才做周期同步与评估
    async fn handle_drift(&mut self, tick: BookTick) {
        let now = Utc::now();
        let mid = tick.mid();

        let mut state = self.state.lock().await;
        state.latest_tick = Some(tick);
        state
            .api
            .record_price(now, mid, self.sync.fast_market_window_secs);

        if let Some(last) = state.last_drift_mid {
            if last > 0.0 && ((mid - last) / last).abs() < self.drift_threshold {
                debug!(
                    "价格漂移{:.4}%未达阈值, 跳过",
                    ((mid - last) / last).abs() * 100.0
                );
                return;
            }
        }
        state.last_drift_mid = Some(mid);

        self.risk.refresh_account(self.gateway.as_ref(), now).await;
        self.risk
            .refresh_positions(self.gateway.as_ref(), &self.symbol, now)
            .await;

        if state
            .api
            .position_sync_due(now, self.sync.snapshot_interval_secs)
        {
            self.sync_positions(&mut state, now).await;
        }
        if state.api.order_sync_due(now, self.sync.snapshot_interval_secs) {
            self.sync_orders(&mut state, now, true).await;
        }

        self.engine.evaluate(Side::Long, &mut state, &self.risk).await;
        self.engine.evaluate(Side::Short, &mut state, &self.risk).await;
        self.finish_cycle(&mut state, now).await;
    }

    /// 评估后若引擎发现撤单竞态, 立即补一次权威同步
    async fn finish_cycle(&self, state: &mut StrategyState, now: DateTime<Utc>) {
        if state.resync_requested {
            state.resync_requested = false;
            self.sync_orders(state, now, true).await;
        }
    }

    /// 持仓权威快照
    async fn sync_positions(&self, state: &mut StrategyState, now: DateTime<Utc>) {
        if !state.api.try_consume(
            now,
            self.sync.fetch_orders_weight,
            self.sync.api_weight_limit_per_minute,
            self.sync.safety_margin,
        ) {
            warn!("⚠️ API权重接近上限, 跳过持仓同步");
            return;
        }
        let (long, short) = self.gateway.get_position(&self.symbol).await;
        state.ledger.apply_position_snapshot(long, short);
        state.api.mark_position_sync(now);
        debug!("持仓同步: long={} short={}", long, short);
    }

    /// 挂单权威快照；force跳过自适应冷却，权重预算始终生效
    async fn sync_orders(&self, state: &mut StrategyState, now: DateTime<Utc>, force: bool) {
        if !force {
            let fast = state.api.is_fast_market(self.sync.fast_market_threshold);
            if !state.api.order_sync_allowed(
                now,
                fast,
                self.sync.fast_cooldown_secs,
                self.sync.orders_cooldown_secs,
            ) {
                debug!("挂单同步冷却未到, 跳过");
                return;
            }
        }
        if !state.api.try_consume(
            now,
            self.sync.fetch_orders_weight,
            self.sync.api_weight_limit_per_minute,
            self.sync.safety_margin,
        ) {
            warn!("⚠️ API权重接近上限, 跳过挂单同步");
            return;
        }

        match self.gateway.fetch_open_orders(&self.symbol).await {
            Ok(orders) => {
                state.ledger.apply_order_snapshot(&orders);
                state.api.mark_order_sync(now);
                debug!("挂单同步: {}笔在场", orders.len());
            }
            Err(e) => warn!("⚠️ 挂单同步失败: {}", e),
        }
    }

    /// 停机前把剩余的订单事件同步记入台账
    async fn drain_on_shutdown(&mut self) {
        let (events, tick) = {
            let mut pending = self.pending.lock().await;
            (pending.take_rebalance(), pending.take_drift())
        };

        let mut state = self.state.lock().await;
        if let Some(events) = events {
            info!("📊 停机前应用{}条剩余订单事件", events.len());
            for event in &events {
                state.ledger.apply_order_event(event);
            }
        }
        if let Some(tick) = tick {
            state.latest_tick = Some(tick);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::{config as test_config, rules, MockGateway};
    use super::*;
    use crate::core::types::{OrderSide, OrderStatus};

    struct Harness {
        gateway: Arc<MockGateway>,
        state: Arc<Mutex<StrategyState>>,
        pending: Arc<Mutex<PendingEventSet>>,
        running: Arc<RwLock<bool>>,
        scheduler: EventScheduler,
    }

    fn harness(running_now: bool) -> Harness {
        let cfg = test_config();
        let gateway = Arc::new(MockGateway::new());
        let state = Arc::new(Mutex::new(StrategyState::default()));
        let pending = Arc::new(Mutex::new(PendingEventSet::default()));
        let running = Arc::new(RwLock::new(running_now));
        let engine = GridEngine::new(&cfg, rules(), gateway.clone());
        let risk = RiskManager::new(&cfg.risk);
        let scheduler = EventScheduler::new(
            &cfg,
            gateway.clone(),
            state.clone(),
            pending.clone(),
            running.clone(),
            engine,
            risk,
        );
        Harness {
            gateway,
            state,
            pending,
            running,
            scheduler,
        }
    }

    fn fill_event(order_id: &str, qty: f64) -> OrderUpdateEvent {
        OrderUpdateEvent {
            symbol: "DOGEUSDC".to_string(),
            order_id: order_id.to_string(),
            client_order_id: None,
            side: OrderSide::Buy,
            position_side: Side::Long,
            status: OrderStatus::Filled,
            quantity: qty,
            cumulative_filled: qty,
            average_price: 0.12,
            reduce_only: false,
        }
    }

    #[tokio::test]
    async fn test_rebalance_handled_before_drift() {
        let mut h = harness(true);
        {
            let mut pending = h.pending.lock().await;
            pending.push_tick(BookTick::new(0.11990, 0.12010));
            pending.push_order_event(fill_event("1", 30.0));
        }

        h.scheduler.tick().await;

        // 订单事件已记账
        assert_eq!(h.state.lock().await.ledger.position(Side::Long), 30.0);
        // drift保留到下一个tick
        assert!(h.pending.lock().await.drift_pending());
        assert!(h.gateway.placed().is_empty());
    }

    #[tokio::test]
    async fn test_drift_handled_on_next_tick() {
        let mut h = harness(true);
        {
            let mut pending = h.pending.lock().await;
            pending.push_tick(BookTick::new(0.11990, 0.12010));
            pending.push_order_event(fill_event("1", 30.0));
        }

        h.scheduler.tick().await;
        h.scheduler.tick().await;

        let state = h.state.lock().await;
        assert!(!h.pending.lock().await.drift_pending());
        assert_eq!(state.last_drift_mid, Some(0.12));
        // 持仓快照(0,0)后双边归零, drift评估触发了对冲开仓
        assert_eq!(h.gateway.placed().len(), 2);
    }

    #[tokio::test]
    async fn test_small_drift_skipped() {
        let mut h = harness(true);
        {
            let mut state = h.state.lock().await;
            state.last_drift_mid = Some(0.12);
        }
        {
            // mid=0.12006, 漂移0.05%不足0.2%
            let mut pending = h.pending.lock().await;
            pending.push_tick(BookTick::new(0.12000, 0.12012));
        }

        h.scheduler.tick().await;

        let state = h.state.lock().await;
        assert!(h.gateway.placed().is_empty());
        assert_eq!(state.last_drift_mid, Some(0.12));
        // 最新行情仍然进入状态
        assert!(state.latest_tick.is_some());
    }

    #[tokio::test]
    async fn test_shutdown_drains_pending_events() {
        let mut h = harness(false);
        {
            let mut pending = h.pending.lock().await;
            pending.push_order_event(fill_event("9", 25.0));
            pending.push_tick(BookTick::new(0.11990, 0.12010));
        }

        // 运行标志已清除: 首个tick触发清空然后退出
        h.scheduler.run().await;

        assert_eq!(h.state.lock().await.ledger.position(Side::Long), 25.0);
        let pending = h.pending.lock().await;
        assert!(!pending.rebalance_pending());
        assert!(!pending.drift_pending());
        assert!(!*h.running.read().await);
    }

    #[tokio::test]
    async fn test_resync_request_consumed() {
        let mut h = harness(true);
        {
            h.state.lock().await.resync_requested = true;
        }
        {
            let mut pending = h.pending.lock().await;
            pending.push_order_event(fill_event("1", 10.0));
        }

        h.scheduler.tick().await;

        assert!(!h.state.lock().await.resync_requested);
    }
}
