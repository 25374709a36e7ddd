use chrono::Utc;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

use super::config::{GridSettings, HedgeGridConfig, HedgeSettings};
use super::quantity::QuantityPolicy;
use super::risk::{ReduceDecision, RiskManager};
use super::state::{GridLevels, StrategyState};
use crate::core::{
    error::ExchangeError,
    exchange::ExchangeGateway,
    types::{BookTick, OrderRequest, Side, SymbolRules},
};
use crate::utils::generate_grid_order_id;

/// 网格引擎
///
/// 每个评估周期按固定顺序处理一侧持仓：风控减仓优先，
/// 其次零仓位初始化（对冲或单侧），最后是挂单有效性维护。
/// 引擎只在调度任务内被调用，不持有任何跨任务共享状态。
pub struct GridEngine {
    symbol: String,
    grid: GridSettings,
    hedge: HedgeSettings,
    rules: SymbolRules,
    gateway: Arc<dyn ExchangeGateway>,
    policy: QuantityPolicy,
}

impl GridEngine {
    pub fn new(
        config: &HedgeGridConfig,
        rules: SymbolRules,
        gateway: Arc<dyn ExchangeGateway>,
    ) -> Self {
        Self {
            symbol: config.contract_symbol(),
            grid: config.grid.clone(),
            hedge: config.hedge.clone(),
            rules,
            policy: QuantityPolicy::new(&config.quantity, config.grid.initial_quantity),
            gateway,
        }
    }

    /// 评估一侧持仓并执行必要的下单动作
    pub async fn evaluate(&mut self, side: Side, state: &mut StrategyState, risk: &RiskManager) {
        let tick = match state.latest_tick {
            Some(t) => t,
            None => {
                debug!("[{}] 尚无行情数据, 跳过评估", side);
                return;
            }
        };

        let position = state.ledger.position(side);

        // 风控检查优先于一切报价逻辑
        if position > 0.0 {
            let decision = risk.should_reduce_position(side, position * tick.mid());
            if decision.should_reduce {
                self.execute_reduction(side, position, &decision).await;
                return;
            }
        }

        if position <= 0.0 {
            self.initialize_side(side, tick, state, risk).await;
        } else {
            self.maintain_quotes(side, tick, state, risk).await;
        }
    }

    /// 执行风控减仓：市价单立即减掉建议比例的仓位
    async fn execute_reduction(&mut self, side: Side, position: f64, decision: &ReduceDecision) {
        let mut qty = self.rules.round_quantity(position * decision.suggested_ratio);
        if qty < self.rules.min_quantity {
            // 比例减仓不足最小下单量时全部平掉
            qty = self.rules.round_quantity(position);
        }
        qty = cap_at_position(qty, position, &self.rules);
        if qty < self.rules.min_quantity || qty <= 0.0 {
            warn!(
                "⚠️ [{}] 需要减仓但持仓{}不足最小下单量, 跳过",
                side, position
            );
            return;
        }

        warn!(
            "⚠️ [{}] 触发减仓: {} 紧迫={:?} 比例={} 数量={}",
            side, decision.reason, decision.urgency, decision.suggested_ratio, qty
        );
        let request = OrderRequest::market(&self.symbol, side.closing_order_side(), side, qty)
            .reduce_only(true)
            .with_client_order_id(generate_grid_order_id(side));
        if self.gateway.place_order(request).await.is_some() {
            info!("✅ [{}] 减仓单已提交: 数量={}", side, qty);
            // 减仓改变可用保证金, 动态数量缓存作废
            self.policy.invalidate_cache();
        }
    }

    /// 零仓位路径：优先尝试对冲开仓，不满足条件时退回单侧开仓
    async fn initialize_side(
        &mut self,
        side: Side,
        tick: BookTick,
        state: &mut StrategyState,
        risk: &RiskManager,
    ) {
        let now = Utc::now();

        if state.ledger.both_sides_flat() && self.hedge.enabled {
            // 上一轮对冲的静默期结束后重置，允许新一轮对冲开仓
            if state.hedge.completed && !state.hedge.in_grace_period(now, self.hedge.grace_period_secs)
            {
                info!("🔄 双边持仓归零, 重置对冲开仓状态");
                state.hedge.reset();
            }

            let eligible = !state.hedge.completed
                && state
                    .hedge
                    .attempt_allowed(now, self.hedge.attempt_interval_secs)
                && state
                    .quotes
                    .get(Side::Long)
                    .order_cooldown_elapsed(now, self.grid.order_first_time_secs)
                && state
                    .quotes
                    .get(Side::Short)
                    .order_cooldown_elapsed(now, self.grid.order_first_time_secs);
            if eligible {
                self.attempt_hedge_init(tick, state, risk).await;
                return;
            }
        }

        // 单侧开仓：冷却已过且本侧没有遗留的开仓挂单
        if !state
            .quotes
            .get(side)
            .order_cooldown_elapsed(now, self.grid.order_first_time_secs)
        {
            debug!("[{}] 开仓冷却未到, 跳过", side);
            return;
        }
        if state.ledger.reentry_qty(side) > 0.0 {
            debug!("[{}] 已有开仓挂单在场, 跳过", side);
            return;
        }

        let price = match side {
            Side::Long => tick.best_bid,
            Side::Short => tick.best_ask,
        };
        let qty = self.policy.optimal_quantity(
            now,
            tick.mid(),
            risk.available_balance(),
            risk.adjustment_ratio(),
            &self.rules,
        );

        let request = OrderRequest::limit(
            &self.symbol,
            side.opening_order_side(),
            side,
            self.rules.round_price(price),
            qty,
        )
        .with_client_order_id(generate_grid_order_id(side));
        if self.gateway.place_order(request).await.is_some() {
            info!("🚀 [{}] 初始开仓挂单: 价格={} 数量={}", side, price, qty);
            let quote = state.quotes.get_mut(side);
            quote.last_order_time = Some(now);
            quote.target_quantity = qty;
        }
    }

    /// 对冲开仓：清空双边挂单后同时在买一挂多头、卖一挂空头
    async fn attempt_hedge_init(
        &mut self,
        tick: BookTick,
        state: &mut StrategyState,
        risk: &RiskManager,
    ) {
        let now = Utc::now();
        state.hedge.mark_attempt(now);
        info!(
            "🚀 尝试对冲开仓: bid={} ask={}",
            tick.best_bid, tick.best_ask
        );

        if !self.gateway.cancel_all_orders(&self.symbol).await {
            warn!("⚠️ 对冲开仓前撤单失败, 本轮放弃");
            return;
        }
        tokio::time::sleep(Duration::from_millis(self.hedge.settle_delay_ms)).await;

        let qty = self.policy.hedge_init_quantity(
            now,
            tick.mid(),
            risk.available_balance(),
            risk.adjustment_ratio(),
            &self.rules,
        );

        let long_request = OrderRequest::limit(
            &self.symbol,
            Side::Long.opening_order_side(),
            Side::Long,
            self.rules.round_price(tick.best_bid),
            qty,
        )
        .with_client_order_id(generate_grid_order_id(Side::Long));
        let long_ok = self.gateway.place_order(long_request).await.is_some();
        if long_ok {
            let quote = state.quotes.get_mut(Side::Long);
            quote.last_order_time = Some(now);
            quote.target_quantity = qty;
        }

        let short_request = OrderRequest::limit(
            &self.symbol,
            Side::Short.opening_order_side(),
            Side::Short,
            self.rules.round_price(tick.best_ask),
            qty,
        )
        .with_client_order_id(generate_grid_order_id(Side::Short));
        let short_ok = self.gateway.place_order(short_request).await.is_some();
        if short_ok {
            let quote = state.quotes.get_mut(Side::Short);
            quote.last_order_time = Some(now);
            quote.target_quantity = qty;
        }

        if long_ok && short_ok {
            state.hedge.mark_completed(now);
            info!("✅ 对冲开仓完成: 双边数量={}", qty);
        } else {
            warn!("⚠️ 对冲开仓未完全成功: long={} short={}", long_ok, short_ok);
        }
    }

    /// 持仓路径：校验挂单有效性，失效则在冷却约束下重新挂单
    async fn maintain_quotes(
        &mut self,
        side: Side,
        tick: BookTick,
        state: &mut StrategyState,
        risk: &RiskManager,
    ) {
        let now = Utc::now();
        if state.hedge.in_grace_period(now, self.hedge.grace_period_secs) {
            debug!("[{}] 对冲开仓静默期内, 跳过挂单维护", side);
            return;
        }

        let mid = tick.mid();
        let position = state.ledger.position(side);
        let tp_qty = state.ledger.take_profit_qty(side);
        let reentry_qty = state.ledger.reentry_qty(side);
        let quote = state.quotes.get(side);

        if self.quotes_valid(quote.target_quantity, tp_qty, reentry_qty, quote.levels, mid) {
            return;
        }

        // 止盈腿完全缺失时仓位处于裸露状态，跳过冷却立即补挂
        let zero_tp_emergency = position > 0.0 && tp_qty == 0.0;
        if !zero_tp_emergency
            && !quote.requote_cooldown_elapsed(now, self.grid.requote_min_interval_secs)
        {
            debug!("[{}] 挂单失效但重挂冷却未到", side);
            return;
        }
        if zero_tp_emergency {
            warn!("⚠️ [{}] 止盈挂单缺失, 立即重新挂单", side);
        }

        self.requote_side(side, tick, state, risk).await;
    }

    /// 当前挂单是否仍然有效：两腿数量达标且价位未偏离理想网格
    fn quotes_valid(
        &self,
        target_quantity: f64,
        tp_qty: f64,
        reentry_qty: f64,
        levels: Option<GridLevels>,
        mid: f64,
    ) -> bool {
        if target_quantity <= 0.0 {
            return false;
        }
        let threshold = self.grid.valid_qty_fraction * target_quantity;
        if tp_qty < threshold || reentry_qty < threshold {
            return false;
        }

        match levels {
            Some(levels) => {
                let ideal = GridLevels::from_mid(mid, self.grid.spacing, &self.rules);
                let tolerance = mid * self.grid.spacing;
                (levels.upper_price - ideal.upper_price).abs() <= tolerance
                    && (levels.lower_price - ideal.lower_price).abs() <= tolerance
            }
            None => false,
        }
    }

    /// 撤掉本侧全部挂单后，在新网格价位挂止盈腿和补仓腿
    async fn requote_side(
        &mut self,
        side: Side,
        tick: BookTick,
        state: &mut StrategyState,
        risk: &RiskManager,
    ) {
        if !self.cancel_side_orders(side, state).await {
            return;
        }

        let now = Utc::now();
        let mid = tick.mid();
        let levels = GridLevels::from_mid(mid, self.grid.spacing, &self.rules);
        let position = state.ledger.position(side);

        // 止盈腿：全部持仓挂在远端边界
        let tp_qty = cap_at_position(self.rules.round_quantity(position), position, &self.rules);
        if tp_qty > 0.0 {
            let request = OrderRequest::limit(
                &self.symbol,
                side.closing_order_side(),
                side,
                levels.take_profit_price(side),
                tp_qty,
            )
            .reduce_only(true)
            .with_client_order_id(generate_grid_order_id(side));
            if self.gateway.place_order(request).await.is_some() {
                info!(
                    "📊 [{}] 止盈挂单: 价格={} 数量={}",
                    side,
                    levels.take_profit_price(side),
                    tp_qty
                );
            }
        } else {
            warn!("⚠️ [{}] 持仓{}不足最小精度, 无法挂止盈", side, position);
        }

        // 补仓腿：策略数量挂在近端边界
        let reentry_qty = self.policy.optimal_quantity(
            now,
            mid,
            risk.available_balance(),
            risk.adjustment_ratio(),
            &self.rules,
        );
        let request = OrderRequest::limit(
            &self.symbol,
            side.opening_order_side(),
            side,
            levels.reentry_price(side),
            reentry_qty,
        )
        .with_client_order_id(generate_grid_order_id(side));
        if self.gateway.place_order(request).await.is_some() {
            info!(
                "📊 [{}] 补仓挂单: 价格={} 数量={}",
                side,
                levels.reentry_price(side),
                reentry_qty
            );
        }

        let quote = state.quotes.get_mut(side);
        quote.levels = Some(levels);
        quote.target_quantity = reentry_qty;
        quote.last_requote_time = Some(now);
        quote.last_order_time = Some(now);
    }

    /// 撤掉指定持仓方向的全部挂单，返回是否可以继续后续挂单
    async fn cancel_side_orders(&self, side: Side, state: &mut StrategyState) -> bool {
        let orders = match self.gateway.fetch_open_orders(&self.symbol).await {
            Ok(orders) => orders,
            Err(e) => {
                warn!("⚠️ [{}] 查询挂单失败, 放弃本轮重新挂单: {}", side, e);
                return false;
            }
        };

        for order in orders.iter().filter(|o| o.position_side == side) {
            match self.gateway.cancel_order(&self.symbol, &order.id).await {
                Ok(()) => debug!("[{}] 已撤单: {}", side, order.id),
                Err(ExchangeError::OrderNotFound { order_id, .. }) => {
                    // 撤单竞态：订单已成交或已被撤, 请求一次权威同步对齐台账
                    info!("[{}] 订单已不在场: {}", side, order_id);
                    state.resync_requested = true;
                }
                Err(e) => warn!("⚠️ [{}] 撤单失败 {}: {}", side, order.id, e),
            }
        }
        true
    }
}

/// 数量不超过实际持仓，精度取整向上越界时退一个最小步长
fn cap_at_position(qty: f64, position: f64, rules: &SymbolRules) -> f64 {
    if qty <= position {
        return qty;
    }
    let step = 10f64.powi(-(rules.quantity_precision as i32));
    rules.round_quantity((qty - step).max(0.0))
}
