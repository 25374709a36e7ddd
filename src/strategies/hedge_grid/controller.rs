/// 对冲网格策略控制器
///
/// 负责启动引导（持仓模式、杠杆、交易规则、初始快照、ListenKey）、
/// 后台任务编排（调度器、行情流、用户数据流、ListenKey续期）和优雅停机。
use anyhow::Context;
use chrono::Utc;
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

use super::config::HedgeGridConfig;
use super::engine::GridEngine;
use super::risk::RiskManager;
use super::scheduler::EventScheduler;
use super::state::{PendingEventSet, StrategyState};
use crate::core::config::Config;
use crate::core::exchange::ExchangeGateway;

/// 对冲网格策略实例
///
/// 内部全部以`Arc`共享，克隆代价低，后台任务各持一份克隆。
#[derive(Clone)]
pub struct HedgeGridStrategy {
    pub(super) config: Arc<HedgeGridConfig>,
    pub(super) endpoints: Config,
    pub(super) gateway: Arc<dyn ExchangeGateway>,
    pub(super) symbol: String,
    pub(super) state: Arc<Mutex<StrategyState>>,
    pub(super) pending: Arc<Mutex<PendingEventSet>>,
    pub(super) running: Arc<RwLock<bool>>,
    pub(super) listen_key: Arc<RwLock<Option<String>>>,
    scheduler_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
    task_handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
    cleanup_done: Arc<Mutex<bool>>,
}

impl HedgeGridStrategy {
    pub fn new(
        config: HedgeGridConfig,
        endpoints: Config,
        gateway: Arc<dyn ExchangeGateway>,
    ) -> Self {
        let symbol = config.contract_symbol();
        Self {
            config: Arc::new(config),
            endpoints,
            gateway,
            symbol,
            state: Arc::new(Mutex::new(StrategyState::default())),
            pending: Arc::new(Mutex::new(PendingEventSet::default())),
            running: Arc::new(RwLock::new(false)),
            listen_key: Arc::new(RwLock::new(None)),
            scheduler_handle: Arc::new(Mutex::new(None)),
            task_handles: Arc::new(Mutex::new(Vec::new())),
            cleanup_done: Arc::new(Mutex::new(false)),
        }
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// WebSocket基础地址，配置中的`websocket.url`可覆盖交易所默认地址
    pub(super) fn ws_base(&self) -> String {
        self.config
            .websocket
            .url
            .clone()
            .unwrap_or_else(|| self.endpoints.ws_futures_url.clone())
    }

    /// 启动策略：完成交易所引导后拉起全部后台任务
    pub async fn start(&self) -> anyhow::Result<()> {
        if self.is_running().await {
            warn!("⚠️ 策略已在运行中, 忽略重复启动");
            return Ok(());
        }

        info!(
            "🚀 启动对冲网格策略: {} ({})",
            self.config.strategy.name, self.symbol
        );

        // 1. 双向持仓模式是策略前提, 开不了就不能跑
        self.gateway
            .setup_hedge_mode()
            .await
            .context("开启双向持仓模式失败")?;

        // 2. 杠杆设置失败不致命, 已有持仓时交易所会拒绝修改
        if let Err(e) = self
            .gateway
            .set_leverage(&self.symbol, self.config.grid.leverage)
            .await
        {
            warn!("⚠️ 设置杠杆失败: {}, 沿用账户当前杠杆", e);
        }

        // 3. 交易规则决定价格与数量精度
        let rules = self
            .gateway
            .fetch_symbol_rules(&self.symbol)
            .await
            .context("获取交易规则失败")?;
        info!(
            "📊 交易规则: 价格精度{} 数量精度{} 最小数量{} 最小名义价值{}",
            rules.price_precision, rules.quantity_precision, rules.min_quantity, rules.min_notional
        );

        // 4. 可选的启动清理: 撤掉历史挂单并平掉遗留持仓
        if self.config.execution.startup_cleanup {
            info!("🧹 启动前清理账户...");
            self.gateway.cleanup_account(&self.symbol).await;
            sleep(Duration::from_secs(3)).await;
        }

        // 5. 初始权威快照
        let now = Utc::now();
        let (long_position, short_position) = self.gateway.get_position(&self.symbol).await;
        {
            let mut state = self.state.lock().await;
            match self.gateway.fetch_open_orders(&self.symbol).await {
                Ok(orders) => {
                    state
                        .ledger
                        .apply_snapshot(long_position, short_position, &orders);
                    state.api.mark_order_sync(now);
                }
                Err(e) => {
                    warn!("⚠️ 获取初始挂单失败: {}, 以空挂单视角启动", e);
                    state
                        .ledger
                        .apply_position_snapshot(long_position, short_position);
                }
            }
            state.api.mark_position_sync(now);
        }
        info!(
            "📊 初始持仓: 多头{} 空头{}",
            long_position, short_position
        );

        // 6. 风控初始数据, 拿不到时内部退化为保守假设
        let mut risk = RiskManager::new(&self.config.risk);
        risk.refresh_account(self.gateway.as_ref(), now).await;
        risk.refresh_positions(self.gateway.as_ref(), &self.symbol, now)
            .await;

        // 7. 用户数据流凭证
        let key = self
            .gateway
            .create_listen_key()
            .await
            .context("创建ListenKey失败")?;
        *self.listen_key.write().await = Some(key);

        // 8. 置运行位后拉起后台任务
        *self.running.write().await = true;

        let engine = GridEngine::new(&self.config, rules, self.gateway.clone());
        let scheduler = EventScheduler::new(
            &self.config,
            self.gateway.clone(),
            self.state.clone(),
            self.pending.clone(),
            self.running.clone(),
            engine,
            risk,
        );
        *self.scheduler_handle.lock().await = Some(tokio::spawn(scheduler.run()));

        let mut handles = self.task_handles.lock().await;
        handles.push(tokio::spawn(self.clone().market_stream_task()));
        handles.push(tokio::spawn(self.clone().user_stream_task()));
        handles.push(tokio::spawn(self.clone().listen_key_keepalive_task()));
        drop(handles);

        info!("✅ 策略已启动: 调度器 + 行情流 + 用户数据流 + ListenKey续期");
        Ok(())
    }

    /// 停止策略
    ///
    /// 停机顺序: 清运行位 → 等调度器排空收尾 → 终止流任务 → 可选账户清理。
    pub async fn stop(&self) {
        {
            let mut running = self.running.write().await;
            if !*running {
                warn!("⚠️ 策略未在运行");
                return;
            }
            *running = false;
        }

        info!("🛑 正在停止策略: {}", self.symbol);

        // 调度器自己负责排空剩余事件, 等它退出
        if let Some(handle) = self.scheduler_handle.lock().await.take() {
            if let Err(e) = handle.await {
                warn!("⚠️ 等待调度器退出异常: {}", e);
            }
        }

        // 流任务只是事件生产者, 直接终止
        for handle in self.task_handles.lock().await.drain(..) {
            handle.abort();
        }

        self.run_shutdown_cleanup().await;
        info!("✅ 策略已停止");
    }

    /// 重建ListenKey, 过期或续期失败时由流任务触发
    pub(super) async fn rotate_listen_key(&self) {
        match self.gateway.create_listen_key().await {
            Ok(key) => {
                *self.listen_key.write().await = Some(key);
                info!("✅ ListenKey已重建");
            }
            Err(e) => {
                warn!("⚠️ 重建ListenKey失败: {}", e);
            }
        }
    }

    /// 停机清理, 无论stop被调用几次只执行一次
    async fn run_shutdown_cleanup(&self) {
        {
            let mut done = self.cleanup_done.lock().await;
            if *done {
                return;
            }
            *done = true;
        }

        if !self.config.execution.shutdown_cleanup {
            info!("停机清理未开启, 保留当前挂单与持仓");
            return;
        }

        info!("🧹 停机清理: 撤销全部挂单并市价平仓...");
        if !self.gateway.cancel_all_orders(&self.symbol).await {
            warn!("⚠️ 停机撤单未完全成功");
        }
        if !self.gateway.close_all_positions(&self.symbol).await {
            warn!("⚠️ 停机平仓未完全成功");
        }
    }
}
