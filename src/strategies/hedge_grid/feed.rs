/// 行情与用户数据流任务
///
/// 行情流订阅`<symbol>@bookTicker`并节流入队漂移检查事件；
/// 用户数据流接收`ORDER_TRADE_UPDATE`订单生命周期推送；
/// 续期任务定期为ListenKey续命。三个任务都只是事件生产者，
/// 不直接改写策略台账。
use chrono::Utc;
use log::{debug, error, info, warn};
use serde::Deserialize;
use tokio::time::{interval, sleep, timeout, Duration};

use super::controller::HedgeGridStrategy;
use crate::core::types::{BookTick, OrderSide, OrderStatus, OrderUpdateEvent, Side};
use crate::core::websocket::{
    build_subscribe_message, is_control_response, BaseWebSocketClient, ConnectionState,
    HeartbeatManager, ReconnectManager, WebSocketClient,
};
use crate::utils::stream_name;

impl HedgeGridStrategy {
    /// 行情流任务：bookTicker推送节流后入队
    pub(super) async fn market_stream_task(self) {
        let ws_cfg = self.config.websocket.clone();
        let throttle = chrono::Duration::milliseconds(self.config.execution.tick_throttle_ms as i64);
        let heartbeat =
            HeartbeatManager::new(ws_cfg.heartbeat_interval_secs, ws_cfg.stale_timeout_secs);
        let reconnect = ReconnectManager::new(
            ws_cfg.max_reconnect_attempts,
            ws_cfg.reconnect_delay_secs,
            ws_cfg.max_reconnect_delay_secs,
        );
        let mut client = BaseWebSocketClient::new(self.ws_base());
        let mut last_enqueued = Utc::now() - chrono::Duration::seconds(3600);

        while self.is_running().await {
            if !self.ensure_connected(&mut client, &reconnect).await {
                if self.is_running().await {
                    error!("❌ 行情流重连次数耗尽, 任务退出");
                }
                break;
            }
            if client
                .send(build_subscribe_message("bookTicker", &self.symbol))
                .await
                .is_err()
            {
                continue;
            }
            heartbeat.touch().await;
            info!("📡 已订阅行情: {}", stream_name(&self.symbol, "bookTicker"));

            while self.is_running().await {
                match timeout(heartbeat.get_interval(), client.receive()).await {
                    Ok(Ok(Some(text))) => {
                        heartbeat.touch().await;
                        if is_control_response(&text) {
                            continue;
                        }
                        if let Some(tick) = parse_book_ticker(&text, &self.symbol) {
                            let now = Utc::now();
                            if now - last_enqueued >= throttle {
                                last_enqueued = now;
                                self.pending.lock().await.push_tick(tick);
                            }
                        }
                    }
                    Ok(Ok(None)) => {
                        // 控制帧已在客户端内部处理, 只需确认连接还活着
                        heartbeat.touch().await;
                        if client.get_state() != ConnectionState::Connected {
                            break;
                        }
                    }
                    Ok(Err(_)) => break,
                    Err(_) => {
                        // 心跳间隔内无任何消息
                        if heartbeat.is_stale().await {
                            warn!(
                                "⚠️ 行情流超过{}秒无消息, 强制重连",
                                ws_cfg.stale_timeout_secs
                            );
                            break;
                        }
                        if client.ping().await.is_err() {
                            break;
                        }
                    }
                }
            }
            let _ = client.disconnect().await;
        }
        info!("行情流任务退出");
    }

    /// 用户数据流任务：订单生命周期推送入队，ListenKey过期时重建并重连
    pub(super) async fn user_stream_task(self) {
        let ws_cfg = self.config.websocket.clone();
        let heartbeat =
            HeartbeatManager::new(ws_cfg.heartbeat_interval_secs, ws_cfg.stale_timeout_secs);
        let reconnect = ReconnectManager::new(
            ws_cfg.max_reconnect_attempts,
            ws_cfg.reconnect_delay_secs,
            ws_cfg.max_reconnect_delay_secs,
        );

        while self.is_running().await {
            let key = match self.listen_key.read().await.clone() {
                Some(key) => key,
                None => {
                    sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            // ListenKey拼进连接地址, 每次重连都取最新的
            let mut client = BaseWebSocketClient::new(format!("{}/{}", self.ws_base(), key));
            if !self.ensure_connected(&mut client, &reconnect).await {
                if self.is_running().await {
                    error!("❌ 用户数据流重连次数耗尽, 任务退出");
                }
                break;
            }
            heartbeat.touch().await;
            info!("📡 用户数据流已连接");

            while self.is_running().await {
                match timeout(heartbeat.get_interval(), client.receive()).await {
                    Ok(Ok(Some(text))) => {
                        heartbeat.touch().await;
                        if text.contains("\"listenKeyExpired\"") {
                            warn!("⚠️ ListenKey已过期, 重建后重连");
                            self.rotate_listen_key().await;
                            break;
                        }
                        if let Some(event) = parse_order_update(&text, &self.symbol) {
                            debug!(
                                "📥 订单事件: {} {} {:?} 累计成交{}",
                                event.order_id,
                                event.position_side,
                                event.status,
                                event.cumulative_filled
                            );
                            self.pending.lock().await.push_order_event(event);
                        }
                    }
                    Ok(Ok(None)) => {
                        heartbeat.touch().await;
                        if client.get_state() != ConnectionState::Connected {
                            break;
                        }
                    }
                    Ok(Err(_)) => break,
                    Err(_) => {
                        if heartbeat.is_stale().await {
                            warn!(
                                "⚠️ 用户数据流超过{}秒无消息, 强制重连",
                                ws_cfg.stale_timeout_secs
                            );
                            break;
                        }
                        if client.ping().await.is_err() {
                            break;
                        }
                    }
                }
            }
            let _ = client.disconnect().await;
        }
        info!("用户数据流任务退出");
    }

    /// ListenKey续期任务
    pub(super) async fn listen_key_keepalive_task(self) {
        let mut timer = interval(Duration::from_secs(
            self.config.websocket.listen_key_keepalive_secs.max(1),
        ));
        // 首个tick立即完成, 跳过它
        timer.tick().await;

        loop {
            timer.tick().await;
            if !self.is_running().await {
                break;
            }
            let key = self.listen_key.read().await.clone();
            if let Some(key) = key {
                match self.gateway.keepalive_listen_key(&key).await {
                    Ok(()) => debug!("🔄 ListenKey续期成功"),
                    Err(e) => {
                        warn!("⚠️ ListenKey续期失败: {}, 重建", e);
                        self.rotate_listen_key().await;
                    }
                }
            }
        }
        info!("ListenKey续期任务退出");
    }

    /// 建立连接，失败按退避策略重试
    ///
    /// 返回`false`表示重连次数耗尽或策略已停止。
    async fn ensure_connected(
        &self,
        client: &mut BaseWebSocketClient,
        reconnect: &ReconnectManager,
    ) -> bool {
        if client.get_state() == ConnectionState::Connected {
            return true;
        }
        if client.connect().await.is_ok() {
            reconnect.reset().await;
            return true;
        }
        while self.is_running().await {
            if reconnect.exhausted().await {
                return false;
            }
            if reconnect.try_reconnect(client).await.is_ok() {
                return true;
            }
        }
        false
    }
}

/// bookTicker推送
///
/// `{"e":"bookTicker","s":"DOGEUSDC","b":"0.11990","a":"0.12010",...}`
fn parse_book_ticker(text: &str, symbol: &str) -> Option<BookTick> {
    #[derive(Deserialize)]
    struct BookTickerMessage {
        #[serde(rename = "e", default)]
        event: String,
        #[serde(rename = "s", default)]
        symbol: String,
        #[serde(rename = "b", default)]
        best_bid: String,
        #[serde(rename = "a", default)]
        best_ask: String,
    }

    let msg: BookTickerMessage = serde_json::from_str(text).ok()?;
    if msg.event != "bookTicker" || !msg.symbol.eq_ignore_ascii_case(symbol) {
        return None;
    }
    let bid = msg.best_bid.parse::<f64>().ok()?;
    let ask = msg.best_ask.parse::<f64>().ok()?;
    if bid <= 0.0 || ask <= 0.0 {
        return None;
    }
    Some(BookTick::new(bid, ask))
}

/// ORDER_TRADE_UPDATE推送中的订单载荷
///
/// 交易所的订单ID是数字，入台账前统一转成字符串。
/// 无法识别的方向或状态直接丢弃整条事件，由周期快照兜底。
fn parse_order_update(text: &str, symbol: &str) -> Option<OrderUpdateEvent> {
    #[derive(Deserialize)]
    struct UserStreamMessage {
        #[serde(rename = "e", default)]
        event: String,
        #[serde(rename = "o")]
        order: Option<OrderPayload>,
    }

    #[derive(Deserialize)]
    struct OrderPayload {
        #[serde(rename = "s")]
        symbol: String,
        #[serde(rename = "i")]
        order_id: i64,
        #[serde(rename = "c", default)]
        client_order_id: String,
        #[serde(rename = "S")]
        side: String,
        #[serde(rename = "ps")]
        position_side: String,
        #[serde(rename = "X")]
        status: String,
        #[serde(rename = "q", default)]
        quantity: String,
        #[serde(rename = "z", default)]
        cumulative_filled: String,
        #[serde(rename = "ap", default)]
        average_price: String,
        #[serde(rename = "R", default)]
        reduce_only: bool,
    }

    let msg: UserStreamMessage = serde_json::from_str(text).ok()?;
    if msg.event != "ORDER_TRADE_UPDATE" {
        return None;
    }
    let payload = msg.order?;
    if !payload.symbol.eq_ignore_ascii_case(symbol) {
        return None;
    }
    let side = OrderSide::from_exchange(&payload.side)?;
    let position_side = Side::from_exchange(&payload.position_side)?;
    let status = OrderStatus::from_exchange(&payload.status)?;

    Some(OrderUpdateEvent {
        symbol: payload.symbol,
        order_id: payload.order_id.to_string(),
        client_order_id: if payload.client_order_id.is_empty() {
            None
        } else {
            Some(payload.client_order_id)
        },
        side,
        position_side,
        status,
        quantity: payload.quantity.parse().unwrap_or(0.0),
        cumulative_filled: payload.cumulative_filled.parse().unwrap_or(0.0),
        average_price: payload.average_price.parse().unwrap_or(0.0),
        reduce_only: payload.reduce_only,
    })
}
