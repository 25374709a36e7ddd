/// 统一的WebSocket管理模块 - 行情流与用户数据流共用
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use log::{error, info, warn};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{sleep, Duration};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::core::error::ExchangeError;

pub type Result<T> = std::result::Result<T, ExchangeError>;

// ============= WebSocket基础定义 =============

/// WebSocket连接状态
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
    Reconnecting,
    Error(String),
}

// ============= WebSocket Trait定义 =============

/// WebSocket客户端trait
#[async_trait]
pub trait WebSocketClient: Send + Sync {
    /// 连接到WebSocket服务器
    async fn connect(&mut self) -> Result<()>;

    /// 断开连接
    async fn disconnect(&mut self) -> Result<()>;

    /// 发送消息
    async fn send(&mut self, message: String) -> Result<()>;

    /// 接收消息
    async fn receive(&mut self) -> Result<Option<String>>;

    /// 发送心跳
    async fn ping(&self) -> Result<()>;

    /// 获取连接状态
    fn get_state(&self) -> ConnectionState;
}

// ============= 心跳管理器 =============

/// 心跳与连接健康管理
///
/// 记录最近一次收到消息的时间，超过`stale_timeout`未收到任何消息
/// 即认为连接僵死，由调用方强制重连。
pub struct HeartbeatManager {
    interval_secs: u64,
    stale_timeout_secs: u64,
    last_message: Arc<RwLock<DateTime<Utc>>>,
}

impl HeartbeatManager {
    pub fn new(interval_secs: u64, stale_timeout_secs: u64) -> Self {
        Self {
            interval_secs,
            stale_timeout_secs,
            last_message: Arc::new(RwLock::new(Utc::now())),
        }
    }

    /// 获取心跳间隔
    pub fn get_interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// 收到任何消息时刷新时间戳
    pub async fn touch(&self) {
        *self.last_message.write().await = Utc::now();
    }

    /// 连接是否僵死
    pub async fn is_stale(&self) -> bool {
        let last = *self.last_message.read().await;
        (Utc::now() - last).num_seconds() >= self.stale_timeout_secs as i64
    }
}

// ============= 重连管理器 =============

/// 自动重连管理器，延迟按倍数递增到上限
pub struct ReconnectManager {
    max_attempts: u32,
    base_delay_secs: u64,
    max_delay_secs: u64,
    current_attempts: Arc<RwLock<u32>>,
}

impl ReconnectManager {
    pub fn new(max_attempts: u32, base_delay_secs: u64, max_delay_secs: u64) -> Self {
        Self {
            max_attempts,
            base_delay_secs,
            max_delay_secs,
            current_attempts: Arc::new(RwLock::new(0)),
        }
    }

    /// 当前尝试次数对应的重连延迟
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.min(16));
        let delay = self
            .base_delay_secs
            .saturating_mul(factor)
            .min(self.max_delay_secs);
        Duration::from_secs(delay)
    }

    /// 尝试重连
    pub async fn try_reconnect<T: WebSocketClient>(&self, client: &mut T) -> Result<()> {
        let mut attempts = self.current_attempts.write().await;

        if *attempts >= self.max_attempts {
            error!("❌ 达到最大重连次数: {}", self.max_attempts);
            return Err(ExchangeError::WebSocketError(
                "达到最大重连次数".to_string(),
            ));
        }

        let delay = self.delay_for_attempt(*attempts);
        *attempts += 1;
        info!(
            "🔄 尝试重连 {}/{}，等待 {}s",
            *attempts,
            self.max_attempts,
            delay.as_secs()
        );
        drop(attempts);

        sleep(delay).await;

        match client.connect().await {
            Ok(()) => {
                info!("✅ 重连成功");
                *self.current_attempts.write().await = 0;
                Ok(())
            }
            Err(e) => {
                warn!("重连失败: {}", e);
                Err(e)
            }
        }
    }

    /// 重连次数是否已耗尽
    pub async fn exhausted(&self) -> bool {
        *self.current_attempts.read().await >= self.max_attempts
    }

    /// 重置重连计数
    pub async fn reset(&self) {
        *self.current_attempts.write().await = 0;
    }
}

// ============= 工具函数 =============

/// 构建订阅消息
pub fn build_subscribe_message(channel: &str, symbol: &str) -> String {
    format!(
        r#"{{"method":"SUBSCRIBE","params":["{}"],"id":1}}"#,
        format!("{}@{}", symbol.to_lowercase(), channel)
    )
}

/// 解析心跳/订阅确认响应
pub fn is_control_response(message: &str) -> bool {
    message == "pong" || message.contains("\"result\":null")
}

// ============= 基础WebSocket客户端实现 =============

/// 基础WebSocket客户端实现
#[derive(Clone)]
pub struct BaseWebSocketClient {
    url: String,
    state: Arc<RwLock<ConnectionState>>,
    ws_stream: Arc<Mutex<Option<WebSocketStream<MaybeTlsStream<TcpStream>>>>>,
}

impl BaseWebSocketClient {
    pub fn new(url: String) -> Self {
        Self {
            url,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            ws_stream: Arc::new(Mutex::new(None)),
        }
    }
}

#[async_trait]
impl WebSocketClient for BaseWebSocketClient {
    async fn connect(&mut self) -> Result<()> {
        *self.state.write().await = ConnectionState::Connecting;

        log::info!("🔌 正在连接WebSocket: {}", self.url);

        let url = match url::Url::parse(&self.url) {
            Ok(url) => url,
            Err(e) => {
                *self.state.write().await = ConnectionState::Error(e.to_string());
                return Err(ExchangeError::WebSocketError(format!(
                    "无效的WebSocket地址: {}",
                    e
                )));
            }
        };

        match connect_async(url).await {
            Ok((ws_stream, _)) => {
                log::info!("✅ WebSocket连接成功: {}", self.url);
                *self.ws_stream.lock().await = Some(ws_stream);
                *self.state.write().await = ConnectionState::Connected;
                Ok(())
            }
            Err(e) => {
                log::error!("❌ WebSocket连接失败: {}", e);
                *self.state.write().await = ConnectionState::Disconnected;
                Err(ExchangeError::WebSocketError(format!(
                    "Connection failed: {}",
                    e
                )))
            }
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut ws_stream) = self.ws_stream.lock().await.take() {
            let _ = ws_stream.close(None).await;
            log::info!("🔌 WebSocket连接已断开");
        }
        *self.state.write().await = ConnectionState::Disconnected;
        Ok(())
    }

    async fn send(&mut self, message: String) -> Result<()> {
        let mut ws_guard = self.ws_stream.lock().await;
        if let Some(ws_stream) = ws_guard.as_mut() {
            ws_stream
                .send(Message::Text(message.clone()))
                .await
                .map_err(|e| {
                    log::error!("❌ 发送WebSocket消息失败: {}", e);
                    ExchangeError::WebSocketError(format!("Send failed: {}", e))
                })?;
            log::trace!("📤 发送WebSocket消息: {}", message);
            Ok(())
        } else {
            Err(ExchangeError::WebSocketError("Not connected".to_string()))
        }
    }

    async fn receive(&mut self) -> Result<Option<String>> {
        let mut ws_guard = self.ws_stream.lock().await;
        if let Some(ws_stream) = ws_guard.as_mut() {
            match ws_stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    // 只在TRACE级别记录原始消息
                    log::trace!(
                        "📥 接收WebSocket消息: {}",
                        if text.len() <= 200 {
                            &text
                        } else {
                            &text[..200]
                        }
                    );
                    Ok(Some(text))
                }
                Some(Ok(Message::Ping(data))) => {
                    // 自动回复Pong
                    let _ = ws_stream.send(Message::Pong(data)).await;
                    log::trace!("🎾 回复WebSocket Ping");
                    Ok(None)
                }
                Some(Ok(Message::Close(_))) => {
                    log::info!("🔚 WebSocket连接关闭");
                    *self.state.write().await = ConnectionState::Disconnected;
                    Ok(None)
                }
                Some(Ok(_)) => Ok(None), // 其他消息类型忽略
                Some(Err(e)) => {
                    log::error!("❌ WebSocket接收错误: {}", e);
                    *self.state.write().await = ConnectionState::Disconnected;
                    Err(ExchangeError::WebSocketError(format!(
                        "Receive error: {}",
                        e
                    )))
                }
                None => {
                    log::debug!("🔄 WebSocket流结束");
                    *self.state.write().await = ConnectionState::Disconnected;
                    Ok(None)
                }
            }
        } else {
            Err(ExchangeError::WebSocketError("Not connected".to_string()))
        }
    }

    async fn ping(&self) -> Result<()> {
        let mut ws_guard = self.ws_stream.lock().await;
        if let Some(ws_stream) = ws_guard.as_mut() {
            ws_stream
                .send(Message::Ping(Vec::new()))
                .await
                .map_err(|e| {
                    log::error!("❌ 发送心跳失败: {}", e);
                    ExchangeError::WebSocketError(format!("Ping failed: {}", e))
                })?;
            log::trace!("💓 发送心跳");
            Ok(())
        } else {
            Err(ExchangeError::WebSocketError("Not connected".to_string()))
        }
    }

    fn get_state(&self) -> ConnectionState {
        // 由于这是同步方法，我们需要使用try_read
        self.state
            .try_read()
            .map(|state| state.clone())
            .unwrap_or(ConnectionState::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_message() {
        let msg = build_subscribe_message("bookTicker", "DOGEUSDC");
        assert_eq!(
            msg,
            r#"{"method":"SUBSCRIBE","params":["dogeusdc@bookTicker"],"id":1}"#
        );
    }

    #[test]
    fn test_control_response_detection() {
        assert!(is_control_response("pong"));
        assert!(is_control_response(r#"{"result":null,"id":1}"#));
        assert!(!is_control_response(r#"{"e":"bookTicker"}"#));
    }

    #[test]
    fn test_reconnect_backoff() {
        let manager = ReconnectManager::new(10, 5, 60);
        assert_eq!(manager.delay_for_attempt(0), Duration::from_secs(5));
        assert_eq!(manager.delay_for_attempt(1), Duration::from_secs(10));
        assert_eq!(manager.delay_for_attempt(2), Duration::from_secs(20));
        // 封顶在上限
        assert_eq!(manager.delay_for_attempt(5), Duration::from_secs(60));
        assert_eq!(manager.delay_for_attempt(16), Duration::from_secs(60));
    }
}
