use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::core::{
    config::{ApiKeys, Config},
    error::ExchangeError,
    exchange::ExchangeGateway,
    types::*,
};
use crate::utils::SignatureHelper;

/// Binance错误响应体
#[derive(Deserialize)]
struct BinanceErrorBody {
    code: i32,
    msg: String,
}

/// 由过滤器步长推算小数位数（0.00001 -> 5，1.0 -> 0）
fn precision_from_step(step: f64) -> Option<u32> {
    if step <= 0.0 {
        return None;
    }
    let digits = -step.log10();
    if digits < -0.5 {
        // 步长大于1（如10），按整数处理
        return Some(0);
    }
    Some(digits.round() as u32)
}

/// 币安USDⓈ-M合约网关
///
/// 只覆盖网格策略需要的接口子集。签名请求统一走
/// `send_signed_request`，首次调用前与服务器校时一次。
#[derive(Clone)]
pub struct BinanceGateway {
    name: String,
    config: Config,
    api_keys: ApiKeys,
    client: reqwest::Client,
    /// 本地时间与服务器时间的偏移（毫秒）
    time_offset: Arc<Mutex<i64>>,
    /// 最近一次成功查询的持仓 (多头, 空头)，网络瞬断时兜底
    position_cache: Arc<Mutex<(f64, f64)>>,
    /// 保证金资产（如USDC），账户汇总按该资产取数
    margin_asset: String,
}

impl BinanceGateway {
    pub fn new(config: Config, api_keys: ApiKeys, margin_asset: &str) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("RustGrid/0.1.0")
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("创建HTTP客户端失败");

        Self {
            name: "binance".to_string(),
            config,
            api_keys,
            client,
            time_offset: Arc::new(Mutex::new(0)),
            position_cache: Arc::new(Mutex::new((0.0, 0.0))),
            margin_asset: margin_asset.to_uppercase(),
        }
    }

    /// 同步服务器时间，计算本地时间与服务器时间的偏移
    pub async fn sync_server_time(&self) -> Result<()> {
        #[derive(Deserialize)]
        struct ServerTime {
            #[serde(rename = "serverTime")]
            server_time: i64,
        }

        let url = format!("{}/fapi/v1/time", self.config.futures_base_url);
        let response = self.client.get(&url).send().await?;

        if response.status().is_success() {
            let data: ServerTime = response.json().await?;
            let local_time = Utc::now().timestamp_millis();
            let offset = data.server_time - local_time;
            *self.time_offset.lock().unwrap() = offset;
            log::debug!("服务器时间偏移: {}ms", offset);
            Ok(())
        } else {
            Err(ExchangeError::Other("获取服务器时间失败".to_string()))
        }
    }

    /// 校正后的毫秒时间戳
    fn corrected_timestamp(&self) -> i64 {
        Utc::now().timestamp_millis() + *self.time_offset.lock().unwrap()
    }

    /// 把HTTP错误响应转成带币安错误码的ApiError
    fn api_error(status_code: i32, body: &str) -> ExchangeError {
        match serde_json::from_str::<BinanceErrorBody>(body) {
            Ok(err) => ExchangeError::ApiError {
                code: err.code,
                message: err.msg,
            },
            Err(_) => ExchangeError::ApiError {
                code: status_code,
                message: body.to_string(),
            },
        }
    }

    /// 发送签名请求
    async fn send_signed_request<T>(
        &self,
        method: &str,
        endpoint: &str,
        mut params: HashMap<String, String>,
    ) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        // 首次请求前先校时
        if *self.time_offset.lock().unwrap() == 0 {
            let mut retry_count = 0;
            while retry_count < 3 {
                if let Err(e) = self.sync_server_time().await {
                    log::warn!("第{}次同步Binance服务器时间失败: {}", retry_count + 1, e);
                    retry_count += 1;
                    if retry_count < 3 {
                        tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
                    }
                } else {
                    break;
                }
            }
        }

        // 添加时间戳和recvWindow（放宽到60秒，避免时间不同步问题）
        let timestamp = self.corrected_timestamp().to_string();
        params.insert("timestamp".to_string(), timestamp);
        params.insert("recvWindow".to_string(), "60000".to_string());

        // 按字母顺序排序参数以生成签名
        let mut sorted_params: Vec<(&String, &String)> = params.iter().collect();
        sorted_params.sort_by_key(|&(k, _)| k);

        let query_string: Vec<String> = sorted_params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        let query_string = query_string.join("&");

        let signature = SignatureHelper::binance_signature(&self.api_keys.api_secret, &query_string);
        let final_query = format!("{}&signature={}", query_string, signature);

        let url = format!(
            "{}{}?{}",
            self.config.futures_base_url, endpoint, final_query
        );

        let response = match method.to_uppercase().as_str() {
            "GET" => {
                self.client
                    .get(&url)
                    .header("X-MBX-APIKEY", &self.api_keys.api_key)
                    .send()
                    .await?
            }
            "POST" => {
                self.client
                    .post(&url)
                    .header("X-MBX-APIKEY", &self.api_keys.api_key)
                    .header("Content-Type", "application/x-www-form-urlencoded")
                    .send()
                    .await?
            }
            "DELETE" => {
                self.client
                    .delete(&url)
                    .header("X-MBX-APIKEY", &self.api_keys.api_key)
                    .send()
                    .await?
            }
            _ => return Err(ExchangeError::Other("不支持的HTTP方法".to_string())),
        };

        if response.status().is_success() {
            let data = response.json::<T>().await?;
            Ok(data)
        } else {
            let status_code = response.status().as_u16() as i32;
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "未知错误".to_string());
            Err(Self::api_error(status_code, &error_text))
        }
    }

    /// 发送公共请求
    async fn send_public_request<T>(
        &self,
        endpoint: &str,
        params: Option<HashMap<String, String>>,
    ) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let mut url = format!("{}{}", self.config.futures_base_url, endpoint);

        if let Some(params) = params {
            if !params.is_empty() {
                let query_string = SignatureHelper::build_query_string(&params);
                url = format!("{}?{}", url, query_string);
            }
        }

        let response = self.client.get(&url).send().await?;

        if response.status().is_success() {
            let data = response.json::<T>().await?;
            Ok(data)
        } else {
            let status_code = response.status().as_u16() as i32;
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "未知错误".to_string());
            Err(Self::api_error(status_code, &error_text))
        }
    }
}

#[async_trait]
impl ExchangeGateway for BinanceGateway {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_position(&self, symbol: &str) -> (f64, f64) {
        match self.fetch_position_detail(symbol).await {
            Ok(details) => {
                let mut long_size = 0.0;
                let mut short_size = 0.0;
                for detail in &details {
                    match detail.side {
                        Side::Long => long_size = detail.size,
                        Side::Short => short_size = detail.size,
                    }
                }
                *self.position_cache.lock().unwrap() = (long_size, short_size);
                (long_size, short_size)
            }
            Err(e) => {
                let cached = *self.position_cache.lock().unwrap();
                log::warn!("⚠️ 查询持仓失败，使用缓存值 {:?}: {}", cached, e);
                cached
            }
        }
    }

    async fn fetch_open_orders(&self, symbol: &str) -> Result<Vec<Order>> {
        let mut params = HashMap::new();
        params.insert("symbol".to_string(), symbol.to_string());

        #[derive(Deserialize)]
        struct BinanceOpenOrder {
            #[serde(rename = "orderId")]
            order_id: i64,
            #[serde(rename = "clientOrderId")]
            client_order_id: String,
            symbol: String,
            side: String,
            #[serde(rename = "positionSide")]
            position_side: String,
            #[serde(rename = "type")]
            order_type: String,
            price: String,
            #[serde(rename = "origQty")]
            orig_qty: String,
            #[serde(rename = "executedQty")]
            executed_qty: String,
            #[serde(rename = "reduceOnly")]
            reduce_only: bool,
            status: String,
            time: i64,
        }

        let orders: Vec<BinanceOpenOrder> = self
            .send_signed_request("GET", "/fapi/v1/openOrders", params)
            .await?;

        let mut result = Vec::new();
        for order in orders {
            // 双向持仓模式下positionSide只会是LONG/SHORT，异常值跳过
            let position_side = match Side::from_exchange(&order.position_side) {
                Some(side) => side,
                None => continue,
            };
            let quantity = order.orig_qty.parse::<f64>().unwrap_or(0.0);
            let filled = order.executed_qty.parse::<f64>().unwrap_or(0.0);
            let price = order.price.parse::<f64>().unwrap_or(0.0);

            result.push(Order {
                id: order.order_id.to_string(),
                client_order_id: Some(order.client_order_id),
                symbol: order.symbol,
                side: match order.side.as_str() {
                    "SELL" => OrderSide::Sell,
                    _ => OrderSide::Buy,
                },
                position_side,
                order_type: match order.order_type.as_str() {
                    "MARKET" => OrderType::Market,
                    _ => OrderType::Limit,
                },
                price: if price > 0.0 { Some(price) } else { None },
                quantity,
                filled,
                remaining: quantity - filled,
                reduce_only: order.reduce_only,
                status: OrderStatus::from_exchange(&order.status).unwrap_or(OrderStatus::New),
                timestamp: DateTime::from_timestamp(order.time / 1000, 0)
                    .unwrap_or_else(|| Utc::now()),
            });
        }

        Ok(result)
    }

    async fn place_order(&self, request: OrderRequest) -> Option<Order> {
        let mut params = HashMap::new();
        params.insert("symbol".to_string(), request.symbol.clone());
        params.insert("side".to_string(), request.side.as_str().to_string());
        params.insert(
            "positionSide".to_string(),
            request.position_side.as_str().to_string(),
        );
        params.insert("type".to_string(), request.order_type.as_str().to_string());
        params.insert("quantity".to_string(), request.quantity.to_string());

        if let Some(price) = request.price {
            params.insert("price".to_string(), price.to_string());
        }
        if request.order_type == OrderType::Limit {
            params.insert("timeInForce".to_string(), "GTC".to_string());
        }
        if let Some(client_order_id) = &request.client_order_id {
            params.insert("newClientOrderId".to_string(), client_order_id.clone());
        }
        // 双向持仓模式下平仓语义由positionSide+side表达，
        // 显式携带reduceOnly参数会被交易所拒绝(-1106)

        #[derive(Deserialize)]
        struct BinanceOrderResponse {
            #[serde(rename = "orderId")]
            order_id: i64,
            #[serde(rename = "clientOrderId")]
            client_order_id: String,
            symbol: String,
            #[serde(rename = "origQty")]
            orig_qty: String,
            price: Option<String>,
            #[serde(rename = "executedQty")]
            executed_qty: String,
            status: String,
            #[serde(rename = "updateTime")]
            update_time: Option<i64>,
        }

        let response: BinanceOrderResponse = match self
            .send_signed_request("POST", "/fapi/v1/order", params)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                // 按失败类别分级记录，失败不上抛，由下一轮评估自愈
                if e.is_insufficient_margin() {
                    log::error!("❌ 保证金不足，无法下单: {}", e);
                } else if e.is_invalid_order() {
                    log::error!("❌ 订单参数无效: {}", e);
                } else if e.is_duplicate_order() {
                    log::error!("❌ 客户端订单ID重复: {}", e);
                } else if e.is_rate_limited() {
                    log::warn!("⚠️ 触发API限频，下单已放弃: {}", e);
                } else if e.is_exchange_unavailable() {
                    log::warn!("⚠️ 交易所暂不可用: {}", e);
                } else if matches!(e, ExchangeError::NetworkError(_)) {
                    log::warn!("⚠️ 网络错误，下单未完成: {}", e);
                } else {
                    log::error!("❌ 下单失败: {}", e);
                }
                return None;
            }
        };

        let quantity = response.orig_qty.parse::<f64>().unwrap_or(request.quantity);
        let filled = response.executed_qty.parse::<f64>().unwrap_or(0.0);

        log::info!(
            "✅ 下单成功: {} {} {} {:.8} @ {:?}, 订单ID: {}",
            request.position_side,
            request.side,
            request.symbol,
            quantity,
            request.price,
            response.client_order_id
        );

        Some(Order {
            id: response.order_id.to_string(),
            client_order_id: Some(response.client_order_id),
            symbol: response.symbol,
            side: request.side,
            position_side: request.position_side,
            order_type: request.order_type,
            price: response
                .price
                .as_ref()
                .and_then(|p| p.parse::<f64>().ok())
                .filter(|p| *p > 0.0)
                .or(request.price),
            quantity,
            filled,
            remaining: quantity - filled,
            reduce_only: request.reduce_only,
            status: OrderStatus::from_exchange(&response.status).unwrap_or(OrderStatus::New),
            timestamp: response
                .update_time
                .and_then(|t| DateTime::from_timestamp(t / 1000, 0))
                .unwrap_or_else(|| Utc::now()),
        })
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<()> {
        let mut params = HashMap::new();
        params.insert("symbol".to_string(), symbol.to_string());
        params.insert("orderId".to_string(), order_id.to_string());

        #[derive(Deserialize)]
        struct BinanceCancelResponse {
            #[serde(rename = "orderId")]
            #[allow(dead_code)]
            order_id: i64,
        }

        match self
            .send_signed_request::<BinanceCancelResponse>("DELETE", "/fapi/v1/order", params)
            .await
        {
            Ok(_) => {
                log::info!("撤销挂单成功, 订单ID: {}", order_id);
                Ok(())
            }
            Err(e) if e.is_order_missing() => Err(ExchangeError::OrderNotFound {
                order_id: order_id.to_string(),
                symbol: symbol.to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    async fn fetch_account_summary(&self) -> Result<AccountSummary> {
        #[derive(Deserialize)]
        struct BinanceAccountAsset {
            asset: String,
            #[serde(rename = "marginBalance")]
            margin_balance: String,
            #[serde(rename = "availableBalance")]
            available_balance: String,
            #[serde(rename = "initialMargin")]
            initial_margin: String,
            #[serde(rename = "unrealizedProfit")]
            unrealized_profit: String,
        }

        #[derive(Deserialize)]
        struct BinanceAccount {
            assets: Vec<BinanceAccountAsset>,
        }

        let account: BinanceAccount = self
            .send_signed_request("GET", "/fapi/v2/account", HashMap::new())
            .await?;

        // 优先取配置的保证金资产，找不到时退回USDT
        let asset = account
            .assets
            .iter()
            .find(|a| a.asset == self.margin_asset)
            .or_else(|| account.assets.iter().find(|a| a.asset == "USDT"))
            .ok_or_else(|| {
                ExchangeError::ParseError(format!("账户中没有{}资产", self.margin_asset))
            })?;

        Ok(AccountSummary {
            currency: asset.asset.clone(),
            total_equity: asset.margin_balance.parse().unwrap_or(0.0),
            available_balance: asset.available_balance.parse().unwrap_or(0.0),
            used_margin: asset.initial_margin.parse().unwrap_or(0.0),
            unrealized_pnl: asset.unrealized_profit.parse().unwrap_or(0.0),
        })
    }

    async fn fetch_position_detail(&self, symbol: &str) -> Result<Vec<PositionDetail>> {
        let mut params = HashMap::new();
        params.insert("symbol".to_string(), symbol.to_string());

        #[derive(Deserialize)]
        struct BinancePosition {
            symbol: String,
            #[serde(rename = "positionSide")]
            position_side: String,
            #[serde(rename = "positionAmt")]
            position_amt: String,
            #[serde(rename = "entryPrice")]
            entry_price: String,
            #[serde(rename = "markPrice")]
            mark_price: String,
            #[serde(rename = "unRealizedProfit")]
            unrealized_profit: String,
            leverage: String,
        }

        let positions: Vec<BinancePosition> = self
            .send_signed_request("GET", "/fapi/v2/positionRisk", params)
            .await?;

        let mut result = Vec::new();
        for pos in positions {
            let amount = pos.position_amt.parse::<f64>().unwrap_or(0.0);
            let size = amount.abs();
            if size <= 0.0 {
                continue; // 只返回有持仓的方向
            }
            let side = match Side::from_exchange(&pos.position_side) {
                Some(side) => side,
                None => continue,
            };
            let entry_price = pos.entry_price.parse::<f64>().unwrap_or(0.0);
            let unrealized_pnl = pos.unrealized_profit.parse::<f64>().unwrap_or(0.0);
            let leverage = pos.leverage.parse::<f64>().unwrap_or(1.0);

            // 盈亏百分比按初始保证金计算（名义价值/杠杆）
            let initial_margin = if leverage > 0.0 {
                size * entry_price / leverage
            } else {
                size * entry_price
            };
            let pnl_percentage = if initial_margin > 0.0 {
                unrealized_pnl / initial_margin * 100.0
            } else {
                0.0
            };

            result.push(PositionDetail {
                symbol: pos.symbol,
                side,
                size,
                entry_price,
                mark_price: pos.mark_price.parse().unwrap_or(0.0),
                unrealized_pnl,
                pnl_percentage,
                leverage,
            });
        }

        Ok(result)
    }

    async fn cancel_all_orders(&self, symbol: &str) -> bool {
        let mut params = HashMap::new();
        params.insert("symbol".to_string(), symbol.to_string());

        #[derive(Deserialize)]
        struct BinanceCancelAllResponse {
            code: i32,
            #[allow(dead_code)]
            msg: String,
        }

        match self
            .send_signed_request::<BinanceCancelAllResponse>(
                "DELETE",
                "/fapi/v1/allOpenOrders",
                params,
            )
            .await
        {
            Ok(response) if response.code == 200 => {
                log::info!("✅ 已撤销 {} 的全部挂单", symbol);
                true
            }
            Ok(response) => {
                log::error!("❌ 撤销全部挂单返回异常代码: {}", response.code);
                false
            }
            Err(e) => {
                log::error!("❌ 撤销全部挂单失败: {}", e);
                false
            }
        }
    }

    async fn close_all_positions(&self, symbol: &str) -> bool {
        let (long_position, short_position) = self.get_position(symbol).await;

        if long_position == 0.0 && short_position == 0.0 {
            log::info!("没有持仓需要平仓");
            return true;
        }

        let mut success = true;

        if long_position > 0.0 {
            log::info!("平多头仓位: {}", long_position);
            let request = OrderRequest::market(
                symbol,
                Side::Long.closing_order_side(),
                Side::Long,
                long_position,
            )
            .reduce_only(true);
            if self.place_order(request).await.is_none() {
                log::error!("❌ 多头平仓订单提交失败");
                success = false;
            }
        }

        if short_position > 0.0 {
            log::info!("平空头仓位: {}", short_position);
            let request = OrderRequest::market(
                symbol,
                Side::Short.closing_order_side(),
                Side::Short,
                short_position,
            )
            .reduce_only(true);
            if self.place_order(request).await.is_none() {
                log::error!("❌ 空头平仓订单提交失败");
                success = false;
            }
        }

        success
    }

    async fn cleanup_account(&self, symbol: &str) -> bool {
        log::info!("{}", "=".repeat(50));
        log::info!("开始清理账户...");

        // 第一步：撤销所有挂单
        let cancel_success = self.cancel_all_orders(symbol).await;
        tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;

        // 第二步：平仓所有持仓
        let close_success = self.close_all_positions(symbol).await;
        tokio::time::sleep(tokio::time::Duration::from_secs(3)).await;

        // 第三步：验证清理结果
        let remaining_orders = self
            .fetch_open_orders(symbol)
            .await
            .map(|orders| orders.len())
            .unwrap_or(usize::MAX);
        let (final_long, final_short) = self.get_position(symbol).await;

        if remaining_orders == 0 && final_long == 0.0 && final_short == 0.0 {
            log::info!("✅ 账户清理完成：所有挂单已撤销，所有持仓已平仓");
            log::info!("{}", "=".repeat(50));
            true
        } else {
            log::warn!(
                "⚠️ 账户清理不完整：剩余挂单 {} 个，多头持仓 {}，空头持仓 {} (撤单: {}, 平仓: {})",
                remaining_orders,
                final_long,
                final_short,
                cancel_success,
                close_success
            );
            log::info!("{}", "=".repeat(50));
            false
        }
    }

    async fn setup_hedge_mode(&self) -> Result<()> {
        #[derive(Deserialize)]
        struct PositionModeResponse {
            #[serde(rename = "dualSidePosition")]
            dual_side_position: bool,
        }

        let mode: PositionModeResponse = self
            .send_signed_request("GET", "/fapi/v1/positionSide/dual", HashMap::new())
            .await?;

        if mode.dual_side_position {
            log::info!("✅ 账户已是双向持仓模式");
            return Ok(());
        }

        let mut params = HashMap::new();
        params.insert("dualSidePosition".to_string(), "true".to_string());

        match self
            .send_signed_request::<serde_json::Value>("POST", "/fapi/v1/positionSide/dual", params)
            .await
        {
            Ok(_) => {
                log::info!("✅ 已切换到双向持仓模式");
                Ok(())
            }
            // -4059: 持仓模式无需修改，视为成功
            Err(ExchangeError::ApiError { code, message })
                if code == -4059 || message.contains("No need to change position side") =>
            {
                log::info!("✅ 持仓模式无需修改");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        let mut params = HashMap::new();
        params.insert("symbol".to_string(), symbol.to_string());
        params.insert("leverage".to_string(), leverage.to_string());

        #[derive(Deserialize)]
        struct BinanceLeverageResponse {
            leverage: u32,
            #[allow(dead_code)]
            symbol: String,
        }

        let response: BinanceLeverageResponse = self
            .send_signed_request("POST", "/fapi/v1/leverage", params)
            .await?;

        log::info!("✅ {} 杠杆已设置为 {}x", symbol, response.leverage);
        Ok(())
    }

    async fn fetch_symbol_rules(&self, symbol: &str) -> Result<SymbolRules> {
        #[derive(Deserialize)]
        struct BinanceFilter {
            #[serde(rename = "filterType")]
            filter_type: String,
            #[serde(rename = "tickSize")]
            tick_size: Option<String>,
            #[serde(rename = "stepSize")]
            step_size: Option<String>,
            #[serde(rename = "minQty")]
            min_qty: Option<String>,
            notional: Option<String>,
        }

        #[derive(Deserialize)]
        struct BinanceSymbolInfo {
            symbol: String,
            filters: Vec<BinanceFilter>,
        }

        #[derive(Deserialize)]
        struct BinanceExchangeInfo {
            symbols: Vec<BinanceSymbolInfo>,
        }

        let mut params = HashMap::new();
        params.insert("symbol".to_string(), symbol.to_string());

        let info: BinanceExchangeInfo = self
            .send_public_request("/fapi/v1/exchangeInfo", Some(params))
            .await?;

        let symbol_info = info
            .symbols
            .iter()
            .find(|s| s.symbol == symbol)
            .ok_or_else(|| {
                ExchangeError::ConfigError(format!("交易所不存在交易对: {}", symbol))
            })?;

        let mut rules = SymbolRules::default();
        for filter in &symbol_info.filters {
            match filter.filter_type.as_str() {
                "PRICE_FILTER" => {
                    if let Some(precision) = filter
                        .tick_size
                        .as_ref()
                        .and_then(|s| s.parse::<f64>().ok())
                        .and_then(precision_from_step)
                    {
                        rules.price_precision = precision;
                    }
                }
                "LOT_SIZE" => {
                    if let Some(precision) = filter
                        .step_size
                        .as_ref()
                        .and_then(|s| s.parse::<f64>().ok())
                        .and_then(precision_from_step)
                    {
                        rules.quantity_precision = precision;
                    }
                    if let Some(min_qty) = filter.min_qty.as_ref().and_then(|s| s.parse().ok()) {
                        rules.min_quantity = min_qty;
                    }
                }
                "MIN_NOTIONAL" => {
                    if let Some(notional) = filter.notional.as_ref().and_then(|s| s.parse().ok()) {
                        rules.min_notional = notional;
                    }
                }
                _ => {}
            }
        }

        log::info!(
            "✅ {} 交易规则: 价格精度={}, 数量精度={}, 最小数量={}, 最小名义价值={}",
            symbol,
            rules.price_precision,
            rules.quantity_precision,
            rules.min_quantity,
            rules.min_notional
        );
        Ok(rules)
    }

    async fn create_listen_key(&self) -> Result<String> {
        let url = format!("{}/fapi/v1/listenKey", self.config.futures_base_url);

        let response = self
            .client
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_keys.api_key)
            .send()
            .await?;

        if response.status().is_success() {
            #[derive(Deserialize)]
            struct ListenKeyResponse {
                #[serde(rename = "listenKey")]
                listen_key: String,
            }

            let resp: ListenKeyResponse = response
                .json()
                .await
                .map_err(|e| ExchangeError::ParseError(e.to_string()))?;

            log::info!("✅ 已创建用户数据流ListenKey");
            Ok(resp.listen_key)
        } else {
            let status_code = response.status().as_u16() as i32;
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "未知错误".to_string());
            Err(Self::api_error(status_code, &error_text))
        }
    }

    async fn keepalive_listen_key(&self, listen_key: &str) -> Result<()> {
        let url = format!(
            "{}/fapi/v1/listenKey?listenKey={}",
            self.config.futures_base_url, listen_key
        );

        let response = self
            .client
            .put(&url)
            .header("X-MBX-APIKEY", &self.api_keys.api_key)
            .send()
            .await?;

        if response.status().is_success() {
            log::debug!("✅ ListenKey续期成功");
            Ok(())
        } else {
            let status_code = response.status().as_u16() as i32;
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "未知错误".to_string());
            Err(Self::api_error(status_code, &error_text))
        }
    }

    async fn get_server_time(&self) -> Result<DateTime<Utc>> {
        #[derive(Deserialize)]
        struct ServerTime {
            #[serde(rename = "serverTime")]
            server_time: i64,
        }

        let data: ServerTime = self.send_public_request("/fapi/v1/time", None).await?;
        DateTime::from_timestamp(data.server_time / 1000, 0)
            .ok_or_else(|| ExchangeError::ParseError("服务器时间无法解析".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precision_from_step() {
        assert_eq!(precision_from_step(0.00001), Some(5));
        assert_eq!(precision_from_step(0.001), Some(3));
        assert_eq!(precision_from_step(0.1), Some(1));
        assert_eq!(precision_from_step(1.0), Some(0));
        assert_eq!(precision_from_step(0.0), None);
        assert_eq!(precision_from_step(-0.1), None);
    }

    #[test]
    fn test_api_error_parses_binance_body() {
        let err = BinanceGateway::api_error(400, r#"{"code":-2011,"msg":"Unknown order sent."}"#);
        match &err {
            ExchangeError::ApiError { code, message } => {
                assert_eq!(*code, -2011);
                assert_eq!(message, "Unknown order sent.");
            }
            _ => panic!("应解析为ApiError"),
        }
        assert!(err.is_order_missing());
    }

    #[test]
    fn test_api_error_fallback_to_status() {
        let err = BinanceGateway::api_error(503, "Service Unavailable");
        match err {
            ExchangeError::ApiError { code, .. } => assert_eq!(code, 503),
            _ => panic!("应解析为ApiError"),
        }
    }
}
