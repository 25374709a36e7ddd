use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;

use crate::core::types::{
    AccountSummary, Order, OrderRequest, OrderStatus, OrderType, PositionDetail, Result, Side,
    SymbolRules,
};
use crate::core::ExchangeGateway;
use crate::strategies::hedge_grid::config::HedgeGridConfig;

/// 记录调用的网关替身，测试里按需预置返回值
pub struct MockGateway {
    pub placed: Mutex<Vec<OrderRequest>>,
    pub canceled: Mutex<Vec<String>>,
    pub cancel_all_calls: Mutex<u32>,
    pub open_orders: Mutex<Vec<Order>>,
    pub positions: Mutex<(f64, f64)>,
    pub position_details: Mutex<Vec<PositionDetail>>,
    pub reject_orders: bool,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            placed: Mutex::new(Vec::new()),
            canceled: Mutex::new(Vec::new()),
            cancel_all_calls: Mutex::new(0),
            open_orders: Mutex::new(Vec::new()),
            positions: Mutex::new((0.0, 0.0)),
            position_details: Mutex::new(Vec::new()),
            reject_orders: false,
        }
    }

    pub fn placed(&self) -> Vec<OrderRequest> {
        self.placed.lock().unwrap().clone()
    }

    pub fn canceled(&self) -> Vec<String> {
        self.canceled.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExchangeGateway for MockGateway {
    fn name(&self) -> &str {
        "mock"
    }

    async fn get_position(&self, _symbol: &str) -> (f64, f64) {
        *self.positions.lock().unwrap()
    }

    async fn fetch_open_orders(&self, _symbol: &str) -> Result<Vec<Order>> {
        Ok(self.open_orders.lock().unwrap().clone())
    }

    async fn place_order(&self, request: OrderRequest) -> Option<Order> {
        if self.reject_orders {
            return None;
        }
        let order = Order {
            id: format!("mock-{}", self.placed.lock().unwrap().len() + 1),
            client_order_id: request.client_order_id.clone(),
            symbol: request.symbol.clone(),
            side: request.side,
            position_side: request.position_side,
            order_type: request.order_type,
            price: request.price,
            quantity: request.quantity,
            filled: 0.0,
            remaining: request.quantity,
            reduce_only: request.reduce_only,
            status: OrderStatus::New,
            timestamp: Utc::now(),
        };
        self.placed.lock().unwrap().push(request);
        Some(order)
    }

    async fn cancel_order(&self, _symbol: &str, order_id: &str) -> Result<()> {
        self.canceled.lock().unwrap().push(order_id.to_string());
        Ok(())
    }

    async fn fetch_account_summary(&self) -> Result<AccountSummary> {
        Ok(AccountSummary {
            currency: "USDC".to_string(),
            total_equity: 1_000.0,
            available_balance: 800.0,
            used_margin: 200.0,
            unrealized_pnl: 0.0,
        })
    }

    async fn fetch_position_detail(&self, _symbol: &str) -> Result<Vec<PositionDetail>> {
        Ok(self.position_details.lock().unwrap().clone())
    }

    async fn cancel_all_orders(&self, _symbol: &str) -> bool {
        *self.cancel_all_calls.lock().unwrap() += 1;
        true
    }

    async fn close_all_positions(&self, _symbol: &str) -> bool {
        true
    }

    async fn cleanup_account(&self, _symbol: &str) -> bool {
        true
    }

    async fn setup_hedge_mode(&self) -> Result<()> {
        Ok(())
    }

    async fn set_leverage(&self, _symbol: &str, _leverage: u32) -> Result<()> {
        Ok(())
    }

    async fn fetch_symbol_rules(&self, _symbol: &str) -> Result<SymbolRules> {
        Ok(rules())
    }

    async fn create_listen_key(&self) -> Result<String> {
        Ok("mock-listen-key".to_string())
    }

    async fn keepalive_listen_key(&self, _listen_key: &str) -> Result<()> {
        Ok(())
    }

    async fn get_server_time(&self) -> Result<DateTime<Utc>> {
        Ok(Utc::now())
    }
}

/// 测试配置：结算延迟为零, 其余字段取默认值
pub fn config() -> HedgeGridConfig {
    let yaml = r#"
strategy:
  name: hedge_grid_test
symbol:
  coin: DOGE
  contract: USDC
hedge:
  settle_delay_ms: 0
"#;
    serde_yaml::from_str(yaml).unwrap()
}

pub fn rules() -> SymbolRules {
    SymbolRules {
        price_precision: 5,
        quantity_precision: 0,
        min_quantity: 1.0,
        min_notional: 5.0,
    }
}

pub fn open_order(id: &str, position_side: Side, side: crate::core::types::OrderSide, quantity: f64) -> Order {
    Order {
        id: id.to_string(),
        client_order_id: None,
        symbol: "DOGEUSDC".to_string(),
        side,
        position_side,
        order_type: OrderType::Limit,
        price: Some(0.12),
        quantity,
        filled: 0.0,
        remaining: quantity,
        reduce_only: false,
        status: OrderStatus::New,
        timestamp: Utc::now(),
    }
}
