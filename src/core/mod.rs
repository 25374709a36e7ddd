// 核心模块 - 只包含核心业务逻辑
pub mod config;
pub mod error;
pub mod exchange;
pub mod types;
pub mod websocket;

pub use config::*;
pub use error::*;
pub use exchange::*;
pub use types::{
    AccountSummary, BookTick, Order, OrderRequest, OrderSide, OrderStatus, OrderType,
    OrderUpdateEvent, PositionDetail, Side, SymbolRules,
};
pub use websocket::WebSocketClient;
