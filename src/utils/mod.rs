// 工具模块 - 通用工具函数
pub mod order_id;
pub mod signature;
pub mod symbol;

pub use order_id::{generate_grid_order_id, ExchangeOrderIdRules};
pub use signature::*;
pub use symbol::*;
