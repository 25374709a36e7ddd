pub mod core;
pub mod exchanges;
pub mod strategies;
pub mod utils;

// 选择性导出，避免命名冲突
pub use crate::core::{config::*, error::*, exchange::*, types::*};
// WebSocket单独导出避免Result冲突
pub use crate::core::websocket::WebSocketClient;
pub use crate::exchanges::*;
pub use crate::strategies::*;
pub use crate::utils::*;
