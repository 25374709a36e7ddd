// 对冲网格策略 - 双向持仓模式下同时持有多空两侧仓位，
// 各侧维护一个止盈单加一个回补单的两层网格，由事件调度器驱动
pub mod config;

mod controller;
mod engine;
mod feed;
mod quantity;
mod risk;
mod scheduler;
mod state;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::HedgeGridConfig;
pub use controller::HedgeGridStrategy;
