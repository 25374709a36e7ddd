// 核心策略模块
pub mod hedge_grid;

// 导出策略类型
pub use hedge_grid::{HedgeGridConfig, HedgeGridStrategy};
