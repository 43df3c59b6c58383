//! Business wiring on top of the engine.

pub mod deal;
pub mod start;
pub mod trader;
