//! Domain types and the ports the engine talks through.

pub mod context;
pub mod deal;
pub mod event;
pub mod payload;
pub mod ports;
pub mod ui;
