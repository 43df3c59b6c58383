//! Application layer: the interaction engine.
//!
//! Payloads enter through the [`Router`](router::Router), which offers them
//! to composed routes and otherwise runs them through the
//! [`EventAdapter`](event_adapter::EventAdapter), the
//! [`FlowEngine`](flow_engine::FlowEngine) and the
//! [`UiAdapter`](ui_adapter::UiAdapter). The
//! [`ExpirySweeper`](expiry::ExpirySweeper) feeds expiry-derived payloads back
//! into the same router.

pub mod composer;
pub mod event_adapter;
pub mod expiry;
pub mod flow_engine;
pub mod guards;
pub mod router;
pub mod ui_adapter;
