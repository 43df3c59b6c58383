pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod flows;
pub mod infrastructure;
pub mod interfaces;
pub mod logging;
pub mod stores;
pub mod sync;
pub mod system;
