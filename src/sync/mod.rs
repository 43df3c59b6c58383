//! Concurrency primitives shared by the sweeper and the router.

pub mod mutex;
pub mod timer;

pub use mutex::{Release, Ticket, TicketLock};
pub use timer::{TickFn, Timer};
