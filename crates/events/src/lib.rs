//! Round lifecycle events.
//!
//! The coordinator publishes one event per observable step of a round on a
//! broadcast bus. The HTTP layer and tests subscribe to it.

mod bus;
mod types;

pub use bus::EventBus;
pub use types::*;
