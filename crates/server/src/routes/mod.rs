mod health;
mod rounds;
mod simulation;
pub mod sse;
mod teams;

pub use health::*;
pub use rounds::*;
pub use simulation::*;
pub use teams::*;
