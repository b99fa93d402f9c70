mod action;
mod evaluation;
mod ids;
mod ledger;
mod market;
mod plan;
mod round;
mod settlement;

pub use action::*;
pub use evaluation::*;
pub use ids::*;
pub use ledger::*;
pub use market::*;
pub use plan::*;
pub use round::*;
pub use settlement::*;
