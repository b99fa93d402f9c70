pub mod config;
pub mod domain;
mod error;
mod money;

pub use config::*;
pub use domain::*;
pub use error::*;
pub use money::*;
