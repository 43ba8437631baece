//! CLI command implementations

pub mod check;
pub mod config;
pub mod get;
pub mod hash;
pub mod put;

pub use check::execute as check;
pub use config::execute as config;
pub use get::execute as get;
pub use hash::execute as hash;
pub use put::execute as put;
