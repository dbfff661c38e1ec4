pub mod cli;
pub mod command;
pub mod config;
pub mod error;
pub mod setup;
pub mod utils;
pub mod wrapped;

pub use wrapped::WrappedRcRefCell;
