#![deny(clippy::await_holding_refcell_ref)]

pub mod batch;
pub mod client;
pub mod common;
pub mod planner;
pub mod pricing;
pub mod reconnect;

#[cfg(test)]
pub(crate) mod tests;

pub type Error = crate::common::error::SimScaleError;
pub type Result<T> = std::result::Result<T, Error>;

pub use common::WrappedRcRefCell;

pub const SIMSCALE_VERSION: &str = {
    match option_env!("SIMSCALE_BUILD_VERSION") {
        Some(version) => version,
        None => const_format::concatcp!(env!("CARGO_PKG_VERSION"), "-dev"),
    }
};
