use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::Serialize;

use crate::common::config::HostOs;

pub mod http;
pub mod table;

pub use http::HttpPriceSource;

/// Billing tier of pool nodes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PriorityClass {
    LowPriority,
    Dedicated,
}

impl PriorityClass {
    /// Name of the tier used by the price source.
    pub fn tier(&self) -> &'static str {
        match self {
            PriorityClass::LowPriority => "low",
            PriorityClass::Dedicated => "standard",
        }
    }
}

impl Display for PriorityClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PriorityClass::LowPriority => f.write_str("low-priority"),
            PriorityClass::Dedicated => f.write_str("dedicated"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceQuery {
    pub region: String,
    pub vm_sku: String,
    pub priority: PriorityClass,
    pub host_os: HostOs,
}

impl PriceQuery {
    pub fn new(region: &str, vm_sku: &str, priority: PriorityClass, host_os: HostOs) -> Self {
        Self {
            region: region.to_string(),
            vm_sku: vm_sku.to_string(),
            priority,
            host_os,
        }
    }
}

/// Hourly price of a single node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricePoint {
    pub region: String,
    pub vm_sku: String,
    pub priority: PriorityClass,
    pub host_os: HostOs,
    pub hourly_price: f64,
}

impl PricePoint {
    pub fn new(query: PriceQuery, hourly_price: f64) -> Self {
        Self {
            region: query.region,
            vm_sku: query.vm_sku,
            priority: query.priority,
            host_os: query.host_os,
            hourly_price,
        }
    }
}

pub type PriceFuture<'a> = Pin<Box<dyn Future<Output = crate::Result<PricePoint>> + 'a>>;

/// Source of hourly VM prices. Every call performs a fresh lookup.
pub trait PriceLookup {
    /// Resolves to `NotFound` when the source has no usable price for the query.
    fn lookup(&self, query: PriceQuery) -> PriceFuture<'_>;
}
