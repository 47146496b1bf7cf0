pub mod admission;
pub mod batch;
pub mod client;
pub mod common;
pub mod datalock;
pub mod ledger;
pub mod orchestrator;
pub mod pipeline;
pub mod script;
pub mod task;
pub mod wrapper;

#[cfg(test)]
pub(crate) mod tests;

pub type Error = crate::common::error::QchainError;
pub type Result<T> = std::result::Result<T, Error>;

pub type Map<K, V> = std::collections::BTreeMap<K, V>;

pub const QCHAIN_VERSION: &str = {
    match option_env!("QCHAIN_BUILD_VERSION") {
        Some(version) => version,
        None => const_format::concatcp!(env!("CARGO_PKG_VERSION"), "-dev"),
    }
};
