#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs, rustdoc::broken_intra_doc_links)]
extern crate alloc;

mod access;
pub mod config;
pub mod error;
pub mod group;
pub mod key;
pub mod reduce;
pub mod table;

#[doc(inline)]
pub use self::config::Config;
#[doc(inline)]
pub use self::error::{AccessError, GroupError, RegisterError};
#[doc(inline)]
pub use self::group::{CurrentGroup, SchedulingGroup, DEFAULT_MAX_SCHEDULING_GROUPS};
#[doc(inline)]
pub use self::key::{KeyConfig, KeyRegistry, KeySet, SpecificKey};
#[doc(inline)]
pub use self::reduce::MapReduce;
#[doc(inline)]
pub use self::table::CoreSpecific;

#[cfg(test)]
pub(crate) mod test_util {
    pub(crate) fn trace_init() -> impl Drop {
        use tracing_subscriber::{prelude::*, EnvFilter};
        let filter = EnvFilter::from_env("RUST_LOG");
        tracing_subscriber::fmt()
            .with_test_writer()
            .without_time()
            .with_env_filter(filter)
            .with_thread_names(true)
            .set_default()
    }
}
