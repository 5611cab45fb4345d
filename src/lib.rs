pub mod broker;
pub mod broker_import_impl;
pub mod import;
pub mod log;
pub mod pipeline;
pub mod records;
pub mod store;
pub mod tracing;
pub mod util;

extern crate lazy_static;

#[cfg(any(test, feature = "testlib"))]
pub mod testlib;
