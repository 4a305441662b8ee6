// Library for tests to access modules

pub mod bucket;
pub mod channel;
pub mod config;
pub mod error;
pub mod merge;
pub mod models;
pub mod report;
pub mod rollup;
pub mod snapshot_writer;
pub mod version;

pub use error::{Result, StatError};
