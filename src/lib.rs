//! ddtp-translate: translate Debian package descriptions through the DDTP.

pub mod config;
pub mod ddtp;
pub mod ddtss;
pub mod error;
pub mod lint;
pub mod logging;
pub mod po;
pub mod queue;
pub mod retry;
pub mod submit;

pub use error::{Error, Result};
