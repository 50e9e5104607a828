//! Debian Distributed Translation Server Satellite (DDTSS) web client.

pub mod client;
pub mod html;
pub mod review;
pub mod session;

pub use client::{DdtssClient, TranslatePage, validate_credentials, validate_translation};
pub use review::{DdtssStats, PackageStatus, ReviewDecision, ReviewItem, ReviewPage};
pub use session::{Session, SessionStore};
