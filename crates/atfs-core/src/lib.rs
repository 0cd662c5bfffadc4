//! atfs-core: types, configuration and errors shared by every atfs crate.

pub mod config;
pub mod error;
pub mod types;

pub use config::AtfsConfig;
pub use error::{AtfsError, AtfsResult};
pub use types::{Stamp, UserId};
