//! Daemon wiring for the distributed file data plane.
//!
//! [`DistributedFileService`] is the single owner of the copy task table,
//! the asset callback registry and the asset executor of one device.

pub mod config;
mod service;

pub use config::Config;
pub use service::{DistributedFileService, Peers};
