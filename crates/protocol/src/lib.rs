//! Shared vocabulary of the distributed file data plane.
//!
//! Holds the asset envelope exchanged between sender and receiver, the
//! callback result codes, and the codec that smuggles session metadata
//! through transport filenames.

pub mod asset;
pub mod codec;
pub mod constants;

pub use asset::{AssetObj, ResultCode};
pub use codec::{BundleKind, CodecError, WireName};
