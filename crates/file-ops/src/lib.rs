//! Path resolution and filesystem queries for the data plane.
//!
//! Maps sandbox URIs to physical paths, rejects traversal attempts, and
//! answers the size and kind questions the copy engine asks before it
//! allocates anything.

mod browse;
mod delete;
mod dirs;
mod error;
mod resolve;
mod size;
mod uri;
mod validation;

pub use browse::{DirEntry, EntryKind, list_directory};
pub use delete::{remove_path, remove_tree};
pub use dirs::{ensure_dir, ensure_parent};
pub use error::FileOpsError;
pub use resolve::{PathKind, PathResolver, SandboxLayout, SandboxResolver, classify};
pub use size::{dir_size, size_of_path};
pub use uri::{FileUri, strip_network_param};
pub use validation::{is_path_valid, validate_relative_path};

/// Permissions of directories created on behalf of a transfer.
pub const DIR_MODE: u32 = 0o771;

/// Permissions of files created by a copy.
pub const FILE_MODE: u32 = 0o660;
