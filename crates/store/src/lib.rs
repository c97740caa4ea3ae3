//! Filesystem-backed implementation of the refguard store traits.
//!
//! - [`FsStore`] - documents and sidecars under a root directory, plus the
//!   in-memory set of open composites.
//! - [`meta`] - sidecar format and extension conventions.

pub mod fs;
pub mod meta;

pub use fs::FsStore;
pub use meta::AssetMeta;
