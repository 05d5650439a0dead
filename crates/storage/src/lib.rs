//! A hierarchical filesystem over Cloudinary's flat asset store.
//!
//! The remote has no real directories: every asset carries a folder path
//! attribute and a display name. This crate reconciles the two models:
//!
//! - **Path codec**: reversible escaping of names into the remote's
//!   restricted character set ([`Codec`]).
//! - **Resolution**: one path to exactly one asset, with bounded retries
//!   while the remote's search index catches up ([`Filesystem::new_object`]).
//! - **Listing**: sub-folders and folder assets merged into one directory
//!   listing ([`Filesystem::list`]).
//! - **Transfer**: uploads, verified ranged downloads and deletion
//!   ([`Filesystem::put`], [`FileObject::open`], [`Filesystem::remove`]).
//!
//! The remote API itself is reached through the [`remote::AssetService`] and
//! [`remote::ContentFetcher`] traits.

mod codec;
pub mod error;
mod fs;
mod list;
mod models;
mod object;
mod path;
pub mod remote;
mod resolve;
mod retry;
mod transfer;

pub use crate::codec::{AMPERSAND_PLACEHOLDER, Codec, QUOTE};
pub use crate::fs::{FetcherHandle, Filesystem, Opened, ServiceHandle};
pub use crate::models::{DirEntry, Directory, Features, HashType, OpenOption, UploadOptions};
pub use crate::object::FileObject;
pub use crate::path::RemotePath;
pub use crate::retry::{Backoff, RetryPolicy};
