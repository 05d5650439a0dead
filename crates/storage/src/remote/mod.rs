//! Remote collaborators.
//!
//! The engine talks to two things it doesn't own:
//!
//! - an [`AssetService`], the remote's admin/search/upload API, treated as an
//!   opaque RPC surface returning structured records (or embedded errors), and
//! - a [`ContentFetcher`], plain HTTP GET against an asset's delivery URL.
//!
//! Both are object-safe so a [`Filesystem`](crate::Filesystem) can hold them
//! behind an [`Arc`](std::sync::Arc) and tests can swap in the in-memory
//! `MockCloud`.

#[cfg(feature = "http")]
mod http;
#[cfg(any(test, feature = "mock"))]
mod mock;

#[cfg(feature = "http")]
pub use self::http::HttpFetcher;
#[cfg(any(test, feature = "mock"))]
pub use self::mock::{CallCounts, MockCloud, ScriptedFetch, ServiceCall};
use crate::error::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::pin::Pin;
use time::OffsetDateTime;
use tokio::io::AsyncRead;

/// Boxed byte stream used for both upload sources and download bodies.
pub type BoxAsyncRead = Pin<Box<dyn AsyncRead + Send + 'static>>;

/// Message prefix the remote uses when a folder doesn't exist. Matched
/// verbatim; the remote has no error code for it.
pub const FOLDER_NOT_FOUND_PREFIX: &str = "Can't find folder with path";

/// An error payload embedded in an otherwise successful response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiError {
    pub message: String,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    pub fn is_folder_not_found(&self) -> bool {
        self.message.starts_with(FOLDER_NOT_FOUND_PREFIX)
    }
}

/// An asset record as the remote returns it.
///
/// Immutable once returned: every query yields fresh records.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteAsset {
    pub public_id: String,
    /// Logical parent folder, `/`-separated, in remote encoding.
    #[serde(default)]
    pub asset_folder: String,
    /// Display name, in remote encoding.
    pub display_name: String,
    pub bytes: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub uploaded_at: Option<OffsetDateTime>,
    pub secure_url: String,
    /// MD5 of the content, when the remote reports it.
    #[serde(default)]
    pub etag: Option<String>,
    /// Opaque classifier echoed back on destroy.
    pub resource_type: String,
    /// Opaque delivery type echoed back on destroy.
    #[serde(rename = "type")]
    pub kind: String,
}

/// A search constraining both the folder and the display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub asset_folder: String,
    pub display_name: String,
    pub max_results: u32,
}

impl SearchQuery {
    /// Renders the query in the remote's search-expression language.
    ///
    /// Values are inserted as-is; they must already be codec-encoded so that
    /// quotes and `&` can't change the meaning of the expression.
    pub fn expression(&self) -> String {
        format!("asset_folder=\"{}\" AND display_name=\"{}\"", self.asset_folder, self.display_name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub assets: Vec<RemoteAsset>,
    #[serde(default)]
    pub next_cursor: Option<String>,
    #[serde(default)]
    pub error: Option<ApiError>,
}

/// One page request against a folder-scoped listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderParams {
    pub folder: String,
    pub next_cursor: Option<String>,
    pub max_results: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Folder {
    pub name: String,
    /// Full remote path of the folder.
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FolderPage {
    #[serde(default)]
    pub folders: Vec<Folder>,
    #[serde(default)]
    pub next_cursor: Option<String>,
    #[serde(default)]
    pub error: Option<ApiError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AssetPage {
    #[serde(default)]
    pub assets: Vec<RemoteAsset>,
    #[serde(default)]
    pub next_cursor: Option<String>,
    #[serde(default)]
    pub error: Option<ApiError>,
}

/// Result of a folder create/delete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FolderResponse {
    #[serde(default)]
    pub error: Option<ApiError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadParams {
    pub asset_folder: String,
    pub display_name: String,
    /// Derived from folder and name so re-uploads target the same asset.
    pub public_id: String,
    pub upload_preset: Option<String>,
    pub overwrite: bool,
    pub invalidate: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadedAsset {
    pub public_id: String,
    pub bytes: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub secure_url: String,
    #[serde(default)]
    pub etag: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UploadResponse {
    #[serde(flatten)]
    pub asset: Option<UploadedAsset>,
    /// Set when the public id was already taken and nothing was overwritten.
    #[serde(default)]
    pub existing: bool,
    #[serde(default)]
    pub error: Option<ApiError>,
}

/// Identifying fields of an asset, echoed verbatim from a resolved record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestroyParams {
    pub public_id: String,
    pub resource_type: String,
    pub kind: String,
}

impl From<&RemoteAsset> for DestroyParams {
    fn from(asset: &RemoteAsset) -> Self {
        Self {
            public_id: asset.public_id.clone(),
            resource_type: asset.resource_type.clone(),
            kind: asset.kind.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DestroyResponse {
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub error: Option<ApiError>,
}

/// The remote asset service.
///
/// Implementations return `Err` only for transport-level failures (raised as
/// [`Transport`](crate::error::ErrorKind::Transport)); anything the remote
/// itself rejects comes back as an embedded [`ApiError`].
#[async_trait]
pub trait AssetService: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> Result<SearchResponse>;

    /// Immediate sub-folders of `params.folder`. The root is the empty string.
    async fn sub_folders(&self, params: &FolderParams) -> Result<FolderPage>;

    /// Assets whose folder attribute equals `params.folder`.
    async fn assets_by_folder(&self, params: &FolderParams) -> Result<AssetPage>;

    async fn create_folder(&self, folder: &str) -> Result<FolderResponse>;

    async fn delete_folder(&self, folder: &str) -> Result<FolderResponse>;

    async fn upload(&self, content: BoxAsyncRead, params: &UploadParams) -> Result<UploadResponse>;

    async fn destroy(&self, params: &DestroyParams) -> Result<DestroyResponse>;
}

/// Inclusive byte range; open-ended when `end` is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl ByteRange {
    /// Value for the HTTP `Range` header.
    pub fn header_value(&self) -> String {
        match self.end {
            Some(end) => format!("bytes={}-{}", self.start, end),
            None => format!("bytes={}-", self.start),
        }
    }
}

/// Outcome of checking a ranged response against the requested length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeCheck {
    /// `accept-ranges` and `content-length` were present and agree.
    Verified,
    /// The headers needed to check weren't sent.
    Unverifiable,
    /// The declared length differs from the request (or isn't a number).
    Mismatch,
}

/// Response from the delivery endpoint.
pub struct FetchResponse {
    pub accept_ranges: Option<String>,
    pub content_length: Option<String>,
    pub body: BoxAsyncRead,
}

impl FetchResponse {
    pub fn check_length(&self, expected: u64) -> RangeCheck {
        match (&self.accept_ranges, &self.content_length) {
            (Some(_), Some(length)) => match length.trim().parse::<u64>() {
                Ok(length) if length == expected => RangeCheck::Verified,
                _ => RangeCheck::Mismatch,
            },
            _ => RangeCheck::Unverifiable,
        }
    }
}

impl fmt::Debug for FetchResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchResponse")
            .field("accept_ranges", &self.accept_ranges)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// The content delivery endpoint.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, url: &str, range: Option<ByteRange>) -> Result<FetchResponse>;
}

/// Normalizes a cursor: the remote uses both absence and `""` for "no more".
pub(crate) fn next_cursor(cursor: Option<String>) -> Option<String> {
    cursor.filter(|c| !c.is_empty())
}
