//! File handles.

use crate::error::{ErrorKind, Result};
use crate::fs::Filesystem;
use crate::models::{HashType, OpenOption, UploadOptions};
use crate::path::RemotePath;
use crate::remote::{BoxAsyncRead, RemoteAsset, UploadedAsset};
use std::fmt;
use time::OffsetDateTime;
use tokio::io::AsyncRead;
use tracing::instrument;

/// A file on the remote.
///
/// Only ever built from a successful resolve, listing or upload. Its fields
/// change only through [`update()`](Self::update), and [`remove()`](Self::remove)
/// consumes it after the remote asset is gone.
#[derive(Clone)]
pub struct FileObject {
    fs: Filesystem,
    path: RemotePath,
    size: u64,
    modified: OffsetDateTime,
    url: String,
    md5: Option<String>,
}

impl FileObject {
    /// From a search hit. Searches report the upload time.
    pub(crate) fn from_resolved(fs: Filesystem, path: RemotePath, asset: &RemoteAsset) -> Self {
        Self {
            fs,
            path,
            size: asset.bytes,
            modified: asset.uploaded_at.unwrap_or(asset.created_at),
            url: asset.secure_url.clone(),
            md5: asset.etag.clone(),
        }
    }

    /// From a folder listing. Listings report the creation time.
    pub(crate) fn from_listed(fs: Filesystem, path: RemotePath, asset: &RemoteAsset) -> Self {
        Self {
            fs,
            path,
            size: asset.bytes,
            modified: asset.created_at,
            url: asset.secure_url.clone(),
            md5: asset.etag.clone(),
        }
    }

    pub(crate) fn from_uploaded(fs: Filesystem, path: RemotePath, asset: &UploadedAsset) -> Self {
        Self {
            fs,
            path,
            size: asset.bytes,
            modified: asset.created_at,
            url: asset.secure_url.clone(),
            md5: asset.etag.clone(),
        }
    }

    pub fn fs(&self) -> &Filesystem {
        &self.fs
    }

    pub fn path(&self) -> &RemotePath {
        &self.path
    }

    /// Path relative to the filesystem root.
    pub fn remote(&self) -> String {
        self.path.to_string()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn mod_time(&self) -> OffsetDateTime {
        self.modified
    }

    /// Delivery URL of the content.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn storable(&self) -> bool {
        true
    }

    /// The content hash of the requested kind. `Ok(None)` means the remote
    /// didn't report one for this asset.
    pub fn hash(&self, kind: HashType) -> Result<Option<&str>> {
        match kind {
            HashType::Md5 => Ok(self.md5.as_deref()),
            other => exn::bail!(ErrorKind::UnsupportedHash(other)),
        }
    }

    /// Always fails: the remote has no independent modification time.
    pub fn set_mod_time(&self, _modified: OffsetDateTime) -> Result<()> {
        exn::bail!(ErrorKind::CantSetModTime)
    }

    /// Opens the content for reading. See [`Filesystem::download()`].
    pub async fn open(&self, options: &[OpenOption]) -> Result<BoxAsyncRead> {
        self.fs.download(self, options).await
    }

    /// Replaces the content, keeping the path.
    ///
    /// Uploads with overwrite and invalidate set, then refreshes this handle
    /// from the result. The modification time becomes "now": the remote only
    /// ever reports the original creation time.
    #[instrument(skip(self, content), fields(fs = %self.fs.name(), path = %self.path))]
    pub async fn update(&mut self, content: impl AsyncRead + Send + 'static, size: u64) -> Result<()> {
        let updated = self.fs.upload(&self.path, content, size, UploadOptions::update()).await?;
        self.size = updated.size;
        self.url = updated.url;
        self.md5 = updated.md5;
        self.modified = OffsetDateTime::now_utc();
        Ok(())
    }

    /// Deletes the remote asset, then drops the handle.
    pub async fn remove(self) -> Result<()> {
        self.fs.remove_path(&self.path).await
    }
}

impl fmt::Display for FileObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

impl fmt::Debug for FileObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileObject")
            .field("path", &self.path)
            .field("size", &self.size)
            .field("modified", &self.modified)
            .field("url", &self.url)
            .field("md5", &self.md5)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MockCloud;
    use cldfs_config::RemoteConfig;
    use std::sync::Arc;

    async fn object(etag: bool) -> FileObject {
        let cloud = Arc::new(MockCloud::new());
        let config = RemoteConfig::new("demo", "key", "secret");
        let fs = Filesystem::new("test", "", &config, cloud.clone(), cloud.clone()).unwrap();
        let mut asset = cloud.insert_asset("a", "f.txt", b"hello").await;
        if !etag {
            asset.etag = None;
        }
        FileObject::from_resolved(fs, RemotePath::parse("a/f.txt").unwrap(), &asset)
    }

    #[tokio::test]
    async fn test_md5_hash() {
        let object = object(true).await;
        assert!(object.hash(HashType::Md5).unwrap().is_some_and(|h| !h.is_empty()));
        assert_eq!(object.hash(HashType::Md5).unwrap(), object.md5.as_deref());
    }

    #[tokio::test]
    async fn test_md5_hash_unknown() {
        let object = object(false).await;
        assert_eq!(object.hash(HashType::Md5).unwrap(), None);
    }

    #[tokio::test]
    async fn test_unsupported_hash() {
        let object = object(true).await;
        for kind in [HashType::Sha1, HashType::Sha256, HashType::Crc32] {
            let err = object.hash(kind).unwrap_err();
            assert_eq!(*err, ErrorKind::UnsupportedHash(kind));
        }
    }

    #[tokio::test]
    async fn test_set_mod_time_fails() {
        let object = object(true).await;
        let err = object.set_mod_time(OffsetDateTime::now_utc()).unwrap_err();
        assert_eq!(*err, ErrorKind::CantSetModTime);
    }

    #[tokio::test]
    async fn test_display_and_url() {
        let object = object(true).await;
        assert_eq!(object.to_string(), "a/f.txt");
        assert!(object.storable());
        assert!(object.url().contains("a/f.txt"));
    }
}
