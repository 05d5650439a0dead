//! The filesystem facade.
//!
//! A [`Filesystem`] maps a hierarchical path space onto the remote's flat,
//! folder-tagged assets. It holds only read-only configuration plus handles
//! to the remote collaborators, so it is cheap to clone and safe to use from
//! many tasks at once; no operation takes a lock across calls.
//!
//! Cancellation is scoped to a view: [`Filesystem::with_cancel()`] returns a
//! handle whose retry loops stop once the caller's token fires, leaving the
//! original handle and every other view untouched.

use crate::codec::Codec;
use crate::error::{ErrorKind, Result};
use crate::models::{Features, HashType};
use crate::path::RemotePath;
use crate::remote::{AssetService, ContentFetcher};
use cldfs_config::RemoteConfig;
use exn::{OptionExt, ResultExt};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

pub type ServiceHandle = Arc<dyn AssetService + Send + Sync>;
pub type FetcherHandle = Arc<dyn ContentFetcher + Send + Sync>;

/// Result of [`Filesystem::open()`].
#[derive(Debug)]
pub enum Opened {
    /// The root is a directory (or doesn't exist yet).
    Directory(Filesystem),
    /// The root named an existing file. The filesystem is rooted at its
    /// parent and `name` is the file's name within it.
    File { fs: Filesystem, name: String },
}

impl Opened {
    pub fn into_filesystem(self) -> Filesystem {
        match self {
            Self::Directory(fs) | Self::File { fs, .. } => fs,
        }
    }
}

#[derive(Clone)]
pub struct Filesystem {
    inner: Arc<Inner>,
    /// Checked between retry attempts. Never cancelled unless a caller
    /// supplied it through [`Filesystem::with_cancel()`].
    cancel: CancellationToken,
}

struct Inner {
    name: String,
    root: RemotePath,
    codec: Codec,
    upload_preset: Option<String>,
    optimistic_search: bool,
    service: ServiceHandle,
    fetcher: FetcherHandle,
}

impl Filesystem {
    /// Creates a filesystem rooted at `root` without touching the remote.
    ///
    /// # Arguments
    /// * `name` - A name for this remote (used in display/logging)
    /// * `root` - `/`-separated path inside the remote acting as the root
    /// * `config` - Validated remote options
    /// * `service` - The remote asset service
    /// * `fetcher` - The content delivery endpoint
    pub fn new(
        name: impl Into<String>,
        root: &str,
        config: &RemoteConfig,
        service: ServiceHandle,
        fetcher: FetcherHandle,
    ) -> Result<Self> {
        config.validate().or_raise(|| ErrorKind::Config)?;
        let inner = Inner {
            name: name.into(),
            root: RemotePath::parse(root)?,
            codec: Codec::new(config.encoding.clone()),
            upload_preset: config.upload_preset.clone().filter(|p| !p.is_empty()),
            optimistic_search: config.optimistic_search,
            service,
            fetcher,
        };
        Ok(Self {
            inner: Arc::new(inner),
            cancel: CancellationToken::new(),
        })
    }

    /// Opens a filesystem, checking whether `root` points at a file.
    ///
    /// If it does, the returned filesystem is rooted at the file's parent and
    /// the result is [`Opened::File`]. A root that doesn't resolve to a file
    /// is treated as a directory, whether or not the folder exists yet.
    #[instrument(skip(config, service, fetcher))]
    pub async fn open(
        name: &str,
        root: &str,
        config: &RemoteConfig,
        service: ServiceHandle,
        fetcher: FetcherHandle,
    ) -> Result<Opened> {
        let fs = Self::new(name, root, config, service.clone(), fetcher.clone())?;
        let Some(file_name) = fs.root().file_name().map(str::to_string) else {
            return Ok(Opened::Directory(fs));
        };
        let parent = Self::new(name, &fs.root().parent().to_string(), config, service, fetcher)?;
        match parent.find_asset(&RemotePath::from_segments([file_name.as_str()])).await {
            Ok(_) => {
                tracing::debug!(root = %fs.root(), "Root is a file; using its parent as the root");
                Ok(Opened::File { fs: parent, name: file_name })
            },
            Err(err) if matches!(&*err, ErrorKind::NotFound(_)) => Ok(Opened::Directory(fs)),
            Err(err) => Err(err),
        }
    }

    /// Name of the remote (as passed into [`new()`](Self::new)).
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Root of the remote, relative to the remote's top level.
    pub fn root(&self) -> &RemotePath {
        &self.inner.root
    }

    pub fn features(&self) -> Features {
        Features {
            case_insensitive: false,
            can_have_empty_directories: true,
            duplicate_files: true,
        }
    }

    /// Modification-time precision. Always `None`: the remote has no
    /// settable modification time.
    pub fn precision(&self) -> Option<Duration> {
        None
    }

    /// Hash types [`FileObject::hash()`](crate::FileObject::hash) can answer.
    pub fn hashes(&self) -> &'static [HashType] {
        &[HashType::Md5]
    }

    /// A view of this filesystem whose retry loops give up with
    /// [`Cancelled`](ErrorKind::Cancelled) once `cancel` fires.
    ///
    /// Only the returned handle (its clones, and the objects it hands out)
    /// observe the token.
    pub fn with_cancel(&self, cancel: CancellationToken) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            cancel,
        }
    }

    /// Creates a folder. The root always exists, so creating it is a no-op.
    #[instrument(skip(self), fields(fs = %self.name()))]
    pub async fn mkdir(&self, dir: &str) -> Result<()> {
        let dir = RemotePath::parse(dir)?;
        let folder = self.full_path(&dir);
        if folder.is_empty() {
            return Ok(());
        }
        let response = self.service().create_folder(&folder).await?;
        if let Some(err) = response.error {
            exn::bail!(ErrorKind::Remote(err.message));
        }
        tracing::debug!(folder = %folder, "Created folder");
        Ok(())
    }

    /// Deletes a folder. A folder the remote doesn't know about is
    /// [`DirectoryNotFound`](ErrorKind::DirectoryNotFound).
    #[instrument(skip(self), fields(fs = %self.name()))]
    pub async fn rmdir(&self, dir: &str) -> Result<()> {
        let dir = RemotePath::parse(dir)?;
        let folder = self.full_path(&dir);
        if folder.is_empty() {
            exn::bail!(ErrorKind::InvalidPath(dir.to_string()));
        }
        let response = self.service().delete_folder(&folder).await?;
        match response.error {
            Some(err) if err.is_folder_not_found() => exn::bail!(ErrorKind::DirectoryNotFound(dir.to_string())),
            Some(err) => exn::bail!(ErrorKind::Remote(err.message)),
            None => Ok(()),
        }
    }

    pub(crate) fn codec(&self) -> &Codec {
        &self.inner.codec
    }

    pub(crate) fn service(&self) -> &ServiceHandle {
        &self.inner.service
    }

    pub(crate) fn fetcher(&self) -> &FetcherHandle {
        &self.inner.fetcher
    }

    pub(crate) fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn upload_preset(&self) -> Option<&str> {
        self.inner.upload_preset.as_deref()
    }

    pub(crate) fn optimistic_search(&self) -> bool {
        self.inner.optimistic_search
    }

    /// Remote-encoded path of `path` (relative to the root). Never ends with
    /// a separator; the top-level folder is the empty string.
    pub(crate) fn full_path(&self, path: &RemotePath) -> String {
        self.codec().encode_path(&self.root().join(path))
    }

    /// Splits a file path into its remote folder and remote display name.
    pub(crate) fn remote_coordinates(&self, path: &RemotePath) -> Result<(String, String)> {
        let name = path.file_name().ok_or_raise(|| ErrorKind::InvalidPath(path.to_string()))?;
        Ok((self.full_path(&path.parent()), self.codec().encode_name(name)))
    }
}

impl fmt::Display for Filesystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cloudinary root '{}'", self.root())
    }
}

impl fmt::Debug for Filesystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filesystem")
            .field("name", &self.inner.name)
            .field("root", &self.inner.root)
            .field("optimistic_search", &self.inner.optimistic_search)
            .finish_non_exhaustive()
    }
}
