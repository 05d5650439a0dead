//! Asset resolution.
//!
//! A hierarchical path maps to exactly one `(folder, display name)`
//! coordinate on the remote. Resolving a path searches for that coordinate and
//! insists on at most one hit: two assets for the same path is corruption on
//! the remote and is reported, never papered over by picking one.

use crate::error::{ErrorKind, Result};
use crate::fs::Filesystem;
use crate::object::FileObject;
use crate::path::RemotePath;
use crate::remote::{RemoteAsset, SearchQuery, next_cursor};
use crate::retry::{self, RetryPolicy};
use tracing::instrument;

impl Filesystem {
    /// Looks up the file at `path` (relative to the root).
    ///
    /// Returns [`NotFound`](ErrorKind::NotFound) if nothing matches and
    /// [`AmbiguousMatch`](ErrorKind::AmbiguousMatch) if more than one asset
    /// does.
    #[instrument(skip(self), fields(fs = %self.name()))]
    pub async fn new_object(&self, path: &str) -> Result<FileObject> {
        let path = RemotePath::parse(path)?;
        let asset = self.find_asset(&path).await?;
        Ok(FileObject::from_resolved(self.clone(), path, &asset))
    }

    /// Searches for the single asset behind `path`.
    ///
    /// With optimistic search enabled, an empty result is retried a few times
    /// (the remote indexes fresh uploads asynchronously). Transport and
    /// embedded errors are never retried here.
    pub(crate) async fn find_asset(&self, path: &RemotePath) -> Result<RemoteAsset> {
        let (asset_folder, display_name) = self.remote_coordinates(path)?;
        let query = SearchQuery {
            asset_folder,
            display_name,
            // A cursor on a single-result page means there's a second match.
            max_results: 1,
        };
        let policy = match self.optimistic_search() {
            true => RetryPolicy::optimistic_search(),
            false => RetryPolicy::once(),
        };

        let mut attempt = 0;
        let response = loop {
            attempt += 1;
            let response = self.service().search(&query).await?;
            if let Some(err) = response.error {
                exn::bail!(ErrorKind::Remote(err.message));
            }
            if !response.assets.is_empty() || !policy.has_next(attempt) {
                break response;
            }
            let delay = policy.delay(attempt);
            tracing::debug!(
                path = %path,
                attempt,
                ?delay,
                "Asset not found yet; retrying optimistic search"
            );
            retry::pause(self.cancel(), delay).await?;
        };

        if next_cursor(response.next_cursor).is_some() || response.assets.len() > 1 {
            tracing::warn!(path = %path, expression = %query.expression(), "Duplicate objects found");
            exn::bail!(ErrorKind::AmbiguousMatch(path.to_string()));
        }
        match response.assets.into_iter().next() {
            Some(asset) => Ok(asset),
            None => exn::bail!(ErrorKind::NotFound(path.to_string())),
        }
    }
}
