//! Directory listing.
//!
//! The remote has no directory listing of its own. A directory's children
//! are the union of two independent, cursor-paginated queries: the
//! sub-folders of the encoded directory path, and the assets whose folder
//! attribute equals it. Both are driven to completion, one page at a time,
//! before anything is returned.

use crate::error::{ErrorKind, Result};
use crate::fs::Filesystem;
use crate::models::{DirEntry, Directory};
use crate::object::FileObject;
use crate::path::RemotePath;
use crate::remote::{AssetPage, Folder, FolderPage, FolderParams, RemoteAsset, next_cursor};
use async_stream::try_stream;
use futures::{Stream, TryStreamExt};
use std::collections::HashSet;
use std::pin::Pin;
use time::OffsetDateTime;
use tracing::instrument;

/// Largest page the remote serves for folder-scoped listings.
const PAGE_SIZE: u32 = 500;

type PageStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;

impl Filesystem {
    /// Lists the directory at `dir` (relative to the root).
    ///
    /// A directory the remote doesn't know about is
    /// [`DirectoryNotFound`](ErrorKind::DirectoryNotFound), which is distinct
    /// from an empty listing. Directory names appear at most once.
    #[instrument(skip(self), fields(fs = %self.name()))]
    pub async fn list(&self, dir: &str) -> Result<Vec<DirEntry>> {
        let dir = RemotePath::parse(dir)?;
        let folder = self.full_path(&dir);
        let folders: Vec<Folder> = self.folder_stream(&dir, &folder).try_collect().await?;
        let assets: Vec<RemoteAsset> = self.asset_stream(&folder).try_collect().await?;
        tracing::debug!(folder = %folder, folders = folders.len(), assets = assets.len(), "Listed folder");
        Ok(self.merge_entries(&dir, &folder, &folders, &assets, OffsetDateTime::now_utc()))
    }

    /// Every immediate sub-folder of `folder`, across all pages.
    fn folder_stream<'a>(&'a self, dir: &'a RemotePath, folder: &'a str) -> PageStream<'a, Folder> {
        Box::pin(try_stream! {
            let mut cursor = None;
            loop {
                let params = FolderParams {
                    folder: folder.to_string(),
                    next_cursor: cursor,
                    max_results: PAGE_SIZE,
                };
                let page = self.folder_page(dir, &params).await?;
                for found in page.folders {
                    yield found;
                }
                cursor = next_cursor(page.next_cursor);
                if cursor.is_none() {
                    break;
                }
            }
        })
    }

    /// Every asset filed directly under `folder`, across all pages.
    fn asset_stream<'a>(&'a self, folder: &'a str) -> PageStream<'a, RemoteAsset> {
        Box::pin(try_stream! {
            let mut cursor = None;
            loop {
                let params = FolderParams {
                    folder: folder.to_string(),
                    next_cursor: cursor,
                    max_results: PAGE_SIZE,
                };
                let page = self.asset_page(&params).await?;
                for asset in page.assets {
                    yield asset;
                }
                cursor = next_cursor(page.next_cursor);
                if cursor.is_none() {
                    break;
                }
            }
        })
    }

    async fn folder_page(&self, dir: &RemotePath, params: &FolderParams) -> Result<FolderPage> {
        let page = self
            .service()
            .sub_folders(params)
            .await
            .map_err(|err| err.raise(ErrorKind::ListFailed(dir.to_string())))?;
        match page.error {
            Some(err) if err.is_folder_not_found() => exn::bail!(ErrorKind::DirectoryNotFound(dir.to_string())),
            Some(err) => exn::bail!(ErrorKind::ListFailed(err.message)),
            None => Ok(page),
        }
    }

    async fn asset_page(&self, params: &FolderParams) -> Result<AssetPage> {
        let page = self
            .service()
            .assets_by_folder(params)
            .await
            .map_err(|err| err.raise(ErrorKind::ListFailed(params.folder.clone())))?;
        match page.error {
            Some(err) => exn::bail!(ErrorKind::ListFailed(err.message)),
            None => Ok(page),
        }
    }

    /// Folds both sub-listings into directory entries. Directories come
    /// first, in the order the remote returned them.
    fn merge_entries(
        &self,
        dir: &RemotePath,
        folder: &str,
        folders: &[Folder],
        assets: &[RemoteAsset],
        now: OffsetDateTime,
    ) -> Vec<DirEntry> {
        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(folders.len() + assets.len());
        for found in folders {
            let Some(name) = child_segment(folder, found) else {
                continue;
            };
            let name = self.codec().decode_name(name);
            if seen.insert(name.clone()) {
                entries.push(DirEntry::Directory(Directory::new(dir.child(&name), now)));
            }
        }
        for asset in assets {
            let path = dir.child(&self.codec().decode_name(&asset.display_name));
            entries.push(DirEntry::Object(FileObject::from_listed(self.clone(), path, asset)));
        }
        entries
    }
}

/// First path segment of `found` below `folder`, still encoded.
fn child_segment<'a>(folder: &str, found: &'a Folder) -> Option<&'a str> {
    let relative = match folder.is_empty() {
        true => Some(found.path.as_str()),
        false => found.path.strip_prefix(folder).and_then(|rest| rest.strip_prefix('/')),
    };
    relative
        .unwrap_or(found.name.as_str())
        .split('/')
        .next()
        .filter(|segment| !segment.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{ApiError, MockCloud, ServiceCall};
    use cldfs_config::RemoteConfig;
    use rstest::rstest;
    use std::sync::Arc;

    fn filesystem(root: &str, cloud: &Arc<MockCloud>) -> Filesystem {
        let config = RemoteConfig::new("demo", "key", "secret");
        Filesystem::new("test", root, &config, cloud.clone(), cloud.clone()).unwrap()
    }

    fn folder(path: &str) -> Folder {
        Folder {
            name: path.rsplit('/').next().unwrap_or(path).to_string(),
            path: path.to_string(),
        }
    }

    fn names(entries: &[DirEntry]) -> Vec<String> {
        entries.iter().map(|entry| entry.path().to_string()).collect()
    }

    #[rstest]
    #[case("", "a", Some("a"))]
    #[case("a", "a/b", Some("b"))]
    #[case("a", "a/b/c", Some("b"))]
    #[case("a/b", "a/b/c＆d", Some("c＆d"))]
    #[case("a", "elsewhere", Some("elsewhere"))]
    fn test_child_segment(#[case] parent: &str, #[case] path: &str, #[case] expected: Option<&str>) {
        assert_eq!(child_segment(parent, &folder(path)), expected);
    }

    #[test]
    fn test_merge_deduplicates_directories() {
        let cloud = Arc::new(MockCloud::new());
        let fs = filesystem("", &cloud);
        let dir = RemotePath::parse("a").unwrap();
        let folders = [folder("a/b"), folder("a/b/c"), folder("a/d"), folder("a/b")];
        let entries = fs.merge_entries(&dir, "a", &folders, &[], OffsetDateTime::now_utc());
        assert_eq!(names(&entries), ["a/b", "a/d"]);
    }

    #[test]
    fn test_merge_decodes_names() {
        let cloud = Arc::new(MockCloud::new());
        let fs = filesystem("", &cloud);
        let entries = fs.merge_entries(&RemotePath::root(), "", &[folder("q＆a")], &[], OffsetDateTime::now_utc());
        assert_eq!(names(&entries), ["q&a"]);
    }

    #[tokio::test]
    async fn test_list_directories_and_files() {
        let cloud = Arc::new(MockCloud::new());
        cloud.insert_asset("a", "one.txt", b"1").await;
        cloud.insert_asset("a/b", "two.txt", b"22").await;
        cloud.insert_asset("a/c＆d", "why？.txt", b"333").await;
        let entries = filesystem("", &cloud).list("a").await.unwrap();

        let mut dirs: Vec<_> = entries.iter().filter_map(DirEntry::as_directory).map(Directory::remote).collect();
        dirs.sort();
        assert_eq!(dirs, ["a/b", "a/c&d"]);
        let files: Vec<_> = entries.iter().filter_map(DirEntry::as_object).collect();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].remote(), "a/one.txt");
        assert_eq!(files[0].size(), 1);
    }

    #[tokio::test]
    async fn test_list_decodes_file_names() {
        let cloud = Arc::new(MockCloud::new());
        cloud.insert_asset("a/c＆d", "why？.txt", b"333").await;
        let entries = filesystem("", &cloud).list("a/c&d").await.unwrap();
        assert_eq!(names(&entries), ["a/c&d/why?.txt"]);
    }

    #[tokio::test]
    async fn test_list_relative_to_root() {
        let cloud = Arc::new(MockCloud::new());
        cloud.insert_asset("media/a", "f.txt", b"data").await;
        let fs = filesystem("media", &cloud);
        assert_eq!(names(&fs.list("").await.unwrap()), ["a"]);
        assert_eq!(names(&fs.list("a").await.unwrap()), ["a/f.txt"]);
    }

    #[tokio::test]
    async fn test_list_empty_directory() {
        let cloud = Arc::new(MockCloud::new());
        let fs = filesystem("", &cloud);
        fs.mkdir("empty").await.unwrap();
        assert!(fs.list("empty").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_missing_directory() {
        let cloud = Arc::new(MockCloud::new());
        let err = filesystem("", &cloud).list("nope").await.unwrap_err();
        assert_eq!(*err, ErrorKind::DirectoryNotFound("nope".to_string()));
        assert_eq!(cloud.calls().assets_by_folder, 0);
    }

    #[tokio::test]
    async fn test_list_asset_listing_failure() {
        let cloud = Arc::new(MockCloud::new());
        cloud.insert_asset("a", "f.txt", b"data").await;
        cloud.fail_next(ServiceCall::AssetsByFolder, ApiError::new("Rate limit exceeded")).await;
        let err = filesystem("", &cloud).list("a").await.unwrap_err();
        assert_eq!(*err, ErrorKind::ListFailed("Rate limit exceeded".to_string()));
    }

    #[tokio::test]
    async fn test_list_folder_listing_failure() {
        let cloud = Arc::new(MockCloud::new());
        cloud.insert_asset("a", "f.txt", b"data").await;
        cloud.fail_next(ServiceCall::SubFolders, ApiError::new("Rate limit exceeded")).await;
        let err = filesystem("", &cloud).list("a").await.unwrap_err();
        assert_eq!(*err, ErrorKind::ListFailed("Rate limit exceeded".to_string()));
        assert_eq!(cloud.calls().assets_by_folder, 0);
    }

    #[tokio::test]
    async fn test_list_follows_cursors() {
        let cloud = Arc::new(MockCloud::new().with_page_size(2));
        for name in ["f1", "f2", "f3"] {
            cloud.insert_asset("", name, b"x").await;
        }
        for sub in ["d1", "d2", "d3"] {
            cloud.insert_asset(sub, "f", b"x").await;
        }
        let entries = filesystem("", &cloud).list("").await.unwrap();
        assert_eq!(entries.len(), 6);
        assert_eq!(cloud.calls().sub_folders, 2);
        assert_eq!(cloud.calls().assets_by_folder, 2);
    }
}
