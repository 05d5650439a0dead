//! Uploads, downloads and deletion.

use crate::error::{ErrorKind, Result};
use crate::fs::Filesystem;
use crate::models::{OpenOption, UploadOptions};
use crate::object::FileObject;
use crate::path::RemotePath;
use crate::remote::{BoxAsyncRead, ByteRange, DestroyParams, RangeCheck, UploadParams};
use crate::retry::{self, RetryPolicy};
use exn::OptionExt;
use tokio::io::AsyncRead;
use tracing::instrument;

impl Filesystem {
    /// Uploads `size` bytes from `content` to `path` (relative to the root).
    ///
    /// A plain put never replaces anything: if the remote reports that the
    /// target already exists, this fails with
    /// [`AlreadyExists`](ErrorKind::AlreadyExists). Pass
    /// [`UploadOptions::update()`] to overwrite instead.
    #[instrument(skip(self, content), fields(fs = %self.name()))]
    pub async fn put(
        &self,
        path: &str,
        content: impl AsyncRead + Send + 'static,
        size: u64,
        options: UploadOptions,
    ) -> Result<FileObject> {
        let path = RemotePath::parse(path)?;
        self.upload(&path, content, size, options).await
    }

    pub(crate) async fn upload(
        &self,
        path: &RemotePath,
        content: impl AsyncRead + Send + 'static,
        size: u64,
        options: UploadOptions,
    ) -> Result<FileObject> {
        if size == 0 {
            exn::bail!(ErrorKind::EmptyUploadRejected(path.to_string()));
        }
        let (asset_folder, display_name) = self.remote_coordinates(path)?;
        let params = UploadParams {
            public_id: public_id(&asset_folder, &display_name),
            asset_folder,
            display_name,
            upload_preset: self.upload_preset().map(str::to_string),
            overwrite: options.overwrite,
            invalidate: options.invalidate,
        };

        let response = self.service().upload(Box::pin(content), &params).await?;
        if let Some(err) = response.error {
            exn::bail!(ErrorKind::Remote(err.message));
        }
        if response.existing && !options.overwrite {
            exn::bail!(ErrorKind::AlreadyExists(path.to_string()));
        }
        let asset = response
            .asset
            .ok_or_raise(|| ErrorKind::Remote(format!("upload of '{path}' returned no asset")))?;
        tracing::debug!(public_id = %asset.public_id, bytes = asset.bytes, "Uploaded asset");
        Ok(FileObject::from_uploaded(self.clone(), path.clone(), &asset))
    }

    /// Streams the content of `object`.
    ///
    /// Ranged and seeking reads are verified against the length the delivery
    /// endpoint declares. A mismatch (or a transport failure) restarts the
    /// whole request with linear backoff; a response that doesn't declare a
    /// length is accepted as-is. A range that selects no bytes (starting at
    /// or past the end) reads nothing and makes no request.
    #[instrument(skip(self, object), fields(fs = %self.name(), path = %object.path()))]
    pub(crate) async fn download(&self, object: &FileObject, options: &[OpenOption]) -> Result<BoxAsyncRead> {
        let Some((range, expected)) = requested_range(options, object.size()) else {
            let response = self.fetcher().fetch(object.url(), None).await?;
            return Ok(response.body);
        };
        if expected == 0 {
            tracing::debug!(start = range.start, size = object.size(), "Range selects no bytes");
            return Ok(Box::pin(tokio::io::empty()));
        }

        let policy = RetryPolicy::range_download();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.fetcher().fetch(object.url(), Some(range)).await {
                Ok(response) => match response.check_length(expected) {
                    RangeCheck::Verified | RangeCheck::Unverifiable => return Ok(response.body),
                    RangeCheck::Mismatch => {
                        tracing::warn!(
                            attempt,
                            expected,
                            content_length = ?response.content_length,
                            "Ranged response has the wrong length"
                        );
                        if !policy.has_next(attempt) {
                            exn::bail!(ErrorKind::RangeVerificationFailed { attempts: attempt });
                        }
                    },
                },
                Err(err) if err.is_retryable() && policy.has_next(attempt) => {
                    tracing::warn!(attempt, error = %*err, "Ranged download failed");
                },
                Err(err) => return Err(err),
            }
            retry::pause(self.cancel(), policy.delay(attempt)).await?;
        }
    }

    /// Deletes the file at `path` (relative to the root).
    ///
    /// The path is resolved first and the destroy request echoes the
    /// resolved record's identifiers, so a path that doesn't resolve fails
    /// with [`NotFound`](ErrorKind::NotFound) without touching anything.
    #[instrument(skip(self), fields(fs = %self.name()))]
    pub async fn remove(&self, path: &str) -> Result<()> {
        self.remove_path(&RemotePath::parse(path)?).await
    }

    /// [`remove()`](Self::remove) for an already-split path, whose segments
    /// may contain `/` or be `..`.
    pub(crate) async fn remove_path(&self, path: &RemotePath) -> Result<()> {
        let asset = self.find_asset(path).await?;
        let response = self.service().destroy(&DestroyParams::from(&asset)).await?;
        if let Some(err) = response.error {
            exn::bail!(ErrorKind::Remote(err.message));
        }
        if response.result != "ok" {
            exn::bail!(ErrorKind::Remote(format!("destroy of '{}' returned '{}'", asset.public_id, response.result)));
        }
        tracing::debug!(public_id = %asset.public_id, "Destroyed asset");
        Ok(())
    }
}

fn public_id(asset_folder: &str, display_name: &str) -> String {
    match asset_folder.is_empty() {
        true => display_name.to_string(),
        false => format!("{asset_folder}/{display_name}"),
    }
}

/// Byte range to request and the number of bytes it should yield, or `None`
/// for a plain read of the whole object. The last option wins; ends past the
/// object are clamped to its last byte.
fn requested_range(options: &[OpenOption], size: u64) -> Option<(ByteRange, u64)> {
    let last = size.checked_sub(1);
    options.iter().rev().find_map(|option| match *option {
        OpenOption::Range { start, end: Some(end) } => {
            let end = last.map_or(end, |last| end.min(last));
            let count = match (size, end >= start) {
                (0, _) | (_, false) => 0,
                _ => end - start + 1,
            };
            Some((ByteRange { start, end: Some(end) }, count))
        },
        OpenOption::Range { start, end: None } | OpenOption::Seek(start) => {
            Some((ByteRange { start, end: None }, size.saturating_sub(start)))
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DirEntry;
    use crate::remote::{ApiError, MockCloud, ScriptedFetch, ServiceCall};
    use tokio_util::sync::CancellationToken;
    use cldfs_config::RemoteConfig;
    use rstest::rstest;
    use std::io::Cursor;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    fn filesystem(cloud: &Arc<MockCloud>) -> Filesystem {
        let config = RemoteConfig::new("demo", "key", "secret").with_upload_preset("ml_default");
        Filesystem::new("test", "", &config, cloud.clone(), cloud.clone()).unwrap()
    }

    async fn read_all(mut body: BoxAsyncRead) -> Vec<u8> {
        let mut buf = Vec::new();
        body.read_to_end(&mut buf).await.unwrap();
        buf
    }

    fn respond(length: usize, body: &[u8]) -> ScriptedFetch {
        ScriptedFetch::Respond {
            accept_ranges: Some("bytes".to_string()),
            content_length: Some(length.to_string()),
            body: body.to_vec(),
        }
    }

    #[rstest]
    #[case(&[], 10, None)]
    #[case(&[OpenOption::Range { start: 2, end: Some(5) }], 10, Some((ByteRange { start: 2, end: Some(5) }, 4)))]
    #[case(&[OpenOption::Range { start: 8, end: Some(100) }], 10, Some((ByteRange { start: 8, end: Some(9) }, 2)))]
    #[case(&[OpenOption::Range { start: 3, end: None }], 10, Some((ByteRange { start: 3, end: None }, 7)))]
    #[case(&[OpenOption::Seek(4)], 10, Some((ByteRange { start: 4, end: None }, 6)))]
    #[case(&[OpenOption::Seek(1), OpenOption::Seek(7)], 10, Some((ByteRange { start: 7, end: None }, 3)))]
    #[case(&[OpenOption::Seek(20)], 10, Some((ByteRange { start: 20, end: None }, 0)))]
    #[case(&[OpenOption::Seek(10)], 10, Some((ByteRange { start: 10, end: None }, 0)))]
    #[case(&[OpenOption::Range { start: 20, end: Some(100) }], 10, Some((ByteRange { start: 20, end: Some(9) }, 0)))]
    #[case(&[OpenOption::Range { start: 5, end: Some(3) }], 10, Some((ByteRange { start: 5, end: Some(3) }, 0)))]
    fn test_requested_range(
        #[case] options: &[OpenOption],
        #[case] size: u64,
        #[case] expected: Option<(ByteRange, u64)>,
    ) {
        assert_eq!(requested_range(options, size), expected);
    }

    #[test]
    fn test_public_id() {
        assert_eq!(public_id("", "f.txt"), "f.txt");
        assert_eq!(public_id("a/b", "f.txt"), "a/b/f.txt");
    }

    #[tokio::test]
    async fn test_put_then_resolve() {
        let cloud = Arc::new(MockCloud::new());
        let fs = filesystem(&cloud);
        let object = fs.put("a/what?.txt", Cursor::new(b"hello".to_vec()), 5, UploadOptions::default()).await.unwrap();
        assert_eq!(object.size(), 5);
        assert_eq!(object.remote(), "a/what?.txt");
        let resolved = fs.new_object("a/what?.txt").await.unwrap();
        assert_eq!(resolved.url(), object.url());
        assert_eq!(cloud.last_upload().await.and_then(|p| p.upload_preset), Some("ml_default".to_string()));
    }

    #[tokio::test]
    async fn test_put_empty_rejected() {
        let cloud = Arc::new(MockCloud::new());
        let err = filesystem(&cloud).put("a/empty.txt", Cursor::new(Vec::new()), 0, UploadOptions::default()).await.unwrap_err();
        assert_eq!(*err, ErrorKind::EmptyUploadRejected("a/empty.txt".to_string()));
        assert_eq!(cloud.calls().upload, 0);
    }

    #[tokio::test]
    async fn test_put_remote_error() {
        let cloud = Arc::new(MockCloud::new());
        cloud.fail_next(ServiceCall::Upload, ApiError::new("Upload preset not found")).await;
        let err = filesystem(&cloud).put("f.txt", Cursor::new(b"data".to_vec()), 4, UploadOptions::default()).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Remote("Upload preset not found".to_string()));
        assert_eq!(cloud.calls().upload, 1);
    }

    #[tokio::test]
    async fn test_put_existing_without_overwrite() {
        let cloud = Arc::new(MockCloud::new());
        let fs = filesystem(&cloud);
        fs.put("f.txt", Cursor::new(b"one".to_vec()), 3, UploadOptions::default()).await.unwrap();
        let err = fs.put("f.txt", Cursor::new(b"two!".to_vec()), 4, UploadOptions::default()).await.unwrap_err();
        assert_eq!(*err, ErrorKind::AlreadyExists("f.txt".to_string()));
        assert_eq!(fs.new_object("f.txt").await.unwrap().size(), 3);
    }

    #[tokio::test]
    async fn test_update_replaces_content() {
        let cloud = Arc::new(MockCloud::new());
        let fs = filesystem(&cloud);
        let mut object = fs.put("f.txt", Cursor::new(b"one".to_vec()), 3, UploadOptions::default()).await.unwrap();
        let created = object.mod_time();
        object.update(Cursor::new(b"longer".to_vec()), 6).await.unwrap();
        assert_eq!(object.size(), 6);
        assert!(object.mod_time() >= created);
        assert_eq!(read_all(object.open(&[]).await.unwrap()).await, b"longer");
        let params = cloud.last_upload().await.unwrap();
        assert!(params.overwrite && params.invalidate);
    }

    #[tokio::test]
    async fn test_open_whole_and_ranged() {
        let cloud = Arc::new(MockCloud::new());
        let fs = filesystem(&cloud);
        let object = fs.put("f.txt", Cursor::new(b"0123456789".to_vec()), 10, UploadOptions::default()).await.unwrap();
        assert_eq!(read_all(object.open(&[]).await.unwrap()).await, b"0123456789");
        let range = [OpenOption::Range { start: 2, end: Some(4) }];
        assert_eq!(read_all(object.open(&range).await.unwrap()).await, b"234");
        assert_eq!(read_all(object.open(&[OpenOption::Seek(7)]).await.unwrap()).await, b"789");
        assert_eq!(cloud.calls().fetch, 3);
    }

    #[rstest]
    #[case(OpenOption::Seek(10))]
    #[case(OpenOption::Seek(20))]
    #[case(OpenOption::Range { start: 20, end: Some(100) })]
    #[case(OpenOption::Range { start: 5, end: Some(3) })]
    #[tokio::test]
    async fn test_open_empty_range(#[case] option: OpenOption) {
        let cloud = Arc::new(MockCloud::new());
        let fs = filesystem(&cloud);
        let object = fs.put("f.txt", Cursor::new(b"0123456789".to_vec()), 10, UploadOptions::default()).await.unwrap();
        let body = object.open(&[option]).await.unwrap();
        assert!(read_all(body).await.is_empty());
        assert_eq!(cloud.calls().fetch, 0);
    }

    #[tokio::test]
    async fn test_range_rejection_not_retried() {
        let cloud = Arc::new(MockCloud::new());
        let fs = filesystem(&cloud);
        let object = fs.put("f.txt", Cursor::new(b"0123456789".to_vec()), 10, UploadOptions::default()).await.unwrap();
        cloud.script_fetch(ScriptedFetch::Reject("GET f.txt: 404 Not Found".to_string())).await;
        let err = object.open(&[OpenOption::Seek(5)]).await.err().unwrap();
        assert!(matches!(&*err, ErrorKind::Remote(_)));
        assert_eq!(cloud.calls().fetch, 1);
    }

    #[tokio::test]
    async fn test_unverifiable_range_accepted() {
        let cloud = Arc::new(MockCloud::new());
        let fs = filesystem(&cloud);
        let object = fs.put("f.txt", Cursor::new(b"0123456789".to_vec()), 10, UploadOptions::default()).await.unwrap();
        cloud
            .script_fetch(ScriptedFetch::Respond {
                accept_ranges: None,
                content_length: Some("99".to_string()),
                body: b"whatever".to_vec(),
            })
            .await;
        let body = object.open(&[OpenOption::Seek(5)]).await.unwrap();
        assert_eq!(read_all(body).await, b"whatever");
        assert_eq!(cloud.calls().fetch, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_range_verification_exhausted() {
        let cloud = Arc::new(MockCloud::new());
        let fs = filesystem(&cloud);
        let object = fs.put("f.txt", Cursor::new(b"0123456789".to_vec()), 10, UploadOptions::default()).await.unwrap();
        for _ in 0..7 {
            cloud.script_fetch(respond(10, b"0123456789")).await;
        }
        let start = tokio::time::Instant::now();
        let err = object.open(&[OpenOption::Seek(5)]).await.err().unwrap();
        assert_eq!(*err, ErrorKind::RangeVerificationFailed { attempts: 7 });
        assert_eq!(cloud.calls().fetch, 7);
        // 1 + 2 + ... + 6 seconds between the seven attempts.
        assert_eq!(start.elapsed(), Duration::from_secs(21));
    }

    #[tokio::test(start_paused = true)]
    async fn test_range_transport_failure_retried() {
        let cloud = Arc::new(MockCloud::new());
        let fs = filesystem(&cloud);
        let object = fs.put("f.txt", Cursor::new(b"0123456789".to_vec()), 10, UploadOptions::default()).await.unwrap();
        cloud.script_fetch(ScriptedFetch::Fail("connection reset".to_string())).await;
        cloud.script_fetch(respond(5, b"56789")).await;
        let body = object.open(&[OpenOption::Seek(5)]).await.unwrap();
        assert_eq!(read_all(body).await, b"56789");
        assert_eq!(cloud.calls().fetch, 2);
    }

    #[tokio::test]
    async fn test_whole_read_not_retried() {
        let cloud = Arc::new(MockCloud::new());
        let fs = filesystem(&cloud);
        let object = fs.put("f.txt", Cursor::new(b"0123456789".to_vec()), 10, UploadOptions::default()).await.unwrap();
        cloud.script_fetch(ScriptedFetch::Fail("connection reset".to_string())).await;
        let err = object.open(&[]).await.err().unwrap();
        assert!(matches!(&*err, ErrorKind::Transport(_)));
        assert_eq!(cloud.calls().fetch, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_range_retry_cancelled() {
        let cloud = Arc::new(MockCloud::new());
        let fs = filesystem(&cloud);
        let object = fs.put("f.txt", Cursor::new(b"0123456789".to_vec()), 10, UploadOptions::default()).await.unwrap();
        cloud.script_fetch(respond(10, b"0123456789")).await;
        let token = CancellationToken::new();
        let cancelled = fs.with_cancel(token.clone()).new_object("f.txt").await.unwrap();
        token.cancel();
        let err = cancelled.open(&[OpenOption::Seek(5)]).await.err().unwrap();
        assert_eq!(*err, ErrorKind::Cancelled);
        assert_eq!(cloud.calls().fetch, 1);

        // Handles from outside the cancelled view keep retrying.
        cloud.script_fetch(respond(10, b"0123456789")).await;
        let body = object.open(&[OpenOption::Seek(5)]).await.unwrap();
        assert_eq!(read_all(body).await, b"56789");
        assert_eq!(cloud.calls().fetch, 3);
    }

    #[tokio::test]
    async fn test_remove() {
        let cloud = Arc::new(MockCloud::new());
        let fs = filesystem(&cloud);
        let object = fs.put("a/f.txt", Cursor::new(b"data".to_vec()), 4, UploadOptions::default()).await.unwrap();
        object.remove().await.unwrap();
        assert_eq!(cloud.calls().destroy, 1);
        let err = fs.new_object("a/f.txt").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_remove_listed_name_with_separator() {
        let cloud = Arc::new(MockCloud::new());
        cloud.insert_asset("a", "x／y", b"slash").await;
        cloud.insert_asset("a/x", "y", b"nested").await;
        let fs = filesystem(&cloud);
        let listed = fs.list("a").await.unwrap();
        let object = listed.into_iter().find_map(DirEntry::into_object).unwrap();
        assert_eq!(object.path().segments(), ["a", "x/y"]);

        object.remove().await.unwrap();
        assert_eq!(cloud.calls().destroy, 1);
        assert_eq!(fs.new_object("a/x/y").await.unwrap().size(), 6);
        assert!(fs.list("a").await.unwrap().iter().all(|entry| entry.as_object().is_none()));
    }

    #[tokio::test]
    async fn test_remove_listed_dot_dot_name() {
        let cloud = Arc::new(MockCloud::new());
        cloud.insert_asset("a", "．．", b"dots").await;
        let fs = filesystem(&cloud);
        let object = fs.list("a").await.unwrap().into_iter().find_map(DirEntry::into_object).unwrap();
        assert_eq!(object.path().segments(), ["a", ".."]);
        object.remove().await.unwrap();
        assert_eq!(cloud.calls().destroy, 1);
        assert!(fs.list("a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_remote_error() {
        let cloud = Arc::new(MockCloud::new());
        cloud.insert_asset("", "f.txt", b"data").await;
        cloud.fail_next(ServiceCall::Destroy, ApiError::new("Resource is locked")).await;
        let err = filesystem(&cloud).remove("f.txt").await.unwrap_err();
        assert_eq!(*err, ErrorKind::Remote("Resource is locked".to_string()));
    }

    #[tokio::test]
    async fn test_remove_result_not_ok() {
        let cloud = Arc::new(MockCloud::new());
        cloud.insert_asset("", "f.txt", b"data").await;
        cloud.script_destroy_result("not found").await;
        let err = filesystem(&cloud).remove("f.txt").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Remote(message) if message.contains("not found")));
    }

    #[tokio::test]
    async fn test_remove_missing() {
        let cloud = Arc::new(MockCloud::new());
        let err = filesystem(&cloud).remove("gone.txt").await.unwrap_err();
        assert_eq!(*err, ErrorKind::NotFound("gone.txt".to_string()));
        assert_eq!(cloud.calls().destroy, 0);
    }

    #[tokio::test]
    async fn test_remove_ambiguous() {
        let cloud = Arc::new(MockCloud::new());
        cloud.insert_asset("", "dup.txt", b"1").await;
        cloud.insert_asset("", "dup.txt", b"2").await;
        let err = filesystem(&cloud).remove("dup.txt").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::AmbiguousMatch(_)));
        assert_eq!(cloud.calls().destroy, 0);
    }
}
