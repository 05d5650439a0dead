//! In-memory remote for testing.

use super::{
    ApiError, AssetPage, AssetService, BoxAsyncRead, ByteRange, ContentFetcher, DestroyParams, DestroyResponse,
    FOLDER_NOT_FOUND_PREFIX, FetchResponse, Folder, FolderPage, FolderParams, FolderResponse, RemoteAsset,
    SearchQuery, SearchResponse, UploadParams, UploadResponse, UploadedAsset,
};
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use std::collections::{BTreeSet, VecDeque};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use time::OffsetDateTime;
use tokio::io::AsyncReadExt;
use tokio::sync::RwLock;

const URL_PREFIX: &str = "https://res.cloudinary.com/mock/raw/upload/";

/// A canned response for the next [`ContentFetcher::fetch()`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedFetch {
    Respond {
        accept_ranges: Option<String>,
        content_length: Option<String>,
        body: Vec<u8>,
    },
    /// Fails with a [`Transport`](ErrorKind::Transport) error.
    Fail(String),
    /// Fails with a [`Remote`](ErrorKind::Remote) error, like a `4xx` the
    /// delivery endpoint will keep answering.
    Reject(String),
}

/// An [`AssetService`] operation, for [`MockCloud::fail_next()`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceCall {
    Search,
    SubFolders,
    AssetsByFolder,
    CreateFolder,
    DeleteFolder,
    Upload,
    Destroy,
}

/// Number of calls made to each remote operation so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub search: usize,
    pub sub_folders: usize,
    pub assets_by_folder: usize,
    pub create_folder: usize,
    pub delete_folder: usize,
    pub upload: usize,
    pub destroy: usize,
    pub fetch: usize,
}

#[derive(Default)]
struct Counters {
    search: AtomicUsize,
    sub_folders: AtomicUsize,
    assets_by_folder: AtomicUsize,
    create_folder: AtomicUsize,
    delete_folder: AtomicUsize,
    upload: AtomicUsize,
    destroy: AtomicUsize,
    fetch: AtomicUsize,
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::SeqCst);
}

struct StoredAsset {
    record: RemoteAsset,
    data: Vec<u8>,
}

#[derive(Default)]
struct State {
    /// Every folder, including the ancestors of every asset's folder.
    folders: BTreeSet<String>,
    /// In upload order.
    assets: Vec<StoredAsset>,
    missed_searches: usize,
    scripted: VecDeque<ScriptedFetch>,
    failures: Vec<(ServiceCall, ApiError)>,
    destroy_results: VecDeque<String>,
    last_upload: Option<UploadParams>,
}

impl State {
    fn add_folder(&mut self, folder: &str) {
        let mut path = String::new();
        for segment in folder.split('/').filter(|s| !s.is_empty()) {
            if !path.is_empty() {
                path.push('/');
            }
            path.push_str(segment);
            self.folders.insert(path.clone());
        }
    }

    /// Removes and returns the oldest failure queued for `call`.
    fn take_failure(&mut self, call: ServiceCall) -> Option<ApiError> {
        let index = self.failures.iter().position(|(queued, _)| *queued == call)?;
        Some(self.failures.remove(index).1)
    }

    fn has_folder(&self, folder: &str) -> bool {
        folder.is_empty() || self.folders.contains(folder)
    }

    fn insert(&mut self, mut record: RemoteAsset, data: Vec<u8>) -> RemoteAsset {
        self.add_folder(&record.asset_folder);
        // The remote never reuses a public id for a second asset.
        let base = record.public_id.clone();
        let mut suffix = 0;
        while self.assets.iter().any(|a| a.record.public_id == record.public_id) {
            suffix += 1;
            record.public_id = format!("{base}_{suffix}");
        }
        record.secure_url = format!("{URL_PREFIX}{}", record.public_id);
        self.assets.push(StoredAsset { record: record.clone(), data });
        record
    }
}

/// In-memory stand-in for both the asset service and the delivery endpoint.
///
/// Stores encoded folder paths and display names exactly as given, so tests
/// seed it with what the remote would hold after encoding. Pagination uses
/// offsets as cursors.
///
/// # Examples
///
/// ```
/// use cldfs_config::RemoteConfig;
/// use cldfs_storage::{Filesystem, remote::MockCloud};
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let cloud = Arc::new(MockCloud::new());
/// cloud.insert_asset("a/b", "f.txt", b"0123456789").await;
///
/// let config = RemoteConfig::new("demo", "key", "secret");
/// let fs = Filesystem::new("mock", "", &config, cloud.clone(), cloud.clone())?;
/// assert_eq!(fs.new_object("a/b/f.txt").await?.size(), 10);
/// # Ok(())
/// # }
/// ```
pub struct MockCloud {
    state: RwLock<State>,
    page_size: u32,
    counters: Counters,
}

impl MockCloud {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            page_size: u32::MAX,
            counters: Counters::default(),
        }
    }

    /// Caps every page at `page_size` results, whatever the caller asks for.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Stores an asset under `folder` with the given display name, both
    /// already in remote encoding. Inserting the same pair twice creates a
    /// duplicate, like a racing upload on the real remote would.
    pub async fn insert_asset(&self, folder: &str, display_name: &str, data: &[u8]) -> RemoteAsset {
        let now = OffsetDateTime::now_utc();
        let record = RemoteAsset {
            public_id: join(folder, display_name),
            asset_folder: folder.to_string(),
            display_name: display_name.to_string(),
            bytes: data.len() as u64,
            created_at: now,
            uploaded_at: Some(now),
            secure_url: String::new(),
            etag: Some(etag(data)),
            resource_type: "raw".to_string(),
            kind: "upload".to_string(),
        };
        self.state.write().await.insert(record, data.to_vec())
    }

    /// Makes the next `count` searches come back empty, as if the remote
    /// hadn't indexed recent uploads yet.
    pub async fn miss_next_searches(&self, count: usize) {
        self.state.write().await.missed_searches = count;
    }

    /// Queues a response for a future fetch. Queued responses are used in
    /// order before any stored content is served.
    pub async fn script_fetch(&self, response: ScriptedFetch) {
        self.state.write().await.scripted.push_back(response);
    }

    /// Makes the next `call` answer with `error` embedded in an otherwise
    /// successful response. Nothing is changed on the remote.
    pub async fn fail_next(&self, call: ServiceCall, error: ApiError) {
        self.state.write().await.failures.push((call, error));
    }

    /// Makes the next destroy report `result` without deleting anything.
    pub async fn script_destroy_result(&self, result: &str) {
        self.state.write().await.destroy_results.push_back(result.to_string());
    }

    pub async fn has_folder(&self, folder: &str) -> bool {
        self.state.read().await.has_folder(folder)
    }

    /// Parameters of the most recent upload request.
    pub async fn last_upload(&self) -> Option<UploadParams> {
        self.state.read().await.last_upload.clone()
    }

    pub fn calls(&self) -> CallCounts {
        let load = |counter: &AtomicUsize| counter.load(Ordering::SeqCst);
        CallCounts {
            search: load(&self.counters.search),
            sub_folders: load(&self.counters.sub_folders),
            assets_by_folder: load(&self.counters.assets_by_folder),
            create_folder: load(&self.counters.create_folder),
            delete_folder: load(&self.counters.delete_folder),
            upload: load(&self.counters.upload),
            destroy: load(&self.counters.destroy),
            fetch: load(&self.counters.fetch),
        }
    }

    /// One page of `items` starting at the offset in `cursor`.
    fn page<T: Clone>(&self, items: &[T], cursor: Option<&str>, max_results: u32) -> (Vec<T>, Option<String>) {
        let offset = cursor.and_then(|c| c.parse::<usize>().ok()).unwrap_or(0);
        let limit = max_results.min(self.page_size).max(1) as usize;
        let page: Vec<T> = items.iter().skip(offset).take(limit).cloned().collect();
        let end = offset + page.len();
        let next = (end < items.len()).then(|| end.to_string());
        (page, next)
    }
}

impl Default for MockCloud {
    fn default() -> Self {
        Self::new()
    }
}

fn join(folder: &str, name: &str) -> String {
    match folder.is_empty() {
        true => name.to_string(),
        false => format!("{folder}/{name}"),
    }
}

fn parent(folder: &str) -> &str {
    folder.rsplit_once('/').map_or("", |(parent, _)| parent)
}

/// Stand-in for the MD5 the remote reports. Stable and non-empty is all
/// the tests need.
fn etag(data: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    data.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

fn folder_not_found(folder: &str) -> ApiError {
    ApiError::new(format!("{FOLDER_NOT_FOUND_PREFIX} {folder}"))
}

#[async_trait]
impl AssetService for MockCloud {
    async fn search(&self, query: &SearchQuery) -> Result<SearchResponse> {
        bump(&self.counters.search);
        let mut state = self.state.write().await;
        if let Some(error) = state.take_failure(ServiceCall::Search) {
            return Ok(SearchResponse {
                error: Some(error),
                ..SearchResponse::default()
            });
        }
        if state.missed_searches > 0 {
            state.missed_searches -= 1;
            return Ok(SearchResponse::default());
        }
        let matches: Vec<RemoteAsset> = state
            .assets
            .iter()
            .map(|a| &a.record)
            .filter(|r| r.asset_folder == query.asset_folder && r.display_name == query.display_name)
            .cloned()
            .collect();
        let (assets, next_cursor) = self.page(&matches, None, query.max_results);
        Ok(SearchResponse {
            assets,
            next_cursor,
            error: None,
        })
    }

    async fn sub_folders(&self, params: &FolderParams) -> Result<FolderPage> {
        bump(&self.counters.sub_folders);
        let mut state = self.state.write().await;
        if let Some(error) = state.take_failure(ServiceCall::SubFolders) {
            return Ok(FolderPage {
                error: Some(error),
                ..FolderPage::default()
            });
        }
        if !state.has_folder(&params.folder) {
            return Ok(FolderPage {
                error: Some(folder_not_found(&params.folder)),
                ..FolderPage::default()
            });
        }
        let children: Vec<Folder> = state
            .folders
            .iter()
            .filter(|f| parent(f) == params.folder)
            .map(|f| Folder {
                name: f.rsplit('/').next().unwrap_or(f).to_string(),
                path: f.clone(),
            })
            .collect();
        let (folders, next_cursor) = self.page(&children, params.next_cursor.as_deref(), params.max_results);
        Ok(FolderPage {
            folders,
            next_cursor,
            error: None,
        })
    }

    async fn assets_by_folder(&self, params: &FolderParams) -> Result<AssetPage> {
        bump(&self.counters.assets_by_folder);
        let mut state = self.state.write().await;
        if let Some(error) = state.take_failure(ServiceCall::AssetsByFolder) {
            return Ok(AssetPage {
                error: Some(error),
                ..AssetPage::default()
            });
        }
        let matches: Vec<RemoteAsset> = state
            .assets
            .iter()
            .map(|a| &a.record)
            .filter(|r| r.asset_folder == params.folder)
            .cloned()
            .collect();
        let (assets, next_cursor) = self.page(&matches, params.next_cursor.as_deref(), params.max_results);
        Ok(AssetPage {
            assets,
            next_cursor,
            error: None,
        })
    }

    async fn create_folder(&self, folder: &str) -> Result<FolderResponse> {
        bump(&self.counters.create_folder);
        let mut state = self.state.write().await;
        if let Some(error) = state.take_failure(ServiceCall::CreateFolder) {
            return Ok(FolderResponse { error: Some(error) });
        }
        state.add_folder(folder);
        Ok(FolderResponse::default())
    }

    async fn delete_folder(&self, folder: &str) -> Result<FolderResponse> {
        bump(&self.counters.delete_folder);
        let mut state = self.state.write().await;
        if let Some(error) = state.take_failure(ServiceCall::DeleteFolder) {
            return Ok(FolderResponse { error: Some(error) });
        }
        let error = if !state.has_folder(folder) {
            Some(folder_not_found(folder))
        } else if state.assets.iter().any(|a| a.record.asset_folder == folder)
            || state.folders.iter().any(|f| parent(f) == folder)
        {
            Some(ApiError::new("Folder is not empty"))
        } else {
            state.folders.remove(folder);
            None
        };
        Ok(FolderResponse { error })
    }

    async fn upload(&self, mut content: BoxAsyncRead, params: &UploadParams) -> Result<UploadResponse> {
        bump(&self.counters.upload);
        let mut data = Vec::new();
        content
            .read_to_end(&mut data)
            .await
            .or_raise(|| ErrorKind::Transport(format!("reading upload of {}", params.public_id)))?;

        let mut state = self.state.write().await;
        state.last_upload = Some(params.clone());
        if let Some(error) = state.take_failure(ServiceCall::Upload) {
            return Ok(UploadResponse {
                error: Some(error),
                ..UploadResponse::default()
            });
        }
        let now = OffsetDateTime::now_utc();
        let existing = state.assets.iter_mut().find(|a| a.record.public_id == params.public_id);
        let (record, existing) = match existing {
            Some(stored) if !params.overwrite => (stored.record.clone(), true),
            Some(stored) => {
                stored.record.bytes = data.len() as u64;
                stored.record.etag = Some(etag(&data));
                stored.record.uploaded_at = Some(now);
                stored.data = data;
                (stored.record.clone(), false)
            },
            None => {
                let record = RemoteAsset {
                    public_id: params.public_id.clone(),
                    asset_folder: params.asset_folder.clone(),
                    display_name: params.display_name.clone(),
                    bytes: data.len() as u64,
                    created_at: now,
                    uploaded_at: Some(now),
                    secure_url: String::new(),
                    etag: Some(etag(&data)),
                    resource_type: "raw".to_string(),
                    kind: "upload".to_string(),
                };
                (state.insert(record, data), false)
            },
        };
        Ok(UploadResponse {
            asset: Some(UploadedAsset {
                public_id: record.public_id,
                bytes: record.bytes,
                created_at: record.created_at,
                secure_url: record.secure_url,
                etag: record.etag,
            }),
            existing,
            error: None,
        })
    }

    async fn destroy(&self, params: &DestroyParams) -> Result<DestroyResponse> {
        bump(&self.counters.destroy);
        let mut state = self.state.write().await;
        if let Some(error) = state.take_failure(ServiceCall::Destroy) {
            return Ok(DestroyResponse {
                result: String::new(),
                error: Some(error),
            });
        }
        if let Some(result) = state.destroy_results.pop_front() {
            return Ok(DestroyResponse { result, error: None });
        }
        let before = state.assets.len();
        state.assets.retain(|a| DestroyParams::from(&a.record) != *params);
        let result = match state.assets.len() < before {
            true => "ok",
            false => "not found",
        };
        Ok(DestroyResponse {
            result: result.to_string(),
            error: None,
        })
    }
}

#[async_trait]
impl ContentFetcher for MockCloud {
    async fn fetch(&self, url: &str, range: Option<ByteRange>) -> Result<FetchResponse> {
        bump(&self.counters.fetch);
        let mut state = self.state.write().await;
        if let Some(scripted) = state.scripted.pop_front() {
            return match scripted {
                ScriptedFetch::Respond {
                    accept_ranges,
                    content_length,
                    body,
                } => Ok(FetchResponse {
                    accept_ranges,
                    content_length,
                    body: Box::pin(Cursor::new(body)),
                }),
                ScriptedFetch::Fail(message) => exn::bail!(ErrorKind::Transport(message)),
                ScriptedFetch::Reject(message) => exn::bail!(ErrorKind::Remote(message)),
            };
        }

        let Some(stored) = state.assets.iter().find(|a| a.record.secure_url == url) else {
            exn::bail!(ErrorKind::Remote(format!("GET {url}: 404 Not Found")));
        };
        let len = stored.data.len();
        let (start, end) = match range {
            Some(range) => {
                let start = usize::try_from(range.start).unwrap_or(usize::MAX).min(len);
                let end = range.end.map_or(len, |end| usize::try_from(end).unwrap_or(usize::MAX).saturating_add(1));
                (start, end.clamp(start, len))
            },
            None => (0, len),
        };
        let body = stored.data[start..end].to_vec();
        Ok(FetchResponse {
            accept_ranges: Some("bytes".to_string()),
            content_length: Some(body.len().to_string()),
            body: Box::pin(Cursor::new(body)),
        })
    }
}
