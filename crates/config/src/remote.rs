//! Remote options and layered loading.

use crate::encoding::Encoding;
use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::{OptionExt, ResultExt};
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "CLDFS_";

/// Options for a single Cloudinary remote.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Cloudinary environment (cloud) name.
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    /// Upload preset selecting asset manipulation on upload.
    #[serde(default)]
    pub upload_preset: Option<String>,
    /// Characters escaped in paths and names before they reach the remote.
    #[serde(default)]
    pub encoding: Encoding,
    /// Assume a just-written asset exists and retry searches that come back
    /// empty while the remote catches up with indexing.
    #[serde(default)]
    pub optimistic_search: bool,
}

impl RemoteConfig {
    pub fn new(cloud_name: impl Into<String>, api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            cloud_name: cloud_name.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            upload_preset: None,
            encoding: Encoding::default(),
            optimistic_search: false,
        }
    }

    pub fn with_upload_preset(mut self, preset: impl Into<String>) -> Self {
        self.upload_preset = Some(preset.into());
        self
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_optimistic_search(mut self, enabled: bool) -> Self {
        self.optimistic_search = enabled;
        self
    }

    /// Checks that every required option is non-empty.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("cloud_name", &self.cloud_name),
            ("api_key", &self.api_key),
            ("api_secret", &self.api_secret),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                exn::bail!(ErrorKind::Missing(field));
            }
        }
        Ok(())
    }
}

// Never print the secret.
impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .field("upload_preset", &self.upload_preset)
            .field("encoding", &self.encoding)
            .field("optimistic_search", &self.optimistic_search)
            .finish()
    }
}

/// Top-level configuration: named remotes.
///
/// ```toml
/// [remotes.photos]
/// cloud_name = "demo"
/// api_key = "1234"
/// api_secret = "s3cr3t"
/// optimistic_search = true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub remotes: BTreeMap<String, RemoteConfig>,
}

impl Config {
    /// Default location of the configuration file, if the platform has one.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "cldfs").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Loads configuration from defaults, an optional file and the environment.
    ///
    /// The file format is picked from its extension (`.yaml`/`.yml`, `.json`,
    /// anything else is TOML). A missing file is not an error. Environment
    /// variables use the `CLDFS_` prefix with `__` between nested keys, e.g.
    /// `CLDFS_REMOTES__PHOTOS__API_SECRET`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let figment = Self::figment(path).merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::extract(figment)
    }

    /// Same as [`load()`](Self::load) without the environment layer.
    pub fn load_file(path: &Path) -> Result<Self> {
        Self::extract(Self::figment(Some(path)))
    }

    fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            if !path.exists() {
                tracing::info!(path = %path.display(), "Configuration file not found; using defaults");
            }
            figment = match path.extension().and_then(|e| e.to_str()) {
                Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
                Some("json") => figment.merge(Json::file(path)),
                _ => figment.merge(Toml::file(path)),
            };
        }
        figment
    }

    fn extract(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Load)?;
        for (name, remote) in &config.remotes {
            tracing::debug!(remote = %name, cloud = %remote.cloud_name, "Loaded remote configuration");
            remote.validate()?;
        }
        Ok(config)
    }

    /// Looks up a configured remote by name.
    pub fn remote(&self, name: &str) -> Result<&RemoteConfig> {
        self.remotes.get(name).ok_or_raise(|| ErrorKind::UnknownRemote(name.to_string()))
    }
}
