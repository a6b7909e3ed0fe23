//! src/config.rs
//! ============================================================================
//! # Config: Navigator Configuration Loader and Saver
//!
//! Holds the navigator option set and the locations of the persisted state
//! files. Loads and saves settings as TOML from the platform config path
//! using the [`directories`](https://docs.rs/directories) crate.
//!
//! ## Features
//! - XDG-compliant config discovery and writing (Linux, macOS, Windows)
//! - Every field defaults, so partial files are fine
//! - Async load/save for smooth integration with Tokio
//!
//! ## Example
//! ```rust,ignore
//! let config = Config::load().await?;
//! config.save().await?;
//! ```

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use tokio::fs as TokioFs;

use crate::error::{AppError, AppResult};
use crate::model::matching::{MatchOptions, validate_patterns};
use crate::model::sort::SortType;

const QUALIFIER: &str = "org";
const ORGANIZATION: &str = "trek";
const APPLICATION: &str = "trek";

/// Which selections multi-file commands see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    #[default]
    All,

    /// Only selections inside the current directory.
    Dir,
}

/// The option set consulted by sorting, scrolling, matching and loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    pub sort: SortType,

    pub dironly: bool,

    /// Glob patterns for hidden entries; `!pat` un-hides.
    pub hiddenfiles: Vec<String>,

    pub ignorecase: bool,
    pub ignoredia: bool,
    pub smartcase: bool,
    pub smartdia: bool,
    pub globsearch: bool,
    pub anchorfind: bool,
    pub wrapscan: bool,
    pub wrapscroll: bool,

    /// Rows of context kept above and below the cursor.
    pub scrolloff: usize,

    pub selmode: SelectionMode,

    /// Mark characters that are never written to the marks file.
    pub tempmarks: String,

    pub dircache: bool,
    pub dircounts: bool,
    pub dirpreviews: bool,

    pub previewer: Option<PathBuf>,
    pub cleaner: Option<PathBuf>,

    /// Separator used when exporting the selection list to child processes.
    pub filesep: String,

    /// Interval for periodic refresh; zero disables it.
    #[serde(with = "humantime_serde")]
    pub period: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            sort: SortType::default(),
            dironly: false,
            hiddenfiles: vec![".*".to_string()],
            ignorecase: true,
            ignoredia: true,
            smartcase: true,
            smartdia: false,
            globsearch: false,
            anchorfind: true,
            wrapscan: true,
            wrapscroll: false,
            scrolloff: 0,
            selmode: SelectionMode::All,
            tempmarks: "'".to_string(),
            dircache: true,
            dircounts: false,
            dirpreviews: false,
            previewer: None,
            cleaner: None,
            filesep: "\n".to_string(),
            period: Duration::ZERO,
        }
    }
}

impl Options {
    pub fn match_options(&self) -> MatchOptions {
        MatchOptions {
            ignorecase: self.ignorecase,
            ignoredia: self.ignoredia,
            smartcase: self.smartcase,
            smartdia: self.smartdia,
            globsearch: self.globsearch,
            anchorfind: self.anchorfind,
        }
    }

    /// Replace the hidden-file pattern set, rejecting it whole on the first bad glob.
    pub fn set_hiddenfiles(&mut self, patterns: Vec<String>) -> AppResult<()> {
        validate_patterns(&patterns)?;
        self.hiddenfiles = patterns;

        Ok(())
    }

    /// `'` is always temporary, on top of whatever is configured.
    pub fn is_temp_mark(&self, mark: char) -> bool {
        mark == '\'' || self.tempmarks.contains(mark)
    }
}

/// Locations of the files the navigator persists state into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataPaths {
    /// Copy/cut buffer.
    pub files: PathBuf,
    pub marks: PathBuf,
    pub tags: PathBuf,
}

impl DataPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            files: dir.join("files"),
            marks: dir.join("marks"),
            tags: dir.join("tags"),
        }
    }
}

impl Default for DataPaths {
    fn default() -> Self {
        let dir: PathBuf = ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
            .map(|p: ProjectDirs| p.data_dir().to_path_buf())
            .unwrap_or_else(|| std::env::temp_dir().join(APPLICATION));

        Self::in_dir(&dir)
    }
}

/// Multi-session settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// No server: refreshes after mutations are applied locally.
    pub single_mode: bool,

    pub socket_path: Option<PathBuf>,

    pub client_id: u64,

    /// Ask the server to quit when this session leaves.
    pub autoquit: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            single_mode: true,
            socket_path: None,
            client_id: u64::from(std::process::id()),
            autoquit: false,
        }
    }
}

impl ServerConfig {
    /// Configured socket, or `$XDG_RUNTIME_DIR/trek.<user>.sock`.
    pub fn socket_path(&self) -> PathBuf {
        if let Some(path) = &self.socket_path {
            return path.clone();
        }

        let runtime: PathBuf = std::env::var_os("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir);
        let user: String = std::env::var("USER").unwrap_or_else(|_| "nobody".to_string());

        runtime.join(format!("{APPLICATION}.{user}.sock"))
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub dir: PathBuf,

    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        let dir: PathBuf = ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
            .map(|p: ProjectDirs| p.data_local_dir().join("logs"))
            .unwrap_or_else(|| PathBuf::from("logs"));

        Self {
            dir,
            level: "info".to_string(),
        }
    }
}

/// Main configuration struct for the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub options: Options,

    pub paths: DataPaths,

    pub server: ServerConfig,

    pub logging: LogConfig,
}

impl Config {
    /// Loads config from the TOML file at the XDG-compliant app config dir,
    /// writing the defaults there first when the file does not exist.
    pub async fn load() -> AppResult<Self> {
        let path: PathBuf = Self::config_path()?;
        Self::load_from(&path).await
    }

    pub async fn load_from(path: &Path) -> AppResult<Self> {
        if TokioFs::try_exists(path).await.unwrap_or(false) {
            info!("Loading config from {}", path.display());
            let text: String = TokioFs::read_to_string(path)
                .await
                .map_err(|source| AppError::ConfigIo {
                    path: path.to_path_buf(),
                    source,
                })?;
            let cfg: Self = toml::from_str(&text)?;
            validate_patterns(&cfg.options.hiddenfiles)?;

            Ok(cfg)
        } else {
            info!(
                "No config file found at {}, using default configuration. Creating it now.",
                path.display()
            );

            let default_config: Self = Self::default();
            default_config.save_to(path).await?;

            Ok(default_config)
        }
    }

    /// Saves config to the TOML file at the XDG-compliant app config dir.
    pub async fn save(&self) -> AppResult<()> {
        let path: PathBuf = Self::config_path()?;
        self.save_to(&path).await
    }

    pub async fn save_to(&self, path: &Path) -> AppResult<()> {
        info!("Saving config to {}", path.display());

        let io_err = |source| AppError::ConfigIo {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            TokioFs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let toml_str: String = toml::to_string_pretty(self)?;
        TokioFs::write(path, toml_str).await.map_err(io_err)?;

        Ok(())
    }

    /// Returns the canonical config file path using `directories::ProjectDirs`.
    pub fn config_path() -> AppResult<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Returns the config directory (without filename).
    pub fn config_dir() -> AppResult<PathBuf> {
        let proj_dirs: ProjectDirs = ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
            .ok_or_else(|| AppError::Other("Could not determine config directory.".into()))?;

        Ok(proj_dirs.config_dir().to_path_buf())
    }
}
