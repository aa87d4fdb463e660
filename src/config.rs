use crate::acquire::{validate_size_ratio, FetchRequest};
use crate::booru::Credentials;
use crate::display::DisplayBounds;
use crate::record::{ListChoice, RECORD_FILE};
use crate::{expand_tilde, WallpaperError, CONFIG_PATH, DATA_DIR, DEFAULT_IMAGEBOARD};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const LOG_FILE: &str = "booru-wallpaper.log";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    pub imageboard: String,
    /// Extra attempts after the first one.
    pub retries: u32,
    /// Minimum image size relative to the screen.
    pub size: f64,
    pub list: Vec<ListChoice>,
    pub verbose: bool,
    pub quiet: bool,
    /// Behave as if `--next` was always given.
    pub next: bool,
    pub timeout_secs: u64,
    /// Fixed screen size as "WIDTHxHEIGHT", skipping detection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            imageboard: DEFAULT_IMAGEBOARD.to_string(),
            retries: 2,
            size: 0.0,
            list: vec![ListChoice::All],
            verbose: false,
            quiet: false,
            next: false,
            timeout_secs: 30,
            display: None,
            data_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastRun {
    pub tags: Vec<String>,
    pub imageboard: String,
    pub retries: u32,
    pub size: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default, skip_serializing_if = "Credentials::is_empty")]
    pub auth: Credentials,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last: Option<LastRun>,
}

// Values given on the command line for `set`; `None` falls through.
#[derive(Debug, Clone, Default)]
pub struct SetOverrides {
    pub tags: Vec<String>,
    pub imageboard: Option<String>,
    pub retries: Option<u32>,
    pub size: Option<f64>,
    pub next: bool,
}

impl Settings {
    pub fn load_or_init(path: &Path) -> Result<Self, WallpaperError> {
        if !path.exists() {
            let settings = Self::default();
            settings.save(path)?;
            return Ok(settings);
        }

        let content = fs::read_to_string(path)?;
        let settings: Self = toml::from_str(&content)?;
        validate_size_ratio(settings.defaults.size)?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<(), WallpaperError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, WallpaperError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge command-line values, the last run (with `--next`) and the
    /// defaults, in that order of precedence.
    pub fn fetch_request(&self, overrides: &SetOverrides) -> Result<FetchRequest, WallpaperError> {
        let last = if overrides.next || self.defaults.next {
            match &self.last {
                Some(last) => {
                    log::debug!("next requested, previous = {:?}", last);
                    Some(last)
                }
                None if overrides.next => {
                    return Err(WallpaperError::Config(
                        "No previously set tags. Please set some before requesting the next wallpaper"
                            .to_string(),
                    ))
                }
                // First run with `next = true` in the config
                None => None,
            }
        } else {
            None
        };

        let tags = match last {
            Some(last) if overrides.tags.is_empty() => last.tags.clone(),
            _ => overrides.tags.clone(),
        };
        let imageboard = overrides
            .imageboard
            .as_deref()
            .or_else(|| last.map(|l| l.imageboard.as_str()))
            .unwrap_or(&self.defaults.imageboard);
        let retries = overrides
            .retries
            .or_else(|| last.map(|l| l.retries))
            .unwrap_or(self.defaults.retries);
        let size = overrides
            .size
            .or_else(|| last.map(|l| l.size))
            .unwrap_or(self.defaults.size);

        FetchRequest::new(tags, imageboard, retries.saturating_add(1), size)
    }

    pub fn remember(&mut self, request: &FetchRequest) {
        self.last = Some(LastRun {
            tags: request.tags.clone(),
            imageboard: request.endpoint.to_string(),
            retries: request.max_attempts.saturating_sub(1),
            size: request.min_size_ratio,
        });
    }

    /// Account to query with; `BOORU_LOGIN` / `BOORU_API_KEY` win over the file.
    pub fn credentials(&self) -> Credentials {
        Credentials {
            login: std::env::var("BOORU_LOGIN").ok().or_else(|| self.auth.login.clone()),
            api_key: std::env::var("BOORU_API_KEY")
                .ok()
                .or_else(|| self.auth.api_key.clone()),
        }
    }

    pub fn display_override(&self) -> Result<Option<DisplayBounds>, WallpaperError> {
        self.defaults
            .display
            .as_deref()
            .map(str::parse)
            .transpose()
            .map_err(WallpaperError::Config)
    }

    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.defaults.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub config_file: PathBuf,
    pub data_dir: PathBuf,
}

impl AppPaths {
    pub fn default_config_file() -> PathBuf {
        PathBuf::from(expand_tilde(CONFIG_PATH))
    }

    pub fn new(config_file: PathBuf, settings: &Settings) -> Self {
        let data_dir = settings
            .defaults
            .data_dir
            .as_deref()
            .map_or_else(|| expand_tilde(DATA_DIR), expand_tilde);
        Self {
            config_file,
            data_dir: PathBuf::from(data_dir),
        }
    }

    pub fn ensure_dirs(&self) -> Result<(), WallpaperError> {
        fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }

    pub fn record_file(&self) -> PathBuf {
        self.data_dir.join(RECORD_FILE)
    }

    pub fn log_file(&self) -> PathBuf {
        self.data_dir.join(LOG_FILE)
    }
}
