pub mod acquire;
pub mod booru;
pub mod config;
pub mod desktop;
pub mod display;
pub mod logging;
pub mod record;
pub mod workflow;

pub use acquire::{acquire, is_good_fit, AcquireError, FetchRequest};
pub use booru::{BooruClient, BooruError, Post, PostSource};
pub use config::{AppPaths, Settings};
pub use display::DisplayBounds;
pub use record::AcceptedImageRecord;

use thiserror::Error;

// Default locations; both can be moved through the config file or `--config`
pub const CONFIG_PATH: &str = "~/.config/booru-wallpaper/config.toml";
pub const DATA_DIR: &str = "~/.local/share/booru-wallpaper/";
pub const DEFAULT_IMAGEBOARD: &str = "https://danbooru.donmai.us";

pub const USER_AGENT: &str = concat!("booru-wallpaper/", env!("CARGO_PKG_VERSION"));

// Define a custom error type
#[derive(Error, Debug)]
pub enum WallpaperError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("File operation error: {0}")]
    File(#[from] std::io::Error),

    #[error("Config file error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Config serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Display error: {0}")]
    Display(String),

    #[error("Download error: {0}")]
    Download(String),

    #[error("Invalid content type: {0}")]
    InvalidContentType(String),

    #[error("Wallpaper error: {0}")]
    Wallpaper(String),

    #[error("Command execution error: {0}")]
    Command(String),

    #[error("{0}")]
    NoRecord(String),

    #[error("Imageboard error: {0}")]
    Booru(#[from] BooruError),

    #[error("Image getting failed. {0}")]
    Acquire(#[from] AcquireError),
}

// Helper function to expand tilde in path
pub fn expand_tilde(path: &str) -> String {
    if path.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return path.replacen("~", &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}
