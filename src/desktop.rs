use crate::booru::is_safe_extension;
use crate::WallpaperError;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Url;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

const WALLPAPER_PREFIX: &str = "wallpaper-";

// Detected desktop environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesktopEnvironment {
    KdePlasma6,
    KdePlasma5,
    PlasmaFallback,
    Gnome,
    Feh,
    MacOs,
    Windows,
    Unknown,
}

impl std::fmt::Display for DesktopEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KdePlasma6 => write!(f, "KDE Plasma 6"),
            Self::KdePlasma5 => write!(f, "KDE Plasma 5"),
            Self::PlasmaFallback => write!(f, "KDE Plasma (plasma-apply-wallpaperimage)"),
            Self::Gnome => write!(f, "GNOME"),
            Self::Feh => write!(f, "feh"),
            Self::MacOs => write!(f, "macOS"),
            Self::Windows => write!(f, "Windows"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

// Function to get the file extension based on the MIME type
pub fn get_extension_from_content_type(content_type: &str) -> Result<String, WallpaperError> {
    if content_type.contains("jpeg") {
        Ok("jpg".to_string())
    } else if content_type.contains("png") {
        Ok("png".to_string())
    } else if content_type.contains("gif") {
        Ok("gif".to_string())
    } else if content_type.contains("webp") {
        Ok("webp".to_string())
    } else {
        Err(WallpaperError::InvalidContentType(content_type.to_string()))
    }
}

fn wallpaper_file_name(post_id: u64, extension: &str) -> String {
    format!("{}{}.{}", WALLPAPER_PREFIX, post_id, extension)
}

/// Download the image at `url` into `dir`, returning the saved path.
pub fn download_image(
    client: &Client,
    url: &Url,
    dir: &Path,
    post_id: u64,
    extension: &str,
) -> Result<PathBuf, WallpaperError> {
    if !extension.is_empty() && !is_safe_extension(extension) {
        return Err(WallpaperError::Download(format!(
            "refusing to save with extension {:?}",
            extension
        )));
    }

    log::info!("Downloading image...");
    log::debug!("url = {}", url);

    let response = client
        .get(url.clone())
        .header(ACCEPT, "image/avif,image/webp,image/apng,image/*,*/*;q=0.8")
        .send()?;

    // Ensure the response is successful
    if !response.status().is_success() {
        return Err(WallpaperError::Download(format!(
            "{} returned HTTP {}",
            url,
            response.status()
        )));
    }

    let extension = if extension.is_empty() {
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|val| val.to_str().ok())
            .unwrap_or_default();
        // Default to .jpg if content type isn't recognized
        get_extension_from_content_type(content_type).unwrap_or_else(|_| "jpg".to_string())
    } else {
        extension.to_string()
    };

    fs::create_dir_all(dir)?;
    let path = dir.join(wallpaper_file_name(post_id, &extension));
    let partial = path.with_extension(format!("{}.part", extension));

    let bytes = response.bytes()?;
    fs::write(&partial, &bytes)?;
    fs::rename(&partial, &path)?;

    log::debug!("Saved {} bytes to {}", bytes.len(), path.display());
    Ok(path)
}

/// Remove earlier downloads from `dir`, keeping `current`.
pub fn prune_wallpapers(dir: &Path, current: &Path) -> io::Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_ours = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(WALLPAPER_PREFIX));
        if is_ours && path.is_file() && path != current {
            fs::remove_file(&path)?;
            log::debug!("Removed old wallpaper {}", path.display());
            removed += 1;
        }
    }
    Ok(removed)
}

/// Check if a command exists in PATH
fn command_exists(cmd: &str) -> bool {
    Command::new("which")
        .arg(cmd)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Check if a process is running
fn process_running(name: &str) -> bool {
    Command::new("pgrep")
        .args(["-x", name])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Detect the current desktop environment
pub fn detect_desktop_environment() -> DesktopEnvironment {
    if cfg!(target_os = "macos") {
        return DesktopEnvironment::MacOs;
    }
    if cfg!(windows) {
        return DesktopEnvironment::Windows;
    }

    let plasmashell_running = process_running("plasmashell");

    if command_exists("qdbus6") && plasmashell_running {
        DesktopEnvironment::KdePlasma6
    } else if command_exists("qdbus") && plasmashell_running {
        DesktopEnvironment::KdePlasma5
    } else if command_exists("plasma-apply-wallpaperimage") {
        DesktopEnvironment::PlasmaFallback
    } else if command_exists("gsettings") {
        DesktopEnvironment::Gnome
    } else if command_exists("feh") {
        DesktopEnvironment::Feh
    } else {
        DesktopEnvironment::Unknown
    }
}

fn run(program: &str, args: &[&str]) -> Result<(), WallpaperError> {
    log::debug!("running {} {:?}", program, args);
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| WallpaperError::Command(format!("{}: {}", program, e)))?;

    if output.status.success() {
        Ok(())
    } else {
        Err(WallpaperError::Wallpaper(
            String::from_utf8_lossy(&output.stderr).to_string(),
        ))
    }
}

// Plasma script setting the image on every desktop (i.e. every monitor).
pub fn plasma_script(photo_path: &Path) -> String {
    format!(
        r"var allDesktops = desktops();
for (var i = 0; i < allDesktops.length; i++) {{
    d = allDesktops[i];
    d.wallpaperPlugin = 'org.kde.image';
    d.currentConfigGroup = Array('Wallpaper', 'org.kde.image', 'General');
    d.writeConfig('Image', 'file://{path}');
}}",
        path = photo_path.to_string_lossy()
    )
}

pub fn file_uri(photo_path: &Path) -> String {
    format!("file://{}", photo_path.to_string_lossy())
}

pub fn finder_script(photo_path: &Path) -> String {
    format!(
        "tell application \"Finder\" to set desktop picture to POSIX file \"{}\"",
        photo_path.to_string_lossy().replace('"', "\\\"")
    )
}

/// Set wallpaper on all monitors through the Plasma shell
fn set_wallpaper_qdbus(qdbus_cmd: &str, photo_path: &Path) -> Result<(), WallpaperError> {
    let script = plasma_script(photo_path);
    run(
        qdbus_cmd,
        &[
            "org.kde.plasmashell",
            "/PlasmaShell",
            "org.kde.PlasmaShell.evaluateScript",
            &script,
        ],
    )
}

/// Set wallpaper using gsettings (GNOME)
fn set_wallpaper_gnome(photo_path: &Path) -> Result<(), WallpaperError> {
    let uri = file_uri(photo_path);

    // Set both light and dark mode wallpapers
    for key in ["picture-uri", "picture-uri-dark"] {
        run("gsettings", &["set", "org.gnome.desktop.background", key, &uri])?;
    }

    Ok(())
}

// SystemParametersInfo through the `wallpaper` crate
#[cfg(windows)]
fn set_wallpaper_windows(photo_path: &Path) -> Result<(), WallpaperError> {
    let path = photo_path.to_str().ok_or_else(|| {
        WallpaperError::Wallpaper(format!("{} is not valid UTF-8", photo_path.display()))
    })?;
    wallpaper::set_from_path(path).map_err(|e| WallpaperError::Wallpaper(e.to_string()))
}

#[cfg(not(windows))]
fn set_wallpaper_windows(_photo_path: &Path) -> Result<(), WallpaperError> {
    Err(WallpaperError::Wallpaper(
        "The Windows wallpaper can only be set on Windows".to_string(),
    ))
}

/// Set the desktop wallpaper to the image at `photo_path`.
pub fn set_wallpaper(de: DesktopEnvironment, photo_path: &Path) -> Result<(), WallpaperError> {
    log::info!("Setting wallpaper...");
    log::debug!("image_path = {}, desktop = {}", photo_path.display(), de);

    match de {
        DesktopEnvironment::KdePlasma6 => set_wallpaper_qdbus("qdbus6", photo_path),
        DesktopEnvironment::KdePlasma5 => set_wallpaper_qdbus("qdbus", photo_path),
        DesktopEnvironment::PlasmaFallback => {
            run("plasma-apply-wallpaperimage", &[&photo_path.to_string_lossy()])
        }
        DesktopEnvironment::Gnome => set_wallpaper_gnome(photo_path),
        DesktopEnvironment::Feh => run("feh", &["--bg-scale", &photo_path.to_string_lossy()]),
        DesktopEnvironment::MacOs => run("osascript", &["-e", &finder_script(photo_path)]),
        DesktopEnvironment::Windows => set_wallpaper_windows(photo_path),
        DesktopEnvironment::Unknown => Err(WallpaperError::Wallpaper(
            "No supported wallpaper tool found".to_string(),
        )),
    }
}

/// Something that can put an image on the desktop.
pub trait WallpaperSetter {
    fn set(&self, photo_path: &Path) -> Result<(), WallpaperError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DesktopSetter;

impl WallpaperSetter for DesktopSetter {
    fn set(&self, photo_path: &Path) -> Result<(), WallpaperError> {
        let de = detect_desktop_environment();
        log::debug!("Detected desktop: {}", de);
        set_wallpaper(de, photo_path)
    }
}
