use crate::acquire::{acquire, FetchRequest};
use crate::booru::PostSource;
use crate::config::{AppPaths, Settings};
use crate::desktop::{download_image, prune_wallpapers, WallpaperSetter};
use crate::display::DisplayBounds;
use crate::record::AcceptedImageRecord;
use crate::WallpaperError;
use reqwest::blocking::Client;

/// Pick the screen size to measure candidates against.
///
/// A pinned size from the config wins. Without one, `probe` is asked; if it
/// fails while no size constraint is in effect, zero bounds are good enough.
pub fn resolve_display_bounds<F>(
    settings: &Settings,
    request: &FetchRequest,
    probe: F,
) -> Result<DisplayBounds, WallpaperError>
where
    F: FnOnce() -> Result<DisplayBounds, WallpaperError>,
{
    if let Some(bounds) = settings.display_override()? {
        log::debug!("Using configured display size {}", bounds);
        return Ok(bounds);
    }

    match probe() {
        Ok(bounds) => {
            log::debug!("Detected display size {}", bounds);
            Ok(bounds)
        }
        Err(e) if request.min_size_ratio <= 0.0 => {
            log::debug!("{}; ignored since size is 0", e);
            Ok(DisplayBounds::default())
        }
        Err(e) => Err(e),
    }
}

pub struct SetContext<'a, S: ?Sized, W: ?Sized> {
    pub paths: &'a AppPaths,
    pub source: &'a S,
    pub http: &'a Client,
    pub setter: &'a W,
}

/// Fetch a fitting image, make it the wallpaper and remember how it was found.
pub fn run_set<S, W>(
    ctx: &SetContext<'_, S, W>,
    settings: &mut Settings,
    request: &FetchRequest,
    bounds: DisplayBounds,
) -> Result<AcceptedImageRecord, WallpaperError>
where
    S: PostSource + ?Sized,
    W: WallpaperSetter + ?Sized,
{
    log::debug!("request = {:?}, bounds = {}", request, bounds);

    let post = acquire(ctx.source, request, bounds)?;
    let url = post.download_url(&request.endpoint)?;

    ctx.paths.ensure_dirs()?;
    let image_path = download_image(ctx.http, &url, &ctx.paths.data_dir, post.id, &post.file_ext)?;
    ctx.setter.set(&image_path)?;

    // Nothing is persisted before the desktop has the new image
    let record = AcceptedImageRecord::new(post, request, &url, image_path);
    record.save(&ctx.paths.record_file())?;

    settings.remember(request);
    settings.save(&ctx.paths.config_file)?;

    if let Err(e) = prune_wallpapers(&ctx.paths.data_dir, &record.path) {
        log::warn!("Could not remove old wallpapers: {}", e);
    }

    Ok(record)
}
