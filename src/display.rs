use crate::WallpaperError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use winit::dpi::PhysicalSize;
use winit::event_loop::EventLoop;

/// Screen dimensions in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayBounds {
    pub height: u32,
    pub width: u32,
}

impl DisplayBounds {
    pub const fn new(height: u32, width: u32) -> Self {
        Self { height, width }
    }
}

impl From<PhysicalSize<u32>> for DisplayBounds {
    fn from(size: PhysicalSize<u32>) -> Self {
        Self::new(size.height, size.width)
    }
}

impl fmt::Display for DisplayBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// Parses "WIDTHxHEIGHT", the order the `display` setting is written in
impl FromStr for DisplayBounds {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (width, height) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("{:?} is not in WIDTHxHEIGHT form", s))?;
        let width = width
            .trim()
            .parse()
            .map_err(|_| format!("{:?} has an invalid width", s))?;
        let height = height
            .trim()
            .parse()
            .map_err(|_| format!("{:?} has an invalid height", s))?;
        Ok(Self::new(height, width))
    }
}

// Primary monitor first, then whichever the platform lists first.
// Monitors reporting no size (e.g. disconnected outputs) are skipped.
fn pick_monitor<I>(primary: Option<PhysicalSize<u32>>, available: I) -> Option<DisplayBounds>
where
    I: IntoIterator<Item = PhysicalSize<u32>>,
{
    primary
        .into_iter()
        .chain(available)
        .map(DisplayBounds::from)
        .find(|bounds| bounds.width > 0 && bounds.height > 0)
}

/// Query the size of the primary monitor.
///
/// Must run on the main thread, and at most once per process.
pub fn detect() -> Result<DisplayBounds, WallpaperError> {
    let event_loop = EventLoop::new()
        .map_err(|e| WallpaperError::Display(format!("Unable to connect to the display: {}", e)))?;

    let primary = event_loop.primary_monitor().map(|monitor| monitor.size());
    let available: Vec<_> = event_loop
        .available_monitors()
        .map(|monitor| monitor.size())
        .collect();
    log::debug!("primary monitor = {:?}, available = {:?}", primary, available);

    pick_monitor(primary, available).ok_or_else(|| {
        WallpaperError::Display(
            "Unable to find monitor; set `display = \"WIDTHxHEIGHT\"` in the config".to_string(),
        )
    })
}
