//! Screen capture

use crate::errors::AutomationError;
use crate::types::{Point, Region};
use image::RgbaImage;
use tracing::{debug, instrument};

/// A captured frame and the desktop position of its top-left pixel
#[derive(Debug, Clone)]
pub struct Screenshot {
    pub image: RgbaImage,
    pub origin: Point,
}

impl Screenshot {
    /// Translate a frame-relative point to desktop coordinates
    pub fn to_desktop(&self, point: Point) -> Point {
        Point::new(self.origin.x + point.x, self.origin.y + point.y)
    }
}

/// Source of screen frames for the locator
pub trait ScreenCapture: Send {
    fn capture(&mut self) -> Result<Screenshot, AutomationError>;
}

/// Captures the primary monitor through `xcap`
#[derive(Debug, Default)]
pub struct XcapScreen;

impl XcapScreen {
    pub fn new() -> Self {
        Self
    }

    /// Capture `region` (desktop coordinates) from the monitor containing its centre.
    /// The region is clipped to that monitor.
    #[instrument(level = "debug")]
    pub fn capture_region(region: Region) -> Result<RgbaImage, AutomationError> {
        let center = region.center();
        let monitor = xcap::Monitor::from_point(center.x, center.y).map_err(|e| {
            AutomationError::PlatformError(format!("No monitor at {center}: {e}"))
        })?;
        let (origin_x, origin_y) = monitor_origin(&monitor)?;
        let image = monitor.capture_image().map_err(|e| {
            AutomationError::PlatformError(format!("Failed to capture screen: {e}"))
        })?;

        let left = (region.x - origin_x).max(0) as u32;
        let top = (region.y - origin_y).max(0) as u32;
        if left >= image.width() || top >= image.height() {
            return Err(AutomationError::InvalidArgument(format!(
                "Region {region:?} lies outside the monitor"
            )));
        }
        let width = region.width.min(image.width() - left);
        let height = region.height.min(image.height() - top);

        Ok(image::imageops::crop_imm(&image, left, top, width, height).to_image())
    }
}

impl ScreenCapture for XcapScreen {
    fn capture(&mut self) -> Result<Screenshot, AutomationError> {
        let monitors = xcap::Monitor::all().map_err(|e| {
            AutomationError::PlatformError(format!("Failed to get monitors: {e}"))
        })?;
        let mut primary_monitor: Option<xcap::Monitor> = None;
        for monitor in monitors {
            match monitor.is_primary() {
                Ok(true) => {
                    primary_monitor = Some(monitor);
                    break;
                }
                Ok(false) => continue,
                Err(e) => {
                    return Err(AutomationError::PlatformError(format!(
                        "Error checking monitor primary status: {e}"
                    )));
                }
            }
        }
        let primary_monitor = primary_monitor.ok_or_else(|| {
            AutomationError::PlatformError("Could not find primary monitor".to_string())
        })?;

        let (x, y) = monitor_origin(&primary_monitor)?;
        let image = primary_monitor.capture_image().map_err(|e| {
            AutomationError::PlatformError(format!("Failed to capture screen: {e}"))
        })?;
        debug!(width = image.width(), height = image.height(), "Captured primary monitor");

        Ok(Screenshot {
            image,
            origin: Point::new(x, y),
        })
    }
}

/// Title of the first window whose title contains `needle`, ignoring case
#[instrument(level = "debug")]
pub fn find_window(needle: &str) -> Result<Option<String>, AutomationError> {
    let windows = xcap::Window::all()
        .map_err(|e| AutomationError::PlatformError(format!("Failed to get windows: {e}")))?;
    let needle = needle.to_lowercase();

    Ok(windows
        .iter()
        .filter_map(|window| window.title().ok())
        .find(|title| title.to_lowercase().contains(&needle)))
}

fn monitor_origin(monitor: &xcap::Monitor) -> Result<(i32, i32), AutomationError> {
    let x = monitor.x().map_err(|e| {
        AutomationError::PlatformError(format!("Failed to get monitor x: {e}"))
    })?;
    let y = monitor.y().map_err(|e| {
        AutomationError::PlatformError(format!("Failed to get monitor y: {e}"))
    })?;
    Ok((x, y))
}
