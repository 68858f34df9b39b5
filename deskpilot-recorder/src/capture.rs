//! Interactive capture of button templates
//!
//! The operator gets a short countdown to bring the target application to the
//! front, then clicks the button. A region around the click is saved as the
//! button's template image and the click itself becomes its fallback
//! coordinate.

use crate::{RecorderError, Result};
use deskpilot::{ConfigStore, Point, Region, XcapScreen};
use image::RgbaImage;
use rdev::{Button, EventType};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

pub const CAPTURE_WIDTH: u32 = 100;
pub const CAPTURE_HEIGHT: u32 = 50;

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Seconds counted down before the click is awaited
    pub countdown_secs: u32,
    pub click_timeout: Duration,
    pub width: u32,
    pub height: u32,
    /// Where template images are written
    pub screenshots_dir: PathBuf,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            countdown_secs: 5,
            click_timeout: Duration::from_secs(10),
            width: CAPTURE_WIDTH,
            height: CAPTURE_HEIGHT,
            screenshots_dir: PathBuf::from(deskpilot::config::SCREENSHOTS_DIR),
        }
    }
}

/// A saved template and the click it was taken around
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedButton {
    pub name: String,
    pub image: PathBuf,
    pub click: Point,
}

/// Delivers left clicks from a single long-lived `rdev` listener.
///
/// Clicks are only forwarded while the watcher is armed.
pub struct ClickWatcher {
    armed: Arc<AtomicBool>,
    clicks: mpsc::Receiver<Point>,
}

impl ClickWatcher {
    pub fn start() -> Self {
        let armed = Arc::new(AtomicBool::new(false));
        let armed_clone = Arc::clone(&armed);
        let (click_tx, clicks) = mpsc::channel();

        thread::spawn(move || {
            let mut last_mouse_pos = Point::new(0, 0);
            if let Err(error) = rdev::listen(move |event: rdev::Event| match event.event_type {
                EventType::MouseMove { x, y } => {
                    last_mouse_pos = Point::new(x.round() as i32, y.round() as i32);
                }
                EventType::ButtonPress(Button::Left) if armed_clone.load(Ordering::SeqCst) => {
                    let _ = click_tx.send(last_mouse_pos);
                }
                _ => {}
            }) {
                error!("Click listener failed: {:?}", error);
            }
        });

        Self { armed, clicks }
    }

    /// Wait up to `timeout` for the next left click
    pub fn next_click(&self, timeout: Duration) -> Result<Point> {
        while self.clicks.try_recv().is_ok() {}
        self.armed.store(true, Ordering::SeqCst);
        let click = self.clicks.recv_timeout(timeout);
        self.armed.store(false, Ordering::SeqCst);

        click.map_err(|e| match e {
            mpsc::RecvTimeoutError::Timeout => {
                RecorderError::Timeout(format!("no click within {}s", timeout.as_secs()))
            }
            mpsc::RecvTimeoutError::Disconnected => {
                RecorderError::ListenerError("click listener stopped".to_string())
            }
        })
    }
}

pub struct ButtonCapture {
    config: CaptureConfig,
    watcher: ClickWatcher,
}

impl ButtonCapture {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            watcher: ClickWatcher::start(),
        }
    }

    /// Count down, wait for the click, grab the region around it and record
    /// the result under `buttons.<name>`.
    ///
    /// `on_tick` is called with the remaining seconds, then with 0 once the
    /// click is awaited.
    #[instrument(skip(self, store, on_tick))]
    pub fn capture(
        &self,
        name: &str,
        store: &mut ConfigStore,
        mut on_tick: impl FnMut(u32),
    ) -> Result<CapturedButton> {
        for remaining in (1..=self.config.countdown_secs).rev() {
            on_tick(remaining);
            thread::sleep(Duration::from_secs(1));
        }
        on_tick(0);

        let click = self.watcher.next_click(self.config.click_timeout)?;
        debug!(%click, "Click received");

        let region = Region::centered_on(click, self.config.width, self.config.height);
        let image = XcapScreen::capture_region(region)
            .map_err(|e| RecorderError::CaptureError(e.to_string()))?;

        save_template(store, name, &image, click, &self.config.screenshots_dir)
    }
}

/// Write `image` as `<dir>/<name>.png` and point `buttons.<name>` at it
pub fn save_template(
    store: &mut ConfigStore,
    name: &str,
    image: &RgbaImage,
    click: Point,
    dir: &Path,
) -> Result<CapturedButton> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{name}.png"));
    image
        .save(&path)
        .map_err(|e| RecorderError::SaveError(format!("Failed to save {}: {e}", path.display())))?;
    store.set_element_location(name, &path, click)?;

    info!(button = name, image = %path.display(), %click, "Button captured");
    Ok(CapturedButton {
        name: name.to_string(),
        image: path,
        click,
    })
}
