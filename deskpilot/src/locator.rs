use tracing::{debug, info, instrument, warn};

use crate::config::ElementLocation;
use crate::matcher::{MatchTier, NccMatcher, TemplateMatcher};
use crate::screen::{ScreenCapture, XcapScreen};
use crate::types::Point;
use std::fmt;
use std::path::Path;

/// How a target was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    HighConfidence,
    MediumConfidence,
    LowConfidence,
    Grayscale,
    SavedCoordinates,
    SavedCoordinatesNoImage,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Strategy::HighConfidence => "high confidence",
            Strategy::MediumConfidence => "medium confidence",
            Strategy::LowConfidence => "low confidence",
            Strategy::Grayscale => "grayscale match",
            Strategy::SavedCoordinates => "saved coordinates",
            Strategy::SavedCoordinatesNoImage => "saved coordinates (no image)",
        };
        f.write_str(tag)
    }
}

/// Why a target could not be resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocateFailure {
    /// No template image configured or on disk, and no fallback
    NoImageFile,
    /// Every tier missed and there is no fallback
    NotFound,
}

impl fmt::Display for LocateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocateFailure::NoImageFile => f.write_str("not found (no image file)"),
            LocateFailure::NotFound => f.write_str("not found"),
        }
    }
}

/// A resolved screen position and the strategy that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Located {
    pub point: Point,
    pub strategy: Strategy,
}

/// The cascade, strictest first. Each tier is attempted once.
pub const MATCH_TIERS: [(Strategy, MatchTier); 4] = [
    (
        Strategy::HighConfidence,
        MatchTier {
            confidence: 0.8,
            grayscale: false,
        },
    ),
    (
        Strategy::MediumConfidence,
        MatchTier {
            confidence: 0.6,
            grayscale: false,
        },
    ),
    (
        Strategy::LowConfidence,
        MatchTier {
            confidence: 0.5,
            grayscale: false,
        },
    ),
    (
        Strategy::Grayscale,
        MatchTier {
            confidence: 0.6,
            grayscale: true,
        },
    ),
];

/// Resolves template images to screen coordinates.
///
/// Every tier works on a freshly captured frame, so a dialog that finishes
/// rendering between attempts is still found by the next tier.
pub struct ElementLocator {
    screen: Box<dyn ScreenCapture>,
    matcher: Box<dyn TemplateMatcher>,
}

impl ElementLocator {
    pub fn new(screen: Box<dyn ScreenCapture>, matcher: Box<dyn TemplateMatcher>) -> Self {
        Self { screen, matcher }
    }

    /// Primary monitor capture with the normalized cross-correlation matcher
    pub fn desktop() -> Self {
        Self::new(Box::new(XcapScreen::new()), Box::new(NccMatcher::new()))
    }

    /// Resolve a configured element location
    pub fn locate_element(&mut self, location: &ElementLocation) -> Result<Located, LocateFailure> {
        self.locate(location.image.as_deref(), location.fallback)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn locate(
        &mut self,
        template: Option<&Path>,
        fallback: Option<Point>,
    ) -> Result<Located, LocateFailure> {
        let Some(template_path) = template.filter(|path| path.exists()) else {
            return match fallback {
                Some(point) => {
                    debug!(%point, "No template image, using saved coordinates");
                    Ok(Located {
                        point,
                        strategy: Strategy::SavedCoordinatesNoImage,
                    })
                }
                None => Err(LocateFailure::NoImageFile),
            };
        };

        match image::open(template_path) {
            Ok(template_image) => {
                let template_image = template_image.to_rgba8();
                for (strategy, tier) in MATCH_TIERS {
                    let frame = match self.screen.capture() {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!(%strategy, "Screen capture failed: {}", e);
                            continue;
                        }
                    };
                    if let Some(region) = self.matcher.find(&frame.image, &template_image, tier) {
                        let point = frame.to_desktop(region.center());
                        info!(%point, %strategy, "Template located");
                        return Ok(Located { point, strategy });
                    }
                    debug!(%strategy, "No match");
                }
            }
            Err(e) => warn!(
                path = %template_path.display(),
                "Template image unreadable: {}", e
            ),
        }

        match fallback {
            Some(point) => {
                info!(%point, "Template not found, using saved coordinates");
                Ok(Located {
                    point,
                    strategy: Strategy::SavedCoordinates,
                })
            }
            None => Err(LocateFailure::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AutomationError;
    use crate::screen::Screenshot;
    use crate::types::Region;
    use image::{Rgba, RgbaImage};
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    struct BlankScreen {
        captures: Arc<Mutex<usize>>,
        fail: bool,
    }

    impl ScreenCapture for BlankScreen {
        fn capture(&mut self) -> Result<Screenshot, AutomationError> {
            *self.captures.lock().unwrap() += 1;
            if self.fail {
                return Err(AutomationError::PlatformError("no display".to_string()));
            }
            Ok(Screenshot {
                image: RgbaImage::from_pixel(64, 48, Rgba([0, 0, 0, 255])),
                origin: Point::new(1920, 0),
            })
        }
    }

    /// Matches only at or below `threshold`, recording every tier it was asked for
    struct ThresholdMatcher {
        threshold: Option<f32>,
        grayscale_only: bool,
        attempts: Arc<Mutex<Vec<MatchTier>>>,
    }

    impl TemplateMatcher for ThresholdMatcher {
        fn find(&self, _: &RgbaImage, _: &RgbaImage, tier: MatchTier) -> Option<Region> {
            self.attempts.lock().unwrap().push(tier);
            let threshold = self.threshold?;
            if self.grayscale_only && !tier.grayscale {
                return None;
            }
            (tier.confidence <= threshold).then_some(Region::new(10, 20, 30, 10))
        }
    }

    struct Harness {
        locator: ElementLocator,
        captures: Arc<Mutex<usize>>,
        attempts: Arc<Mutex<Vec<MatchTier>>>,
    }

    fn harness(threshold: Option<f32>, grayscale_only: bool, fail_capture: bool) -> Harness {
        let captures = Arc::new(Mutex::new(0));
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let locator = ElementLocator::new(
            Box::new(BlankScreen {
                captures: captures.clone(),
                fail: fail_capture,
            }),
            Box::new(ThresholdMatcher {
                threshold,
                grayscale_only,
                attempts: attempts.clone(),
            }),
        );
        Harness {
            locator,
            captures,
            attempts,
        }
    }

    fn template_file(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("button.png");
        RgbaImage::from_pixel(4, 4, Rgba([200, 10, 10, 255]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn test_low_confidence_match_tries_stricter_tiers_first() {
        let dir = tempdir().unwrap();
        let template = template_file(dir.path());
        let mut h = harness(Some(0.5), false, false);

        let located = h.locator.locate(Some(&template), None).unwrap();

        assert_eq!(located.strategy, Strategy::LowConfidence);
        assert_eq!(located.strategy.to_string(), "low confidence");
        // frame origin + region centre
        assert_eq!(located.point, Point::new(1920 + 25, 25));
        let confidences: Vec<f32> = h.attempts.lock().unwrap().iter().map(|t| t.confidence).collect();
        assert_eq!(confidences, vec![0.8, 0.6, 0.5]);
        assert_eq!(*h.captures.lock().unwrap(), 3);
    }

    #[test]
    fn test_high_confidence_stops_immediately() {
        let dir = tempdir().unwrap();
        let template = template_file(dir.path());
        let mut h = harness(Some(0.9), false, false);

        let located = h.locator.locate(Some(&template), Some(Point::new(1, 1))).unwrap();
        assert_eq!(located.strategy, Strategy::HighConfidence);
        assert_eq!(h.attempts.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_grayscale_is_the_last_tier() {
        let dir = tempdir().unwrap();
        let template = template_file(dir.path());
        let mut h = harness(Some(0.6), true, false);

        let located = h.locator.locate(Some(&template), None).unwrap();
        assert_eq!(located.strategy, Strategy::Grayscale);
        assert_eq!(located.strategy.to_string(), "grayscale match");
        let attempts = h.attempts.lock().unwrap();
        assert_eq!(attempts.len(), 4);
        assert!(attempts[..3].iter().all(|t| !t.grayscale));
        assert!(attempts[3].grayscale);
    }

    #[test]
    fn test_all_tiers_miss_uses_fallback() {
        let dir = tempdir().unwrap();
        let template = template_file(dir.path());
        let mut h = harness(None, false, false);

        let located = h.locator.locate(Some(&template), Some(Point::new(300, 400))).unwrap();
        assert_eq!(located.point, Point::new(300, 400));
        assert_eq!(located.strategy.to_string(), "saved coordinates");
        assert_eq!(h.attempts.lock().unwrap().len(), 4);
    }

    #[test]
    fn test_all_tiers_miss_without_fallback() {
        let dir = tempdir().unwrap();
        let template = template_file(dir.path());
        let mut h = harness(None, false, false);

        let failure = h.locator.locate(Some(&template), None).unwrap_err();
        assert_eq!(failure, LocateFailure::NotFound);
        assert_eq!(failure.to_string(), "not found");
    }

    #[test]
    fn test_missing_template_file_skips_matching() {
        let mut h = harness(Some(1.0), false, false);
        let missing = Path::new("/definitely/not/here.png");

        let located = h.locator.locate(Some(missing), Some(Point::new(5, 6))).unwrap();
        assert_eq!(located.strategy.to_string(), "saved coordinates (no image)");
        assert_eq!(located.point, Point::new(5, 6));

        let failure = h.locator.locate(None, None).unwrap_err();
        assert_eq!(failure.to_string(), "not found (no image file)");

        assert!(h.attempts.lock().unwrap().is_empty());
        assert_eq!(*h.captures.lock().unwrap(), 0);
    }

    #[test]
    fn test_capture_errors_fall_through_to_fallback() {
        let dir = tempdir().unwrap();
        let template = template_file(dir.path());
        let mut h = harness(Some(1.0), false, true);

        let located = h.locator.locate(Some(&template), Some(Point::new(7, 8))).unwrap();
        assert_eq!(located.strategy, Strategy::SavedCoordinates);
        assert_eq!(*h.captures.lock().unwrap(), 4);
        assert!(h.attempts.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unreadable_template_uses_fallback() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not a png").unwrap();
        let mut h = harness(Some(1.0), false, false);

        let located = h.locator.locate(Some(&path), Some(Point::new(9, 9))).unwrap();
        assert_eq!(located.strategy, Strategy::SavedCoordinates);
        assert!(h.attempts.lock().unwrap().is_empty());
    }

    #[test]
    fn test_locate_element_uses_configured_pair() {
        let mut h = harness(None, false, false);
        let location = ElementLocation {
            name: "ok".to_string(),
            image: None,
            fallback: Some(Point::new(42, 24)),
        };
        let located = h.locator.locate_element(&location).unwrap();
        assert_eq!(located.strategy, Strategy::SavedCoordinatesNoImage);
    }
}
