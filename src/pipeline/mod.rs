pub mod compositor;
pub mod detector;

pub use compositor::{CompositedFrame, Compositor, OverlayPlacement};
pub use detector::{DetectorMessage, DetectorSlot, FixedLandmarks, LandmarkDetector, LandmarkStream};
