use anyhow::Result;

use crate::detect::result::DetectionResult;

/// Detector backend trait.
///
/// Implementations receive a decoded RGB8 frame (`width * height * 3` bytes)
/// and report boxes in normalized coordinates.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<DetectionResult>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
