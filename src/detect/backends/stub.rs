use anyhow::{anyhow, Result};
use sha2::{Digest, Sha256};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{Detection, DetectionResult, ObjectClass};

const DEFAULT_MAX_PERSONS: u8 = 12;

/// Stub backend for demos and tests.
///
/// The number of persons is derived from a SHA-256 digest of the pixels, so
/// the same image always yields the same count without any model.
pub struct StubBackend {
    max_persons: u8,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            max_persons: DEFAULT_MAX_PERSONS,
        }
    }

    pub fn with_max_persons(mut self, max_persons: u8) -> Self {
        self.max_persons = max_persons;
        self
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<DetectionResult> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                expected,
                pixels.len()
            ));
        }

        let digest: [u8; 32] = Sha256::digest(pixels).into();
        let persons = digest[0] % self.max_persons.saturating_add(1);

        let detections = (0..persons as usize)
            .map(|i| {
                let a = digest[(i * 2 + 1) % 32];
                let b = digest[(i * 2 + 2) % 32];
                Detection {
                    x: f32::from(a) / 255.0,
                    y: f32::from(b) / 255.0,
                    w: 0.1,
                    h: 0.3,
                    confidence: 0.5 + f32::from(a ^ b) / 510.0,
                    class: ObjectClass::Person,
                }
            })
            .collect();

        Ok(DetectionResult { detections })
    }
}
