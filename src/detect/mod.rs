//! Person detection.
//!
//! Backends turn an RGB frame into boxes; the counting pass keeps only
//! person boxes and writes one count per image into a [`ResultsTable`].
//!
//! [`ResultsTable`]: crate::ResultsTable

mod backend;
mod backends;
mod count;
mod result;

pub use backend::DetectorBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::{TractBackend, YoloParams};
pub use count::{count_images, detect_and_count, CountProgress};
pub use result::{Detection, DetectionResult, ObjectClass};
