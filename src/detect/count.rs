use anyhow::Result;
use std::path::Path;

use crate::classify::Thresholds;
use crate::detect::backend::DetectorBackend;
use crate::images::load_rgb;
use crate::results::{ResultEntry, ResultsTable};

/// Decode one image and count the persons the backend finds in it.
pub fn detect_and_count(backend: &mut dyn DetectorBackend, path: &Path) -> Result<u32> {
    let frame = load_rgb(path)?;
    let result = backend.detect(&frame.pixels, frame.width, frame.height)?;
    Ok(result.person_count())
}

/// Per-image progress callback for [`count_images`].
pub trait CountProgress {
    fn counted(&mut self, image: &str, count: Option<u32>);
}

impl<F: FnMut(&str, Option<u32>)> CountProgress for F {
    fn counted(&mut self, image: &str, count: Option<u32>) {
        self(image, count)
    }
}

/// Count every image in `images` (names relative to `dir`).
///
/// Images that fail to decode or detect are logged and left out of the table.
pub fn count_images(
    backend: &mut dyn DetectorBackend,
    dir: &Path,
    images: &[String],
    thresholds: Thresholds,
    progress: &mut dyn CountProgress,
) -> ResultsTable {
    let mut table = ResultsTable::new();
    for name in images {
        match detect_and_count(backend, &dir.join(name)) {
            Ok(count) => {
                log::debug!("{}: {} persons", name, count);
                table.insert(
                    name.clone(),
                    ResultEntry {
                        count,
                        label: Some(thresholds.level(count)),
                    },
                );
                progress.counted(name, Some(count));
            }
            Err(err) => {
                log::warn!("skipping {}: {:#}", name, err);
                progress.counted(name, None);
            }
        }
    }
    table
}
