/// Result of running detection on a frame.
#[derive(Clone, Debug, Default)]
pub struct DetectionResult {
    /// Bounding boxes (normalized 0..1 centre coordinates and size).
    pub detections: Vec<Detection>,
}

impl DetectionResult {
    pub fn person_count(&self) -> u32 {
        self.detections
            .iter()
            .filter(|d| d.class == ObjectClass::Person)
            .count() as u32
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub confidence: f32,
    pub class: ObjectClass,
}

#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectClass {
    Person,
    Other(u16),
}

impl ObjectClass {
    /// COCO class index as emitted by YOLO models; 0 is person.
    pub fn from_coco(index: usize) -> Self {
        match index {
            0 => ObjectClass::Person,
            other => ObjectClass::Other(other.min(u16::MAX as usize) as u16),
        }
    }
}
