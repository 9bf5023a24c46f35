use std::time::Instant;

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
}

impl Frame {
    pub fn new(rgba: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            rgba,
            width,
            height,
            timestamp: Instant::now(),
        }
    }

    /// Solid-colour frame, handy for tests and for a blank source.
    pub fn filled(width: u32, height: u32, color: [u8; 4]) -> Self {
        let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);
        for _ in 0..(width as usize * height as usize) {
            rgba.extend_from_slice(&color);
        }
        Self::new(rgba, width, height)
    }

    pub fn is_consistent(&self) -> bool {
        self.rgba.len() == (self.width as usize) * (self.height as usize) * 4
    }
}

/// Normalized landmark, x and y in [0, 1] relative to the frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
}

impl Landmark {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn to_pixels(self, width: u32, height: u32) -> (f32, f32) {
        (self.x * width as f32, self.y * height as f32)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DetectorKind {
    Hand,
    Face,
}

impl DetectorKind {
    pub fn label(&self) -> &'static str {
        match self {
            DetectorKind::Hand => "hand",
            DetectorKind::Face => "face",
        }
    }
}

/// One detector callback. `landmarks` is empty when nothing was detected.
#[derive(Clone, Debug)]
pub struct Detection {
    pub kind: DetectorKind,
    pub landmarks: Vec<Landmark>,
    pub timestamp: Instant,
}

impl Detection {
    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JewelryKind {
    Earring,
    Necklace,
}

impl JewelryKind {
    pub fn label(&self) -> &'static str {
        match self {
            JewelryKind::Earring => "earring",
            JewelryKind::Necklace => "necklace",
        }
    }

    /// Guess the kind from a category id such as `gold_earrings`.
    pub fn infer(category: &str) -> Option<Self> {
        let lower = category.to_ascii_lowercase();
        if lower.contains("earring") {
            Some(JewelryKind::Earring)
        } else if lower.contains("necklace") {
            Some(JewelryKind::Necklace)
        } else {
            None
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NavDirection {
    Left,
    Right,
}

impl NavDirection {
    pub fn step(&self) -> isize {
        match self {
            NavDirection::Left => -1,
            NavDirection::Right => 1,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            NavDirection::Left => "left",
            NavDirection::Right => "right",
        }
    }
}

/// Which code path is asking to change the navigation state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mutator {
    User,
    Gesture,
    Sequencer,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandIndicator {
    NotDetected,
    Active,
    Flash,
}

impl HandIndicator {
    pub fn label(&self) -> &'static str {
        match self {
            HandIndicator::NotDetected => "Hand Not Detected",
            HandIndicator::Active | HandIndicator::Flash => "Gesture Active",
        }
    }
}
