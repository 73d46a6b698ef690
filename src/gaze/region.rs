use serde::{Deserialize, Serialize};

/// One gaze observation in screen coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GazeSample {
    pub x: f64,
    pub y: f64,
}

impl GazeSample {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn center(&self) -> (f64, f64) {
        (self.width / 2.0, self.height / 2.0)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(1920.0, 1080.0)
    }
}

/// Centered rectangle that counts as "looking at the task". Bounds are
/// inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttentionRegion {
    pub left: f64,
    pub right: f64,
    pub top: f64,
    pub bottom: f64,
}

impl AttentionRegion {
    /// `fraction` is the share of viewport width and height the region spans,
    /// so 0.5 covers everything within ±25% of the center on both axes.
    pub fn centered(viewport: Viewport, fraction: f64) -> Self {
        let (cx, cy) = viewport.center();
        let half_w = viewport.width * fraction / 2.0;
        let half_h = viewport.height * fraction / 2.0;
        Self {
            left: cx - half_w,
            right: cx + half_w,
            top: cy - half_h,
            bottom: cy + half_h,
        }
    }

    pub fn contains(&self, sample: GazeSample) -> bool {
        (self.left..=self.right).contains(&sample.x) && (self.top..=self.bottom).contains(&sample.y)
    }
}
