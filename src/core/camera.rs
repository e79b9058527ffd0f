//=========================================================================
// Camera
//=========================================================================
//
// World-space view handed to the render backend at flush. `follow` sets
// a target the camera eases toward in `update`; `set_position` snaps and
// drops the target.
//
//=========================================================================

use log::trace;

//=== View ================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct View {
    pub x: f32,
    pub y: f32,
    pub zoom: f32,
}

impl Default for View {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
        }
    }
}

//=== Camera ==============================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    x: f32,
    y: f32,
    zoom: f32,
    target: Option<(f32, f32)>,
    smoothing: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
            target: None,
            smoothing: Self::DEFAULT_SMOOTHING,
        }
    }
}

impl Camera {
    /// Fraction-per-second rate at which a followed target is approached.
    pub const DEFAULT_SMOOTHING: f32 = 8.0;
    pub const MIN_ZOOM: f32 = 0.01;

    pub fn new() -> Self {
        Self::default()
    }

    /// Non-positive smoothing snaps to the target every update.
    pub fn with_smoothing(mut self, smoothing: f32) -> Self {
        self.smoothing = smoothing;
        self
    }

    pub fn set_position(&mut self, x: f32, y: f32) {
        self.x = x;
        self.y = y;
        self.target = None;
    }

    pub fn follow(&mut self, x: f32, y: f32) {
        self.target = Some((x, y));
    }

    pub fn stop_following(&mut self) {
        self.target = None;
    }

    pub fn set_zoom(&mut self, zoom: f32) {
        self.zoom = zoom.max(Self::MIN_ZOOM);
    }

    pub fn position(&self) -> (f32, f32) {
        (self.x, self.y)
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn target(&self) -> Option<(f32, f32)> {
        self.target
    }

    pub fn update(&mut self, dt: f32) {
        let Some((tx, ty)) = self.target else {
            return;
        };
        let blend = if self.smoothing <= 0.0 {
            1.0
        } else {
            1.0 - (-self.smoothing * dt.max(0.0)).exp()
        };
        self.x += (tx - self.x) * blend;
        self.y += (ty - self.y) * blend;
        trace!(target: "frame", "Camera at ({:.2}, {:.2})", self.x, self.y);
    }

    pub fn view(&self) -> View {
        View {
            x: self.x,
            y: self.y,
            zoom: self.zoom,
        }
    }
}

//=========================================================================
// Unit Tests
//=========================================================================
