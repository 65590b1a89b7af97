use metalwerk_frame::MAX_FRAMES_IN_FLIGHT;
use serde::{Deserialize, Serialize};

use crate::RenderError;

/// Pixel size of the drawable the host renders into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawableSize {
    pub width: u32,
    pub height: u32,
}

impl DrawableSize {
    /// Zero dimensions (minimised windows) are clamped to 1.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }

    /// Width over height.
    pub fn aspect(&self) -> f32 {
        self.width.max(1) as f32 / self.height.max(1) as f32
    }
}

impl Default for DrawableSize {
    fn default() -> Self {
        Self::new(800, 600)
    }
}

/// Renderer configuration, fixed at construction apart from the drawable size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Frames allowed in flight at once.
    pub buffer_count: usize,
    /// Vertical field of view in degrees.
    pub fov_y_degrees: f32,
    pub near_z: f32,
    pub far_z: f32,
    pub clear_color: [f64; 4],
    /// Initial drawable size; later changes arrive through `resize`.
    pub drawable_size: DrawableSize,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            buffer_count: 3,
            fov_y_degrees: 65.0,
            near_z: 0.1,
            far_z: 100.0,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            drawable_size: DrawableSize::default(),
        }
    }
}

impl RendererConfig {
    pub fn from_json_str(json: &str) -> Result<Self, RenderError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn fov_y_radians(&self) -> f32 {
        self.fov_y_degrees.to_radians()
    }

    pub fn validate(&self) -> Result<(), RenderError> {
        if self.buffer_count == 0 || self.buffer_count > MAX_FRAMES_IN_FLIGHT {
            return Err(RenderError::Config(format!(
                "buffer_count must be in 1..={MAX_FRAMES_IN_FLIGHT}, got {}",
                self.buffer_count
            )));
        }
        // Aspect is checked per frame; everything else must already form a
        // valid projection.
        metalwerk_math::try_perspective_right_hand(
            self.fov_y_radians(),
            1.0,
            self.near_z,
            self.far_z,
        )?;
        Ok(())
    }
}
