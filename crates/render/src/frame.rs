use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use metalwerk_frame::SlotIndex;
use metalwerk_math::MathError;

use crate::{DrawableSize, RendererConfig};

/// Animation state owned by the host and passed in every frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    /// Rotation of the model about `axis`, in radians.
    pub angle_radians: f32,
    /// Unit rotation axis.
    pub axis: Vec3,
    /// Distance from the camera to the model along -Z.
    pub distance: f32,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            angle_radians: 0.0,
            axis: Vec3::new(1.0, 1.0, 0.0).normalize(),
            distance: 8.0,
        }
    }
}

impl CameraState {
    pub fn advance(&mut self, radians: f32) {
        self.angle_radians = (self.angle_radians + radians) % std::f32::consts::TAU;
    }
}

/// Where a frame is in its life. `Completed` is reached on the completion
/// thread; the rest happen inside `produce_frame`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    Idle,
    SlotAcquired,
    MatricesComputed,
    Submitted,
    Completed,
}

/// Per-frame uniform block, laid out for direct upload.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct FrameUniforms {
    pub projection: [[f32; 4]; 4],
    pub model_view: [[f32; 4]; 4],
}

impl FrameUniforms {
    pub const IDENTITY: Self = Self {
        projection: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
        model_view: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    pub fn new(projection: Mat4, model_view: Mat4) -> Self {
        Self {
            projection: projection.to_cols_array_2d(),
            model_view: model_view.to_cols_array_2d(),
        }
    }

    pub fn projection(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.projection)
    }

    pub fn model_view(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.model_view)
    }

    /// Build the uniforms for one frame at the given drawable size.
    pub(crate) fn compute(
        config: &RendererConfig,
        drawable: DrawableSize,
        camera: &CameraState,
    ) -> Result<Self, MathError> {
        let projection = metalwerk_math::try_perspective_right_hand(
            config.fov_y_radians(),
            drawable.aspect(),
            config.near_z,
            config.far_z,
        )?;
        let model_view =
            metalwerk_math::try_model_view(camera.angle_radians, camera.axis, camera.distance)?;
        Ok(Self::new(projection, model_view))
    }
}

/// One unit of GPU work as handed to a [`CommandQueue`](crate::CommandQueue).
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSubmission {
    pub frame: u64,
    pub slot: SlotIndex,
    pub uniforms: FrameUniforms,
    pub drawable_size: DrawableSize,
    pub clear_color: [f64; 4],
}

/// What the renderer submitted for a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub frame: u64,
    pub slot: SlotIndex,
    pub aspect: f32,
    pub uniforms: FrameUniforms,
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn uniforms_are_two_packed_matrices() {
        assert_eq!(std::mem::size_of::<FrameUniforms>(), 128);
        let bytes = bytemuck::bytes_of(&FrameUniforms::IDENTITY);
        assert_eq!(bytes.len(), 128);
    }

    #[test]
    fn identity_round_trips_through_glam() {
        let u = FrameUniforms::new(Mat4::IDENTITY, Mat4::IDENTITY);
        assert_eq!(u, FrameUniforms::IDENTITY);
        assert_eq!(u.projection(), Mat4::IDENTITY);
    }

    #[test]
    fn compute_uses_drawable_aspect() {
        let config = RendererConfig::default();
        let camera = CameraState::default();
        let square = FrameUniforms::compute(&config, DrawableSize::new(100, 100), &camera).unwrap();
        let wide = FrameUniforms::compute(&config, DrawableSize::new(200, 100), &camera).unwrap();

        let sx = square.projection().x_axis.x;
        assert!((wide.projection().x_axis.x * 2.0 - sx).abs() < 1e-5);
        assert_eq!(square.model_view, wide.model_view);
    }

    #[test]
    fn compute_pushes_model_away_from_camera() {
        let camera = CameraState {
            distance: 5.0,
            ..CameraState::default()
        };
        let u = FrameUniforms::compute(&RendererConfig::default(), DrawableSize::default(), &camera)
            .unwrap();
        assert_eq!(u.model_view() * Vec4::W, Vec4::new(0.0, 0.0, -5.0, 1.0));
    }

    #[test]
    fn compute_matches_math_model_view() {
        let camera = CameraState {
            angle_radians: 1.1,
            ..CameraState::default()
        };
        let u = FrameUniforms::compute(&RendererConfig::default(), DrawableSize::default(), &camera)
            .unwrap();
        let expected = metalwerk_math::model_view(camera.angle_radians, camera.axis, camera.distance);
        assert_eq!(u.model_view(), expected);

        let far_away = CameraState {
            distance: f32::INFINITY,
            ..camera
        };
        assert!(matches!(
            FrameUniforms::compute(&RendererConfig::default(), DrawableSize::default(), &far_away),
            Err(MathError::InvalidParameter { name: "distance", .. })
        ));
    }

    #[test]
    fn compute_rejects_degenerate_axis() {
        let camera = CameraState {
            axis: Vec3::ZERO,
            ..CameraState::default()
        };
        assert!(
            FrameUniforms::compute(&RendererConfig::default(), DrawableSize::default(), &camera)
                .is_err()
        );
    }

    #[test]
    fn camera_angle_wraps() {
        let mut camera = CameraState::default();
        camera.advance(std::f32::consts::TAU + 0.5);
        assert!((camera.angle_radians - 0.5).abs() < 1e-5);
    }
}
