//! Matrix Library: pure constructors for 4x4 transform matrices.
//!
//! # Conventions
//! - Matrices are column-major `glam::Mat4` values.
//! - View space is right-handed, camera looking down -Z.
//! - Clip-space depth range is [0, 1]: a point at `z = -near` lands on depth 0
//!   and a point at `z = -far` lands on depth 1 after the perspective divide.
//!
//! The plain constructors never fail. Degenerate input yields a degenerate
//! matrix; use the `try_*` variants to reject it up front.

mod error;
mod matrix;

pub use error::MathError;
pub use matrix::{
    AXIS_UNIT_TOLERANCE, model_view, perspective_right_hand, rotation, translation,
    try_model_view, try_perspective_right_hand, try_rotation,
};

/// Column-major 4x4 transform.
pub type Matrix4x4 = glam::Mat4;
/// Three-component vector, used as a rotation axis.
pub type Vector3 = glam::Vec3;

pub fn crate_info() -> &'static str {
    "metalwerk-math v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("math"));
    }
}
