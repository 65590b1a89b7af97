use std::f32::consts::PI;

use glam::{Mat4, Vec3, Vec4};

use crate::MathError;

/// How far an axis length may drift from 1.0 before `try_rotation` rejects it.
pub const AXIS_UNIT_TOLERANCE: f32 = 1e-3;

/// Identity with the translation column set to `(tx, ty, tz, 1)`.
pub fn translation(tx: f32, ty: f32, tz: f32) -> Mat4 {
    Mat4::from_cols(
        Vec4::new(1.0, 0.0, 0.0, 0.0),
        Vec4::new(0.0, 1.0, 0.0, 0.0),
        Vec4::new(0.0, 0.0, 1.0, 0.0),
        Vec4::new(tx, ty, tz, 1.0),
    )
}

/// Axis-angle rotation (Rodrigues). `axis` must already be unit length;
/// it is not normalized here.
pub fn rotation(radians: f32, axis: Vec3) -> Mat4 {
    let ct = radians.cos();
    let st = radians.sin();
    let ci = 1.0 - ct;
    let Vec3 { x, y, z } = axis;

    #[rustfmt::skip]
    let m = Mat4::from_cols(
        Vec4::new(ct + x * x * ci,     y * x * ci + z * st, z * x * ci - y * st, 0.0),
        Vec4::new(x * y * ci - z * st, ct + y * y * ci,     z * y * ci + x * st, 0.0),
        Vec4::new(x * z * ci + y * st, y * z * ci - x * st, ct + z * z * ci,     0.0),
        Vec4::new(0.0,                 0.0,                 0.0,                 1.0),
    );
    m
}

/// Right-handed perspective projection with a [0, 1] depth range.
///
/// `aspect` is width / height. Requires `0 < fovy < PI`, `aspect > 0` and
/// `0 < near < far`; anything else produces a non-invertible matrix.
pub fn perspective_right_hand(fovy_radians: f32, aspect: f32, near_z: f32, far_z: f32) -> Mat4 {
    let ys = 1.0 / (fovy_radians * 0.5).tan();
    let xs = ys / aspect;
    let zs = far_z / (near_z - far_z);

    Mat4::from_cols(
        Vec4::new(xs, 0.0, 0.0, 0.0),
        Vec4::new(0.0, ys, 0.0, 0.0),
        Vec4::new(0.0, 0.0, zs, -1.0),
        Vec4::new(0.0, 0.0, near_z * zs, 0.0),
    )
}

/// [`rotation`] that rejects a non-finite angle or a non-unit axis.
pub fn try_rotation(radians: f32, axis: Vec3) -> Result<Mat4, MathError> {
    if !radians.is_finite() {
        return Err(MathError::invalid("radians", format!("{radians} is not finite")));
    }
    if !axis.is_finite() {
        return Err(MathError::invalid("axis", format!("{axis} is not finite")));
    }
    let len = axis.length();
    if len == 0.0 {
        return Err(MathError::invalid("axis", "zero-length axis"));
    }
    if (len - 1.0).abs() > AXIS_UNIT_TOLERANCE {
        return Err(MathError::invalid(
            "axis",
            format!("length {len} is not unit; normalize before calling"),
        ));
    }
    Ok(rotation(radians, axis))
}

/// [`perspective_right_hand`] that rejects inputs producing a degenerate matrix.
pub fn try_perspective_right_hand(
    fovy_radians: f32,
    aspect: f32,
    near_z: f32,
    far_z: f32,
) -> Result<Mat4, MathError> {
    if fovy_radians.is_nan() || fovy_radians <= 0.0 || fovy_radians >= PI {
        return Err(MathError::invalid(
            "fovy_radians",
            format!("{fovy_radians} is outside (0, PI)"),
        ));
    }
    if !aspect.is_finite() || aspect <= 0.0 {
        return Err(MathError::invalid("aspect", format!("{aspect} must be > 0")));
    }
    if !near_z.is_finite() || near_z <= 0.0 {
        return Err(MathError::invalid("near_z", format!("{near_z} must be > 0")));
    }
    if !far_z.is_finite() || far_z <= near_z {
        return Err(MathError::invalid(
            "far_z",
            format!("{far_z} must be finite and greater than near_z ({near_z})"),
        ));
    }
    Ok(perspective_right_hand(fovy_radians, aspect, near_z, far_z))
}

/// Model-view for a model spinning about `axis`, pushed `distance` units
/// down -Z in front of the camera.
pub fn model_view(radians: f32, axis: Vec3, distance: f32) -> Mat4 {
    translation(0.0, 0.0, -distance) * rotation(radians, axis)
}

/// [`model_view`] that validates the rotation and rejects a non-finite distance.
pub fn try_model_view(radians: f32, axis: Vec3, distance: f32) -> Result<Mat4, MathError> {
    if !distance.is_finite() {
        return Err(MathError::invalid("distance", format!("{distance} is not finite")));
    }
    Ok(translation(0.0, 0.0, -distance) * try_rotation(radians, axis)?)
}
