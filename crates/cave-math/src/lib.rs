// SPDX-License-Identifier: CEPL-1.0
//! The two matrix constructors the renderer needs. Right-handed, Vulkan clip space
//! (depth in `[0, 1]`, Y pointing down).

pub use glam::{Mat4, Vec3};

/// View matrix looking from `eye` towards `center`.
pub fn look_at(eye: Vec3, center: Vec3, up: Vec3) -> Mat4 {
    Mat4::look_at_rh(eye, center, up)
}

/// Perspective projection with the Y axis flipped for Vulkan's clip space.
pub fn perspective(fov_y_radians: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    let mut proj = Mat4::perspective_rh(fov_y_radians, aspect, near, far);
    proj.y_axis.y *= -1.0;
    proj
}
