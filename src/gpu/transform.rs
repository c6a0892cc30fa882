//! 4x4 transforms for matrix uniforms
//!
//! All matrices are column-major `[f32; 16]` (OpenGL convention).

pub type Mat4 = [f32; 16];

pub fn identity() -> Mat4 {
    scale(1.0, 1.0, 1.0)
}

/// Orthographic projection mapping the given box onto NDC
pub fn ortho(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4 {
    let mut m = [0.0; 16];
    m[0] = 2.0 / (right - left);
    m[5] = 2.0 / (top - bottom);
    m[10] = -2.0 / (far - near);
    m[12] = -(right + left) / (right - left);
    m[13] = -(top + bottom) / (top - bottom);
    m[14] = -(far + near) / (far - near);
    m[15] = 1.0;
    m
}

/// Generate orthographic projection matrix (top-left origin)
///
/// Map pixel coordinates (0,0)-(width,height)
/// to NDC (-1,1)-(1,-1)
pub fn ortho_projection(width: f32, height: f32) -> Mat4 {
    ortho(0.0, width, height, 0.0, -1.0, 1.0)
}

pub fn translate(x: f32, y: f32, z: f32) -> Mat4 {
    let mut m = identity();
    m[12] = x;
    m[13] = y;
    m[14] = z;
    m
}

pub fn scale(x: f32, y: f32, z: f32) -> Mat4 {
    let mut m = [0.0; 16];
    m[0] = x;
    m[5] = y;
    m[10] = z;
    m[15] = 1.0;
    m
}

/// `a * b` (apply `b` first)
pub fn multiply(a: &Mat4, b: &Mat4) -> Mat4 {
    let mut m = [0.0; 16];
    for col in 0..4 {
        for row in 0..4 {
            m[col * 4 + row] = (0..4).map(|k| a[k * 4 + row] * b[col * 4 + k]).sum();
        }
    }
    m
}

/// Transform a point (w = 1), returning the homogeneous result
pub fn transform_point(m: &Mat4, p: [f32; 3]) -> [f32; 4] {
    let mut out = [0.0; 4];
    for (row, value) in out.iter_mut().enumerate() {
        *value = m[row] * p[0] + m[4 + row] * p[1] + m[8 + row] * p[2] + m[12 + row];
    }
    out
}
