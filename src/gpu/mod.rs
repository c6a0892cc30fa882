//! GPU resources with OpenGL
//!
//! Handles:
//! - Shader compilation/linking and versioned attribute uploads
//! - Offscreen framebuffers (MSAA, blit, readback)
//! - Backends: `glow::Context` and the host-memory `HeadlessGl`

pub mod api;
pub mod buffer;
pub mod fbo;
mod glow_api;
pub mod headless;
pub mod library;
pub mod scalar;
pub mod shader;
pub mod transform;
pub mod uniform;

pub use api::{BufferUsage, GlApi, Primitive, RenderbufferFormat, ShaderStage};
pub use buffer::VERSION_UNSET;
pub use fbo::Framebuffer;
pub use headless::{AttribPointer, DrawCall, HeadlessGl, LiveObjects};
pub use library::{ShaderLibrary, ShaderWatcher};
pub use scalar::{AttribLayout, Scalar, ScalarKind, VertexData};
pub use shader::{inject_definitions, GlShader, ShaderOptions, INDICES};
pub use uniform::UniformValue;
