//! OpenGL resource helpers
//!
//! Handles:
//! - Shader program compilation and linking (with `#define` injection)
//! - Named vertex/index buffers with version-gated uploads
//! - Buffer sharing between independent shader programs
//! - Offscreen framebuffers with MSAA and blit-to-screen
//!
//! Every operation takes the active rendering context explicitly as a
//! [`GlApi`] implementation: `glow::Context` for a real GPU, or
//! [`HeadlessGl`] for host-memory rendering in tests and tools.

pub mod config;
pub mod error;
pub mod gpu;

pub use config::Config;
pub use error::GlError;
pub use gpu::{
    AttribLayout, BufferUsage, Framebuffer, GlApi, GlShader, HeadlessGl, Primitive, Scalar,
    ScalarKind, ShaderLibrary, ShaderOptions, ShaderStage, ShaderWatcher, UniformValue,
    VertexData, INDICES, VERSION_UNSET,
};
