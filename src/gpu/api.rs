//! Rendering API seam
//!
//! [`GlApi`] lists every OpenGL operation this crate issues. The active
//! context is always passed in explicitly; implementations wrap whatever
//! global state the driver keeps.
//!
//! Method names are chosen so they never collide with `glow::HasContext`,
//! which lets both traits be in scope at the same call site.

use std::fmt::{self, Debug};

use super::scalar::ScalarKind;
use super::uniform::UniformValue;

/// Shader pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Geometry,
    Fragment,
}

impl ShaderStage {
    pub fn gl_enum(self) -> u32 {
        match self {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::Geometry => glow::GEOMETRY_SHADER,
            ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Geometry => "geometry",
            ShaderStage::Fragment => "fragment",
        };
        f.write_str(name)
    }
}

/// Primitive topology for draw calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Points,
    Lines,
    LineStrip,
    LineLoop,
    Triangles,
    TriangleStrip,
    TriangleFan,
}

impl Primitive {
    pub fn gl_enum(self) -> u32 {
        match self {
            Primitive::Points => glow::POINTS,
            Primitive::Lines => glow::LINES,
            Primitive::LineStrip => glow::LINE_STRIP,
            Primitive::LineLoop => glow::LINE_LOOP,
            Primitive::Triangles => glow::TRIANGLES,
            Primitive::TriangleStrip => glow::TRIANGLE_STRIP,
            Primitive::TriangleFan => glow::TRIANGLE_FAN,
        }
    }

    /// Indices consumed per primitive by indexed draws
    ///
    /// Strips, loops and fans are addressed per index.
    pub fn indices_per_primitive(self) -> usize {
        match self {
            Primitive::Triangles => 3,
            Primitive::Lines => 2,
            _ => 1,
        }
    }
}

/// Buffer usage hint passed with every data transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferUsage {
    Static,
    #[default]
    Dynamic,
    Stream,
}

impl BufferUsage {
    pub fn gl_enum(self) -> u32 {
        match self {
            BufferUsage::Static => glow::STATIC_DRAW,
            BufferUsage::Dynamic => glow::DYNAMIC_DRAW,
            BufferUsage::Stream => glow::STREAM_DRAW,
        }
    }

    /// Parse a config value ("static" | "dynamic" | "stream")
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "static" => Some(BufferUsage::Static),
            "dynamic" => Some(BufferUsage::Dynamic),
            "stream" => Some(BufferUsage::Stream),
            _ => None,
        }
    }
}

/// Renderbuffer storage format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderbufferFormat {
    Rgba8,
    Depth24Stencil8,
}

impl RenderbufferFormat {
    pub fn gl_enum(self) -> u32 {
        match self {
            RenderbufferFormat::Rgba8 => glow::RGBA8,
            RenderbufferFormat::Depth24Stencil8 => glow::DEPTH24_STENCIL8,
        }
    }
}

/// OpenGL operations used by shaders, buffers and framebuffers
///
/// Handles are plain copyable tokens. Creation methods return the driver's
/// message on failure; everything else is fire-and-forget like the
/// underlying API.
pub trait GlApi {
    type Shader: Copy + Debug + Eq;
    type Program: Copy + Debug + Eq;
    type Buffer: Copy + Debug + Eq;
    type VertexArray: Copy + Debug + Eq;
    type Renderbuffer: Copy + Debug + Eq;
    type Framebuffer: Copy + Debug + Eq;
    type UniformLocation: Clone + Debug;

    // === Shaders ===

    /// Compile one stage. A failed stage is deleted before the log is returned.
    fn compile_stage(&self, stage: ShaderStage, source: &str) -> Result<Self::Shader, String>;

    fn discard_stage(&self, shader: Self::Shader);

    /// Attach and link. A failed program is deleted before the log is returned.
    fn link_stages(&self, stages: &[Self::Shader]) -> Result<Self::Program, String>;

    fn discard_program(&self, program: Self::Program);

    fn activate_program(&self, program: Option<Self::Program>);

    fn attrib_location(&self, program: Self::Program, name: &str) -> Option<u32>;

    fn uniform_location(&self, program: Self::Program, name: &str)
        -> Option<Self::UniformLocation>;

    /// Set a uniform of the currently active program
    fn write_uniform(&self, location: &Self::UniformLocation, value: &UniformValue);

    // === Vertex arrays and buffers ===

    fn new_vertex_array(&self) -> Result<Self::VertexArray, String>;

    fn discard_vertex_array(&self, vertex_array: Self::VertexArray);

    fn activate_vertex_array(&self, vertex_array: Option<Self::VertexArray>);

    fn new_buffer(&self) -> Result<Self::Buffer, String>;

    fn discard_buffer(&self, buffer: Self::Buffer);

    /// Transfer `data` into `buffer`
    ///
    /// When `reallocate` is false the store keeps its size and is overwritten
    /// in place.
    fn write_buffer(&self, buffer: Self::Buffer, data: &[u8], usage: BufferUsage, reallocate: bool);

    /// Read the start of `buffer` back into `out`
    fn fetch_buffer(&self, buffer: Self::Buffer, out: &mut [u8]);

    /// Point attribute `location` of the active vertex array at `buffer`
    fn point_attrib(
        &self,
        location: u32,
        buffer: Self::Buffer,
        dim: usize,
        kind: ScalarKind,
        normalized: bool,
    );

    fn disable_attrib(&self, location: u32);

    /// Use `buffer` as the element array of the active vertex array
    fn attach_indices(&self, buffer: Self::Buffer);

    // === Draw calls ===

    fn draw_range(&self, primitive: Primitive, first: usize, count: usize);

    fn draw_indexed_range(
        &self,
        primitive: Primitive,
        count: usize,
        index_kind: ScalarKind,
        byte_offset: usize,
    );

    // === Framebuffers ===

    fn new_renderbuffer(
        &self,
        format: RenderbufferFormat,
        width: u32,
        height: u32,
        samples: u32,
    ) -> Result<Self::Renderbuffer, String>;

    fn discard_renderbuffer(&self, renderbuffer: Self::Renderbuffer);

    /// Assemble a framebuffer and check completeness
    fn new_framebuffer(
        &self,
        color: Self::Renderbuffer,
        depth_stencil: Self::Renderbuffer,
    ) -> Result<Self::Framebuffer, String>;

    fn discard_framebuffer(&self, framebuffer: Self::Framebuffer);

    /// `None` selects the default framebuffer
    fn activate_framebuffer(&self, framebuffer: Option<Self::Framebuffer>);

    fn toggle_multisample(&self, enabled: bool);

    /// Copy the color of a `width` x `height` region between framebuffers
    /// without scaling (resolves multisampled sources)
    fn blit_region(
        &self,
        src: Option<Self::Framebuffer>,
        dst: Option<Self::Framebuffer>,
        width: u32,
        height: u32,
    );

    /// Clear color, depth and stencil of the active framebuffer
    fn clear_target(&self, color: [f32; 4]);

    /// Read RGBA8 pixels bottom row first
    fn fetch_pixels(&self, src: Option<Self::Framebuffer>, width: u32, height: u32) -> Vec<u8>;
}
