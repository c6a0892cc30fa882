//! Error types

use std::path::PathBuf;

use thiserror::Error;

use crate::gpu::{ScalarKind, ShaderStage};

/// Errors raised by shader, buffer and framebuffer operations
#[derive(Debug, Error)]
pub enum GlError {
    /// A shader stage failed to compile
    #[error("{stage} shader compile failed ({name}): {log}")]
    Compile {
        name: String,
        stage: ShaderStage,
        log: String,
    },

    /// The program failed to link
    #[error("Shader link failed ({name}): {log}")]
    Link { name: String, log: String },

    /// A shader source file could not be read
    #[error("Failed to read shader source {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The driver refused to create an object
    #[error("Failed to create {what}: {reason}")]
    Create { what: &'static str, reason: String },

    /// No buffer is registered under the requested name
    #[error("{shader}: buffer not found: {name}")]
    BufferNotFound { shader: String, name: String },

    /// Readback element type differs from the uploaded one
    #[error("{shader}: {name} holds {stored:?} data, requested {requested:?}")]
    TypeMismatch {
        shader: String,
        name: String,
        stored: ScalarKind,
        requested: ScalarKind,
    },

    /// Index buffers must hold unsigned integers
    #[error("Invalid index type {0:?} (expected u8, u16 or u32)")]
    InvalidIndexType(ScalarKind),

    /// Raw upload whose byte length disagrees with its layout
    #[error("{shader}: {name} layout needs {expected} bytes, got {actual}")]
    LayoutMismatch {
        shader: String,
        name: String,
        expected: usize,
        actual: usize,
    },

    /// Component count is not a whole number of elements
    #[error("{shader}: {name} has {len} components, not a multiple of dim {dim}")]
    RaggedData {
        shader: String,
        name: String,
        len: usize,
        dim: usize,
    },

    /// Framebuffer completeness check failed
    #[error("Framebuffer incomplete: {0}")]
    FramebufferIncomplete(String),

    /// PNG export failed
    #[error("Failed to encode PNG: {0}")]
    Png(#[from] png::EncodingError),
}

impl GlError {
    /// True for the "buffer not found" condition raised by downloads and shares
    pub fn is_buffer_not_found(&self) -> bool {
        matches!(self, GlError::BufferNotFound { .. })
    }
}
