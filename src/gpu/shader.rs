//! Shader management
//!
//! [`GlShader`] compiles and links a program from GLSL source, owns one
//! vertex array object, and keeps named attribute buffers with versioned
//! uploads: re-uploading under an unchanged version is skipped entirely, so
//! static geometry is transferred once and reused across frames.

use std::collections::BTreeMap;
use std::path::Path;

use log::{debug, error, info, trace, warn};

use super::api::{BufferUsage, GlApi, Primitive, ShaderStage};
use super::buffer::{Buffer, BufferRegistry, Removed, SharedBuffer, VERSION_UNSET};
use super::scalar::{AttribLayout, Scalar, VertexData};
use super::uniform::UniformValue;
use crate::error::GlError;

/// Reserved attribute name of the index buffer used by `draw_indexed`
pub const INDICES: &str = "indices";

/// Per-shader behaviour settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderOptions {
    /// Usage hint for every buffer transfer
    pub usage: BufferUsage,
    /// Warn when an uploaded or shared attribute has no location
    pub warn_missing: bool,
    /// Log the (define-injected) source of a stage that fails to compile
    pub log_source_on_error: bool,
}

impl Default for ShaderOptions {
    fn default() -> Self {
        Self {
            usage: BufferUsage::Dynamic,
            warn_missing: true,
            log_source_on_error: true,
        }
    }
}

/// Compiled shader program with its vertex array and attribute buffers
pub struct GlShader<A: GlApi> {
    name: String,
    vertex: Option<A::Shader>,
    fragment: Option<A::Shader>,
    geometry: Option<A::Shader>,
    program: Option<A::Program>,
    vertex_array: Option<A::VertexArray>,
    definitions: BTreeMap<String, String>,
    buffers: BufferRegistry<A::Buffer>,
    options: ShaderOptions,
}

impl<A: GlApi> Default for GlShader<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: GlApi> GlShader<A> {
    /// Create an uninitialized shader
    pub fn new() -> Self {
        Self::with_options(ShaderOptions::default())
    }

    pub fn with_options(options: ShaderOptions) -> Self {
        Self {
            name: String::new(),
            vertex: None,
            fragment: None,
            geometry: None,
            program: None,
            vertex_array: None,
            definitions: BTreeMap::new(),
            buffers: BufferRegistry::new(),
            options,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> ShaderOptions {
        self.options
    }

    pub fn is_initialized(&self) -> bool {
        self.program.is_some()
    }

    pub fn program(&self) -> Option<A::Program> {
        self.program
    }

    pub fn vertex_array(&self) -> Option<A::VertexArray> {
        self.vertex_array
    }

    pub fn definitions(&self) -> &BTreeMap<String, String> {
        &self.definitions
    }

    /// Set a preprocessor definition for subsequent `init` calls
    pub fn define(&mut self, key: &str, value: &str) {
        self.definitions.insert(key.to_string(), value.to_string());
    }

    /// Compile and link from source strings
    ///
    /// Definitions are injected into every stage. On failure all objects
    /// created by this call are released again and the shader stays
    /// uninitialized. Calling this on a live shader frees it first.
    pub fn init(
        &mut self,
        gl: &A,
        name: &str,
        vertex_src: &str,
        fragment_src: &str,
        geometry_src: Option<&str>,
    ) -> Result<(), GlError> {
        if self.is_initialized() {
            debug!("Reinitializing shader \"{}\" as \"{}\"", self.name, name);
            self.free(gl);
        }
        self.name = name.to_string();

        let geometry_src = geometry_src.filter(|src| !src.is_empty());
        let mut stages = Vec::with_capacity(3);
        let (vertex, geometry, fragment) =
            match self.compile_stages(gl, vertex_src, geometry_src, fragment_src, &mut stages) {
                Ok(handles) => handles,
                Err(e) => {
                    for shader in stages {
                        gl.discard_stage(shader);
                    }
                    return Err(e);
                }
            };

        let program = match gl.link_stages(&stages) {
            Ok(program) => program,
            Err(log) => {
                error!("Linker error ({}):\n{}", self.name, log);
                for shader in stages {
                    gl.discard_stage(shader);
                }
                return Err(GlError::Link {
                    name: self.name.clone(),
                    log,
                });
            }
        };

        let vertex_array = match gl.new_vertex_array() {
            Ok(vao) => vao,
            Err(reason) => {
                gl.discard_program(program);
                for shader in stages {
                    gl.discard_stage(shader);
                }
                return Err(GlError::Create {
                    what: "vertex array",
                    reason,
                });
            }
        };

        self.vertex = Some(vertex);
        self.geometry = geometry;
        self.fragment = Some(fragment);
        self.program = Some(program);
        self.vertex_array = Some(vertex_array);

        // Buffers uploaded before init have no attribute pointers yet
        for (attrib, buffer) in self.buffers.live() {
            let (handle, layout) = {
                let buffer = buffer.borrow();
                (buffer.handle, buffer.layout())
            };
            self.bind_attrib(gl, &attrib, handle, layout);
        }

        info!(
            "Shader compiled: {} ({} definitions)",
            self.name,
            self.definitions.len()
        );
        Ok(())
    }

    /// Compile and link from files on disk
    pub fn init_from_files(
        &mut self,
        gl: &A,
        name: &str,
        vertex_path: &Path,
        fragment_path: &Path,
        geometry_path: Option<&Path>,
    ) -> Result<(), GlError> {
        let vertex_src = read_source(vertex_path)?;
        let fragment_src = read_source(fragment_path)?;
        let geometry_src = geometry_path.map(read_source).transpose()?;

        self.init(
            gl,
            name,
            &vertex_src,
            &fragment_src,
            geometry_src.as_deref(),
        )
    }

    /// Compile every stage, recording each success in `stages` for cleanup
    fn compile_stages(
        &self,
        gl: &A,
        vertex_src: &str,
        geometry_src: Option<&str>,
        fragment_src: &str,
        stages: &mut Vec<A::Shader>,
    ) -> Result<(A::Shader, Option<A::Shader>, A::Shader), GlError> {
        let vertex = self.compile_stage(gl, ShaderStage::Vertex, vertex_src)?;
        stages.push(vertex);

        let geometry = match geometry_src {
            Some(src) => {
                let geometry = self.compile_stage(gl, ShaderStage::Geometry, src)?;
                stages.push(geometry);
                Some(geometry)
            }
            None => None,
        };

        let fragment = self.compile_stage(gl, ShaderStage::Fragment, fragment_src)?;
        stages.push(fragment);

        Ok((vertex, geometry, fragment))
    }

    fn compile_stage(
        &self,
        gl: &A,
        stage: ShaderStage,
        source: &str,
    ) -> Result<A::Shader, GlError> {
        let source = inject_definitions(source, &self.definitions);
        gl.compile_stage(stage, &source).map_err(|log| {
            error!(
                "Error while compiling {} shader \"{}\":\n{}",
                stage, self.name, log
            );
            if self.options.log_source_on_error {
                error!("Source of {} shader \"{}\":\n{}", stage, self.name, source);
            }
            GlError::Compile {
                name: self.name.clone(),
                stage,
                log,
            }
        })
    }

    /// Select this shader and its vertex array for subsequent draw calls
    pub fn bind(&self, gl: &A) {
        gl.activate_program(self.program);
        gl.activate_vertex_array(self.vertex_array);
    }

    /// Release all GPU objects
    ///
    /// Owned buffers are deleted; buffers shared from other shaders are only
    /// unregistered. Safe to call repeatedly or on a never-initialized shader.
    pub fn free(&mut self, gl: &A) {
        let total = self.buffers.len();
        let owned = self.buffers.drain_owned();
        if total > 0 {
            debug!(
                "{}: freeing {} buffers ({} shared)",
                self.name,
                owned.len(),
                total - owned.len()
            );
        }
        for handle in owned {
            gl.discard_buffer(handle);
        }

        if let Some(vao) = self.vertex_array.take() {
            gl.discard_vertex_array(vao);
        }
        if let Some(program) = self.program.take() {
            gl.discard_program(program);
        }
        for shader in [
            self.vertex.take(),
            self.geometry.take(),
            self.fragment.take(),
        ]
        .into_iter()
        .flatten()
        {
            gl.discard_stage(shader);
        }
    }

    /// Location of a named attribute
    pub fn attrib(&self, gl: &A, name: &str, warn: bool) -> Option<u32> {
        let location = self
            .program
            .and_then(|program| gl.attrib_location(program, name));
        if location.is_none() && warn {
            warn!("{}: did not find attrib {}", self.name, name);
        }
        location
    }

    /// Location of a named uniform
    pub fn uniform(&self, gl: &A, name: &str, warn: bool) -> Option<A::UniformLocation> {
        let location = self
            .program
            .and_then(|program| gl.uniform_location(program, name));
        if location.is_none() && warn {
            warn!("{}: did not find uniform {}", self.name, name);
        }
        location
    }

    /// Set a uniform of this (bound) shader
    pub fn set_uniform(&self, gl: &A, name: &str, value: impl Into<UniformValue>, warn: bool) {
        if let Some(location) = self.uniform(gl, name, warn) {
            gl.write_uniform(&location, &value.into());
        }
    }

    /// Upload column-major attribute data with `dim` components per element
    ///
    /// The transfer is skipped when `version` is not [`VERSION_UNSET`] and
    /// equals the version stored by the previous upload of `name`. `data`
    /// must hold whole elements (`data.len()` a multiple of `dim`).
    pub fn upload_attrib<T: Scalar>(
        &mut self,
        gl: &A,
        name: &str,
        dim: usize,
        data: &[T],
        version: i32,
    ) -> Result<(), GlError> {
        let layout = AttribLayout::new(data.len(), dim, T::KIND);
        self.upload_attrib_raw(gl, name, layout, bytemuck::cast_slice(data), version)
    }

    /// Untyped form of [`upload_attrib`](Self::upload_attrib)
    ///
    /// Leaves this shader's vertex array current.
    pub fn upload_attrib_raw(
        &mut self,
        gl: &A,
        name: &str,
        layout: AttribLayout,
        bytes: &[u8],
        version: i32,
    ) -> Result<(), GlError> {
        if bytes.len() != layout.byte_size() {
            return Err(GlError::LayoutMismatch {
                shader: self.name.clone(),
                name: name.to_string(),
                expected: layout.byte_size(),
                actual: bytes.len(),
            });
        }
        if !layout.is_whole() {
            return Err(GlError::RaggedData {
                shader: self.name.clone(),
                name: name.to_string(),
                len: layout.len,
                dim: layout.dim,
            });
        }

        if let Some(shared) = self.buffers.get(name) {
            let (handle, relayout) = {
                let mut buffer = shared.borrow_mut();
                if version != VERSION_UNSET && buffer.version == version {
                    trace!("{}: {} unchanged (version {})", self.name, name, version);
                    return Ok(());
                }

                let reallocate = buffer.byte_size() != layout.byte_size();
                gl.write_buffer(buffer.handle, bytes, self.options.usage, reallocate);
                trace!(
                    "{}: {} <- {} bytes (version {})",
                    self.name,
                    name,
                    bytes.len(),
                    version
                );

                let relayout = buffer.dim != layout.dim || buffer.kind != layout.kind;
                let empty_changed = (buffer.len == 0) != (layout.len == 0);
                buffer.len = layout.len;
                buffer.dim = layout.dim;
                buffer.kind = layout.kind;
                buffer.version = version;
                (buffer.handle, relayout || empty_changed)
            };

            if relayout {
                self.bind_attrib(gl, name, handle, layout);
            }
            return Ok(());
        }

        let handle = gl.new_buffer().map_err(|reason| GlError::Create {
            what: "buffer",
            reason,
        })?;
        gl.write_buffer(handle, bytes, self.options.usage, true);
        trace!(
            "{}: {} <- {} bytes (new, version {})",
            self.name,
            name,
            bytes.len(),
            version
        );

        self.buffers
            .insert_owned(name, Buffer::new(handle, layout, version));
        self.bind_attrib(gl, name, handle, layout);
        Ok(())
    }

    /// Wire a buffer into this shader's vertex array
    fn bind_attrib(&self, gl: &A, name: &str, handle: A::Buffer, layout: AttribLayout) {
        let Some(vao) = self.vertex_array else {
            return;
        };
        gl.activate_vertex_array(Some(vao));

        if name == INDICES {
            gl.attach_indices(handle);
            return;
        }

        let Some(location) = self.attrib(gl, name, self.options.warn_missing) else {
            return;
        };
        if layout.len == 0 {
            gl.disable_attrib(location);
        } else {
            gl.point_attrib(
                location,
                handle,
                layout.dim,
                layout.kind,
                layout.kind.is_integral(),
            );
        }
    }

    /// Read an attribute buffer back from the GPU
    pub fn download_attrib<T: Scalar>(&self, gl: &A, name: &str) -> Result<VertexData<T>, GlError> {
        let shared = self.lookup(name)?;
        let buffer = shared.borrow();
        if buffer.kind != T::KIND {
            return Err(GlError::TypeMismatch {
                shader: self.name.clone(),
                name: name.to_string(),
                stored: buffer.kind,
                requested: T::KIND,
            });
        }

        let mut data = vec![<T as bytemuck::Zeroable>::zeroed(); buffer.len];
        gl.fetch_buffer(buffer.handle, bytemuck::cast_slice_mut(data.as_mut_slice()));
        Ok(VertexData::new(buffer.dim, data))
    }

    /// Upload an index buffer for `draw_indexed`
    ///
    /// `dim` is the number of indices per primitive (3 for triangles).
    pub fn upload_indices<T: Scalar>(
        &mut self,
        gl: &A,
        dim: usize,
        data: &[T],
    ) -> Result<(), GlError> {
        if !T::KIND.is_index() {
            return Err(GlError::InvalidIndexType(T::KIND));
        }
        self.upload_attrib(gl, INDICES, dim, data, VERSION_UNSET)
    }

    /// Force every buffer to be re-uploaded on its next upload call
    pub fn invalidate_attribs(&mut self) {
        self.buffers.invalidate_all();
    }

    /// Delete one attribute buffer (a shared one is only unregistered)
    pub fn free_attrib(&mut self, gl: &A, name: &str) {
        if let Some(Removed::Owned(handle)) = self.buffers.remove(name) {
            gl.discard_buffer(handle);
        }
    }

    pub fn has_attrib(&self, name: &str) -> bool {
        self.buffers.contains(name)
    }

    /// Version of the last upload, or [`VERSION_UNSET`] if absent
    pub fn attrib_version(&self, name: &str) -> i32 {
        self.buffers
            .get(name)
            .map_or(VERSION_UNSET, |buffer| buffer.borrow().version)
    }

    pub fn reset_attrib_version(&mut self, name: &str) {
        if let Some(buffer) = self.buffers.get(name) {
            buffer.borrow_mut().version = VERSION_UNSET;
        }
    }

    /// Layout of the last upload of `name`
    pub fn attrib_layout(&self, name: &str) -> Option<AttribLayout> {
        self.buffers.get(name).map(|buffer| buffer.borrow().layout())
    }

    /// Use another shader's buffer under `as_name` (or `name`) without copying
    ///
    /// Leaves this shader's vertex array current.
    ///
    /// The alias is valid only while `other` keeps the attribute; after it is
    /// freed there the alias reads as absent, but this vertex array still
    /// points at the deleted buffer until the attribute is uploaded or shared
    /// again.
    pub fn share_attrib(
        &mut self,
        gl: &A,
        other: &GlShader<A>,
        name: &str,
        as_name: Option<&str>,
    ) -> Result<(), GlError> {
        let as_name = as_name.filter(|s| !s.is_empty()).unwrap_or(name);
        let source = other.buffers.get(name).ok_or_else(|| GlError::BufferNotFound {
            shader: other.name.clone(),
            name: name.to_string(),
        })?;

        let (handle, layout) = {
            let buffer = source.borrow();
            (buffer.handle, buffer.layout())
        };

        if let Some(Removed::Owned(previous)) = self.buffers.insert_alias(as_name, &source) {
            gl.discard_buffer(previous);
        }
        if name == INDICES && as_name != INDICES {
            warn!(
                "{}: index buffer of {} shared as {}, draw_indexed will not see it",
                self.name, other.name, as_name
            );
        }
        self.bind_attrib(gl, as_name, handle, layout);
        debug!("{}: sharing {}.{} as {}", self.name, other.name, name, as_name);
        Ok(())
    }

    /// Draw `count` primitives starting at `offset` from the vertex arrays
    ///
    /// Makes this shader's vertex array current, since uploads to other
    /// shaders switch it.
    pub fn draw_array(&self, gl: &A, primitive: Primitive, offset: usize, count: usize) {
        if count == 0 {
            return;
        }
        gl.activate_vertex_array(self.vertex_array);
        gl.draw_range(primitive, offset, count);
    }

    /// Draw `count` primitives starting at primitive `offset` of the index buffer
    pub fn draw_indexed(
        &self,
        gl: &A,
        primitive: Primitive,
        offset: usize,
        count: usize,
    ) -> Result<(), GlError> {
        if count == 0 {
            return Ok(());
        }
        let indices = self.lookup(INDICES)?;
        let kind = indices.borrow().kind;

        let per_primitive = primitive.indices_per_primitive();
        gl.activate_vertex_array(self.vertex_array);
        gl.draw_indexed_range(
            primitive,
            count * per_primitive,
            kind,
            offset * per_primitive * kind.size(),
        );
        Ok(())
    }

    /// Bytes of all registered buffers, shared ones included
    pub fn buffer_size(&self) -> usize {
        self.buffers.live_bytes()
    }

    fn lookup(&self, name: &str) -> Result<SharedBuffer<A::Buffer>, GlError> {
        self.buffers.get(name).ok_or_else(|| GlError::BufferNotFound {
            shader: self.name.clone(),
            name: name.to_string(),
        })
    }
}

/// Insert `#define KEY VALUE` lines after a leading `#version` line
///
/// Without a `#version` line the definitions are prepended.
pub fn inject_definitions(source: &str, definitions: &BTreeMap<String, String>) -> String {
    if definitions.is_empty() {
        return source.to_string();
    }

    let defines: String = definitions
        .iter()
        .map(|(key, value)| format!("#define {} {}\n", key, value))
        .collect();

    if source.starts_with("#version") {
        let (version_line, rest) = match source.find('\n') {
            Some(pos) => source.split_at(pos + 1),
            None => (source, ""),
        };
        let mut out = String::with_capacity(source.len() + defines.len() + 1);
        out.push_str(version_line);
        if !version_line.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&defines);
        out.push_str(rest);
        out
    } else {
        defines + source
    }
}

fn read_source(path: &Path) -> Result<String, GlError> {
    std::fs::read_to_string(path).map_err(|source| GlError::Io {
        path: path.to_path_buf(),
        source,
    })
}
