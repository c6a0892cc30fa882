//! Host-memory rendering context
//!
//! [`HeadlessGl`] implements [`GlApi`] without a GPU: buffers and render
//! targets live in `Vec<u8>`s, draw calls are recorded, and every data
//! transfer is counted. Useful for tests and for tooling that exercises
//! shader/buffer logic without a display.
//!
//! "Compilation" is a light scan of the GLSL text: a stage needs a
//! `void main` and balanced braces, `in`/`attribute` declarations of the
//! vertex stage become attribute locations, and `uniform` declarations of
//! any stage become uniform locations.

use std::cell::RefCell;
use std::collections::HashMap;

use log::trace;

use super::api::{BufferUsage, GlApi, Primitive, RenderbufferFormat, ShaderStage};
use super::scalar::ScalarKind;
use super::uniform::UniformValue;

/// Uniform location inside a headless program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeadlessUniform {
    pub program: u32,
    pub index: u32,
}

/// Recorded draw call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawCall {
    pub program: Option<u32>,
    pub vertex_array: Option<u32>,
    pub primitive: Primitive,
    /// First vertex (arrays) or byte offset into the index buffer (indexed)
    pub offset: usize,
    pub count: usize,
    /// Index type for indexed draws
    pub index_kind: Option<ScalarKind>,
}

/// Attribute binding recorded in a vertex array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttribPointer {
    pub buffer: u32,
    pub dim: usize,
    pub kind: ScalarKind,
    pub normalized: bool,
    pub enabled: bool,
}

/// Number of live objects per kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiveObjects {
    pub shaders: usize,
    pub programs: usize,
    pub vertex_arrays: usize,
    pub buffers: usize,
    pub renderbuffers: usize,
    pub framebuffers: usize,
}

impl LiveObjects {
    pub fn total(&self) -> usize {
        self.shaders
            + self.programs
            + self.vertex_arrays
            + self.buffers
            + self.renderbuffers
            + self.framebuffers
    }
}

struct Stage {
    kind: ShaderStage,
    source: String,
    attribs: Vec<(Option<u32>, String)>,
    uniforms: Vec<String>,
}

struct Program {
    attribs: Vec<String>,
    uniforms: Vec<String>,
}

#[derive(Default)]
struct VertexArray {
    attribs: HashMap<u32, AttribPointer>,
    indices: Option<u32>,
}

struct Renderbuffer {
    width: u32,
    height: u32,
    samples: u32,
}

struct Target {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Target {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; (width * height * 4) as usize],
        }
    }
}

#[derive(Default)]
struct State {
    next_id: u32,
    stages: HashMap<u32, Stage>,
    programs: HashMap<u32, Program>,
    vertex_arrays: HashMap<u32, VertexArray>,
    buffers: HashMap<u32, Vec<u8>>,
    renderbuffers: HashMap<u32, Renderbuffer>,
    framebuffers: HashMap<u32, Target>,
    screen: Option<Target>,
    active_program: Option<u32>,
    active_vertex_array: Option<u32>,
    active_framebuffer: Option<u32>,
    multisample: bool,
    uniforms: HashMap<HeadlessUniform, UniformValue>,
    draws: Vec<DrawCall>,
    transfers: usize,
    bytes_transferred: usize,
    allocations: usize,
    downloads: usize,
}

impl State {
    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn target_mut(&mut self, framebuffer: Option<u32>) -> Option<&mut Target> {
        match framebuffer {
            Some(id) => self.framebuffers.get_mut(&id),
            None => self.screen.as_mut(),
        }
    }

    fn target(&self, framebuffer: Option<u32>) -> Option<&Target> {
        match framebuffer {
            Some(id) => self.framebuffers.get(&id),
            None => self.screen.as_ref(),
        }
    }
}

/// Rendering context backed by host memory
#[derive(Default)]
pub struct HeadlessGl {
    state: RefCell<State>,
}

impl HeadlessGl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context with a default framebuffer ("screen") of the given size
    pub fn with_surface(width: u32, height: u32) -> Self {
        let gl = Self::default();
        gl.state.borrow_mut().screen = Some(Target::new(width, height));
        gl
    }

    /// Number of buffer data transfers (host to GPU) issued so far
    pub fn transfer_count(&self) -> usize {
        self.state.borrow().transfers
    }

    /// Total bytes moved by those transfers
    pub fn bytes_transferred(&self) -> usize {
        self.state.borrow().bytes_transferred
    }

    /// Number of buffer objects created so far
    pub fn allocation_count(&self) -> usize {
        self.state.borrow().allocations
    }

    /// Number of buffer readbacks (GPU to host) issued so far
    pub fn download_count(&self) -> usize {
        self.state.borrow().downloads
    }

    /// Reset transfer, allocation and draw counters
    pub fn reset_stats(&self) {
        let mut state = self.state.borrow_mut();
        state.transfers = 0;
        state.bytes_transferred = 0;
        state.allocations = 0;
        state.downloads = 0;
        state.draws.clear();
    }

    pub fn live_objects(&self) -> LiveObjects {
        let state = self.state.borrow();
        LiveObjects {
            shaders: state.stages.len(),
            programs: state.programs.len(),
            vertex_arrays: state.vertex_arrays.len(),
            buffers: state.buffers.len(),
            renderbuffers: state.renderbuffers.len(),
            framebuffers: state.framebuffers.len(),
        }
    }

    /// Current contents of a buffer object
    pub fn buffer_contents(&self, buffer: u32) -> Option<Vec<u8>> {
        self.state.borrow().buffers.get(&buffer).cloned()
    }

    /// Preprocessed sources of all live stages, oldest first
    pub fn stage_sources(&self) -> Vec<String> {
        let state = self.state.borrow();
        let mut stages: Vec<_> = state.stages.iter().collect();
        stages.sort_by_key(|(id, _)| **id);
        stages.into_iter().map(|(_, s)| s.source.clone()).collect()
    }

    /// Attribute binding of a vertex array
    pub fn attrib_pointer(&self, vertex_array: u32, location: u32) -> Option<AttribPointer> {
        self.state
            .borrow()
            .vertex_arrays
            .get(&vertex_array)
            .and_then(|vao| vao.attribs.get(&location).copied())
    }

    /// Element buffer bound to a vertex array
    pub fn index_buffer(&self, vertex_array: u32) -> Option<u32> {
        self.state
            .borrow()
            .vertex_arrays
            .get(&vertex_array)
            .and_then(|vao| vao.indices)
    }

    /// Last value written to a uniform, looked up by name
    pub fn uniform_value(&self, program: u32, name: &str) -> Option<UniformValue> {
        let state = self.state.borrow();
        let index = state
            .programs
            .get(&program)?
            .uniforms
            .iter()
            .position(|u| u == name)?;
        state
            .uniforms
            .get(&HeadlessUniform {
                program,
                index: index as u32,
            })
            .copied()
    }

    pub fn draw_calls(&self) -> Vec<DrawCall> {
        self.state.borrow().draws.clone()
    }

    pub fn active_program(&self) -> Option<u32> {
        self.state.borrow().active_program
    }

    pub fn active_vertex_array(&self) -> Option<u32> {
        self.state.borrow().active_vertex_array
    }

    pub fn active_framebuffer(&self) -> Option<u32> {
        self.state.borrow().active_framebuffer
    }

    pub fn multisample_enabled(&self) -> bool {
        self.state.borrow().multisample
    }

    /// Default framebuffer pixels (RGBA8, bottom row first)
    pub fn screen_pixels(&self) -> Option<Vec<u8>> {
        self.state.borrow().screen.as_ref().map(|t| t.pixels.clone())
    }
}

impl GlApi for HeadlessGl {
    type Shader = u32;
    type Program = u32;
    type Buffer = u32;
    type VertexArray = u32;
    type Renderbuffer = u32;
    type Framebuffer = u32;
    type UniformLocation = HeadlessUniform;

    fn compile_stage(&self, stage: ShaderStage, source: &str) -> Result<u32, String> {
        let scanned = scan_source(stage, source)?;
        let mut state = self.state.borrow_mut();
        let id = state.next_id();
        state.stages.insert(id, scanned);
        Ok(id)
    }

    fn discard_stage(&self, shader: u32) {
        self.state.borrow_mut().stages.remove(&shader);
    }

    fn link_stages(&self, stages: &[u32]) -> Result<u32, String> {
        let mut state = self.state.borrow_mut();

        let mut vertex = None;
        let mut fragment = false;
        let mut uniforms: Vec<String> = Vec::new();
        for id in stages {
            let stage = state
                .stages
                .get(id)
                .ok_or_else(|| format!("error: shader object {} does not exist", id))?;
            match stage.kind {
                ShaderStage::Vertex => vertex = Some(stage),
                ShaderStage::Fragment => fragment = true,
                ShaderStage::Geometry => {}
            }
            for name in &stage.uniforms {
                if !uniforms.contains(name) {
                    uniforms.push(name.clone());
                }
            }
        }

        let vertex = vertex.ok_or("error: program lacks a vertex shader")?;
        if !fragment {
            return Err("error: program lacks a fragment shader".to_string());
        }

        // Explicit layout locations first, the rest fill the gaps in order
        let mut attribs: Vec<String> = Vec::new();
        for (location, name) in &vertex.attribs {
            if let Some(location) = location {
                let location = *location as usize;
                if attribs.len() <= location {
                    attribs.resize(location + 1, String::new());
                }
                attribs[location] = name.clone();
            }
        }
        for (location, name) in &vertex.attribs {
            if location.is_none() {
                match attribs.iter().position(|a| a.is_empty()) {
                    Some(slot) => attribs[slot] = name.clone(),
                    None => attribs.push(name.clone()),
                }
            }
        }

        let id = state.next_id();
        state.programs.insert(id, Program { attribs, uniforms });
        Ok(id)
    }

    fn discard_program(&self, program: u32) {
        let mut state = self.state.borrow_mut();
        state.programs.remove(&program);
        state.uniforms.retain(|loc, _| loc.program != program);
        if state.active_program == Some(program) {
            state.active_program = None;
        }
    }

    fn activate_program(&self, program: Option<u32>) {
        self.state.borrow_mut().active_program = program;
    }

    fn attrib_location(&self, program: u32, name: &str) -> Option<u32> {
        let state = self.state.borrow();
        let program = state.programs.get(&program)?;
        program
            .attribs
            .iter()
            .position(|a| !a.is_empty() && a == name)
            .map(|i| i as u32)
    }

    fn uniform_location(&self, program: u32, name: &str) -> Option<HeadlessUniform> {
        let state = self.state.borrow();
        let index = state
            .programs
            .get(&program)?
            .uniforms
            .iter()
            .position(|u| u == name)?;
        Some(HeadlessUniform {
            program,
            index: index as u32,
        })
    }

    fn write_uniform(&self, location: &HeadlessUniform, value: &UniformValue) {
        let mut state = self.state.borrow_mut();
        // Like glUniform*, this only affects the active program
        if state.active_program == Some(location.program) {
            state.uniforms.insert(*location, *value);
        }
    }

    fn new_vertex_array(&self) -> Result<u32, String> {
        let mut state = self.state.borrow_mut();
        let id = state.next_id();
        state.vertex_arrays.insert(id, VertexArray::default());
        Ok(id)
    }

    fn discard_vertex_array(&self, vertex_array: u32) {
        let mut state = self.state.borrow_mut();
        state.vertex_arrays.remove(&vertex_array);
        if state.active_vertex_array == Some(vertex_array) {
            state.active_vertex_array = None;
        }
    }

    fn activate_vertex_array(&self, vertex_array: Option<u32>) {
        self.state.borrow_mut().active_vertex_array = vertex_array;
    }

    fn new_buffer(&self) -> Result<u32, String> {
        let mut state = self.state.borrow_mut();
        let id = state.next_id();
        state.buffers.insert(id, Vec::new());
        state.allocations += 1;
        Ok(id)
    }

    fn discard_buffer(&self, buffer: u32) {
        self.state.borrow_mut().buffers.remove(&buffer);
    }

    fn write_buffer(&self, buffer: u32, data: &[u8], _usage: BufferUsage, reallocate: bool) {
        let mut state = self.state.borrow_mut();
        let Some(store) = state.buffers.get_mut(&buffer) else {
            return;
        };
        if reallocate {
            store.clear();
            store.extend_from_slice(data);
        } else {
            let n = data.len().min(store.len());
            store[..n].copy_from_slice(&data[..n]);
        }
        state.transfers += 1;
        state.bytes_transferred += data.len();
        trace!("headless: buffer {} <- {} bytes", buffer, data.len());
    }

    fn fetch_buffer(&self, buffer: u32, out: &mut [u8]) {
        let mut state = self.state.borrow_mut();
        if let Some(store) = state.buffers.get(&buffer) {
            let n = out.len().min(store.len());
            out[..n].copy_from_slice(&store[..n]);
        }
        state.downloads += 1;
    }

    fn point_attrib(
        &self,
        location: u32,
        buffer: u32,
        dim: usize,
        kind: ScalarKind,
        normalized: bool,
    ) {
        let mut state = self.state.borrow_mut();
        let Some(active) = state.active_vertex_array else {
            return;
        };
        if let Some(vao) = state.vertex_arrays.get_mut(&active) {
            vao.attribs.insert(
                location,
                AttribPointer {
                    buffer,
                    dim,
                    kind,
                    normalized,
                    enabled: true,
                },
            );
        }
    }

    fn disable_attrib(&self, location: u32) {
        let mut state = self.state.borrow_mut();
        let Some(active) = state.active_vertex_array else {
            return;
        };
        if let Some(pointer) = state
            .vertex_arrays
            .get_mut(&active)
            .and_then(|vao| vao.attribs.get_mut(&location))
        {
            pointer.enabled = false;
        }
    }

    fn attach_indices(&self, buffer: u32) {
        let mut state = self.state.borrow_mut();
        let Some(active) = state.active_vertex_array else {
            return;
        };
        if let Some(vao) = state.vertex_arrays.get_mut(&active) {
            vao.indices = Some(buffer);
        }
    }

    fn draw_range(&self, primitive: Primitive, first: usize, count: usize) {
        let mut state = self.state.borrow_mut();
        let call = DrawCall {
            program: state.active_program,
            vertex_array: state.active_vertex_array,
            primitive,
            offset: first,
            count,
            index_kind: None,
        };
        state.draws.push(call);
    }

    fn draw_indexed_range(
        &self,
        primitive: Primitive,
        count: usize,
        index_kind: ScalarKind,
        byte_offset: usize,
    ) {
        let mut state = self.state.borrow_mut();
        let call = DrawCall {
            program: state.active_program,
            vertex_array: state.active_vertex_array,
            primitive,
            offset: byte_offset,
            count,
            index_kind: Some(index_kind),
        };
        state.draws.push(call);
    }

    fn new_renderbuffer(
        &self,
        _format: RenderbufferFormat,
        width: u32,
        height: u32,
        samples: u32,
    ) -> Result<u32, String> {
        let mut state = self.state.borrow_mut();
        let id = state.next_id();
        state.renderbuffers.insert(
            id,
            Renderbuffer {
                width,
                height,
                samples,
            },
        );
        Ok(id)
    }

    fn discard_renderbuffer(&self, renderbuffer: u32) {
        self.state.borrow_mut().renderbuffers.remove(&renderbuffer);
    }

    fn new_framebuffer(&self, color: u32, depth_stencil: u32) -> Result<u32, String> {
        let mut state = self.state.borrow_mut();
        let (Some(c), Some(d)) = (
            state.renderbuffers.get(&color),
            state.renderbuffers.get(&depth_stencil),
        ) else {
            return Err("status=0x8cd6 (incomplete attachment)".to_string());
        };
        if c.width == 0 || c.height == 0 {
            return Err("status=0x8cd6 (incomplete attachment)".to_string());
        }
        if (c.width, c.height, c.samples) != (d.width, d.height, d.samples) {
            return Err("status=0x8d56 (incomplete multisample)".to_string());
        }
        let target = Target::new(c.width, c.height);
        let id = state.next_id();
        state.framebuffers.insert(id, target);
        Ok(id)
    }

    fn discard_framebuffer(&self, framebuffer: u32) {
        let mut state = self.state.borrow_mut();
        state.framebuffers.remove(&framebuffer);
        if state.active_framebuffer == Some(framebuffer) {
            state.active_framebuffer = None;
        }
    }

    fn activate_framebuffer(&self, framebuffer: Option<u32>) {
        self.state.borrow_mut().active_framebuffer = framebuffer;
    }

    fn toggle_multisample(&self, enabled: bool) {
        self.state.borrow_mut().multisample = enabled;
    }

    fn blit_region(
        &self,
        src: Option<u32>,
        dst: Option<u32>,
        width: u32,
        height: u32,
    ) {
        let mut state = self.state.borrow_mut();
        let Some(source) = state.target(src) else {
            return;
        };
        let (src_w, src_h, pixels) = (source.width, source.height, source.pixels.clone());
        let Some(dest) = state.target_mut(dst) else {
            return;
        };

        let w = width.min(src_w).min(dest.width) as usize;
        let h = height.min(src_h).min(dest.height) as usize;
        for y in 0..h {
            let s = y * src_w as usize * 4;
            let d = y * dest.width as usize * 4;
            dest.pixels[d..d + w * 4].copy_from_slice(&pixels[s..s + w * 4]);
        }
        state.active_framebuffer = None;
    }

    fn clear_target(&self, color: [f32; 4]) {
        let mut state = self.state.borrow_mut();
        let active = state.active_framebuffer;
        let Some(target) = state.target_mut(active) else {
            return;
        };
        let rgba = color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
        for pixel in target.pixels.chunks_exact_mut(4) {
            pixel.copy_from_slice(&rgba);
        }
    }

    fn fetch_pixels(&self, src: Option<u32>, width: u32, height: u32) -> Vec<u8> {
        let state = self.state.borrow();
        let mut out = vec![0u8; (width * height * 4) as usize];
        if let Some(target) = state.target(src) {
            let w = width.min(target.width) as usize;
            let h = height.min(target.height) as usize;
            for y in 0..h {
                let s = y * target.width as usize * 4;
                let d = y * width as usize * 4;
                out[d..d + w * 4].copy_from_slice(&target.pixels[s..s + w * 4]);
            }
        }
        out
    }
}

/// Scan a GLSL stage for declarations, rejecting obviously broken source
fn scan_source(kind: ShaderStage, source: &str) -> Result<Stage, String> {
    if !source.contains("void main") {
        return Err(format!("0:1(1): error: {} shader lacks `void main'", kind));
    }

    let mut depth: i32 = 0;
    for (line_no, line) in source.lines().enumerate() {
        for ch in strip_comment(line).chars() {
            match ch {
                '{' => depth += 1,
                '}' => depth -= 1,
                _ => {}
            }
            if depth < 0 {
                return Err(format!("{}:1: error: unexpected '}}'", line_no + 1));
            }
        }
    }
    if depth != 0 {
        return Err("0:1(1): error: syntax error, unexpected end of file".to_string());
    }

    let mut attribs = Vec::new();
    let mut uniforms = Vec::new();
    for line in source.lines() {
        let line = strip_comment(line).trim();
        if line.starts_with('#') || !line.ends_with(';') {
            continue;
        }

        let (location, decl) = split_layout(line);
        let mut tokens = decl.trim_end_matches(';').split_whitespace();
        let Some(qualifier) = tokens.next() else {
            continue;
        };
        let Some(name) = tokens.last() else {
            continue;
        };
        let name = name.split('[').next().unwrap_or(name).to_string();

        match qualifier {
            "in" | "attribute" if kind == ShaderStage::Vertex => attribs.push((location, name)),
            "uniform" => uniforms.push(name),
            _ => {}
        }
    }

    Ok(Stage {
        kind,
        source: source.to_string(),
        attribs,
        uniforms,
    })
}

fn strip_comment(line: &str) -> &str {
    match line.find("//") {
        Some(pos) => &line[..pos],
        None => line,
    }
}

/// Split `layout(location = N) rest` into `(Some(N), rest)`
fn split_layout(line: &str) -> (Option<u32>, &str) {
    let Some(rest) = line.strip_prefix("layout") else {
        return (None, line);
    };
    let Some(close) = rest.find(')') else {
        return (None, line);
    };
    let qualifiers = rest[..close].trim_start().trim_start_matches('(');
    let location = qualifiers.split(',').find_map(|q| {
        let (key, value) = q.split_once('=')?;
        if key.trim() == "location" {
            value.trim().parse().ok()
        } else {
            None
        }
    });
    (location, rest[close + 1..].trim_start())
}
