//! [`GlApi`] on top of a live `glow` context
//!
//! All calls require the context to be current on the calling thread.

use glow::HasContext;

use super::api::{BufferUsage, GlApi, Primitive, RenderbufferFormat, ShaderStage};
use super::scalar::ScalarKind;
use super::uniform::UniformValue;

impl GlApi for glow::Context {
    type Shader = glow::Shader;
    type Program = glow::Program;
    type Buffer = glow::Buffer;
    type VertexArray = glow::VertexArray;
    type Renderbuffer = glow::Renderbuffer;
    type Framebuffer = glow::Framebuffer;
    type UniformLocation = glow::UniformLocation;

    fn compile_stage(&self, stage: ShaderStage, source: &str) -> Result<Self::Shader, String> {
        unsafe {
            let shader = self.create_shader(stage.gl_enum())?;
            self.shader_source(shader, source);
            self.compile_shader(shader);

            if !self.get_shader_compile_status(shader) {
                let log = self.get_shader_info_log(shader);
                self.delete_shader(shader);
                return Err(log);
            }

            Ok(shader)
        }
    }

    fn discard_stage(&self, shader: Self::Shader) {
        unsafe {
            self.delete_shader(shader);
        }
    }

    fn link_stages(&self, stages: &[Self::Shader]) -> Result<Self::Program, String> {
        unsafe {
            let program = self.create_program()?;
            for &stage in stages {
                self.attach_shader(program, stage);
            }
            self.link_program(program);

            if !self.get_program_link_status(program) {
                let log = self.get_program_info_log(program);
                self.delete_program(program);
                return Err(log);
            }

            Ok(program)
        }
    }

    fn discard_program(&self, program: Self::Program) {
        unsafe {
            self.delete_program(program);
        }
    }

    fn activate_program(&self, program: Option<Self::Program>) {
        unsafe {
            self.use_program(program);
        }
    }

    fn attrib_location(&self, program: Self::Program, name: &str) -> Option<u32> {
        unsafe { self.get_attrib_location(program, name) }
    }

    fn uniform_location(
        &self,
        program: Self::Program,
        name: &str,
    ) -> Option<Self::UniformLocation> {
        unsafe { self.get_uniform_location(program, name) }
    }

    fn write_uniform(&self, location: &Self::UniformLocation, value: &UniformValue) {
        let location = Some(location);
        unsafe {
            match *value {
                UniformValue::Int(v) => self.uniform_1_i32(location, v),
                UniformValue::Float(v) => self.uniform_1_f32(location, v),
                UniformValue::Vec2([x, y]) => self.uniform_2_f32(location, x, y),
                UniformValue::Vec3([x, y, z]) => self.uniform_3_f32(location, x, y, z),
                UniformValue::Vec4([x, y, z, w]) => self.uniform_4_f32(location, x, y, z, w),
                UniformValue::Mat4(ref m) => self.uniform_matrix_4_f32_slice(location, false, m),
            }
        }
    }

    fn new_vertex_array(&self) -> Result<Self::VertexArray, String> {
        unsafe { self.create_vertex_array() }
    }

    fn discard_vertex_array(&self, vertex_array: Self::VertexArray) {
        unsafe {
            self.delete_vertex_array(vertex_array);
        }
    }

    fn activate_vertex_array(&self, vertex_array: Option<Self::VertexArray>) {
        unsafe {
            self.bind_vertex_array(vertex_array);
        }
    }

    fn new_buffer(&self) -> Result<Self::Buffer, String> {
        unsafe { self.create_buffer() }
    }

    fn discard_buffer(&self, buffer: Self::Buffer) {
        unsafe {
            self.delete_buffer(buffer);
        }
    }

    fn write_buffer(&self, buffer: Self::Buffer, data: &[u8], usage: BufferUsage, reallocate: bool) {
        // Data always goes through ARRAY_BUFFER: the element binding belongs
        // to whichever vertex array is active and must not be disturbed.
        unsafe {
            self.bind_buffer(glow::ARRAY_BUFFER, Some(buffer));
            if reallocate {
                self.buffer_data_u8_slice(glow::ARRAY_BUFFER, data, usage.gl_enum());
            } else {
                self.buffer_sub_data_u8_slice(glow::ARRAY_BUFFER, 0, data);
            }
            self.bind_buffer(glow::ARRAY_BUFFER, None);
        }
    }

    fn fetch_buffer(&self, buffer: Self::Buffer, out: &mut [u8]) {
        unsafe {
            self.bind_buffer(glow::ARRAY_BUFFER, Some(buffer));
            self.get_buffer_sub_data(glow::ARRAY_BUFFER, 0, out);
            self.bind_buffer(glow::ARRAY_BUFFER, None);
        }
    }

    fn point_attrib(
        &self,
        location: u32,
        buffer: Self::Buffer,
        dim: usize,
        kind: ScalarKind,
        normalized: bool,
    ) {
        unsafe {
            self.bind_buffer(glow::ARRAY_BUFFER, Some(buffer));
            self.enable_vertex_attrib_array(location);
            self.vertex_attrib_pointer_f32(location, dim as i32, kind.gl_type(), normalized, 0, 0);
            self.bind_buffer(glow::ARRAY_BUFFER, None);
        }
    }

    fn disable_attrib(&self, location: u32) {
        unsafe {
            self.disable_vertex_attrib_array(location);
        }
    }

    fn attach_indices(&self, buffer: Self::Buffer) {
        unsafe {
            self.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(buffer));
        }
    }

    fn draw_range(&self, primitive: Primitive, first: usize, count: usize) {
        unsafe {
            self.draw_arrays(primitive.gl_enum(), first as i32, count as i32);
        }
    }

    fn draw_indexed_range(
        &self,
        primitive: Primitive,
        count: usize,
        index_kind: ScalarKind,
        byte_offset: usize,
    ) {
        unsafe {
            self.draw_elements(
                primitive.gl_enum(),
                count as i32,
                index_kind.gl_type(),
                byte_offset as i32,
            );
        }
    }

    fn new_renderbuffer(
        &self,
        format: RenderbufferFormat,
        width: u32,
        height: u32,
        samples: u32,
    ) -> Result<Self::Renderbuffer, String> {
        unsafe {
            let renderbuffer = self.create_renderbuffer()?;
            self.bind_renderbuffer(glow::RENDERBUFFER, Some(renderbuffer));
            if samples <= 1 {
                self.renderbuffer_storage(
                    glow::RENDERBUFFER,
                    format.gl_enum(),
                    width as i32,
                    height as i32,
                );
            } else {
                self.renderbuffer_storage_multisample(
                    glow::RENDERBUFFER,
                    samples as i32,
                    format.gl_enum(),
                    width as i32,
                    height as i32,
                );
            }
            self.bind_renderbuffer(glow::RENDERBUFFER, None);
            Ok(renderbuffer)
        }
    }

    fn discard_renderbuffer(&self, renderbuffer: Self::Renderbuffer) {
        unsafe {
            self.delete_renderbuffer(renderbuffer);
        }
    }

    fn new_framebuffer(
        &self,
        color: Self::Renderbuffer,
        depth_stencil: Self::Renderbuffer,
    ) -> Result<Self::Framebuffer, String> {
        unsafe {
            let framebuffer = self.create_framebuffer()?;
            self.bind_framebuffer(glow::FRAMEBUFFER, Some(framebuffer));
            self.framebuffer_renderbuffer(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::RENDERBUFFER,
                Some(color),
            );
            self.framebuffer_renderbuffer(
                glow::FRAMEBUFFER,
                glow::DEPTH_STENCIL_ATTACHMENT,
                glow::RENDERBUFFER,
                Some(depth_stencil),
            );

            let status = self.check_framebuffer_status(glow::FRAMEBUFFER);
            self.bind_framebuffer(glow::FRAMEBUFFER, None);
            if status != glow::FRAMEBUFFER_COMPLETE {
                self.delete_framebuffer(framebuffer);
                return Err(format!("status=0x{:x}", status));
            }

            Ok(framebuffer)
        }
    }

    fn discard_framebuffer(&self, framebuffer: Self::Framebuffer) {
        unsafe {
            self.delete_framebuffer(framebuffer);
        }
    }

    fn activate_framebuffer(&self, framebuffer: Option<Self::Framebuffer>) {
        unsafe {
            self.bind_framebuffer(glow::FRAMEBUFFER, framebuffer);
        }
    }

    fn toggle_multisample(&self, enabled: bool) {
        unsafe {
            if enabled {
                self.enable(glow::MULTISAMPLE);
            } else {
                self.disable(glow::MULTISAMPLE);
            }
        }
    }

    fn blit_region(
        &self,
        src: Option<Self::Framebuffer>,
        dst: Option<Self::Framebuffer>,
        width: u32,
        height: u32,
    ) {
        let (w, h) = (width as i32, height as i32);
        // Color only: depth blits fail when the formats differ
        unsafe {
            self.bind_framebuffer(glow::READ_FRAMEBUFFER, src);
            self.bind_framebuffer(glow::DRAW_FRAMEBUFFER, dst);
            self.blit_framebuffer(
                0,
                0,
                w,
                h,
                0,
                0,
                w,
                h,
                glow::COLOR_BUFFER_BIT,
                glow::NEAREST,
            );
            self.bind_framebuffer(glow::FRAMEBUFFER, None);
        }
    }

    fn clear_target(&self, color: [f32; 4]) {
        let [r, g, b, a] = color;
        unsafe {
            self.clear_color(r, g, b, a);
            self.clear(glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT | glow::STENCIL_BUFFER_BIT);
        }
    }

    fn fetch_pixels(&self, src: Option<Self::Framebuffer>, width: u32, height: u32) -> Vec<u8> {
        let mut pixels = vec![0u8; (width * height * 4) as usize];
        unsafe {
            self.bind_framebuffer(glow::READ_FRAMEBUFFER, src);
            self.read_pixels(
                0,
                0,
                width as i32,
                height as i32,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelPackData::Slice(&mut pixels[..]),
            );
            self.bind_framebuffer(glow::READ_FRAMEBUFFER, None);
        }
        pixels
    }
}
