//! Framebuffer Object (FBO) for offscreen rendering
//!
//! Color and depth-stencil renderbuffers, optionally multisampled, with a
//! blit onto the default framebuffer.

use std::path::Path;

use log::{debug, info};

use super::api::{GlApi, RenderbufferFormat};
use crate::config::Config;
use crate::error::GlError;

/// Offscreen render target
pub struct Framebuffer<A: GlApi> {
    framebuffer: Option<A::Framebuffer>,
    color: Option<A::Renderbuffer>,
    depth: Option<A::Renderbuffer>,
    width: u32,
    height: u32,
    samples: u32,
}

impl<A: GlApi> Default for Framebuffer<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: GlApi> Framebuffer<A> {
    /// Create an uninitialized framebuffer
    pub fn new() -> Self {
        Self {
            framebuffer: None,
            color: None,
            depth: None,
            width: 0,
            height: 0,
            samples: 0,
        }
    }

    /// Allocate attachments of `size` pixels with `samples` MSAA samples
    ///
    /// `samples <= 1` creates single-sampled storage. A live framebuffer is
    /// freed first; on failure nothing stays allocated.
    pub fn init(&mut self, gl: &A, size: (u32, u32), samples: u32) -> Result<(), GlError> {
        if self.ready() {
            self.free(gl);
        }
        let (width, height) = size;

        let color = gl
            .new_renderbuffer(RenderbufferFormat::Rgba8, width, height, samples)
            .map_err(|reason| GlError::Create {
                what: "color renderbuffer",
                reason,
            })?;

        let depth = match gl.new_renderbuffer(
            RenderbufferFormat::Depth24Stencil8,
            width,
            height,
            samples,
        ) {
            Ok(depth) => depth,
            Err(reason) => {
                gl.discard_renderbuffer(color);
                return Err(GlError::Create {
                    what: "depth renderbuffer",
                    reason,
                });
            }
        };

        let framebuffer = match gl.new_framebuffer(color, depth) {
            Ok(framebuffer) => framebuffer,
            Err(status) => {
                gl.discard_renderbuffer(color);
                gl.discard_renderbuffer(depth);
                return Err(GlError::FramebufferIncomplete(status));
            }
        };

        self.framebuffer = Some(framebuffer);
        self.color = Some(color);
        self.depth = Some(depth);
        self.width = width;
        self.height = height;
        self.samples = samples;

        info!("FBO created: {}x{} ({} samples)", width, height, samples);
        Ok(())
    }

    /// `init` with the configured sample count
    pub fn init_from_config(
        &mut self,
        gl: &A,
        size: (u32, u32),
        config: &Config,
    ) -> Result<(), GlError> {
        self.init(gl, size, config.framebuffer_samples())
    }

    /// Bind FBO for rendering
    pub fn bind(&self, gl: &A) {
        gl.activate_framebuffer(self.framebuffer);
        if self.samples > 1 {
            gl.toggle_multisample(true);
        }
    }

    /// Unbind FBO (return to default framebuffer)
    pub fn release(&self, gl: &A) {
        if self.samples > 1 {
            gl.toggle_multisample(false);
        }
        gl.activate_framebuffer(None);
    }

    /// Clear the whole target
    pub fn clear(&self, gl: &A, color: [f32; 4]) {
        if !self.ready() {
            return;
        }
        gl.activate_framebuffer(self.framebuffer);
        gl.clear_target(color);
        gl.activate_framebuffer(None);
    }

    /// Copy color onto the default framebuffer at the same size
    ///
    /// Multisampled content is resolved by the copy.
    pub fn blit(&self, gl: &A) {
        if !self.ready() {
            return;
        }
        gl.blit_region(self.framebuffer, None, self.width, self.height);
    }

    /// Read the color attachment as RGBA8, top row first
    pub fn download_rgba(&self, gl: &A) -> Result<Vec<u8>, GlError> {
        if !self.ready() {
            return Ok(Vec::new());
        }

        let pixels = if self.samples > 1 {
            // Multisampled storage cannot be read directly
            let mut resolve = Framebuffer::new();
            resolve.init(gl, (self.width, self.height), 1)?;
            gl.blit_region(
                self.framebuffer,
                resolve.framebuffer,
                self.width,
                self.height,
            );
            let pixels = gl.fetch_pixels(resolve.framebuffer, self.width, self.height);
            resolve.free(gl);
            pixels
        } else {
            gl.fetch_pixels(self.framebuffer, self.width, self.height)
        };

        Ok(flip_rows(&pixels, self.width as usize * 4))
    }

    /// Save the color attachment as a PNG file
    pub fn save_png(&self, gl: &A, path: &Path) -> Result<(), GlError> {
        let pixels = self.download_rgba(gl)?;

        let file = std::fs::File::create(path).map_err(|source| GlError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut encoder = png::Encoder::new(std::io::BufWriter::new(file), self.width, self.height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&pixels)?;

        info!("FBO saved: {}", path.display());
        Ok(())
    }

    /// Release all attachments (safe to call repeatedly)
    pub fn free(&mut self, gl: &A) {
        if let Some(framebuffer) = self.framebuffer.take() {
            gl.discard_framebuffer(framebuffer);
            debug!("FBO freed: {}x{}", self.width, self.height);
        }
        if let Some(color) = self.color.take() {
            gl.discard_renderbuffer(color);
        }
        if let Some(depth) = self.depth.take() {
            gl.discard_renderbuffer(depth);
        }
    }

    /// True between a successful `init` and the next `free`
    pub fn ready(&self) -> bool {
        self.framebuffer.is_some()
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Flip vertically since OpenGL origin is bottom-left
fn flip_rows(pixels: &[u8], row_size: usize) -> Vec<u8> {
    if row_size == 0 {
        return Vec::new();
    }
    let mut flipped = Vec::with_capacity(pixels.len());
    for row in pixels.chunks_exact(row_size).rev() {
        flipped.extend_from_slice(row);
    }
    flipped
}
