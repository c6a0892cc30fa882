//! Framebuffer lifecycle against the headless context

use glkit::{Config, Framebuffer, GlError, HeadlessGl};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    rgba.repeat((width * height) as usize)
}

#[test]
fn test_ready_lifecycle() {
    init_logger();
    let gl = HeadlessGl::new();
    let mut fbo = Framebuffer::new();
    assert!(!fbo.ready());

    fbo.init(&gl, (16, 8), 1).unwrap();
    assert!(fbo.ready());
    assert_eq!(fbo.size(), (16, 8));
    assert_eq!(fbo.samples(), 1);
    let live = gl.live_objects();
    assert_eq!((live.renderbuffers, live.framebuffers), (2, 1));

    fbo.free(&gl);
    assert!(!fbo.ready());
    assert_eq!(gl.live_objects().total(), 0);
    fbo.free(&gl);
}

#[test]
fn test_reinit_replaces_attachments() {
    let gl = HeadlessGl::new();
    let mut fbo = Framebuffer::new();
    fbo.init(&gl, (4, 4), 1).unwrap();
    fbo.init(&gl, (8, 2), 4).unwrap();

    assert_eq!(fbo.size(), (8, 2));
    assert_eq!(fbo.samples(), 4);
    assert_eq!(gl.live_objects().total(), 3);
}

#[test]
fn test_samples_from_config() {
    let gl = HeadlessGl::new();
    let mut fbo = Framebuffer::new();

    let config = Config::from_toml_str("[framebuffer]\nsamples = 8\n").unwrap();
    fbo.init_from_config(&gl, (4, 4), &config).unwrap();
    assert_eq!(fbo.samples(), 8);

    let config = Config::from_toml_str("[framebuffer]\nsamples = 0\n").unwrap();
    fbo.init_from_config(&gl, (4, 4), &config).unwrap();
    assert_eq!(fbo.samples(), 1);
    assert!(fbo.ready());
    fbo.free(&gl);
    assert_eq!(gl.live_objects().total(), 0);
}

#[test]
fn test_zero_size_is_incomplete() {
    init_logger();
    let gl = HeadlessGl::new();
    let mut fbo = Framebuffer::new();

    let err = fbo.init(&gl, (0, 32), 1).unwrap_err();
    assert!(matches!(err, GlError::FramebufferIncomplete(_)));
    assert!(!fbo.ready());
    assert_eq!(gl.live_objects().total(), 0);
}

#[test]
fn test_clear_and_download() {
    let gl = HeadlessGl::new();
    let mut fbo = Framebuffer::new();
    fbo.init(&gl, (4, 2), 1).unwrap();

    fbo.clear(&gl, [1.0, 0.0, 0.0, 1.0]);
    assert_eq!(fbo.download_rgba(&gl).unwrap(), solid(4, 2, [255, 0, 0, 255]));
    assert_eq!(gl.active_framebuffer(), None);

    // Nothing to read before init
    assert!(Framebuffer::<HeadlessGl>::new()
        .download_rgba(&gl)
        .unwrap()
        .is_empty());
}

#[test]
fn test_multisample_resolve_does_not_leak() {
    let gl = HeadlessGl::new();
    let mut fbo = Framebuffer::new();
    fbo.init(&gl, (3, 3), 4).unwrap();
    fbo.clear(&gl, [0.0, 0.0, 1.0, 1.0]);

    let pixels = fbo.download_rgba(&gl).unwrap();
    assert_eq!(pixels, solid(3, 3, [0, 0, 255, 255]));
    assert_eq!(gl.live_objects().total(), 3);
}

#[test]
fn test_bind_and_release() {
    let gl = HeadlessGl::new();
    let mut fbo = Framebuffer::new();
    fbo.init(&gl, (2, 2), 4).unwrap();

    fbo.bind(&gl);
    assert!(gl.active_framebuffer().is_some());
    assert!(gl.multisample_enabled());

    fbo.release(&gl);
    assert_eq!(gl.active_framebuffer(), None);
    assert!(!gl.multisample_enabled());

    // Single-sampled targets leave the multisample state alone
    let mut plain = Framebuffer::new();
    plain.init(&gl, (2, 2), 1).unwrap();
    plain.bind(&gl);
    assert!(!gl.multisample_enabled());
    plain.release(&gl);
}

#[test]
fn test_blit_to_screen() {
    let gl = HeadlessGl::with_surface(4, 4);
    let mut fbo = Framebuffer::new();
    fbo.init(&gl, (4, 4), 4).unwrap();
    fbo.clear(&gl, [0.0, 1.0, 0.0, 1.0]);

    fbo.blit(&gl);
    assert_eq!(gl.screen_pixels().unwrap(), solid(4, 4, [0, 255, 0, 255]));
}

#[test]
fn test_save_png() {
    let gl = HeadlessGl::new();
    let mut fbo = Framebuffer::new();
    fbo.init(&gl, (5, 3), 1).unwrap();
    fbo.clear(&gl, [1.0, 1.0, 1.0, 1.0]);

    let path = std::env::temp_dir().join(format!("glkit-fbo-{}.png", std::process::id()));
    fbo.save_png(&gl, &path).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    std::fs::remove_file(&path).unwrap();

    let missing = std::env::temp_dir().join("glkit-missing-dir").join("out.png");
    assert!(matches!(fbo.save_png(&gl, &missing), Err(GlError::Io { .. })));
}
