//! GlShader behaviour against the headless context

use glkit::gpu::transform;
use glkit::{
    AttribLayout, GlError, GlShader, HeadlessGl, Primitive, ScalarKind, ShaderStage,
    UniformValue, VERSION_UNSET,
};

const VERTEX: &str = r#"#version 330
in vec3 position;
in vec3 normal;
in vec4 color;
uniform mat4 mvp;
void main() {
    gl_Position = mvp * vec4(position, 1.0);
}
"#;

const FRAGMENT: &str = r#"#version 330
uniform vec4 tint;
out vec4 frag;
void main() {
    frag = tint;
}
"#;

const POSITIONS: [f32; 12] = [
    0.0, 0.0, 0.0, //
    1.0, 0.0, 0.0, //
    1.0, 1.0, 0.0, //
    0.0, 1.0, 0.0, //
];

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn mesh_shader(gl: &HeadlessGl) -> GlShader<HeadlessGl> {
    init_logger();
    let mut shader = GlShader::new();
    shader.init(gl, "mesh", VERTEX, FRAGMENT, None).unwrap();
    gl.reset_stats();
    shader
}

#[test]
fn test_unchanged_version_transfers_once() {
    let gl = HeadlessGl::new();
    let mut shader = mesh_shader(&gl);

    shader.upload_attrib(&gl, "position", 3, &POSITIONS, 1).unwrap();
    shader.upload_attrib(&gl, "position", 3, &POSITIONS, 1).unwrap();

    assert_eq!(gl.transfer_count(), 1);
    assert_eq!(gl.allocation_count(), 1);
    assert_eq!(gl.bytes_transferred(), 48);
    assert_eq!(shader.attrib_version("position"), 1);

    // A new version transfers again into the same buffer
    shader.upload_attrib(&gl, "position", 3, &POSITIONS, 2).unwrap();
    assert_eq!(gl.transfer_count(), 2);
    assert_eq!(gl.allocation_count(), 1);
}

#[test]
fn test_unset_version_always_transfers() {
    let gl = HeadlessGl::new();
    let mut shader = mesh_shader(&gl);

    for _ in 0..3 {
        shader
            .upload_attrib(&gl, "position", 3, &POSITIONS, VERSION_UNSET)
            .unwrap();
    }
    assert_eq!(gl.transfer_count(), 3);
    assert_eq!(shader.attrib_version("position"), VERSION_UNSET);
}

#[test]
fn test_invalidate_forces_transfer() {
    let gl = HeadlessGl::new();
    let mut shader = mesh_shader(&gl);

    shader.upload_attrib(&gl, "position", 3, &POSITIONS, 7).unwrap();
    shader.upload_attrib(&gl, "normal", 3, &POSITIONS, 7).unwrap();
    shader.invalidate_attribs();
    assert_eq!(shader.attrib_version("position"), VERSION_UNSET);
    assert_eq!(shader.attrib_version("normal"), VERSION_UNSET);

    shader.upload_attrib(&gl, "position", 3, &POSITIONS, 7).unwrap();
    assert_eq!(gl.transfer_count(), 3);

    shader.reset_attrib_version("normal");
    shader.upload_attrib(&gl, "normal", 3, &POSITIONS, 7).unwrap();
    assert_eq!(gl.transfer_count(), 4);
}

#[test]
fn test_free_attrib() {
    let gl = HeadlessGl::new();
    let mut shader = mesh_shader(&gl);

    shader.upload_attrib(&gl, "position", 3, &POSITIONS, 1).unwrap();
    assert!(shader.has_attrib("position"));
    assert_eq!(gl.live_objects().buffers, 1);

    shader.free_attrib(&gl, "position");
    assert!(!shader.has_attrib("position"));
    assert_eq!(shader.attrib_version("position"), VERSION_UNSET);
    assert_eq!(shader.attrib_layout("position"), None);
    assert_eq!(gl.live_objects().buffers, 0);

    // Unknown names are ignored
    shader.free_attrib(&gl, "position");
}

#[test]
fn test_attrib_pointer_follows_layout() {
    let gl = HeadlessGl::new();
    let mut shader = mesh_shader(&gl);
    let vao = shader.vertex_array().unwrap();
    let position = shader.attrib(&gl, "position", false).unwrap();
    let color = shader.attrib(&gl, "color", false).unwrap();

    shader.upload_attrib(&gl, "position", 3, &POSITIONS, 1).unwrap();
    let pointer = gl.attrib_pointer(vao, position).unwrap();
    assert_eq!((pointer.dim, pointer.kind), (3, ScalarKind::F32));
    assert!(!pointer.normalized);
    assert!(pointer.enabled);

    // Integer data is normalized
    shader
        .upload_attrib(&gl, "color", 4, &[255u8, 0, 0, 255], 1)
        .unwrap();
    let pointer = gl.attrib_pointer(vao, color).unwrap();
    assert_eq!((pointer.dim, pointer.kind), (4, ScalarKind::U8));
    assert!(pointer.normalized);

    // Re-uploading with another shape re-points the attribute
    shader.upload_attrib(&gl, "position", 2, &POSITIONS, 2).unwrap();
    assert_eq!(gl.attrib_pointer(vao, position).unwrap().dim, 2);
    assert_eq!(shader.attrib_layout("position").unwrap().dim, 2);

    // Empty data disables it
    shader.upload_attrib::<f32>(&gl, "position", 2, &[], 3).unwrap();
    assert!(!gl.attrib_pointer(vao, position).unwrap().enabled);
}

#[test]
fn test_upload_without_location_keeps_buffer() {
    let gl = HeadlessGl::new();
    let mut shader = mesh_shader(&gl);

    shader.upload_attrib(&gl, "tangent", 3, &POSITIONS, 1).unwrap();
    assert!(shader.has_attrib("tangent"));
    assert_eq!(shader.attrib(&gl, "tangent", false), None);
    assert_eq!(gl.transfer_count(), 1);
}

#[test]
fn test_share_attrib_aliases_storage() {
    let gl = HeadlessGl::new();
    let mut source = mesh_shader(&gl);
    source.upload_attrib(&gl, "position", 3, &POSITIONS, 1).unwrap();

    let mut other = GlShader::new();
    other
        .init(
            &gl,
            "outline",
            "in vec3 p;\nvoid main() {}\n",
            "void main() {}\n",
            None,
        )
        .unwrap();
    gl.reset_stats();

    other
        .share_attrib(&gl, &source, "position", Some("p"))
        .unwrap();
    assert_eq!(gl.allocation_count(), 0);
    assert_eq!(gl.transfer_count(), 0);
    assert!(other.has_attrib("p"));
    assert_eq!(other.attrib_version("p"), 1);
    assert_eq!(other.buffer_size(), 48);

    // Both vertex arrays read the same buffer
    let src_pointer = gl
        .attrib_pointer(
            source.vertex_array().unwrap(),
            source.attrib(&gl, "position", false).unwrap(),
        )
        .unwrap();
    let alias_pointer = gl
        .attrib_pointer(other.vertex_array().unwrap(), 0)
        .unwrap();
    assert_eq!(src_pointer.buffer, alias_pointer.buffer);

    // New uploads through the source are visible through the alias
    let moved: Vec<f32> = POSITIONS.iter().map(|v| v + 10.0).collect();
    source.upload_attrib(&gl, "position", 3, &moved, 2).unwrap();
    assert_eq!(other.attrib_version("p"), 2);
    assert_eq!(other.download_attrib::<f32>(&gl, "p").unwrap().data, moved);

    // The alias dies with the source attribute
    source.free_attrib(&gl, "position");
    assert!(!other.has_attrib("p"));
    assert_eq!(other.buffer_size(), 0);
    other.free(&gl);
    source.free(&gl);
    assert_eq!(gl.live_objects().total(), 0);
}

#[test]
fn test_share_missing_attrib_fails() {
    let gl = HeadlessGl::new();
    let source = mesh_shader(&gl);
    let mut other = mesh_shader(&gl);

    let err = other
        .share_attrib(&gl, &source, "position", None)
        .unwrap_err();
    assert!(err.is_buffer_not_found());
    assert!(!other.has_attrib("position"));
}

#[test]
fn test_share_replaces_owned_buffer() {
    let gl = HeadlessGl::new();
    let mut source = mesh_shader(&gl);
    let mut other = mesh_shader(&gl);
    source.upload_attrib(&gl, "position", 3, &POSITIONS, 1).unwrap();
    other.upload_attrib(&gl, "position", 3, &POSITIONS, 1).unwrap();
    assert_eq!(gl.live_objects().buffers, 2);

    other.share_attrib(&gl, &source, "position", None).unwrap();
    assert_eq!(gl.live_objects().buffers, 1);
    assert_eq!(other.buffer_size(), source.buffer_size());
}

#[test]
fn test_download_round_trip() {
    let gl = HeadlessGl::new();
    let mut shader = mesh_shader(&gl);

    shader.upload_attrib(&gl, "position", 3, &POSITIONS, 1).unwrap();
    let positions = shader.download_attrib::<f32>(&gl, "position").unwrap();
    assert_eq!(positions.dim, 3);
    assert_eq!(positions.cols(), 4);
    assert_eq!(positions.data, POSITIONS);
    assert_eq!(positions.column(2), &[1.0, 1.0, 0.0]);

    let ids = [4u32, 8, 15, 16, 23];
    shader.upload_attrib(&gl, "id", 1, &ids, 1).unwrap();
    let downloaded = shader.download_attrib::<u32>(&gl, "id").unwrap();
    assert_eq!((downloaded.dim, downloaded.cols()), (1, 5));
    assert_eq!(downloaded.data, ids);

    let halves: Vec<half::f16> = [0.5f32, 1.5, -2.0].map(half::f16::from_f32).to_vec();
    shader.upload_attrib(&gl, "weight", 1, &halves, 1).unwrap();
    assert_eq!(
        shader.download_attrib::<half::f16>(&gl, "weight").unwrap().data,
        halves
    );
    assert_eq!(gl.download_count(), 3);
}

#[test]
fn test_download_errors() {
    let gl = HeadlessGl::new();
    let mut shader = mesh_shader(&gl);

    let err = shader.download_attrib::<f32>(&gl, "position").unwrap_err();
    assert!(err.is_buffer_not_found());

    shader.upload_attrib(&gl, "position", 3, &POSITIONS, 1).unwrap();
    let err = shader.download_attrib::<u32>(&gl, "position").unwrap_err();
    assert!(matches!(
        err,
        GlError::TypeMismatch {
            stored: ScalarKind::F32,
            requested: ScalarKind::U32,
            ..
        }
    ));
    assert_eq!(gl.download_count(), 0);
}

#[test]
fn test_buffer_size() {
    let gl = HeadlessGl::new();
    let mut shader = mesh_shader(&gl);
    assert_eq!(shader.buffer_size(), 0);

    shader.upload_attrib(&gl, "position", 3, &POSITIONS, 1).unwrap();
    shader
        .upload_indices(&gl, 3, &[0u32, 1, 2, 2, 3, 0])
        .unwrap();
    shader
        .upload_attrib(&gl, "color", 4, &[0u8; 16], 1)
        .unwrap();

    assert_eq!(shader.buffer_size(), 12 * 4 + 6 * 4 + 16);
}

#[test]
fn test_buffer_size_counts_shared_buffers() {
    let gl = HeadlessGl::new();
    let mut source = mesh_shader(&gl);
    let mut other = mesh_shader(&gl);
    source.upload_attrib(&gl, "position", 3, &POSITIONS, 1).unwrap();
    other.upload_attrib(&gl, "color", 4, &[0u8; 16], 1).unwrap();

    other
        .share_attrib(&gl, &source, "position", Some("p"))
        .unwrap();
    assert_eq!(other.buffer_size(), 48 + 16);
    assert_eq!(source.buffer_size(), 48);
}

#[test]
fn test_mismatched_raw_upload_is_rejected() {
    let gl = HeadlessGl::new();
    let mut shader = mesh_shader(&gl);

    let layout = AttribLayout::new(3, 3, ScalarKind::F32);
    let err = shader
        .upload_attrib_raw(&gl, "position", layout, &[0u8; 4], 1)
        .unwrap_err();
    assert!(matches!(
        err,
        GlError::LayoutMismatch {
            expected: 12,
            actual: 4,
            ..
        }
    ));
    assert!(!shader.has_attrib("position"));
    assert_eq!(gl.allocation_count(), 0);

    // Existing buffers keep their metadata
    shader.upload_attrib(&gl, "position", 3, &POSITIONS, 1).unwrap();
    assert!(shader
        .upload_attrib_raw(&gl, "position", layout, &[0u8; 8], 2)
        .is_err());
    assert_eq!(shader.attrib_version("position"), 1);
    assert_eq!(shader.attrib_layout("position").unwrap().len, 12);
    assert_eq!(gl.transfer_count(), 1);
}

#[test]
fn test_ragged_data_is_rejected() {
    let gl = HeadlessGl::new();
    let mut shader = mesh_shader(&gl);

    let err = shader
        .upload_attrib(&gl, "position", 3, &POSITIONS[..11], 1)
        .unwrap_err();
    assert!(matches!(err, GlError::RaggedData { len: 11, dim: 3, .. }));
    assert!(!shader.has_attrib("position"));

    let err = shader
        .upload_attrib(&gl, "position", 0, &POSITIONS, 1)
        .unwrap_err();
    assert!(matches!(err, GlError::RaggedData { dim: 0, .. }));
    assert_eq!(gl.transfer_count(), 0);
}

#[test]
fn test_upload_before_init_is_wired() {
    init_logger();
    let gl = HeadlessGl::new();
    let mut shader = GlShader::new();

    shader.upload_attrib(&gl, "position", 3, &POSITIONS, 1).unwrap();
    shader.upload_indices(&gl, 3, &[0u32, 1, 2]).unwrap();
    shader.init(&gl, "mesh", VERTEX, FRAGMENT, None).unwrap();

    // Same version: skipped, yet the attribute is connected
    shader.upload_attrib(&gl, "position", 3, &POSITIONS, 1).unwrap();
    assert_eq!(gl.transfer_count(), 2);

    let vao = shader.vertex_array().unwrap();
    let location = shader.attrib(&gl, "position", false).unwrap();
    let pointer = gl.attrib_pointer(vao, location).unwrap();
    assert_eq!((pointer.dim, pointer.kind), (3, ScalarKind::F32));
    assert!(pointer.enabled);
    assert!(gl.index_buffer(vao).is_some());
}

#[test]
fn test_invalid_source_leaks_nothing() {
    init_logger();
    let gl = HeadlessGl::new();
    let mut shader = GlShader::new();

    let err = shader
        .init(&gl, "broken", VERTEX, "void main() {", None)
        .unwrap_err();
    assert!(matches!(
        err,
        GlError::Compile {
            stage: ShaderStage::Fragment,
            ..
        }
    ));

    assert!(!shader.is_initialized());
    assert_eq!(gl.live_objects().total(), 0);
    assert_eq!(shader.attrib(&gl, "position", false), None);
    assert!(shader.uniform(&gl, "mvp", false).is_none());
    assert!(!shader.has_attrib("position"));

    // A failing geometry stage cleans up the vertex stage too
    let err = shader
        .init(&gl, "broken", VERTEX, FRAGMENT, Some("layout(points) in;"))
        .unwrap_err();
    assert!(matches!(
        err,
        GlError::Compile {
            stage: ShaderStage::Geometry,
            ..
        }
    ));
    assert_eq!(gl.live_objects().total(), 0);
}

#[test]
fn test_definitions_are_injected() {
    init_logger();
    let gl = HeadlessGl::new();
    let mut shader = GlShader::new();
    shader.define("USE_NORMALS", "1");
    shader.define("MAX_LIGHTS", "4");
    shader.init(&gl, "lit", VERTEX, FRAGMENT, None).unwrap();

    let sources = gl.stage_sources();
    assert_eq!(sources.len(), 2);
    for source in sources {
        assert!(source.starts_with("#version 330\n#define MAX_LIGHTS 4\n#define USE_NORMALS 1\n"));
    }
    assert_eq!(shader.definitions().len(), 2);
}

#[test]
fn test_draw_calls() {
    let gl = HeadlessGl::new();
    let mut shader = mesh_shader(&gl);
    shader.bind(&gl);
    assert_eq!(gl.active_program(), shader.program());
    assert_eq!(gl.active_vertex_array(), shader.vertex_array());

    // Without indices
    let err = shader
        .draw_indexed(&gl, Primitive::Triangles, 0, 2)
        .unwrap_err();
    assert!(err.is_buffer_not_found());

    shader.upload_attrib(&gl, "position", 3, &POSITIONS, 1).unwrap();
    shader
        .upload_indices(&gl, 3, &[0u32, 1, 2, 2, 3, 0])
        .unwrap();
    assert!(gl.index_buffer(shader.vertex_array().unwrap()).is_some());

    shader.draw_array(&gl, Primitive::Points, 0, 0);
    assert!(gl.draw_calls().is_empty());

    shader
        .draw_indexed(&gl, Primitive::Triangles, 1, 1)
        .unwrap();
    shader.draw_array(&gl, Primitive::LineStrip, 2, 5);

    let calls = gl.draw_calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].primitive, Primitive::Triangles);
    assert_eq!(calls[0].count, 3);
    assert_eq!(calls[0].offset, 12);
    assert_eq!(calls[0].index_kind, Some(ScalarKind::U32));
    assert_eq!(calls[0].program, shader.program());
    assert_eq!((calls[1].offset, calls[1].count), (2, 5));
    assert_eq!(calls[1].index_kind, None);

    // Offsets scale with the index type
    shader.upload_indices(&gl, 2, &[0u16, 1, 1, 2]).unwrap();
    shader.draw_indexed(&gl, Primitive::Lines, 1, 1).unwrap();
    let last = gl.draw_calls().pop().unwrap();
    assert_eq!((last.offset, last.count), (4, 2));
    assert_eq!(last.index_kind, Some(ScalarKind::U16));
}

#[test]
fn test_draw_uses_own_vertex_array() {
    let gl = HeadlessGl::new();
    let mut first = mesh_shader(&gl);
    let mut second = mesh_shader(&gl);
    first.upload_attrib(&gl, "position", 3, &POSITIONS, 1).unwrap();
    first.upload_indices(&gl, 3, &[0u32, 1, 2]).unwrap();

    first.bind(&gl);
    second.upload_attrib(&gl, "position", 3, &POSITIONS, 1).unwrap();
    first.draw_array(&gl, Primitive::Triangles, 0, 3);

    second.share_attrib(&gl, &first, "indices", None).unwrap();
    first.draw_indexed(&gl, Primitive::Triangles, 0, 1).unwrap();

    let calls = gl.draw_calls();
    assert_eq!(calls.len(), 2);
    for call in calls {
        assert_eq!(call.program, first.program());
        assert_eq!(call.vertex_array, first.vertex_array());
    }
}

#[test]
fn test_index_type_is_checked() {
    let gl = HeadlessGl::new();
    let mut shader = mesh_shader(&gl);

    let err = shader.upload_indices(&gl, 3, &[0i32, 1, 2]).unwrap_err();
    assert!(matches!(err, GlError::InvalidIndexType(ScalarKind::I32)));
    assert!(!shader.has_attrib("indices"));
    assert_eq!(gl.allocation_count(), 0);
}

#[test]
fn test_uniforms() {
    let gl = HeadlessGl::new();
    let shader = mesh_shader(&gl);
    let program = shader.program().unwrap();
    let mvp = transform::ortho_projection(640.0, 480.0);

    shader.bind(&gl);
    shader.set_uniform(&gl, "mvp", mvp, true);
    shader.set_uniform(&gl, "tint", [1.0f32, 0.5, 0.0, 1.0], true);
    shader.set_uniform(&gl, "missing", 3, false);

    assert_eq!(gl.uniform_value(program, "mvp"), Some(UniformValue::Mat4(mvp)));
    assert_eq!(
        gl.uniform_value(program, "tint"),
        Some(UniformValue::Vec4([1.0, 0.5, 0.0, 1.0]))
    );
    assert!(shader.uniform(&gl, "missing", false).is_none());
}

#[test]
fn test_free_is_idempotent() {
    let gl = HeadlessGl::new();
    let mut shader = mesh_shader(&gl);
    shader.upload_attrib(&gl, "position", 3, &POSITIONS, 1).unwrap();

    shader.free(&gl);
    assert!(!shader.is_initialized());
    assert!(!shader.has_attrib("position"));
    assert_eq!(gl.live_objects().total(), 0);
    shader.free(&gl);

    // Never-initialized shaders free cleanly too
    GlShader::<HeadlessGl>::new().free(&gl);

    shader.init(&gl, "mesh", VERTEX, FRAGMENT, None).unwrap();
    assert!(shader.is_initialized());
}

#[test]
fn test_reinit_frees_previous_program() {
    let gl = HeadlessGl::new();
    let mut shader = mesh_shader(&gl);
    shader.upload_attrib(&gl, "position", 3, &POSITIONS, 1).unwrap();
    let before = gl.live_objects();

    shader.init(&gl, "mesh2", VERTEX, FRAGMENT, None).unwrap();
    assert_eq!(shader.name(), "mesh2");
    assert!(!shader.has_attrib("position"));
    assert_eq!(gl.live_objects().programs, before.programs);
    assert_eq!(gl.live_objects().buffers, 0);
}
