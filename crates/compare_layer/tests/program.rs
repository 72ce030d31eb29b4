//! Behavior of the default program resource against the recording context:
//! resource symmetry on every exit path, diagnostic quality on failures, and
//! the exact per-frame draw submissions.

use glam::Mat4;

use compare_harness::{RecordingGl, TextureId};
use compare_layer::{
    ClipRenderer, Offset, OverlayRenderer, ProgramError, ShaderStage, Viewport, VisibleTile,
};

fn tile(texture: Option<TextureId>) -> VisibleTile<RecordingGl> {
    VisibleTile {
        texture,
        proj_matrix: Mat4::IDENTITY,
    }
}

#[test]
fn setup_leaves_one_program_and_one_buffer() {
    let gl = RecordingGl::new();
    let mut renderer = ClipRenderer;

    let program = renderer.setup(&gl, Offset::new(0.3, 0.6), 1.0).unwrap();

    // Both shaders are released after the link; the program and the quad
    // buffer stay.
    assert_eq!(gl.live_shaders(), 0);
    assert_eq!(gl.live_programs(), 1);
    assert_eq!(gl.live_buffers(), 1);
    assert_eq!(gl.creation_count(), 4);
    assert_eq!(gl.compile_count(), 2);
    assert_eq!(gl.link_count(), 1);

    // Initial uniform values are the raw fractions; the pixel conversion
    // happens per frame once the viewport is known.
    assert_eq!(
        gl.uniform_value("u_offset_x").and_then(|v| v.as_f32()),
        Some(0.3)
    );
    assert_eq!(
        gl.uniform_value("u_offset_y").and_then(|v| v.as_f32()),
        Some(0.6)
    );

    renderer.teardown(&gl, program);
    assert_eq!(gl.live_objects(), 0);
}

#[test]
fn fragment_compile_failure_releases_the_vertex_shader() {
    let gl = RecordingGl::new();
    gl.fail_fragment_compile.set(true);

    let err = ClipRenderer.setup(&gl, Offset::HIDDEN, 1.0).unwrap_err();
    match &err {
        ProgramError::Compile { stage, log } => {
            assert_eq!(*stage, ShaderStage::Fragment);
            assert!(log.contains("injected fragment compile failure"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.to_string().contains("fragment"));

    assert_eq!(gl.live_shaders(), 0);
    assert_eq!(gl.live_programs(), 0);
    assert_eq!(gl.live_objects(), 0);
}

#[test]
fn vertex_compile_failure_creates_nothing_else() {
    let gl = RecordingGl::new();
    gl.fail_vertex_compile.set(true);

    let err = ClipRenderer.setup(&gl, Offset::HIDDEN, 1.0).unwrap_err();
    assert!(matches!(
        err,
        ProgramError::Compile {
            stage: ShaderStage::Vertex,
            ..
        }
    ));
    assert_eq!(gl.creation_count(), 1);
    assert_eq!(gl.live_objects(), 0);
}

#[test]
fn link_failure_releases_shaders_and_program() {
    let gl = RecordingGl::new();
    gl.fail_link.set(true);

    let err = ClipRenderer.setup(&gl, Offset::HIDDEN, 1.0).unwrap_err();
    match err {
        ProgramError::Link { log } => assert!(log.contains("injected link failure")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(gl.live_objects(), 0);
}

#[test]
fn program_creation_failure_releases_both_shaders() {
    let gl = RecordingGl::new();
    gl.fail_create_program.set(true);

    let err = ClipRenderer.setup(&gl, Offset::HIDDEN, 1.0).unwrap_err();
    assert!(matches!(err, ProgramError::CreateProgram(_)));
    assert_eq!(gl.live_objects(), 0);
}

#[test]
fn buffer_creation_failure_releases_the_program() {
    let gl = RecordingGl::new();
    gl.fail_create_buffer.set(true);

    let err = ClipRenderer.setup(&gl, Offset::HIDDEN, 1.0).unwrap_err();
    assert!(matches!(err, ProgramError::CreateBuffer(_)));
    assert_eq!(gl.live_objects(), 0);
}

#[test]
fn missing_position_attribute_is_fatal() {
    let gl = RecordingGl::new();
    gl.hide_attrib("a_pos");

    let err = ClipRenderer.setup(&gl, Offset::HIDDEN, 1.0).unwrap_err();
    assert!(matches!(err, ProgramError::MissingAttribute("a_pos")));
    assert_eq!(gl.live_objects(), 0);
}

#[test]
fn missing_uniform_locations_are_tolerated() {
    let gl = RecordingGl::new();
    gl.hide_uniform("u_offset_x");
    gl.hide_uniform("u_pixel_ratio");

    let mut renderer = ClipRenderer;
    let program = renderer.setup(&gl, Offset::FULL, 2.0).unwrap();

    let tiles = [tile(Some(gl.mint_texture()))];
    renderer.render(
        &gl,
        &Mat4::IDENTITY,
        &program,
        &tiles,
        Offset::FULL,
        Viewport::new(100.0, 100.0),
        2.0,
    );

    // The hidden uniforms were never written; the draw still happened with
    // the surviving ones.
    let calls = gl.draw_calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].uniform_f32("u_offset_x").is_none());
    assert!(calls[0].uniform_f32("u_pixel_ratio").is_none());
    assert_eq!(calls[0].uniform_f32("u_offset_y"), Some(100.0));

    renderer.teardown(&gl, program);
}

#[test]
fn tiles_without_textures_are_skipped() {
    let gl = RecordingGl::new();
    let mut renderer = ClipRenderer;
    let program = renderer.setup(&gl, Offset::FULL, 1.0).unwrap();

    let first = gl.mint_texture();
    let third = gl.mint_texture();
    let tiles = [tile(Some(first)), tile(None), tile(Some(third))];
    renderer.render(
        &gl,
        &Mat4::IDENTITY,
        &program,
        &tiles,
        Offset::FULL,
        Viewport::new(800.0, 600.0),
        1.0,
    );

    let calls = gl.draw_calls();
    assert_eq!(calls.len(), 2);
    for call in &calls {
        assert_eq!(call.mode, glow::TRIANGLES);
        assert_eq!((call.first, call.count), (0, 6));
    }
    assert_eq!(calls[0].texture, Some(first));
    assert_eq!(calls[1].texture, Some(third));

    renderer.teardown(&gl, program);
}

#[test]
fn offsets_convert_to_pixel_thresholds_once_per_frame() {
    let gl = RecordingGl::new();
    let mut renderer = ClipRenderer;
    let program = renderer.setup(&gl, Offset::HIDDEN, 1.0).unwrap();

    let tiles = [tile(Some(gl.mint_texture())), tile(Some(gl.mint_texture()))];
    renderer.render(
        &gl,
        &Mat4::IDENTITY,
        &program,
        &tiles,
        Offset::new(0.5, 0.25),
        Viewport::new(800.0, 400.0),
        1.0,
    );

    for call in gl.draw_calls() {
        assert_eq!(call.uniform_f32("u_offset_x"), Some(400.0));
        assert_eq!(call.uniform_f32("u_offset_y"), Some(100.0));
    }

    renderer.teardown(&gl, program);
}

#[test]
fn empty_tile_list_draws_nothing() {
    let gl = RecordingGl::new();
    let mut renderer = ClipRenderer;
    let program = renderer.setup(&gl, Offset::HIDDEN, 1.0).unwrap();

    renderer.render(
        &gl,
        &Mat4::IDENTITY,
        &program,
        &[],
        Offset::new(0.5, 0.5),
        Viewport::new(800.0, 600.0),
        1.0,
    );

    assert_eq!(gl.draw_call_count(), 0);
    // The per-frame uniforms were still refreshed.
    assert_eq!(
        gl.uniform_value("u_offset_x").and_then(|v| v.as_f32()),
        Some(400.0)
    );

    renderer.teardown(&gl, program);
}

#[test]
fn draws_use_the_tile_matrix_depth_test_and_clamped_sampling() {
    let gl = RecordingGl::new();
    let mut renderer = ClipRenderer;
    let program = renderer.setup(&gl, Offset::FULL, 1.0).unwrap();

    let proj = Mat4::from_translation(glam::vec3(3.0, 5.0, 0.0));
    let tiles = [VisibleTile {
        texture: Some(gl.mint_texture()),
        proj_matrix: proj,
    }];
    renderer.render(
        &gl,
        &Mat4::IDENTITY,
        &program,
        &tiles,
        Offset::FULL,
        Viewport::new(640.0, 480.0),
        1.0,
    );

    let calls = gl.draw_calls();
    assert_eq!(calls.len(), 1);
    let call = &calls[0];
    assert!(call.depth_test);
    assert_eq!(call.depth_func, Some(glow::LESS));
    assert!(call.array_buffer.is_some());
    assert_eq!(
        call.uniforms.get("u_matrix").copied().and_then(|v| v.as_mat4()),
        Some(proj.to_cols_array())
    );
    assert_eq!(
        call.uniforms.get("u_texture").copied().and_then(|v| v.as_i32()),
        Some(0)
    );

    let params = gl.tex_parameter_calls();
    for parameter in [glow::TEXTURE_WRAP_S, glow::TEXTURE_WRAP_T] {
        assert!(params.contains(&(glow::TEXTURE_2D, parameter, glow::CLAMP_TO_EDGE as i32)));
    }
    for parameter in [glow::TEXTURE_MIN_FILTER, glow::TEXTURE_MAG_FILTER] {
        assert!(params.contains(&(glow::TEXTURE_2D, parameter, glow::LINEAR as i32)));
    }

    renderer.teardown(&gl, program);
}
