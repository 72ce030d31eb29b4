//! The overlay's GPU program resource and the strategy seam around it.
//!
//! [`OverlayRenderer`] is how a host application swaps in an alternative
//! shading strategy without touching the controller; [`ClipRenderer`] is the
//! default, drawing each tile as an opaque textured quad clipped by the
//! offset thresholds.

use glam::Mat4;

use crate::error::{ProgramError, ShaderStage};
use crate::gl::GlApi;
use crate::host::VisibleTile;
use crate::shaders;
use crate::state::{Offset, Viewport};

/// Unit quad as two triangles, 2 f32 components per vertex.
const UNIT_QUAD: [[f32; 2]; 6] = [
    [0.0, 0.0],
    [1.0, 0.0],
    [0.0, 1.0],
    [0.0, 1.0],
    [1.0, 0.0],
    [1.0, 1.0],
];

/// Rendering strategy for the overlay.
///
/// The controller depends only on this trait: `setup` produces a program
/// from a context and the initial offset, `render` draws a frame given that
/// program, the visible tiles, and the current offset/viewport, and
/// `teardown` releases whatever `setup` created. `prerender` is an optional
/// early hook (off-screen passes and the like); the default body does
/// nothing.
pub trait OverlayRenderer<G: GlApi> {
    type Program;

    fn setup(
        &mut self,
        gl: &G,
        offset: Offset,
        pixel_ratio: f32,
    ) -> Result<Self::Program, ProgramError>;

    fn prerender(&mut self, gl: &G, matrix: &Mat4, tiles: &[VisibleTile<G>]) {
        let _ = (gl, matrix, tiles);
    }

    #[allow(clippy::too_many_arguments)]
    fn render(
        &mut self,
        gl: &G,
        matrix: &Mat4,
        program: &Self::Program,
        tiles: &[VisibleTile<G>],
        offset: Offset,
        viewport: Viewport,
        pixel_ratio: f32,
    );

    fn teardown(&mut self, gl: &G, program: Self::Program);
}

/// Compiled overlay program with its cached handle table.
///
/// Exactly one of these lives per attached layer. The uniform locations may
/// individually be `None` when the driver's optimizer eliminated a uniform;
/// writes through a `None` location are silently ignored downstream.
pub struct ClipProgram<G: GlApi> {
    program: G::Program,
    a_pos: u32,
    u_matrix: Option<G::UniformLocation>,
    u_texture: Option<G::UniformLocation>,
    u_offset_x: Option<G::UniformLocation>,
    u_offset_y: Option<G::UniformLocation>,
    u_pixel_ratio: Option<G::UniformLocation>,
    quad: G::Buffer,
}

impl<G: GlApi> std::fmt::Debug for ClipProgram<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClipProgram")
            .field("program", &self.program)
            .field("a_pos", &self.a_pos)
            .field("u_matrix", &self.u_matrix)
            .field("u_texture", &self.u_texture)
            .field("u_offset_x", &self.u_offset_x)
            .field("u_offset_y", &self.u_offset_y)
            .field("u_pixel_ratio", &self.u_pixel_ratio)
            .field("quad", &self.quad)
            .finish()
    }
}

/// Default strategy: opaque, depth-tested, offset-clipped tile quads.
///
/// No blending is enabled; the overlay fully replaces the base map inside
/// the revealed region. Translucent comparisons need a custom strategy with
/// explicit blend-state management.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClipRenderer;

fn compile_stage<G: GlApi>(
    gl: &G,
    stage: ShaderStage,
    source: &str,
) -> Result<G::Shader, ProgramError> {
    let shader = gl
        .create_shader(stage.gl_type())
        .map_err(|reason| ProgramError::CreateShader { stage, reason })?;
    gl.shader_source(shader, source);
    gl.compile_shader(shader);
    if !gl.get_shader_compile_status(shader) {
        let log = gl.get_shader_info_log(shader);
        gl.delete_shader(shader);
        return Err(ProgramError::Compile { stage, log });
    }
    Ok(shader)
}

impl<G: GlApi> OverlayRenderer<G> for ClipRenderer {
    type Program = ClipProgram<G>;

    fn setup(
        &mut self,
        gl: &G,
        offset: Offset,
        pixel_ratio: f32,
    ) -> Result<ClipProgram<G>, ProgramError> {
        let vertex = compile_stage(gl, ShaderStage::Vertex, shaders::VERTEX)?;
        let fragment = match compile_stage(gl, ShaderStage::Fragment, shaders::FRAGMENT) {
            Ok(shader) => shader,
            Err(err) => {
                gl.delete_shader(vertex);
                return Err(err);
            }
        };

        let program = match gl.create_program() {
            Ok(program) => program,
            Err(reason) => {
                gl.delete_shader(vertex);
                gl.delete_shader(fragment);
                return Err(ProgramError::CreateProgram(reason));
            }
        };
        gl.attach_shader(program, vertex);
        gl.attach_shader(program, fragment);
        gl.link_program(program);

        // The linked program keeps its own copy of both stages; the shader
        // objects are done whether or not the link succeeded.
        gl.delete_shader(vertex);
        gl.delete_shader(fragment);

        if !gl.get_program_link_status(program) {
            let log = gl.get_program_info_log(program);
            gl.delete_program(program);
            return Err(ProgramError::Link { log });
        }

        // A missing uniform just means the optimizer removed it; a missing
        // position attribute leaves nothing to draw with.
        let Some(a_pos) = gl.get_attrib_location(program, "a_pos") else {
            gl.delete_program(program);
            return Err(ProgramError::MissingAttribute("a_pos"));
        };
        let u_matrix = gl.get_uniform_location(program, "u_matrix");
        let u_texture = gl.get_uniform_location(program, "u_texture");
        let u_offset_x = gl.get_uniform_location(program, "u_offset_x");
        let u_offset_y = gl.get_uniform_location(program, "u_offset_y");
        let u_pixel_ratio = gl.get_uniform_location(program, "u_pixel_ratio");

        let quad = match gl.create_buffer() {
            Ok(buffer) => buffer,
            Err(reason) => {
                gl.delete_program(program);
                return Err(ProgramError::CreateBuffer(reason));
            }
        };
        gl.bind_buffer(glow::ARRAY_BUFFER, Some(quad));
        gl.buffer_data_u8_slice(
            glow::ARRAY_BUFFER,
            bytemuck::cast_slice(&UNIT_QUAD),
            glow::STATIC_DRAW,
        );

        // Initial uniform values; overwritten on every rendered frame.
        gl.use_program(Some(program));
        gl.uniform_1_f32(u_offset_x.as_ref(), offset.x);
        gl.uniform_1_f32(u_offset_y.as_ref(), offset.y);
        gl.uniform_1_f32(u_pixel_ratio.as_ref(), pixel_ratio);

        Ok(ClipProgram {
            program,
            a_pos,
            u_matrix,
            u_texture,
            u_offset_x,
            u_offset_y,
            u_pixel_ratio,
            quad,
        })
    }

    fn render(
        &mut self,
        gl: &G,
        _matrix: &Mat4,
        program: &ClipProgram<G>,
        tiles: &[VisibleTile<G>],
        offset: Offset,
        viewport: Viewport,
        pixel_ratio: f32,
    ) {
        gl.use_program(Some(program.program));

        // Normalized fractions become pixel thresholds here, once per frame.
        let (threshold_x, threshold_y) = offset.to_pixels(viewport);
        gl.uniform_1_f32(program.u_offset_x.as_ref(), threshold_x);
        gl.uniform_1_f32(program.u_offset_y.as_ref(), threshold_y);
        gl.uniform_1_f32(program.u_pixel_ratio.as_ref(), pixel_ratio);

        for tile in tiles {
            // In-flight tiles have no texture yet; they draw on a later
            // frame once their data-arrived notification lands.
            let Some(texture) = tile.texture else { continue };

            gl.active_texture(glow::TEXTURE0);
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_WRAP_S,
                glow::CLAMP_TO_EDGE as i32,
            );
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_WRAP_T,
                glow::CLAMP_TO_EDGE as i32,
            );
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_MIN_FILTER,
                glow::LINEAR as i32,
            );
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_MAG_FILTER,
                glow::LINEAR as i32,
            );

            gl.bind_buffer(glow::ARRAY_BUFFER, Some(program.quad));
            gl.enable_vertex_attrib_array(program.a_pos);
            gl.vertex_attrib_pointer_f32(program.a_pos, 2, glow::FLOAT, false, 0, 0);

            gl.uniform_matrix_4_f32_slice(
                program.u_matrix.as_ref(),
                false,
                &tile.proj_matrix.to_cols_array(),
            );
            gl.uniform_1_i32(program.u_texture.as_ref(), 0);

            gl.enable(glow::DEPTH_TEST);
            gl.depth_func(glow::LESS);

            gl.draw_arrays(glow::TRIANGLES, 0, 6);
        }
    }

    fn teardown(&mut self, gl: &G, program: ClipProgram<G>) {
        // Buffer first, then the program, while the context is still valid.
        gl.delete_buffer(program.quad);
        gl.delete_program(program.program);
    }
}
