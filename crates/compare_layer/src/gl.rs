//! The narrow GL surface the layer draws through.
//!
//! The host map engine owns the live rendering context; this trait captures
//! the handful of entry points the overlay actually touches, so the layer can
//! run against a real [`glow::Context`] in production and a recording fake in
//! tests. Method names and signatures mirror [`glow::HasContext`] so the
//! forwarding impl is a straight passthrough.

use std::fmt::Debug;
use std::hash::Hash;

/// GL entry points used by the overlay: shader/program/buffer lifecycle,
/// uniform writes, texture binding, and the draw call itself.
///
/// Resource creation returns `Result<_, String>` and uniform lookups return
/// `Option`, matching the underlying API: a missing uniform location is not
/// an error, and writes through `None` locations are silently dropped.
pub trait GlApi {
    type Shader: Copy + Eq + Hash + Debug;
    type Program: Copy + Eq + Hash + Debug;
    type Buffer: Copy + Eq + Hash + Debug;
    type Texture: Copy + Eq + Hash + Debug;
    type UniformLocation: Clone + Debug;

    fn create_shader(&self, shader_type: u32) -> Result<Self::Shader, String>;
    fn shader_source(&self, shader: Self::Shader, source: &str);
    fn compile_shader(&self, shader: Self::Shader);
    fn get_shader_compile_status(&self, shader: Self::Shader) -> bool;
    fn get_shader_info_log(&self, shader: Self::Shader) -> String;
    fn delete_shader(&self, shader: Self::Shader);

    fn create_program(&self) -> Result<Self::Program, String>;
    fn attach_shader(&self, program: Self::Program, shader: Self::Shader);
    fn link_program(&self, program: Self::Program);
    fn get_program_link_status(&self, program: Self::Program) -> bool;
    fn get_program_info_log(&self, program: Self::Program) -> String;
    fn delete_program(&self, program: Self::Program);
    fn use_program(&self, program: Option<Self::Program>);

    fn create_buffer(&self) -> Result<Self::Buffer, String>;
    fn bind_buffer(&self, target: u32, buffer: Option<Self::Buffer>);
    fn buffer_data_u8_slice(&self, target: u32, data: &[u8], usage: u32);
    fn delete_buffer(&self, buffer: Self::Buffer);

    fn get_attrib_location(&self, program: Self::Program, name: &str) -> Option<u32>;
    fn get_uniform_location(
        &self,
        program: Self::Program,
        name: &str,
    ) -> Option<Self::UniformLocation>;
    fn uniform_1_f32(&self, location: Option<&Self::UniformLocation>, x: f32);
    fn uniform_1_i32(&self, location: Option<&Self::UniformLocation>, x: i32);
    fn uniform_matrix_4_f32_slice(
        &self,
        location: Option<&Self::UniformLocation>,
        transpose: bool,
        v: &[f32],
    );

    fn active_texture(&self, unit: u32);
    fn bind_texture(&self, target: u32, texture: Option<Self::Texture>);
    fn tex_parameter_i32(&self, target: u32, parameter: u32, value: i32);

    fn enable_vertex_attrib_array(&self, index: u32);
    fn vertex_attrib_pointer_f32(
        &self,
        index: u32,
        size: i32,
        data_type: u32,
        normalized: bool,
        stride: i32,
        offset: i32,
    );

    fn enable(&self, parameter: u32);
    fn depth_func(&self, func: u32);
    fn draw_arrays(&self, mode: u32, first: i32, count: i32);
}

/// Forwarding impl for a real GL context.
///
/// The context must be current on the calling thread whenever any of these
/// entry points run; the host's draw-invocation contract guarantees that for
/// the attach/prerender/render/detach call sites.
impl GlApi for glow::Context {
    type Shader = <glow::Context as glow::HasContext>::Shader;
    type Program = <glow::Context as glow::HasContext>::Program;
    type Buffer = <glow::Context as glow::HasContext>::Buffer;
    type Texture = <glow::Context as glow::HasContext>::Texture;
    type UniformLocation = <glow::Context as glow::HasContext>::UniformLocation;

    fn create_shader(&self, shader_type: u32) -> Result<Self::Shader, String> {
        unsafe { glow::HasContext::create_shader(self, shader_type) }
    }

    fn shader_source(&self, shader: Self::Shader, source: &str) {
        unsafe { glow::HasContext::shader_source(self, shader, source) }
    }

    fn compile_shader(&self, shader: Self::Shader) {
        unsafe { glow::HasContext::compile_shader(self, shader) }
    }

    fn get_shader_compile_status(&self, shader: Self::Shader) -> bool {
        unsafe { glow::HasContext::get_shader_compile_status(self, shader) }
    }

    fn get_shader_info_log(&self, shader: Self::Shader) -> String {
        unsafe { glow::HasContext::get_shader_info_log(self, shader) }
    }

    fn delete_shader(&self, shader: Self::Shader) {
        unsafe { glow::HasContext::delete_shader(self, shader) }
    }

    fn create_program(&self) -> Result<Self::Program, String> {
        unsafe { glow::HasContext::create_program(self) }
    }

    fn attach_shader(&self, program: Self::Program, shader: Self::Shader) {
        unsafe { glow::HasContext::attach_shader(self, program, shader) }
    }

    fn link_program(&self, program: Self::Program) {
        unsafe { glow::HasContext::link_program(self, program) }
    }

    fn get_program_link_status(&self, program: Self::Program) -> bool {
        unsafe { glow::HasContext::get_program_link_status(self, program) }
    }

    fn get_program_info_log(&self, program: Self::Program) -> String {
        unsafe { glow::HasContext::get_program_info_log(self, program) }
    }

    fn delete_program(&self, program: Self::Program) {
        unsafe { glow::HasContext::delete_program(self, program) }
    }

    fn use_program(&self, program: Option<Self::Program>) {
        unsafe { glow::HasContext::use_program(self, program) }
    }

    fn create_buffer(&self) -> Result<Self::Buffer, String> {
        unsafe { glow::HasContext::create_buffer(self) }
    }

    fn bind_buffer(&self, target: u32, buffer: Option<Self::Buffer>) {
        unsafe { glow::HasContext::bind_buffer(self, target, buffer) }
    }

    fn buffer_data_u8_slice(&self, target: u32, data: &[u8], usage: u32) {
        unsafe { glow::HasContext::buffer_data_u8_slice(self, target, data, usage) }
    }

    fn delete_buffer(&self, buffer: Self::Buffer) {
        unsafe { glow::HasContext::delete_buffer(self, buffer) }
    }

    fn get_attrib_location(&self, program: Self::Program, name: &str) -> Option<u32> {
        unsafe { glow::HasContext::get_attrib_location(self, program, name) }
    }

    fn get_uniform_location(
        &self,
        program: Self::Program,
        name: &str,
    ) -> Option<Self::UniformLocation> {
        unsafe { glow::HasContext::get_uniform_location(self, program, name) }
    }

    fn uniform_1_f32(&self, location: Option<&Self::UniformLocation>, x: f32) {
        unsafe { glow::HasContext::uniform_1_f32(self, location, x) }
    }

    fn uniform_1_i32(&self, location: Option<&Self::UniformLocation>, x: i32) {
        unsafe { glow::HasContext::uniform_1_i32(self, location, x) }
    }

    fn uniform_matrix_4_f32_slice(
        &self,
        location: Option<&Self::UniformLocation>,
        transpose: bool,
        v: &[f32],
    ) {
        unsafe { glow::HasContext::uniform_matrix_4_f32_slice(self, location, transpose, v) }
    }

    fn active_texture(&self, unit: u32) {
        unsafe { glow::HasContext::active_texture(self, unit) }
    }

    fn bind_texture(&self, target: u32, texture: Option<Self::Texture>) {
        unsafe { glow::HasContext::bind_texture(self, target, texture) }
    }

    fn tex_parameter_i32(&self, target: u32, parameter: u32, value: i32) {
        unsafe { glow::HasContext::tex_parameter_i32(self, target, parameter, value) }
    }

    fn enable_vertex_attrib_array(&self, index: u32) {
        unsafe { glow::HasContext::enable_vertex_attrib_array(self, index) }
    }

    fn vertex_attrib_pointer_f32(
        &self,
        index: u32,
        size: i32,
        data_type: u32,
        normalized: bool,
        stride: i32,
        offset: i32,
    ) {
        unsafe {
            glow::HasContext::vertex_attrib_pointer_f32(
                self, index, size, data_type, normalized, stride, offset,
            )
        }
    }

    fn enable(&self, parameter: u32) {
        unsafe { glow::HasContext::enable(self, parameter) }
    }

    fn depth_func(&self, func: u32) {
        unsafe { glow::HasContext::depth_func(self, func) }
    }

    fn draw_arrays(&self, mode: u32, first: i32, count: i32) {
        unsafe { glow::HasContext::draw_arrays(self, mode, first, count) }
    }
}
