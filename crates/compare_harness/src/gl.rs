//! A recording, failure-injectable stand-in for the GL context.
//!
//! Implements [`GlApi`] over integer handles and keeps a full ledger of what
//! the layer did to the "GPU": object creation and deletion, compiles and
//! links, uniform writes, texture bindings and parameters, and every draw
//! call with a snapshot of the uniform state it saw. Tests assert on the
//! ledger instead of on pixels.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

use compare_layer::GlApi;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ShaderId(u32);

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ProgramId(u32);

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct BufferId(u32);

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TextureId(u32);

/// Uniform handle: the owning program plus the uniform's name, so the
/// ledger stays readable in assertions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UniformId {
    program: ProgramId,
    name: String,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    F32(f32),
    I32(i32),
    Mat4([f32; 16]),
}

impl UniformValue {
    pub fn as_f32(self) -> Option<f32> {
        match self {
            Self::F32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i32(self) -> Option<i32> {
        match self {
            Self::I32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_mat4(self) -> Option<[f32; 16]> {
        match self {
            Self::Mat4(v) => Some(v),
            _ => None,
        }
    }
}

/// One recorded `draw_arrays` submission.
#[derive(Clone, Debug)]
pub struct DrawCall {
    pub mode: u32,
    pub first: i32,
    pub count: i32,
    pub program: Option<ProgramId>,
    /// Texture bound to unit 0 at submission time.
    pub texture: Option<TextureId>,
    /// Buffer bound to `ARRAY_BUFFER` at submission time.
    pub array_buffer: Option<BufferId>,
    pub depth_test: bool,
    pub depth_func: Option<u32>,
    /// Uniform values of the active program at submission time, by name.
    pub uniforms: HashMap<String, UniformValue>,
}

impl DrawCall {
    pub fn uniform_f32(&self, name: &str) -> Option<f32> {
        self.uniforms.get(name).copied().and_then(UniformValue::as_f32)
    }
}

struct ShaderRecord {
    stage: u32,
    source: String,
    alive: bool,
}

struct ProgramRecord {
    attached: Vec<ShaderId>,
    linked: bool,
    alive: bool,
}

struct BufferRecord {
    len: usize,
    alive: bool,
}

#[derive(Default)]
struct Ledger {
    next_id: u32,
    shaders: HashMap<ShaderId, ShaderRecord>,
    programs: HashMap<ProgramId, ProgramRecord>,
    buffers: HashMap<BufferId, BufferRecord>,
    textures: HashSet<TextureId>,
    creations: u32,
    compiles: u32,
    links: u32,
    current_program: Option<ProgramId>,
    bound_array_buffer: Option<BufferId>,
    active_unit: u32,
    texture_bindings: HashMap<u32, TextureId>,
    uniforms: HashMap<(ProgramId, String), UniformValue>,
    tex_parameters: Vec<(u32, u32, i32)>,
    enabled_caps: HashSet<u32>,
    depth_func: Option<u32>,
    enabled_attribs: HashSet<u32>,
    attrib_pointers: Vec<(u32, i32, u32, bool, i32, i32)>,
    draw_calls: Vec<DrawCall>,
}

impl Ledger {
    fn fresh_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

/// The recording context. Failure injection goes through the public `Cell`
/// flags; `hide_uniform`/`hide_attrib` simulate an optimizing driver that
/// eliminated a location.
pub struct RecordingGl {
    ledger: RefCell<Ledger>,
    pub fail_vertex_compile: Cell<bool>,
    pub fail_fragment_compile: Cell<bool>,
    pub fail_link: Cell<bool>,
    pub fail_create_program: Cell<bool>,
    pub fail_create_buffer: Cell<bool>,
    missing_uniforms: RefCell<HashSet<String>>,
    missing_attribs: RefCell<HashSet<String>>,
}

impl Default for RecordingGl {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingGl {
    pub fn new() -> Self {
        Self {
            ledger: RefCell::new(Ledger::default()),
            fail_vertex_compile: Cell::new(false),
            fail_fragment_compile: Cell::new(false),
            fail_link: Cell::new(false),
            fail_create_program: Cell::new(false),
            fail_create_buffer: Cell::new(false),
            missing_uniforms: RefCell::new(HashSet::new()),
            missing_attribs: RefCell::new(HashSet::new()),
        }
    }

    /// Allocate a texture handle, the way the host's tile loader would.
    pub fn mint_texture(&self) -> TextureId {
        let mut ledger = self.ledger.borrow_mut();
        let texture = TextureId(ledger.fresh_id());
        ledger.textures.insert(texture);
        texture
    }

    /// Pretend the driver eliminated this uniform from the program.
    pub fn hide_uniform(&self, name: &str) {
        self.missing_uniforms.borrow_mut().insert(name.to_owned());
    }

    /// Pretend the driver eliminated this vertex attribute.
    pub fn hide_attrib(&self, name: &str) {
        self.missing_attribs.borrow_mut().insert(name.to_owned());
    }

    pub fn live_shaders(&self) -> usize {
        self.ledger
            .borrow()
            .shaders
            .values()
            .filter(|s| s.alive)
            .count()
    }

    pub fn live_programs(&self) -> usize {
        self.ledger
            .borrow()
            .programs
            .values()
            .filter(|p| p.alive)
            .count()
    }

    pub fn live_buffers(&self) -> usize {
        self.ledger
            .borrow()
            .buffers
            .values()
            .filter(|b| b.alive)
            .count()
    }

    /// Shader + program + buffer objects still alive. Zero after a clean
    /// detach.
    pub fn live_objects(&self) -> usize {
        self.live_shaders() + self.live_programs() + self.live_buffers()
    }

    /// Total `create_*` calls (shaders, programs, buffers).
    pub fn creation_count(&self) -> u32 {
        self.ledger.borrow().creations
    }

    pub fn compile_count(&self) -> u32 {
        self.ledger.borrow().compiles
    }

    pub fn link_count(&self) -> u32 {
        self.ledger.borrow().links
    }

    pub fn draw_calls(&self) -> Vec<DrawCall> {
        self.ledger.borrow().draw_calls.clone()
    }

    pub fn draw_call_count(&self) -> usize {
        self.ledger.borrow().draw_calls.len()
    }

    /// Latest value written to a uniform of this name, in any program.
    pub fn uniform_value(&self, name: &str) -> Option<UniformValue> {
        let ledger = self.ledger.borrow();
        ledger
            .uniforms
            .iter()
            .find(|((_, uniform), _)| uniform.as_str() == name)
            .map(|(_, value)| *value)
    }

    pub fn tex_parameter_calls(&self) -> Vec<(u32, u32, i32)> {
        self.ledger.borrow().tex_parameters.clone()
    }

    pub fn compiled_source(&self, stage: u32) -> Option<String> {
        let ledger = self.ledger.borrow();
        ledger
            .shaders
            .values()
            .find(|s| s.stage == stage)
            .map(|s| s.source.clone())
    }

    fn compile_should_fail(&self, stage: u32) -> bool {
        match stage {
            glow::VERTEX_SHADER => self.fail_vertex_compile.get(),
            glow::FRAGMENT_SHADER => self.fail_fragment_compile.get(),
            _ => false,
        }
    }

    fn stage_name(stage: u32) -> &'static str {
        match stage {
            glow::VERTEX_SHADER => "vertex",
            glow::FRAGMENT_SHADER => "fragment",
            _ => "unknown",
        }
    }
}

impl GlApi for RecordingGl {
    type Shader = ShaderId;
    type Program = ProgramId;
    type Buffer = BufferId;
    type Texture = TextureId;
    type UniformLocation = UniformId;

    fn create_shader(&self, shader_type: u32) -> Result<ShaderId, String> {
        let mut ledger = self.ledger.borrow_mut();
        ledger.creations += 1;
        let shader = ShaderId(ledger.fresh_id());
        ledger.shaders.insert(
            shader,
            ShaderRecord {
                stage: shader_type,
                source: String::new(),
                alive: true,
            },
        );
        Ok(shader)
    }

    fn shader_source(&self, shader: ShaderId, source: &str) {
        let mut ledger = self.ledger.borrow_mut();
        let record = ledger.shaders.get_mut(&shader).expect("unknown shader");
        assert!(record.alive, "shader_source on deleted shader");
        record.source = source.to_owned();
    }

    fn compile_shader(&self, shader: ShaderId) {
        let mut ledger = self.ledger.borrow_mut();
        assert!(
            ledger.shaders.get(&shader).is_some_and(|s| s.alive),
            "compile_shader on deleted shader"
        );
        ledger.compiles += 1;
    }

    fn get_shader_compile_status(&self, shader: ShaderId) -> bool {
        let stage = self.ledger.borrow().shaders[&shader].stage;
        !self.compile_should_fail(stage)
    }

    fn get_shader_info_log(&self, shader: ShaderId) -> String {
        let stage = self.ledger.borrow().shaders[&shader].stage;
        if self.compile_should_fail(stage) {
            format!(
                "ERROR: 0:1: injected {} compile failure",
                Self::stage_name(stage)
            )
        } else {
            String::new()
        }
    }

    fn delete_shader(&self, shader: ShaderId) {
        let mut ledger = self.ledger.borrow_mut();
        let record = ledger.shaders.get_mut(&shader).expect("unknown shader");
        assert!(record.alive, "double delete of shader");
        record.alive = false;
    }

    fn create_program(&self) -> Result<ProgramId, String> {
        if self.fail_create_program.get() {
            return Err("injected create_program failure".into());
        }
        let mut ledger = self.ledger.borrow_mut();
        ledger.creations += 1;
        let program = ProgramId(ledger.fresh_id());
        ledger.programs.insert(
            program,
            ProgramRecord {
                attached: Vec::new(),
                linked: false,
                alive: true,
            },
        );
        Ok(program)
    }

    fn attach_shader(&self, program: ProgramId, shader: ShaderId) {
        let mut ledger = self.ledger.borrow_mut();
        assert!(
            ledger.shaders.get(&shader).is_some_and(|s| s.alive),
            "attach of deleted shader"
        );
        let record = ledger.programs.get_mut(&program).expect("unknown program");
        record.attached.push(shader);
    }

    fn link_program(&self, program: ProgramId) {
        let mut ledger = self.ledger.borrow_mut();
        ledger.links += 1;
        let record = ledger.programs.get_mut(&program).expect("unknown program");
        record.linked = true;
    }

    fn get_program_link_status(&self, _program: ProgramId) -> bool {
        !self.fail_link.get()
    }

    fn get_program_info_log(&self, _program: ProgramId) -> String {
        if self.fail_link.get() {
            "injected link failure".into()
        } else {
            String::new()
        }
    }

    fn delete_program(&self, program: ProgramId) {
        let mut ledger = self.ledger.borrow_mut();
        let record = ledger.programs.get_mut(&program).expect("unknown program");
        assert!(record.alive, "double delete of program");
        record.alive = false;
    }

    fn use_program(&self, program: Option<ProgramId>) {
        self.ledger.borrow_mut().current_program = program;
    }

    fn create_buffer(&self) -> Result<BufferId, String> {
        if self.fail_create_buffer.get() {
            return Err("injected create_buffer failure".into());
        }
        let mut ledger = self.ledger.borrow_mut();
        ledger.creations += 1;
        let buffer = BufferId(ledger.fresh_id());
        ledger.buffers.insert(
            buffer,
            BufferRecord {
                len: 0,
                alive: true,
            },
        );
        Ok(buffer)
    }

    fn bind_buffer(&self, target: u32, buffer: Option<BufferId>) {
        if target == glow::ARRAY_BUFFER {
            self.ledger.borrow_mut().bound_array_buffer = buffer;
        }
    }

    fn buffer_data_u8_slice(&self, target: u32, data: &[u8], _usage: u32) {
        if target != glow::ARRAY_BUFFER {
            return;
        }
        let mut ledger = self.ledger.borrow_mut();
        let bound = ledger.bound_array_buffer.expect("no buffer bound");
        let record = ledger.buffers.get_mut(&bound).expect("unknown buffer");
        record.len = data.len();
    }

    fn delete_buffer(&self, buffer: BufferId) {
        let mut ledger = self.ledger.borrow_mut();
        let record = ledger.buffers.get_mut(&buffer).expect("unknown buffer");
        assert!(record.alive, "double delete of buffer");
        record.alive = false;
    }

    fn get_attrib_location(&self, _program: ProgramId, name: &str) -> Option<u32> {
        if self.missing_attribs.borrow().contains(name) {
            None
        } else {
            Some(0)
        }
    }

    fn get_uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformId> {
        if self.missing_uniforms.borrow().contains(name) {
            None
        } else {
            Some(UniformId {
                program,
                name: name.to_owned(),
            })
        }
    }

    fn uniform_1_f32(&self, location: Option<&UniformId>, x: f32) {
        // A `None` location is a legal no-op: the driver dropped the uniform.
        if let Some(location) = location {
            self.ledger.borrow_mut().uniforms.insert(
                (location.program, location.name.clone()),
                UniformValue::F32(x),
            );
        }
    }

    fn uniform_1_i32(&self, location: Option<&UniformId>, x: i32) {
        if let Some(location) = location {
            self.ledger.borrow_mut().uniforms.insert(
                (location.program, location.name.clone()),
                UniformValue::I32(x),
            );
        }
    }

    fn uniform_matrix_4_f32_slice(&self, location: Option<&UniformId>, _transpose: bool, v: &[f32]) {
        assert_eq!(v.len(), 16, "mat4 uniform expects 16 floats");
        if let Some(location) = location {
            let mut value = [0.0f32; 16];
            value.copy_from_slice(v);
            self.ledger.borrow_mut().uniforms.insert(
                (location.program, location.name.clone()),
                UniformValue::Mat4(value),
            );
        }
    }

    fn active_texture(&self, unit: u32) {
        self.ledger.borrow_mut().active_unit = unit;
    }

    fn bind_texture(&self, _target: u32, texture: Option<TextureId>) {
        let mut ledger = self.ledger.borrow_mut();
        let unit = ledger.active_unit;
        match texture {
            Some(texture) => {
                assert!(ledger.textures.contains(&texture), "bind of unknown texture");
                ledger.texture_bindings.insert(unit, texture);
            }
            None => {
                ledger.texture_bindings.remove(&unit);
            }
        }
    }

    fn tex_parameter_i32(&self, target: u32, parameter: u32, value: i32) {
        self.ledger
            .borrow_mut()
            .tex_parameters
            .push((target, parameter, value));
    }

    fn enable_vertex_attrib_array(&self, index: u32) {
        self.ledger.borrow_mut().enabled_attribs.insert(index);
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
        self.ledger
            .borrow_mut()
            .attrib_pointers
            .push((index, size, data_type, normalized, stride, offset));
    }

    fn enable(&self, parameter: u32) {
        self.ledger.borrow_mut().enabled_caps.insert(parameter);
    }

    fn depth_func(&self, func: u32) {
        self.ledger.borrow_mut().depth_func = Some(func);
    }

    fn draw_arrays(&self, mode: u32, first: i32, count: i32) {
        let mut ledger = self.ledger.borrow_mut();
        let program = ledger.current_program;
        let uniforms = program
            .map(|current| {
                ledger
                    .uniforms
                    .iter()
                    .filter(|((owner, _), _)| *owner == current)
                    .map(|((_, name), value)| (name.clone(), *value))
                    .collect()
            })
            .unwrap_or_default();
        let call = DrawCall {
            mode,
            first,
            count,
            program,
            texture: ledger.texture_bindings.get(&glow::TEXTURE0).copied(),
            array_buffer: ledger.bound_array_buffer,
            depth_test: ledger.enabled_caps.contains(&glow::DEPTH_TEST),
            depth_func: ledger.depth_func,
            uniforms,
        };
        ledger.draw_calls.push(call);
    }
}
