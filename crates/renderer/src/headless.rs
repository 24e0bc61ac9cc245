//! In-memory [`GraphicsDevice`] with no GPU behind it. Buffers live in host
//! vectors, programs carry a staged introspection interface, and every
//! uniform upload and draw call is recorded. Used by the test suites and by
//! tooling that needs the mesh/effect layer without a context.

use std::collections::{HashMap, HashSet};

use corelib::{GfxError, GfxResult};

use crate::device::{
    AttributeBinding, AttributeInfo, BufferId, BufferTarget, GraphicsDevice, IndexFormat,
    LayoutId, ProgramId, ShaderId, ShaderStage, UniformInfo,
};

/// One recorded uniform upload.
#[derive(Clone, Debug, PartialEq)]
pub enum UniformUpload {
    Floats {
        location: u32,
        components: u8,
        count: u32,
        data: Vec<f32>,
    },
    Matrices {
        location: u32,
        count: u32,
        data: Vec<f32>,
    },
    Int {
        location: u32,
        value: i32,
    },
}

impl UniformUpload {
    pub fn location(&self) -> u32 {
        match *self {
            UniformUpload::Floats { location, .. }
            | UniformUpload::Matrices { location, .. }
            | UniformUpload::Int { location, .. } => location,
        }
    }
}

/// One recorded indexed draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawCall {
    pub layout: LayoutId,
    pub first_index: u32,
    pub index_count: u32,
    pub format: IndexFormat,
}

#[derive(Default)]
struct ProgramRecord {
    attributes: Vec<AttributeInfo>,
    uniforms: Vec<UniformInfo>,
    attached: Vec<ShaderId>,
    link_count: u32,
    bound_attributes: HashMap<String, u32>,
    bound_frag_outputs: HashMap<String, u32>,
}

/// Headless device state. Fields that tests inspect are public.
pub struct HeadlessDevice {
    next_id: u32,
    buffers: HashMap<BufferId, Vec<u8>>,
    layouts: HashMap<LayoutId, Vec<AttributeBinding>>,
    shaders: HashSet<ShaderId>,
    programs: HashMap<ProgramId, ProgramRecord>,
    staged_interface: Option<(Vec<AttributeInfo>, Vec<UniformInfo>)>,

    /// Fail compilation of this stage, once.
    pub fail_compile: Option<ShaderStage>,
    /// Fail the next `link_program` call, once.
    pub fail_next_link: bool,
    /// Simultaneous render-target count reported to `bind_attributes`.
    pub max_draw_buffers: u32,

    pub active_program: Option<ProgramId>,
    pub uniform_uploads: Vec<UniformUpload>,
    pub draw_calls: Vec<DrawCall>,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            buffers: HashMap::new(),
            layouts: HashMap::new(),
            shaders: HashSet::new(),
            programs: HashMap::new(),
            staged_interface: None,
            fail_compile: None,
            fail_next_link: false,
            max_draw_buffers: 4,
            active_program: None,
            uniform_uploads: Vec::new(),
            draw_calls: Vec::new(),
        }
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Interface the next created program will report from introspection.
    pub fn stage_interface(&mut self, attributes: Vec<AttributeInfo>, uniforms: Vec<UniformInfo>) {
        self.staged_interface = Some((attributes, uniforms));
    }

    /// Bytes last uploaded to `buffer`, if any.
    pub fn buffer_data(&self, buffer: BufferId) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(Vec::as_slice)
    }

    pub fn layout_bindings(&self, layout: LayoutId) -> Option<&[AttributeBinding]> {
        self.layouts.get(&layout).map(Vec::as_slice)
    }

    pub fn link_count(&self, program: ProgramId) -> u32 {
        self.programs.get(&program).map_or(0, |p| p.link_count)
    }

    pub fn bound_attribute(&self, program: ProgramId, name: &str) -> Option<u32> {
        self.programs
            .get(&program)
            .and_then(|p| p.bound_attributes.get(name).copied())
    }

    pub fn bound_frag_output(&self, program: ProgramId, name: &str) -> Option<u32> {
        self.programs
            .get(&program)
            .and_then(|p| p.bound_frag_outputs.get(name).copied())
    }

    /// Live device objects of every kind; zero means nothing leaked.
    pub fn live_objects(&self) -> usize {
        self.buffers.len() + self.layouts.len() + self.shaders.len() + self.programs.len()
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn create_buffer(&mut self, _target: BufferTarget) -> GfxResult<BufferId> {
        let id = BufferId(self.next_id());
        self.buffers.insert(id, Vec::new());
        Ok(id)
    }

    fn upload_buffer(
        &mut self,
        buffer: BufferId,
        _target: BufferTarget,
        data: &[u8],
    ) -> GfxResult<()> {
        let slot = self
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| GfxError::Device(format!("upload to unknown buffer {:?}", buffer)))?;
        *slot = data.to_vec();
        Ok(())
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(&buffer);
    }

    fn create_vertex_layout(
        &mut self,
        _vertex: BufferId,
        _index: BufferId,
        bindings: &[AttributeBinding],
    ) -> GfxResult<LayoutId> {
        let id = LayoutId(self.next_id());
        self.layouts.insert(id, bindings.to_vec());
        Ok(id)
    }

    fn delete_vertex_layout(&mut self, layout: LayoutId) {
        self.layouts.remove(&layout);
    }

    fn draw_indexed(
        &mut self,
        layout: LayoutId,
        first_index: u32,
        index_count: u32,
        format: IndexFormat,
    ) {
        self.draw_calls.push(DrawCall {
            layout,
            first_index,
            index_count,
            format,
        });
    }

    fn compile_shader(&mut self, stage: ShaderStage, _source: &str) -> GfxResult<ShaderId> {
        if self.fail_compile == Some(stage) {
            self.fail_compile = None;
            return Err(GfxError::ShaderCompile {
                stage: stage.name(),
            });
        }
        let id = ShaderId(self.next_id());
        self.shaders.insert(id);
        Ok(id)
    }

    fn delete_shader(&mut self, shader: ShaderId) {
        self.shaders.remove(&shader);
    }

    fn create_program(&mut self) -> GfxResult<ProgramId> {
        let id = ProgramId(self.next_id());
        let (attributes, uniforms) = self.staged_interface.take().unwrap_or_default();
        self.programs.insert(
            id,
            ProgramRecord {
                attributes,
                uniforms,
                ..Default::default()
            },
        );
        Ok(id)
    }

    fn attach_shader(&mut self, program: ProgramId, shader: ShaderId) {
        if let Some(p) = self.programs.get_mut(&program) {
            p.attached.push(shader);
        }
    }

    fn link_program(&mut self, program: ProgramId) -> GfxResult<()> {
        if self.fail_next_link {
            self.fail_next_link = false;
            return Err(GfxError::ProgramLink);
        }
        if let Some(p) = self.programs.get_mut(&program) {
            p.link_count += 1;
        }
        Ok(())
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        if self.active_program == Some(program) {
            self.active_program = None;
        }
    }

    fn use_program(&mut self, program: ProgramId) {
        self.active_program = Some(program);
    }

    fn active_attributes(&self, program: ProgramId) -> Vec<AttributeInfo> {
        self.programs
            .get(&program)
            .map(|p| p.attributes.clone())
            .unwrap_or_default()
    }

    fn active_uniforms(&self, program: ProgramId) -> Vec<UniformInfo> {
        self.programs
            .get(&program)
            .map(|p| p.uniforms.clone())
            .unwrap_or_default()
    }

    fn attribute_location(&self, program: ProgramId, name: &str) -> Option<u32> {
        self.programs
            .get(&program)?
            .attributes
            .iter()
            .find(|a| a.name == name)
            .and_then(|a| a.location)
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<u32> {
        self.programs
            .get(&program)?
            .uniforms
            .iter()
            .find(|u| u.name == name)
            .and_then(|u| u.location)
    }

    fn bind_attribute_location(&mut self, program: ProgramId, slot: u32, name: &str) {
        if let Some(p) = self.programs.get_mut(&program) {
            p.bound_attributes.insert(name.to_owned(), slot);
        }
    }

    fn bind_frag_data_location(&mut self, program: ProgramId, slot: u32, name: &str) {
        if let Some(p) = self.programs.get_mut(&program) {
            p.bound_frag_outputs.insert(name.to_owned(), slot);
        }
    }

    fn max_draw_buffers(&self) -> u32 {
        self.max_draw_buffers
    }

    fn set_uniform_floats(&mut self, location: u32, components: u8, count: u32, data: &[f32]) {
        self.uniform_uploads.push(UniformUpload::Floats {
            location,
            components,
            count,
            data: data.to_vec(),
        });
    }

    fn set_uniform_matrices(&mut self, location: u32, count: u32, data: &[f32]) {
        self.uniform_uploads.push(UniformUpload::Matrices {
            location,
            count,
            data: data.to_vec(),
        });
    }

    fn set_uniform_int(&mut self, location: u32, value: i32) {
        self.uniform_uploads.push(UniformUpload::Int { location, value });
    }
}
