//! Graphics-device seam: the exact API surface the mesh and effect layers
//! consume from the underlying graphics context. A real backend wraps the
//! native API; [`crate::headless::HeadlessDevice`] is the in-memory
//! implementation used for tests and tooling.

use corelib::GfxResult;

/// Handle to a device buffer object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferId(pub u32);

/// Handle to a compiled shader stage object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ShaderId(pub u32);

/// Handle to a linked shader program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u32);

/// Handle to a vertex layout/binding-state object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LayoutId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferTarget {
    Vertex,
    Index,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

impl ShaderStage {
    pub const fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Compute => "compute",
        }
    }
}

/// Index element width. Chosen from the mesh vertex count: u16 below the
/// 65535-vertex threshold, u32 from there on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexFormat {
    U16,
    U32,
}

impl IndexFormat {
    #[inline]
    pub const fn byte_size(self) -> u32 {
        match self {
            IndexFormat::U16 => 2,
            IndexFormat::U32 => 4,
        }
    }
}

/// Component storage of one bound vertex attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttribFormat {
    F32,
    /// Unsigned byte, normalized to [0, 1] on fetch.
    U8Norm,
}

/// One attribute binding inside a vertex layout object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttributeBinding {
    pub slot: u32,
    pub components: u8,
    pub format: AttribFormat,
    pub stride: u32,
    pub offset: u32,
}

/// Shader-reported uniform types the effect layer can classify. Anything
/// outside the float/int families is rejected at registration time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UniformType {
    Float,
    FloatVec2,
    FloatVec3,
    FloatVec4,
    FloatMat2,
    FloatMat3,
    FloatMat4,
    Int,
    IntVec2,
    IntVec3,
    IntVec4,
    UInt,
    Bool,
    Sampler2D,
    SamplerCube,
    Image2D,
}

/// Active vertex attribute as reported by program introspection.
#[derive(Clone, Debug)]
pub struct AttributeInfo {
    pub name: String,
    /// Binding location, `None` when the program reports an invalid one.
    pub location: Option<u32>,
}

/// Active uniform as reported by program introspection. `size` is the
/// element count (1 for non-arrays).
#[derive(Clone, Debug)]
pub struct UniformInfo {
    pub name: String,
    pub size: u32,
    pub ty: UniformType,
    pub location: Option<u32>,
}

/// The graphics API consumed by this layer: buffer storage, vertex layout
/// objects, shader compilation/link, program introspection and uniform
/// upload. All calls assume exclusive access to a single current context.
pub trait GraphicsDevice {
    // Buffers.
    fn create_buffer(&mut self, target: BufferTarget) -> GfxResult<BufferId>;
    fn upload_buffer(&mut self, buffer: BufferId, target: BufferTarget, data: &[u8])
    -> GfxResult<()>;
    fn delete_buffer(&mut self, buffer: BufferId);

    // Vertex layout objects.
    fn create_vertex_layout(
        &mut self,
        vertex: BufferId,
        index: BufferId,
        bindings: &[AttributeBinding],
    ) -> GfxResult<LayoutId>;
    fn delete_vertex_layout(&mut self, layout: LayoutId);
    fn draw_indexed(&mut self, layout: LayoutId, first_index: u32, index_count: u32, format: IndexFormat);

    // Shader objects and programs. `compile_shader` folds the compile-status
    // check in; the driver's info log is not surfaced at this layer.
    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> GfxResult<ShaderId>;
    fn delete_shader(&mut self, shader: ShaderId);
    fn create_program(&mut self) -> GfxResult<ProgramId>;
    fn attach_shader(&mut self, program: ProgramId, shader: ShaderId);
    fn link_program(&mut self, program: ProgramId) -> GfxResult<()>;
    fn delete_program(&mut self, program: ProgramId);
    fn use_program(&mut self, program: ProgramId);

    // Introspection and binding. Attribute/frag-data bindings take effect on
    // the next link.
    fn active_attributes(&self, program: ProgramId) -> Vec<AttributeInfo>;
    fn active_uniforms(&self, program: ProgramId) -> Vec<UniformInfo>;
    fn attribute_location(&self, program: ProgramId, name: &str) -> Option<u32>;
    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<u32>;
    fn bind_attribute_location(&mut self, program: ProgramId, slot: u32, name: &str);
    fn bind_frag_data_location(&mut self, program: ProgramId, slot: u32, name: &str);
    fn max_draw_buffers(&self) -> u32;

    // Uniform upload batches for the currently active program.
    fn set_uniform_floats(&mut self, location: u32, components: u8, count: u32, data: &[f32]);
    fn set_uniform_matrices(&mut self, location: u32, count: u32, data: &[f32]);
    fn set_uniform_int(&mut self, location: u32, value: i32);
}
