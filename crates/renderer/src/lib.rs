//! Mesh storage and effect management over an abstract graphics device.
//!
//! The device itself (context creation, the driver) lives behind the
//! [`device::GraphicsDevice`] trait; this crate owns what sits on top of it:
//! GPU mesh objects filled through a lock/unlock staging discipline, the QM
//! upload path, and effects with a named-uniform registry backed by flat
//! register banks.

mod bank;
pub mod device;
pub mod effect;
pub mod headless;
pub mod mesh;

pub use device::{
    AttribFormat, AttributeBinding, AttributeInfo, BufferId, BufferTarget, GraphicsDevice,
    IndexFormat, LayoutId, ProgramId, ShaderId, ShaderStage, UniformInfo, UniformType,
};
pub use effect::{
    Effect, Uniform, create_compute_effect, create_compute_effect_from_file, create_effect,
    create_effect_from_file,
};
pub use headless::HeadlessDevice;
pub use mesh::{Mesh, create_mesh, load_mesh_from_qm, mesh_from_qm};
