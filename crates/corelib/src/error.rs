//! Error enum shared by the renderer-facing APIs.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GfxError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Compile status only; the driver's info log is deliberately not
    /// retrieved at this layer.
    #[error("{stage} shader failed to compile")]
    ShaderCompile { stage: &'static str },

    #[error("program failed to link")]
    ProgramLink,

    #[error("buffer allocation failed: {0}")]
    BufferAlloc(String),

    #[error("mesh parse error: {0}")]
    MeshParse(String),

    #[error("uniform name '{name}' exceeds {max} bytes")]
    UniformNameTooLong { name: String, max: usize },

    #[error("uniform '{name}' has unsupported type {ty}")]
    UnsupportedUniformType { name: String, ty: String },

    #[error("uniform '{0}' is already registered")]
    DuplicateUniform(String),

    #[error("device error: {0}")]
    Device(String),
}

pub type GfxResult<T> = Result<T, GfxError>;
