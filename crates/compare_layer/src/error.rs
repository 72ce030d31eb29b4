//! Error types raised out of layer attachment.

use std::fmt;

use thiserror::Error;

/// The two shader stages of the overlay program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub(crate) fn gl_type(self) -> u32 {
        match self {
            Self::Vertex => glow::VERTEX_SHADER,
            Self::Fragment => glow::FRAGMENT_SHADER,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vertex => f.write_str("vertex"),
            Self::Fragment => f.write_str("fragment"),
        }
    }
}

/// Failure while building the overlay's GPU program.
///
/// Compile and link variants carry the driver's diagnostic text verbatim.
#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("failed to create {stage} shader object: {reason}")]
    CreateShader { stage: ShaderStage, reason: String },

    #[error("{stage} shader failed to compile: {log}")]
    Compile { stage: ShaderStage, log: String },

    #[error("failed to create program object: {0}")]
    CreateProgram(String),

    #[error("shader program failed to link: {log}")]
    Link { log: String },

    #[error("failed to create vertex buffer: {0}")]
    CreateBuffer(String),

    #[error("attribute `{0}` missing from linked program")]
    MissingAttribute(&'static str),
}

/// Failure while attaching the layer to a host map.
///
/// Any of these leaves the layer detached, with everything registered up to
/// the failure point unwound. No retries happen internally; the caller fixes
/// the input and attaches again.
#[derive(Debug, Error)]
pub enum AttachError {
    #[error("layer is already attached to a map")]
    AlreadyAttached,

    #[error("overlay source was rejected by the host: {0}")]
    Source(String),

    #[error("host exposes no tile cache for source `{0}`")]
    NoTileCache(String),

    #[error(transparent)]
    Program(#[from] ProgramError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_error_names_the_failed_stage() {
        let err = ProgramError::Compile {
            stage: ShaderStage::Fragment,
            log: "0:1: bad token".into(),
        };
        let message = err.to_string();
        assert!(message.contains("fragment"));
        assert!(message.contains("0:1: bad token"));
    }

    #[test]
    fn attach_error_forwards_program_diagnostics() {
        let err = AttachError::from(ProgramError::Link {
            log: "unresolved varying".into(),
        });
        assert!(err.to_string().contains("unresolved varying"));
    }
}
