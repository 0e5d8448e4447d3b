//! Error taxonomy for device selection, kernel compilation and sharpening.

use opencl3::error_codes::ClError;
use thiserror::Error;

/// Failures that abort engine construction.
#[derive(Debug, Clone, Error)]
pub enum InitError {
    /// No platform exposes a GPU that scores above zero.
    #[error("no compatible OpenCL GPU found: {0}")]
    NoDevice(String),

    /// The selected device refused to create a context or command queue.
    #[error("failed to set up the selected device ({code}): {message}")]
    Device { code: i32, message: String },

    /// The CAS kernel failed to build. `log` holds the compiler diagnostics.
    #[error("CAS kernel failed to compile: {log}")]
    Compile { log: String },
}

impl InitError {
    pub(crate) fn device(err: ClError) -> Self {
        InitError::Device {
            code: err.0,
            message: err.to_string(),
        }
    }
}

/// Errors surfaced by the sharpening engine.
#[derive(Debug, Clone, Error)]
pub enum CasError {
    #[error("initialization failed: {0}")]
    Initialization(#[from] InitError),

    /// `sharpen` was called before any image was supplied.
    #[error("no image has been supplied")]
    NoImage,

    /// The pixel slice or dimensions handed to `supply_image` are unusable.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// Device memory for the texture or output buffers could not be allocated.
    #[error("device allocation failed ({code}): {message}")]
    Allocation { code: i32, message: String },

    /// Copying the source pixels into the device texture failed.
    #[error("image upload failed ({code}): {message}")]
    Upload { code: i32, message: String },

    /// Enqueue, execution or copy-back of the CAS kernel failed.
    #[error("CAS kernel execution failed ({code}): {message}")]
    KernelExecution { code: i32, message: String },
}

impl CasError {
    pub(crate) fn allocation(err: ClError) -> Self {
        CasError::Allocation {
            code: err.0,
            message: err.to_string(),
        }
    }

    pub(crate) fn upload(err: ClError) -> Self {
        CasError::Upload {
            code: err.0,
            message: err.to_string(),
        }
    }

    pub(crate) fn execution(err: ClError) -> Self {
        CasError::KernelExecution {
            code: err.0,
            message: err.to_string(),
        }
    }

    /// Raw OpenCL status code, when the error came from the device layer.
    pub fn device_code(&self) -> Option<i32> {
        match self {
            CasError::Allocation { code, .. }
            | CasError::Upload { code, .. }
            | CasError::KernelExecution { code, .. } => Some(*code),
            CasError::Initialization(InitError::Device { code, .. }) => Some(*code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CasError>;
