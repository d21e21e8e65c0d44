//! Fatal pipeline errors.

use thiserror::Error;

/// Errors that can occur while constructing the pipeline.
///
/// Everything here is fatal: the engine cannot render without the
/// resource that failed, so construction aborts and already-created
/// resources are released by drop. Per-frame degradation (slot pool
/// exhaustion, stale shadow content) is never reported through this
/// type; it is logged and the frame continues.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A configuration value is outside its supported range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Shader module failed validation.
    #[error("shader compilation failed for {stage}: {message}")]
    ShaderCompilation {
        /// Which pipeline stage owned the shader.
        stage: &'static str,
        /// Validation message from the backend.
        message: String,
    },

    /// A render target or texture could not be created.
    #[error("render target creation failed: {0}")]
    TargetCreation(String),

    /// The device does not support a required feature or limit.
    #[error("device limit exceeded: {0}")]
    DeviceLimit(String),
}
