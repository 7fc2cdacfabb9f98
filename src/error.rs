//! Error types for effect composition and rendering.
//!
//! Failures fall into two groups. [`ComposeError`] covers structural problems that
//! are detected while a pipeline is being assembled or compiled (name collisions,
//! missing depth input, malformed shader chunks, invalid texture data). These are
//! reported synchronously by `add_pass`, `recompile` and effect constructors and
//! are never deferred to the first frame.
//!
//! [`RenderError`] covers runtime failures while a frame is being recorded, such as
//! rendering through a composer that has already been disposed.

use crate::render_target::TargetId;

/// Configuration and compile-time failures.
#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error("effect `{effect}` is registered more than once in pass `{pass}`")]
    DuplicateEffect { pass: String, effect: String },

    #[error("effect `{effect}` requires a depth texture but pass `{pass}` has none bound")]
    MissingDepthTexture { pass: String, effect: String },

    #[error("effect `{effect}` uses `{name}` for more than one declaration")]
    NameCollision { effect: String, name: String },

    #[error("effect `{0}` defines neither `mainImage` nor `mainUv`")]
    MissingEntryPoint(String),

    #[error("preprocessor error in `{source_label}` at line {line}: {reason}")]
    Preprocess {
        source_label: String,
        line: usize,
        reason: String,
    },

    #[error("invalid texture data: {0}")]
    InvalidTexture(String),

    #[error("shader compilation failed for `{label}`: {message}")]
    ShaderCompilation { label: String, message: String },
}

/// Failures raised while rendering a frame.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("the composer has been disposed")]
    Disposed,

    #[error("pass `{0}` has been disposed")]
    PassDisposed(String),

    #[error("render target {0:?} has no storage")]
    MissingTarget(TargetId),

    #[error("no output surface is bound")]
    NoOutput,

    #[error(transparent)]
    Compose(#[from] ComposeError),
}
