//! Scheduled units of rendering work.
//!
//! A [`Pass`] reads the composer's current read buffer and writes the write buffer,
//! or the output surface when it is the final pass. The composer swaps the two
//! buffers after every pass whose state asks for it.
//!
//! Every pass has to provide [`Pass::render`]; there is no default body to fall
//! back on.

mod clear;
mod depth;
mod mask;
mod render;
mod save;
mod shader;

pub use clear::ClearPass;
pub use depth::{DepthPacking, DepthPass};
pub use mask::{ClearMaskPass, MaskPass};
pub use render::RenderPass;
pub use save::SavePass;
pub use shader::ShaderPass;

use std::any::Any;

use crate::error::{ComposeError, RenderError};
use crate::render_target::RenderTarget;
use crate::renderer::Renderer;
use crate::texture::TextureRef;

/// Flags shared by every pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PassState {
    pub enabled: bool,
    /// Swap read and write buffers after this pass.
    pub needs_swap: bool,
    /// Clear the output before rendering.
    pub clear: bool,
    /// Render to the output surface instead of the write buffer.
    pub render_to_screen: bool,
    pub disposed: bool,
}

impl Default for PassState {
    fn default() -> Self {
        Self {
            enabled: true,
            needs_swap: true,
            clear: false,
            render_to_screen: false,
            disposed: false,
        }
    }
}

impl PassState {
    /// State of a pass that works in place and never swaps.
    pub fn in_place() -> Self {
        Self {
            needs_swap: false,
            ..Default::default()
        }
    }

    /// Fails once the pass has been disposed.
    pub fn check_live(&self, name: &str) -> Result<(), RenderError> {
        if self.disposed {
            return Err(RenderError::PassDisposed(name.to_string()));
        }
        Ok(())
    }

    /// Where the pass should draw: `None` is the output surface.
    pub fn output<'a>(&self, write: &'a RenderTarget) -> Option<&'a RenderTarget> {
        (!self.render_to_screen).then_some(write)
    }
}

/// How a pass affects the composer's stencil mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaskRole {
    None,
    /// Enables the mask for subsequent passes.
    Begin,
    /// Disables the mask.
    End,
}

pub trait Pass: Any {
    fn name(&self) -> &str;

    fn state(&self) -> &PassState;
    fn state_mut(&mut self) -> &mut PassState;

    fn mask_role(&self) -> MaskRole {
        MaskRole::None
    }

    /// Whether the composer should bind its depth texture before initialization.
    fn needs_depth_texture(&self) -> bool {
        false
    }

    fn set_depth_texture(&mut self, _texture: Option<TextureRef>) {}

    /// Compiles programs and prepares resources. Called once when the pass is added
    /// to a composer; configuration problems surface here.
    fn initialize(&mut self, _renderer: &mut dyn Renderer) -> Result<(), ComposeError> {
        Ok(())
    }

    /// Called with the composer's base size whenever it changes.
    fn set_size(&mut self, _width: u32, _height: u32) {}

    fn render(
        &mut self,
        renderer: &mut dyn Renderer,
        write: &RenderTarget,
        read: &RenderTarget,
        delta: f32,
        mask_active: bool,
    ) -> Result<(), RenderError>;

    /// Releases owned resources. Rendering afterwards fails.
    fn dispose(&mut self, _renderer: &mut dyn Renderer) {
        self.state_mut().disposed = true;
    }

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
