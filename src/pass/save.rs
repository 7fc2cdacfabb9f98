use std::any::Any;

use super::{Pass, PassState};
use crate::error::{ComposeError, RenderError};
use crate::material::{ShaderMaterial, UniformValue};
use crate::render_target::{RenderTarget, TargetOptions};
use crate::renderer::Renderer;
use crate::shader::chunks;
use crate::texture::TextureRef;

/// Copies the read buffer into a target it owns, so later passes can sample the
/// pipeline's intermediate state.
pub struct SavePass {
    state: PassState,
    target: RenderTarget,
    copy: ShaderMaterial,
    /// Follow the composer's size.
    resize: bool,
}

impl SavePass {
    pub fn new(options: TargetOptions) -> Self {
        Self {
            state: PassState::in_place(),
            target: RenderTarget::new("SavePass.Target", 1, 1, options),
            copy: chunks::copy_material("SavePass.Copy"),
            resize: true,
        }
    }

    /// Keeps the saved target at a fixed size.
    pub fn with_fixed_size(mut self, width: u32, height: u32) -> Self {
        self.target.set_size(width, height);
        self.resize = false;
        self
    }

    pub fn target(&self) -> &RenderTarget {
        &self.target
    }

    pub fn texture(&self) -> TextureRef {
        self.target.texture()
    }
}

impl Pass for SavePass {
    fn name(&self) -> &str {
        "SavePass"
    }

    fn state(&self) -> &PassState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut PassState {
        &mut self.state
    }

    fn initialize(&mut self, renderer: &mut dyn Renderer) -> Result<(), ComposeError> {
        renderer.compile(&self.copy)
    }

    fn set_size(&mut self, width: u32, height: u32) {
        if self.resize {
            self.target.set_size(width, height);
        }
    }

    fn render(
        &mut self,
        renderer: &mut dyn Renderer,
        _write: &RenderTarget,
        read: &RenderTarget,
        _delta: f32,
        _mask_active: bool,
    ) -> Result<(), RenderError> {
        self.state.check_live(self.name())?;
        self.copy
            .set_uniform("t_diffuse", UniformValue::Texture(Some(read.texture())));
        renderer.draw_fullscreen(&self.copy, Some(&self.target), self.state.clear)
    }

    fn dispose(&mut self, renderer: &mut dyn Renderer) {
        renderer.release_target(self.target.id());
        renderer.release_material(self.copy.id());
        self.state.disposed = true;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingRenderer;

    #[test]
    fn copies_read_buffer_into_owned_target() {
        let mut renderer = RecordingRenderer::new(16, 16);
        let read = RenderTarget::new("read", 16, 16, TargetOptions::default());
        let mut pass = SavePass::new(TargetOptions::default());
        pass.set_size(16, 16);
        pass.render(&mut renderer, &read, &read, 0.0, false).unwrap();

        let draw = &renderer.draws()[0];
        assert_eq!(draw.target, Some(pass.target().id()));
        assert_eq!(draw.target_size, Some((16, 16)));
        assert_eq!(draw.texture("t_diffuse"), Some(read.texture()));
    }

    #[test]
    fn fixed_size_ignores_resize() {
        let mut pass = SavePass::new(TargetOptions::default()).with_fixed_size(32, 8);
        pass.set_size(800, 600);
        assert_eq!(pass.target().size(), (32, 8));
    }

    #[test]
    fn dispose_releases_target() {
        let mut renderer = RecordingRenderer::new(4, 4);
        let mut pass = SavePass::new(TargetOptions::default());
        pass.dispose(&mut renderer);
        assert_eq!(renderer.released_targets(), vec![pass.target().id()]);
        assert_eq!(renderer.released_materials(), vec![pass.copy.id()]);
    }
}
