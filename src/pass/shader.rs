use std::any::Any;

use super::{Pass, PassState};
use crate::error::{ComposeError, RenderError};
use crate::material::{ShaderMaterial, UniformValue};
use crate::render_target::RenderTarget;
use crate::renderer::Renderer;

/// Draws any [`ShaderMaterial`] over the full screen.
///
/// The read buffer is bound to the texture uniform named by `texture_id`
/// (`t_diffuse` unless overridden). Materials without that uniform simply ignore
/// the input.
pub struct ShaderPass {
    state: PassState,
    material: ShaderMaterial,
    texture_id: String,
}

impl ShaderPass {
    pub fn new(material: ShaderMaterial) -> Self {
        Self {
            state: PassState::default(),
            material,
            texture_id: "t_diffuse".to_string(),
        }
    }

    pub fn with_texture_id(mut self, texture_id: impl Into<String>) -> Self {
        self.texture_id = texture_id.into();
        self
    }

    pub fn material(&self) -> &ShaderMaterial {
        &self.material
    }

    pub fn material_mut(&mut self) -> &mut ShaderMaterial {
        &mut self.material
    }
}

impl Pass for ShaderPass {
    fn name(&self) -> &str {
        self.material.label()
    }

    fn state(&self) -> &PassState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut PassState {
        &mut self.state
    }

    fn initialize(&mut self, renderer: &mut dyn Renderer) -> Result<(), ComposeError> {
        renderer.compile(&self.material)
    }

    fn render(
        &mut self,
        renderer: &mut dyn Renderer,
        write: &RenderTarget,
        read: &RenderTarget,
        _delta: f32,
        _mask_active: bool,
    ) -> Result<(), RenderError> {
        self.state.check_live(self.name())?;
        if self.material.uniforms().contains(&self.texture_id) {
            self.material
                .set_uniform(&self.texture_id, UniformValue::Texture(Some(read.texture())));
        }
        renderer.draw_fullscreen(&self.material, self.state.output(write), self.state.clear)
    }

    fn dispose(&mut self, renderer: &mut dyn Renderer) {
        renderer.release_material(self.material.id());
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
    use crate::material::UniformRegistry;
    use crate::render_target::TargetOptions;
    use crate::shader::chunks;
    use crate::testing::RecordingRenderer;

    #[test]
    fn binds_read_buffer_and_writes_write_buffer() {
        let mut renderer = RecordingRenderer::new(4, 4);
        let read = RenderTarget::new("read", 4, 4, TargetOptions::default());
        let write = RenderTarget::new("write", 4, 4, TargetOptions::default());
        let mut pass = ShaderPass::new(chunks::copy_material("copy"));
        pass.initialize(&mut renderer).unwrap();
        pass.render(&mut renderer, &write, &read, 0.0, false).unwrap();

        let draws = renderer.draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].target, Some(write.id()));
        assert_eq!(draws[0].texture("t_diffuse"), Some(read.texture()));
    }

    #[test]
    fn custom_texture_id_and_screen_output() {
        let mut renderer = RecordingRenderer::new(4, 4);
        let read = RenderTarget::new("read", 4, 4, TargetOptions::default());
        let material = ShaderMaterial::new(
            "tint",
            "@fragment fn fs(in: VertexOutput) -> @location(0) vec4f { return textureSampleLevel(t_source, s_texture, in.uv, 0.0); }",
            UniformRegistry::new().with("t_source", UniformValue::Texture(None)),
        );
        let mut pass = ShaderPass::new(material).with_texture_id("t_source");
        pass.state_mut().render_to_screen = true;
        pass.render(&mut renderer, &read, &read, 0.0, false).unwrap();

        let draws = renderer.draws();
        assert_eq!(draws[0].target, None);
        assert_eq!(draws[0].texture("t_source"), Some(read.texture()));
    }
}
