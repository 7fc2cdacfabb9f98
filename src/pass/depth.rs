use std::any::Any;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::{Pass, PassState};
use crate::camera::SharedCamera;
use crate::error::{ComposeError, RenderError};
use crate::material::{ShaderMaterial, UniformRegistry, UniformValue};
use crate::render_target::{RenderTarget, TargetFormat, TargetOptions};
use crate::renderer::{Renderer, Scene};
use crate::shader::chunks;
use crate::texture::TextureRef;

/// How linear depth is stored in the color texture.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthPacking {
    /// `1 - depth` in every color channel.
    #[default]
    Basic,
    /// Depth spread over four 8-bit channels for extra precision.
    Rgba,
}

/// Renders scene depth into a color texture at a resolution scale.
pub struct DepthPass {
    state: PassState,
    scene: Rc<dyn Scene>,
    camera: SharedCamera,
    resolution_scale: f32,
    depth_target: RenderTarget,
    packed_target: RenderTarget,
    material: ShaderMaterial,
}

impl DepthPass {
    pub fn new(scene: Rc<dyn Scene>, camera: SharedCamera, packing: DepthPacking) -> Self {
        let uniforms = UniformRegistry::new()
            .with("t_depth", UniformValue::DepthTexture(None))
            .with("camera_near", 0.1f32)
            .with("camera_far", 1000.0f32);
        let mut material = ShaderMaterial::new("DepthPass.Packing", chunks::DEPTH_PACKING_FRAGMENT, uniforms);
        if packing == DepthPacking::Rgba {
            material.set_define("RGBA_PACKING", "");
        }
        let depth_options = TargetOptions {
            depth_buffer: true,
            ..Default::default()
        };
        Self {
            state: PassState::in_place(),
            scene,
            camera,
            resolution_scale: 1.0,
            depth_target: RenderTarget::new("DepthPass.Scene", 1, 1, depth_options),
            packed_target: RenderTarget::new("DepthPass.Packed", 1, 1, TargetOptions::color(TargetFormat::Rgba8Unorm)),
            material,
        }
    }

    pub fn with_resolution_scale(mut self, scale: f32) -> Self {
        self.resolution_scale = scale;
        self
    }

    pub fn packing(&self) -> DepthPacking {
        if self.material.defines().contains_key("RGBA_PACKING") {
            DepthPacking::Rgba
        } else {
            DepthPacking::Basic
        }
    }

    /// Packed depth, ready to be sampled by later passes.
    pub fn texture(&self) -> TextureRef {
        self.packed_target.texture()
    }

    pub fn target(&self) -> &RenderTarget {
        &self.packed_target
    }
}

impl Pass for DepthPass {
    fn name(&self) -> &str {
        "DepthPass"
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

    fn set_size(&mut self, width: u32, height: u32) {
        let width = (width as f32 * self.resolution_scale).round() as u32;
        let height = (height as f32 * self.resolution_scale).round() as u32;
        self.depth_target.set_size(width, height);
        self.packed_target.set_size(width, height);
    }

    fn render(
        &mut self,
        renderer: &mut dyn Renderer,
        _write: &RenderTarget,
        _read: &RenderTarget,
        _delta: f32,
        _mask_active: bool,
    ) -> Result<(), RenderError> {
        self.state.check_live(self.name())?;
        let camera = *self.camera.borrow();
        renderer.render_scene(self.scene.as_ref(), &camera, Some(&self.depth_target), true, None)?;

        self.material
            .set_uniform("t_depth", UniformValue::DepthTexture(self.depth_target.depth_texture()));
        self.material.set_uniform("camera_near", camera.near);
        self.material.set_uniform("camera_far", camera.far);
        let output = (!self.state.render_to_screen).then_some(&self.packed_target);
        renderer.draw_fullscreen(&self.material, output, true)
    }

    fn dispose(&mut self, renderer: &mut dyn Renderer) {
        renderer.release_target(self.depth_target.id());
        renderer.release_target(self.packed_target.id());
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
    use crate::testing::{camera, EmptyScene, RecordingRenderer};

    #[test]
    fn renders_scene_then_packs_at_scaled_size() {
        let mut renderer = RecordingRenderer::new(100, 50);
        let buffer = RenderTarget::new("buffer", 100, 50, TargetOptions::default());
        let mut pass = DepthPass::new(Rc::new(EmptyScene), camera(), DepthPacking::Rgba).with_resolution_scale(0.5);
        pass.initialize(&mut renderer).unwrap();
        pass.set_size(100, 50);
        pass.render(&mut renderer, &buffer, &buffer, 0.0, false).unwrap();

        let draw = &renderer.draws()[0];
        assert_eq!(draw.target_size, Some((50, 25)));
        assert!(matches!(draw.texture("t_depth"), Some(TextureRef::Depth(_))));
        assert!(renderer.compiled_sources()[0].contains("pack_depth(clamp"));
        assert_eq!(pass.packing(), DepthPacking::Rgba);
    }
}
