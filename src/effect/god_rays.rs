use std::any::Any;

use glam::{Vec2, Vec3};

use super::{scaled_size, Effect, EffectCore};
use crate::camera::SharedCamera;
use crate::error::{ComposeError, RenderError};
use crate::material::{ShaderMaterial, UniformRegistry, UniformValue};
use crate::render_target::{RenderTarget, TargetOptions};
use crate::renderer::Renderer;
use crate::shader::{chunks, BlendFunction};

const FRAGMENT: &str = include_str!("shaders/god_rays.wgsl");
const BLUR_FRAGMENT: &str = include_str!("shaders/god_rays_blur.wgsl");

/// Light shafts radiating from a light source in world space.
///
/// Bright areas of the input are extracted into a reduced resolution mask and
/// blurred radially towards the projected light position. The rays fade out as
/// the light leaves the screen and vanish when it is behind the camera.
pub struct GodRaysEffect {
    core: EffectCore,
    camera: SharedCamera,
    light_position: Vec3,
    resolution_scale: f32,
    aspect: f32,
    mask: ShaderMaterial,
    blur: ShaderMaterial,
    mask_target: RenderTarget,
    blur_target: RenderTarget,
}

impl GodRaysEffect {
    pub fn new(camera: SharedCamera, light_position: Vec3) -> Self {
        let uniforms = UniformRegistry::new()
            .with("t_god_rays", UniformValue::Texture(None))
            .with("visibility", 0.0f32);
        let blur = ShaderMaterial::new(
            "GodRaysEffect.Blur",
            BLUR_FRAGMENT,
            UniformRegistry::new()
                .with("t_diffuse", UniformValue::Texture(None))
                .with("light_position", Vec2::splat(0.5))
                .with("density", 0.96f32)
                .with("decay", 0.93f32)
                .with("weight", 0.4f32)
                .with("exposure", 0.6f32),
        )
        .with_define("SAMPLES", "60");
        Self {
            core: EffectCore::new("god_rays", FRAGMENT)
                .with_uniforms(uniforms)
                .with_blend(BlendFunction::Screen),
            camera,
            light_position,
            resolution_scale: 0.5,
            aspect: 1.0,
            mask: chunks::luminance_material("GodRaysEffect.Mask", 0.8, 0.1, true),
            blur,
            mask_target: RenderTarget::new("GodRaysEffect.Mask", 1, 1, TargetOptions::default()),
            blur_target: RenderTarget::new("GodRaysEffect.Blur", 1, 1, TargetOptions::default()),
        }
    }

    pub fn with_resolution_scale(mut self, scale: f32) -> Self {
        self.resolution_scale = scale.max(f32::EPSILON);
        self
    }

    pub fn light_position(&self) -> Vec3 {
        self.light_position
    }

    pub fn set_light_position(&mut self, position: Vec3) {
        self.light_position = position;
    }

    /// Number of radial samples. Requires a recompile of the blur program.
    pub fn set_samples(&mut self, samples: u32) {
        self.blur.set_define("SAMPLES", samples.clamp(1, 256).to_string());
    }

    pub fn set_density(&mut self, density: f32) {
        self.blur.set_uniform("density", density);
    }

    pub fn set_decay(&mut self, decay: f32) {
        self.blur.set_uniform("decay", decay);
    }

    pub fn set_weight(&mut self, weight: f32) {
        self.blur.set_uniform("weight", weight);
    }

    pub fn set_exposure(&mut self, exposure: f32) {
        self.blur.set_uniform("exposure", exposure);
    }

    pub fn visibility(&self) -> f32 {
        self.core.float("visibility")
    }
}

/// One inside the screen, falling to zero half a screen outside of it.
fn visibility(light_uv: Vec2) -> f32 {
    let outside = ((light_uv - Vec2::splat(0.5)).abs() - Vec2::splat(0.5))
        .max(Vec2::ZERO)
        .max_element();
    (1.0 - outside * 2.0).clamp(0.0, 1.0)
}

impl Effect for GodRaysEffect {
    fn core(&self) -> &EffectCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EffectCore {
        &mut self.core
    }

    fn initialize(&mut self, renderer: &mut dyn Renderer) -> Result<(), ComposeError> {
        renderer.compile(&self.mask)?;
        renderer.compile(&self.blur)
    }

    fn set_size(&mut self, width: u32, height: u32) {
        self.aspect = width.max(1) as f32 / height.max(1) as f32;
        let (width, height) = scaled_size(width, height, self.resolution_scale);
        self.mask_target.set_size(width, height);
        self.blur_target.set_size(width, height);
    }

    fn update(&mut self, renderer: &mut dyn Renderer, input: &RenderTarget, _delta: f32) -> Result<(), RenderError> {
        let camera = *self.camera.borrow();
        let Some(light_uv) = camera.project_to_uv(self.light_position, self.aspect) else {
            self.core.set_uniform("visibility", 0.0f32);
            return Ok(());
        };
        let visibility = visibility(light_uv);
        self.core.set_uniform("visibility", visibility);
        if visibility <= 0.0 {
            return Ok(());
        }

        self.mask
            .set_uniform("t_diffuse", UniformValue::Texture(Some(input.texture())));
        renderer.draw_fullscreen(&self.mask, Some(&self.mask_target), true)?;

        self.blur
            .set_uniform("t_diffuse", UniformValue::Texture(Some(self.mask_target.texture())));
        self.blur.set_uniform("light_position", light_uv);
        renderer.draw_fullscreen(&self.blur, Some(&self.blur_target), true)?;

        self.core
            .set_uniform("t_god_rays", UniformValue::Texture(Some(self.blur_target.texture())));
        Ok(())
    }

    fn dispose(&mut self, renderer: &mut dyn Renderer) {
        renderer.release_target(self.mask_target.id());
        renderer.release_target(self.blur_target.id());
        renderer.release_material(self.mask.id());
        renderer.release_material(self.blur.id());
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
    use crate::camera::Camera;
    use crate::testing::RecordingRenderer;

    fn effect(light: Vec3) -> (GodRaysEffect, RecordingRenderer, RenderTarget) {
        let camera = Camera::new().at(0.0, 0.0, 5.0).looking_at(0.0, 0.0, 0.0).shared();
        let mut effect = GodRaysEffect::new(camera, light);
        let mut renderer = RecordingRenderer::new(100, 100);
        effect.initialize(&mut renderer).unwrap();
        effect.set_size(100, 100);
        renderer.take_calls();
        (effect, renderer, RenderTarget::new("input", 100, 100, TargetOptions::default()))
    }

    #[test]
    fn visible_light_runs_mask_and_radial_blur() {
        let (mut effect, mut renderer, input) = effect(Vec3::ZERO);
        effect.update(&mut renderer, &input, 0.0).unwrap();

        assert_eq!(effect.visibility(), 1.0);
        let blur = renderer.draws_of("GodRaysEffect.Blur");
        assert_eq!(blur.len(), 1);
        assert_eq!(blur[0].target_size, Some((50, 50)));
        assert_eq!(blur[0].texture("t_diffuse"), Some(effect.mask_target.texture()));
        match blur[0].uniform("light_position") {
            Some(UniformValue::Vec2(uv)) => assert!((*uv - Vec2::splat(0.5)).length() < 1e-4),
            other => panic!("unexpected light position {other:?}"),
        }
    }

    #[test]
    fn light_behind_camera_skips_sub_passes() {
        let (mut effect, mut renderer, input) = effect(Vec3::new(0.0, 0.0, 10.0));
        effect.update(&mut renderer, &input, 0.0).unwrap();
        assert_eq!(effect.visibility(), 0.0);
        assert!(renderer.draws().is_empty());
    }

    #[test]
    fn visibility_fades_off_screen() {
        assert_eq!(visibility(Vec2::new(0.2, 0.9)), 1.0);
        assert!((visibility(Vec2::new(1.25, 0.5)) - 0.5).abs() < 1e-6);
        assert_eq!(visibility(Vec2::new(-1.0, 0.5)), 0.0);
    }
}
