use std::any::Any;

use glam::Vec2;

use super::{scaled_size, Effect, EffectCore};
use crate::error::{ComposeError, RenderError};
use crate::material::{ShaderMaterial, UniformRegistry, UniformValue};
use crate::render_target::{RenderTarget, TargetOptions};
use crate::renderer::Renderer;
use crate::shader::chunks::{self, KernelSize};
use crate::shader::BlendFunction;
use crate::texture::TextureRef;

const FRAGMENT: &str = include_str!("shaders/bloom.wgsl");

/// Glow around bright areas.
///
/// Each frame the input is high-pass filtered by luminance into a reduced
/// resolution target, blurred with a Kawase chain that ping-pongs between two
/// more targets, and the result is screened over the image.
pub struct BloomEffect {
    core: EffectCore,
    resolution_scale: f32,
    kernel_size: KernelSize,
    luminance: ShaderMaterial,
    blur: ShaderMaterial,
    luminance_target: RenderTarget,
    ping: RenderTarget,
    pong: RenderTarget,
}

impl BloomEffect {
    pub fn new() -> Self {
        let uniforms = UniformRegistry::new()
            .with("t_bloom", UniformValue::Texture(None))
            .with("intensity", 1.0f32);
        Self {
            core: EffectCore::new("bloom", FRAGMENT)
                .with_uniforms(uniforms)
                .with_blend(BlendFunction::Screen),
            resolution_scale: 0.5,
            kernel_size: KernelSize::default(),
            luminance: chunks::luminance_material("BloomEffect.Luminance", 0.9, 0.03, true),
            blur: chunks::blur_material("BloomEffect.Blur"),
            luminance_target: RenderTarget::new("BloomEffect.Luminance", 1, 1, TargetOptions::default()),
            ping: RenderTarget::new("BloomEffect.Ping", 1, 1, TargetOptions::default()),
            pong: RenderTarget::new("BloomEffect.Pong", 1, 1, TargetOptions::default()),
        }
    }

    /// Resolution of the internal targets relative to the pass size.
    pub fn with_resolution_scale(mut self, scale: f32) -> Self {
        self.resolution_scale = scale.max(f32::EPSILON);
        self
    }

    pub fn with_kernel_size(mut self, kernel_size: KernelSize) -> Self {
        self.kernel_size = kernel_size;
        self
    }

    pub fn resolution_scale(&self) -> f32 {
        self.resolution_scale
    }

    /// Size of the internal bloom targets.
    pub fn resolution(&self) -> (u32, u32) {
        self.luminance_target.size()
    }

    pub fn kernel_size(&self) -> KernelSize {
        self.kernel_size
    }

    pub fn set_kernel_size(&mut self, kernel_size: KernelSize) {
        self.kernel_size = kernel_size;
    }

    pub fn intensity(&self) -> f32 {
        self.core.float("intensity")
    }

    pub fn set_intensity(&mut self, intensity: f32) {
        self.core.set_uniform("intensity", intensity);
    }

    /// Luminance below `threshold` does not bloom; `smoothing` widens the cutoff.
    pub fn set_threshold(&mut self, threshold: f32, smoothing: f32) {
        self.luminance.set_uniform("threshold", threshold);
        self.luminance.set_uniform("smoothing", smoothing);
    }

    /// The blurred highlights of the last frame.
    pub fn texture(&self) -> Option<TextureRef> {
        self.core.uniform("t_bloom").and_then(UniformValue::texture)
    }
}

impl Default for BloomEffect {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for BloomEffect {
    fn core(&self) -> &EffectCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EffectCore {
        &mut self.core
    }

    fn initialize(&mut self, renderer: &mut dyn Renderer) -> Result<(), ComposeError> {
        renderer.compile(&self.luminance)?;
        renderer.compile(&self.blur)
    }

    fn set_size(&mut self, width: u32, height: u32) {
        let (width, height) = scaled_size(width, height, self.resolution_scale);
        self.luminance_target.set_size(width, height);
        self.ping.set_size(width, height);
        self.pong.set_size(width, height);
    }

    fn update(&mut self, renderer: &mut dyn Renderer, input: &RenderTarget, _delta: f32) -> Result<(), RenderError> {
        self.luminance
            .set_uniform("t_diffuse", UniformValue::Texture(Some(input.texture())));
        renderer.draw_fullscreen(&self.luminance, Some(&self.luminance_target), true)?;

        let targets = [&self.ping, &self.pong];
        let mut source = &self.luminance_target;
        for (i, kernel) in chunks::kawase_kernel(self.kernel_size).iter().enumerate() {
            let (width, height) = source.size();
            self.blur
                .set_uniform("t_diffuse", UniformValue::Texture(Some(source.texture())));
            self.blur
                .set_uniform("texel_size", Vec2::new(1.0 / width as f32, 1.0 / height as f32));
            self.blur.set_uniform("kernel", *kernel);
            let destination = targets[i % 2];
            renderer.draw_fullscreen(&self.blur, Some(destination), true)?;
            source = destination;
        }

        self.core
            .set_uniform("t_bloom", UniformValue::Texture(Some(source.texture())));
        Ok(())
    }

    fn dispose(&mut self, renderer: &mut dyn Renderer) {
        for target in [&self.luminance_target, &self.ping, &self.pong] {
            renderer.release_target(target.id());
        }
        renderer.release_material(self.luminance.id());
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
    use crate::testing::RecordingRenderer;

    #[test]
    fn internal_targets_follow_resolution_scale() {
        let mut bloom = BloomEffect::new().with_resolution_scale(0.25);
        bloom.set_size(800, 600);
        assert_eq!(bloom.resolution(), (200, 150));
        bloom.set_size(7, 3);
        assert_eq!(bloom.resolution(), (2, 1));
    }

    #[test]
    fn update_runs_luminance_then_blur_chain() {
        let mut renderer = RecordingRenderer::new(64, 64);
        let input = RenderTarget::new("input", 64, 64, TargetOptions::default());
        let mut bloom = BloomEffect::new().with_kernel_size(KernelSize::Small);
        bloom.initialize(&mut renderer).unwrap();
        bloom.set_size(64, 64);
        renderer.take_calls();

        bloom.update(&mut renderer, &input, 0.016).unwrap();
        let luminance = renderer.draws_of("BloomEffect.Luminance");
        assert_eq!(luminance.len(), 1);
        assert_eq!(luminance[0].texture("t_diffuse"), Some(input.texture()));

        let blur = renderer.draws_of("BloomEffect.Blur");
        assert_eq!(blur.len(), chunks::kawase_kernel(KernelSize::Small).len());
        assert_eq!(blur[0].texture("t_diffuse"), Some(bloom.luminance_target.texture()));
        assert_eq!(blur[1].texture("t_diffuse"), Some(bloom.ping.texture()));
        assert_eq!(blur[0].target_size, Some((32, 32)));
        // Four iterations end in the second ping-pong target.
        assert_eq!(bloom.texture(), Some(bloom.pong.texture()));
    }

    #[test]
    fn dispose_releases_owned_targets() {
        let mut renderer = RecordingRenderer::new(4, 4);
        let mut bloom = BloomEffect::new();
        bloom.dispose(&mut renderer);
        assert_eq!(renderer.released_targets().len(), 3);
    }
}
