use std::any::Any;
use std::ops::RangeInclusive;

use glam::Vec2;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{Effect, EffectAttributes, EffectCore};
use crate::error::RenderError;
use crate::lookup::{self, LookupTexture};
use crate::material::{UniformRegistry, UniformValue};
use crate::render_target::RenderTarget;
use crate::renderer::Renderer;

const FRAGMENT: &str = include_str!("shaders/glitch.wgsl");

/// Edge length of the generated perturbation map.
const PERTURBATION_SIZE: u32 = 64;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlitchMode {
    Disabled,
    /// Short bursts separated by random delays.
    #[default]
    Sporadic,
    ConstantMild,
    ConstantWild,
}

/// Digital distortion: row displacement and channel splitting.
///
/// Displacement is looked up in a noise map that is generated in the
/// background. The effect stays inactive until that map is available.
pub struct GlitchEffect {
    core: EffectCore,
    mode: GlitchMode,
    rng: SmallRng,
    perturbation: LookupTexture,
    uploaded: bool,
    delay: RangeInclusive<f32>,
    duration: RangeInclusive<f32>,
    /// Seconds until the next burst.
    countdown: f32,
    /// Seconds left in the current burst.
    remaining: f32,
    mild: f32,
    wild: f32,
}

impl GlitchEffect {
    pub fn new(mode: GlitchMode) -> Self {
        Self::with_perturbation(
            mode,
            LookupTexture::spawn("glitch-perturbation", || lookup::noise_texture(PERTURBATION_SIZE, 0x6c17)),
        )
    }

    /// Uses a caller-provided perturbation map.
    pub fn with_perturbation(mode: GlitchMode, perturbation: LookupTexture) -> Self {
        let uniforms = UniformRegistry::new()
            .with("t_perturbation", UniformValue::Texture(None))
            .with("active", 0.0f32)
            .with("strength", 0.0f32)
            .with("columns", 0.05f32)
            .with("seed", Vec2::ZERO);
        let mut rng = SmallRng::from_entropy();
        let delay = 1.5..=3.5;
        let countdown = rng.gen_range(delay.clone());
        Self {
            core: EffectCore::new("glitch", FRAGMENT)
                .with_uniforms(uniforms)
                .with_attributes(EffectAttributes::CONVOLUTION),
            mode,
            rng,
            perturbation,
            uploaded: false,
            delay,
            duration: 0.6..=1.0,
            countdown,
            remaining: 0.0,
            mild: 0.3,
            wild: 1.0,
        }
    }

    /// Reseeds the burst timer, for reproducible sequences.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = SmallRng::seed_from_u64(seed);
        self.countdown = self.rng.gen_range(self.delay.clone());
        self
    }

    pub fn mode(&self) -> GlitchMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: GlitchMode) {
        self.mode = mode;
    }

    /// Range of seconds between sporadic bursts.
    pub fn set_delay(&mut self, min: f32, max: f32) {
        self.delay = min.min(max).max(0.0)..=max.max(min).max(0.0);
    }

    /// Range of seconds a sporadic burst lasts.
    pub fn set_duration(&mut self, min: f32, max: f32) {
        self.duration = min.min(max).max(0.0)..=max.max(min).max(0.0);
    }

    /// Displacement strengths of mild and wild glitches.
    pub fn set_strength(&mut self, mild: f32, wild: f32) {
        self.mild = mild;
        self.wild = wild;
    }

    /// Number of displaced rows per uv unit.
    pub fn set_columns(&mut self, columns: f32) {
        self.core.set_uniform("columns", columns);
    }

    pub fn is_active(&self) -> bool {
        self.core.float("active") > 0.5
    }

    /// Whether the perturbation map has been uploaded.
    pub fn is_ready(&self) -> bool {
        self.uploaded
    }

    /// Advances the burst timer, returning the strength to apply this frame.
    fn step(&mut self, delta: f32) -> Option<f32> {
        match self.mode {
            GlitchMode::Disabled => None,
            GlitchMode::ConstantMild => Some(self.mild),
            GlitchMode::ConstantWild => Some(self.wild),
            GlitchMode::Sporadic => {
                if self.remaining > 0.0 {
                    self.remaining -= delta;
                    // A fifth of every burst is wild.
                    let wild = self.rng.r#gen::<f32>() < 0.2;
                    return Some(if wild { self.wild } else { self.mild });
                }
                self.countdown -= delta;
                if self.countdown <= 0.0 {
                    self.remaining = self.rng.gen_range(self.duration.clone());
                    self.countdown = self.rng.gen_range(self.delay.clone());
                }
                None
            }
        }
    }
}

impl Effect for GlitchEffect {
    fn core(&self) -> &EffectCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EffectCore {
        &mut self.core
    }

    fn update(&mut self, renderer: &mut dyn Renderer, _input: &RenderTarget, delta: f32) -> Result<(), RenderError> {
        if !self.uploaded
            && let Some(data) = self.perturbation.poll()
        {
            renderer.upload_texture(&data)?;
            self.core
                .set_uniform("t_perturbation", UniformValue::Texture(Some(data.texture())));
            self.uploaded = true;
        }
        if !self.uploaded {
            self.core.set_uniform("active", 0.0f32);
            return Ok(());
        }

        match self.step(delta) {
            Some(strength) => {
                let seed = Vec2::new(self.rng.r#gen(), self.rng.r#gen());
                self.core.set_uniform("active", 1.0f32);
                self.core.set_uniform("strength", strength);
                self.core.set_uniform("seed", seed);
            }
            None => {
                self.core.set_uniform("active", 0.0f32);
            }
        }
        Ok(())
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
    use crate::render_target::TargetOptions;
    use crate::testing::RecordingRenderer;

    fn input() -> RenderTarget {
        RenderTarget::new("input", 8, 8, TargetOptions::default())
    }

    #[test]
    fn inactive_until_perturbation_resolves() {
        let (release, gate) = crossbeam_channel::bounded::<()>(0);
        let lookup = LookupTexture::spawn("gated", move || {
            let _ = gate.recv();
            lookup::noise_texture(4, 1)
        });
        let mut effect = GlitchEffect::with_perturbation(GlitchMode::ConstantWild, lookup);
        let mut renderer = RecordingRenderer::new(8, 8);

        effect.update(&mut renderer, &input(), 0.016).unwrap();
        assert!(!effect.is_active());
        assert!(!effect.is_ready());

        release.send(()).unwrap();
        let data = effect.perturbation.wait().unwrap();
        effect.update(&mut renderer, &input(), 0.016).unwrap();
        assert!(effect.is_active());
        assert_eq!(effect.core().float("strength"), 1.0);
        assert!(matches!(
            effect.core().uniform("t_perturbation"),
            Some(UniformValue::Texture(Some(_)))
        ));

        // The map is uploaded exactly once.
        effect.update(&mut renderer, &input(), 0.016).unwrap();
        assert_eq!(renderer.uploads(), vec![data.id()]);
    }

    #[test]
    fn disabled_mode_never_activates() {
        let lookup = LookupTexture::ready(lookup::noise_texture(4, 1).unwrap());
        let mut effect = GlitchEffect::with_perturbation(GlitchMode::Disabled, lookup);
        let mut renderer = RecordingRenderer::new(8, 8);
        for _ in 0..10 {
            effect.update(&mut renderer, &input(), 1.0).unwrap();
            assert!(!effect.is_active());
        }
    }

    #[test]
    fn sporadic_mode_bursts_after_delay() {
        let lookup = LookupTexture::ready(lookup::noise_texture(4, 1).unwrap());
        let mut effect = GlitchEffect::with_perturbation(GlitchMode::Sporadic, lookup).with_seed(3);
        effect.set_delay(1.0, 1.0);
        effect.set_duration(0.5, 0.5);
        effect.countdown = 1.0;
        let mut renderer = RecordingRenderer::new(8, 8);

        effect.update(&mut renderer, &input(), 0.5).unwrap();
        assert!(!effect.is_active());
        effect.update(&mut renderer, &input(), 0.5).unwrap();
        assert!(!effect.is_active(), "the burst starts on the next frame");
        effect.update(&mut renderer, &input(), 0.25).unwrap();
        assert!(effect.is_active());
        effect.update(&mut renderer, &input(), 0.25).unwrap();
        assert!(effect.is_active());
        effect.update(&mut renderer, &input(), 0.25).unwrap();
        assert!(!effect.is_active());
    }
}
