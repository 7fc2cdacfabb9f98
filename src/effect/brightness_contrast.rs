use std::any::Any;

use super::{Effect, EffectCore};
use crate::material::UniformRegistry;

const FRAGMENT: &str = include_str!("shaders/brightness_contrast.wgsl");

/// Contrast of exactly one would divide by zero in the shader.
const MAX_CONTRAST: f32 = 0.999;

/// Additive brightness and contrast around mid gray, both in `[-1, 1]`.
pub struct BrightnessContrastEffect {
    core: EffectCore,
}

impl BrightnessContrastEffect {
    pub fn new(brightness: f32, contrast: f32) -> Self {
        let uniforms = UniformRegistry::new()
            .with("brightness", brightness.clamp(-1.0, 1.0))
            .with("contrast", contrast.clamp(-1.0, MAX_CONTRAST));
        Self {
            core: EffectCore::new("brightness_contrast", FRAGMENT).with_uniforms(uniforms),
        }
    }

    pub fn brightness(&self) -> f32 {
        self.core.float("brightness")
    }

    pub fn set_brightness(&mut self, brightness: f32) {
        self.core.set_uniform("brightness", brightness.clamp(-1.0, 1.0));
    }

    pub fn contrast(&self) -> f32 {
        self.core.float("contrast")
    }

    pub fn set_contrast(&mut self, contrast: f32) {
        self.core.set_uniform("contrast", contrast.clamp(-1.0, MAX_CONTRAST));
    }
}

impl Default for BrightnessContrastEffect {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

impl Effect for BrightnessContrastEffect {
    fn core(&self) -> &EffectCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EffectCore {
        &mut self.core
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
