use std::any::Any;

use super::{Effect, EffectCore};
use crate::material::UniformRegistry;

const FRAGMENT: &str = include_str!("shaders/sepia.wgsl");

/// Sepia toning.
pub struct SepiaEffect {
    core: EffectCore,
}

impl SepiaEffect {
    pub fn new(intensity: f32) -> Self {
        let uniforms = UniformRegistry::new().with("intensity", intensity);
        Self {
            core: EffectCore::new("sepia", FRAGMENT).with_uniforms(uniforms),
        }
    }

    pub fn intensity(&self) -> f32 {
        self.core.float("intensity")
    }

    pub fn set_intensity(&mut self, intensity: f32) {
        self.core.set_uniform("intensity", intensity);
    }
}

impl Default for SepiaEffect {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Effect for SepiaEffect {
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
