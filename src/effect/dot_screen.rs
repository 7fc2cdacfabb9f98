use std::any::Any;

use super::{Effect, EffectCore};
use crate::material::UniformRegistry;

const FRAGMENT: &str = include_str!("shaders/dot_screen.wgsl");

/// Halftone dot pattern over a gray version of the input.
pub struct DotScreenEffect {
    core: EffectCore,
}

impl DotScreenEffect {
    /// `angle` rotates the pattern in radians, `scale` sets the dot frequency.
    pub fn new(angle: f32, scale: f32) -> Self {
        let uniforms = UniformRegistry::new().with("angle", angle).with("scale", scale);
        Self {
            core: EffectCore::new("dot_screen", FRAGMENT).with_uniforms(uniforms),
        }
    }

    pub fn set_angle(&mut self, angle: f32) {
        self.core.set_uniform("angle", angle);
    }

    pub fn set_scale(&mut self, scale: f32) {
        self.core.set_uniform("scale", scale);
    }
}

impl Default for DotScreenEffect {
    fn default() -> Self {
        Self::new(1.57, 1.0)
    }
}

impl Effect for DotScreenEffect {
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
