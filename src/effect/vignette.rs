use std::any::Any;

use super::{Effect, EffectCore};
use crate::material::UniformRegistry;

const FRAGMENT: &str = include_str!("shaders/vignette.wgsl");

/// Darkens the image towards its edges.
pub struct VignetteEffect {
    core: EffectCore,
}

impl VignetteEffect {
    pub fn new(offset: f32, darkness: f32) -> Self {
        let uniforms = UniformRegistry::new().with("offset", offset).with("darkness", darkness);
        Self {
            core: EffectCore::new("vignette", FRAGMENT).with_uniforms(uniforms),
        }
    }

    pub fn set_offset(&mut self, offset: f32) {
        self.core.set_uniform("offset", offset);
    }

    pub fn set_darkness(&mut self, darkness: f32) {
        self.core.set_uniform("darkness", darkness);
    }

    pub fn eskil(&self) -> bool {
        self.core.defines().contains_key("ESKIL")
    }

    /// Switches to the mix-towards-black variant. Requires a recompile.
    pub fn set_eskil(&mut self, eskil: bool) {
        self.core.toggle_define("ESKIL", eskil);
    }
}

impl Default for VignetteEffect {
    fn default() -> Self {
        Self::new(0.5, 0.5)
    }
}

impl Effect for VignetteEffect {
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
