use std::any::Any;

use super::{Effect, EffectCore};
use crate::shader::BlendFunction;

const FRAGMENT: &str = include_str!("shaders/noise.wgsl");

/// Animated film grain driven by the pass time.
pub struct NoiseEffect {
    core: EffectCore,
}

impl NoiseEffect {
    pub fn new(premultiply: bool) -> Self {
        let mut core = EffectCore::new("noise", FRAGMENT).with_blend(BlendFunction::Screen);
        core.toggle_define("PREMULTIPLY", premultiply);
        Self { core }
    }

    pub fn premultiply(&self) -> bool {
        self.core.defines().contains_key("PREMULTIPLY")
    }

    /// Multiplies the grain with the input color. Requires a recompile.
    pub fn set_premultiply(&mut self, premultiply: bool) {
        self.core.toggle_define("PREMULTIPLY", premultiply);
    }
}

impl Default for NoiseEffect {
    fn default() -> Self {
        Self::new(false)
    }
}

impl Effect for NoiseEffect {
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
