use std::any::Any;

use super::{Effect, EffectAttributes, EffectCore};

const FRAGMENT: &str = include_str!("shaders/depth.wgsl");

/// Visualizes linear scene depth.
pub struct DepthEffect {
    core: EffectCore,
}

impl DepthEffect {
    pub fn new(inverted: bool) -> Self {
        let mut core = EffectCore::new("depth", FRAGMENT).with_attributes(EffectAttributes::DEPTH);
        core.toggle_define("INVERTED", inverted);
        Self { core }
    }

    pub fn inverted(&self) -> bool {
        self.core.defines().contains_key("INVERTED")
    }

    pub fn set_inverted(&mut self, inverted: bool) {
        self.core.toggle_define("INVERTED", inverted);
    }
}

impl Default for DepthEffect {
    fn default() -> Self {
        Self::new(false)
    }
}

impl Effect for DepthEffect {
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
