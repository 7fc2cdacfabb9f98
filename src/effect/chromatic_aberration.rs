use std::any::Any;

use glam::Vec2;

use super::{Effect, EffectAttributes, EffectCore};
use crate::material::UniformRegistry;

const FRAGMENT: &str = include_str!("shaders/chromatic_aberration.wgsl");
const VERTEX: &str = include_str!("shaders/chromatic_aberration_vertex.wgsl");

/// Splits the red and blue channels along an offset.
///
/// The shifted coordinates are computed per vertex and interpolated.
pub struct ChromaticAberrationEffect {
    core: EffectCore,
}

impl ChromaticAberrationEffect {
    /// `offset` is in uv units.
    pub fn new(offset: Vec2) -> Self {
        let uniforms = UniformRegistry::new().with("offset", offset);
        Self {
            core: EffectCore::new("chromatic_aberration", FRAGMENT)
                .with_vertex(VERTEX)
                .with_uniforms(uniforms)
                .with_attributes(EffectAttributes::CONVOLUTION),
        }
    }

    pub fn set_offset(&mut self, offset: Vec2) {
        self.core.set_uniform("offset", offset);
    }
}

impl Default for ChromaticAberrationEffect {
    fn default() -> Self {
        Self::new(Vec2::new(0.001, 0.0005))
    }
}

impl Effect for ChromaticAberrationEffect {
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
