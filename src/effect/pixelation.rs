use std::any::Any;

use glam::Vec2;

use super::{Effect, EffectCore};
use crate::material::UniformRegistry;

const FRAGMENT: &str = include_str!("shaders/pixelation.wgsl");

/// Snaps sampling coordinates to a grid of square cells.
///
/// Only displaces coordinates, so the effect adds no blend to the merged program.
pub struct PixelationEffect {
    core: EffectCore,
    granularity: f32,
    size: (u32, u32),
}

impl PixelationEffect {
    /// `granularity` is the cell edge in pixels. Values below one disable the effect.
    pub fn new(granularity: f32) -> Self {
        let uniforms = UniformRegistry::new().with("cell", Vec2::ZERO);
        let mut effect = Self {
            core: EffectCore::new("pixelation", FRAGMENT).with_uniforms(uniforms),
            granularity,
            size: (1, 1),
        };
        effect.update_cell();
        effect
    }

    pub fn granularity(&self) -> f32 {
        self.granularity
    }

    pub fn set_granularity(&mut self, granularity: f32) {
        self.granularity = granularity;
        self.update_cell();
    }

    fn update_cell(&mut self) {
        let cell = if self.granularity >= 1.0 {
            let (width, height) = self.size;
            Vec2::splat(self.granularity.floor()) / Vec2::new(width as f32, height as f32)
        } else {
            Vec2::ZERO
        };
        self.core.set_uniform("cell", cell);
    }
}

impl Default for PixelationEffect {
    fn default() -> Self {
        Self::new(30.0)
    }
}

impl Effect for PixelationEffect {
    fn core(&self) -> &EffectCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EffectCore {
        &mut self.core
    }

    fn set_size(&mut self, width: u32, height: u32) {
        self.size = (width.max(1), height.max(1));
        self.update_cell();
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
    use crate::material::UniformValue;

    #[test]
    fn cell_is_granularity_in_uv_units() {
        let mut effect = PixelationEffect::new(10.0);
        effect.set_size(100, 50);
        assert_eq!(effect.core().uniform("cell"), Some(&UniformValue::Vec2(Vec2::new(0.1, 0.2))));
        effect.set_granularity(0.5);
        assert_eq!(effect.core().uniform("cell"), Some(&UniformValue::Vec2(Vec2::ZERO)));
    }
}
