use std::any::Any;

use super::{Effect, EffectCore};
use crate::material::UniformRegistry;
use crate::shader::BlendFunction;

const FRAGMENT: &str = include_str!("shaders/scanline.wgsl");

/// Horizontal scanlines, overlaid by default.
pub struct ScanlineEffect {
    core: EffectCore,
    density: f32,
    height: u32,
}

impl ScanlineEffect {
    /// `density` is the number of lines per pixel row.
    pub fn new(density: f32) -> Self {
        let uniforms = UniformRegistry::new().with("count", 0.0f32);
        Self {
            core: EffectCore::new("scanline", FRAGMENT)
                .with_uniforms(uniforms)
                .with_blend(BlendFunction::Overlay),
            density,
            height: 1,
        }
    }

    pub fn density(&self) -> f32 {
        self.density
    }

    pub fn set_density(&mut self, density: f32) {
        self.density = density;
        self.update_count();
    }

    fn update_count(&mut self) {
        let count = (self.height as f32 * self.density).round();
        self.core.set_uniform("count", count);
    }
}

impl Default for ScanlineEffect {
    fn default() -> Self {
        Self::new(1.25)
    }
}

impl Effect for ScanlineEffect {
    fn core(&self) -> &EffectCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EffectCore {
        &mut self.core
    }

    fn set_size(&mut self, _width: u32, height: u32) {
        self.height = height;
        self.update_count();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
