use std::any::Any;

use super::{Effect, EffectAttributes, EffectCore};
use crate::material::UniformRegistry;

const FRAGMENT: &str = include_str!("shaders/bokeh.wgsl");

/// Depth of field: blurs by distance from a focal plane.
///
/// Depths are linear and normalized between the camera clip planes.
pub struct BokehEffect {
    core: EffectCore,
}

impl BokehEffect {
    /// `focus` is the focal depth, `dof` the half width of the sharp range.
    pub fn new(focus: f32, dof: f32, aperture: f32, max_blur: f32) -> Self {
        let uniforms = UniformRegistry::new()
            .with("focus", focus)
            .with("dof", dof)
            .with("aperture", aperture)
            .with("max_blur", max_blur);
        Self {
            core: EffectCore::new("bokeh", FRAGMENT)
                .with_uniforms(uniforms)
                .with_attributes(EffectAttributes::DEPTH.union(EffectAttributes::CONVOLUTION)),
        }
    }

    pub fn focus(&self) -> f32 {
        self.core.float("focus")
    }

    pub fn set_focus(&mut self, focus: f32) {
        self.core.set_uniform("focus", focus.clamp(0.0, 1.0));
    }

    pub fn set_dof(&mut self, dof: f32) {
        self.core.set_uniform("dof", dof.max(0.0));
    }

    pub fn set_aperture(&mut self, aperture: f32) {
        self.core.set_uniform("aperture", aperture);
    }

    pub fn set_max_blur(&mut self, max_blur: f32) {
        self.core.set_uniform("max_blur", max_blur);
    }
}

impl Default for BokehEffect {
    fn default() -> Self {
        Self::new(0.5, 0.02, 0.05, 0.01)
    }
}

impl Effect for BokehEffect {
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
