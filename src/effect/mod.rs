//! Effects: shader fragments that are merged into an [`EffectPass`].
//!
//! An effect never renders on its own. It contributes WGSL functions, uniforms,
//! defines and a blend mode; the owning pass merges every effect into a single
//! fullscreen program. Effects that need intermediate results (blurred highlights,
//! edge maps) render them into their own targets in [`Effect::update`] before the
//! merged draw.
//!
//! Effects are shared, never exclusively owned: a pass holds [`SharedEffect`]
//! handles and the host can keep a typed handle to tweak parameters per frame.
//!
//! [`EffectPass`]: crate::effect_pass::EffectPass

mod bloom;
mod bokeh;
mod brightness_contrast;
mod chromatic_aberration;
mod depth;
mod dot_screen;
mod glitch;
mod god_rays;
mod noise;
mod pixelation;
mod scanline;
mod sepia;
mod smaa;
mod tone_mapping;
mod vignette;

pub use bloom::BloomEffect;
pub use bokeh::BokehEffect;
pub use brightness_contrast::BrightnessContrastEffect;
pub use chromatic_aberration::ChromaticAberrationEffect;
pub use depth::DepthEffect;
pub use dot_screen::DotScreenEffect;
pub use glitch::{GlitchEffect, GlitchMode};
pub use god_rays::GodRaysEffect;
pub use noise::NoiseEffect;
pub use pixelation::PixelationEffect;
pub use scanline::ScanlineEffect;
pub use sepia::SepiaEffect;
pub use smaa::{SmaaEffect, SmaaPreset};
pub use tone_mapping::{ToneMappingEffect, ToneMappingMode};
pub use vignette::VignetteEffect;

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{ComposeError, RenderError};
use crate::material::{Defines, UniformRegistry, UniformValue};
use crate::render_target::RenderTarget;
use crate::renderer::Renderer;
use crate::shader::{BlendFunction, BlendMode};
use crate::texture::TextureRef;

/// An effect shared between passes and the host.
pub type SharedEffect = Rc<RefCell<dyn Effect>>;

/// Wraps an effect into a [`SharedEffect`] while keeping a typed handle.
pub fn share<E: Effect>(effect: E) -> (Rc<RefCell<E>>, SharedEffect) {
    let typed = Rc::new(RefCell::new(effect));
    let shared: SharedEffect = typed.clone();
    (typed, shared)
}

/// Requirements an effect places on the pass that merges it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct EffectAttributes {
    /// `mainImage` receives the scene depth as a third argument.
    pub depth: bool,
    /// The effect samples the input at other coordinates, so it reads the
    /// unmodified input rather than the output of earlier effects.
    pub convolution: bool,
}

impl EffectAttributes {
    pub const NONE: EffectAttributes = EffectAttributes {
        depth: false,
        convolution: false,
    };
    pub const DEPTH: EffectAttributes = EffectAttributes {
        depth: true,
        convolution: false,
    };
    pub const CONVOLUTION: EffectAttributes = EffectAttributes {
        depth: false,
        convolution: true,
    };

    pub fn union(self, other: EffectAttributes) -> EffectAttributes {
        EffectAttributes {
            depth: self.depth || other.depth,
            convolution: self.convolution || other.convolution,
        }
    }
}

/// The declarative part every effect carries.
///
/// Uniform edits are cheap and never invalidate a compiled pass. Define and blend
/// function changes bump [`revision`](Self::revision), which the owning pass picks
/// up as a request to recompile.
#[derive(Clone, Debug)]
pub struct EffectCore {
    name: String,
    fragment: String,
    vertex: Option<String>,
    blend: BlendMode,
    uniforms: UniformRegistry,
    defines: Defines,
    attributes: EffectAttributes,
    priority: i32,
    revision: u64,
}

impl EffectCore {
    pub fn new(name: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fragment: fragment.into(),
            vertex: None,
            blend: BlendMode::default(),
            uniforms: UniformRegistry::new(),
            defines: Defines::new(),
            attributes: EffectAttributes::NONE,
            priority: 0,
            revision: 0,
        }
    }

    /// Adds a vertex body defining `fn mainSupport(uv: vec2f) -> vec4f`.
    pub fn with_vertex(mut self, vertex: impl Into<String>) -> Self {
        self.vertex = Some(vertex.into());
        self
    }

    pub fn with_uniforms(mut self, uniforms: UniformRegistry) -> Self {
        self.uniforms = uniforms;
        self
    }

    pub fn with_define(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.defines.insert(name.into(), value.into());
        self
    }

    pub fn with_blend(mut self, function: BlendFunction) -> Self {
        self.blend.function = function;
        self
    }

    pub fn with_attributes(mut self, attributes: EffectAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    pub fn vertex(&self) -> Option<&str> {
        self.vertex.as_deref()
    }

    pub fn blend(&self) -> BlendMode {
        self.blend
    }

    pub fn set_blend_function(&mut self, function: BlendFunction) {
        if self.blend.function != function {
            self.blend.function = function;
            self.revision += 1;
        }
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.blend.opacity = opacity;
    }

    pub fn uniforms(&self) -> &UniformRegistry {
        &self.uniforms
    }

    pub fn uniform(&self, name: &str) -> Option<&UniformValue> {
        self.uniforms.get(name)
    }

    pub fn set_uniform(&mut self, name: &str, value: impl Into<UniformValue>) -> bool {
        self.uniforms.set(name, value)
    }

    pub fn float(&self, name: &str) -> f32 {
        self.uniforms
            .get(name)
            .and_then(UniformValue::as_f32)
            .unwrap_or_default()
    }

    pub fn defines(&self) -> &Defines {
        &self.defines
    }

    pub fn set_define(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if self.defines.get(&name) != Some(&value) {
            self.defines.insert(name, value);
            self.revision += 1;
        }
    }

    pub fn remove_define(&mut self, name: &str) {
        if self.defines.remove(name).is_some() {
            self.revision += 1;
        }
    }

    /// Adds or removes a flag define.
    pub fn toggle_define(&mut self, name: &str, enabled: bool) {
        if enabled {
            self.set_define(name, "");
        } else {
            self.remove_define(name);
        }
    }

    pub fn attributes(&self) -> EffectAttributes {
        self.attributes
    }

    /// Merge ordering hint used by `EffectPass::sort_by_priority`. Lower runs first.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Structural revision, bumped by define and blend function changes.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

pub trait Effect: Any {
    fn core(&self) -> &EffectCore;
    fn core_mut(&mut self) -> &mut EffectCore;

    fn name(&self) -> &str {
        self.core().name()
    }

    /// Compiles sub-pass materials. Called when the owning pass is initialized.
    fn initialize(&mut self, _renderer: &mut dyn Renderer) -> Result<(), ComposeError> {
        Ok(())
    }

    /// Called with the pass size whenever it changes.
    fn set_size(&mut self, _width: u32, _height: u32) {}

    fn set_depth_texture(&mut self, _texture: Option<TextureRef>) {}

    /// Runs once per frame before the merged draw. `input` is the buffer the pass
    /// is about to read.
    fn update(&mut self, _renderer: &mut dyn Renderer, _input: &RenderTarget, _delta: f32) -> Result<(), RenderError> {
        Ok(())
    }

    fn dispose(&mut self, _renderer: &mut dyn Renderer) {}

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Scales a base size, never going below one texel.
pub(crate) fn scaled_size(width: u32, height: u32, scale: f32) -> (u32, u32) {
    (
        ((width as f32 * scale).round() as u32).max(1),
        ((height as f32 * scale).round() as u32).max(1),
    )
}
