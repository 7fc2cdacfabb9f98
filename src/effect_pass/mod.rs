//! A pass that renders any number of effects with a single fullscreen draw.
//!
//! The effects are merged into one program (see [`merge`]) when the pass is
//! initialized. Afterwards the pass is either compiled or dirty: adding, removing
//! or reordering effects, or changing an effect's defines or blend function, makes
//! it dirty, and the next render recompiles once. Uniform edits never recompile;
//! they are copied into the merged registry every frame.
//!
//! ```ignore
//! let (bloom, shared) = effect::share(BloomEffect::new());
//! let pass = EffectPass::new(camera, vec![shared, effect::share(VignetteEffect::default()).1]);
//! composer.add_pass(&mut renderer, Box::new(pass), None)?;
//! bloom.borrow_mut().set_intensity(2.0); // picked up next frame
//! ```

pub mod merge;

pub use merge::{MergeInput, MergedProgram, UniformSlot};

use std::any::Any;
use std::cell::Ref;
use std::rc::Rc;

use glam::Vec2;

use crate::camera::SharedCamera;
use crate::effect::{Effect, SharedEffect};
use crate::error::{ComposeError, RenderError};
use crate::material::{ShaderMaterial, UniformRegistry, UniformValue};
use crate::pass::{Pass, PassState};
use crate::render_target::RenderTarget;
use crate::renderer::Renderer;
use crate::texture::TextureRef;

pub struct EffectPass {
    label: String,
    state: PassState,
    camera: SharedCamera,
    effects: Vec<SharedEffect>,
    material: ShaderMaterial,
    program: Option<MergedProgram>,
    /// Effect revisions seen by the last compile, parallel to `effects`.
    compiled_revisions: Vec<u64>,
    structure_dirty: bool,
    depth_texture: Option<TextureRef>,
    time: f32,
    compile_count: u32,
}

impl EffectPass {
    pub fn new(camera: SharedCamera, effects: Vec<SharedEffect>) -> Self {
        Self {
            label: "EffectPass".to_string(),
            state: PassState::default(),
            camera,
            effects,
            material: ShaderMaterial::new("EffectPass", "", UniformRegistry::new()),
            program: None,
            compiled_revisions: Vec::new(),
            structure_dirty: true,
            depth_texture: None,
            time: 0.0,
            compile_count: 0,
        }
    }

    /// Names the pass and its material in logs, errors and draws.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self.material.set_label(self.label.clone());
        self
    }

    pub fn effects(&self) -> &[SharedEffect] {
        &self.effects
    }

    /// Appends an effect. Takes effect at the next compile.
    pub fn add_effect(&mut self, effect: SharedEffect) {
        self.effects.push(effect);
        self.structure_dirty = true;
    }

    /// Removes the effect called `name`.
    pub fn remove_effect(&mut self, name: &str) -> Option<SharedEffect> {
        let index = self
            .effects
            .iter()
            .position(|effect| effect.borrow().name() == name)?;
        self.structure_dirty = true;
        Some(self.effects.remove(index))
    }

    /// Stable reorder by effect priority. Registration order is kept otherwise.
    pub fn sort_by_priority(&mut self) {
        let before = self.effects.clone();
        self.effects
            .sort_by_key(|effect| effect.borrow().core().priority());
        if before.iter().zip(&self.effects).any(|(a, b)| !Rc::ptr_eq(a, b)) {
            self.structure_dirty = true;
        }
    }

    /// Whether the next render has to recompile.
    pub fn is_dirty(&self) -> bool {
        self.structure_dirty
            || self.program.is_none()
            || self
                .effects
                .iter()
                .map(|effect| effect.borrow().core().revision())
                .ne(self.compiled_revisions.iter().copied())
    }

    /// The merged program of the last compile.
    pub fn program(&self) -> Option<&MergedProgram> {
        self.program.as_ref()
    }

    pub fn material(&self) -> &ShaderMaterial {
        &self.material
    }

    pub fn compile_count(&self) -> u32 {
        self.compile_count
    }

    pub fn depth_texture(&self) -> Option<TextureRef> {
        self.depth_texture
    }

    fn find(&self, name: &str) -> Option<&SharedEffect> {
        self.effects.iter().find(|effect| effect.borrow().name() == name)
    }

    /// Reads a uniform by qualified key: `<effect>.<uniform>`, `<effect>.opacity`,
    /// or the bare name of a common value.
    pub fn uniform(&self, qualified: &str) -> Option<UniformValue> {
        match qualified.split_once('.') {
            Some((effect, name)) => {
                let effect = self.find(effect)?.borrow();
                if name == "opacity" {
                    Some(UniformValue::Float(effect.core().blend().opacity))
                } else {
                    effect.core().uniform(name).copied()
                }
            }
            None => self.material.uniform(qualified).copied(),
        }
    }

    /// Writes a uniform by qualified key. Effect uniforms are stored on the effect
    /// itself, so the value survives recompilation.
    pub fn set_uniform(&mut self, qualified: &str, value: impl Into<UniformValue>) -> bool {
        let value = value.into();
        match qualified.split_once('.') {
            Some((effect, name)) => {
                let Some(effect) = self.find(effect) else {
                    return false;
                };
                let mut effect = effect.borrow_mut();
                if name == "opacity" {
                    let Some(opacity) = value.as_f32() else {
                        return false;
                    };
                    effect.core_mut().set_opacity(opacity);
                    true
                } else {
                    effect.core_mut().set_uniform(name, value)
                }
            }
            None => self.material.set_uniform(qualified, value),
        }
    }

    /// Merges the current effects and compiles the result.
    ///
    /// Common values keep their current values; effect uniforms are taken from the
    /// effects, which own them.
    pub fn recompile(&mut self, renderer: &mut dyn Renderer) -> Result<(), ComposeError> {
        let borrowed: Vec<Ref<'_, dyn Effect>> = self.effects.iter().map(|effect| effect.borrow()).collect();
        let inputs: Vec<MergeInput<'_>> = borrowed
            .iter()
            .map(|effect| MergeInput::from_core(effect.core()))
            .collect();
        let merged = merge::merge(&self.label, &inputs)?;

        if self.depth_texture.is_none()
            && let Some(input) = inputs.iter().find(|input| input.attributes.depth)
        {
            return Err(ComposeError::MissingDepthTexture {
                pass: self.label.clone(),
                effect: input.name.to_string(),
            });
        }
        let revisions: Vec<u64> = borrowed.iter().map(|effect| effect.core().revision()).collect();
        drop(inputs);
        drop(borrowed);

        let mut uniforms = merged.uniforms.clone();
        for slot in merged.slots.iter().filter(|slot| slot.effect.is_none()) {
            if let Some(value) = self.material.uniform(&slot.ident) {
                uniforms.set(&slot.ident, *value);
            }
        }
        if merged.attributes.depth {
            uniforms.set("t_depth", UniformValue::DepthTexture(self.depth_texture));
        }

        self.material
            .replace_program(merged.vertex.clone(), merged.fragment.clone(), uniforms);
        renderer.compile(&self.material)?;

        self.compile_count += 1;
        self.compiled_revisions = revisions;
        self.structure_dirty = false;
        tracing::debug!(
            pass = %self.label,
            effects = self.effects.len(),
            uniforms = merged.uniforms.len(),
            compiles = self.compile_count,
            "effect pass compiled"
        );
        self.program = Some(merged);
        Ok(())
    }

    /// Copies effect-owned values and per-frame common values into the material.
    fn sync_uniforms(&mut self, read: &RenderTarget) {
        let Some(program) = self.program.as_ref() else {
            return;
        };
        for (i, effect) in self.effects.iter().enumerate() {
            let effect = effect.borrow();
            for slot in program.effect_slots(i) {
                let value = if slot.local == "opacity" {
                    Some(UniformValue::Float(effect.core().blend().opacity))
                } else {
                    effect.core().uniform(&slot.local).copied()
                };
                if let Some(value) = value {
                    self.material.set_uniform(&slot.ident, value);
                }
            }
        }

        let (width, height) = read.size();
        let resolution = Vec2::new(width as f32, height as f32);
        let camera = self.camera.borrow();
        self.material.set_uniform("resolution", resolution);
        self.material.set_uniform("texel_size", resolution.recip());
        self.material.set_uniform("aspect", resolution.x / resolution.y);
        self.material.set_uniform("time", self.time);
        self.material.set_uniform("camera_near", camera.near);
        self.material.set_uniform("camera_far", camera.far);
        self.material
            .set_uniform("t_diffuse", UniformValue::Texture(Some(read.texture())));
        if program.attributes.depth {
            self.material
                .set_uniform("t_depth", UniformValue::DepthTexture(self.depth_texture));
        }
    }
}

impl Pass for EffectPass {
    fn name(&self) -> &str {
        &self.label
    }

    fn state(&self) -> &PassState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut PassState {
        &mut self.state
    }

    fn needs_depth_texture(&self) -> bool {
        self.effects
            .iter()
            .any(|effect| effect.borrow().core().attributes().depth)
    }

    fn set_depth_texture(&mut self, texture: Option<TextureRef>) {
        self.depth_texture = texture;
        for effect in &self.effects {
            effect.borrow_mut().set_depth_texture(texture);
        }
    }

    fn initialize(&mut self, renderer: &mut dyn Renderer) -> Result<(), ComposeError> {
        for effect in &self.effects {
            effect.borrow_mut().initialize(renderer)?;
        }
        self.recompile(renderer)
    }

    fn set_size(&mut self, width: u32, height: u32) {
        for effect in &self.effects {
            effect.borrow_mut().set_size(width, height);
        }
    }

    fn render(
        &mut self,
        renderer: &mut dyn Renderer,
        write: &RenderTarget,
        read: &RenderTarget,
        delta: f32,
        _mask_active: bool,
    ) -> Result<(), RenderError> {
        self.state.check_live(&self.label)?;
        if self.is_dirty() {
            self.recompile(renderer)?;
        }

        self.time += delta;
        for effect in &self.effects {
            effect.borrow_mut().update(renderer, read, delta)?;
        }
        self.sync_uniforms(read);
        renderer.draw_fullscreen(&self.material, self.state.output(write), self.state.clear)
    }

    fn dispose(&mut self, renderer: &mut dyn Renderer) {
        for effect in &self.effects {
            effect.borrow_mut().dispose(renderer);
        }
        renderer.release_material(self.material.id());
        self.state.disposed = true;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
