use std::any::Any;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::{Effect, EffectAttributes, EffectCore};
use crate::error::{ComposeError, RenderError};
use crate::lookup::LookupTexture;
use crate::material::{ShaderMaterial, UniformRegistry, UniformValue};
use crate::render_target::{RenderTarget, TargetOptions};
use crate::renderer::Renderer;
use crate::texture::{TexelFormat, TextureData};

const FRAGMENT: &str = include_str!("shaders/smaa.wgsl");
const EDGES_FRAGMENT: &str = include_str!("shaders/smaa_edges.wgsl");
const WEIGHTS_FRAGMENT: &str = include_str!("shaders/smaa_weights.wgsl");

/// Longest edge distance stored in the area lookup, in texels.
pub const AREA_SIZE: u32 = 33;

/// Quality presets trading edge sensitivity and search length for speed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmaaPreset {
    Low,
    #[default]
    Medium,
    High,
    Ultra,
}

impl SmaaPreset {
    pub fn threshold(self) -> f32 {
        match self {
            SmaaPreset::Low => 0.15,
            SmaaPreset::Medium | SmaaPreset::High => 0.1,
            SmaaPreset::Ultra => 0.05,
        }
    }

    pub fn max_search_steps(self) -> u32 {
        match self {
            SmaaPreset::Low => 4,
            SmaaPreset::Medium => 8,
            SmaaPreset::High => 16,
            SmaaPreset::Ultra => 32,
        }
    }
}

/// Coverage of a texel lying `d1` texels from one end of an edge and `d2` from
/// the other. Red weights the negative side, green the positive side.
pub fn area_texture() -> Result<TextureData, ComposeError> {
    let mut texels = Vec::with_capacity((AREA_SIZE * AREA_SIZE * 4) as usize);
    for d2 in 0..AREA_SIZE {
        for d1 in 0..AREA_SIZE {
            let half = (d1 + d2 + 1) as f32 * 0.5;
            let nearest = d1.min(d2) as f32 + 0.5;
            let coverage = (0.5 * (1.0 - nearest / half)).max(0.0);
            let value = (coverage * 255.0).round() as u8;
            let (negative, positive) = match d1.cmp(&d2) {
                std::cmp::Ordering::Less => (value, 0),
                std::cmp::Ordering::Greater => (0, value),
                std::cmp::Ordering::Equal => (value / 2, value / 2),
            };
            texels.extend_from_slice(&[negative, positive, 0, 255]);
        }
    }
    TextureData::new("smaa-area", AREA_SIZE, AREA_SIZE, TexelFormat::Rgba8, texels)
}

/// Morphological anti-aliasing.
///
/// Two sub-passes run before the merged draw: luma edge detection, then blend
/// weight computation from edge lengths through a precomputed area lookup. The
/// merged program blends each texel with its neighbors by those weights. Until the
/// lookup has been generated the effect passes its input through unchanged.
pub struct SmaaEffect {
    core: EffectCore,
    preset: SmaaPreset,
    area: LookupTexture,
    ready: bool,
    edges: ShaderMaterial,
    weights: ShaderMaterial,
    edges_target: RenderTarget,
    weights_target: RenderTarget,
}

impl SmaaEffect {
    pub fn new(preset: SmaaPreset) -> Self {
        Self::with_area_lookup(preset, LookupTexture::spawn("smaa-area", area_texture))
    }

    pub fn with_area_lookup(preset: SmaaPreset, area: LookupTexture) -> Self {
        let uniforms = UniformRegistry::new()
            .with("t_weights", UniformValue::Texture(None))
            .with("ready", 0.0f32);
        let edges = ShaderMaterial::new(
            "SmaaEffect.Edges",
            EDGES_FRAGMENT,
            UniformRegistry::new()
                .with("t_diffuse", UniformValue::Texture(None))
                .with("texel_size", Vec2::ONE)
                .with("threshold", preset.threshold()),
        );
        let weights = ShaderMaterial::new(
            "SmaaEffect.Weights",
            WEIGHTS_FRAGMENT,
            UniformRegistry::new()
                .with("t_diffuse", UniformValue::Texture(None))
                .with("t_area", UniformValue::Texture(None))
                .with("texel_size", Vec2::ONE),
        )
        .with_define("MAX_SEARCH_STEPS", preset.max_search_steps().to_string());
        Self {
            core: EffectCore::new("smaa", FRAGMENT)
                .with_uniforms(uniforms)
                .with_attributes(EffectAttributes::CONVOLUTION),
            preset,
            area,
            ready: false,
            edges,
            weights,
            edges_target: RenderTarget::new("SmaaEffect.Edges", 1, 1, TargetOptions::default()),
            weights_target: RenderTarget::new("SmaaEffect.Weights", 1, 1, TargetOptions::default()),
        }
    }

    pub fn preset(&self) -> SmaaPreset {
        self.preset
    }

    pub fn set_preset(&mut self, preset: SmaaPreset) {
        self.preset = preset;
        self.edges.set_uniform("threshold", preset.threshold());
        self.weights
            .set_define("MAX_SEARCH_STEPS", preset.max_search_steps().to_string());
    }

    /// Whether the area lookup has been generated and uploaded.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn edges_texture(&self) -> crate::texture::TextureRef {
        self.edges_target.texture()
    }

    pub fn weights_texture(&self) -> crate::texture::TextureRef {
        self.weights_target.texture()
    }
}

impl Default for SmaaEffect {
    fn default() -> Self {
        Self::new(SmaaPreset::default())
    }
}

impl Effect for SmaaEffect {
    fn core(&self) -> &EffectCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EffectCore {
        &mut self.core
    }

    fn initialize(&mut self, renderer: &mut dyn Renderer) -> Result<(), ComposeError> {
        renderer.compile(&self.edges)?;
        renderer.compile(&self.weights)
    }

    fn set_size(&mut self, width: u32, height: u32) {
        self.edges_target.set_size(width, height);
        self.weights_target.set_size(width, height);
        let texel = Vec2::new(1.0 / width.max(1) as f32, 1.0 / height.max(1) as f32);
        self.edges.set_uniform("texel_size", texel);
        self.weights.set_uniform("texel_size", texel);
    }

    fn update(&mut self, renderer: &mut dyn Renderer, input: &RenderTarget, _delta: f32) -> Result<(), RenderError> {
        if !self.ready
            && let Some(data) = self.area.poll()
        {
            renderer.upload_texture(&data)?;
            self.weights
                .set_uniform("t_area", UniformValue::Texture(Some(data.texture())));
            self.ready = true;
            self.core.set_uniform("ready", 1.0f32);
        }
        if !self.ready {
            return Ok(());
        }

        self.edges
            .set_uniform("t_diffuse", UniformValue::Texture(Some(input.texture())));
        renderer.draw_fullscreen(&self.edges, Some(&self.edges_target), true)?;

        self.weights
            .set_uniform("t_diffuse", UniformValue::Texture(Some(self.edges_target.texture())));
        renderer.draw_fullscreen(&self.weights, Some(&self.weights_target), true)?;

        self.core
            .set_uniform("t_weights", UniformValue::Texture(Some(self.weights_target.texture())));
        Ok(())
    }

    fn dispose(&mut self, renderer: &mut dyn Renderer) {
        renderer.release_target(self.edges_target.id());
        renderer.release_target(self.weights_target.id());
        renderer.release_material(self.edges.id());
        renderer.release_material(self.weights.id());
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
    use crate::testing::RecordingRenderer;

    #[test]
    fn passes_through_until_area_lookup_resolves() {
        let (release, gate) = crossbeam_channel::bounded::<()>(0);
        let area = LookupTexture::spawn("gated-area", move || {
            let _ = gate.recv();
            area_texture()
        });
        let mut effect = SmaaEffect::with_area_lookup(SmaaPreset::High, area);
        let mut renderer = RecordingRenderer::new(16, 16);
        let input = RenderTarget::new("input", 16, 16, TargetOptions::default());
        effect.set_size(16, 16);

        effect.update(&mut renderer, &input, 0.0).unwrap();
        assert!(renderer.draws().is_empty());
        assert_eq!(effect.core().float("ready"), 0.0);

        release.send(()).unwrap();
        assert!(effect.area.wait().is_some());
        effect.update(&mut renderer, &input, 0.0).unwrap();
        assert!(effect.is_ready());
        assert_eq!(effect.core().float("ready"), 1.0);

        let edges = renderer.draws_of("SmaaEffect.Edges");
        let weights = renderer.draws_of("SmaaEffect.Weights");
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].texture("t_diffuse"), Some(input.texture()));
        assert_eq!(weights[0].texture("t_diffuse"), Some(effect.edges_texture()));
        assert!(weights[0].texture("t_area").is_some());
    }

    #[test]
    fn preset_changes_search_length() {
        let area = LookupTexture::ready(area_texture().unwrap());
        let mut effect = SmaaEffect::with_area_lookup(SmaaPreset::Low, area);
        let mut renderer = RecordingRenderer::new(4, 4);
        effect.set_preset(SmaaPreset::Ultra);
        effect.initialize(&mut renderer).unwrap();
        assert!(renderer.compiled_sources()[1].contains("const MAX_SEARCH_STEPS = 32;"));
    }

    #[test]
    fn area_weights_favor_the_nearer_end() {
        let area = area_texture().unwrap();
        let texel = |d1: u32, d2: u32| {
            let i = ((d2 * AREA_SIZE + d1) * 4) as usize;
            (area.texels()[i], area.texels()[i + 1])
        };
        let (near_negative, _) = texel(0, 6);
        let (_, near_positive) = texel(6, 0);
        assert!(near_negative > 0);
        assert_eq!(near_negative, near_positive);
        // Texels in the middle of a long edge are left alone.
        assert_eq!(texel(8, 8), (0, 0));
    }
}
