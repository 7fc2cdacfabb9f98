//! Shader materials and their uniform registries.
//!
//! A [`ShaderMaterial`] is a complete WGSL program description: vertex and fragment
//! code, an ordered [`UniformRegistry`], preprocessor defines and a sampler filter.
//! The material generates its own binding header from the registry so shader code
//! only has to reference uniforms by name:
//!
//! ```wgsl
//! struct Uniforms { opacity: f32, tint: vec3f }
//! @group(0) @binding(0) var<uniform> u: Uniforms;   // only if scalars exist
//! @group(0) @binding(1) var s_texture: sampler;
//! @group(0) @binding(2) var t_diffuse: texture_2d<f32>;  // textures follow in order
//! ```
//!
//! Scalar uniforms are packed per draw using the same member layout rules WGSL applies
//! to the generated struct, so the byte layout never has to be maintained by hand.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::error::ComposeError;
use crate::render_target::{FilterMode, TargetId};
use crate::shader::{chunks, preprocess};
use crate::texture::TextureRef;

/// Binding slot of the scalar uniform buffer.
pub const UNIFORM_BINDING: u32 = 0;
/// Binding slot of the material sampler.
pub const SAMPLER_BINDING: u32 = 1;
/// Binding slot of the first texture; further textures follow in registry order.
pub const FIRST_TEXTURE_BINDING: u32 = 2;

/// Preprocessor defines, name to value. An empty value marks a flag.
pub type Defines = BTreeMap<String, String>;

static NEXT_MATERIAL_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a material, used by the renderer to cache compiled programs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(u64);

/// A typed uniform value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    UInt(u32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
    /// A filterable color texture, unbound when `None`.
    Texture(Option<TextureRef>),
    /// A depth texture read with `textureLoad`, unbound when `None`.
    DepthTexture(Option<TextureRef>),
}

impl UniformValue {
    pub fn wgsl_type(&self) -> &'static str {
        match self {
            UniformValue::Float(_) => "f32",
            UniformValue::Int(_) => "i32",
            UniformValue::UInt(_) => "u32",
            UniformValue::Vec2(_) => "vec2f",
            UniformValue::Vec3(_) => "vec3f",
            UniformValue::Vec4(_) => "vec4f",
            UniformValue::Mat4(_) => "mat4x4f",
            UniformValue::Texture(_) => "texture_2d<f32>",
            UniformValue::DepthTexture(_) => "texture_depth_2d",
        }
    }

    pub fn is_texture(&self) -> bool {
        matches!(self, UniformValue::Texture(_) | UniformValue::DepthTexture(_))
    }

    /// Bound texture, if this is a texture uniform with a value.
    pub fn texture(&self) -> Option<TextureRef> {
        match self {
            UniformValue::Texture(t) | UniformValue::DepthTexture(t) => *t,
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            UniformValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Whether both values have the same variant.
    pub fn same_kind(&self, other: &UniformValue) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// `(align, size)` in bytes under WGSL host-shareable layout rules.
    fn align_size(&self) -> (u32, u32) {
        match self {
            UniformValue::Float(_) | UniformValue::Int(_) | UniformValue::UInt(_) => (4, 4),
            UniformValue::Vec2(_) => (8, 8),
            UniformValue::Vec3(_) => (16, 12),
            UniformValue::Vec4(_) => (16, 16),
            UniformValue::Mat4(_) => (16, 64),
            UniformValue::Texture(_) | UniformValue::DepthTexture(_) => (0, 0),
        }
    }

    fn write_bytes(&self, out: &mut [u8]) {
        match self {
            UniformValue::Float(v) => out.copy_from_slice(bytemuck::bytes_of(v)),
            UniformValue::Int(v) => out.copy_from_slice(bytemuck::bytes_of(v)),
            UniformValue::UInt(v) => out.copy_from_slice(bytemuck::bytes_of(v)),
            UniformValue::Vec2(v) => out.copy_from_slice(bytemuck::cast_slice(&v.to_array())),
            UniformValue::Vec3(v) => out.copy_from_slice(bytemuck::cast_slice(&v.to_array())),
            UniformValue::Vec4(v) => out.copy_from_slice(bytemuck::cast_slice(&v.to_array())),
            UniformValue::Mat4(m) => {
                out.copy_from_slice(bytemuck::cast_slice(&m.to_cols_array()))
            }
            UniformValue::Texture(_) | UniformValue::DepthTexture(_) => {}
        }
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        UniformValue::Float(v)
    }
}

impl From<i32> for UniformValue {
    fn from(v: i32) -> Self {
        UniformValue::Int(v)
    }
}

impl From<u32> for UniformValue {
    fn from(v: u32) -> Self {
        UniformValue::UInt(v)
    }
}

impl From<Vec2> for UniformValue {
    fn from(v: Vec2) -> Self {
        UniformValue::Vec2(v)
    }
}

impl From<Vec3> for UniformValue {
    fn from(v: Vec3) -> Self {
        UniformValue::Vec3(v)
    }
}

impl From<Vec4> for UniformValue {
    fn from(v: Vec4) -> Self {
        UniformValue::Vec4(v)
    }
}

impl From<Mat4> for UniformValue {
    fn from(v: Mat4) -> Self {
        UniformValue::Mat4(v)
    }
}

impl From<TextureRef> for UniformValue {
    fn from(v: TextureRef) -> Self {
        UniformValue::Texture(Some(v))
    }
}

/// Placement of one scalar uniform inside the packed buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldLayout {
    pub name: String,
    pub offset: u32,
    pub size: u32,
}

/// Byte layout of the scalar uniforms of a registry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UniformLayout {
    pub fields: Vec<FieldLayout>,
    /// Total buffer size, rounded up to 16 bytes.
    pub size: u32,
}

/// Ordered uniform declarations with unique names.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UniformRegistry {
    entries: Vec<(String, UniformValue)>,
}

impl UniformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a uniform. Returns `false` and leaves the registry untouched if
    /// the name is already declared.
    pub fn declare(&mut self, name: impl Into<String>, value: impl Into<UniformValue>) -> bool {
        let name = name.into();
        if self.contains(&name) {
            return false;
        }
        self.entries.push((name, value.into()));
        true
    }

    /// Builder-style [`declare`](Self::declare).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<UniformValue>) -> Self {
        self.declare(name, value);
        self
    }

    /// Updates an existing uniform. The new value must have the declared type.
    pub fn set(&mut self, name: &str, value: impl Into<UniformValue>) -> bool {
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) if slot.same_kind(&value) => {
                *slot = value;
                true
            }
            Some((_, slot)) => {
                tracing::warn!(
                    uniform = name,
                    declared = slot.wgsl_type(),
                    given = value.wgsl_type(),
                    "uniform type mismatch, value ignored"
                );
                false
            }
            None => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<&UniformValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &UniformValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Scalar (buffer-backed) uniforms in declaration order.
    pub fn scalars(&self) -> impl Iterator<Item = (&str, &UniformValue)> {
        self.iter().filter(|(_, v)| !v.is_texture())
    }

    /// Texture uniforms with their binding slots.
    pub fn texture_bindings(&self) -> impl Iterator<Item = (u32, &str, &UniformValue)> {
        self.iter()
            .filter(|(_, v)| v.is_texture())
            .enumerate()
            .map(|(i, (n, v))| (FIRST_TEXTURE_BINDING + i as u32, n, v))
    }

    pub fn has_scalars(&self) -> bool {
        self.scalars().next().is_some()
    }

    /// Computes offsets for the scalar uniforms.
    pub fn layout(&self) -> UniformLayout {
        let mut fields = Vec::new();
        let mut end = 0u32;
        let mut max_align = 16u32;
        for (name, value) in self.scalars() {
            let (align, size) = value.align_size();
            let offset = end.next_multiple_of(align);
            fields.push(FieldLayout {
                name: name.to_string(),
                offset,
                size,
            });
            end = offset + size;
            max_align = max_align.max(align);
        }
        UniformLayout {
            fields,
            size: end.next_multiple_of(max_align).max(16),
        }
    }

    /// Packs scalar uniform values according to [`layout`](Self::layout).
    pub fn pack(&self) -> Vec<u8> {
        let layout = self.layout();
        let mut bytes = vec![0u8; layout.size as usize];
        for (field, (_, value)) in layout.fields.iter().zip(self.scalars()) {
            let start = field.offset as usize;
            value.write_bytes(&mut bytes[start..start + field.size as usize]);
        }
        bytes
    }

    /// WGSL declarations for the uniform struct, sampler and textures.
    pub fn wgsl_header(&self) -> String {
        let mut out = String::new();
        if self.has_scalars() {
            out.push_str("struct Uniforms {\n");
            for (name, value) in self.scalars() {
                let _ = writeln!(out, "    {name}: {},", value.wgsl_type());
            }
            out.push_str("}\n");
            let _ = writeln!(
                out,
                "@group(0) @binding({UNIFORM_BINDING}) var<uniform> u: Uniforms;"
            );
        }
        let _ = writeln!(
            out,
            "@group(0) @binding({SAMPLER_BINDING}) var s_texture: sampler;"
        );
        for (binding, name, value) in self.texture_bindings() {
            let _ = writeln!(
                out,
                "@group(0) @binding({binding}) var {name}: {};",
                value.wgsl_type()
            );
        }
        out
    }
}

/// A compilable WGSL program with its uniforms and defines.
#[derive(Debug)]
pub struct ShaderMaterial {
    id: MaterialId,
    label: String,
    vertex: String,
    fragment: String,
    uniforms: UniformRegistry,
    defines: Defines,
    filter: FilterMode,
    revision: u64,
}

impl ShaderMaterial {
    /// Creates a material using the shared fullscreen vertex stage.
    ///
    /// The fragment code must define `fn fs(in: VertexOutput) -> @location(0) vec4f`.
    pub fn new(
        label: impl Into<String>,
        fragment: impl Into<String>,
        uniforms: UniformRegistry,
    ) -> Self {
        Self {
            id: MaterialId(NEXT_MATERIAL_ID.fetch_add(1, Ordering::Relaxed)),
            label: label.into(),
            vertex: chunks::FULLSCREEN_VERTEX.to_string(),
            fragment: fragment.into(),
            uniforms,
            defines: Defines::new(),
            filter: FilterMode::Linear,
            revision: 0,
        }
    }

    /// Replaces the vertex stage. It must define `VertexOutput` and `vs`.
    pub fn with_vertex(mut self, vertex: impl Into<String>) -> Self {
        self.vertex = vertex.into();
        self
    }

    pub fn with_define(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.defines.insert(name.into(), value.into());
        self
    }

    pub fn with_filter(mut self, filter: FilterMode) -> Self {
        self.filter = filter;
        self
    }

    pub fn id(&self) -> MaterialId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Renames the material in draws and GPU debug labels.
    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    pub fn filter(&self) -> FilterMode {
        self.filter
    }

    /// Bumped whenever the program text or uniform declarations change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn uniforms(&self) -> &UniformRegistry {
        &self.uniforms
    }

    pub fn uniform(&self, name: &str) -> Option<&UniformValue> {
        self.uniforms.get(name)
    }

    /// Whether a depth texture uniform is bound to the depth attachment of `target`.
    pub fn samples_depth_of(&self, target: TargetId) -> bool {
        self.uniforms.iter().any(|(_, value)| {
            matches!(value, UniformValue::DepthTexture(Some(TextureRef::Depth(id))) if *id == target)
        })
    }

    /// Updates a uniform value. Never triggers recompilation.
    pub fn set_uniform(&mut self, name: &str, value: impl Into<UniformValue>) -> bool {
        self.uniforms.set(name, value)
    }

    pub fn defines(&self) -> &Defines {
        &self.defines
    }

    /// Sets a define, invalidating the program if the value changed.
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

    /// Swaps in a new program and uniform set.
    pub fn replace_program(
        &mut self,
        vertex: impl Into<String>,
        fragment: impl Into<String>,
        uniforms: UniformRegistry,
    ) {
        self.vertex = vertex.into();
        self.fragment = fragment.into();
        self.uniforms = uniforms;
        self.revision += 1;
    }

    pub fn vertex(&self) -> &str {
        &self.vertex
    }

    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    /// Assembles the full WGSL module: header, define constants, vertex and fragment.
    pub fn source(&self) -> Result<String, ComposeError> {
        let vertex = preprocess::evaluate(&self.label, &self.vertex, &self.defines)?;
        let fragment = preprocess::evaluate(&self.label, &self.fragment, &self.defines)?;

        let mut out = self.uniforms.wgsl_header();
        for (name, value) in &self.defines {
            if !value.is_empty() {
                let _ = writeln!(out, "const {name} = {value};");
            }
        }
        out.push('\n');
        out.push_str(&vertex);
        out.push('\n');
        out.push_str(&fragment);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_follows_wgsl_alignment() {
        let registry = UniformRegistry::new()
            .with("a", 1.0f32)
            .with("b", Vec3::ONE)
            .with("c", 2.0f32)
            .with("d", Vec2::ZERO)
            .with("tex", UniformValue::Texture(None));

        let layout = registry.layout();
        let offsets: Vec<_> = layout.fields.iter().map(|f| (f.name.as_str(), f.offset)).collect();
        // vec3 aligns to 16 and a following f32 packs into its tail.
        assert_eq!(offsets, vec![("a", 0), ("b", 16), ("c", 28), ("d", 32)]);
        assert_eq!(layout.size, 48);
    }

    #[test]
    fn pack_writes_values_at_offsets() {
        let registry = UniformRegistry::new()
            .with("x", 0.5f32)
            .with("v", Vec2::new(1.0, 2.0));
        let bytes = registry.pack();
        let floats: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(&floats[..4], &[0.5, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn set_rejects_type_mismatch() {
        let mut registry = UniformRegistry::new().with("x", 0.5f32);
        assert!(!registry.set("x", Vec2::ONE));
        assert!(registry.set("x", 0.25f32));
        assert_eq!(registry.get("x").and_then(UniformValue::as_f32), Some(0.25));
        assert!(!registry.set("missing", 1.0f32));
    }

    #[test]
    fn declare_keeps_first_value() {
        let mut registry = UniformRegistry::new();
        assert!(registry.declare("x", 1.0f32));
        assert!(!registry.declare("x", 2.0f32));
        assert_eq!(registry.get("x"), Some(&UniformValue::Float(1.0)));
    }

    #[test]
    fn header_lists_textures_after_sampler() {
        let registry = UniformRegistry::new()
            .with("t_diffuse", UniformValue::Texture(None))
            .with("opacity", 1.0f32)
            .with("t_depth", UniformValue::DepthTexture(None));
        let header = registry.wgsl_header();
        assert!(header.contains("opacity: f32,"));
        assert!(header.contains("@binding(2) var t_diffuse: texture_2d<f32>;"));
        assert!(header.contains("@binding(3) var t_depth: texture_depth_2d;"));
    }

    #[test]
    fn textures_only_skip_uniform_struct() {
        let registry = UniformRegistry::new().with("t_diffuse", UniformValue::Texture(None));
        assert!(!registry.wgsl_header().contains("struct Uniforms"));
    }

    #[test]
    fn define_changes_bump_revision_once() {
        let mut material = ShaderMaterial::new("m", "", UniformRegistry::new());
        material.set_define("SAMPLES", "8");
        material.set_define("SAMPLES", "8");
        assert_eq!(material.revision(), 1);
        material.set_uniform("nothing", 1.0f32);
        assert_eq!(material.revision(), 1);
    }

    #[test]
    fn source_emits_valued_defines_as_consts() {
        let material = ShaderMaterial::new(
            "m",
            "#ifdef FLAG\nfn flagged() {}\n#endif\n",
            UniformRegistry::new(),
        )
        .with_define("SAMPLES", "8")
        .with_define("FLAG", "");
        let source = material.source().unwrap();
        assert!(source.contains("const SAMPLES = 8;"));
        assert!(source.contains("fn flagged()"));
        assert!(!source.contains("const FLAG"));
    }

    #[test]
    fn depth_sampling_is_matched_by_target() {
        use crate::render_target::{RenderTarget, TargetOptions};

        let options = TargetOptions {
            stencil_buffer: true,
            ..Default::default()
        };
        let own = RenderTarget::new("own", 4, 4, options);
        let other = RenderTarget::new("other", 4, 4, options);
        let mut material = ShaderMaterial::new(
            "m",
            "",
            UniformRegistry::new()
                .with("t_depth", UniformValue::DepthTexture(None))
                .with("t_diffuse", UniformValue::Texture(Some(own.texture()))),
        );
        assert!(!material.samples_depth_of(own.id()));

        material.set_uniform("t_depth", UniformValue::DepthTexture(own.depth_texture()));
        assert!(material.samples_depth_of(own.id()));
        assert!(!material.samples_depth_of(other.id()));
    }
}
