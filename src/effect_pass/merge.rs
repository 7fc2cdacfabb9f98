//! Merging effects into one fullscreen program.
//!
//! The merge is a pure function from an ordered list of effect descriptions to a
//! [`MergedProgram`]: the WGSL vertex and fragment text plus the flat uniform
//! registry. Nothing here touches the GPU, so the generated program can be
//! inspected and compared directly.
//!
//! Effect `i` has everything it declares at module scope, its uniforms and its
//! valued defines prefixed with `e{i}_`, which makes independently written effects
//! collision free. The generated `fs` threads one running color through the
//! effects in order:
//!
//! ```wgsl
//! var uv = in.uv;
//! uv = e1_mainUv(uv);
//! var color = sample_input(uv);
//! color = blend_screen(color, e0_mainImage(color, uv), u.e0_opacity);
//! color = blend_normal(color, e1_mainImage(color, uv), u.e1_opacity);
//! return color;
//! ```

use std::collections::HashMap;
use std::fmt::Write as _;

use glam::Vec2;

use crate::effect::{EffectAttributes, EffectCore};
use crate::error::ComposeError;
use crate::material::{Defines, UniformRegistry, UniformValue};
use crate::shader::blend::BLEND_PRELUDE;
use crate::shader::{chunks, preprocess, BlendFunction, BlendMode};

/// Values every merged program provides, readable by bare name in effect code.
pub const COMMON_UNIFORMS: [(&str, UniformValue); 6] = [
    ("resolution", UniformValue::Vec2(Vec2::ONE)),
    ("texel_size", UniformValue::Vec2(Vec2::ONE)),
    ("aspect", UniformValue::Float(1.0)),
    ("time", UniformValue::Float(0.0)),
    ("camera_near", UniformValue::Float(0.1)),
    ("camera_far", UniformValue::Float(1000.0)),
];

/// Names effects may not declare themselves.
const RESERVED: [&str; 6] = ["t_diffuse", "t_depth", "opacity", "support", "fs", "vs"];

fn is_common(name: &str) -> bool {
    COMMON_UNIFORMS.iter().any(|(common, _)| *common == name)
}

/// One effect as seen by the merge.
#[derive(Clone, Copy, Debug)]
pub struct MergeInput<'a> {
    pub name: &'a str,
    pub fragment: &'a str,
    pub vertex: Option<&'a str>,
    pub uniforms: &'a UniformRegistry,
    pub defines: &'a Defines,
    pub blend: BlendMode,
    pub attributes: EffectAttributes,
}

impl<'a> MergeInput<'a> {
    pub fn from_core(core: &'a EffectCore) -> Self {
        Self {
            name: core.name(),
            fragment: core.fragment(),
            vertex: core.vertex(),
            uniforms: core.uniforms(),
            defines: core.defines(),
            blend: core.blend(),
            attributes: core.attributes(),
        }
    }
}

/// Where a user-facing uniform ended up in the merged registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UniformSlot {
    /// `<effect>.<uniform>` for effect uniforms, the bare name for common values.
    pub qualified: String,
    /// Name in the merged registry and WGSL.
    pub ident: String,
    /// Index of the owning effect.
    pub effect: Option<usize>,
    /// Name of the uniform inside its effect.
    pub local: String,
}

/// The result of merging a list of effects.
#[derive(Clone, Debug, PartialEq)]
pub struct MergedProgram {
    pub vertex: String,
    pub fragment: String,
    pub uniforms: UniformRegistry,
    pub slots: Vec<UniformSlot>,
    pub attributes: EffectAttributes,
}

impl MergedProgram {
    pub fn ident(&self, qualified: &str) -> Option<&str> {
        self.slots
            .iter()
            .find(|slot| slot.qualified == qualified)
            .map(|slot| slot.ident.as_str())
    }

    pub fn slot(&self, qualified: &str) -> Option<&UniformSlot> {
        self.slots.iter().find(|slot| slot.qualified == qualified)
    }

    /// Slots owned by effect `index`.
    pub fn effect_slots(&self, index: usize) -> impl Iterator<Item = &UniformSlot> {
        self.slots.iter().filter(move |slot| slot.effect == Some(index))
    }
}

pub fn opacity_ident(index: usize) -> String {
    format!("e{index}_opacity")
}

struct Prepared {
    fragment: String,
    vertex: Option<String>,
    consts: Vec<(String, String)>,
    has_image: bool,
    has_uv: bool,
    has_support: bool,
}

fn prepare(index: usize, input: &MergeInput<'_>) -> Result<Prepared, ComposeError> {
    let collision = |name: &str| ComposeError::NameCollision {
        effect: input.name.to_string(),
        name: name.to_string(),
    };

    let fragment = preprocess::evaluate(input.name, input.fragment, input.defines)?;
    let vertex = input
        .vertex
        .map(|vertex| preprocess::evaluate(input.name, vertex, input.defines))
        .transpose()?;

    let has_image = preprocess::declares_function(&fragment, "mainImage");
    let has_uv = preprocess::declares_function(&fragment, "mainUv");
    if !has_image && !has_uv {
        return Err(ComposeError::MissingEntryPoint(input.name.to_string()));
    }
    let has_support = vertex
        .as_deref()
        .is_some_and(|vertex| preprocess::declares_function(vertex, "mainSupport"));

    for (name, _) in input.uniforms.iter() {
        if input.defines.contains_key(name) || is_common(name) || RESERVED.contains(&name) {
            return Err(collision(name));
        }
    }

    let mut declared = preprocess::declared_names(&fragment);
    if let Some(vertex) = &vertex {
        declared.extend(preprocess::declared_names(vertex));
    }
    for name in &declared {
        let valued_define = input.defines.get(name).is_some_and(|v| !v.is_empty());
        if is_common(name) || RESERVED.contains(&name.as_str()) || input.uniforms.contains(name) || valued_define {
            return Err(collision(name));
        }
    }

    let prefix = |name: &str| format!("e{index}_{name}");
    let mut renames: HashMap<String, String> = COMMON_UNIFORMS
        .iter()
        .map(|(name, _)| (name.to_string(), format!("u.{name}")))
        .collect();
    for name in declared {
        let renamed = prefix(&name);
        renames.insert(name, renamed);
    }
    for (name, value) in input.uniforms.iter() {
        let renamed = if value.is_texture() {
            prefix(name)
        } else {
            format!("u.{}", prefix(name))
        };
        renames.insert(name.to_string(), renamed);
    }
    let mut consts = Vec::new();
    for (name, value) in input.defines {
        if !value.is_empty() {
            renames.insert(name.clone(), prefix(name));
            consts.push((prefix(name), value.clone()));
        }
    }
    if has_support {
        renames.insert("support".to_string(), prefix("support"));
    }

    Ok(Prepared {
        fragment: preprocess::rename_identifiers(&fragment, &renames),
        vertex: vertex.map(|vertex| preprocess::rename_identifiers(&vertex, &renames)),
        consts,
        has_image,
        has_uv,
        has_support,
    })
}

/// Merges `inputs` in order into a single program.
pub fn merge(pass_label: &str, inputs: &[MergeInput<'_>]) -> Result<MergedProgram, ComposeError> {
    for (i, input) in inputs.iter().enumerate() {
        if inputs[..i].iter().any(|other| other.name == input.name) {
            return Err(ComposeError::DuplicateEffect {
                pass: pass_label.to_string(),
                effect: input.name.to_string(),
            });
        }
    }

    let prepared = inputs
        .iter()
        .enumerate()
        .map(|(i, input)| prepare(i, input))
        .collect::<Result<Vec<_>, _>>()?;

    let attributes = inputs
        .iter()
        .fold(EffectAttributes::NONE, |acc, input| acc.union(input.attributes));
    let convolutions: Vec<&str> = inputs
        .iter()
        .filter(|input| input.attributes.convolution)
        .map(|input| input.name)
        .collect();
    if convolutions.len() > 1 {
        tracing::warn!(
            pass = pass_label,
            effects = ?convolutions,
            "more than one convolution effect in a single pass; each reads the unmodified input"
        );
    }

    let mut uniforms = UniformRegistry::new();
    let mut slots = Vec::new();
    uniforms.declare("t_diffuse", UniformValue::Texture(None));
    for (name, value) in COMMON_UNIFORMS {
        uniforms.declare(name, value);
        slots.push(UniformSlot {
            qualified: name.to_string(),
            ident: name.to_string(),
            effect: None,
            local: name.to_string(),
        });
    }
    if attributes.depth {
        uniforms.declare("t_depth", UniformValue::DepthTexture(None));
    }
    for (i, input) in inputs.iter().enumerate() {
        for (name, value) in input.uniforms.iter() {
            let ident = format!("e{i}_{name}");
            uniforms.declare(ident.clone(), *value);
            slots.push(UniformSlot {
                qualified: format!("{}.{name}", input.name),
                ident,
                effect: Some(i),
                local: name.to_string(),
            });
        }
        let ident = opacity_ident(i);
        uniforms.declare(ident.clone(), input.blend.opacity);
        slots.push(UniformSlot {
            qualified: format!("{}.opacity", input.name),
            ident,
            effect: Some(i),
            local: "opacity".to_string(),
        });
    }

    Ok(MergedProgram {
        vertex: merge_vertex(&prepared),
        fragment: merge_fragment(inputs, &prepared, attributes),
        uniforms,
        slots,
        attributes,
    })
}

fn merge_vertex(prepared: &[Prepared]) -> String {
    if !prepared.iter().any(|p| p.has_support) {
        return chunks::FULLSCREEN_VERTEX.to_string();
    }

    let mut out = String::new();
    out.push_str("struct VertexOutput {\n");
    out.push_str("    @builtin(position) position: vec4f,\n");
    out.push_str("    @location(0) uv: vec2f,\n");
    let mut location = 1;
    for (i, p) in prepared.iter().enumerate() {
        if p.has_support {
            let _ = writeln!(out, "    @location({location}) support{i}: vec4f,");
            location += 1;
        }
    }
    out.push_str("}\n\n");

    for p in prepared {
        if let Some(vertex) = p.vertex.as_deref().filter(|_| p.has_support) {
            out.push_str(vertex);
            out.push('\n');
        }
    }

    out.push_str("@vertex\nfn vs(@builtin(vertex_index) vi: u32) -> VertexOutput {\n");
    out.push_str("    let corner = vec2f(f32((vi << 1u) & 2u), f32(vi & 2u));\n");
    out.push_str("    var out: VertexOutput;\n");
    out.push_str("    out.position = vec4f(corner * 2.0 - 1.0, 0.0, 1.0);\n");
    out.push_str("    out.uv = vec2f(corner.x, 1.0 - corner.y);\n");
    for (i, p) in prepared.iter().enumerate() {
        if p.has_support {
            let _ = writeln!(out, "    out.support{i} = e{i}_mainSupport(out.uv);");
        }
    }
    out.push_str("    return out;\n}\n");
    out
}

fn merge_fragment(inputs: &[MergeInput<'_>], prepared: &[Prepared], attributes: EffectAttributes) -> String {
    let blended: Vec<(usize, BlendFunction)> = inputs
        .iter()
        .zip(prepared)
        .enumerate()
        .filter(|(_, (input, p))| p.has_image && input.blend.function != BlendFunction::Skip)
        .map(|(i, (input, _))| (i, input.blend.function))
        .collect();

    let mut out = String::new();
    out.push_str(BLEND_PRELUDE);
    let mut emitted: Vec<BlendFunction> = Vec::new();
    for (_, function) in &blended {
        if !emitted.contains(function) {
            out.push_str(&function.wgsl());
            emitted.push(*function);
        }
    }
    out.push('\n');
    out.push_str(chunks::COMMON_FUNCTIONS);
    if attributes.depth {
        out.push('\n');
        out.push_str(chunks::DEPTH_FUNCTIONS);
    }

    for (i, (input, p)) in inputs.iter().zip(prepared).enumerate() {
        let _ = writeln!(out, "\n// {}", input.name);
        for (name, value) in &p.consts {
            let _ = writeln!(out, "const {name} = {value};");
        }
        if p.has_support {
            let _ = writeln!(out, "var<private> e{i}_support: vec4f;");
        }
        out.push_str(&p.fragment);
        if !p.fragment.ends_with('\n') {
            out.push('\n');
        }
    }

    out.push_str("\n@fragment\nfn fs(in: VertexOutput) -> @location(0) vec4f {\n");
    out.push_str("    var uv = in.uv;\n");
    for (i, p) in prepared.iter().enumerate() {
        if p.has_support {
            let _ = writeln!(out, "    e{i}_support = in.support{i};");
        }
    }
    for (i, p) in prepared.iter().enumerate() {
        if p.has_uv {
            let _ = writeln!(out, "    uv = e{i}_mainUv(uv);");
        }
    }
    out.push_str("    var color = sample_input(uv);\n");
    if attributes.depth {
        out.push_str("    let depth = read_depth(uv);\n");
    }
    for (i, function) in &blended {
        let Some(name) = function.wgsl_name() else {
            continue;
        };
        let depth_arg = if inputs[*i].attributes.depth { ", depth" } else { "" };
        let _ = writeln!(
            out,
            "    color = {name}(color, e{i}_mainImage(color, uv{depth_arg}), u.e{i}_opacity);"
        );
    }
    out.push_str("    return color;\n}\n");
    out
}
