//! Blend functions used to combine an effect's output with the running color.
//!
//! Every function combines the accumulated color `x` with the effect color `y` per
//! channel and is then mixed back into `x` by the effect's opacity:
//!
//! ```text
//! rgb = mix(x.rgb, f(x.rgb, y.rgb), opacity)
//! a   = max(x.a, y.a * opacity)
//! ```
//!
//! [`BlendFunction::Alpha`] is the exception: it mixes by `y.a * opacity` instead.
//! The WGSL emitted by [`BlendFunction::wgsl`] and the CPU reference
//! [`BlendFunction::apply`] implement the same formulas.

use std::fmt::Write as _;

use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Closed set of per-pixel combination rules.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendFunction {
    /// The effect contributes nothing; its `mainImage` is never called.
    Skip,
    #[default]
    Normal,
    Add,
    Alpha,
    Average,
    ColorBurn,
    ColorDodge,
    Darken,
    Difference,
    Divide,
    Exclusion,
    Lighten,
    Multiply,
    Negation,
    Overlay,
    Reflect,
    Screen,
    SoftLight,
    Subtract,
}

impl BlendFunction {
    pub const ALL: [BlendFunction; 19] = [
        BlendFunction::Skip,
        BlendFunction::Normal,
        BlendFunction::Add,
        BlendFunction::Alpha,
        BlendFunction::Average,
        BlendFunction::ColorBurn,
        BlendFunction::ColorDodge,
        BlendFunction::Darken,
        BlendFunction::Difference,
        BlendFunction::Divide,
        BlendFunction::Exclusion,
        BlendFunction::Lighten,
        BlendFunction::Multiply,
        BlendFunction::Negation,
        BlendFunction::Overlay,
        BlendFunction::Reflect,
        BlendFunction::Screen,
        BlendFunction::SoftLight,
        BlendFunction::Subtract,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BlendFunction::Skip => "skip",
            BlendFunction::Normal => "normal",
            BlendFunction::Add => "add",
            BlendFunction::Alpha => "alpha",
            BlendFunction::Average => "average",
            BlendFunction::ColorBurn => "color_burn",
            BlendFunction::ColorDodge => "color_dodge",
            BlendFunction::Darken => "darken",
            BlendFunction::Difference => "difference",
            BlendFunction::Divide => "divide",
            BlendFunction::Exclusion => "exclusion",
            BlendFunction::Lighten => "lighten",
            BlendFunction::Multiply => "multiply",
            BlendFunction::Negation => "negation",
            BlendFunction::Overlay => "overlay",
            BlendFunction::Reflect => "reflect",
            BlendFunction::Screen => "screen",
            BlendFunction::SoftLight => "soft_light",
            BlendFunction::Subtract => "subtract",
        }
    }

    /// Name of the generated WGSL function, `None` for [`BlendFunction::Skip`].
    pub fn wgsl_name(self) -> Option<String> {
        (self != BlendFunction::Skip).then(|| format!("blend_{}", self.name()))
    }

    fn rgb_expression(self) -> &'static str {
        match self {
            BlendFunction::Skip => "x",
            BlendFunction::Normal | BlendFunction::Alpha => "y",
            BlendFunction::Add => "x + y",
            BlendFunction::Average => "(x + y) * 0.5",
            BlendFunction::ColorBurn => {
                "select(max(vec3f(1.0) - (vec3f(1.0) - x) / y, vec3f(0.0)), y, y == vec3f(0.0))"
            }
            BlendFunction::ColorDodge => {
                "select(min(x / (vec3f(1.0) - y), vec3f(1.0)), y, y == vec3f(1.0))"
            }
            BlendFunction::Darken => "min(x, y)",
            BlendFunction::Difference => "abs(x - y)",
            BlendFunction::Divide => "select(vec3f(1.0), min(x / y, vec3f(1.0)), y > vec3f(0.0))",
            BlendFunction::Exclusion => "x + y - 2.0 * x * y",
            BlendFunction::Lighten => "max(x, y)",
            BlendFunction::Multiply => "x * y",
            BlendFunction::Negation => "vec3f(1.0) - abs(vec3f(1.0) - x - y)",
            BlendFunction::Overlay => {
                "select(vec3f(1.0) - 2.0 * (vec3f(1.0) - x) * (vec3f(1.0) - y), 2.0 * x * y, x < vec3f(0.5))"
            }
            BlendFunction::Reflect => {
                "select(min(x * x / (vec3f(1.0) - y), vec3f(1.0)), y, y == vec3f(1.0))"
            }
            BlendFunction::Screen => "vec3f(1.0) - (vec3f(1.0) - x) * (vec3f(1.0) - y)",
            BlendFunction::SoftLight => {
                "select(sqrt(x) * (2.0 * y - vec3f(1.0)) + 2.0 * x * (vec3f(1.0) - y), \
                 2.0 * x * y + x * x * (vec3f(1.0) - 2.0 * y), y < vec3f(0.5))"
            }
            BlendFunction::Subtract => "max(x - y, vec3f(0.0))",
        }
    }

    /// WGSL definition of `blend_<name>(x, y, opacity) -> vec4f`.
    ///
    /// Relies on `blend_finish` from [`BLEND_PRELUDE`]. Returns an empty string for
    /// [`BlendFunction::Skip`].
    pub fn wgsl(self) -> String {
        let Some(name) = self.wgsl_name() else {
            return String::new();
        };
        let mut out = String::new();
        let _ = writeln!(out, "fn {name}(base: vec4f, color: vec4f, opacity: f32) -> vec4f {{");
        let _ = writeln!(out, "    let x = base.rgb;");
        let _ = writeln!(out, "    let y = color.rgb;");
        if self == BlendFunction::Alpha {
            let _ = writeln!(out, "    return blend_finish(base, y, color, opacity * color.a);");
        } else {
            let _ = writeln!(out, "    return blend_finish(base, {}, color, opacity);", self.rgb_expression());
        }
        out.push_str("}\n");
        out
    }

    fn channel(self, x: f32, y: f32) -> f32 {
        match self {
            BlendFunction::Skip => x,
            BlendFunction::Normal | BlendFunction::Alpha => y,
            BlendFunction::Add => x + y,
            BlendFunction::Average => (x + y) * 0.5,
            BlendFunction::ColorBurn => {
                if y == 0.0 {
                    y
                } else {
                    (1.0 - (1.0 - x) / y).max(0.0)
                }
            }
            BlendFunction::ColorDodge => {
                if y == 1.0 {
                    y
                } else {
                    (x / (1.0 - y)).min(1.0)
                }
            }
            BlendFunction::Darken => x.min(y),
            BlendFunction::Difference => (x - y).abs(),
            BlendFunction::Divide => {
                if y > 0.0 {
                    (x / y).min(1.0)
                } else {
                    1.0
                }
            }
            BlendFunction::Exclusion => x + y - 2.0 * x * y,
            BlendFunction::Lighten => x.max(y),
            BlendFunction::Multiply => x * y,
            BlendFunction::Negation => 1.0 - (1.0 - x - y).abs(),
            BlendFunction::Overlay => {
                if x < 0.5 {
                    2.0 * x * y
                } else {
                    1.0 - 2.0 * (1.0 - x) * (1.0 - y)
                }
            }
            BlendFunction::Reflect => {
                if y == 1.0 {
                    y
                } else {
                    (x * x / (1.0 - y)).min(1.0)
                }
            }
            BlendFunction::Screen => 1.0 - (1.0 - x) * (1.0 - y),
            BlendFunction::SoftLight => {
                if y < 0.5 {
                    2.0 * x * y + x * x * (1.0 - 2.0 * y)
                } else {
                    x.sqrt() * (2.0 * y - 1.0) + 2.0 * x * (1.0 - y)
                }
            }
            BlendFunction::Subtract => (x - y).max(0.0),
        }
    }

    /// CPU reference implementation of the generated WGSL.
    pub fn apply(self, base: Vec4, color: Vec4, opacity: f32) -> Vec4 {
        if self == BlendFunction::Skip {
            return base;
        }
        let x = base.truncate();
        let y = color.truncate();
        let blended = Vec3::new(
            self.channel(x.x, y.x),
            self.channel(x.y, y.y),
            self.channel(x.z, y.z),
        );
        let factor = if self == BlendFunction::Alpha {
            opacity * color.w
        } else {
            opacity
        };
        x.lerp(blended, factor)
            .extend(base.w.max(color.w * opacity))
    }
}

/// Shared helper every generated blend function ends with.
pub const BLEND_PRELUDE: &str = "\
fn blend_finish(base: vec4f, rgb: vec3f, color: vec4f, opacity: f32) -> vec4f {
    return vec4f(mix(base.rgb, rgb, opacity), max(base.a, color.a * opacity));
}
";

/// A blend function together with its opacity.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlendMode {
    pub function: BlendFunction,
    pub opacity: f32,
}

impl Default for BlendMode {
    fn default() -> Self {
        Self::new(BlendFunction::Normal)
    }
}

impl BlendMode {
    pub fn new(function: BlendFunction) -> Self {
        Self {
            function,
            opacity: 1.0,
        }
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn apply(&self, base: Vec4, color: Vec4) -> Vec4 {
        self.function.apply(base, color, self.opacity)
    }
}
