//! Shared WGSL building blocks and the small utility programs built from them.

use glam::{Vec2, Vec4};

use crate::material::{ShaderMaterial, UniformRegistry, UniformValue};

/// Fullscreen triangle vertex stage defining `VertexOutput` and `vs`.
pub const FULLSCREEN_VERTEX: &str = include_str!("wgsl/fullscreen.wgsl");

/// Copies `t_diffuse` scaled by `opacity`.
pub const COPY_FRAGMENT: &str = include_str!("wgsl/copy.wgsl");

/// Helpers available to every merged effect program: `luminance`,
/// `sample_input`, `linearize_depth` and `depth_to_unit`.
pub const COMMON_FUNCTIONS: &str = include_str!("wgsl/common.wgsl");

/// `read_depth`, included only when a depth texture is bound as `t_depth`.
pub const DEPTH_FUNCTIONS: &str = include_str!("wgsl/depth.wgsl");

/// Luminance high-pass filter with a smooth threshold.
pub const LUMINANCE_FRAGMENT: &str = include_str!("wgsl/luminance.wgsl");

/// One Kawase blur iteration.
pub const KAWASE_BLUR_FRAGMENT: &str = include_str!("wgsl/kawase_blur.wgsl");

/// Converts a depth attachment into a color texture.
pub const DEPTH_PACKING_FRAGMENT: &str = include_str!("wgsl/depth_packing.wgsl");

/// A material that copies its input texture.
pub fn copy_material(label: &str) -> ShaderMaterial {
    ShaderMaterial::new(
        label,
        COPY_FRAGMENT,
        UniformRegistry::new()
            .with("t_diffuse", UniformValue::Texture(None))
            .with("opacity", 1.0f32),
    )
}

/// A luminance high-pass material. With `color_output` the input color is kept
/// and attenuated instead of being reduced to a gray value.
pub fn luminance_material(label: &str, threshold: f32, smoothing: f32, color_output: bool) -> ShaderMaterial {
    let material = ShaderMaterial::new(
        label,
        LUMINANCE_FRAGMENT,
        UniformRegistry::new()
            .with("t_diffuse", UniformValue::Texture(None))
            .with("threshold", threshold)
            .with("smoothing", smoothing),
    );
    if color_output {
        material.with_define("COLOR_OUTPUT", "")
    } else {
        material
    }
}

/// A Kawase blur material. `kernel` and `texel_size` are updated per iteration.
pub fn blur_material(label: &str) -> ShaderMaterial {
    ShaderMaterial::new(
        label,
        KAWASE_BLUR_FRAGMENT,
        UniformRegistry::new()
            .with("t_diffuse", UniformValue::Texture(None))
            .with("texel_size", Vec2::ONE)
            .with("kernel", 0.0f32)
            .with("scale", 1.0f32),
    )
}

/// Kernel offsets of the Kawase blur for the given size preset.
pub fn kawase_kernel(size: KernelSize) -> &'static [f32] {
    match size {
        KernelSize::VerySmall => &[0.0, 1.0, 1.0],
        KernelSize::Small => &[0.0, 1.0, 1.0, 2.0],
        KernelSize::Medium => &[0.0, 1.0, 2.0, 2.0, 3.0],
        KernelSize::Large => &[0.0, 1.0, 2.0, 3.0, 4.0, 4.0, 5.0],
        KernelSize::VeryLarge => &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 7.0, 8.0, 9.0, 10.0],
    }
}

/// Blur strength presets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelSize {
    VerySmall,
    Small,
    #[default]
    Medium,
    Large,
    VeryLarge,
}

/// CPU mirror of the `pack_depth` WGSL helper.
pub fn pack_depth(v: f32) -> Vec4 {
    let enc = (Vec4::new(1.0, 255.0, 65025.0, 16_581_375.0) * v).fract();
    enc - Vec4::new(enc.y, enc.z, enc.w, enc.w) * Vec4::new(1.0 / 255.0, 1.0 / 255.0, 1.0 / 255.0, 0.0)
}

/// Inverse of [`pack_depth`].
pub fn unpack_depth(packed: Vec4) -> f32 {
    packed.dot(Vec4::new(1.0, 1.0 / 255.0, 1.0 / 65025.0, 1.0 / 16_581_375.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_material_compiles_to_a_complete_module() {
        let source = copy_material("copy").source().unwrap();
        assert!(source.contains("fn vs("));
        assert!(source.contains("fn fs("));
        assert!(source.contains("opacity: f32"));
        assert!(source.contains("var t_diffuse: texture_2d<f32>;"));
    }

    #[test]
    fn luminance_output_mode_follows_define() {
        let gray = luminance_material("l", 0.5, 0.1, false).source().unwrap();
        let color = luminance_material("l", 0.5, 0.1, true).source().unwrap();
        assert!(gray.contains("vec3f(l * mask)"));
        assert!(!gray.contains("color.rgb * mask"));
        assert!(color.contains("color.rgb * mask"));
    }

    #[test]
    fn packed_depth_is_recoverable() {
        let depth = 0.372_51;
        assert!((unpack_depth(pack_depth(depth)) - depth).abs() < 1e-5);
    }

    #[test]
    fn kernels_grow_with_size() {
        assert!(kawase_kernel(KernelSize::VerySmall).len() < kawase_kernel(KernelSize::VeryLarge).len());
    }
}
