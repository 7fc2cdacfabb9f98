//! The renderer contract passes are written against.
//!
//! Passes never touch wgpu directly. They describe work through the narrow
//! [`Renderer`] trait: render a scene, clear a target, draw a fullscreen material.
//! [`GpuRenderer`] implements it on wgpu; tests use a recording implementation.
//!
//! A `None` target always means the output surface.

mod gpu_renderer;

pub use gpu_renderer::GpuRenderer;

use glam::Vec4;

use crate::camera::Camera;
use crate::error::{ComposeError, RenderError};
use crate::gpu::GpuContext;
use crate::material::{MaterialId, ShaderMaterial};
use crate::render_target::{RenderTarget, TargetId};
use crate::texture::TextureData;

/// Stencil configuration applied to subsequent draws.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StencilState {
    /// Whether draws attach the depth-stencil buffer and run the stencil test.
    pub test: bool,
    pub compare: wgpu::CompareFunction,
    /// Operation applied where the stencil test passes.
    pub pass_op: wgpu::StencilOperation,
    pub reference: u32,
    pub read_mask: u32,
    pub write_mask: u32,
    /// Value written by stencil clears.
    pub clear: u32,
}

impl Default for StencilState {
    fn default() -> Self {
        Self {
            test: false,
            compare: wgpu::CompareFunction::Always,
            pass_op: wgpu::StencilOperation::Keep,
            reference: 0,
            read_mask: 0xff,
            write_mask: 0xff,
            clear: 0,
        }
    }
}

impl StencilState {
    pub fn face(&self) -> wgpu::StencilFaceState {
        wgpu::StencilFaceState {
            compare: self.compare,
            fail_op: wgpu::StencilOperation::Keep,
            depth_fail_op: wgpu::StencilOperation::Keep,
            pass_op: self.pass_op,
        }
    }
}

/// Global raster state, the equivalent of a GL context's masks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderState {
    pub color_write: bool,
    pub depth_write: bool,
    pub stencil: StencilState,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            color_write: true,
            depth_write: true,
            stencil: StencilState::default(),
        }
    }
}

/// Which attachments a clear touches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClearFlags {
    pub color: bool,
    pub depth: bool,
    pub stencil: bool,
}

impl ClearFlags {
    pub const ALL: ClearFlags = ClearFlags {
        color: true,
        depth: true,
        stencil: true,
    };
    pub const COLOR: ClearFlags = ClearFlags {
        color: true,
        depth: false,
        stencil: false,
    };
    pub const STENCIL: ClearFlags = ClearFlags {
        color: false,
        depth: false,
        stencil: true,
    };
}

/// How a fullscreen draw binds its target's depth-stencil attachment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DepthStencilAccess {
    Detached,
    ReadWrite,
    /// Attached for the stencil test only. Used when the draw also samples the
    /// target's depth, which a writable attachment would alias.
    ReadOnly,
}

impl DepthStencilAccess {
    /// Access needed to draw `material` into `target` under `stencil`.
    pub fn for_draw(material: &ShaderMaterial, target: Option<&RenderTarget>, stencil: &StencilState) -> Self {
        match target {
            Some(target) if stencil.test && target.options().has_depth_stencil() => {
                if material.samples_depth_of(target.id()) {
                    Self::ReadOnly
                } else {
                    Self::ReadWrite
                }
            }
            _ => Self::Detached,
        }
    }

    pub fn is_attached(self) -> bool {
        self != Self::Detached
    }
}

/// What a scene gets to draw with.
pub struct SceneDrawContext<'a, 'p> {
    pub gpu: &'a GpuContext,
    pub pass: &'a mut wgpu::RenderPass<'p>,
    pub camera: &'a Camera,
    pub state: &'a RenderState,
    pub color_format: wgpu::TextureFormat,
    /// Present when the target has a depth-stencil attachment.
    pub depth_format: Option<wgpu::TextureFormat>,
    pub size: (u32, u32),
    /// A material the scene should use in place of its own, if it supports it.
    pub override_material: Option<&'a ShaderMaterial>,
}

/// Host-owned geometry. The composer never looks inside; it only asks the scene to
/// record its draws into an open render pass.
pub trait Scene {
    fn draw(&self, ctx: &mut SceneDrawContext<'_, '_>);
}

/// The operations passes need from the rendering backend.
pub trait Renderer {
    fn size(&self) -> (u32, u32);
    fn set_size(&mut self, width: u32, height: u32);

    fn clear_color(&self) -> Vec4;
    fn set_clear_color(&mut self, color: Vec4);

    fn state(&self) -> &RenderState;
    fn state_mut(&mut self) -> &mut RenderState;

    /// Renders `scene` into `target`, clearing color and depth first when `clear`.
    fn render_scene(
        &mut self,
        scene: &dyn Scene,
        camera: &Camera,
        target: Option<&RenderTarget>,
        clear: bool,
        override_material: Option<&ShaderMaterial>,
    ) -> Result<(), RenderError>;

    fn clear(&mut self, target: Option<&RenderTarget>, flags: ClearFlags) -> Result<(), RenderError>;

    /// Builds the program for `material` ahead of its first draw.
    fn compile(&mut self, material: &ShaderMaterial) -> Result<(), ComposeError>;

    /// Draws a fullscreen triangle with `material`.
    fn draw_fullscreen(
        &mut self,
        material: &ShaderMaterial,
        target: Option<&RenderTarget>,
        clear: bool,
    ) -> Result<(), RenderError>;

    /// Uploads texel data so it can be bound through [`TextureData::texture`].
    fn upload_texture(&mut self, data: &TextureData) -> Result<(), RenderError>;

    fn release_target(&mut self, id: TargetId);
    fn release_material(&mut self, id: MaterialId);

    fn begin_frame(&mut self) -> Result<(), RenderError>;
    fn end_frame(&mut self) -> Result<(), RenderError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::{UniformRegistry, UniformValue};
    use crate::render_target::TargetOptions;

    fn depth_material() -> ShaderMaterial {
        ShaderMaterial::new(
            "depth",
            "",
            UniformRegistry::new().with("t_depth", UniformValue::DepthTexture(None)),
        )
    }

    fn masked() -> StencilState {
        StencilState {
            test: true,
            compare: wgpu::CompareFunction::Equal,
            reference: 1,
            ..StencilState::default()
        }
    }

    #[test]
    fn sampling_the_target_depth_attaches_read_only() {
        let options = TargetOptions {
            stencil_buffer: true,
            ..Default::default()
        };
        let target = RenderTarget::new("buffer", 8, 8, options);
        let other = RenderTarget::new("other", 8, 8, options);
        let mut material = depth_material();

        material.set_uniform("t_depth", UniformValue::DepthTexture(target.depth_texture()));
        assert_eq!(
            DepthStencilAccess::for_draw(&material, Some(&target), &masked()),
            DepthStencilAccess::ReadOnly
        );
        assert_eq!(
            DepthStencilAccess::for_draw(&material, Some(&other), &masked()),
            DepthStencilAccess::ReadWrite
        );
    }

    #[test]
    fn unmasked_or_plain_targets_stay_detached() {
        let plain = RenderTarget::new("plain", 8, 8, TargetOptions::default());
        let material = depth_material();
        assert_eq!(
            DepthStencilAccess::for_draw(&material, Some(&plain), &masked()),
            DepthStencilAccess::Detached
        );
        assert_eq!(
            DepthStencilAccess::for_draw(&material, None, &masked()),
            DepthStencilAccess::Detached
        );
        let stencil = RenderTarget::new(
            "stencil",
            8,
            8,
            TargetOptions {
                stencil_buffer: true,
                ..Default::default()
            },
        );
        assert!(!DepthStencilAccess::for_draw(&material, Some(&stencil), &StencilState::default()).is_attached());
    }
}
