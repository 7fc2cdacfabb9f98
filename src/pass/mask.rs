use std::any::Any;
use std::rc::Rc;

use super::{MaskRole, Pass, PassState};
use crate::camera::SharedCamera;
use crate::error::RenderError;
use crate::render_target::RenderTarget;
use crate::renderer::{ClearFlags, Renderer, Scene, StencilState};

/// Writes a stencil mask from a scene into both buffers.
///
/// Color and depth writes are disabled while the mask is drawn. Afterwards the
/// stencil test stays enabled with `Equal 1`, restricting every following draw to
/// the masked region until a [`ClearMaskPass`] runs.
pub struct MaskPass {
    state: PassState,
    scene: Rc<dyn Scene>,
    camera: SharedCamera,
    inverse: bool,
}

impl MaskPass {
    pub fn new(scene: Rc<dyn Scene>, camera: SharedCamera) -> Self {
        Self {
            state: PassState {
                clear: true,
                ..PassState::in_place()
            },
            scene,
            camera,
            inverse: false,
        }
    }

    /// Mask everything except the scene's coverage.
    pub fn inverted(mut self) -> Self {
        self.inverse = true;
        self
    }

    pub fn set_inverse(&mut self, inverse: bool) {
        self.inverse = inverse;
    }

    pub fn is_inverse(&self) -> bool {
        self.inverse
    }
}

impl Pass for MaskPass {
    fn name(&self) -> &str {
        "MaskPass"
    }

    fn state(&self) -> &PassState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut PassState {
        &mut self.state
    }

    fn mask_role(&self) -> MaskRole {
        MaskRole::Begin
    }

    fn render(
        &mut self,
        renderer: &mut dyn Renderer,
        write: &RenderTarget,
        read: &RenderTarget,
        _delta: f32,
        _mask_active: bool,
    ) -> Result<(), RenderError> {
        self.state.check_live(self.name())?;

        let (write_value, clear_value) = if self.inverse { (0, 1) } else { (1, 0) };

        let state = renderer.state_mut();
        state.color_write = false;
        state.depth_write = false;
        state.stencil = StencilState {
            test: true,
            compare: wgpu::CompareFunction::Always,
            pass_op: wgpu::StencilOperation::Replace,
            reference: write_value,
            clear: clear_value,
            ..StencilState::default()
        };

        let camera = self.camera.borrow();
        for target in [read, write] {
            if self.state.clear {
                renderer.clear(Some(target), ClearFlags::STENCIL)?;
            }
            renderer.render_scene(self.scene.as_ref(), &camera, Some(target), false, None)?;
        }

        let state = renderer.state_mut();
        state.color_write = true;
        state.depth_write = true;
        state.stencil = StencilState {
            test: true,
            compare: wgpu::CompareFunction::Equal,
            pass_op: wgpu::StencilOperation::Keep,
            reference: 1,
            ..StencilState::default()
        };
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Disables the stencil test enabled by a [`MaskPass`].
pub struct ClearMaskPass {
    state: PassState,
}

impl Default for ClearMaskPass {
    fn default() -> Self {
        Self::new()
    }
}

impl ClearMaskPass {
    pub fn new() -> Self {
        Self {
            state: PassState::in_place(),
        }
    }
}

impl Pass for ClearMaskPass {
    fn name(&self) -> &str {
        "ClearMaskPass"
    }

    fn state(&self) -> &PassState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut PassState {
        &mut self.state
    }

    fn mask_role(&self) -> MaskRole {
        MaskRole::End
    }

    fn render(
        &mut self,
        renderer: &mut dyn Renderer,
        _write: &RenderTarget,
        _read: &RenderTarget,
        _delta: f32,
        _mask_active: bool,
    ) -> Result<(), RenderError> {
        self.state.check_live(self.name())?;
        renderer.state_mut().stencil.test = false;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
