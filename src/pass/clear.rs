use std::any::Any;

use glam::Vec4;

use super::{Pass, PassState};
use crate::error::RenderError;
use crate::render_target::RenderTarget;
use crate::renderer::{ClearFlags, Renderer};

/// Clears the read buffer, or the screen when rendering to screen.
pub struct ClearPass {
    state: PassState,
    flags: ClearFlags,
    clear_color: Option<Vec4>,
}

impl ClearPass {
    pub fn new(flags: ClearFlags) -> Self {
        Self {
            state: PassState::in_place(),
            flags,
            clear_color: None,
        }
    }

    pub fn with_clear_color(mut self, color: Vec4) -> Self {
        self.clear_color = Some(color);
        self
    }

    pub fn flags(&self) -> ClearFlags {
        self.flags
    }
}

impl Default for ClearPass {
    fn default() -> Self {
        Self::new(ClearFlags::ALL)
    }
}

impl Pass for ClearPass {
    fn name(&self) -> &str {
        "ClearPass"
    }

    fn state(&self) -> &PassState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut PassState {
        &mut self.state
    }

    fn render(
        &mut self,
        renderer: &mut dyn Renderer,
        _write: &RenderTarget,
        read: &RenderTarget,
        _delta: f32,
        _mask_active: bool,
    ) -> Result<(), RenderError> {
        self.state.check_live(self.name())?;
        let saved = self.clear_color.map(|color| {
            let saved = renderer.clear_color();
            renderer.set_clear_color(color);
            saved
        });
        let result = renderer.clear(self.state.output(read), self.flags);
        if let Some(saved) = saved {
            renderer.set_clear_color(saved);
        }
        result
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
    use crate::render_target::TargetOptions;
    use crate::testing::{Call, RecordingRenderer};

    #[test]
    fn clears_read_buffer_with_flags() {
        let mut renderer = RecordingRenderer::new(2, 2);
        let read = RenderTarget::new("read", 2, 2, TargetOptions::default());
        let mut pass = ClearPass::new(ClearFlags::COLOR).with_clear_color(Vec4::ONE);
        pass.render(&mut renderer, &read, &read, 0.0, false).unwrap();
        assert!(matches!(
            renderer.calls.as_slice(),
            [Call::Clear { target: Some(id), flags, .. }] if *id == read.id() && *flags == ClearFlags::COLOR
        ));
        assert_eq!(renderer.clear_color, Vec4::new(0.0, 0.0, 0.0, 1.0));
    }
}
