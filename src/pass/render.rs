use std::any::Any;
use std::rc::Rc;

use glam::Vec4;

use super::{Pass, PassState};
use crate::camera::SharedCamera;
use crate::error::RenderError;
use crate::material::ShaderMaterial;
use crate::render_target::RenderTarget;
use crate::renderer::{Renderer, Scene};

/// Renders a scene into the read buffer, usually as the first pass of a pipeline.
pub struct RenderPass {
    state: PassState,
    scene: Rc<dyn Scene>,
    camera: SharedCamera,
    clear_color: Option<Vec4>,
    override_material: Option<ShaderMaterial>,
}

impl RenderPass {
    pub fn new(scene: Rc<dyn Scene>, camera: SharedCamera) -> Self {
        Self {
            state: PassState {
                clear: true,
                ..PassState::in_place()
            },
            scene,
            camera,
            clear_color: None,
            override_material: None,
        }
    }

    /// Clears with this color instead of the renderer's.
    pub fn with_clear_color(mut self, color: Vec4) -> Self {
        self.clear_color = Some(color);
        self
    }

    /// Asks the scene to draw everything with `material`.
    pub fn with_override_material(mut self, material: ShaderMaterial) -> Self {
        self.override_material = Some(material);
        self
    }

    pub fn override_material(&self) -> Option<&ShaderMaterial> {
        self.override_material.as_ref()
    }
}

impl Pass for RenderPass {
    fn name(&self) -> &str {
        "RenderPass"
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

        let target = (!self.state.render_to_screen).then_some(read);
        let camera = self.camera.borrow();
        let result = renderer.render_scene(
            self.scene.as_ref(),
            &camera,
            target,
            self.state.clear,
            self.override_material.as_ref(),
        );

        if let Some(saved) = saved {
            renderer.set_clear_color(saved);
        }
        result
    }

    fn dispose(&mut self, renderer: &mut dyn Renderer) {
        if let Some(material) = &self.override_material {
            renderer.release_material(material.id());
        }
        self.state.disposed = true;
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
    use crate::testing::{camera, Call, EmptyScene, RecordingRenderer};

    #[test]
    fn renders_into_read_buffer_and_restores_clear_color() {
        let mut renderer = RecordingRenderer::new(4, 4);
        let read = RenderTarget::new("read", 4, 4, TargetOptions::default());
        let write = RenderTarget::new("write", 4, 4, TargetOptions::default());
        let mut pass = RenderPass::new(Rc::new(EmptyScene), camera()).with_clear_color(Vec4::ONE);

        pass.render(&mut renderer, &write, &read, 0.016, false).unwrap();

        assert!(matches!(
            renderer.calls.as_slice(),
            [Call::RenderScene { target: Some(id), clear: true, .. }] if *id == read.id()
        ));
        assert_eq!(renderer.clear_color, Vec4::new(0.0, 0.0, 0.0, 1.0));
        assert!(!pass.state().needs_swap);
    }

    #[test]
    fn override_material_reaches_the_renderer() {
        let mut renderer = RecordingRenderer::new(4, 4);
        let read = RenderTarget::new("read", 4, 4, TargetOptions::default());
        let mut pass = RenderPass::new(Rc::new(EmptyScene), camera())
            .with_override_material(crate::shader::chunks::copy_material("override"));
        pass.render(&mut renderer, &read, &read, 0.0, false).unwrap();
        assert!(matches!(
            renderer.calls.as_slice(),
            [Call::RenderScene { has_override: true, .. }]
        ));

        let id = pass.override_material().map(ShaderMaterial::id);
        pass.dispose(&mut renderer);
        assert_eq!(renderer.released_materials().first().copied(), id);
    }

    #[test]
    fn disposed_pass_fails() {
        let mut renderer = RecordingRenderer::new(4, 4);
        let read = RenderTarget::new("read", 4, 4, TargetOptions::default());
        let mut pass = RenderPass::new(Rc::new(EmptyScene), camera());
        pass.dispose(&mut renderer);
        let err = pass.render(&mut renderer, &read, &read, 0.0, false).unwrap_err();
        assert!(matches!(err, RenderError::PassDisposed(_)));
    }
}
