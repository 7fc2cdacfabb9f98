//! A [`Renderer`] that records calls instead of touching a GPU.

use glam::Vec4;

use crate::camera::Camera;
use crate::error::{ComposeError, RenderError};
use crate::material::{MaterialId, ShaderMaterial, UniformValue};
use crate::render_target::{RenderTarget, TargetId};
use crate::renderer::{ClearFlags, DepthStencilAccess, RenderState, Renderer, Scene, StencilState};
use crate::texture::{ExternalTextureId, TextureData, TextureRef};

/// A fullscreen draw as seen by the renderer.
#[derive(Clone, Debug)]
pub struct DrawCall {
    pub material: String,
    pub target: Option<TargetId>,
    pub target_size: Option<(u32, u32)>,
    pub clear: bool,
    pub stencil: StencilState,
    pub color_write: bool,
    /// How a GPU backend would bind the target's depth-stencil attachment.
    pub depth_access: DepthStencilAccess,
    pub uniforms: Vec<(String, UniformValue)>,
}

impl DrawCall {
    pub fn uniform(&self, name: &str) -> Option<&UniformValue> {
        self.uniforms.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn texture(&self, name: &str) -> Option<TextureRef> {
        self.uniform(name).and_then(UniformValue::texture)
    }
}

#[derive(Clone, Debug)]
pub enum Call {
    BeginFrame,
    EndFrame,
    RenderScene {
        target: Option<TargetId>,
        clear: bool,
        stencil: StencilState,
        color_write: bool,
        has_override: bool,
    },
    Clear {
        target: Option<TargetId>,
        flags: ClearFlags,
        stencil_clear: u32,
    },
    Compile {
        material: String,
        source: String,
    },
    Draw(DrawCall),
    Upload(ExternalTextureId),
    ReleaseTarget(TargetId),
    ReleaseMaterial(MaterialId),
}

#[derive(Debug)]
pub struct RecordingRenderer {
    pub size: (u32, u32),
    pub clear_color: Vec4,
    pub state: RenderState,
    pub calls: Vec<Call>,
}

impl RecordingRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            clear_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            state: RenderState::default(),
            calls: Vec::new(),
        }
    }

    pub fn draws(&self) -> Vec<&DrawCall> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Draw(draw) => Some(draw),
                _ => None,
            })
            .collect()
    }

    /// Draws of materials whose label starts with `prefix`.
    pub fn draws_of(&self, prefix: &str) -> Vec<&DrawCall> {
        self.draws()
            .into_iter()
            .filter(|draw| draw.material.starts_with(prefix))
            .collect()
    }

    pub fn compiled_sources(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Compile { source, .. } => Some(source.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn released_targets(&self) -> Vec<TargetId> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::ReleaseTarget(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    pub fn released_materials(&self) -> Vec<MaterialId> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::ReleaseMaterial(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    pub fn uploads(&self) -> Vec<ExternalTextureId> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Upload(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    pub fn take_calls(&mut self) -> Vec<Call> {
        std::mem::take(&mut self.calls)
    }
}

impl Renderer for RecordingRenderer {
    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn set_size(&mut self, width: u32, height: u32) {
        self.size = (width, height);
    }

    fn clear_color(&self) -> Vec4 {
        self.clear_color
    }

    fn set_clear_color(&mut self, color: Vec4) {
        self.clear_color = color;
    }

    fn state(&self) -> &RenderState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RenderState {
        &mut self.state
    }

    fn render_scene(
        &mut self,
        _scene: &dyn Scene,
        _camera: &Camera,
        target: Option<&RenderTarget>,
        clear: bool,
        override_material: Option<&ShaderMaterial>,
    ) -> Result<(), RenderError> {
        self.calls.push(Call::RenderScene {
            target: target.map(RenderTarget::id),
            clear,
            stencil: self.state.stencil,
            color_write: self.state.color_write,
            has_override: override_material.is_some(),
        });
        Ok(())
    }

    fn clear(&mut self, target: Option<&RenderTarget>, flags: ClearFlags) -> Result<(), RenderError> {
        self.calls.push(Call::Clear {
            target: target.map(RenderTarget::id),
            flags,
            stencil_clear: self.state.stencil.clear,
        });
        Ok(())
    }

    fn compile(&mut self, material: &ShaderMaterial) -> Result<(), ComposeError> {
        let source = material.source()?;
        self.calls.push(Call::Compile {
            material: material.label().to_string(),
            source,
        });
        Ok(())
    }

    fn draw_fullscreen(
        &mut self,
        material: &ShaderMaterial,
        target: Option<&RenderTarget>,
        clear: bool,
    ) -> Result<(), RenderError> {
        self.calls.push(Call::Draw(DrawCall {
            material: material.label().to_string(),
            target: target.map(RenderTarget::id),
            target_size: target.map(RenderTarget::size),
            clear,
            stencil: self.state.stencil,
            color_write: self.state.color_write,
            depth_access: DepthStencilAccess::for_draw(material, target, &self.state.stencil),
            uniforms: material
                .uniforms()
                .iter()
                .map(|(name, value)| (name.to_string(), *value))
                .collect(),
        }));
        Ok(())
    }

    fn upload_texture(&mut self, data: &TextureData) -> Result<(), RenderError> {
        self.calls.push(Call::Upload(data.id()));
        Ok(())
    }

    fn release_target(&mut self, id: TargetId) {
        self.calls.push(Call::ReleaseTarget(id));
    }

    fn release_material(&mut self, id: MaterialId) {
        self.calls.push(Call::ReleaseMaterial(id));
    }

    fn begin_frame(&mut self) -> Result<(), RenderError> {
        self.calls.push(Call::BeginFrame);
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), RenderError> {
        self.calls.push(Call::EndFrame);
        Ok(())
    }
}

/// A scene with nothing in it.
pub struct EmptyScene;

impl Scene for EmptyScene {
    fn draw(&self, _ctx: &mut crate::renderer::SceneDrawContext<'_, '_>) {}
}

pub fn camera() -> crate::camera::SharedCamera {
    Camera::new().shared()
}
