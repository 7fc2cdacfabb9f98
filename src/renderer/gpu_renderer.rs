//! wgpu implementation of [`Renderer`].
//!
//! Render targets are logical descriptions; this backend owns their textures and
//! keys them by target id. Storage is reallocated whenever a target's generation
//! moves past the one it was created for, so a resize never leaves a stale texture
//! bound.
//!
//! All work of a frame is recorded into one command encoder which is submitted by
//! [`Renderer::end_frame`].

use std::collections::HashMap;

use glam::Vec4;
use pollster::FutureExt as _;
use wgpu::util::DeviceExt;

use super::{ClearFlags, DepthStencilAccess, RenderState, Renderer, Scene, SceneDrawContext, StencilState};
use crate::camera::Camera;
use crate::error::{ComposeError, RenderError};
use crate::gpu::GpuContext;
use crate::material::{
    MaterialId, ShaderMaterial, UniformValue, SAMPLER_BINDING, UNIFORM_BINDING,
};
use crate::render_target::{clamp_extent, FilterMode, RenderTarget, TargetId};
use crate::texture::{ExternalTextureId, TextureData, TextureRef};

/// Format of every depth-stencil attachment.
pub const DEPTH_STENCIL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;

struct DepthStorage {
    _texture: wgpu::Texture,
    /// Depth and stencil aspects, for attachments.
    attachment: wgpu::TextureView,
    /// Depth aspect only, for sampling.
    sampled: wgpu::TextureView,
}

struct TargetStorage {
    generation: u64,
    size: (u32, u32),
    format: wgpu::TextureFormat,
    _color: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth: Option<DepthStorage>,
}

struct ExternalTexture {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

struct Program {
    revision: u64,
    module: wgpu::ShaderModule,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct PipelineKey {
    material: MaterialId,
    revision: u64,
    format: wgpu::TextureFormat,
    depth_stencil: DepthStencilAccess,
    color_write: bool,
    stencil: StencilState,
}

/// Renders passes with wgpu.
pub struct GpuRenderer {
    gpu: GpuContext,
    width: u32,
    height: u32,
    clear_color: Vec4,
    state: RenderState,
    output: Option<wgpu::TextureView>,
    targets: HashMap<TargetId, TargetStorage>,
    textures: HashMap<ExternalTextureId, ExternalTexture>,
    programs: HashMap<MaterialId, Program>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    linear_sampler: wgpu::Sampler,
    nearest_sampler: wgpu::Sampler,
    fallback_color: wgpu::TextureView,
    fallback_depth: wgpu::TextureView,
    encoder: Option<wgpu::CommandEncoder>,
    warned_multisample: bool,
}

impl GpuRenderer {
    pub fn new(gpu: GpuContext, width: u32, height: u32) -> Self {
        let (width, height) = clamp_extent(width as i64, height as i64);
        let linear_sampler = create_sampler(&gpu.device, wgpu::FilterMode::Linear);
        let nearest_sampler = create_sampler(&gpu.device, wgpu::FilterMode::Nearest);
        let fallback_color = create_fallback(&gpu.device, wgpu::TextureFormat::Rgba8Unorm, "Fallback Color");
        let fallback_depth = create_fallback(&gpu.device, wgpu::TextureFormat::Depth32Float, "Fallback Depth");
        Self {
            gpu,
            width,
            height,
            clear_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            state: RenderState::default(),
            output: None,
            targets: HashMap::new(),
            textures: HashMap::new(),
            programs: HashMap::new(),
            pipelines: HashMap::new(),
            linear_sampler,
            nearest_sampler,
            fallback_color,
            fallback_depth,
            encoder: None,
            warned_multisample: false,
        }
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    /// Binds the view the last pass renders into, usually the current surface texture.
    pub fn set_output(&mut self, view: wgpu::TextureView) {
        self.output = Some(view);
    }

    pub fn clear_output(&mut self) {
        self.output = None;
    }

    /// Color view of a target's storage, e.g. to present it or read it back.
    pub fn target_view(&self, id: TargetId) -> Option<&wgpu::TextureView> {
        self.targets.get(&id).map(|storage| &storage.color_view)
    }

    fn ensure_target(&mut self, target: &RenderTarget) {
        if let Some(storage) = self.targets.get(&target.id())
            && storage.generation == target.generation()
            && storage.size == target.size()
        {
            return;
        }

        let options = target.options();
        if options.samples > 1 && !self.warned_multisample {
            tracing::warn!(
                label = target.label(),
                samples = options.samples,
                "multisampled render targets are rendered single-sampled"
            );
            self.warned_multisample = true;
        }

        let (width, height) = target.size();
        let extent = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let format = options.format.to_wgpu();
        let color = self.gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(target.label()),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());

        let depth = options.has_depth_stencil().then(|| {
            let texture = self.gpu.device.create_texture(&wgpu::TextureDescriptor {
                label: Some(target.label()),
                size: extent,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: DEPTH_STENCIL_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            });
            let attachment = texture.create_view(&wgpu::TextureViewDescriptor::default());
            let sampled = texture.create_view(&wgpu::TextureViewDescriptor {
                aspect: wgpu::TextureAspect::DepthOnly,
                ..Default::default()
            });
            DepthStorage {
                _texture: texture,
                attachment,
                sampled,
            }
        });

        tracing::debug!(
            label = target.label(),
            width,
            height,
            generation = target.generation(),
            "allocated render target storage"
        );
        self.targets.insert(
            target.id(),
            TargetStorage {
                generation: target.generation(),
                size: (width, height),
                format,
                _color: color,
                color_view,
                depth,
            },
        );
    }

    /// Output format and whether a depth-stencil attachment exists for `target`.
    fn attachment_info(&self, target: Option<&RenderTarget>) -> Result<(wgpu::TextureFormat, bool), RenderError> {
        match target {
            Some(target) => {
                let storage = self
                    .targets
                    .get(&target.id())
                    .ok_or(RenderError::MissingTarget(target.id()))?;
                Ok((storage.format, storage.depth.is_some()))
            }
            None => Ok((self.gpu.format, false)),
        }
    }

    fn ensure_program(&mut self, material: &ShaderMaterial) -> Result<(), ComposeError> {
        if self
            .programs
            .get(&material.id())
            .is_some_and(|program| program.revision == material.revision())
        {
            return Ok(());
        }

        let source = material.source()?;
        let module = self
            .gpu
            .create_shader_module(material.label(), &source)
            .map_err(|message| ComposeError::ShaderCompilation {
                label: material.label().to_string(),
                message,
            })?;

        let uniforms = material.uniforms();
        let mut entries = Vec::new();
        if uniforms.has_scalars() {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: UNIFORM_BINDING,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            });
        }
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: SAMPLER_BINDING,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
        for (binding, _, value) in uniforms.texture_bindings() {
            let sample_type = match value {
                UniformValue::DepthTexture(_) => wgpu::TextureSampleType::Depth,
                _ => wgpu::TextureSampleType::Float { filterable: true },
            };
            entries.push(wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
        }

        let bind_group_layout = self
            .gpu
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(material.label()),
                entries: &entries,
            });
        let pipeline_layout = self
            .gpu
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(material.label()),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

        tracing::debug!(material = material.label(), revision = material.revision(), "compiled material");
        let id = material.id();
        self.pipelines.retain(|key, _| key.material != id);
        self.programs.insert(
            id,
            Program {
                revision: material.revision(),
                module,
                bind_group_layout,
                pipeline_layout,
            },
        );
        Ok(())
    }

    fn ensure_pipeline(
        &mut self,
        material: &ShaderMaterial,
        format: wgpu::TextureFormat,
        depth_stencil: DepthStencilAccess,
    ) -> Result<wgpu::RenderPipeline, ComposeError> {
        let key = PipelineKey {
            material: material.id(),
            revision: material.revision(),
            format,
            depth_stencil,
            color_write: self.state.color_write,
            stencil: if depth_stencil.is_attached() {
                self.state.stencil
            } else {
                StencilState::default()
            },
        };
        if let Some(pipeline) = self.pipelines.get(&key) {
            return Ok(pipeline.clone());
        }

        let program = self
            .programs
            .get(&material.id())
            .ok_or_else(|| ComposeError::ShaderCompilation {
                label: material.label().to_string(),
                message: "program was not compiled".to_string(),
            })?;

        let write_mask = if key.color_write {
            wgpu::ColorWrites::ALL
        } else {
            wgpu::ColorWrites::empty()
        };
        let depth_stencil_state = depth_stencil.is_attached().then(|| {
            let face = key.stencil.face();
            let write_mask = if depth_stencil == DepthStencilAccess::ReadOnly {
                0
            } else {
                key.stencil.write_mask
            };
            wgpu::DepthStencilState {
                format: DEPTH_STENCIL_FORMAT,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::Always,
                stencil: wgpu::StencilState {
                    front: face,
                    back: face,
                    read_mask: key.stencil.read_mask,
                    write_mask,
                },
                bias: wgpu::DepthBiasState::default(),
            }
        });

        let device = &self.gpu.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(material.label()),
            layout: Some(&program.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &program.module,
                entry_point: Some("vs"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &program.module,
                entry_point: Some("fs"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: depth_stencil_state,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });
        if let Some(err) = device.pop_error_scope().block_on() {
            return Err(ComposeError::ShaderCompilation {
                label: material.label().to_string(),
                message: err.to_string(),
            });
        }

        self.pipelines.insert(key, pipeline.clone());
        Ok(pipeline)
    }

    fn resolve_texture(&self, value: &UniformValue) -> &wgpu::TextureView {
        let fallback = match value {
            UniformValue::DepthTexture(_) => &self.fallback_depth,
            _ => &self.fallback_color,
        };
        let resolved = match value.texture() {
            Some(TextureRef::Color(id)) => self.targets.get(&id).map(|s| &s.color_view),
            Some(TextureRef::Depth(id)) => self
                .targets
                .get(&id)
                .and_then(|s| s.depth.as_ref())
                .map(|d| &d.sampled),
            Some(TextureRef::External(id)) => self.textures.get(&id).map(|t| &t.view),
            None => None,
        };
        resolved.unwrap_or(fallback)
    }

    fn create_bind_group(&self, material: &ShaderMaterial) -> Result<wgpu::BindGroup, ComposeError> {
        let program = self
            .programs
            .get(&material.id())
            .ok_or_else(|| ComposeError::ShaderCompilation {
                label: material.label().to_string(),
                message: "program was not compiled".to_string(),
            })?;

        let uniforms = material.uniforms();
        let buffer = uniforms.has_scalars().then(|| {
            self.gpu
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(material.label()),
                    contents: &uniforms.pack(),
                    usage: wgpu::BufferUsages::UNIFORM,
                })
        });
        let sampler = match material.filter() {
            FilterMode::Linear => &self.linear_sampler,
            FilterMode::Nearest => &self.nearest_sampler,
        };

        let mut entries = Vec::new();
        if let Some(buffer) = &buffer {
            entries.push(wgpu::BindGroupEntry {
                binding: UNIFORM_BINDING,
                resource: buffer.as_entire_binding(),
            });
        }
        entries.push(wgpu::BindGroupEntry {
            binding: SAMPLER_BINDING,
            resource: wgpu::BindingResource::Sampler(sampler),
        });
        for (binding, _, value) in uniforms.texture_bindings() {
            entries.push(wgpu::BindGroupEntry {
                binding,
                resource: wgpu::BindingResource::TextureView(self.resolve_texture(value)),
            });
        }

        Ok(self.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(material.label()),
            layout: &program.bind_group_layout,
            entries: &entries,
        }))
    }

    fn wgpu_clear_color(&self) -> wgpu::Color {
        wgpu::Color {
            r: self.clear_color.x as f64,
            g: self.clear_color.y as f64,
            b: self.clear_color.z as f64,
            a: self.clear_color.w as f64,
        }
    }
}

impl Renderer for GpuRenderer {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn set_size(&mut self, width: u32, height: u32) {
        (self.width, self.height) = clamp_extent(width as i64, height as i64);
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
        scene: &dyn Scene,
        camera: &Camera,
        target: Option<&RenderTarget>,
        clear: bool,
        override_material: Option<&ShaderMaterial>,
    ) -> Result<(), RenderError> {
        if let Some(target) = target {
            self.ensure_target(target);
        }
        let (color_format, _) = self.attachment_info(target)?;
        let state = self.state;
        let clear_color = self.wgpu_clear_color();
        let size = target.map_or((self.width, self.height), RenderTarget::size);

        let (view, depth_view) = match target {
            Some(target) => {
                let storage = self
                    .targets
                    .get(&target.id())
                    .ok_or(RenderError::MissingTarget(target.id()))?;
                (&storage.color_view, storage.depth.as_ref().map(|d| &d.attachment))
            }
            None => (self.output.as_ref().ok_or(RenderError::NoOutput)?, None),
        };

        let device = &self.gpu.device;
        let encoder = self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Afterglow Frame Encoder"),
            })
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Scene Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: if clear {
                        wgpu::LoadOp::Clear(clear_color)
                    } else {
                        wgpu::LoadOp::Load
                    },
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: depth_view.map(|view| wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: if clear {
                        wgpu::LoadOp::Clear(1.0)
                    } else {
                        wgpu::LoadOp::Load
                    },
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: Some(wgpu::Operations {
                    load: if clear {
                        wgpu::LoadOp::Clear(state.stencil.clear)
                    } else {
                        wgpu::LoadOp::Load
                    },
                    store: wgpu::StoreOp::Store,
                }),
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_stencil_reference(state.stencil.reference);

        let mut ctx = SceneDrawContext {
            gpu: &self.gpu,
            pass: &mut pass,
            camera,
            state: &state,
            color_format,
            depth_format: depth_view.map(|_| DEPTH_STENCIL_FORMAT),
            size,
            override_material,
        };
        scene.draw(&mut ctx);
        Ok(())
    }

    fn clear(&mut self, target: Option<&RenderTarget>, flags: ClearFlags) -> Result<(), RenderError> {
        if let Some(target) = target {
            self.ensure_target(target);
        }
        let clear_color = self.wgpu_clear_color();
        let stencil_clear = self.state.stencil.clear;

        let (view, depth_view) = match target {
            Some(target) => {
                let storage = self
                    .targets
                    .get(&target.id())
                    .ok_or(RenderError::MissingTarget(target.id()))?;
                (&storage.color_view, storage.depth.as_ref().map(|d| &d.attachment))
            }
            None => (self.output.as_ref().ok_or(RenderError::NoOutput)?, None),
        };

        let device = &self.gpu.device;
        let encoder = self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Afterglow Frame Encoder"),
            })
        });

        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Clear Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: if flags.color {
                        wgpu::LoadOp::Clear(clear_color)
                    } else {
                        wgpu::LoadOp::Load
                    },
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: depth_view.map(|view| wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: if flags.depth {
                        wgpu::LoadOp::Clear(1.0)
                    } else {
                        wgpu::LoadOp::Load
                    },
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: Some(wgpu::Operations {
                    load: if flags.stencil {
                        wgpu::LoadOp::Clear(stencil_clear)
                    } else {
                        wgpu::LoadOp::Load
                    },
                    store: wgpu::StoreOp::Store,
                }),
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        Ok(())
    }

    fn compile(&mut self, material: &ShaderMaterial) -> Result<(), ComposeError> {
        self.ensure_program(material)
    }

    fn draw_fullscreen(
        &mut self,
        material: &ShaderMaterial,
        target: Option<&RenderTarget>,
        clear: bool,
    ) -> Result<(), RenderError> {
        self.ensure_program(material)?;
        if let Some(target) = target {
            self.ensure_target(target);
        }
        let (format, has_depth_stencil) = self.attachment_info(target)?;
        let access = if has_depth_stencil {
            DepthStencilAccess::for_draw(material, target, &self.state.stencil)
        } else {
            DepthStencilAccess::Detached
        };
        let pipeline = self.ensure_pipeline(material, format, access)?;
        let bind_group = self.create_bind_group(material)?;
        let clear_color = self.wgpu_clear_color();
        let stencil_reference = self.state.stencil.reference;

        let (view, depth_view) = match target {
            Some(target) => {
                let storage = self
                    .targets
                    .get(&target.id())
                    .ok_or(RenderError::MissingTarget(target.id()))?;
                let depth = if access.is_attached() {
                    storage.depth.as_ref().map(|d| &d.attachment)
                } else {
                    None
                };
                (&storage.color_view, depth)
            }
            None => (self.output.as_ref().ok_or(RenderError::NoOutput)?, None),
        };

        let device = &self.gpu.device;
        let encoder = self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Afterglow Frame Encoder"),
            })
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(material.label()),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: if clear {
                        wgpu::LoadOp::Clear(clear_color)
                    } else {
                        wgpu::LoadOp::Load
                    },
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: depth_view.map(|view| {
                // Without ops the attachment is read-only and may be sampled in the same pass.
                let writable = access == DepthStencilAccess::ReadWrite;
                wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: writable.then_some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: writable.then_some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                }
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.set_stencil_reference(stencil_reference);
        pass.draw(0..3, 0..1);
        Ok(())
    }

    fn upload_texture(&mut self, data: &TextureData) -> Result<(), RenderError> {
        if self.textures.contains_key(&data.id()) {
            return Ok(());
        }
        let extent = wgpu::Extent3d {
            width: data.width(),
            height: data.height(),
            depth_or_array_layers: 1,
        };
        let texture = self.gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(data.label()),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: data.format().to_wgpu(),
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.gpu.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data.texels(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(data.width() * data.format().bytes_per_texel() as u32),
                rows_per_image: Some(data.height()),
            },
            extent,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        tracing::debug!(label = data.label(), width = data.width(), height = data.height(), "uploaded texture");
        self.textures.insert(
            data.id(),
            ExternalTexture {
                _texture: texture,
                view,
            },
        );
        Ok(())
    }

    fn release_target(&mut self, id: TargetId) {
        self.targets.remove(&id);
    }

    fn release_material(&mut self, id: MaterialId) {
        self.programs.remove(&id);
        self.pipelines.retain(|key, _| key.material != id);
    }

    fn begin_frame(&mut self) -> Result<(), RenderError> {
        if self.encoder.is_none() {
            self.encoder = Some(self.gpu.device.create_command_encoder(
                &wgpu::CommandEncoderDescriptor {
                    label: Some("Afterglow Frame Encoder"),
                },
            ));
        }
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), RenderError> {
        if let Some(encoder) = self.encoder.take() {
            self.gpu.queue.submit(std::iter::once(encoder.finish()));
        }
        Ok(())
    }
}

fn create_sampler(device: &wgpu::Device, filter: wgpu::FilterMode) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("Afterglow Sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: filter,
        min_filter: filter,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}

/// A 1x1 texture bound in place of unset texture uniforms.
fn create_fallback(device: &wgpu::Device, format: wgpu::TextureFormat, label: &str) -> wgpu::TextureView {
    let usage = if format.is_depth_stencil_format() {
        wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::RENDER_ATTACHMENT
    } else {
        wgpu::TextureUsages::TEXTURE_BINDING
    };
    device
        .create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        })
        .create_view(&wgpu::TextureViewDescriptor::default())
}
