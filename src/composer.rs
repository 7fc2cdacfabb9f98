//! The pass scheduler.
//!
//! [`EffectComposer`] owns two ping-pong buffers and an ordered list of passes.
//! Every frame it runs the enabled passes in order. Each pass reads the read buffer
//! and writes the write buffer (or the output surface), and the buffers swap roles
//! after every pass whose state asks for it.
//!
//! While a stencil mask is active, a swapping pass only wrote the masked region of
//! the write buffer. Before the swap the composer copies the read buffer into the
//! rest of it, so the unmasked region carries over unchanged.

use glam::Vec2;

use crate::config::ComposerConfig;
use crate::error::{ComposeError, RenderError};
use crate::material::{ShaderMaterial, UniformValue};
use crate::pass::{MaskRole, Pass};
use crate::render_target::{clamp_extent, RenderTarget, TargetId, TargetPool};
use crate::renderer::Renderer;
use crate::shader::chunks;
use crate::texture::TextureRef;

/// What happened during one [`EffectComposer::render`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub passes_rendered: usize,
    pub swaps: usize,
    /// Copies of the read buffer outside an active stencil mask.
    pub masked_copies: usize,
    /// Whether a mask was still active after the last pass.
    pub mask_active: bool,
}

pub struct EffectComposer {
    config: ComposerConfig,
    pool: TargetPool,
    /// The two pool targets in canonical order. Every frame starts reading the
    /// first, so scene passes always render into it and its depth attachment is
    /// what depth-aware passes sample.
    buffers: [TargetId; 2],
    read: TargetId,
    write: TargetId,
    copy: ShaderMaterial,
    passes: Vec<Box<dyn Pass>>,
    size: (u32, u32),
    last_frame: FrameStats,
    disposed: bool,
}

impl EffectComposer {
    /// Creates a composer with two buffers at the renderer's size.
    pub fn new(renderer: &dyn Renderer, config: ComposerConfig) -> Self {
        let (width, height) = renderer.size();
        let mut pool = TargetPool::new();
        let (read, write) = Self::allocate(&mut pool, &config, width, height);
        tracing::debug!(width, height, format = ?config.format, "effect composer created");
        Self {
            config,
            pool,
            buffers: [read, write],
            read,
            write,
            copy: chunks::copy_material("EffectComposer.Copy"),
            passes: Vec::new(),
            size: (width, height),
            last_frame: FrameStats::default(),
            disposed: false,
        }
    }

    fn allocate(pool: &mut TargetPool, config: &ComposerConfig, width: u32, height: u32) -> (TargetId, TargetId) {
        let width = width.min(i32::MAX as u32) as i32;
        let height = height.min(i32::MAX as u32) as i32;
        let options = config.target_options();
        (
            pool.acquire("EffectComposer.BufferA", width, height, options),
            pool.acquire("EffectComposer.BufferB", width, height, options),
        )
    }

    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    /// Adds a pass at `index`, or at the end when `index` is `None` or past the end.
    ///
    /// The pass is sized, given the depth texture if it asks for one, and
    /// initialized before it is inserted. Initialization errors leave the composer
    /// unchanged.
    pub fn add_pass(
        &mut self,
        renderer: &mut dyn Renderer,
        mut pass: Box<dyn Pass>,
        index: Option<usize>,
    ) -> Result<(), ComposeError> {
        let (width, height) = self.size;
        pass.set_size(width, height);
        if pass.needs_depth_texture() {
            pass.set_depth_texture(self.depth_texture());
        }
        pass.initialize(renderer)?;

        let index = index.map_or(self.passes.len(), |index| index.min(self.passes.len()));
        tracing::debug!(pass = pass.name(), index, "pass added");
        self.passes.insert(index, pass);
        self.update_render_to_screen();
        Ok(())
    }

    pub fn remove_pass(&mut self, index: usize) -> Option<Box<dyn Pass>> {
        if index >= self.passes.len() {
            return None;
        }
        let pass = self.passes.remove(index);
        self.update_render_to_screen();
        Some(pass)
    }

    /// Marks the last enabled pass, and only that one, as rendering to screen.
    fn update_render_to_screen(&mut self) {
        if !self.config.auto_render_to_screen {
            return;
        }
        let last = self.passes.iter().rposition(|pass| pass.state().enabled);
        for (index, pass) in self.passes.iter_mut().enumerate() {
            pass.state_mut().render_to_screen = Some(index) == last;
        }
    }

    pub fn passes_len(&self) -> usize {
        self.passes.len()
    }

    pub fn passes(&self) -> impl Iterator<Item = &dyn Pass> {
        self.passes.iter().map(|pass| pass.as_ref())
    }

    /// Typed access to the pass at `index`.
    pub fn pass<T: Pass>(&self, index: usize) -> Option<&T> {
        self.passes.get(index)?.as_any().downcast_ref::<T>()
    }

    pub fn pass_mut<T: Pass>(&mut self, index: usize) -> Option<&mut T> {
        self.passes.get_mut(index)?.as_any_mut().downcast_mut::<T>()
    }

    pub fn read_buffer(&self) -> Option<&RenderTarget> {
        self.pool.get(self.read)
    }

    pub fn write_buffer(&self) -> Option<&RenderTarget> {
        self.pool.get(self.write)
    }

    /// Depth attachment of the buffer every frame starts reading, if the config
    /// allocates one.
    pub fn depth_texture(&self) -> Option<TextureRef> {
        if !self.config.depth_buffer {
            return None;
        }
        self.pool.get(self.buffers[0])?.depth_texture()
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn last_frame(&self) -> FrameStats {
        self.last_frame
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Runs every enabled pass once.
    pub fn render(&mut self, renderer: &mut dyn Renderer, delta: f32) -> Result<FrameStats, RenderError> {
        if self.disposed {
            return Err(RenderError::Disposed);
        }
        renderer.begin_frame()?;
        let result = self.render_passes(renderer, delta);
        let ended = renderer.end_frame();
        let stats = result?;
        ended?;
        self.last_frame = stats;
        Ok(stats)
    }

    fn render_passes(&mut self, renderer: &mut dyn Renderer, delta: f32) -> Result<FrameStats, RenderError> {
        let auto = self.config.auto_render_to_screen;
        let last_enabled = self.passes.iter().rposition(|pass| pass.state().enabled);
        let mut stats = FrameStats::default();
        let mut mask_active = false;
        [self.read, self.write] = self.buffers;

        for (index, pass) in self.passes.iter_mut().enumerate() {
            if !pass.state().enabled {
                continue;
            }
            if auto {
                pass.state_mut().render_to_screen = Some(index) == last_enabled;
            }

            let read = self.pool.get(self.read).ok_or(RenderError::MissingTarget(self.read))?;
            let write = self
                .pool
                .get(self.write)
                .ok_or(RenderError::MissingTarget(self.write))?;
            pass.render(renderer, write, read, delta, mask_active)?;
            stats.passes_rendered += 1;

            if pass.state().needs_swap {
                if mask_active {
                    renderer.state_mut().stencil.compare = wgpu::CompareFunction::NotEqual;
                    self.copy
                        .set_uniform("t_diffuse", UniformValue::Texture(Some(read.texture())));
                    let copied = renderer.draw_fullscreen(&self.copy, Some(write), false);
                    renderer.state_mut().stencil.compare = wgpu::CompareFunction::Equal;
                    copied?;
                    stats.masked_copies += 1;
                }
                std::mem::swap(&mut self.read, &mut self.write);
                stats.swaps += 1;
            }

            match pass.mask_role() {
                MaskRole::Begin => mask_active = true,
                MaskRole::End => mask_active = false,
                MaskRole::None => {}
            }
        }

        stats.mask_active = mask_active;
        Ok(stats)
    }

    /// Resizes the buffers and every pass. Passes with their own resolution scale
    /// derive their sizes from the new base size.
    pub fn set_size(&mut self, renderer: &mut dyn Renderer, width: u32, height: u32) {
        let (width, height) = clamp_extent(width as i64, height as i64);
        self.size = (width, height);
        renderer.set_size(width, height);
        if self.disposed {
            return;
        }
        self.pool
            .resize_all(width.min(i32::MAX as u32) as i32, height.min(i32::MAX as u32) as i32);
        for pass in &mut self.passes {
            pass.set_size(width, height);
        }
        tracing::debug!(width, height, "composer resized");
    }

    /// Replaces both buffers with fresh ones at the current size.
    pub fn reset(&mut self, renderer: &mut dyn Renderer) {
        if self.disposed {
            return;
        }
        for target in self.pool.drain() {
            renderer.release_target(target.id());
        }
        let (width, height) = self.size;
        let (read, write) = Self::allocate(&mut self.pool, &self.config, width, height);
        self.buffers = [read, write];
        self.read = read;
        self.write = write;

        let depth = self.depth_texture();
        for pass in &mut self.passes {
            if pass.needs_depth_texture() {
                pass.set_depth_texture(depth);
            }
            pass.set_size(width, height);
        }
    }

    /// Releases the buffers and disposes every pass. Calling it again does nothing.
    pub fn dispose(&mut self, renderer: &mut dyn Renderer) {
        if self.disposed {
            return;
        }
        for target in self.pool.drain() {
            renderer.release_target(target.id());
        }
        renderer.release_material(self.copy.id());
        for pass in &mut self.passes {
            pass.dispose(renderer);
        }
        self.disposed = true;
        tracing::debug!(passes = self.passes.len(), "composer disposed");
    }

    /// Size of the buffers as a vector, for passes that need the aspect ratio.
    pub fn resolution(&self) -> Vec2 {
        Vec2::new(self.size.0 as f32, self.size.1 as f32)
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::effect::{self, BloomEffect, DepthEffect, SepiaEffect};
    use crate::effect_pass::EffectPass;
    use crate::pass::{ClearMaskPass, MaskPass, RenderPass, SavePass, ShaderPass};
    use crate::render_target::TargetOptions;
    use crate::renderer::DepthStencilAccess;
    use crate::testing::{camera, Call, EmptyScene, RecordingRenderer};

    fn composer(renderer: &RecordingRenderer) -> EffectComposer {
        EffectComposer::new(renderer, ComposerConfig::default())
    }

    fn copy_pass() -> Box<dyn Pass> {
        Box::new(ShaderPass::new(chunks::copy_material("copy")))
    }

    #[test]
    fn zero_passes_render_without_swapping() {
        let mut renderer = RecordingRenderer::new(32, 32);
        let mut composer = composer(&renderer);
        let read = composer.read_buffer().map(RenderTarget::id);

        let stats = composer.render(&mut renderer, 0.016).unwrap();
        assert_eq!(stats, FrameStats::default());
        assert_eq!(composer.read_buffer().map(RenderTarget::id), read);
        assert!(matches!(renderer.calls.as_slice(), [Call::BeginFrame, Call::EndFrame]));
    }

    #[test]
    fn swapping_pass_exchanges_buffers() {
        let mut renderer = RecordingRenderer::new(32, 32);
        let mut composer = EffectComposer::new(
            &renderer,
            ComposerConfig {
                auto_render_to_screen: false,
                ..Default::default()
            },
        );
        let read = composer.read_buffer().unwrap().id();
        let write = composer.write_buffer().unwrap().id();
        composer.add_pass(&mut renderer, copy_pass(), None).unwrap();

        let stats = composer.render(&mut renderer, 0.016).unwrap();
        assert_eq!(stats.swaps, 1);
        assert_eq!(composer.read_buffer().unwrap().id(), write);
        assert_eq!(composer.write_buffer().unwrap().id(), read);
        let draw = renderer.draws()[0];
        assert_eq!(draw.target, Some(write));
        assert_eq!(draw.texture("t_diffuse"), Some(TextureRef::Color(read)));
    }

    #[test]
    fn every_frame_starts_from_the_first_buffer() {
        let mut renderer = RecordingRenderer::new(32, 32);
        let mut composer = EffectComposer::new(
            &renderer,
            ComposerConfig {
                auto_render_to_screen: false,
                ..Default::default()
            },
        );
        composer.add_pass(&mut renderer, copy_pass(), None).unwrap();
        composer.render(&mut renderer, 0.0).unwrap();
        composer.render(&mut renderer, 0.0).unwrap();
        let draws = renderer.draws();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].target, draws[1].target);
        assert_eq!(draws[0].texture("t_diffuse"), draws[1].texture("t_diffuse"));
    }

    #[test]
    fn in_place_passes_do_not_swap() {
        let mut renderer = RecordingRenderer::new(32, 32);
        let mut composer = composer(&renderer);
        composer
            .add_pass(&mut renderer, Box::new(RenderPass::new(Rc::new(EmptyScene), camera())), None)
            .unwrap();
        composer
            .add_pass(&mut renderer, Box::new(SavePass::new(TargetOptions::default())), None)
            .unwrap();
        let stats = composer.render(&mut renderer, 0.0).unwrap();
        assert_eq!(stats.passes_rendered, 2);
        assert_eq!(stats.swaps, 0);
    }

    #[test]
    fn mask_pairing_copies_once_and_ends_unmasked() {
        let mut renderer = RecordingRenderer::new(32, 32);
        let mut composer = EffectComposer::new(
            &renderer,
            ComposerConfig {
                stencil_buffer: true,
                auto_render_to_screen: false,
                ..Default::default()
            },
        );
        let scene = Rc::new(EmptyScene);
        let effects = EffectPass::new(camera(), vec![effect::share(SepiaEffect::default()).1]);
        composer
            .add_pass(&mut renderer, Box::new(MaskPass::new(scene, camera())), None)
            .unwrap();
        composer.add_pass(&mut renderer, Box::new(effects), None).unwrap();
        composer
            .add_pass(&mut renderer, Box::new(ClearMaskPass::new()), None)
            .unwrap();

        let stats = composer.render(&mut renderer, 0.016).unwrap();
        assert_eq!(stats.masked_copies, 1);
        assert_eq!(stats.swaps, 1);
        assert!(!stats.mask_active);
        assert!(!renderer.state.stencil.test);

        let copies = renderer.draws_of("EffectComposer.Copy");
        assert_eq!(copies.len(), 1);
        assert_eq!(copies[0].stencil.compare, wgpu::CompareFunction::NotEqual);
        assert!(copies[0].stencil.test);
        // The copy fills the write buffer of the masked pass from its read buffer.
        let masked = renderer.draws_of("EffectPass")[0];
        assert_eq!(copies[0].target, masked.target);
        assert_eq!(copies[0].texture("t_diffuse"), masked.texture("t_diffuse"));
    }

    #[test]
    fn masked_depth_effect_reads_its_own_depth_read_only() {
        let mut renderer = RecordingRenderer::new(32, 32);
        let mut composer = EffectComposer::new(
            &renderer,
            ComposerConfig {
                stencil_buffer: true,
                auto_render_to_screen: false,
                ..Default::default()
            },
        );
        let first = composer.read_buffer().unwrap().id();
        let scene = Rc::new(EmptyScene);
        let sepia = EffectPass::new(camera(), vec![effect::share(SepiaEffect::default()).1]).with_label("Sepia");
        let depth = EffectPass::new(camera(), vec![effect::share(DepthEffect::default()).1]).with_label("Depth");
        composer
            .add_pass(&mut renderer, Box::new(RenderPass::new(scene.clone(), camera())), None)
            .unwrap();
        composer
            .add_pass(&mut renderer, Box::new(MaskPass::new(scene, camera())), None)
            .unwrap();
        composer.add_pass(&mut renderer, Box::new(sepia), None).unwrap();
        composer.add_pass(&mut renderer, Box::new(depth), None).unwrap();
        composer
            .add_pass(&mut renderer, Box::new(ClearMaskPass::new()), None)
            .unwrap();
        composer.render(&mut renderer, 0.016).unwrap();

        let sepia = renderer.draws_of("Sepia")[0];
        assert_eq!(sepia.depth_access, DepthStencilAccess::ReadWrite);

        // One swap later the depth effect writes the buffer whose depth it samples.
        let depth = renderer.draws_of("Depth")[0];
        assert_eq!(depth.target, Some(first));
        assert_eq!(depth.texture("t_depth"), composer.depth_texture());
        assert!(depth.stencil.test);
        assert_eq!(depth.depth_access, DepthStencilAccess::ReadOnly);
    }

    #[test]
    fn unmasked_swaps_do_not_copy() {
        let mut renderer = RecordingRenderer::new(32, 32);
        let mut composer = composer(&renderer);
        composer.add_pass(&mut renderer, copy_pass(), None).unwrap();
        composer.add_pass(&mut renderer, copy_pass(), None).unwrap();
        let stats = composer.render(&mut renderer, 0.0).unwrap();
        assert_eq!(stats.swaps, 2);
        assert_eq!(stats.masked_copies, 0);
    }

    #[test]
    fn only_the_last_enabled_pass_renders_to_screen() {
        let mut renderer = RecordingRenderer::new(32, 32);
        let mut composer = composer(&renderer);
        composer.add_pass(&mut renderer, copy_pass(), None).unwrap();
        composer.add_pass(&mut renderer, copy_pass(), None).unwrap();
        let flags: Vec<bool> = composer.passes().map(|p| p.state().render_to_screen).collect();
        assert_eq!(flags, [false, true]);

        composer.pass_mut::<ShaderPass>(1).unwrap().state_mut().enabled = false;
        composer.render(&mut renderer, 0.0).unwrap();
        assert!(composer.pass::<ShaderPass>(0).unwrap().state().render_to_screen);
        assert_eq!(renderer.draws()[0].target, None);
    }

    #[test]
    fn insertion_index_is_clamped() {
        let mut renderer = RecordingRenderer::new(32, 32);
        let mut composer = composer(&renderer);
        composer.add_pass(&mut renderer, copy_pass(), None).unwrap();
        composer
            .add_pass(&mut renderer, Box::new(SavePass::new(TargetOptions::default())), Some(10))
            .unwrap();
        composer
            .add_pass(&mut renderer, Box::new(ClearMaskPass::new()), Some(0))
            .unwrap();
        assert!(composer.pass::<ClearMaskPass>(0).is_some());
        assert!(composer.pass::<ShaderPass>(1).is_some());
        assert!(composer.pass::<SavePass>(2).is_some());
        assert!(composer.pass::<SavePass>(1).is_none());
        assert!(composer.remove_pass(5).is_none());
        assert!(composer.remove_pass(0).is_some());
        assert_eq!(composer.passes_len(), 2);
    }

    #[test]
    fn resize_reaches_scaled_effect_targets() {
        let mut renderer = RecordingRenderer::new(32, 32);
        let mut composer = composer(&renderer);
        let (bloom, shared) = effect::share(BloomEffect::new().with_resolution_scale(0.25));
        composer
            .add_pass(&mut renderer, Box::new(EffectPass::new(camera(), vec![shared])), None)
            .unwrap();
        assert_eq!(bloom.borrow().resolution(), (8, 8));

        composer.set_size(&mut renderer, 800, 600);
        assert_eq!(bloom.borrow().resolution(), (200, 150));
        assert_eq!(composer.read_buffer().unwrap().size(), (800, 600));
        assert_eq!(composer.write_buffer().unwrap().size(), (800, 600));
        assert_eq!(renderer.size, (800, 600));
    }

    #[test]
    fn depth_passes_receive_the_input_depth() {
        let mut renderer = RecordingRenderer::new(32, 32);
        let mut composer = composer(&renderer);
        let depth = composer.depth_texture();
        assert!(depth.is_some());
        let pass = EffectPass::new(camera(), vec![effect::share(DepthEffect::default()).1]);
        composer.add_pass(&mut renderer, Box::new(pass), None).unwrap();
        assert_eq!(composer.pass::<EffectPass>(0).unwrap().depth_texture(), depth);
    }

    #[test]
    fn missing_depth_buffer_is_a_configuration_error() {
        let mut renderer = RecordingRenderer::new(32, 32);
        let mut composer = EffectComposer::new(
            &renderer,
            ComposerConfig {
                depth_buffer: false,
                ..Default::default()
            },
        );
        let pass = EffectPass::new(camera(), vec![effect::share(DepthEffect::default()).1]);
        let err = composer.add_pass(&mut renderer, Box::new(pass), None).unwrap_err();
        assert!(matches!(err, ComposeError::MissingDepthTexture { .. }));
        assert_eq!(composer.passes_len(), 0);
    }

    #[test]
    fn reset_reallocates_buffers() {
        let mut renderer = RecordingRenderer::new(32, 32);
        let mut composer = composer(&renderer);
        let old = [composer.read_buffer().unwrap().id(), composer.write_buffer().unwrap().id()];
        let pass = EffectPass::new(camera(), vec![effect::share(DepthEffect::default()).1]);
        composer.add_pass(&mut renderer, Box::new(pass), None).unwrap();

        composer.reset(&mut renderer);
        let released = renderer.released_targets();
        assert!(old.iter().all(|id| released.contains(id)));
        assert!(!old.contains(&composer.read_buffer().unwrap().id()));
        assert_eq!(
            composer.pass::<EffectPass>(0).unwrap().depth_texture(),
            composer.depth_texture()
        );
    }

    #[test]
    fn dispose_is_idempotent_and_blocks_rendering() {
        let mut renderer = RecordingRenderer::new(32, 32);
        let mut composer = composer(&renderer);
        composer
            .add_pass(&mut renderer, Box::new(SavePass::new(TargetOptions::default())), None)
            .unwrap();
        composer.dispose(&mut renderer);
        let released = renderer.released_targets().len();
        assert_eq!(released, 3);
        composer.dispose(&mut renderer);
        assert_eq!(renderer.released_targets().len(), released);

        assert!(matches!(composer.render(&mut renderer, 0.0), Err(RenderError::Disposed)));
        composer.set_size(&mut renderer, 100, 100);
        assert_eq!(composer.size(), (100, 100));
        assert!(composer.read_buffer().is_none());
        assert!(composer.pass::<SavePass>(0).unwrap().state().disposed);
    }

    #[test]
    fn failing_pass_still_ends_the_frame() {
        let mut renderer = RecordingRenderer::new(32, 32);
        let mut composer = composer(&renderer);
        composer.add_pass(&mut renderer, copy_pass(), None).unwrap();
        composer.pass_mut::<ShaderPass>(0).unwrap().dispose(&mut renderer);
        assert!(matches!(
            composer.render(&mut renderer, 0.0),
            Err(RenderError::PassDisposed(_))
        ));
        assert!(matches!(renderer.calls.last(), Some(Call::EndFrame)));
    }
}
