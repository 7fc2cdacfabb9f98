//! # Afterglow
//!
//! **Post-processing for wgpu that merges effects into as few passes as possible.**
//!
//! An [`EffectComposer`] runs an ordered list of [`Pass`]es over two ping-pong
//! buffers. An [`EffectPass`] takes any number of [`Effect`]s, merges their WGSL
//! into one fullscreen program and blends each result over the running color in
//! registration order.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::rc::Rc;
//! use afterglow::*;
//!
//! # struct MyScene;
//! # impl Scene for MyScene {
//! #     fn draw(&self, _ctx: &mut SceneDrawContext<'_, '_>) {}
//! # }
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gpu = GpuContext::headless(afterglow::wgpu::TextureFormat::Rgba8Unorm);
//!     let mut renderer = GpuRenderer::new(gpu, 1280, 720);
//!     let camera = Camera::new().at(0.0, 1.0, 5.0).shared();
//!
//!     let mut composer = EffectComposer::new(&renderer, ComposerConfig::default());
//!     composer.add_pass(&mut renderer, Box::new(RenderPass::new(Rc::new(MyScene), camera.clone())), None)?;
//!
//!     let (vignette, shared) = effect::share(VignetteEffect::default());
//!     let effects = vec![effect::share(BloomEffect::new()).1, shared];
//!     composer.add_pass(&mut renderer, Box::new(EffectPass::new(camera, effects)), None)?;
//!
//!     vignette.borrow_mut().core_mut().set_uniform("darkness", 0.8f32);
//!     composer.render(&mut renderer, 1.0 / 60.0)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Shape
//!
//! - **Passes are opaque to the composer.** It only asks them to render, resize and
//!   report whether they swap buffers or begin/end a stencil mask.
//! - **Effects are shared.** Keep a typed handle to tweak parameters; uniform edits
//!   are free, define edits trigger one recompile on the next frame.
//! - **Backend behind a trait.** Everything talks to a [`Renderer`]; [`GpuRenderer`]
//!   is the wgpu implementation.

mod camera;
mod composer;
mod config;
mod error;
mod gpu;
mod lookup;
mod material;
mod render_target;
mod texture;

pub mod effect;
pub mod effect_pass;
pub mod pass;
pub mod renderer;
pub mod shader;

#[cfg(test)]
mod testing;

pub use camera::{Camera, SharedCamera};
pub use composer::{EffectComposer, FrameStats};
pub use config::{ComposerConfig, ConfigError};
pub use effect::{
    BloomEffect, BokehEffect, BrightnessContrastEffect, ChromaticAberrationEffect, DepthEffect,
    DotScreenEffect, Effect, EffectAttributes, EffectCore, GlitchEffect, GlitchMode,
    GodRaysEffect, NoiseEffect, PixelationEffect, ScanlineEffect, SepiaEffect, SharedEffect,
    SmaaEffect, SmaaPreset, ToneMappingEffect, ToneMappingMode, VignetteEffect,
};
pub use effect_pass::{EffectPass, MergedProgram};
pub use error::{ComposeError, RenderError};
pub use gpu::GpuContext;
pub use lookup::{LookupTexture, noise_texture};
pub use material::{Defines, MaterialId, ShaderMaterial, UniformRegistry, UniformValue};
pub use pass::{
    ClearMaskPass, ClearPass, DepthPacking, DepthPass, MaskPass, MaskRole, Pass, PassState,
    RenderPass, SavePass, ShaderPass,
};
pub use render_target::{
    FilterMode, RenderTarget, TargetFormat, TargetId, TargetOptions, TargetPool, clamp_extent,
};
pub use renderer::{
    ClearFlags, DepthStencilAccess, GpuRenderer, RenderState, Renderer, Scene, SceneDrawContext,
    StencilState,
};
pub use shader::{BlendFunction, BlendMode, KernelSize};
pub use texture::{ExternalTextureId, TexelFormat, TextureData, TextureRef};

// Re-export glam math types for convenience
pub use glam::{Mat4, Vec2, Vec3, Vec4};

// Re-exported so hosts can name formats and compare functions without a direct dependency
pub use wgpu;
