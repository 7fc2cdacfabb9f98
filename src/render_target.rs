//! Off-screen render targets and the ping-pong pool that owns them.
//!
//! A [`RenderTarget`] is a logical description of a GPU buffer: its size, format,
//! attachments and a generation counter. The renderer backend owns the actual
//! storage and keys it by `(id, generation)`, so resizing a target only has to bump
//! the generation for the backend to drop and reallocate the texture on next use.
//!
//! Targets are never shared by cloning. Passes receive `&RenderTarget` for the
//! duration of one call, which keeps stale handles from surviving a resize.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::texture::TextureRef;

static NEXT_TARGET_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a render target across resizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
    fn next() -> Self {
        Self(NEXT_TARGET_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value, mostly useful for debug labels.
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Color formats a render target can be allocated with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetFormat {
    #[default]
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgba16Float,
}

impl TargetFormat {
    pub fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            TargetFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            TargetFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            TargetFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
            TargetFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
            TargetFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        }
    }
}

/// Texture filtering used when a target is sampled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    #[default]
    Linear,
    Nearest,
}

impl FilterMode {
    pub fn to_wgpu(self) -> wgpu::FilterMode {
        match self {
            FilterMode::Linear => wgpu::FilterMode::Linear,
            FilterMode::Nearest => wgpu::FilterMode::Nearest,
        }
    }
}

/// Allocation options for a render target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetOptions {
    pub format: TargetFormat,
    pub filter: FilterMode,
    /// Allocate a depth attachment that can also be sampled as a depth texture.
    pub depth_buffer: bool,
    /// Allocate stencil bits alongside depth (implies a depth-stencil attachment).
    pub stencil_buffer: bool,
    /// Requested multisample count.
    pub samples: u32,
}

impl Default for TargetOptions {
    fn default() -> Self {
        Self {
            format: TargetFormat::Rgba8Unorm,
            filter: FilterMode::Linear,
            depth_buffer: false,
            stencil_buffer: false,
            samples: 1,
        }
    }
}

impl TargetOptions {
    /// Options for a plain color buffer with no depth or stencil.
    pub fn color(format: TargetFormat) -> Self {
        Self {
            format,
            ..Default::default()
        }
    }

    /// Whether the backend must allocate a depth-stencil attachment.
    pub fn has_depth_stencil(&self) -> bool {
        self.depth_buffer || self.stencil_buffer
    }
}

/// Clamps a requested extent to at least 1x1.
///
/// Zero is common during window layout and is silently clamped. Negative values are
/// a caller bug; they are reported through `tracing` and clamped the same way.
pub fn clamp_extent(width: i64, height: i64) -> (u32, u32) {
    if width < 0 || height < 0 {
        tracing::warn!(width, height, "negative render target size requested, clamping to 1x1 floor");
    }
    let clamp = |v: i64| v.clamp(1, u32::MAX as i64) as u32;
    (clamp(width), clamp(height))
}

/// An off-screen buffer used as pass input or output.
#[derive(Debug)]
pub struct RenderTarget {
    id: TargetId,
    label: String,
    width: u32,
    height: u32,
    options: TargetOptions,
    generation: u64,
}

impl RenderTarget {
    /// Creates a target description. Dimensions are clamped to at least 1x1.
    pub fn new(label: impl Into<String>, width: u32, height: u32, options: TargetOptions) -> Self {
        let (width, height) = clamp_extent(width as i64, height as i64);
        Self {
            id: TargetId::next(),
            label: label.into(),
            width,
            height,
            options,
            generation: 0,
        }
    }

    pub fn id(&self) -> TargetId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn options(&self) -> &TargetOptions {
        &self.options
    }

    /// Incremented every time the underlying storage must be reallocated.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Resizes the target, invalidating its storage if the size changed.
    pub fn set_size(&mut self, width: u32, height: u32) {
        let (width, height) = clamp_extent(width as i64, height as i64);
        if (width, height) != (self.width, self.height) {
            self.width = width;
            self.height = height;
            self.generation += 1;
            tracing::debug!(label = %self.label, width, height, generation = self.generation, "render target resized");
        }
    }

    /// Reference to the color attachment for binding as a shader input.
    pub fn texture(&self) -> TextureRef {
        TextureRef::Color(self.id)
    }

    /// Reference to the depth attachment, if the target has one.
    pub fn depth_texture(&self) -> Option<TextureRef> {
        self.options
            .has_depth_stencil()
            .then_some(TextureRef::Depth(self.id))
    }
}

/// Owns a set of render targets that are resized together.
///
/// The composer keeps its two ping-pong buffers here. Targets are handed out by id;
/// borrow them with [`get`](Self::get) for the duration of a call.
#[derive(Debug, Default)]
pub struct TargetPool {
    targets: BTreeMap<TargetId, RenderTarget>,
}

impl TargetPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a new target, clamping the requested size to at least 1x1.
    pub fn acquire(
        &mut self,
        label: impl Into<String>,
        width: i32,
        height: i32,
        options: TargetOptions,
    ) -> TargetId {
        let (width, height) = clamp_extent(width as i64, height as i64);
        let target = RenderTarget::new(label, width, height, options);
        let id = target.id();
        self.targets.insert(id, target);
        id
    }

    /// Removes a target from the pool. The caller is responsible for releasing the
    /// backend storage through the renderer.
    pub fn release(&mut self, id: TargetId) -> Option<RenderTarget> {
        self.targets.remove(&id)
    }

    /// Resizes every target in the pool.
    pub fn resize_all(&mut self, width: i32, height: i32) {
        let (width, height) = clamp_extent(width as i64, height as i64);
        for target in self.targets.values_mut() {
            target.set_size(width, height);
        }
    }

    pub fn get(&self, id: TargetId) -> Option<&RenderTarget> {
        self.targets.get(&id)
    }

    pub fn get_mut(&mut self, id: TargetId) -> Option<&mut RenderTarget> {
        self.targets.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RenderTarget> {
        self.targets.values()
    }

    /// Empties the pool, returning every target so its storage can be released.
    pub fn drain(&mut self) -> Vec<RenderTarget> {
        std::mem::take(&mut self.targets).into_values().collect()
    }
}
