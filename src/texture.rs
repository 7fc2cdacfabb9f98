//! Texture references and CPU-side texel data.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::ComposeError;
use crate::render_target::TargetId;

static NEXT_EXTERNAL_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a texture uploaded from CPU data (lookup tables, noise maps).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExternalTextureId(u64);

/// A texture a shader can sample, resolved by the renderer at draw time.
///
/// References name a target by id, never by storage, so they stay valid when the
/// target is resized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureRef {
    /// Color attachment of a render target.
    Color(TargetId),
    /// Depth attachment of a render target.
    Depth(TargetId),
    /// A texture uploaded from [`TextureData`].
    External(ExternalTextureId),
}

/// Texel formats accepted for uploaded textures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TexelFormat {
    Rgba8,
    R8,
}

impl TexelFormat {
    pub fn bytes_per_texel(self) -> usize {
        match self {
            TexelFormat::Rgba8 => 4,
            TexelFormat::R8 => 1,
        }
    }

    pub fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            TexelFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
            TexelFormat::R8 => wgpu::TextureFormat::R8Unorm,
        }
    }
}

/// Immutable texel data ready to be uploaded.
#[derive(Debug)]
pub struct TextureData {
    id: ExternalTextureId,
    label: String,
    width: u32,
    height: u32,
    format: TexelFormat,
    texels: Vec<u8>,
}

impl TextureData {
    /// Validates and wraps texel data.
    ///
    /// Fails when either dimension is zero or the byte length does not match
    /// `width * height * bytes_per_texel`.
    pub fn new(
        label: impl Into<String>,
        width: u32,
        height: u32,
        format: TexelFormat,
        texels: Vec<u8>,
    ) -> Result<Self, ComposeError> {
        let label = label.into();
        if width == 0 || height == 0 {
            return Err(ComposeError::InvalidTexture(format!(
                "`{label}` has zero area ({width}x{height})"
            )));
        }
        let expected = width as usize * height as usize * format.bytes_per_texel();
        if texels.len() != expected {
            return Err(ComposeError::InvalidTexture(format!(
                "`{label}` holds {} bytes, expected {expected} for {width}x{height} {format:?}",
                texels.len()
            )));
        }
        Ok(Self {
            id: ExternalTextureId(NEXT_EXTERNAL_ID.fetch_add(1, Ordering::Relaxed)),
            label,
            width,
            height,
            format,
            texels,
        })
    }

    pub fn id(&self) -> ExternalTextureId {
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

    pub fn format(&self) -> TexelFormat {
        self.format
    }

    pub fn texels(&self) -> &[u8] {
        &self.texels
    }

    /// Reference for binding this data once it has been uploaded.
    pub fn texture(&self) -> TextureRef {
        TextureRef::External(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_length() {
        let err = TextureData::new("noise", 4, 4, TexelFormat::Rgba8, vec![0; 15]).unwrap_err();
        assert!(matches!(err, ComposeError::InvalidTexture(_)));
    }

    #[test]
    fn rejects_zero_area() {
        assert!(TextureData::new("empty", 0, 4, TexelFormat::R8, Vec::new()).is_err());
    }

    #[test]
    fn distinct_ids() {
        let a = TextureData::new("a", 1, 1, TexelFormat::R8, vec![1]).unwrap();
        let b = TextureData::new("b", 1, 1, TexelFormat::R8, vec![2]).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.texture(), TextureRef::External(a.id()));
    }
}
