//! One-shot background generation of lookup textures.
//!
//! Some effects need precomputed texel data (noise maps, anti-aliasing lookup
//! tables) that is expensive to build but never changes afterwards. A
//! [`LookupTexture`] runs the generator once on a background thread and delivers the
//! result over a one-shot channel. Until it resolves, dependent effects render as a
//! pass-through. Once resolved the data is cached and shared by every frame.
//!
//! Generation cannot be cancelled; it is a one-time startup cost.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, TryRecvError};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::error::ComposeError;
use crate::texture::{TexelFormat, TextureData};

enum LookupState {
    Pending(Receiver<Result<TextureData, ComposeError>>),
    Ready(Arc<TextureData>),
    Failed,
}

/// A texture whose data is produced asynchronously exactly once.
pub struct LookupTexture {
    label: String,
    state: LookupState,
}

impl LookupTexture {
    /// Wraps data that is already available.
    pub fn ready(data: TextureData) -> Self {
        Self {
            label: data.label().to_string(),
            state: LookupState::Ready(Arc::new(data)),
        }
    }

    /// Starts `generator` on a named background thread.
    pub fn spawn<F>(label: impl Into<String>, generator: F) -> Self
    where
        F: FnOnce() -> Result<TextureData, ComposeError> + Send + 'static,
    {
        let label = label.into();
        let (tx, rx) = crossbeam_channel::bounded(1);
        let spawned = thread::Builder::new()
            .name(format!("lookup-{label}"))
            .spawn(move || {
                // The receiver may already be gone if the owner was dropped.
                let _ = tx.send(generator());
            });

        let state = match spawned {
            Ok(_) => LookupState::Pending(rx),
            Err(err) => {
                tracing::error!(%label, %err, "failed to start lookup texture thread");
                LookupState::Failed
            }
        };
        Self { label, state }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the data if generation has finished, without blocking.
    pub fn poll(&mut self) -> Option<Arc<TextureData>> {
        if let LookupState::Pending(rx) = &self.state {
            match rx.try_recv() {
                Ok(result) => self.settle(result),
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) => self.settle_disconnected(),
            }
        }
        self.data()
    }

    /// Blocks until generation has finished.
    pub fn wait(&mut self) -> Option<Arc<TextureData>> {
        if let LookupState::Pending(rx) = &self.state {
            match rx.recv() {
                Ok(result) => self.settle(result),
                Err(_) => self.settle_disconnected(),
            }
        }
        self.data()
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, LookupState::Pending(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, LookupState::Failed)
    }

    fn data(&self) -> Option<Arc<TextureData>> {
        match &self.state {
            LookupState::Ready(data) => Some(Arc::clone(data)),
            _ => None,
        }
    }

    fn settle(&mut self, result: Result<TextureData, ComposeError>) {
        self.state = match result {
            Ok(data) => {
                tracing::debug!(label = %self.label, width = data.width(), height = data.height(), "lookup texture ready");
                LookupState::Ready(Arc::new(data))
            }
            Err(err) => {
                tracing::error!(label = %self.label, %err, "lookup texture generation failed");
                LookupState::Failed
            }
        };
    }

    fn settle_disconnected(&mut self) {
        tracing::error!(label = %self.label, "lookup texture generator exited without a result");
        self.state = LookupState::Failed;
    }
}

/// Generates a square RGBA noise map used as a perturbation texture.
pub fn noise_texture(size: u32, seed: u64) -> Result<TextureData, ComposeError> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let texel_count = size as usize * size as usize;
    let mut texels = Vec::with_capacity(texel_count * 4);
    for _ in 0..texel_count {
        let value: u8 = rng.r#gen();
        texels.extend_from_slice(&[value, rng.r#gen(), rng.r#gen(), 255]);
    }
    TextureData::new("noise", size, size, TexelFormat::Rgba8, texels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_resolves_immediately() {
        let data = noise_texture(4, 1).unwrap();
        let mut lookup = LookupTexture::ready(data);
        assert!(!lookup.is_pending());
        assert_eq!(lookup.poll().map(|d| d.width()), Some(4));
    }

    #[test]
    fn spawned_resolves_once_and_caches() {
        let mut lookup = LookupTexture::spawn("noise", || noise_texture(8, 7));
        let first = lookup.wait().expect("generation succeeds");
        let second = lookup.poll().expect("result is cached");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.texels().len(), 8 * 8 * 4);
    }

    #[test]
    fn failed_generation_is_reported() {
        let mut lookup =
            LookupTexture::spawn("bad", || TextureData::new("bad", 0, 0, TexelFormat::R8, Vec::new()));
        assert!(lookup.wait().is_none());
        assert!(lookup.is_failed());
    }

    #[test]
    fn noise_is_deterministic_per_seed() {
        let a = noise_texture(4, 42).unwrap();
        let b = noise_texture(4, 42).unwrap();
        assert_eq!(a.texels(), b.texels());
    }
}
