//! Frame container for evidence capture.
//!
//! `GateFrame` holds one decoded RGB frame from the monitored stream. Frames
//! ride along with their per-frame observation through the debounce window so
//! the dispatcher can persist the representative one as violation evidence.

use anyhow::{anyhow, Context, Result};
use std::path::Path;

/// One decoded frame, tightly packed RGB8.
#[derive(Clone)]
pub struct GateFrame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl GateFrame {
    /// Wrap a decoded RGB8 buffer. Length must be `width * height * 3`.
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(anyhow!(
                "frame buffer is {} bytes, expected {} for {}x{} rgb8",
                data.len(),
                expected,
                width,
                height
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Deterministic gradient frame for synthetic sources and tests.
    pub fn synthetic(width: u32, height: u32, seed: u64) -> Self {
        let len = width as usize * height as usize * 3;
        let mut data = vec![0u8; len];
        for (i, px) in data.iter_mut().enumerate() {
            *px = ((i as u64).wrapping_add(seed.wrapping_mul(31)) % 256) as u8;
        }
        Self {
            data,
            width,
            height,
        }
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Encode to JPEG at `path`. Used for evidence persistence only.
    pub fn save_jpeg(&self, path: &Path) -> Result<()> {
        image::save_buffer_with_format(
            path,
            &self.data,
            self.width,
            self.height,
            image::ExtendedColorType::Rgb8,
            image::ImageFormat::Jpeg,
        )
        .with_context(|| format!("writing evidence frame to {}", path.display()))
    }
}

impl std::fmt::Debug for GateFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Pixel contents are noise; keep Debug output short.
        f.debug_struct("GateFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}
