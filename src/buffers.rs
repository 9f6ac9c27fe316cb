//! Capture buffers for one device session.
//!
//! Color modes need a 4-channel capture buffer plus a 3-channel output.
//! Monochrome and Bayer capture write straight into the buffer that is
//! emitted, so there is nothing to convert or copy before publication.

use crate::types::{ColorMode, PixelFormat};

/// A tightly packed 8-bit image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl ImageBuffer {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let len = width as usize * height as usize * format.channels() as usize;
        Self {
            width,
            height,
            format,
            data: vec![0u8; len],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn channels(&self) -> u8 {
        self.format.channels()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// Convert `src` into `dst`. Both must share dimensions.
///
/// Only the BGRA→BGR normalization needed by the capture path is supported;
/// identical formats copy through.
pub fn convert(src: &ImageBuffer, dst: &mut ImageBuffer) {
    debug_assert_eq!((src.width, src.height), (dst.width, dst.height));
    match (src.format, dst.format) {
        (PixelFormat::Bgra8, PixelFormat::Bgr8) => {
            for (bgr, bgra) in dst.data.chunks_exact_mut(3).zip(src.data.chunks_exact(4)) {
                bgr.copy_from_slice(&bgra[..3]);
            }
        }
        (a, b) if a == b => dst.data.copy_from_slice(&src.data),
        (a, b) => log::error!("Unsupported conversion {:?} -> {:?}", a, b),
    }
}

#[derive(Debug)]
pub enum FrameBuffers {
    /// Capture buffer doubles as the output buffer.
    Shared(ImageBuffer),
    Converted { raw: ImageBuffer, output: ImageBuffer },
}

impl FrameBuffers {
    pub fn allocate(color_mode: ColorMode, width: u32, height: u32) -> Self {
        match color_mode {
            ColorMode::ColorRaw | ColorMode::ColorProcessed => Self::Converted {
                raw: ImageBuffer::new(width, height, PixelFormat::Bgra8),
                output: ImageBuffer::new(width, height, PixelFormat::Bgr8),
            },
            ColorMode::MonoRaw | ColorMode::MonoProcessed => {
                Self::Shared(ImageBuffer::new(width, height, PixelFormat::Gray8))
            }
            ColorMode::BayerRaw => Self::Shared(ImageBuffer::new(width, height, PixelFormat::Bayer8)),
        }
    }

    pub fn raw(&self) -> &ImageBuffer {
        match self {
            Self::Shared(buffer) => buffer,
            Self::Converted { raw, .. } => raw,
        }
    }

    pub fn raw_mut(&mut self) -> &mut ImageBuffer {
        match self {
            Self::Shared(buffer) => buffer,
            Self::Converted { raw, .. } => raw,
        }
    }

    pub fn output(&self) -> &ImageBuffer {
        match self {
            Self::Shared(buffer) => buffer,
            Self::Converted { output, .. } => output,
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, Self::Shared(_))
    }

    /// Bring the output buffer up to date with the last pulled raw frame.
    pub fn normalize(&mut self) {
        if let Self::Converted { raw, output } = self {
            convert(raw, output);
        }
    }
}
