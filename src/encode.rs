//! Output encoders: PNG for still images, pluggable encoders for frame streams.
//!
//! Encoded container bytes are outside the determinism guarantee; only the
//! frame pixels are covered by it.

use std::io::Cursor;

use async_trait::async_trait;
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, DynamicImage, Frame, ImageFormat, RgbaImage};

use crate::error::{Result, SketchError};
use crate::surface::RasterFrame;

/// MIME type of [`encode_png`] output.
pub const PNG_CONTENT_TYPE: &str = "image/png";

/// Encode one frame as PNG (lossless).
pub fn encode_png(frame: &RasterFrame) -> Result<Vec<u8>> {
    png_bytes(frame).map_err(|message| SketchError::Encoding {
        frames_rendered: 1,
        message,
    })
}

fn rgba_image(frame: &RasterFrame) -> std::result::Result<RgbaImage, String> {
    RgbaImage::from_raw(frame.width(), frame.height(), frame.pixels().to_vec())
        .ok_or_else(|| "invalid RGBA buffer".to_string())
}

fn png_bytes(frame: &RasterFrame) -> std::result::Result<Vec<u8>, String> {
    let image = DynamicImage::ImageRgba8(rgba_image(frame)?);
    let mut png: Vec<u8> = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| e.to_string())?;
    Ok(png)
}

/// Decode PNG bytes back into a frame.
pub fn decode_png(bytes: &[u8]) -> Result<RasterFrame> {
    let image = image::load_from_memory_with_format(bytes, ImageFormat::Png)
        .map_err(|e| SketchError::Execution(format!("invalid PNG payload: {e}")))?
        .into_rgba8();
    Ok(RasterFrame::from_raw(image.width(), image.height(), image.into_raw()))
}

/// Turns an ordered frame stream into container bytes.
#[async_trait]
pub trait FrameEncoder: Send + Sync {
    /// MIME type of the produced bytes.
    fn content_type(&self) -> &'static str;

    /// Encode `frames` for playback at `fps`.
    async fn encode(&self, frames: Vec<RasterFrame>, fps: u32) -> anyhow::Result<Vec<u8>>;
}

/// Looping animated GIF.
#[derive(Debug, Clone, Copy, Default)]
pub struct GifFrameEncoder;

#[async_trait]
impl FrameEncoder for GifFrameEncoder {
    fn content_type(&self) -> &'static str {
        "image/gif"
    }

    async fn encode(&self, frames: Vec<RasterFrame>, fps: u32) -> anyhow::Result<Vec<u8>> {
        tokio::task::spawn_blocking(move || encode_gif(frames, fps)).await?
    }
}

fn encode_gif(frames: Vec<RasterFrame>, fps: u32) -> anyhow::Result<Vec<u8>> {
    let delay = Delay::from_numer_denom_ms(1000, fps.max(1));
    let mut gif_frames = Vec::with_capacity(frames.len());
    for frame in frames {
        let (width, height) = (frame.width(), frame.height());
        let image = RgbaImage::from_raw(width, height, frame.into_pixels())
            .ok_or_else(|| anyhow::anyhow!("invalid RGBA buffer"))?;
        gif_frames.push(Frame::from_parts(image, 0, 0, delay));
    }

    let mut bytes = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut bytes);
        encoder.set_repeat(Repeat::Infinite)?;
        encoder.encode_frames(gif_frames)?;
    }
    Ok(bytes)
}

/// Uncompressed frame stream for downstream video tooling.
///
/// Layout (little endian): magic `SKFR`, version byte, width, height, fps and
/// frame count as `u32`, then every frame's RGBA8 bytes in order.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameStreamEncoder;

impl FrameStreamEncoder {
    pub const MAGIC: &'static [u8; 4] = b"SKFR";
    pub const VERSION: u8 = 1;
    const HEADER_LEN: usize = 4 + 1 + 4 * 4;

    /// Parse a stream produced by this encoder back into frames and fps.
    pub fn decode(bytes: &[u8]) -> anyhow::Result<(Vec<RasterFrame>, u32)> {
        anyhow::ensure!(bytes.len() >= Self::HEADER_LEN, "frame stream truncated");
        anyhow::ensure!(&bytes[..4] == Self::MAGIC, "not a frame stream");
        anyhow::ensure!(bytes[4] == Self::VERSION, "unsupported frame stream version {}", bytes[4]);

        let field = |i: usize| {
            let at = 5 + i * 4;
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };
        let (width, height, fps, count) = (field(0), field(1), field(2), field(3));

        let frame_len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(4))
            .ok_or_else(|| anyhow::anyhow!("frame size {width}x{height} overflows"))?;
        anyhow::ensure!(
            frame_len > 0 || count == 0,
            "{count} frames of size {width}x{height} carry no pixels"
        );
        let body_len = frame_len
            .checked_mul(count as usize)
            .ok_or_else(|| anyhow::anyhow!("frame stream of {count} frames overflows"))?;
        let body = &bytes[Self::HEADER_LEN..];
        anyhow::ensure!(body.len() == body_len, "frame stream length mismatch");
        if count == 0 {
            return Ok((Vec::new(), fps));
        }

        let frames = body
            .chunks_exact(frame_len)
            .map(|chunk| RasterFrame::from_raw(width, height, chunk.to_vec()))
            .collect();
        Ok((frames, fps))
    }
}

#[async_trait]
impl FrameEncoder for FrameStreamEncoder {
    fn content_type(&self) -> &'static str {
        "application/octet-stream"
    }

    async fn encode(&self, frames: Vec<RasterFrame>, fps: u32) -> anyhow::Result<Vec<u8>> {
        let (width, height) = frames
            .first()
            .map(|f| (f.width(), f.height()))
            .unwrap_or((0, 0));
        let count = u32::try_from(frames.len())?;

        let mut out = Vec::with_capacity(
            Self::HEADER_LEN + frames.iter().map(|f| f.pixels().len()).sum::<usize>(),
        );
        out.extend_from_slice(Self::MAGIC);
        out.push(Self::VERSION);
        for value in [width, height, fps, count] {
            out.extend_from_slice(&value.to_le_bytes());
        }
        for frame in &frames {
            anyhow::ensure!(
                frame.width() == width && frame.height() == height,
                "frame size changed mid-stream"
            );
            out.extend_from_slice(frame.pixels());
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{Raster, Rgba, Surface};

    fn frame_with(color: Rgba) -> RasterFrame {
        let mut raster = Raster::new(3, 2);
        raster.set_pixel(1, 1, color);
        RasterFrame::capture(&raster)
    }

    #[test]
    fn test_png_is_lossless() {
        let frame = frame_with(Rgba::new(12, 34, 56, 78));
        let png = encode_png(&frame).unwrap();

        assert_eq!(&png[1..4], b"PNG");
        assert_eq!(decode_png(&png).unwrap(), frame);
    }

    #[test]
    fn test_png_encoding_is_deterministic() {
        let frame = frame_with(Rgba::WHITE);
        assert_eq!(encode_png(&frame).unwrap(), encode_png(&frame).unwrap());
    }

    #[tokio::test]
    async fn test_gif_encoder_produces_gif() {
        let frames = vec![frame_with(Rgba::WHITE), frame_with(Rgba::BLACK)];
        let bytes = GifFrameEncoder.encode(frames, 10).await.unwrap();
        assert_eq!(&bytes[..3], b"GIF");
    }

    #[tokio::test]
    async fn test_frame_stream_preserves_frames() {
        let frames = vec![frame_with(Rgba::WHITE), frame_with(Rgba::new(1, 2, 3, 4))];
        let bytes = FrameStreamEncoder.encode(frames.clone(), 24).await.unwrap();

        let (decoded, fps) = FrameStreamEncoder::decode(&bytes).unwrap();
        assert_eq!(fps, 24);
        assert_eq!(decoded, frames);
    }

    fn stream_header(width: u32, height: u32, count: u32) -> Vec<u8> {
        let mut bytes = FrameStreamEncoder::MAGIC.to_vec();
        bytes.push(FrameStreamEncoder::VERSION);
        for field in [width, height, 24, count] {
            bytes.extend_from_slice(&field.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn test_frame_stream_rejects_oversized_header() {
        let err = FrameStreamEncoder::decode(&stream_header(u32::MAX, u32::MAX, u32::MAX)).unwrap_err();
        assert!(err.to_string().contains("overflows"), "got {err}");

        let err = FrameStreamEncoder::decode(&stream_header(65_536, 65_536, u32::MAX)).unwrap_err();
        assert!(err.to_string().contains("overflows") || err.to_string().contains("mismatch"));
    }

    #[test]
    fn test_frame_stream_rejects_empty_frames_with_count() {
        let err = FrameStreamEncoder::decode(&stream_header(0, 4, 3)).unwrap_err();
        assert!(err.to_string().contains("no pixels"), "got {err}");
    }

    #[tokio::test]
    async fn test_frame_stream_without_frames() {
        let bytes = FrameStreamEncoder.encode(Vec::new(), 12).await.unwrap();
        let (decoded, fps) = FrameStreamEncoder::decode(&bytes).unwrap();
        assert!(decoded.is_empty());
        assert_eq!(fps, 12);
    }

    #[tokio::test]
    async fn test_frame_stream_rejects_mixed_sizes() {
        let frames = vec![frame_with(Rgba::WHITE), RasterFrame::capture(&Raster::new(1, 1))];
        assert!(FrameStreamEncoder.encode(frames, 24).await.is_err());
    }
}
