//! Texture payload decoding.
//!
//! JPEG goes through the `image` crate. DXT1 (BC1) is either passed through
//! for GPUs that sample it natively or expanded to RGBA8. The remaining wire
//! formats are reported as `UnsupportedEncoding`.

use serde::Deserialize;

use crate::constants::{
  TEXTURE_FORMAT_CRN_DXT1, TEXTURE_FORMAT_DXT1, TEXTURE_FORMAT_ETC1, TEXTURE_FORMAT_JPG, TEXTURE_FORMAT_PVRTC2,
  TEXTURE_FORMAT_PVRTC4,
};
use crate::error::{DecodeError, DecodeResult};

/// Texture formats the server can deliver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextureFormat {
  Jpg,
  Dxt1,
  Etc1,
  Pvrtc2,
  Pvrtc4,
  CrnDxt1,
}

impl TextureFormat {
  pub fn from_wire(value: u32) -> Option<Self> {
    Some(match value {
      TEXTURE_FORMAT_JPG => Self::Jpg,
      TEXTURE_FORMAT_DXT1 => Self::Dxt1,
      TEXTURE_FORMAT_ETC1 => Self::Etc1,
      TEXTURE_FORMAT_PVRTC2 => Self::Pvrtc2,
      TEXTURE_FORMAT_PVRTC4 => Self::Pvrtc4,
      TEXTURE_FORMAT_CRN_DXT1 => Self::CrnDxt1,
      _ => return None,
    })
  }

  pub fn wire_value(self) -> u32 {
    match self {
      Self::Jpg => TEXTURE_FORMAT_JPG,
      Self::Dxt1 => TEXTURE_FORMAT_DXT1,
      Self::Etc1 => TEXTURE_FORMAT_ETC1,
      Self::Pvrtc2 => TEXTURE_FORMAT_PVRTC2,
      Self::Pvrtc4 => TEXTURE_FORMAT_PVRTC4,
      Self::CrnDxt1 => TEXTURE_FORMAT_CRN_DXT1,
    }
  }

  /// Whether the bitmask of available formats includes this one.
  #[inline]
  pub fn is_available(self, mask: u32) -> bool {
    mask & (1 << (self.wire_value() - 1)) != 0
  }

  /// First preferred format present in `mask`, falling back to JPEG.
  pub fn choose(preferred: &[TextureFormat], mask: u32) -> TextureFormat {
    preferred
      .iter()
      .copied()
      .find(|format| format.is_available(mask))
      .unwrap_or(TextureFormat::Jpg)
  }
}

/// CPU-side pixel layout handed to the renderer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
  Rgba8,
  /// BC1 blocks, 8 bytes per 4x4 block.
  Bc1,
}

/// Decoded texture ready for upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedTexture {
  pub width: u32,
  pub height: u32,
  pub format: PixelFormat,
  pub pixels: Vec<u8>,
}

impl DecodedTexture {
  pub fn byte_size(&self) -> usize {
    self.pixels.len()
  }
}

/// Texture decoding options.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextureDecodeOptions {
  /// Expand DXT1 to RGBA8 instead of passing blocks through.
  pub expand_block_compressed: bool,
}

/// Decode one texture payload.
pub fn decode_texture(
  data: &[u8],
  format: TextureFormat,
  width: u32,
  height: u32,
  options: TextureDecodeOptions,
) -> DecodeResult<DecodedTexture> {
  match format {
    TextureFormat::Jpg => decode_jpeg(data),
    TextureFormat::Dxt1 => {
      let expected = bc1_size(width, height);
      if data.len() < expected {
        return Err(DecodeError::Truncated("dxt1 texture"));
      }
      let blocks = &data[..expected];
      if options.expand_block_compressed {
        Ok(DecodedTexture {
          width,
          height,
          format: PixelFormat::Rgba8,
          pixels: expand_bc1(blocks, width, height),
        })
      } else {
        Ok(DecodedTexture {
          width,
          height,
          format: PixelFormat::Bc1,
          pixels: blocks.to_vec(),
        })
      }
    }
    other => Err(DecodeError::UnsupportedEncoding(format!("texture format {other:?}"))),
  }
}

fn decode_jpeg(data: &[u8]) -> DecodeResult<DecodedTexture> {
  let image = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)
    .map_err(|err| DecodeError::malformed("jpeg texture", err.to_string()))?;
  let rgba = image.to_rgba8();
  Ok(DecodedTexture {
    width: rgba.width(),
    height: rgba.height(),
    format: PixelFormat::Rgba8,
    pixels: rgba.into_raw(),
  })
}

/// Bytes of BC1 data for an image, rounding up to whole 4x4 blocks.
pub fn bc1_size(width: u32, height: u32) -> usize {
  let blocks_x = width.div_ceil(4) as usize;
  let blocks_y = height.div_ceil(4) as usize;
  blocks_x * blocks_y * 8
}

fn rgb565(value: u16) -> [u8; 3] {
  let r = ((value >> 11) & 0x1f) as u32;
  let g = ((value >> 5) & 0x3f) as u32;
  let b = (value & 0x1f) as u32;
  [(r * 255 / 31) as u8, (g * 255 / 63) as u8, (b * 255 / 31) as u8]
}

fn mix(a: [u8; 3], b: [u8; 3], wa: u32, wb: u32) -> [u8; 4] {
  let total = wa + wb;
  let c = |i: usize| ((u32::from(a[i]) * wa + u32::from(b[i]) * wb) / total) as u8;
  [c(0), c(1), c(2), 255]
}

/// Expand BC1 blocks to RGBA8.
pub fn expand_bc1(blocks: &[u8], width: u32, height: u32) -> Vec<u8> {
  let (w, h) = (width as usize, height as usize);
  let mut out = vec![0u8; w * h * 4];
  let blocks_x = w.div_ceil(4);
  for (block_index, block) in blocks.chunks_exact(8).enumerate() {
    let bx = (block_index % blocks_x) * 4;
    let by = (block_index / blocks_x) * 4;
    let c0 = u16::from_le_bytes([block[0], block[1]]);
    let c1 = u16::from_le_bytes([block[2], block[3]]);
    let (p0, p1) = (rgb565(c0), rgb565(c1));
    let palette = if c0 > c1 {
      [[p0[0], p0[1], p0[2], 255], [p1[0], p1[1], p1[2], 255], mix(p0, p1, 2, 1), mix(p0, p1, 1, 2)]
    } else {
      [[p0[0], p0[1], p0[2], 255], [p1[0], p1[1], p1[2], 255], mix(p0, p1, 1, 1), [0, 0, 0, 0]]
    };
    let bits = u32::from_le_bytes([block[4], block[5], block[6], block[7]]);
    for py in 0..4 {
      for px in 0..4 {
        let (x, y) = (bx + px, by + py);
        if x >= w || y >= h {
          continue;
        }
        let code = (bits >> (2 * (py * 4 + px))) & 3;
        let dst = (y * w + x) * 4;
        out[dst..dst + 4].copy_from_slice(&palette[code as usize]);
      }
    }
  }
  out
}

#[cfg(test)]
#[path = "texture_test.rs"]
mod texture_test;
