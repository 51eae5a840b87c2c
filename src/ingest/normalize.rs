use anyhow::{anyhow, Result};

use crate::frame::Rotation;

/// Pixel layouts accepted from frame sources.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb24,
    Nv12,
    /// Android camera default: Y plane followed by interleaved V/U.
    Nv21,
}

/// Convert source pixels into packed RGB24.
///
/// A length mismatch is a transient input error: the caller skips the frame.
pub fn normalize_to_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Vec<u8>> {
    match format {
        PixelFormat::Rgb24 => {
            let expected = width
                .checked_mul(height)
                .and_then(|v| v.checked_mul(3))
                .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))? as usize;
            if pixels.len() != expected {
                return Err(anyhow!(
                    "RGB frame length mismatch: expected {}, got {}",
                    expected,
                    pixels.len()
                ));
            }
            Ok(pixels.to_vec())
        }
        PixelFormat::Nv12 => semi_planar_to_rgb(pixels, width, height, false),
        PixelFormat::Nv21 => semi_planar_to_rgb(pixels, width, height, true),
    }
}

fn semi_planar_to_rgb(pixels: &[u8], width: u32, height: u32, vu_order: bool) -> Result<Vec<u8>> {
    let w = width as usize;
    let h = height as usize;
    let y_plane = w
        .checked_mul(h)
        .ok_or_else(|| anyhow!("YUV frame dimensions overflow"))?;
    let expected = y_plane
        .checked_add(y_plane / 2)
        .ok_or_else(|| anyhow!("YUV frame dimensions overflow"))?;
    if pixels.len() != expected {
        return Err(anyhow!(
            "YUV frame length mismatch: expected {}, got {}",
            expected,
            pixels.len()
        ));
    }

    let mut rgb = vec![0u8; y_plane * 3];
    for j in 0..h {
        for i in 0..w {
            let y = pixels[j * w + i] as f32;
            let uv_index = y_plane + (j / 2) * w + (i / 2) * 2;
            let (u_index, v_index) = if vu_order {
                (uv_index + 1, uv_index)
            } else {
                (uv_index, uv_index + 1)
            };
            let u = pixels[u_index] as f32 - 128.0;
            let v = pixels[v_index] as f32 - 128.0;

            let r = y + 1.402_f32 * v;
            let g = y - 0.344_136_f32 * u - 0.714_136_f32 * v;
            let b = y + 1.772_f32 * u;

            let offset = (j * w + i) * 3;
            rgb[offset] = clamp_to_u8(r);
            rgb[offset + 1] = clamp_to_u8(g);
            rgb[offset + 2] = clamp_to_u8(b);
        }
    }

    Ok(rgb)
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Rotate (clockwise) and optionally mirror a packed RGB24 image.
///
/// Returns the new buffer with its oriented width and height. Mirroring is
/// applied after rotation, around the vertical axis.
pub fn orient_rgb(
    rgb: &[u8],
    width: u32,
    height: u32,
    rotation: Rotation,
    mirror: bool,
) -> Result<(Vec<u8>, u32, u32)> {
    let (w, h) = (width as usize, height as usize);
    if rgb.len() != w * h * 3 {
        return Err(anyhow!(
            "RGB buffer length {} does not match {}x{}",
            rgb.len(),
            width,
            height
        ));
    }
    if rotation == Rotation::Deg0 && !mirror {
        return Ok((rgb.to_vec(), width, height));
    }

    let (ow, oh) = if rotation.swaps_axes() { (h, w) } else { (w, h) };
    let mut out = vec![0u8; rgb.len()];
    for oy in 0..oh {
        for ox in 0..ow {
            let dx = if mirror { ow - 1 - ox } else { ox };
            // Source pixel that lands at (dx, oy) after a clockwise rotation.
            let (sx, sy) = match rotation {
                Rotation::Deg0 => (dx, oy),
                Rotation::Deg90 => (oy, h - 1 - dx),
                Rotation::Deg180 => (w - 1 - dx, h - 1 - oy),
                Rotation::Deg270 => (w - 1 - oy, dx),
            };
            let src = (sy * w + sx) * 3;
            let dst = (oy * ow + ox) * 3;
            out[dst..dst + 3].copy_from_slice(&rgb[src..src + 3]);
        }
    }
    Ok((out, ow as u32, oh as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nv12_conversion_produces_gray() -> Result<()> {
        let width = 2;
        let height = 2;
        let y_plane = vec![128u8; 4];
        let uv_plane = vec![128u8; 2];
        let nv12 = [y_plane, uv_plane].concat();

        let rgb = normalize_to_rgb(&nv12, width, height, PixelFormat::Nv12)?;
        assert_eq!(rgb, vec![128u8; 12]);

        Ok(())
    }

    #[test]
    fn nv21_swaps_chroma_order() -> Result<()> {
        // Strong V, neutral U: NV21 stores V first, so red dominates.
        let nv21 = [vec![128u8; 4], vec![200u8, 128u8]].concat();
        let rgb = normalize_to_rgb(&nv21, 2, 2, PixelFormat::Nv21)?;
        assert!(rgb[0] > rgb[2]);

        let nv12 = [vec![128u8; 4], vec![128u8, 200u8]].concat();
        assert_eq!(normalize_to_rgb(&nv12, 2, 2, PixelFormat::Nv12)?, rgb);
        Ok(())
    }

    #[test]
    fn rgb_pass_through_validates_length() -> Result<()> {
        let pixels = vec![1u8; 9];
        let rgb = normalize_to_rgb(&pixels, 1, 3, PixelFormat::Rgb24)?;
        assert_eq!(rgb, pixels);
        assert!(normalize_to_rgb(&pixels, 2, 3, PixelFormat::Rgb24).is_err());
        Ok(())
    }

    // 2x1 image: pixel A then pixel B.
    const A: [u8; 3] = [1, 1, 1];
    const B: [u8; 3] = [2, 2, 2];

    #[test]
    fn mirror_swaps_columns() -> Result<()> {
        let rgb = [A, B].concat();
        let (out, w, h) = orient_rgb(&rgb, 2, 1, Rotation::Deg0, true)?;
        assert_eq!((w, h), (2, 1));
        assert_eq!(out, [B, A].concat());
        Ok(())
    }

    #[test]
    fn quarter_turn_clockwise_stacks_pixels() -> Result<()> {
        let rgb = [A, B].concat();
        let (out, w, h) = orient_rgb(&rgb, 2, 1, Rotation::Deg90, false)?;
        assert_eq!((w, h), (1, 2));
        // Left pixel ends up on top after a clockwise turn.
        assert_eq!(out, [A, B].concat());

        let (out, _, _) = orient_rgb(&rgb, 2, 1, Rotation::Deg270, false)?;
        assert_eq!(out, [B, A].concat());
        Ok(())
    }
}
