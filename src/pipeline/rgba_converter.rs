use anyhow::{Result, anyhow};
use nokhwa::{Buffer, utils::FrameFormat};
use rayon::prelude::*;
use yuv::{
    YuvBiPlanarImage, YuvConversionMode, YuvPackedImage, YuvRange, YuvStandardMatrix,
    yuv_nv12_to_rgba, yuyv422_to_rgba,
};
use zune_jpeg::{
    JpegDecoder,
    zune_core::{bytestream::ZCursor, colorspace::ColorSpace, options::DecoderOptions},
};

#[derive(Debug)]
pub struct RgbaFrame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

pub fn convert_camera_frame(frame: &Buffer) -> Result<RgbaFrame> {
    let resolution = frame.resolution();
    convert_pixels(
        frame.source_frame_format(),
        frame.buffer(),
        resolution.width_x,
        resolution.height_y,
    )
}

pub fn convert_pixels(format: FrameFormat, data: &[u8], width: u32, height: u32) -> Result<RgbaFrame> {
    let pixels = width as usize * height as usize;
    let rgba = match format {
        FrameFormat::NV12 => {
            require_len("NV12", data, pixels + pixels / 2)?;
            nv12_to_rgba(data, width, height)?
        }
        FrameFormat::YUYV => {
            require_len("YUYV", data, pixels * 2)?;
            yuyv_to_rgba(data, width, height)?
        }
        FrameFormat::MJPEG => return mjpeg_to_rgba(data),
        FrameFormat::RAWRGB => {
            require_len("RGB", data, pixels * 3)?;
            packed_to_rgba::<3>(data, pixels, [0, 1, 2])
        }
        FrameFormat::RAWBGR => {
            require_len("BGR", data, pixels * 3)?;
            packed_to_rgba::<3>(data, pixels, [2, 1, 0])
        }
        FrameFormat::GRAY => {
            require_len("GRAY", data, pixels)?;
            packed_to_rgba::<1>(data, pixels, [0, 0, 0])
        }
    };

    Ok(RgbaFrame {
        rgba,
        width,
        height,
    })
}

/// Flips an RGBA image left to right in place.
pub fn mirror_horizontal(rgba: &mut [u8], width: u32, height: u32) -> Result<()> {
    let stride = width as usize * 4;
    require_len("RGBA", rgba, stride * height as usize)?;
    if stride == 0 {
        return Ok(());
    }
    rgba.par_chunks_exact_mut(stride).for_each(|row| {
        let (mut left, mut right) = (0, width as usize - 1);
        while left < right {
            for c in 0..4 {
                row.swap(left * 4 + c, right * 4 + c);
            }
            left += 1;
            right -= 1;
        }
    });
    Ok(())
}

fn require_len(label: &str, data: &[u8], expected: usize) -> Result<()> {
    if data.len() < expected {
        return Err(anyhow!(
            "{label} buffer too small: got {}, expected {expected}",
            data.len()
        ));
    }
    Ok(())
}

fn nv12_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let y_len = width as usize * height as usize;
    let mut rgba = vec![0u8; y_len * 4];
    let image = YuvBiPlanarImage {
        y_plane: &data[..y_len],
        y_stride: width,
        uv_plane: &data[y_len..y_len + y_len / 2],
        uv_stride: width,
        width,
        height,
    };

    yuv_nv12_to_rgba(
        &image,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
        YuvConversionMode::Balanced,
    )
    .map_err(|err| anyhow!("NV12 to RGBA failed: {err:?}"))?;
    Ok(rgba)
}

fn yuyv_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let mut rgba = vec![0u8; width as usize * height as usize * 4];
    let packed = YuvPackedImage {
        yuy: data,
        yuy_stride: width * 2,
        width,
        height,
    };

    yuyv422_to_rgba(
        &packed,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
    )
    .map_err(|err| anyhow!("YUYV422 to RGBA failed: {err:?}"))?;
    Ok(rgba)
}

fn mjpeg_to_rgba(data: &[u8]) -> Result<RgbaFrame> {
    let options = DecoderOptions::default().jpeg_set_out_colorspace(ColorSpace::RGBA);
    let mut decoder = JpegDecoder::new_with_options(ZCursor::new(data), options);
    let rgba = decoder
        .decode()
        .map_err(|err| anyhow!("MJPEG decode failed: {err:?}"))?;
    let info = decoder
        .info()
        .ok_or_else(|| anyhow!("MJPEG decoder reported no image info"))?;
    let (width, height) = (u32::from(info.width), u32::from(info.height));
    require_len("MJPEG output", &rgba, width as usize * height as usize * 4)?;

    Ok(RgbaFrame {
        rgba,
        width,
        height,
    })
}

/// Expands `N`-byte pixels to opaque RGBA, picking channels by `order`.
fn packed_to_rgba<const N: usize>(data: &[u8], pixels: usize, order: [usize; 3]) -> Vec<u8> {
    let mut rgba = vec![0u8; pixels * 4];
    rgba.par_chunks_exact_mut(4)
        .zip(data.par_chunks_exact(N))
        .for_each(|(dst, src)| {
            dst[0] = src[order[0]];
            dst[1] = src[order[1]];
            dst[2] = src[order[2]];
            dst[3] = 255;
        });
    rgba
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bgr_is_swapped_into_rgba() {
        let bgr = [1, 2, 3, 4, 5, 6];
        let frame = convert_pixels(FrameFormat::RAWBGR, &bgr, 2, 1).unwrap();
        assert_eq!(frame.rgba, vec![3, 2, 1, 255, 6, 5, 4, 255]);

        let rgb = convert_pixels(FrameFormat::RAWRGB, &bgr, 2, 1).unwrap();
        assert_eq!(rgb.rgba, vec![1, 2, 3, 255, 4, 5, 6, 255]);
    }

    #[test]
    fn gray_expands_to_opaque_rgba() {
        let frame = convert_pixels(FrameFormat::GRAY, &[10, 200], 1, 2).unwrap();
        assert_eq!(frame.rgba, vec![10, 10, 10, 255, 200, 200, 200, 255]);
        assert_eq!((frame.width, frame.height), (1, 2));
    }

    #[test]
    fn short_buffers_are_rejected() {
        assert!(convert_pixels(FrameFormat::RAWRGB, &[0; 5], 2, 1).is_err());
        assert!(convert_pixels(FrameFormat::YUYV, &[0; 7], 2, 2).is_err());
        assert!(convert_pixels(FrameFormat::NV12, &[0; 5], 2, 2).is_err());
    }

    #[test]
    fn mirror_reverses_each_row() {
        let mut rgba: Vec<u8> = (0..24).collect();
        mirror_horizontal(&mut rgba, 3, 2).unwrap();
        assert_eq!(
            rgba,
            vec![
                8, 9, 10, 11, 4, 5, 6, 7, 0, 1, 2, 3, //
                20, 21, 22, 23, 16, 17, 18, 19, 12, 13, 14, 15,
            ]
        );
        assert!(mirror_horizontal(&mut rgba, 4, 2).is_err());
    }
}
