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

/// Decoded camera buffer, always tightly packed RGBA.
#[derive(Debug)]
pub struct RgbaFrame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ChannelOrder {
    Rgb,
    Bgr,
}

pub fn convert_camera_frame(frame: &Buffer) -> Result<RgbaFrame> {
    let resolution = frame.resolution();
    let (width, height) = (resolution.width_x, resolution.height_y);
    let data = frame.buffer();

    match frame.source_frame_format() {
        FrameFormat::MJPEG => mjpeg_to_rgba(data),
        format => {
            let rgba = match format {
                FrameFormat::NV12 => nv12_to_rgba(data, width, height)?,
                FrameFormat::YUYV => yuyv_to_rgba(data, width, height)?,
                FrameFormat::RAWRGB => packed_to_rgba(data, width, height, ChannelOrder::Rgb)?,
                FrameFormat::RAWBGR => packed_to_rgba(data, width, height, ChannelOrder::Bgr)?,
                FrameFormat::GRAY => gray_to_rgba(data, width, height)?,
                FrameFormat::MJPEG => unreachable!("handled above"),
            };
            Ok(RgbaFrame {
                rgba,
                width,
                height,
            })
        }
    }
}

fn pixel_count(width: u32, height: u32) -> usize {
    width as usize * height as usize
}

fn check_len(kind: &str, data: &[u8], expected: usize) -> Result<()> {
    if data.len() < expected {
        return Err(anyhow!(
            "{kind} buffer too small: got {}, expected {expected}",
            data.len()
        ));
    }
    Ok(())
}

fn nv12_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let luma_len = pixel_count(width, height);
    let chroma_len = luma_len / 2;
    check_len("NV12", data, luma_len + chroma_len)?;

    let image = YuvBiPlanarImage {
        y_plane: &data[..luma_len],
        y_stride: width,
        uv_plane: &data[luma_len..luma_len + chroma_len],
        uv_stride: width,
        width,
        height,
    };
    let mut rgba = vec![0u8; luma_len * 4];
    yuv_nv12_to_rgba(
        &image,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
        YuvConversionMode::Balanced,
    )
    .map_err(|err| anyhow!("NV12 conversion failed: {err:?}"))?;
    Ok(rgba)
}

fn yuyv_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    check_len("YUYV", data, pixel_count(width, height) * 2)?;

    let packed = YuvPackedImage {
        yuy: data,
        yuy_stride: width * 2,
        width,
        height,
    };
    let mut rgba = vec![0u8; pixel_count(width, height) * 4];
    yuyv422_to_rgba(
        &packed,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
    )
    .map_err(|err| anyhow!("YUYV conversion failed: {err:?}"))?;
    Ok(rgba)
}

/// MJPEG frames carry their own dimensions, which win over the negotiated ones.
fn mjpeg_to_rgba(data: &[u8]) -> Result<RgbaFrame> {
    let options = DecoderOptions::default().jpeg_set_out_colorspace(ColorSpace::RGBA);
    let mut decoder = JpegDecoder::new_with_options(ZCursor::new(data), options);
    let rgba = decoder
        .decode()
        .map_err(|err| anyhow!("MJPEG decode failed: {err:?}"))?;
    let info = decoder
        .info()
        .ok_or_else(|| anyhow!("MJPEG decoder reported no image info"))?;

    let width = u32::try_from(info.width).map_err(|_| anyhow!("MJPEG width out of range"))?;
    let height = u32::try_from(info.height).map_err(|_| anyhow!("MJPEG height out of range"))?;
    let expected = pixel_count(width, height) * 4;
    if rgba.len() < expected {
        return Err(anyhow!(
            "MJPEG decode produced {} bytes, expected {expected}",
            rgba.len()
        ));
    }

    Ok(RgbaFrame {
        rgba,
        width,
        height,
    })
}

fn packed_to_rgba(data: &[u8], width: u32, height: u32, order: ChannelOrder) -> Result<Vec<u8>> {
    check_len("RGB", data, pixel_count(width, height) * 3)?;

    let mut rgba = vec![0u8; pixel_count(width, height) * 4];
    rgba.par_chunks_exact_mut(4)
        .zip(data.par_chunks_exact(3))
        .for_each(|(dst, src)| {
            let (r, b) = match order {
                ChannelOrder::Rgb => (src[0], src[2]),
                ChannelOrder::Bgr => (src[2], src[0]),
            };
            dst.copy_from_slice(&[r, src[1], b, 255]);
        });
    Ok(rgba)
}

fn gray_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let count = pixel_count(width, height);
    check_len("GRAY", data, count)?;

    let mut rgba = vec![0u8; count * 4];
    rgba.par_chunks_exact_mut(4)
        .zip(data[..count].par_iter())
        .for_each(|(dst, &luma)| dst.copy_from_slice(&[luma, luma, luma, 255]));
    Ok(rgba)
}

/// Flips an RGBA image left-to-right in place, producing a selfie-style view.
pub fn mirror_horizontally(rgba: &mut [u8], width: u32, height: u32) {
    let row_len = width as usize * 4;
    if row_len == 0 || rgba.len() < row_len * height as usize {
        return;
    }
    rgba[..row_len * height as usize]
        .par_chunks_exact_mut(row_len)
        .for_each(|row| {
            let (mut left, mut right) = (0usize, width as usize - 1);
            while left < right {
                for c in 0..4 {
                    row.swap(left * 4 + c, right * 4 + c);
                }
                left += 1;
                right -= 1;
            }
        });
}
