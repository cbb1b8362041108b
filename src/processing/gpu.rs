//! GPU boundary and software executor
//!
//! The processing stage talks to the GPU through four primitives: texture
//! create/destroy, pitched uploads/downloads, a "run this color-pipeline
//! description" call, and a filtered blit. [`SoftwareGpu`] executes the same
//! contract on the CPU; a hardware backend implements [`GpuContext`] against
//! a real device. All submissions complete before returning, so callers get
//! a synchronous per-frame contract.

use crate::error::{Error, Result};
use crate::processing::tone::{
    self, Adjustments, CurveParams, DitherMethod, KernelFamily, ScalingAlgorithm, ToneLut,
    YuvMatrix,
};
use crate::types::{f16_to_f32, f32_to_f16, Frame, PixelFormat};

use std::collections::HashMap;

/// Opaque texture handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureUsage {
    /// Sampleable input
    Sampled,
    /// Renderable and readable output
    RenderTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub usage: TextureUsage,
}

/// Transfer function of the source signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    /// SDR gamma (approximated as 2.2)
    Gamma22,
    /// SMPTE ST 2084 PQ
    Pq,
    /// Hybrid log-gamma
    Hlg,
}

/// Declared color of the source frame
#[derive(Debug, Clone, Copy)]
pub struct SourceDesc {
    pub format: PixelFormat,
    pub matrix: YuvMatrix,
    pub transfer: Transfer,
    /// Nominal peak of the source signal in nits
    pub peak_nits: f32,
}

/// Tone curve parameters; absent for SDR sources (pass-through)
#[derive(Debug, Clone)]
pub struct ToneParams {
    pub curve: CurveParams,
    pub lut: Option<ToneLut>,
}

#[derive(Debug, Clone, Copy)]
pub struct DebandParams {
    pub iterations: u32,
    /// Detection threshold on the 8-bit scale
    pub threshold: f32,
    pub radius: u32,
    pub grain: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct DitherParams {
    pub method: DitherMethod,
    pub strength: f32,
}

/// Full description of one color-pipeline execution
#[derive(Debug, Clone)]
pub struct ColorPipelineDesc {
    pub source: SourceDesc,
    pub tone: Option<ToneParams>,
    pub adjustments: Adjustments,
    pub upscale: ScalingAlgorithm,
    pub downscale: ScalingAlgorithm,
    pub deband: Option<DebandParams>,
    pub dither: Option<DitherParams>,
    /// Frame counter for temporal dither patterns
    pub frame_idx: u64,
}

/// The GPU contract the processing stage requires.
pub trait GpuContext: Send {
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId>;
    fn destroy_texture(&mut self, id: TextureId);
    fn texture_desc(&self, id: TextureId) -> Option<TextureDesc>;

    /// Host-to-device copy with an explicit row pitch
    fn upload(&mut self, id: TextureId, data: &[u8], row_pitch: usize) -> Result<()>;

    /// Device-to-host copy; returns tightly packed rows
    fn download(&self, id: TextureId) -> Result<Vec<u8>>;

    /// Execute a color-pipeline description from `src` into `dst`
    fn run_color_pipeline(
        &mut self,
        desc: &ColorPipelineDesc,
        src: TextureId,
        dst: TextureId,
    ) -> Result<()>;

    /// Filtered copy between two textures, rescaling to the target size
    fn blit(&mut self, src: TextureId, dst: TextureId, filter: KernelFamily) -> Result<()>;
}

/// Working image: gamma-or-transfer-encoded RGBA, one f32 per channel.
#[derive(Debug, Clone)]
pub struct RgbaImage {
    pub width: u32,
    pub height: u32,
    pixels: Vec<[f32; 4]>,
}

impl RgbaImage {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![[0.0, 0.0, 0.0, 1.0]; width as usize * height as usize],
        }
    }

    pub fn get(&self, x: u32, y: u32) -> [f32; 4] {
        let x = x.min(self.width.saturating_sub(1));
        let y = y.min(self.height.saturating_sub(1));
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    pub fn put(&mut self, x: u32, y: u32, rgba: [f32; 4]) {
        if x < self.width && y < self.height {
            self.pixels[y as usize * self.width as usize + x as usize] = rgba;
        }
    }

    pub fn pixels_mut(&mut self) -> &mut [[f32; 4]] {
        &mut self.pixels
    }

    pub fn pixels(&self) -> &[[f32; 4]] {
        &self.pixels
    }

    /// Decode a frame using a matrix inferred from its HDR metadata
    pub fn decode(frame: &Frame) -> Result<Self> {
        let matrix = if frame.hdr.is_hdr() {
            YuvMatrix::Bt2020
        } else {
            YuvMatrix::Bt709
        };
        Self::decode_raw(
            &frame.data,
            frame.width,
            frame.height,
            frame.stride,
            frame.format,
            matrix,
        )
    }

    /// Decode raw pixel bytes into normalized channel values. YUV sources are
    /// converted through the given matrix with linear chroma reconstruction;
    /// the channel values keep the source transfer encoding.
    pub fn decode_raw(
        data: &[u8],
        width: u32,
        height: u32,
        stride: u32,
        format: PixelFormat,
        matrix: YuvMatrix,
    ) -> Result<Self> {
        let needed = format.frame_size(width, height);
        if data.len() < needed {
            return Err(Error::InvalidData(format!(
                "frame buffer too small: {} < {needed}",
                data.len()
            )));
        }

        let mut image = Self::new(width, height);
        let stride = stride as usize;
        let read_u16 =
            |idx: usize| -> u16 { u16::from_le_bytes([data[idx], data[idx + 1]]) };

        match format {
            PixelFormat::Rgb8 => {
                for y in 0..height {
                    for x in 0..width {
                        let idx = y as usize * stride + x as usize * 3;
                        image.put(
                            x,
                            y,
                            [
                                data[idx] as f32 / 255.0,
                                data[idx + 1] as f32 / 255.0,
                                data[idx + 2] as f32 / 255.0,
                                1.0,
                            ],
                        );
                    }
                }
            }
            PixelFormat::Rgba8 => {
                for y in 0..height {
                    for x in 0..width {
                        let idx = y as usize * stride + x as usize * 4;
                        image.put(
                            x,
                            y,
                            [
                                data[idx] as f32 / 255.0,
                                data[idx + 1] as f32 / 255.0,
                                data[idx + 2] as f32 / 255.0,
                                data[idx + 3] as f32 / 255.0,
                            ],
                        );
                    }
                }
            }
            PixelFormat::Rgb10 => {
                for y in 0..height {
                    for x in 0..width {
                        let idx = y as usize * stride + x as usize * 6;
                        image.put(
                            x,
                            y,
                            [
                                (read_u16(idx) & 0x3FF) as f32 / 1023.0,
                                (read_u16(idx + 2) & 0x3FF) as f32 / 1023.0,
                                (read_u16(idx + 4) & 0x3FF) as f32 / 1023.0,
                                1.0,
                            ],
                        );
                    }
                }
            }
            PixelFormat::Rgb16f => {
                for y in 0..height {
                    for x in 0..width {
                        let idx = y as usize * stride + x as usize * 6;
                        image.put(
                            x,
                            y,
                            [
                                f16_to_f32(read_u16(idx)),
                                f16_to_f32(read_u16(idx + 2)),
                                f16_to_f32(read_u16(idx + 4)),
                                1.0,
                            ],
                        );
                    }
                }
            }
            PixelFormat::Yuv422_8 => {
                for y in 0..height {
                    let row = y as usize * stride;
                    for x in 0..width {
                        let pair = row + (x as usize / 2) * 4;
                        let luma = data[row + x as usize * 2 + 1] as f32 / 255.0;
                        // Chroma sites sit on even pixels; reconstruct the odd
                        // pixel by averaging neighboring sites
                        let (cb, cr) = if x % 2 == 0 || (x as usize / 2) * 4 + 8 + 2 >= stride {
                            (data[pair] as f32 / 255.0, data[pair + 2] as f32 / 255.0)
                        } else {
                            let next = pair + 4;
                            (
                                (data[pair] as f32 + data[next] as f32) / 2.0 / 255.0,
                                (data[pair + 2] as f32 + data[next + 2] as f32) / 2.0 / 255.0,
                            )
                        };
                        let rgb = tone::yuv_to_rgb(luma, cb, cr, matrix);
                        image.put(x, y, [rgb[0], rgb[1], rgb[2], 1.0]);
                    }
                }
            }
            PixelFormat::Yuv422_10 => {
                for y in 0..height {
                    let row = y as usize * stride;
                    for x in 0..width {
                        let pair = row + (x as usize / 2) * 8;
                        let luma = (read_u16(row + x as usize * 4 + 2) & 0x3FF) as f32 / 1023.0;
                        let (cb, cr) = if x % 2 == 0 || pair + 8 + 6 >= row + stride {
                            (
                                (read_u16(pair) & 0x3FF) as f32 / 1023.0,
                                (read_u16(pair + 4) & 0x3FF) as f32 / 1023.0,
                            )
                        } else {
                            let next = pair + 8;
                            (
                                ((read_u16(pair) & 0x3FF) as f32
                                    + (read_u16(next) & 0x3FF) as f32)
                                    / 2.0
                                    / 1023.0,
                                ((read_u16(pair + 4) & 0x3FF) as f32
                                    + (read_u16(next + 4) & 0x3FF) as f32)
                                    / 2.0
                                    / 1023.0,
                            )
                        };
                        let rgb = tone::yuv_to_rgb(luma, cb, cr, matrix);
                        image.put(x, y, [rgb[0], rgb[1], rgb[2], 1.0]);
                    }
                }
            }
            PixelFormat::Yuv420p10 => {
                let luma_plane = width as usize * height as usize * 2;
                let chroma_w = width as usize / 2;
                let chroma_h = height as usize / 2;
                let chroma_plane = chroma_w * chroma_h * 2;
                for y in 0..height {
                    for x in 0..width {
                        let luma = (read_u16((y as usize * width as usize + x as usize) * 2)
                            & 0x3FF) as f32
                            / 1023.0;
                        let cx = (x as usize / 2).min(chroma_w.saturating_sub(1));
                        let cy = (y as usize / 2).min(chroma_h.saturating_sub(1));
                        let cidx = (cy * chroma_w + cx) * 2;
                        let cb = (read_u16(luma_plane + cidx) & 0x3FF) as f32 / 1023.0;
                        let cr = (read_u16(luma_plane + chroma_plane + cidx) & 0x3FF) as f32
                            / 1023.0;
                        let rgb = tone::yuv_to_rgb(luma, cb, cr, matrix);
                        image.put(x, y, [rgb[0], rgb[1], rgb[2], 1.0]);
                    }
                }
            }
        }
        Ok(image)
    }

    /// Sample at normalized coordinates with the given kernel family
    pub fn sample(&self, x_norm: f32, y_norm: f32, family: KernelFamily) -> [f32; 4] {
        let px = x_norm * self.width as f32 - 0.5;
        let py = y_norm * self.height as f32 - 0.5;
        match family {
            KernelFamily::Nearest => self.get(px.round().max(0.0) as u32, py.round().max(0.0) as u32),
            KernelFamily::Bilinear => self.sample_bilinear(px, py),
            KernelFamily::Cubic(b, c) => self.sample_kernel(px, py, 2, |d| bc_spline(d, b, c)),
            KernelFamily::Lanczos(taps) => {
                let taps = taps.max(1) as i32;
                self.sample_kernel(px, py, taps, |d| lanczos(d, taps as f32))
            }
        }
    }

    fn sample_bilinear(&self, px: f32, py: f32) -> [f32; 4] {
        let x0 = px.floor();
        let y0 = py.floor();
        let fx = px - x0;
        let fy = py - y0;
        let x0 = x0.max(0.0) as u32;
        let y0 = y0.max(0.0) as u32;

        let p00 = self.get(x0, y0);
        let p10 = self.get(x0 + 1, y0);
        let p01 = self.get(x0, y0 + 1);
        let p11 = self.get(x0 + 1, y0 + 1);

        let mut out = [0.0f32; 4];
        for ch in 0..4 {
            let top = p00[ch] * (1.0 - fx) + p10[ch] * fx;
            let bottom = p01[ch] * (1.0 - fx) + p11[ch] * fx;
            out[ch] = top * (1.0 - fy) + bottom * fy;
        }
        out
    }

    fn sample_kernel(&self, px: f32, py: f32, taps: i32, weight: impl Fn(f32) -> f32) -> [f32; 4] {
        let x0 = px.floor() as i32;
        let y0 = py.floor() as i32;
        let mut acc = [0.0f32; 4];
        let mut total = 0.0f32;

        for dy in (1 - taps)..=taps {
            let sy = y0 + dy;
            let wy = weight(py - sy as f32);
            if wy == 0.0 {
                continue;
            }
            for dx in (1 - taps)..=taps {
                let sx = x0 + dx;
                let wx = weight(px - sx as f32);
                if wx == 0.0 {
                    continue;
                }
                let w = wx * wy;
                let p = self.get(sx.max(0) as u32, sy.max(0) as u32);
                for ch in 0..4 {
                    acc[ch] += p[ch] * w;
                }
                total += w;
            }
        }
        if total.abs() < 1e-8 {
            return self.get(px.max(0.0) as u32, py.max(0.0) as u32);
        }
        let mut out = [0.0f32; 4];
        for ch in 0..4 {
            out[ch] = (acc[ch] / total).clamp(0.0, 1.0);
        }
        out
    }

    /// Resize with the given kernel family
    pub fn resize(&self, out_w: u32, out_h: u32, family: KernelFamily) -> RgbaImage {
        if out_w == self.width && out_h == self.height {
            return self.clone();
        }
        let mut out = RgbaImage::new(out_w, out_h);
        for y in 0..out_h {
            let sy = (y as f32 + 0.5) / out_h as f32;
            for x in 0..out_w {
                let sx = (x as f32 + 0.5) / out_w as f32;
                out.put(x, y, self.sample(sx, sy, family));
            }
        }
        out
    }

    /// Encode to a tightly packed frame buffer
    pub fn encode(&self, format: PixelFormat) -> Result<Frame> {
        self.encode_dithered(format, None, 0)
    }

    pub fn encode_dithered(
        &self,
        format: PixelFormat,
        dither: Option<&DitherParams>,
        frame_idx: u64,
    ) -> Result<Frame> {
        let mut frame = Frame::new(self.width, self.height, format);
        let stride = frame.stride as usize;

        match format {
            PixelFormat::Rgb8 | PixelFormat::Rgba8 => {
                let channels = if format == PixelFormat::Rgb8 { 3 } else { 4 };
                if let Some(dither) = dither {
                    if dither.method == DitherMethod::ErrorDiffusion {
                        return self.encode_error_diffusion(frame, channels, dither.strength);
                    }
                }
                for y in 0..self.height {
                    for x in 0..self.width {
                        let rgba = self.get(x, y);
                        let offset = dither
                            .map(|d| tone::dither_offset(d.method, x, y, frame_idx, d.strength))
                            .unwrap_or(0.0);
                        let idx = y as usize * stride + x as usize * channels;
                        for ch in 0..channels {
                            let value = (rgba[ch] * 255.0 + offset).round().clamp(0.0, 255.0);
                            frame.data[idx + ch] = value as u8;
                        }
                    }
                }
            }
            PixelFormat::Rgb10 => {
                for y in 0..self.height {
                    for x in 0..self.width {
                        let rgba = self.get(x, y);
                        let idx = y as usize * stride + x as usize * 6;
                        for ch in 0..3 {
                            let value = (rgba[ch] * 1023.0).round().clamp(0.0, 1023.0) as u16;
                            frame.data[idx + ch * 2..idx + ch * 2 + 2]
                                .copy_from_slice(&value.to_le_bytes());
                        }
                    }
                }
            }
            PixelFormat::Rgb16f => {
                for y in 0..self.height {
                    for x in 0..self.width {
                        let rgba = self.get(x, y);
                        let idx = y as usize * stride + x as usize * 6;
                        for ch in 0..3 {
                            let bits = f32_to_f16(rgba[ch]);
                            frame.data[idx + ch * 2..idx + ch * 2 + 2]
                                .copy_from_slice(&bits.to_le_bytes());
                        }
                    }
                }
            }
            _ => {
                return Err(Error::ProcessingFailed(format!(
                    "cannot encode to {format:?}"
                )))
            }
        }
        Ok(frame)
    }

    fn encode_error_diffusion(
        &self,
        mut frame: Frame,
        channels: usize,
        strength: f32,
    ) -> Result<Frame> {
        let stride = frame.stride as usize;
        let width = self.width as usize;
        // Floyd-Steinberg error rows per channel
        let mut current = vec![0.0f32; width * channels];
        let mut next = vec![0.0f32; width * channels];

        for y in 0..self.height {
            next.iter_mut().for_each(|e| *e = 0.0);
            for x in 0..self.width {
                let rgba = self.get(x, y);
                let idx = y as usize * stride + x as usize * channels;
                for ch in 0..channels {
                    let target = rgba[ch] * 255.0 + current[x as usize * channels + ch] * strength;
                    let value = target.round().clamp(0.0, 255.0);
                    frame.data[idx + ch] = value as u8;
                    let error = target - value;

                    let xi = x as usize;
                    if xi + 1 < width {
                        current[(xi + 1) * channels + ch] += error * 7.0 / 16.0;
                        next[(xi + 1) * channels + ch] += error * 1.0 / 16.0;
                    }
                    if xi > 0 {
                        next[(xi - 1) * channels + ch] += error * 3.0 / 16.0;
                    }
                    next[xi * channels + ch] += error * 5.0 / 16.0;
                }
            }
            std::mem::swap(&mut current, &mut next);
        }
        Ok(frame)
    }
}

/// Mitchell-Netravali BC-spline kernel
fn bc_spline(x: f32, b: f32, c: f32) -> f32 {
    let ax = x.abs();
    if ax < 1.0 {
        ((12.0 - 9.0 * b - 6.0 * c) * ax * ax * ax
            + (-18.0 + 12.0 * b + 6.0 * c) * ax * ax
            + (6.0 - 2.0 * b))
            / 6.0
    } else if ax < 2.0 {
        ((-b - 6.0 * c) * ax * ax * ax
            + (6.0 * b + 30.0 * c) * ax * ax
            + (-12.0 * b - 48.0 * c) * ax
            + (8.0 * b + 24.0 * c))
            / 6.0
    } else {
        0.0
    }
}

fn lanczos(x: f32, taps: f32) -> f32 {
    let ax = x.abs();
    if ax < 1e-6 {
        return 1.0;
    }
    if ax >= taps {
        return 0.0;
    }
    let pi_x = std::f32::consts::PI * x;
    let sinc = pi_x.sin() / pi_x;
    let window = (pi_x / taps).sin() / (pi_x / taps);
    sinc * window
}

struct SoftTexture {
    desc: TextureDesc,
    data: Vec<u8>,
}

/// CPU executor of the GPU contract. Neural and EWA scalers are approximated
/// by their nearest separable kernel; a hardware backend runs the exact
/// algorithm the enumeration names.
pub struct SoftwareGpu {
    textures: HashMap<TextureId, SoftTexture>,
    next_id: u64,
}

impl SoftwareGpu {
    pub fn new() -> Self {
        Self {
            textures: HashMap::new(),
            next_id: 1,
        }
    }

    fn texture(&self, id: TextureId) -> Result<&SoftTexture> {
        self.textures
            .get(&id)
            .ok_or_else(|| Error::ProcessingFailed(format!("unknown texture {id:?}")))
    }

    fn decode_texture(&self, id: TextureId, matrix: YuvMatrix) -> Result<RgbaImage> {
        let tex = self.texture(id)?;
        RgbaImage::decode_raw(
            &tex.data,
            tex.desc.width,
            tex.desc.height,
            tex.desc.format.row_stride(tex.desc.width),
            tex.desc.format,
            matrix,
        )
    }
}

impl Default for SoftwareGpu {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuContext for SoftwareGpu {
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId> {
        if desc.width == 0 || desc.height == 0 {
            return Err(Error::InvalidParameter("zero-sized texture".into()));
        }
        let id = TextureId(self.next_id);
        self.next_id += 1;
        self.textures.insert(
            id,
            SoftTexture {
                desc: *desc,
                data: vec![0u8; desc.format.frame_size(desc.width, desc.height)],
            },
        );
        Ok(id)
    }

    fn destroy_texture(&mut self, id: TextureId) {
        self.textures.remove(&id);
    }

    fn texture_desc(&self, id: TextureId) -> Option<TextureDesc> {
        self.textures.get(&id).map(|tex| tex.desc)
    }

    fn upload(&mut self, id: TextureId, data: &[u8], row_pitch: usize) -> Result<()> {
        let tex = self
            .textures
            .get_mut(&id)
            .ok_or_else(|| Error::ProcessingFailed(format!("unknown texture {id:?}")))?;
        let tight = tex.desc.format.row_stride(tex.desc.width) as usize;
        if row_pitch == tight || row_pitch == 0 {
            let len = tex.data.len().min(data.len());
            tex.data[..len].copy_from_slice(&data[..len]);
        } else {
            // Repack from the source pitch, plane-unaware: planar uploads
            // must use the tight pitch
            let rows = tex.desc.height as usize;
            for row in 0..rows {
                let src = row * row_pitch;
                let dst = row * tight;
                if src + tight > data.len() || dst + tight > tex.data.len() {
                    break;
                }
                tex.data[dst..dst + tight].copy_from_slice(&data[src..src + tight]);
            }
        }
        Ok(())
    }

    fn download(&self, id: TextureId) -> Result<Vec<u8>> {
        Ok(self.texture(id)?.data.clone())
    }

    fn run_color_pipeline(
        &mut self,
        desc: &ColorPipelineDesc,
        src: TextureId,
        dst: TextureId,
    ) -> Result<()> {
        let dst_desc = self
            .texture_desc(dst)
            .ok_or_else(|| Error::ProcessingFailed("unknown destination texture".into()))?;

        let mut image = self.decode_texture(src, desc.source.matrix)?;

        // Tone curve: HDR signal values decode to nits, map, re-encode to
        // output gamma. SDR sources skip the curve entirely.
        if let Some(tone_params) = &desc.tone {
            let target = tone_params.curve.target_nits.max(1.0);
            for pixel in image.pixels_mut() {
                for ch in 0..3 {
                    let nits = match desc.source.transfer {
                        Transfer::Pq => tone::pq_to_linear(pixel[ch]),
                        Transfer::Hlg => {
                            tone::hlg_to_linear(pixel[ch]) * desc.source.peak_nits
                        }
                        Transfer::Gamma22 => {
                            pixel[ch].max(0.0).powf(2.2) * desc.source.peak_nits
                        }
                    };
                    let mapped = tone::tone_map(nits, &tone_params.curve, tone_params.lut.as_ref());
                    pixel[ch] = (mapped / target).clamp(0.0, 1.0).powf(1.0 / 2.2);
                }
            }
        }

        if !desc.adjustments.is_identity() {
            for pixel in image.pixels_mut() {
                let rgb = desc.adjustments.apply([pixel[0], pixel[1], pixel[2]]);
                pixel[0] = rgb[0];
                pixel[1] = rgb[1];
                pixel[2] = rgb[2];
            }
        }

        if image.width != dst_desc.width || image.height != dst_desc.height {
            let upscaling =
                dst_desc.width > image.width || dst_desc.height > image.height;
            let family = if upscaling {
                desc.upscale.kernel_family()
            } else {
                desc.downscale.kernel_family()
            };
            image = image.resize(dst_desc.width, dst_desc.height, family);
        }

        if let Some(deband) = &desc.deband {
            apply_deband(&mut image, deband, desc.frame_idx);
        }

        let encoded =
            image.encode_dithered(dst_desc.format, desc.dither.as_ref(), desc.frame_idx)?;
        let tex = self
            .textures
            .get_mut(&dst)
            .ok_or_else(|| Error::ProcessingFailed("unknown destination texture".into()))?;
        tex.data = encoded.data;
        Ok(())
    }

    fn blit(&mut self, src: TextureId, dst: TextureId, filter: KernelFamily) -> Result<()> {
        let dst_desc = self
            .texture_desc(dst)
            .ok_or_else(|| Error::ProcessingFailed("unknown destination texture".into()))?;
        let image = self.decode_texture(src, YuvMatrix::Bt709)?;
        let resized = image.resize(dst_desc.width, dst_desc.height, filter);
        let encoded = resized.encode(dst_desc.format)?;
        self.textures
            .get_mut(&dst)
            .ok_or_else(|| Error::ProcessingFailed("unknown destination texture".into()))?
            .data = encoded.data;
        Ok(())
    }
}

/// Threshold-gated neighborhood average with optional grain, repeated per
/// iteration with a shrinking radius.
fn apply_deband(image: &mut RgbaImage, params: &DebandParams, frame_idx: u64) {
    let threshold = params.threshold / 255.0;
    for iteration in 0..params.iterations.max(1) {
        let radius = (params.radius >> iteration).max(1) as i32;
        let source = image.clone();
        let width = image.width;
        let height = image.height;
        for y in 0..height {
            for x in 0..width {
                let center = source.get(x, y);
                let mut avg = [0.0f32; 4];
                let offsets = [(radius, 0), (-radius, 0), (0, radius), (0, -radius)];
                for (dx, dy) in offsets {
                    let sx = (x as i32 + dx).clamp(0, width as i32 - 1) as u32;
                    let sy = (y as i32 + dy).clamp(0, height as i32 - 1) as u32;
                    let p = source.get(sx, sy);
                    for ch in 0..4 {
                        avg[ch] += p[ch] / 4.0;
                    }
                }
                let mut max_diff = 0.0f32;
                for ch in 0..3 {
                    max_diff = max_diff.max((avg[ch] - center[ch]).abs());
                }
                if max_diff < threshold {
                    image.put(x, y, [avg[0], avg[1], avg[2], center[3]]);
                }
            }
        }
    }
    if params.grain > 0.0 {
        let amplitude = params.grain / 255.0 / 2.0;
        let width = image.width;
        for (idx, pixel) in image.pixels_mut().iter_mut().enumerate() {
            let x = (idx as u32) % width;
            let y = (idx as u32) / width;
            let noise =
                tone::dither_offset(DitherMethod::WhiteNoise, x, y, frame_idx, 2.0) * amplitude;
            for ch in 0..3 {
                pixel[ch] = (pixel[ch] + noise).clamp(0.0, 1.0);
            }
        }
    }
}
