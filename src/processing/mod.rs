//! Frame processing
//!
//! Composes the per-frame transformation chain: black-bar crop, optional
//! non-linear stretch, tone map / color convert / chroma upsample / deband /
//! dither on the GPU boundary, and finally the OSD composite. Each stage
//! falls back to identity; per-frame failures discard the frame.

pub mod detect;
pub mod gpu;
pub mod nls;
pub mod scene;
pub mod tone;

pub use detect::BlackBarDetector;
pub use gpu::{GpuContext, SoftwareGpu};
pub use nls::NlsStretch;
pub use scene::SceneAnalyzer;

use crate::clock::Clock;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::types::{CropRegion, Frame, HdrMetadata, PixelFormat};

use gpu::{
    ColorPipelineDesc, DebandParams, DitherParams, SourceDesc, TextureDesc, TextureId,
    TextureUsage, ToneParams, Transfer,
};
use std::sync::Arc;
use tone::{Adjustments, CurveParams, ToneLut, YuvMatrix};

#[derive(Debug, Clone, Copy, Default)]
pub struct ToneMappingStats {
    /// Frames that went through a tone curve
    pub frames_processed: u64,
    /// SDR frames that skipped curve execution
    pub frames_skipped_sdr: u64,
    pub last_source_nits: f32,
    pub last_knee_point: f32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessingStats {
    pub frames_processed: u64,
    pub frames_failed: u64,
    pub input_width: u32,
    pub input_height: u32,
    pub after_crop_width: u32,
    pub after_crop_height: u32,
    pub after_nls_width: u32,
    pub after_nls_height: u32,
    pub output_width: u32,
    pub output_height: u32,
    pub last_frame_time_ms: f64,
    pub avg_frame_time_ms: f64,
    pub tone_mapping: ToneMappingStats,
}

struct StageTextures {
    input: TextureId,
    input_desc: TextureDesc,
    output: TextureId,
    output_desc: TextureDesc,
}

/// The GPU processing stage: crop → warp → tone map → OSD composite.
pub struct ProcessingStage {
    gpu: Box<dyn GpuContext>,
    clock: Arc<dyn Clock>,
    detector: BlackBarDetector,
    analyzer: SceneAnalyzer,
    stretch: NlsStretch,
    textures: Option<StageTextures>,
    lut: Option<ToneLut>,
    frame_idx: u64,
    stats: ProcessingStats,
}

impl ProcessingStage {
    pub fn new(gpu: Box<dyn GpuContext>, config: &Config, clock: Arc<dyn Clock>) -> Self {
        let lut = config
            .tone_mapping
            .lut_path
            .as_deref()
            .and_then(|path| match ToneLut::load(path) {
                Ok(lut) => Some(lut),
                Err(err) => {
                    tracing::warn!("failed to load tone LUT {}: {err}", path.display());
                    None
                }
            });
        Self {
            gpu,
            clock,
            detector: BlackBarDetector::new(),
            analyzer: SceneAnalyzer::new(config.tone_mapping.dynamic.clone()),
            stretch: NlsStretch::new(),
            textures: None,
            lut,
            frame_idx: 0,
            stats: ProcessingStats::default(),
        }
    }

    pub fn stats(&self) -> ProcessingStats {
        self.stats
    }

    pub fn detector(&self) -> &BlackBarDetector {
        &self.detector
    }

    pub fn reset_detector(&mut self) {
        self.detector.reset();
        self.analyzer.reset();
    }

    /// Run the full chain on one frame. Returns the output frame at the
    /// configured output resolution.
    pub fn process_frame(&mut self, frame: Frame, config: &Config) -> Result<Frame> {
        let start_ns = self.clock.now_ns();
        self.frame_idx += 1;
        self.stats.input_width = frame.width;
        self.stats.input_height = frame.height;

        let result = self.run_chain(frame, config);
        match &result {
            Ok(output) => {
                self.stats.output_width = output.width;
                self.stats.output_height = output.height;
                self.stats.frames_processed += 1;
                let elapsed_ms = self.clock.elapsed_ns(start_ns) as f64 / 1e6;
                self.stats.last_frame_time_ms = elapsed_ms;
                let n = self.stats.frames_processed as f64;
                self.stats.avg_frame_time_ms =
                    (self.stats.avg_frame_time_ms * (n - 1.0) + elapsed_ms) / n;
            }
            Err(_) => {
                self.stats.frames_failed += 1;
            }
        }
        result
    }

    fn run_chain(&mut self, frame: Frame, config: &Config) -> Result<Frame> {
        // Stage 1: black-bar analysis
        if config.black_bars.enabled {
            self.detector
                .analyze_frame(&frame, &config.black_bars, self.clock.as_ref());
        }

        // Stage 2: crop
        let frame = if config.black_bars.enabled && config.black_bars.auto_crop {
            let crop = self.detector.crop_region();
            if !crop.is_zero() && crop.fits(frame.width, frame.height) {
                let cropped = crop_frame(&frame, &crop)?;
                self.stats.after_crop_width = cropped.width;
                self.stats.after_crop_height = cropped.height;
                cropped
            } else {
                self.stats.after_crop_width = frame.width;
                self.stats.after_crop_height = frame.height;
                frame
            }
        } else {
            self.stats.after_crop_width = frame.width;
            self.stats.after_crop_height = frame.height;
            frame
        };

        // Stage 3: non-linear stretch
        let frame = if config.nls.enabled {
            let warped = self.stretch.apply(&frame, &config.nls)?;
            self.stats.after_nls_width = warped.width;
            self.stats.after_nls_height = warped.height;
            warped
        } else {
            self.stats.after_nls_width = frame.width;
            self.stats.after_nls_height = frame.height;
            frame
        };

        // Stage 4: scene analysis feeding the tone curve
        let dynamic = if config.tone_mapping.dynamic.enabled && frame.hdr.is_hdr() {
            self.analyzer.analyze_frame(&frame);
            Some(self.analyzer.params())
        } else {
            None
        };

        // Stage 5: tone map / color convert / scale on the GPU boundary
        self.color_stage(frame, config, dynamic)
    }

    fn color_stage(
        &mut self,
        frame: Frame,
        config: &Config,
        dynamic: Option<scene::DynamicParams>,
    ) -> Result<Frame> {
        let out_w = config.display.width;
        let out_h = config.display.height;
        let is_hdr = frame.hdr.is_hdr();

        // Dither masks quantization introduced by processing; an 8-bit SDR
        // source quantized to 8 bits has none.
        let dither_active =
            config.dithering.enabled && (is_hdr || frame.format.bit_depth() > 8);

        // SDR identity fast path: nothing to do, forward by ownership
        if !is_hdr
            && frame.format == PixelFormat::Rgb8
            && frame.width == out_w
            && frame.height == out_h
            && config.tone_mapping.adjustments_are_identity()
            && !config.debanding.enabled
            && !dither_active
        {
            self.stats.tone_mapping.frames_skipped_sdr += 1;
            return Ok(frame);
        }

        let desc = self.pipeline_desc(&frame, config, dynamic, dither_active);
        self.ensure_textures(frame.width, frame.height, frame.format, out_w, out_h)?;
        let textures = self.textures.as_ref().expect("textures ensured");
        let (input, output, output_desc) =
            (textures.input, textures.output, textures.output_desc);

        self.gpu.upload(input, &frame.data, frame.stride as usize)?;
        self.gpu.run_color_pipeline(&desc, input, output)?;
        let data = self.gpu.download(output)?;

        if desc.tone.is_some() {
            self.stats.tone_mapping.frames_processed += 1;
        } else {
            self.stats.tone_mapping.frames_skipped_sdr += 1;
        }

        let mut output_frame = Frame::from_data(
            data,
            output_desc.width,
            output_desc.height,
            output_desc.format.row_stride(output_desc.width),
            output_desc.format,
        );
        output_frame.pts_ns = frame.pts_ns;
        output_frame.interlaced = frame.interlaced;
        // Output is SDR after tone mapping
        output_frame.hdr = HdrMetadata::None;
        Ok(output_frame)
    }

    fn pipeline_desc(
        &mut self,
        frame: &Frame,
        config: &Config,
        dynamic: Option<scene::DynamicParams>,
        dither_active: bool,
    ) -> ColorPipelineDesc {
        let is_hdr = frame.hdr.is_hdr();
        let transfer = match frame.hdr {
            HdrMetadata::Hdr10(_) | HdrMetadata::DolbyVision => Transfer::Pq,
            HdrMetadata::Hlg => Transfer::Hlg,
            HdrMetadata::None => Transfer::Gamma22,
        };
        let matrix = if is_hdr { YuvMatrix::Bt2020 } else { YuvMatrix::Bt709 };

        let mut source_nits = if config.tone_mapping.use_metadata {
            frame.hdr.peak_nits().unwrap_or(config.tone_mapping.source_nits)
        } else {
            config.tone_mapping.source_nits
        };
        let mut knee_point = config.tone_mapping.knee_point;
        if let Some(params) = dynamic {
            source_nits = params.source_nits;
            knee_point = params.knee_point;
        }
        self.stats.tone_mapping.last_source_nits = source_nits;
        self.stats.tone_mapping.last_knee_point = knee_point;

        let tone = is_hdr.then(|| ToneParams {
            curve: CurveParams {
                algorithm: config.tone_mapping.algorithm,
                source_nits,
                target_nits: config.tone_mapping.target_nits,
                knee_point,
            },
            lut: self.lut.clone(),
        });

        ColorPipelineDesc {
            source: SourceDesc {
                format: frame.format,
                matrix,
                transfer,
                peak_nits: if is_hdr { source_nits } else { 100.0 },
            },
            tone,
            adjustments: Adjustments {
                contrast: config.tone_mapping.contrast,
                saturation: config.tone_mapping.saturation,
                brightness: config.tone_mapping.brightness,
                gamma: config.tone_mapping.gamma,
                shadow_lift: config.tone_mapping.shadow_lift,
                highlight_compression: config.tone_mapping.highlight_compression,
            },
            upscale: config.chroma.image_upscale,
            downscale: config.chroma.image_downscale,
            deband: config.debanding.enabled.then(|| DebandParams {
                iterations: config.debanding.iterations,
                threshold: config.debanding.threshold,
                radius: config.debanding.radius,
                grain: config.debanding.grain,
            }),
            dither: dither_active.then(|| DitherParams {
                method: config.dithering.method,
                strength: config.dithering.strength,
            }),
            frame_idx: self.frame_idx,
        }
    }

    /// Textures are created lazily on the first frame of a given
    /// (width, height, format) and rebuilt when dimensions change.
    fn ensure_textures(
        &mut self,
        in_w: u32,
        in_h: u32,
        format: PixelFormat,
        out_w: u32,
        out_h: u32,
    ) -> Result<()> {
        let input_desc = TextureDesc {
            width: in_w,
            height: in_h,
            format,
            usage: TextureUsage::Sampled,
        };
        let output_desc = TextureDesc {
            width: out_w,
            height: out_h,
            format: PixelFormat::Rgb8,
            usage: TextureUsage::RenderTarget,
        };

        let rebuild = match &self.textures {
            Some(existing) => {
                existing.input_desc != input_desc || existing.output_desc != output_desc
            }
            None => true,
        };
        if rebuild {
            if let Some(old) = self.textures.take() {
                self.gpu.destroy_texture(old.input);
                self.gpu.destroy_texture(old.output);
            }
            let input = self.gpu.create_texture(&input_desc)?;
            let output = self.gpu.create_texture(&output_desc)?;
            self.textures = Some(StageTextures {
                input,
                input_desc,
                output,
                output_desc,
            });
            tracing::debug!(
                "stage textures rebuilt: {}x{} {:?} -> {}x{}",
                in_w,
                in_h,
                format,
                out_w,
                out_h
            );
        }
        Ok(())
    }
}

/// Copy the crop interior into a new frame of the reduced size. PTS and HDR
/// metadata are preserved. Chroma-subsampled formats keep even alignment.
pub fn crop_frame(frame: &Frame, crop: &CropRegion) -> Result<Frame> {
    if !crop.fits(frame.width, frame.height) {
        return Err(Error::InvalidParameter(format!(
            "crop {crop:?} exceeds {}x{}",
            frame.width, frame.height
        )));
    }

    let (mut top, mut left) = (crop.top, crop.left);
    let (mut new_w, mut new_h) = (
        frame.width - crop.left - crop.right,
        frame.height - crop.top - crop.bottom,
    );
    if frame.format.chroma_subsampled() {
        left &= !1;
        new_w &= !1;
        if frame.format == PixelFormat::Yuv420p10 {
            top &= !1;
            new_h &= !1;
        }
    }
    if new_w == 0 || new_h == 0 {
        return Err(Error::InvalidParameter("crop leaves no content".into()));
    }

    let mut output = Frame::new(new_w, new_h, frame.format);
    match frame.format {
        PixelFormat::Yuv420p10 => {
            let src_w = frame.width as usize;
            let dst_w = new_w as usize;
            // Luma plane
            for row in 0..new_h as usize {
                let src = ((top as usize + row) * src_w + left as usize) * 2;
                let dst = row * dst_w * 2;
                output.data[dst..dst + dst_w * 2]
                    .copy_from_slice(&frame.data[src..src + dst_w * 2]);
            }
            // Chroma planes
            let src_luma = src_w * frame.height as usize * 2;
            let dst_luma = dst_w * new_h as usize * 2;
            let src_cw = src_w / 2;
            let dst_cw = dst_w / 2;
            let src_ch = frame.height as usize / 2;
            let dst_ch = new_h as usize / 2;
            for plane in 0..2 {
                let src_base = src_luma + plane * src_cw * src_ch * 2;
                let dst_base = dst_luma + plane * dst_cw * dst_ch * 2;
                for row in 0..dst_ch {
                    let src =
                        src_base + ((top as usize / 2 + row) * src_cw + left as usize / 2) * 2;
                    let dst = dst_base + row * dst_cw * 2;
                    output.data[dst..dst + dst_cw * 2]
                        .copy_from_slice(&frame.data[src..src + dst_cw * 2]);
                }
            }
        }
        _ => {
            let bytes_per_px = frame.format.bytes_per_pixel() as usize;
            let row_bytes = dst_row_bytes(frame.format, new_w);
            let x_offset = left as usize * bytes_per_px;
            for row in 0..new_h as usize {
                let src = (top as usize + row) * frame.stride as usize + x_offset;
                let dst = row * output.stride as usize;
                output.data[dst..dst + row_bytes]
                    .copy_from_slice(&frame.data[src..src + row_bytes]);
            }
        }
    }

    output.pts_ns = frame.pts_ns;
    output.hdr = frame.hdr;
    output.interlaced = frame.interlaced;
    Ok(output)
}

fn dst_row_bytes(format: PixelFormat, width: u32) -> usize {
    format.row_stride(width) as usize
}

/// SRC_OVER composite of a full-size RGBA8 OSD surface onto the output
/// frame, with a global opacity multiplier.
pub fn composite_osd(frame: &mut Frame, surface: &[u8], opacity: f32) -> Result<()> {
    let channels = match frame.format {
        PixelFormat::Rgb8 => 3,
        PixelFormat::Rgba8 => 4,
        other => {
            return Err(Error::ProcessingFailed(format!(
                "OSD composite onto {other:?} unsupported"
            )))
        }
    };
    let expected = frame.width as usize * frame.height as usize * 4;
    if surface.len() < expected {
        return Err(Error::InvalidParameter(format!(
            "OSD surface {} bytes, expected {expected}",
            surface.len()
        )));
    }

    let opacity = opacity.clamp(0.0, 1.0);
    let stride = frame.stride as usize;
    for y in 0..frame.height as usize {
        for x in 0..frame.width as usize {
            let src = (y * frame.width as usize + x) * 4;
            let alpha = surface[src + 3] as f32 / 255.0 * opacity;
            if alpha <= 0.0 {
                continue;
            }
            let dst = y * stride + x * channels;
            for ch in 0..3 {
                let over = surface[src + ch] as f32;
                let under = frame.data[dst + ch] as f32;
                frame.data[dst + ch] = (over * alpha + under * (1.0 - alpha)).round() as u8;
            }
        }
    }
    Ok(())
}
