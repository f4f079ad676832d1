//! The still-PNG encoder and the row loop every frame goes through.

use alloc::vec::Vec;

use crate::chunk::write_chunk;
use crate::filtering::{choose_filter_row, Predictor};
use crate::headers::write_headers;
use crate::image_data::{deflate_bound, Deflater, ImageDataSink, IOBUF_SIZE};
use crate::interlace::{extract_pass_row, pass_row_size, row_in_pass, NB_PASSES};
use crate::raster::{PixelFormat, Raster};
use crate::{EncodeError, EncodeResult};

/// Room budgeted for the signature and every non-image-data chunk.
const HEADERS_MIN_SIZE: usize = 16384;

/// Everything configurable about an encoder, picked once at creation.
#[derive(Debug, Clone, Copy)]
pub struct EncoderConfig {
  /// Scanline predictor selection. Forced to [`Predictor::None`] for
  /// [`PixelFormat::Y1`], where byte predictors only add entropy.
  pub predictor: Predictor,
  /// Physical density in dots per inch. Mutually exclusive with `dpm`.
  pub dpi: Option<u32>,
  /// Physical density in dots per meter. Mutually exclusive with `dpi`.
  pub dpm: Option<u32>,
  /// Store the image with Adam7 interlacing.
  pub interlaced: bool,
  /// DEFLATE effort, 0 (store) through 10; 6 is the usual default.
  pub compression_level: u8,
}
impl Default for EncoderConfig {
  #[inline]
  fn default() -> Self {
    Self { predictor: Predictor::None, dpi: None, dpm: None, interlaced: false, compression_level: 6 }
  }
}

/// Encodes rasters of one agreed size and format into complete PNG files.
///
/// The DEFLATE dictionary and scratch space live for the whole encoder and
/// are recycled between frames, so one instance can cheaply encode many
/// stills of the same shape.
pub struct PngEncoder {
  pub(crate) predictor: Predictor,
  pub(crate) dpm: u32,
  pub(crate) interlaced: bool,
  pub(crate) width: u32,
  pub(crate) height: u32,
  pub(crate) format: PixelFormat,
  pub(crate) deflater: Deflater,
}

impl PngEncoder {
  /// Validates the configuration and acquires the compressor.
  pub fn new(
    config: &EncoderConfig, width: u32, height: u32, format: PixelFormat,
  ) -> EncodeResult<Self> {
    if width == 0 || height == 0 {
      return Err(EncodeError::InvalidConfig);
    }
    let dpm = match (config.dpi, config.dpm) {
      (Some(_), Some(_)) => return Err(EncodeError::InvalidConfig),
      (Some(dpi), None) if dpi <= 0x10000 => dpi * 10000 / 254,
      (None, Some(dpm)) if dpm <= 0x10000 => dpm,
      (None, None) => 0,
      _ => return Err(EncodeError::InvalidConfig),
    };
    let predictor = if format == PixelFormat::Y1 { Predictor::None } else { config.predictor };
    Ok(Self {
      predictor,
      dpm,
      interlaced: config.interlaced,
      width,
      height,
      format,
      deflater: Deflater::new(config.compression_level.min(10)),
    })
  }

  /// Encodes one raster into a self-contained PNG file.
  pub fn encode(&mut self, frame: &Raster<'_>) -> EncodeResult<Vec<u8>> {
    self.check_frame(frame)?;
    let mut out = Vec::new();
    out.try_reserve(self.max_packet_size(12)?).map_err(|_| EncodeError::OutOfMemory)?;
    write_headers(&mut out, self.width, self.height, self.interlaced, self.dpm, frame)?;
    {
      let mut sink = ImageDataSink::idat(&mut out);
      self.encode_image_data(&mut sink, frame)?;
    }
    write_chunk(&mut out, *b"IEND", &[]);
    Ok(out)
  }

  /// Checks an input raster against the shape agreed at creation.
  pub(crate) fn check_frame(&self, frame: &Raster<'_>) -> EncodeResult<()> {
    if frame.format != self.format {
      return Err(EncodeError::UnsupportedPixelFormat);
    }
    if frame.format == PixelFormat::I8 && frame.palette.is_none() {
      return Err(EncodeError::UnsupportedPixelFormat);
    }
    let row_bytes = frame.format.bytes_per_row(frame.width);
    if frame.width != self.width
      || frame.height != self.height
      || frame.stride < row_bytes
      || frame.data.len() < (frame.height as usize - 1) * frame.stride + row_bytes
    {
      return Err(EncodeError::InvalidConfig);
    }
    Ok(())
  }

  /// Worst-case packet size: headers plus every row at its DEFLATE bound
  /// plus chunk framing, 12 bytes per `IDAT` or 16 per `fdAT`.
  pub(crate) fn max_packet_size(&self, framing_overhead: usize) -> EncodeResult<usize> {
    let enc_row_size = deflate_bound(self.format.bytes_per_row(self.width)) as u64;
    let chunks_per_row = (enc_row_size + IOBUF_SIZE as u64 - 1) / IOBUF_SIZE as u64;
    let size = HEADERS_MIN_SIZE as u64
      + self.height as u64 * (enc_row_size + framing_overhead as u64 * chunks_per_row);
    if size > i32::MAX as u64 {
      return Err(EncodeError::OutOfMemory);
    }
    Ok(size as usize)
  }

  /// Filters and compresses one raster's rows into `sink`.
  ///
  /// The raster may be smaller than the encoder's agreed size; the APNG
  /// path feeds sub-images through here. The compressor is reset on every
  /// exit so the next frame starts a fresh zlib stream.
  pub(crate) fn encode_image_data(
    &mut self, sink: &mut ImageDataSink<'_>, frame: &Raster<'_>,
  ) -> EncodeResult<()> {
    let result = self.encode_rows(sink, frame);
    self.deflater.reset();
    result
  }

  fn encode_rows(&mut self, sink: &mut ImageDataSink<'_>, frame: &Raster<'_>) -> EncodeResult<()> {
    let bits_per_pixel = self.format.bits_per_pixel();
    let bpp = self.format.bytes_per_pixel();
    let row_size = self.format.bytes_per_row(frame.width);

    let filter_space = (row_size + 1) << ((self.predictor == Predictor::Mixed) as usize);
    let mut filter_buf = Vec::new();
    filter_buf.try_reserve_exact(filter_space).map_err(|_| EncodeError::OutOfMemory)?;
    filter_buf.resize(filter_space, 0);

    if self.interlaced {
      let mut current = Vec::new();
      let mut previous = Vec::new();
      current.try_reserve_exact(row_size).map_err(|_| EncodeError::OutOfMemory)?;
      previous.try_reserve_exact(row_size).map_err(|_| EncodeError::OutOfMemory)?;
      current.resize(row_size, 0);
      previous.resize(row_size, 0);
      for pass in 0..NB_PASSES {
        let pass_size = pass_row_size(pass, bits_per_pixel, frame.width);
        if pass_size == 0 {
          // no pixel of any row survives this pass at this width
          continue;
        }
        let mut have_top = false;
        for y in 0..frame.height {
          if !row_in_pass(y, pass) {
            continue;
          }
          core::mem::swap(&mut current, &mut previous);
          extract_pass_row(&mut current[..pass_size], pass, frame.row(y), frame.width, bits_per_pixel);
          let top = if have_top { Some(&previous[..pass_size]) } else { None };
          let line =
            choose_filter_row(self.predictor, &mut filter_buf, &current[..pass_size], top, bpp);
          self.deflater.write(sink, line)?;
          have_top = true;
        }
      }
    } else {
      let mut top: Option<&[u8]> = None;
      for y in 0..frame.height {
        let src = frame.row(y);
        let line = choose_filter_row(self.predictor, &mut filter_buf, src, top, bpp);
        self.deflater.write(sink, line)?;
        top = Some(src);
      }
    }
    self.deflater.finish(sink)
  }
}
