//! The APNG frame sequencer: canvas state, the dispose/blend search, and
//! inverse blending.
//!
//! An APNG frame's `fcTL` chunk carries the disposal applied *after* that
//! frame is shown, and the best choice depends on the frame that comes
//! next. The sequencer therefore runs one frame behind its input: each call
//! encodes the new raster under all six (dispose, blend) combinations,
//! keeps the smallest, and only then releases the previous frame's packet,
//! whose `fcTL` now carries the winning disposal. A final call with no
//! input flushes the held packet.

use alloc::vec::Vec;

use bytemuck::cast_slice;

use crate::chunk::write_chunk;
use crate::crc32::png_crc;
use crate::encoder::{EncoderConfig, PngEncoder};
use crate::headers::write_headers;
use crate::image_data::ImageDataSink;
use crate::raster::{Palette, PixelFormat, Raster};
use crate::{EncodeError, EncodeResult};

/// What a viewer does to the canvas after a frame's display time ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DisposeOp {
  /// Leave the canvas as this frame rendered it.
  #[default]
  None = 0,
  /// Clear this frame's rectangle back to fully transparent.
  Background = 1,
  /// Restore the canvas from before this frame was rendered.
  Previous = 2,
}

/// How a frame's pixels land on the canvas when displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum BlendOp {
  /// Overwrite the rectangle, alpha included.
  #[default]
  Source = 0,
  /// Alpha-composite over the rectangle.
  Over = 1,
}

/// One `fcTL` record.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FrameControl {
  pub(crate) sequence_number: u32,
  pub(crate) width: u32,
  pub(crate) height: u32,
  pub(crate) x_offset: u32,
  pub(crate) y_offset: u32,
  // the muxer fills delays in; this core always writes zero
  pub(crate) delay_num: u16,
  pub(crate) delay_den: u16,
  pub(crate) dispose_op: DisposeOp,
  pub(crate) blend_op: BlendOp,
}
impl FrameControl {
  pub(crate) fn to_payload(self) -> [u8; 26] {
    let mut out = [0_u8; 26];
    out[0..4].copy_from_slice(&self.sequence_number.to_be_bytes());
    out[4..8].copy_from_slice(&self.width.to_be_bytes());
    out[8..12].copy_from_slice(&self.height.to_be_bytes());
    out[12..16].copy_from_slice(&self.x_offset.to_be_bytes());
    out[16..20].copy_from_slice(&self.y_offset.to_be_bytes());
    out[20..22].copy_from_slice(&self.delay_num.to_be_bytes());
    out[22..24].copy_from_slice(&self.delay_den.to_be_bytes());
    out[24] = self.dispose_op as u8;
    out[25] = self.blend_op as u8;
    out
  }
}

/// An owned copy of a frame, used for the sequencer's canvases.
///
/// Rows are tightly packed: `stride == format.bytes_per_row(width)`.
struct OwnedFrame {
  height: u32,
  format: PixelFormat,
  stride: usize,
  data: Vec<u8>,
  palette: Option<Palette>,
}
impl OwnedFrame {
  fn new_zeroed(width: u32, height: u32, format: PixelFormat) -> EncodeResult<Self> {
    let stride = format.bytes_per_row(width);
    let mut data = Vec::new();
    data.try_reserve_exact(stride * height as usize).map_err(|_| EncodeError::OutOfMemory)?;
    data.resize(stride * height as usize, 0);
    Ok(Self { height, format, stride, data, palette: None })
  }

  fn copy_from_raster(&mut self, frame: &Raster<'_>) {
    for y in 0..self.height {
      let start = y as usize * self.stride;
      self.data[start..start + self.stride].copy_from_slice(frame.row(y));
    }
    self.palette = frame.palette.copied();
  }

  fn copy_from(&mut self, other: &OwnedFrame) {
    self.data.copy_from_slice(&other.data);
    self.palette = other.palette;
  }

  /// A borrowed view of the `width × height` sub-image packed at this
  /// frame's top-left corner.
  fn sub_raster<'f>(&'f self, width: u32, height: u32, palette: Option<&'f Palette>) -> Raster<'f> {
    let mut sub = Raster::new(width, height, self.format, &self.data, self.stride);
    sub.palette = palette;
    sub
  }

  /// Zeroes a pixel rectangle. For 1-bit data the rectangle is widened to
  /// whole bytes, which is where the sequencer's rectangles already sit.
  fn clear_rect(&mut self, x: u32, y: u32, width: u32, height: u32) {
    let (first, last) = if self.format == PixelFormat::Y1 {
      ((x / 8) as usize, ((x + width + 7) / 8) as usize)
    } else {
      let bpp = self.format.bytes_per_pixel();
      (x as usize * bpp, (x + width) as usize * bpp)
    };
    for row in y..y + height {
      let start = row as usize * self.stride;
      self.data[start + first..start + last].fill(0);
    }
  }
}

/// The alpha layouts OVER blending can invert.
#[derive(Clone, Copy)]
enum AlphaKind {
  Rgba8,
  Rgba16,
  Ya8,
  Ya16,
  Pal,
}
impl AlphaKind {
  fn of(format: PixelFormat) -> Option<Self> {
    match format {
      PixelFormat::RGBA8 => Some(Self::Rgba8),
      PixelFormat::RGBA16 => Some(Self::Rgba16),
      PixelFormat::YA8 => Some(Self::Ya8),
      PixelFormat::YA16 => Some(Self::Ya16),
      PixelFormat::I8 => Some(Self::Pal),
      _ => None,
    }
  }

  fn foreground_opaque(self, px: &[u8], palette: &Palette) -> bool {
    match self {
      Self::Rgba8 => px[3] == 0xFF,
      Self::Rgba16 => px[6] == 0xFF && px[7] == 0xFF,
      Self::Ya8 => px[1] == 0xFF,
      Self::Ya16 => px[2] == 0xFF && px[3] == 0xFF,
      Self::Pal => palette[px[0] as usize] >> 24 == 0xFF,
    }
  }

  fn background_transparent(self, px: &[u8], palette: &Palette) -> bool {
    match self {
      Self::Rgba8 => px[3] == 0,
      Self::Rgba16 => px[6] == 0 && px[7] == 0,
      Self::Ya8 => px[1] == 0,
      Self::Ya16 => px[2] == 0 && px[3] == 0,
      Self::Pal => palette[px[0] as usize] >> 24 == 0,
    }
  }
}

/// Rewrites `bg` into the minimal sub-image that reproduces `fg` when
/// blended onto `bg` under `fctl.blend_op`, packing it at `bg`'s top-left
/// corner. On success the bounding rectangle lands in `fctl`'s geometry
/// fields. Returns `false` when this blend mode cannot express the change,
/// which just knocks the candidate out of the search.
///
/// For 1-bit data changes are tracked per packed byte, so rectangles are
/// 8-pixel aligned; per-pixel offsets can't address packed bits.
fn inverse_blend(bg: &mut OwnedFrame, fg: &Raster<'_>, fctl: &mut FrameControl) -> bool {
  let packed = fg.format == PixelFormat::Y1;
  let row_bytes = fg.format.bytes_per_row(fg.width);
  let unit_bytes = if packed { 1 } else { fg.format.bytes_per_pixel() };
  let units_per_row = row_bytes / unit_bytes;

  // bounding box of changed units
  let mut leftmost = units_per_row;
  let mut rightmost = 0;
  let mut topmost = fg.height as usize;
  let mut bottommost = 0;
  for y in 0..fg.height {
    let frow = fg.row(y);
    let brow = &bg.data[y as usize * bg.stride..][..row_bytes];
    for u in 0..units_per_row {
      if frow[u * unit_bytes..(u + 1) * unit_bytes] == brow[u * unit_bytes..(u + 1) * unit_bytes] {
        continue;
      }
      if u < leftmost {
        leftmost = u;
      }
      if u >= rightmost {
        rightmost = u + 1;
      }
      if (y as usize) < topmost {
        topmost = y as usize;
      }
      if y as usize >= bottommost {
        bottommost = y as usize + 1;
      }
    }
  }
  if leftmost == units_per_row && rightmost == 0 {
    // no change at all; APNG forbids empty frames, so emit one pixel
    leftmost = 0;
    topmost = 0;
    rightmost = 1;
    bottommost = 1;
  }

  match fctl.blend_op {
    BlendOp::Source => {
      for y in topmost..bottommost {
        let n = (rightmost - leftmost) * unit_bytes;
        let src = y * fg.stride + leftmost * unit_bytes;
        let dst = (y - topmost) * bg.stride;
        bg.data[dst..dst + n].copy_from_slice(&fg.data[src..src + n]);
      }
    }
    BlendOp::Over => {
      let Some(kind) = AlphaKind::of(fg.format) else { return false };
      // without an alpha channel the palette must supply transparency
      let transparent_index = match (kind, fg.palette) {
        (AlphaKind::Pal, Some(palette)) => {
          palette.iter().position(|&entry| entry >> 24 == 0)
        }
        (AlphaKind::Pal, None) => return false,
        _ => None,
      };
      let blank = [0_u8; 8];
      let palette = fg.palette.unwrap_or(&[0_u32; 256]);
      let bpp = unit_bytes;
      for y in topmost..bottommost {
        for u in leftmost..rightmost {
          let mut background = [0_u8; 8];
          let bg_at = y * bg.stride + u * bpp;
          background[..bpp].copy_from_slice(&bg.data[bg_at..bg_at + bpp]);
          let foreground = &fg.data[y * fg.stride + u * bpp..][..bpp];
          let out_at = (y - topmost) * bg.stride + (u - leftmost) * bpp;
          if foreground == &background[..bpp] {
            // unchanged pixel: emit transparency so the old canvas shows
            match kind {
              AlphaKind::Pal => match transparent_index {
                Some(index) => bg.data[out_at] = index as u8,
                None => return false,
              },
              _ => bg.data[out_at..out_at + bpp].copy_from_slice(&blank[..bpp]),
            }
            continue;
          }
          // General alpha-on-alpha can't be inverted into one OVER layer,
          // and the cases that could be don't compress better than SOURCE.
          // Only a fully opaque foreground or a fully transparent
          // background passes the pixel through verbatim.
          if !kind.foreground_opaque(foreground, palette)
            && !kind.background_transparent(&background[..bpp], palette)
          {
            return false;
          }
          bg.data[out_at..out_at + bpp].copy_from_slice(foreground);
        }
      }
    }
  }

  if packed {
    let x = leftmost as u32 * 8;
    fctl.x_offset = x;
    fctl.width = (rightmost as u32 * 8).min(fg.width) - x;
  } else {
    fctl.x_offset = leftmost as u32;
    fctl.width = (rightmost - leftmost) as u32;
  }
  fctl.y_offset = topmost as u32;
  fctl.height = (bottommost - topmost) as u32;
  true
}

/// One frame's worth of APNG output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApngPacket {
  /// This frame's `fcTL` chunk followed by its image-data chunks.
  pub data: Vec<u8>,
  /// The stream prelude (signature through the header chunks), delivered
  /// once on the first packet. The muxer writes it, with `acTL`, ahead of
  /// all frame packets.
  pub extra_data: Option<Vec<u8>>,
  /// Always true: every PNG frame is intra-coded.
  pub keyframe: bool,
}

/// Encodes a sequence of same-sized rasters into APNG frame packets.
///
/// Frames go in display order via [`encode`](Self::encode); because of the
/// one-frame lookahead each call returns the *previous* frame's packet, and
/// a final `encode(None)` flushes the last one.
pub struct ApngEncoder {
  enc: PngEncoder,
  frame_count: u32,
  sequence_number: u32,
  palette_checksum: u32,
  extra_data: Vec<u8>,
  extra_data_sent: bool,
  last_frame: Option<OwnedFrame>,
  prev_frame: Option<OwnedFrame>,
  last_frame_fctl: FrameControl,
  last_frame_packet: Vec<u8>,
}

impl ApngEncoder {
  /// Validates the configuration and acquires the compressor.
  pub fn new(
    config: &EncoderConfig, width: u32, height: u32, format: PixelFormat,
  ) -> EncodeResult<Self> {
    Ok(Self {
      enc: PngEncoder::new(config, width, height, format)?,
      frame_count: 0,
      sequence_number: 0,
      palette_checksum: 0,
      extra_data: Vec::new(),
      extra_data_sent: false,
      last_frame: None,
      prev_frame: None,
      last_frame_fctl: FrameControl::default(),
      last_frame_packet: Vec::new(),
    })
  }

  /// Feeds the next frame in, or flushes with `None` at end of stream.
  ///
  /// Returns the packet for the *previous* input frame once its disposal
  /// is settled, so the first call yields `Ok(None)`.
  pub fn encode(&mut self, frame: Option<&Raster<'_>>) -> EncodeResult<Option<ApngPacket>> {
    let Some(frame) = frame else {
      if self.last_frame.is_none() {
        return Ok(None);
      }
      self.last_frame_fctl.dispose_op = DisposeOp::None;
      let held = core::mem::take(&mut self.last_frame_packet);
      let packet = self.emit_held(held)?;
      self.last_frame = None;
      return Ok(Some(packet));
    };

    self.enc.check_frame(frame)?;
    if self.enc.format == PixelFormat::I8 {
      let Some(palette) = frame.palette else { return Err(EncodeError::UnsupportedPixelFormat) };
      let checksum = png_crc(cast_slice(&palette[..]));
      if self.frame_count == 0 {
        self.palette_checksum = checksum;
      } else if checksum != self.palette_checksum {
        return Err(EncodeError::PaletteConflict);
      }
    }

    if self.frame_count == 0 {
      let mut extra = Vec::new();
      write_headers(&mut extra, self.enc.width, self.enc.height, self.enc.interlaced, self.enc.dpm, frame)?;
      self.extra_data = extra;
    }

    let held = core::mem::take(&mut self.last_frame_packet);
    let mut fctl = FrameControl { sequence_number: self.sequence_number, ..Default::default() };
    self.sequence_number += 1;

    self.search_and_encode(frame, &mut fctl)?;

    let packet =
      if self.last_frame.is_some() { Some(self.emit_held(held)?) } else { None };

    // Commit the canvases: `prev_frame` becomes what a PREVIOUS disposal
    // would restore, i.e. the canvas after the old frame's own disposal.
    if self.last_frame.is_some() && self.last_frame_fctl.dispose_op != DisposeOp::Previous {
      if self.prev_frame.is_none() {
        self.prev_frame =
          Some(OwnedFrame::new_zeroed(self.enc.width, self.enc.height, self.enc.format)?);
      }
      if let (Some(prev), Some(last)) = (&mut self.prev_frame, &self.last_frame) {
        prev.copy_from(last);
        if self.last_frame_fctl.dispose_op == DisposeOp::Background {
          let lf = self.last_frame_fctl;
          prev.clear_rect(lf.x_offset, lf.y_offset, lf.width, lf.height);
        }
      }
    }
    match &mut self.last_frame {
      Some(last) => last.copy_from_raster(frame),
      None => {
        let mut last = OwnedFrame::new_zeroed(self.enc.width, self.enc.height, self.enc.format)?;
        last.copy_from_raster(frame);
        self.last_frame = Some(last);
      }
    }
    self.last_frame_fctl = fctl;
    self.frame_count += 1;
    Ok(packet)
  }

  fn emit_held(&mut self, held: Vec<u8>) -> EncodeResult<ApngPacket> {
    let mut data = Vec::new();
    data.try_reserve(held.len() + 26 + 12).map_err(|_| EncodeError::OutOfMemory)?;
    write_chunk(&mut data, *b"fcTL", &self.last_frame_fctl.to_payload());
    data.extend_from_slice(&held);
    let extra_data = if self.extra_data_sent {
      None
    } else {
      self.extra_data_sent = true;
      Some(core::mem::take(&mut self.extra_data))
    };
    Ok(ApngPacket { data, extra_data, keyframe: true })
  }

  /// Encodes `frame` into `last_frame_packet`, choosing the cheapest
  /// (previous-frame dispose, blend) pair, and records the winner's
  /// geometry in `fctl` and its disposal in `last_frame_fctl`.
  fn search_and_encode(&mut self, frame: &Raster<'_>, fctl: &mut FrameControl) -> EncodeResult<()> {
    let max_packet = self.enc.max_packet_size(16)?;

    if self.frame_count == 0 {
      fctl.width = frame.width;
      fctl.height = frame.height;
      fctl.blend_op = BlendOp::Source;
      let mut out = Vec::new();
      out.try_reserve(max_packet).map_err(|_| EncodeError::OutOfMemory)?;
      let mut sink = ImageDataSink::idat(&mut out);
      self.enc.encode_image_data(&mut sink, frame)?;
      drop(sink);
      self.last_frame_packet = out;
      return Ok(());
    }

    let Some(last) = &self.last_frame else { return Err(EncodeError::InvalidConfig) };
    let last_fctl = self.last_frame_fctl;
    let mut diff = OwnedFrame::new_zeroed(frame.width, frame.height, frame.format)?;

    let mut best: Option<(FrameControl, DisposeOp, u32)> = None;
    let mut best_size = usize::MAX;
    let mut best_buf = Vec::new();
    let mut trial_buf = Vec::new();
    best_buf.try_reserve(max_packet).map_err(|_| EncodeError::OutOfMemory)?;
    trial_buf.try_reserve(max_packet).map_err(|_| EncodeError::OutOfMemory)?;

    for dispose_op in [DisposeOp::None, DisposeOp::Background, DisposeOp::Previous] {
      for blend_op in [BlendOp::Source, BlendOp::Over] {
        // candidate canvas: the old frame left in place, its rectangle
        // cleared, or the canvas from before the old frame
        if dispose_op == DisposeOp::Previous {
          let Some(prev) = &self.prev_frame else { continue };
          diff.copy_from(prev);
        } else {
          diff.copy_from(last);
          if dispose_op == DisposeOp::Background {
            diff.clear_rect(last_fctl.x_offset, last_fctl.y_offset, last_fctl.width, last_fctl.height);
          }
        }

        let mut candidate = *fctl;
        candidate.blend_op = blend_op;
        if !inverse_blend(&mut diff, frame, &mut candidate) {
          continue;
        }

        trial_buf.clear();
        let mut sequence_number = self.sequence_number;
        {
          let sub = diff.sub_raster(candidate.width, candidate.height, frame.palette);
          let mut sink = ImageDataSink::fdat(&mut trial_buf, &mut sequence_number);
          self.enc.encode_image_data(&mut sink, &sub)?;
        }
        if trial_buf.len() < best_size {
          best_size = trial_buf.len();
          best = Some((candidate, dispose_op, sequence_number));
          core::mem::swap(&mut best_buf, &mut trial_buf);
        }
      }
    }

    // SOURCE blending can't fail, so a winner always exists
    let (best_fctl, best_dispose, sequence_number) = best.ok_or(EncodeError::CompressionFailed)?;
    *fctl = best_fctl;
    self.last_frame_fctl.dispose_op = best_dispose;
    self.sequence_number = sequence_number;
    self.last_frame_packet = best_buf;
    Ok(())
  }
}
