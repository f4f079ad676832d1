//! Driving the DEFLATE compressor and framing its output into image-data
//! chunks.
//!
//! Compressed bytes land in a fixed scratch buffer; each time it fills, the
//! 4096 bytes are flushed as one `IDAT` (still PNG, or frame 0 of an APNG)
//! or one `fdAT` chunk. Each frame is its own zlib stream: the compressor
//! is reset between frames, not run across them.

use alloc::vec::Vec;

use miniz_oxide::deflate::core::{
  compress, create_comp_flags_from_zip_params, CompressorOxide, TDEFLFlush, TDEFLStatus,
};

use crate::chunk::{write_chunk, write_fdat};
use crate::{EncodeError, EncodeResult};

/// Compressed-output scratch size, which is also the image-data chunk size.
pub(crate) const IOBUF_SIZE: usize = 4096;

/// A worst-case zlib stream size for `len` input bytes: stored blocks plus
/// the zlib header and checksum, as zlib's own `deflateBound` figures it.
pub(crate) const fn deflate_bound(len: usize) -> usize {
  len + (len >> 12) + (len >> 14) + (len >> 25) + 13 + 6
}

/// Where image-data chunks go, and which chunk type frames them.
pub(crate) struct ImageDataSink<'a> {
  out: &'a mut Vec<u8>,
  /// `None` writes `IDAT` chunks. `Some` writes `fdAT` chunks numbered
  /// from this counter, incrementing it once per chunk written.
  sequence_number: Option<&'a mut u32>,
}
impl<'a> ImageDataSink<'a> {
  pub(crate) fn idat(out: &'a mut Vec<u8>) -> Self {
    Self { out, sequence_number: None }
  }

  #[cfg(feature = "apng")]
  pub(crate) fn fdat(out: &'a mut Vec<u8>, sequence_number: &'a mut u32) -> Self {
    Self { out, sequence_number: Some(sequence_number) }
  }

  fn push(&mut self, data: &[u8]) {
    match &mut self.sequence_number {
      None => write_chunk(self.out, *b"IDAT", data),
      Some(sequence_number) => {
        write_fdat(self.out, **sequence_number, data);
        **sequence_number += 1;
      }
    }
  }
}

/// One frame-at-a-time streaming DEFLATE compressor.
///
/// Owned by an encoder for its whole lifetime; the dictionary and scratch
/// space are acquired once and recycled with [`Deflater::reset`].
pub(crate) struct Deflater {
  compressor: CompressorOxide,
  buf: [u8; IOBUF_SIZE],
  len: usize,
}
impl Deflater {
  pub(crate) fn new(compression_level: u8) -> Self {
    let flags = create_comp_flags_from_zip_params(compression_level as i32, 15, 0);
    Self { compressor: CompressorOxide::new(flags), buf: [0; IOBUF_SIZE], len: 0 }
  }

  /// Feeds one filtered scanline (or any other run of bytes) into the
  /// stream, flushing full chunks to `sink` as they accumulate.
  pub(crate) fn write(
    &mut self, sink: &mut ImageDataSink<'_>, mut data: &[u8],
  ) -> EncodeResult<()> {
    while !data.is_empty() {
      if self.len == IOBUF_SIZE {
        sink.push(&self.buf);
        self.len = 0;
      }
      let (status, consumed, written) =
        compress(&mut self.compressor, data, &mut self.buf[self.len..], TDEFLFlush::None);
      if status != TDEFLStatus::Okay {
        return Err(EncodeError::CompressionFailed);
      }
      data = &data[consumed..];
      self.len += written;
    }
    Ok(())
  }

  /// Runs the compressor to completion and flushes whatever remains.
  pub(crate) fn finish(&mut self, sink: &mut ImageDataSink<'_>) -> EncodeResult<()> {
    loop {
      if self.len == IOBUF_SIZE {
        sink.push(&self.buf);
        self.len = 0;
      }
      let (status, _, written) =
        compress(&mut self.compressor, &[], &mut self.buf[self.len..], TDEFLFlush::Finish);
      self.len += written;
      match status {
        TDEFLStatus::Done => {
          if self.len > 0 {
            sink.push(&self.buf[..self.len]);
            self.len = 0;
          }
          return Ok(());
        }
        TDEFLStatus::Okay => (),
        _ => return Err(EncodeError::CompressionFailed),
      }
    }
  }

  /// Starts a fresh zlib stream so the next frame is independently
  /// decompressible.
  pub(crate) fn reset(&mut self) {
    self.compressor.reset();
    self.len = 0;
  }
}
