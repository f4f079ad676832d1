#![no_std]
#![forbid(unsafe_code)]

//! Tools for encoding PNG and APNG data.
//!
//! The still-image half is [`PngEncoder`]: pick an [`EncoderConfig`], give
//! it the image shape once, then feed it [`Raster`] views and get back
//! complete PNG files. Pixels are filtered a scanline at a time (optionally
//! trying all five predictors per line), compressed into a zlib stream, and
//! framed into `IDAT` chunks as the compressor's output accumulates.
//!
//! ```
//! use imprint::*;
//!
//! let config = EncoderConfig::default();
//! let mut encoder = PngEncoder::new(&config, 2, 2, PixelFormat::RGB8).unwrap();
//! let pixels = [255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 255];
//! let png = encoder.encode(&Raster::new(2, 2, PixelFormat::RGB8, &pixels, 6)).unwrap();
//! assert_eq!(&png[..8], &PNG_SIGNATURE);
//! ```
//!
//! The animated half is [`ApngEncoder`] (crate feature `apng`, on by
//! default). It produces one packet of `fcTL` + `fdAT` chunks per frame,
//! ready for a muxer to wrap with `acTL`, frame delays, and `IEND`. Frames
//! go in one call behind the output: each frame's control chunk carries the
//! disposal that made the *next* frame cheapest, so the packet for a frame
//! is returned by the call that supplies its successor, and a final
//! `encode(None)` flushes the last one.
//!
//! The encoder is synchronous and single-threaded; run one instance per
//! stream, as many streams in parallel as you like.

extern crate alloc;

mod chunk;
mod crc32;
mod filtering;
mod headers;
mod image_data;
mod interlace;
mod raster;

mod encoder;
pub use encoder::*;

pub use filtering::Predictor;
pub use raster::*;

#[cfg(feature = "apng")]
mod apng;
#[cfg(feature = "apng")]
pub use apng::*;

/// The first eight bytes of a PNG datastream should match these bytes.
pub const PNG_SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

pub type EncodeResult<T> = Result<T, EncodeError>;

/// Everything that can stop an encode.
///
/// These all leave the encoder in a state that's safe to drop but not to
/// keep encoding with; recreate the encoder after an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[non_exhaustive]
pub enum EncodeError {
  /// A buffer could not be allocated, or the packet budget for this image
  /// size cannot be addressed.
  OutOfMemory,
  /// The DEFLATE compressor reported an internal failure.
  CompressionFailed,
  /// Rejected at creation (both density options set, zero dimensions) or a
  /// raster that doesn't match the agreed shape.
  InvalidConfig,
  /// A raster whose pixel format can't be encoded here: wrong format for
  /// this encoder, or a palette format with no palette attached.
  UnsupportedPixelFormat,
  /// APNG streams must use a single palette; a later frame's differed from
  /// frame 0's.
  PaletteConflict,
}
