//! Writing everything ahead of the image data: the signature, `IHDR`, and
//! the metadata chunks a frame's side data calls for.

use alloc::vec::Vec;

use crate::chunk::write_chunk;
use crate::raster::{ColorPrimaries, ColorType, Raster, StereoLayout, TransferCharacteristic};
use crate::{EncodeError, EncodeResult, PNG_SIGNATURE};

/// Fixed-point `(x, y)` chromaticities ×100 000 in `cHRM` order: white
/// point, red, green, blue.
fn chromaticities(primaries: ColorPrimaries) -> Option<[u32; 8]> {
  Some(match primaries {
    ColorPrimaries::Bt709 => [31270, 32900, 64000, 33000, 30000, 60000, 15000, 6000],
    ColorPrimaries::Bt470M => [31000, 31600, 67000, 33000, 21000, 71000, 14000, 8000],
    ColorPrimaries::Bt470Bg => [31270, 32900, 64000, 33000, 29000, 60000, 15000, 6000],
    ColorPrimaries::Smpte170M | ColorPrimaries::Smpte240M => {
      [31270, 32900, 63000, 34000, 31000, 59500, 15500, 7000]
    }
    ColorPrimaries::Bt2020 => [31270, 32900, 70800, 29200, 17000, 79700, 13100, 4600],
    ColorPrimaries::Unspecified => return None,
  })
}

/// Writes the signature, `IHDR`, and all applicable metadata chunks.
///
/// Still-PNG packets start with this; an APNG stream captures it once as
/// the side-band "extra data" of its first packet.
pub(crate) fn write_headers(
  out: &mut Vec<u8>, width: u32, height: u32, interlaced: bool, dpm: u32, frame: &Raster<'_>,
) -> EncodeResult<()> {
  let color_type = frame.format.color_type();
  out.extend_from_slice(&PNG_SIGNATURE);

  let mut ihdr = [0_u8; 13];
  ihdr[0..4].copy_from_slice(&width.to_be_bytes());
  ihdr[4..8].copy_from_slice(&height.to_be_bytes());
  ihdr[8] = frame.format.bit_depth();
  ihdr[9] = color_type as u8;
  ihdr[10] = 0; // compression method
  ihdr[11] = 0; // filter method
  ihdr[12] = interlaced as u8;
  write_chunk(out, *b"IHDR", &ihdr);

  let mut phys = [0_u8; 9];
  if dpm != 0 {
    phys[0..4].copy_from_slice(&dpm.to_be_bytes());
    phys[4..8].copy_from_slice(&dpm.to_be_bytes());
    phys[8] = 1; // unit is the meter
  }
  write_chunk(out, *b"pHYs", &phys);

  if let Some(stereo) = frame.stereo {
    match stereo.layout {
      StereoLayout::SideBySide => {
        write_chunk(out, *b"sTER", &[if stereo.inverted { 0 } else { 1 }]);
      }
      StereoLayout::TwoD => (),
      _ => log::warn!("only side-by-side stereo3d can be written to an sTER chunk; skipping"),
    }
  }

  if frame.primaries == ColorPrimaries::Bt709 && frame.transfer == TransferCharacteristic::Srgb {
    // rendering intent: relative colorimetric
    write_chunk(out, *b"sRGB", &[1]);
  }

  if let Some(coords) = chromaticities(frame.primaries) {
    let mut chrm = [0_u8; 32];
    for (i, coord) in coords.iter().enumerate() {
      chrm[i * 4..i * 4 + 4].copy_from_slice(&coord.to_be_bytes());
    }
    write_chunk(out, *b"cHRM", &chrm);
  }

  if let Some(gamma) = frame.transfer.gama_fixed() {
    write_chunk(out, *b"gAMA", &gamma.to_be_bytes());
  }

  if color_type == ColorType::Index {
    let Some(palette) = frame.palette else { return Err(EncodeError::UnsupportedPixelFormat) };
    let mut plte = [0_u8; 256 * 3];
    let mut trns = [0_u8; 256];
    let mut has_alpha = false;
    for (i, &entry) in palette.iter().enumerate() {
      let alpha = (entry >> 24) as u8;
      if alpha != 0xFF {
        has_alpha = true;
      }
      trns[i] = alpha;
      plte[i * 3] = (entry >> 16) as u8;
      plte[i * 3 + 1] = (entry >> 8) as u8;
      plte[i * 3 + 2] = entry as u8;
    }
    write_chunk(out, *b"PLTE", &plte);
    if has_alpha {
      write_chunk(out, *b"tRNS", &trns);
    }
  }

  Ok(())
}
