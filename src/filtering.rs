//! Scanline filtering, the encode direction.
//!
//! From the PNG spec:
//!
//! > Filters are applied to **bytes**, not to pixels, regardless of the bit
//! > depth or color type of the image.
//!
//! Each output scanline is a filter-type byte followed by the filtered
//! bytes. `bpp` below is always the *rounded-up* bytes per pixel, and bytes
//! to the left of the first pixel are treated as absent (the filters copy
//! through for them).

/// Which predictor the encoder runs on each scanline.
///
/// The first five match PNG filter types 0–4. [`Predictor::Mixed`] tries
/// all five on every line and keeps the cheapest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Predictor {
  #[default]
  None,
  Sub,
  Up,
  Avg,
  Paeth,
  Mixed,
}

pub(crate) const FILTER_NONE: u8 = 0;
pub(crate) const FILTER_SUB: u8 = 1;
pub(crate) const FILTER_UP: u8 = 2;
pub(crate) const FILTER_AVG: u8 = 3;
pub(crate) const FILTER_PAETH: u8 = 4;

/// The Paeth filter function computes a simple linear function of the three
/// neighboring bytes (left `a`, above `b`, upper left `c`) and predicts
/// whichever neighbor is closest to the computed value, with ties broken in
/// the order `a`, `b`, `c`.
const fn paeth_predictor(a: u8, b: u8, c: u8) -> u8 {
  // The PNG spec says "The calculations within the PaethPredictor function
  // shall be performed exactly, without overflow", so this is i32 math,
  // which is wide enough for any u8 inputs.
  let a = a as i32;
  let b = b as i32;
  let c = c as i32;
  let p = a + b - c;
  let pa = (p - a).abs();
  let pb = (p - b).abs();
  let pc = (p - c).abs();
  if pa <= pb && pa <= pc {
    a as u8
  } else if pb <= pc {
    b as u8
  } else {
    c as u8
  }
}

fn sub_row(dst: &mut [u8], src: &[u8], bpp: usize) {
  let n = bpp.min(src.len());
  dst[..n].copy_from_slice(&src[..n]);
  for i in bpp..src.len() {
    dst[i] = src[i].wrapping_sub(src[i - bpp]);
  }
}

/// Applies filter type `filter` to `src`, writing `src.len()` filtered
/// bytes to `dst` (no filter-type byte).
///
/// `top` must be the previous scanline for types 2, 3, and 4; callers
/// resolve the no-previous-line case before getting here.
pub(crate) fn filter_row(dst: &mut [u8], filter: u8, src: &[u8], top: &[u8], bpp: usize) {
  debug_assert!(filter <= FILTER_SUB || top.len() == src.len());
  match filter {
    FILTER_SUB => sub_row(dst, src, bpp),
    FILTER_UP => {
      for i in 0..src.len() {
        dst[i] = src[i].wrapping_sub(top[i]);
      }
    }
    FILTER_AVG => {
      let n = bpp.min(src.len());
      for i in 0..n {
        dst[i] = src[i].wrapping_sub(top[i] >> 1);
      }
      for i in bpp..src.len() {
        let avg = ((src[i - bpp] as u32 + top[i] as u32) >> 1) as u8;
        dst[i] = src[i].wrapping_sub(avg);
      }
    }
    FILTER_PAETH => {
      let n = bpp.min(src.len());
      for i in 0..n {
        // leftmost pixel: a and c are absent, and paeth(0, b, 0) is b
        dst[i] = src[i].wrapping_sub(top[i]);
      }
      for i in bpp..src.len() {
        let p = paeth_predictor(src[i - bpp], top[i], top[i - bpp]);
        dst[i] = src[i].wrapping_sub(p);
      }
    }
    _ => dst.copy_from_slice(src),
  }
}

/// The mixed-mode cost of a filtered line: the sum of signed-byte
/// magnitudes, so a byte of 0xFF costs 1, not 255.
fn line_cost(line: &[u8]) -> u32 {
  line.iter().map(|&b| (b as i8).unsigned_abs() as u32).sum()
}

/// Produces one complete filtered scanline (filter-type byte included) in
/// `buf` and returns it.
///
/// When there is no previous line every predictor degrades to `Sub`: types
/// 2/3/4 would otherwise predict from a phantom all-zero line, which
/// inflates the output. For `Mixed`, `buf` must hold `2 * (src.len() + 1)`
/// bytes; the contender and the champion live in the two halves and swap
/// roles instead of being copied.
pub(crate) fn choose_filter_row<'b>(
  predictor: Predictor, buf: &'b mut [u8], src: &[u8], top: Option<&[u8]>, bpp: usize,
) -> &'b [u8] {
  let size = src.len();
  let filter = match (predictor, top) {
    (Predictor::None, _) => FILTER_NONE,
    (_, None) | (Predictor::Sub, _) => FILTER_SUB,
    (Predictor::Up, Some(_)) => FILTER_UP,
    (Predictor::Avg, Some(_)) => FILTER_AVG,
    (Predictor::Paeth, Some(_)) => FILTER_PAETH,
    (Predictor::Mixed, Some(top)) => {
      let (lo, hi) = buf.split_at_mut(size + 1);
      let mut champion_in_lo = true;
      let mut best_cost = u32::MAX;
      for filter in FILTER_NONE..=FILTER_PAETH {
        let trial: &mut [u8] =
          if champion_in_lo { &mut hi[..size + 1] } else { &mut lo[..size + 1] };
        trial[0] = filter;
        filter_row(&mut trial[1..], filter, src, top, bpp);
        let cost = line_cost(trial);
        if cost < best_cost {
          best_cost = cost;
          champion_in_lo = !champion_in_lo;
        }
      }
      return if champion_in_lo { &lo[..size + 1] } else { &hi[..size + 1] };
    }
  };
  buf[0] = filter;
  filter_row(&mut buf[1..size + 1], filter, src, top.unwrap_or(&[]), bpp);
  &buf[..size + 1]
}
