//! The CRC-32 used by PNG chunk trailers (IEEE polynomial, reflected).

const CRC_TABLE: [u32; 256] = make_crc_table();

const fn make_crc_table() -> [u32; 256] {
  let mut out = [0; 256];
  let mut n = 0;
  while n < 256 {
    let mut c = n as u32;
    let mut k = 0;
    while k < 8 {
      if (c & 1) != 0 {
        c = 0xEDB8_8320_u32 ^ (c >> 1);
      } else {
        c = c >> 1;
      }
      //
      k += 1;
    }
    out[n] = c;
    //
    n += 1;
  }
  out
}

/// Folds more bytes into a running CRC value.
///
/// Start from `u32::MAX`, and XOR with `u32::MAX` when done. The chunk
/// writer splits the accumulation like this because a chunk's CRC covers the
/// tag, the optional `fdAT` sequence number, and the payload, which don't
/// live in one slice.
pub(crate) fn update_crc(mut crc: u32, bytes: &[u8]) -> u32 {
  for byte in bytes.iter().copied() {
    let i = (crc ^ u32::from(byte)) as u8 as usize;
    crc = CRC_TABLE[i] ^ (crc >> 8);
  }
  crc
}

/// CRC-32 of a complete byte run, with the init and final-XOR applied.
#[inline]
pub(crate) fn png_crc(bytes: &[u8]) -> u32 {
  update_crc(u32::MAX, bytes) ^ u32::MAX
}
