//! Writing one PNG chunk: length, tag, payload, CRC.

use alloc::vec::Vec;

use crate::crc32::update_crc;

/// Appends one chunk to `out`.
///
/// Framing is big-endian payload length, four tag bytes, payload, then a
/// big-endian CRC-32 over the tag and payload.
pub(crate) fn write_chunk(out: &mut Vec<u8>, tag: [u8; 4], payload: &[u8]) {
  write_chunk_impl(out, tag, None, payload)
}

/// Appends one `fdAT` chunk to `out`.
///
/// Same framing as [`write_chunk`], except the payload is prefixed with the
/// frame's sequence number: the length field counts `payload + 4` and the
/// CRC spans tag + sequence number + payload.
pub(crate) fn write_fdat(out: &mut Vec<u8>, sequence_number: u32, payload: &[u8]) {
  write_chunk_impl(out, *b"fdAT", Some(sequence_number), payload)
}

fn write_chunk_impl(out: &mut Vec<u8>, tag: [u8; 4], sequence_number: Option<u32>, payload: &[u8]) {
  let length = payload.len() as u32 + if sequence_number.is_some() { 4 } else { 0 };
  out.extend_from_slice(&length.to_be_bytes());
  let mut crc = update_crc(u32::MAX, &tag);
  out.extend_from_slice(&tag);
  if let Some(sequence_number) = sequence_number {
    let sequence_bytes = sequence_number.to_be_bytes();
    crc = update_crc(crc, &sequence_bytes);
    out.extend_from_slice(&sequence_bytes);
  }
  crc = update_crc(crc, payload);
  out.extend_from_slice(payload);
  out.extend_from_slice(&(crc ^ u32::MAX).to_be_bytes());
}
