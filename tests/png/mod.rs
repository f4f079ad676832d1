use imprint::*;

use super::{image_data, parse_chunks, pattern_bytes, unfilter, Chunk};

fn inflate(data: &[u8]) -> Vec<u8> {
  miniz_oxide::inflate::decompress_to_vec_zlib(data).expect("bad zlib stream")
}

/// Encode one raster and hand back the parsed chunk list (signature
/// stripped, CRCs verified).
fn encode_to_chunks(config: &EncoderConfig, frame: &Raster<'_>) -> Vec<Chunk> {
  let mut encoder = PngEncoder::new(config, frame.width, frame.height, frame.format).unwrap();
  let png = encoder.encode(frame).unwrap();
  assert_eq!(&png[..8], &PNG_SIGNATURE);
  parse_chunks(&png[8..])
}

#[test]
fn test_one_red_pixel() {
  let config = EncoderConfig::default();
  let frame = Raster::new(1, 1, PixelFormat::RGB8, &[0xFF, 0x00, 0x00], 3);
  let chunks = encode_to_chunks(&config, &frame);
  let tags: Vec<[u8; 4]> = chunks.iter().map(|c| c.tag).collect();
  assert_eq!(tags, [*b"IHDR", *b"pHYs", *b"IDAT", *b"IEND"]);
  assert_eq!(chunks[0].payload, [0, 0, 0, 1, 0, 0, 0, 1, 8, 2, 0, 0, 0]);
  assert_eq!(chunks[1].payload, [0; 9]);
  assert_eq!(inflate(&image_data(&chunks)), [0x00, 0xFF, 0x00, 0x00]);
  assert!(chunks[3].payload.is_empty());
}

#[test]
fn test_gray_2x2_sub_filtering() {
  let config = EncoderConfig { predictor: Predictor::Sub, ..EncoderConfig::default() };
  let frame = Raster::new(2, 2, PixelFormat::Y8, &[0, 255, 255, 0], 2);
  let chunks = encode_to_chunks(&config, &frame);
  // row 1 wraps: 0 - 255 = 0x01
  assert_eq!(inflate(&image_data(&chunks)), [1, 0x00, 0xFF, 1, 0xFF, 0x01]);
}

#[test]
fn test_mixed_picks_up_for_repeated_row() {
  let config = EncoderConfig { predictor: Predictor::Mixed, ..EncoderConfig::default() };
  let row: Vec<u8> = (0..32).collect();
  let mut data = row.clone();
  data.extend_from_slice(&row);
  let frame = Raster::new(32, 2, PixelFormat::Y8, &data, 32);
  let chunks = encode_to_chunks(&config, &frame);
  let filtered = inflate(&image_data(&chunks));
  // a ramp filters cheapest under Sub; an identical row zeroes under Up
  assert_eq!(filtered[0], 1);
  assert_eq!(filtered[33], 2);
  assert_eq!(&filtered[34..66], &[0; 32]);
}

fn roundtrip(format: PixelFormat, predictor: Predictor) {
  let (width, height) = (13_u32, 7_u32);
  let row_bytes = format.bytes_per_row(width);
  let stride = row_bytes + 3;
  let data = pattern_bytes(stride * height as usize, format.bits_per_pixel() as u32);
  let palette: Palette = core::array::from_fn(|i| (i as u32) * 0x0101_0101);

  let mut frame = Raster::new(width, height, format, &data, stride);
  if format == PixelFormat::I8 {
    frame.palette = Some(&palette);
  }
  let config = EncoderConfig { predictor, ..EncoderConfig::default() };
  let chunks = encode_to_chunks(&config, &frame);

  // IHDR agrees with the format
  assert_eq!(chunks[0].tag, *b"IHDR");
  assert_eq!(chunks[0].payload[8], format.bit_depth());
  assert_eq!(chunks[0].payload[9], format.color_type() as u8);

  let filtered = inflate(&image_data(&chunks));
  assert_eq!(filtered.len(), (row_bytes + 1) * height as usize);

  // predictor bytes are legal, and the first row never references a
  // nonexistent line above
  for (y, line) in filtered.chunks_exact(row_bytes + 1).enumerate() {
    assert!(line[0] <= 4, "bad filter byte {} on row {y}", line[0]);
    if y == 0 {
      assert!(line[0] <= 1, "row 0 used filter {}", line[0]);
    }
    if format == PixelFormat::Y1 {
      assert_eq!(line[0], 0, "monochrome row {y} was filtered");
    }
  }

  // decode and compare to the input rows
  let decoded = unfilter(&filtered, row_bytes, format.bytes_per_pixel());
  let expected: Vec<u8> = (0..height as usize)
    .flat_map(|y| data[y * stride..y * stride + row_bytes].iter().copied())
    .collect();
  assert_eq!(decoded, expected, "failed roundtrip: {format:?} {predictor:?}");
}

#[test]
fn test_roundtrip_every_format_and_predictor() {
  for format in [
    PixelFormat::Y1,
    PixelFormat::Y8,
    PixelFormat::Y16,
    PixelFormat::YA8,
    PixelFormat::YA16,
    PixelFormat::RGB8,
    PixelFormat::RGB16,
    PixelFormat::RGBA8,
    PixelFormat::RGBA16,
    PixelFormat::I8,
  ] {
    for predictor in [
      Predictor::None,
      Predictor::Sub,
      Predictor::Up,
      Predictor::Avg,
      Predictor::Paeth,
      Predictor::Mixed,
    ] {
      roundtrip(format, predictor);
    }
  }
}

#[test]
fn test_palette_chunks_written() {
  let palette: Palette = core::array::from_fn(|i| ((i as u32) << 24) | 0x0020_4060);
  let mut frame = Raster::new(2, 1, PixelFormat::I8, &[1, 2], 2);
  frame.palette = Some(&palette);
  let chunks = encode_to_chunks(&EncoderConfig::default(), &frame);
  let tags: Vec<[u8; 4]> = chunks.iter().map(|c| c.tag).collect();
  assert_eq!(tags, [*b"IHDR", *b"pHYs", *b"PLTE", *b"tRNS", *b"IDAT", *b"IEND"]);
  assert_eq!(chunks[2].payload.len(), 768);
  assert_eq!(chunks[3].payload.len(), 256);
  // entry i has alpha i
  assert_eq!(chunks[3].payload[5], 5);
}

#[test]
fn test_interlaced_one_pixel() {
  let config = EncoderConfig { interlaced: true, ..EncoderConfig::default() };
  let frame = Raster::new(1, 1, PixelFormat::Y8, &[0x5A], 1);
  let chunks = encode_to_chunks(&config, &frame);
  assert_eq!(chunks[0].payload[12], 1, "interlace flag");
  // only pass 0 contributes: one scanline of one pixel
  assert_eq!(inflate(&image_data(&chunks)), [0, 0x5A]);
}

#[test]
fn test_interlaced_2x2_pass_layout() {
  let config = EncoderConfig { interlaced: true, ..EncoderConfig::default() };
  let frame = Raster::new(2, 2, PixelFormat::Y8, &[11, 22, 33, 44], 2);
  let chunks = encode_to_chunks(&config, &frame);
  // pass 0 -> (0,0); pass 5 -> (1,0); pass 6 -> row 1
  assert_eq!(inflate(&image_data(&chunks)), [0, 11, 0, 22, 0, 33, 44]);
}

#[test]
fn test_interlaced_8x8_structure() {
  let config =
    EncoderConfig { interlaced: true, predictor: Predictor::Paeth, ..EncoderConfig::default() };
  let data = pattern_bytes(64, 8);
  let frame = Raster::new(8, 8, PixelFormat::Y8, &data, 8);
  let chunks = encode_to_chunks(&config, &frame);
  let filtered = inflate(&image_data(&chunks));

  // the seven reduced images of an 8x8: (width, height) per pass
  let passes = [(1, 1), (1, 1), (2, 1), (2, 2), (4, 2), (4, 4), (8, 4)];
  let total: usize = passes.iter().map(|&(w, h)| (w + 1) * h).sum();
  assert_eq!(filtered.len(), total);

  let mut at = 0;
  for (pass, &(w, h)) in passes.iter().enumerate() {
    for row in 0..h {
      let filter = filtered[at];
      assert!(filter <= 4);
      if row == 0 {
        // a pass's first line has nothing above it
        assert!(filter <= 1, "pass {pass} row 0 used filter {filter}");
      }
      at += w + 1;
    }
  }
}

#[test]
fn test_bad_stride_rejected() {
  let mut encoder =
    PngEncoder::new(&EncoderConfig::default(), 4, 4, PixelFormat::RGB8).unwrap();
  let data = [0_u8; 48];
  let frame = Raster::new(4, 4, PixelFormat::RGB8, &data, 11);
  assert_eq!(encoder.encode(&frame), Err(EncodeError::InvalidConfig));
}

#[test]
fn test_encoder_reuse_produces_identical_files() {
  let config = EncoderConfig { predictor: Predictor::Mixed, ..EncoderConfig::default() };
  let mut encoder = PngEncoder::new(&config, 9, 5, PixelFormat::RGB8).unwrap();
  let data = pattern_bytes(27 * 5, 3);
  let frame = Raster::new(9, 5, PixelFormat::RGB8, &data, 27);
  let first = encoder.encode(&frame).unwrap();
  let second = encoder.encode(&frame).unwrap();
  // the compressor resets between frames, so history can't leak across
  assert_eq!(first, second);
}
