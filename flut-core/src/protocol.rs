//! Wire-format encoder for the pixel-flooding text protocol.
//!
//! The server speaks a newline-delimited, fire-and-forget command stream:
//!
//! ```text
//! OFFSET <x> <y>\n            set the origin for subsequent PX writes
//! PX <x> <y> <rrggbb>\n       paint an opaque pixel
//! PX <x> <y> <aarrggbb>\n     paint with alpha (alpha prefixes the color)
//! ```
//!
//! Hex digits are lowercase, two per channel. Nothing is ever read back;
//! throughput of redundant writes determines the visual result.
//!
//! Encoding is pure and deterministic — identical pixel slices produce
//! identical bytes. Randomized transmission order (dithering) is the chunk
//! partitioner's concern, never the encoder's.

use bytes::{BufMut, Bytes, BytesMut};

use crate::grid::Rgba;

// ── PlacedPixel ──────────────────────────────────────────────────

/// One pixel positioned on the canvas, ready for encoding.
///
/// Coordinates are relative to the stream's `OFFSET` origin and may be
/// negative after caller-side translation; the server ignores writes
/// outside its canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacedPixel {
    pub x: i64,
    pub y: i64,
    pub color: Rgba,
}

impl PlacedPixel {
    pub const fn new(x: i64, y: i64, color: Rgba) -> Self {
        Self { x, y, color }
    }
}

// ── Encoding ─────────────────────────────────────────────────────

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

fn put_hex(buf: &mut BytesMut, byte: u8) {
    buf.put_u8(HEX_DIGITS[(byte >> 4) as usize]);
    buf.put_u8(HEX_DIGITS[(byte & 0x0f) as usize]);
}

fn put_decimal(buf: &mut BytesMut, scratch: &mut itoa::Buffer, value: i64) {
    buf.put_slice(scratch.format(value).as_bytes());
}

/// Append one `PX` line for `pixel` to `buf`.
fn put_pixel_line(buf: &mut BytesMut, scratch: &mut itoa::Buffer, pixel: &PlacedPixel) {
    buf.put_slice(b"PX ");
    put_decimal(buf, scratch, pixel.x);
    buf.put_u8(b' ');
    put_decimal(buf, scratch, pixel.y);
    buf.put_u8(b' ');

    // Alpha prefixes the color and is omitted entirely when opaque.
    if !pixel.color.is_opaque() {
        put_hex(buf, pixel.color.a);
    }
    put_hex(buf, pixel.color.r);
    put_hex(buf, pixel.color.g);
    put_hex(buf, pixel.color.b);
    buf.put_u8(b'\n');
}

/// Encode a pixel slice into one contiguous buffer of `PX` lines.
pub fn encode_pixels(pixels: &[PlacedPixel]) -> Bytes {
    let (buffer, _) = encode_lines(pixels);
    buffer
}

/// Encode a pixel slice and report the byte offset at which each line
/// starts. The partitioner uses the offsets to cut chunks on line
/// boundaries.
pub fn encode_lines(pixels: &[PlacedPixel]) -> (Bytes, Vec<usize>) {
    // "PX -123456 -123456 aarrggbb\n" tops out well under 32 bytes for
    // any canvas a server will accept.
    let mut buf = BytesMut::with_capacity(pixels.len() * 20);
    let mut line_starts = Vec::with_capacity(pixels.len());
    let mut scratch = itoa::Buffer::new();

    for pixel in pixels {
        line_starts.push(buf.len());
        put_pixel_line(&mut buf, &mut scratch, pixel);
    }

    (buf.freeze(), line_starts)
}

/// Encode exactly `OFFSET <x> <y>\n`.
pub fn encode_offset(x: u32, y: u32) -> Bytes {
    Bytes::from(format!("OFFSET {x} {y}\n"))
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_pixel_line() {
        let buf = encode_pixels(&[PlacedPixel::new(3, 7, Rgba::opaque(0xff, 0x00, 0xab))]);
        assert_eq!(&buf[..], b"PX 3 7 ff00ab\n");
    }

    #[test]
    fn translucent_pixel_gets_alpha_prefix() {
        let buf = encode_pixels(&[PlacedPixel::new(0, 0, Rgba::new(0x12, 0x34, 0x56, 0x80))]);
        assert_eq!(&buf[..], b"PX 0 0 80123456\n");
    }

    #[test]
    fn negative_coordinates_encode() {
        let buf = encode_pixels(&[PlacedPixel::new(-4, -1, Rgba::opaque(0, 0, 0))]);
        assert_eq!(&buf[..], b"PX -4 -1 000000\n");
    }

    #[test]
    fn offset_line() {
        assert_eq!(&encode_offset(10, 20)[..], b"OFFSET 10 20\n");
        assert_eq!(&encode_offset(0, 0)[..], b"OFFSET 0 0\n");
    }

    #[test]
    fn line_starts_match_line_boundaries() {
        let pixels = [
            PlacedPixel::new(0, 0, Rgba::opaque(1, 2, 3)),
            PlacedPixel::new(100, 2000, Rgba::new(1, 2, 3, 4)),
            PlacedPixel::new(5, 5, Rgba::opaque(0xaa, 0xbb, 0xcc)),
        ];
        let (buf, starts) = encode_lines(&pixels);

        assert_eq!(starts.len(), 3);
        assert_eq!(starts[0], 0);
        for &start in &starts[1..] {
            assert_eq!(buf[start - 1], b'\n');
            assert_eq!(&buf[start..start + 3], b"PX ");
        }
        assert_eq!(*buf.last().unwrap(), b'\n');
    }

    #[test]
    fn encoding_is_deterministic() {
        let pixels = [
            PlacedPixel::new(1, 2, Rgba::opaque(9, 8, 7)),
            PlacedPixel::new(3, 4, Rgba::new(5, 6, 7, 8)),
        ];
        assert_eq!(encode_pixels(&pixels), encode_pixels(&pixels));
    }
}
