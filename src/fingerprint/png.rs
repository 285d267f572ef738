//! Deterministic PNG writer.
//!
//! Fixed compression and filter settings so the same surface always
//! encodes to the same bytes.

use std::io::Write;
use std::path::Path;

use png::{BitDepth, ColorType, Compression, Encoder, FilterType};
use thiserror::Error;

use super::surface::Surface;

#[derive(Debug, Error)]
pub enum PngError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PNG encoding error: {0}")]
    Encoding(#[from] png::EncodingError),
}

/// Write a surface as an RGB8 PNG file.
pub fn write_surface(surface: &Surface, path: &Path) -> Result<(), PngError> {
    let file = std::fs::File::create(path)?;
    let writer = std::io::BufWriter::new(file);
    write_surface_to_writer(surface, writer)
}

/// Write a surface as an RGB8 PNG to any writer.
pub fn write_surface_to_writer<W: Write>(surface: &Surface, writer: W) -> Result<(), PngError> {
    let mut encoder = Encoder::new(writer, surface.width(), surface.height());
    encoder.set_color(ColorType::Rgb);
    encoder.set_depth(BitDepth::Eight);
    // Fixed settings keep output byte-identical across runs
    encoder.set_compression(Compression::Default);
    encoder.set_filter(FilterType::NoFilter);

    let mut png_writer = encoder.write_header()?;
    png_writer.write_image_data(surface.data())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::surface::PAGE_BG;

    fn encode(surface: &Surface) -> Vec<u8> {
        let mut bytes = Vec::new();
        write_surface_to_writer(surface, &mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_output_is_deterministic() {
        let mut surface = Surface::new(32, 16, PAGE_BG);
        for x in 0..32 {
            surface.fill_rect(x, 0, 1, 16, [(x * 8) as u8, 0, 128]);
        }
        assert_eq!(encode(&surface), encode(&surface));
    }

    #[test]
    fn test_output_is_valid_png() {
        let surface = Surface::new(8, 8, PAGE_BG);
        let bytes = encode(&surface);
        assert_eq!(&bytes[1..4], b"PNG");

        let decoder = png::Decoder::new(&bytes[..]);
        let mut reader = decoder.read_info().unwrap();
        let mut buf = vec![0; reader.output_buffer_size()];
        let info = reader.next_frame(&mut buf).unwrap();
        assert_eq!(info.width, 8);
        assert_eq!(info.height, 8);
        assert_eq!(&buf[..info.buffer_size()], surface.data());
    }
}
