use image::{ExtendedColorType, ImageEncoder, codecs::png::PngEncoder};

use crate::{error::SourceError, source::Frame};

/// Encodes a frame as PNG for the blob cache.
pub fn encode_png(frame: &Frame) -> Result<Vec<u8>, SourceError> {
    let mut out = Vec::with_capacity(frame.as_rgb().len() / 2);
    PngEncoder::new(&mut out)
        .write_image(
            frame.as_rgb(),
            frame.width(),
            frame.height(),
            ExtendedColorType::Rgb8,
        )
        .map_err(SourceError::Encode)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_frame_decodes_to_same_pixels() {
        let frame = Frame::filled(5, 4, [200, 100, 50]);
        let png = encode_png(&frame).unwrap();
        assert_eq!(&png[1..4], b"PNG");

        let decoded = image::load_from_memory(&png).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (5, 4));
        assert_eq!(decoded.as_raw().as_slice(), frame.as_rgb());
    }
}
