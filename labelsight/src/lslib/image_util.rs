use std::io::Cursor;

use base64::{Engine, engine::general_purpose::STANDARD};
use image::{
    DynamicImage, ExtendedColorType, ImageEncoder, ImageReader, RgbaImage,
    codecs::png::PngEncoder,
};
use labelsight_domain::{LsError, LsResult};

pub const PNG_DATA_URI_PREFIX: &str = "data:image/png;base64,";

/// Guesses the format from the content, the file extension is not needed.
pub fn decode(bytes: &[u8]) -> LsResult<DynamicImage> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| LsError::Decode(format!("could not guess image format, {e:?}")))?
        .decode()
        .map_err(|e| LsError::Decode(format!("could not decode image, {e}")))
}

pub fn encode_png(im: &RgbaImage) -> LsResult<Vec<u8>> {
    let (width, height) = im.dimensions();
    let mut image_bytes = Vec::new();
    let encoder = PngEncoder::new(Cursor::new(&mut image_bytes));
    encoder
        .write_image(im, width, height, ExtendedColorType::Rgba8)
        .map_err(|e| LsError::Encode(format!("could not encode png, {e}")))?;
    Ok(image_bytes)
}

pub fn to_data_uri(png_bytes: &[u8]) -> String {
    format!("{PNG_DATA_URI_PREFIX}{}", STANDARD.encode(png_bytes))
}

pub fn from_data_uri(data_uri: &str) -> LsResult<Vec<u8>> {
    let b64 = data_uri
        .strip_prefix(PNG_DATA_URI_PREFIX)
        .ok_or_else(|| LsError::Decode("not a png data uri".into()))?;
    STANDARD
        .decode(b64)
        .map_err(|e| LsError::Decode(format!("invalid base64, {e}")))
}

#[test]
fn test_decode_garbage() {
    let err = decode(b"definitely not an image").unwrap_err();
    assert!(matches!(err, LsError::Decode(_)));
    assert!(decode(&[]).is_err());
}

#[test]
fn test_png_data_uri() {
    let mut im = RgbaImage::new(3, 2);
    im.put_pixel(1, 1, image::Rgba([1, 2, 3, 255]));
    let bytes = encode_png(&im).unwrap();
    let uri = to_data_uri(&bytes);
    assert!(uri.starts_with("data:image/png;base64,iVBOR"));
    let decoded = decode(&from_data_uri(&uri).unwrap()).unwrap();
    assert_eq!(decoded.to_rgba8(), im);
    assert!(from_data_uri("data:image/jpeg;base64,abc").is_err());
}
