//! Limpieza e inspección de metadata en imágenes.

use image::codecs::pnm::{PnmEncoder, PnmSubtype, SampleEncoding};
use image::{DynamicImage, ExtendedColorType, ImageBuffer, ImageDecoder, ImageFormat, ImageReader};
use std::io::{Cursor, Read, Seek};
use tracing::{debug, warn};

use crate::classify::Family;
use crate::error::CleanError;
use crate::file::{MetadataReport, read_from_start};

/// Reconstruye la imagen solo con su matriz de píxeles y la codifica de nuevo.
///
/// EXIF, perfiles ICC y bloques de texto se descartan siempre: la imagen nueva no
/// hereda nada de la original salvo dimensiones, modo de color y píxeles.
pub fn strip_image<R: Read + Seek>(reader: &mut R, format_tag: &str) -> Result<Vec<u8>, CleanError> {
    strip_image_inner(reader, format_tag).map_err(|e| {
        warn!(format = format_tag, error = %e, "no se pudo limpiar la imagen");
        CleanError::Processing(Family::Image)
    })
}

fn strip_image_inner<R: Read + Seek>(reader: &mut R, format_tag: &str) -> Result<Vec<u8>, String> {
    let format = image_format(format_tag)
        .ok_or_else(|| format!("formato de imagen sin códec disponible: {format_tag}"))?;
    let contents = read_from_start(reader).map_err(|e| format!("No se pudo leer la imagen: {e}"))?;

    let reader = content_reader(&contents, format)
        .map_err(|e| format!("No se pudo leer la imagen: {e}"))?;
    let detected = reader.format();
    let original = reader
        .decode()
        .map_err(|e| format!("No se pudo decodificar la imagen: {e}"))?;
    debug!(
        width = original.width(),
        height = original.height(),
        color = ?original.color(),
        detected = ?detected,
        "imagen decodificada"
    );

    let cleaned = rebuild_from_pixels(&original)
        .ok_or_else(|| format!("modo de color no soportado: {:?}", original.color()))?;

    let mut output = Vec::new();
    let written = match pnm_subtype(format_tag) {
        Some(subtype) => encode_pnm(&cleaned, subtype, &mut output),
        None => fit_to_encoder(cleaned, format).write_to(&mut Cursor::new(&mut output), format),
    };
    written.map_err(|e| format!("No se pudo guardar la imagen limpia: {e}"))?;
    Ok(output)
}

/// Lector que elige el decodificador por los bytes; el formato del nombre solo se usa
/// cuando el contenido no tiene firma reconocible (TGA, por ejemplo).
fn content_reader(contents: &[u8], fallback: ImageFormat) -> std::io::Result<ImageReader<Cursor<&[u8]>>> {
    let mut reader = ImageReader::new(Cursor::new(contents)).with_guessed_format()?;
    if reader.format().is_none() {
        reader.set_format(fallback);
    }
    Ok(reader)
}

/// Ajusta el modo de color a lo que acepta el codificador de destino.
fn fit_to_encoder(image: DynamicImage, format: ImageFormat) -> DynamicImage {
    if format != ImageFormat::Jpeg {
        return image;
    }
    match image {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => image,
        DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLuma16(_) | DynamicImage::ImageLumaA16(_) => {
            DynamicImage::ImageLuma8(image.to_luma8())
        }
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

fn pnm_subtype(format_tag: &str) -> Option<PnmSubtype> {
    match format_tag.to_lowercase().as_str() {
        "pbm" => Some(PnmSubtype::Bitmap(SampleEncoding::Binary)),
        "pgm" => Some(PnmSubtype::Graymap(SampleEncoding::Binary)),
        "ppm" => Some(PnmSubtype::Pixmap(SampleEncoding::Binary)),
        _ => None,
    }
}

/// Escribe la variante PNM que corresponde a la extensión en lugar de la cabecera genérica.
fn encode_pnm(image: &DynamicImage, subtype: PnmSubtype, output: &mut Vec<u8>) -> image::ImageResult<()> {
    let (width, height) = (image.width(), image.height());
    let mut encoder = PnmEncoder::new(output).with_subtype(subtype);
    match subtype {
        PnmSubtype::Bitmap(_) => {
            let luma = image.to_luma8();
            // El decodificador PBM entrega 0 y 1; cualquier otra fuente se umbraliza.
            let samples: Vec<u8> = if luma.as_raw().iter().all(|&v| v <= 1) {
                luma.into_raw()
            } else {
                luma.as_raw().iter().map(|&v| u8::from(v >= 128)).collect()
            };
            encoder.encode(samples.as_slice(), width, height, ExtendedColorType::L8)
        }
        PnmSubtype::Graymap(_) => match image {
            DynamicImage::ImageLuma16(buffer) => {
                encoder.encode(buffer.as_raw().as_slice(), width, height, ExtendedColorType::L16)
            }
            other => encoder.encode(other.to_luma8().as_raw().as_slice(), width, height, ExtendedColorType::L8),
        },
        _ => encoder.encode(image.to_rgb8().as_raw().as_slice(), width, height, ExtendedColorType::Rgb8),
    }
}

/// Devuelve EXIF, bloques de texto PNG y presencia de perfil ICC tal como los exponen los decodificadores.
pub fn inspect_image<R: Read + Seek>(reader: &mut R, format_tag: &str) -> MetadataReport {
    let Some(format) = image_format(format_tag) else {
        return MetadataReport::error(format!("Image format {format_tag} cannot be read."));
    };
    let contents = match read_from_start(reader) {
        Ok(contents) => contents,
        Err(e) => {
            warn!(error = %e, "no se pudo leer la imagen");
            return MetadataReport::error("Error reading image file.");
        }
    };

    let mut entries: Vec<(String, String)> = Vec::new();

    let reader = match content_reader(&contents, format) {
        Ok(reader) => reader,
        Err(e) => {
            warn!(error = %e, "no se pudo leer la imagen");
            return MetadataReport::error("Error reading image file.");
        }
    };
    let detected = reader.format().unwrap_or(format);

    match reader.into_decoder() {
        Ok(mut decoder) => match decoder.icc_profile() {
            Ok(Some(profile)) => {
                entries.push(("icc_profile".into(), format!("{} bytes", profile.len())));
            }
            Ok(None) => {}
            Err(e) => debug!(error = %e, "perfil ICC ilegible"),
        },
        Err(e) => {
            warn!(format = format_tag, error = %e, "no se pudo decodificar la imagen");
            return MetadataReport::error("Error reading image file.");
        }
    }

    entries.extend(exif_entries(&contents));
    if detected == ImageFormat::Png {
        entries.extend(png_text_entries(&contents));
    }

    MetadataReport::from_entries(entries)
}

fn exif_entries(contents: &[u8]) -> Vec<(String, String)> {
    let mut cursor = Cursor::new(contents);
    let exif = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(exif) => exif,
        Err(exif::Error::NotFound(_)) | Err(exif::Error::BlankValue(_)) => return Vec::new(),
        Err(e) => {
            debug!(error = %e, "EXIF ilegible");
            return Vec::new();
        }
    };

    exif.fields()
        .map(|field| {
            let key = match field.ifd_num {
                exif::In::PRIMARY => field.tag.to_string(),
                exif::In::THUMBNAIL => format!("Thumbnail.{}", field.tag),
                other => format!("IFD{}.{}", other.index(), field.tag),
            };
            let value = field.display_value().with_unit(&exif).to_string();
            (key, value)
        })
        .collect()
}

fn png_text_entries(contents: &[u8]) -> Vec<(String, String)> {
    let decoder = png::Decoder::new(Cursor::new(contents));
    let reader = match decoder.read_info() {
        Ok(reader) => reader,
        Err(e) => {
            debug!(error = %e, "no se pudieron leer los bloques PNG");
            return Vec::new();
        }
    };
    let info = reader.info();

    let mut entries = Vec::new();
    for chunk in &info.uncompressed_latin1_text {
        entries.push((chunk.keyword.clone(), chunk.text.clone()));
    }
    for chunk in &info.compressed_latin1_text {
        if let Ok(text) = chunk.get_text() {
            entries.push((chunk.keyword.clone(), text));
        }
    }
    for chunk in &info.utf8_text {
        if let Ok(text) = chunk.get_text() {
            entries.push((chunk.keyword.clone(), text));
        }
    }
    entries
}

fn image_format(format_tag: &str) -> Option<ImageFormat> {
    match format_tag.to_lowercase().as_str() {
        "jfif" => Some(ImageFormat::Jpeg),
        "ppm" | "pgm" | "pbm" | "pnm" => Some(ImageFormat::Pnm),
        other => ImageFormat::from_extension(other),
    }
}

/// Copia la matriz de píxeles en un búfer nuevo del mismo modo de color.
fn rebuild_from_pixels(image: &DynamicImage) -> Option<DynamicImage> {
    macro_rules! copy_pixels {
        ($buffer:expr, $variant:path) => {{
            let (width, height) = $buffer.dimensions();
            ImageBuffer::from_raw(width, height, $buffer.as_raw().clone()).map($variant)
        }};
    }

    match image {
        DynamicImage::ImageLuma8(buffer) => copy_pixels!(buffer, DynamicImage::ImageLuma8),
        DynamicImage::ImageLumaA8(buffer) => copy_pixels!(buffer, DynamicImage::ImageLumaA8),
        DynamicImage::ImageRgb8(buffer) => copy_pixels!(buffer, DynamicImage::ImageRgb8),
        DynamicImage::ImageRgba8(buffer) => copy_pixels!(buffer, DynamicImage::ImageRgba8),
        DynamicImage::ImageLuma16(buffer) => copy_pixels!(buffer, DynamicImage::ImageLuma16),
        DynamicImage::ImageLumaA16(buffer) => copy_pixels!(buffer, DynamicImage::ImageLumaA16),
        DynamicImage::ImageRgb16(buffer) => copy_pixels!(buffer, DynamicImage::ImageRgb16),
        DynamicImage::ImageRgba16(buffer) => copy_pixels!(buffer, DynamicImage::ImageRgba16),
        DynamicImage::ImageRgb32F(buffer) => copy_pixels!(buffer, DynamicImage::ImageRgb32F),
        DynamicImage::ImageRgba32F(buffer) => copy_pixels!(buffer, DynamicImage::ImageRgba32F),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_with_text(width: u32, height: u32) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let pixels: Vec<u8> = (0..width * height * 3).map(|i| (i * 7 % 251) as u8).collect();
        let mut output = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut output, width, height);
            encoder.set_color(png::ColorType::Rgb);
            encoder.set_depth(png::BitDepth::Eight);
            encoder.add_text_chunk("Author".to_string(), "Alice".to_string())?;
            encoder.add_text_chunk("Comment".to_string(), "Ubicacion secreta".to_string())?;
            let mut writer = encoder.write_header()?;
            writer.write_image_data(&pixels)?;
        }
        Ok(output)
    }

    #[test]
    fn inspect_reports_png_text_chunks() -> Result<(), Box<dyn std::error::Error>> {
        let source = png_with_text(4, 3)?;
        let report = inspect_image(&mut Cursor::new(source), "PNG");
        let metadata = report.metadata().ok_or("se esperaba metadata")?;
        assert_eq!(metadata.get("Author").map(String::as_str), Some("Alice"));
        assert!(metadata.contains_key("Comment"));
        Ok(())
    }

    #[test]
    fn strip_keeps_pixels_and_drops_text() -> Result<(), Box<dyn std::error::Error>> {
        let source = png_with_text(5, 4)?;
        let cleaned = strip_image(&mut Cursor::new(source.clone()), "PNG")?;

        let before = image::load_from_memory_with_format(&source, ImageFormat::Png)?;
        let after = image::load_from_memory_with_format(&cleaned, ImageFormat::Png)?;
        assert_eq!((before.width(), before.height()), (after.width(), after.height()));
        assert_eq!(before.color(), after.color());
        assert_eq!(before.as_bytes(), after.as_bytes());

        let report = inspect_image(&mut Cursor::new(cleaned), "PNG");
        assert_eq!(report.metadata().map(|m| m.len()), Some(0));
        Ok(())
    }

    #[test]
    fn strip_round_trips_bmp() -> Result<(), Box<dyn std::error::Error>> {
        let original = DynamicImage::ImageRgb8(ImageBuffer::from_fn(3, 2, |x, y| {
            image::Rgb([x as u8 * 40, y as u8 * 90, 7])
        }));
        let mut source = Vec::new();
        original.write_to(&mut Cursor::new(&mut source), ImageFormat::Bmp)?;

        let cleaned = strip_image(&mut Cursor::new(source), "BMP")?;
        let decoded = image::load_from_memory_with_format(&cleaned, ImageFormat::Bmp)?;
        assert_eq!(decoded.to_rgb8().as_raw(), original.to_rgb8().as_raw());
        Ok(())
    }

    #[test]
    fn undecodable_bytes_fail_with_500() {
        let result = strip_image(&mut Cursor::new(b"not an image".to_vec()), "JPEG");
        let err = result.expect_err("los bytes basura no deberían decodificarse");
        assert_eq!(err, CleanError::Processing(Family::Image));
        assert_eq!(err.to_string(), "Error processing image file.");
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn mislabeled_png_is_decoded_by_content() -> Result<(), Box<dyn std::error::Error>> {
        let source = png_with_text(4, 4)?;
        let cleaned = strip_image(&mut Cursor::new(source.clone()), "JPEG")?;
        assert!(cleaned.starts_with(&[0xFF, 0xD8]));
        assert!(!cleaned.windows(5).any(|w| w == b"Alice"));

        let decoded = image::load_from_memory_with_format(&cleaned, ImageFormat::Jpeg)?;
        assert_eq!((decoded.width(), decoded.height()), (4, 4));

        let report = inspect_image(&mut Cursor::new(source), "JPEG");
        let metadata = report.metadata().ok_or("se esperaba metadata")?;
        assert_eq!(metadata.get("Author").map(String::as_str), Some("Alice"));
        Ok(())
    }

    #[test]
    fn netpbm_variants_keep_their_subtype() -> Result<(), Box<dyn std::error::Error>> {
        let mut bitmap = b"P4\n# escaneo\n8 2\n".to_vec();
        bitmap.extend_from_slice(&[0b1010_0000, 0b0000_1111]);
        let cleaned = strip_image(&mut Cursor::new(bitmap.clone()), "PBM")?;
        assert!(cleaned.starts_with(b"P4"));
        assert!(!cleaned.windows(7).any(|w| w == b"escaneo"));
        let before = image::load_from_memory_with_format(&bitmap, ImageFormat::Pnm)?;
        let after = image::load_from_memory_with_format(&cleaned, ImageFormat::Pnm)?;
        assert_eq!(before.to_luma8().as_raw(), after.to_luma8().as_raw());

        let mut graymap = b"P5\n2 2\n255\n".to_vec();
        graymap.extend_from_slice(&[0, 80, 160, 255]);
        let cleaned = strip_image(&mut Cursor::new(graymap), "PGM")?;
        assert!(cleaned.starts_with(b"P5"));
        let after = image::load_from_memory_with_format(&cleaned, ImageFormat::Pnm)?;
        assert_eq!(after.to_luma8().as_raw(), &[0, 80, 160, 255]);

        let mut pixmap = b"P6\n1 1\n255\n".to_vec();
        pixmap.extend_from_slice(&[10, 20, 30]);
        let cleaned = strip_image(&mut Cursor::new(pixmap), "PPM")?;
        assert!(cleaned.starts_with(b"P6"));
        Ok(())
    }

    #[test]
    fn formats_without_codec_fail() {
        let result = strip_image(&mut Cursor::new(vec![0_u8; 16]), "XPM");
        assert_eq!(result, Err(CleanError::Processing(Family::Image)));
    }
}
