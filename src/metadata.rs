//! # EXIF Metadata Extraction Module
//!
//! Questo modulo estrae i metadata di scatto incorporati nei file immagine.
//!
//! ## Responsabilità:
//! - Legge il blocco EXIF direttamente dai bytes (JPEG, TIFF, HEIF, PNG, WebP)
//! - Normalizza i campi derivati in stringhe pronte per la visualizzazione
//! - Non fallisce mai: un file senza EXIF (o corrotto) produce un record vuoto
//!
//! ## Campi derivati:
//! - **Tempo di scatto**: `"1/x"` sotto il secondo, altrimenti secondi decimali
//! - **Apertura**: `"f/<N>"`
//! - **Lunghezza focale**: `"<N>mm"`
//! - **Posizione GPS**: `"lat, long"` con 6 decimali, solo se entrambe presenti
//! - **Data di scatto**: DateTimeOriginal, altrimenti il campo di creazione (DateTimeDigitized)
//!
//! ## Ordine nella pipeline:
//! L'estrazione va eseguita PRIMA di qualsiasi ricompressione: l'encoder JPEG
//! non riscrive il blocco EXIF e i metadata andrebbero persi.

use chrono::NaiveDateTime;
use exif::{Field, In, Reader, Tag, Value};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use tracing::debug;

/// Capture metadata read from an embedded EXIF block. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedMetadata {
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub lens: Option<String>,
    pub aperture: Option<String>,
    pub shutter_speed: Option<String>,
    pub iso: Option<u32>,
    pub focal_length: Option<String>,
    pub location: Option<String>,
    pub captured_at: Option<NaiveDateTime>,
}

impl ExtractedMetadata {
    /// True se nessun campo è stato trovato
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Estrattore EXIF senza stato
pub struct MetadataExtractor;

impl MetadataExtractor {
    /// Extract capture metadata from raw file bytes.
    ///
    /// Never fails: on any parse error an empty record is returned and the
    /// pipeline proceeds.
    pub fn extract(bytes: &[u8]) -> ExtractedMetadata {
        let mut cursor = Cursor::new(bytes);
        match Reader::new().read_from_container(&mut cursor) {
            Ok(exif) => Self::from_fields(exif.fields()),
            Err(e) => {
                debug!("No EXIF data available: {}", e);
                ExtractedMetadata::default()
            }
        }
    }

    /// Costruisce il record dai campi EXIF dell'immagine principale
    pub fn from_fields<'a, I>(fields: I) -> ExtractedMetadata
    where
        I: IntoIterator<Item = &'a Field>,
    {
        let mut summary = ExtractedMetadata::default();
        let mut original: Option<NaiveDateTime> = None;
        let mut digitized: Option<NaiveDateTime> = None;
        let mut lat: Option<f64> = None;
        let mut lat_ref: Option<String> = None;
        let mut lon: Option<f64> = None;
        let mut lon_ref: Option<String> = None;

        for field in fields {
            // Il thumbnail IFD ripete alcuni tag, ci interessa solo l'immagine principale
            if field.ifd_num != In::PRIMARY {
                continue;
            }

            match field.tag {
                Tag::Make => summary.camera_make = exif_string(&field.value),
                Tag::Model => summary.camera_model = exif_string(&field.value),
                Tag::LensModel => summary.lens = exif_string(&field.value),
                Tag::FNumber => summary.aperture = rational_value(&field.value).map(format_aperture),
                Tag::ExposureTime => {
                    summary.shutter_speed = rational_value(&field.value).and_then(format_shutter_speed)
                }
                Tag::PhotographicSensitivity => summary.iso = int_value(&field.value),
                Tag::FocalLength => {
                    summary.focal_length = rational_value(&field.value).map(format_focal_length)
                }
                Tag::DateTimeOriginal => original = parse_exif_datetime(&field.value),
                Tag::DateTimeDigitized => digitized = parse_exif_datetime(&field.value),
                Tag::GPSLatitude => lat = dms_value(&field.value),
                Tag::GPSLatitudeRef => lat_ref = exif_string(&field.value),
                Tag::GPSLongitude => lon = dms_value(&field.value),
                Tag::GPSLongitudeRef => lon_ref = exif_string(&field.value),
                _ => {}
            }
        }

        summary.captured_at = original.or(digitized);

        if let (Some(lat), Some(lon)) = (lat, lon) {
            let lat = apply_reference(lat, lat_ref.as_deref(), "S");
            let lon = apply_reference(lon, lon_ref.as_deref(), "W");
            summary.location = Some(format_location(lat, lon));
        }

        summary
    }
}

/// `"1/x"` sotto il secondo, secondi decimali altrimenti
pub fn format_shutter_speed(seconds: f64) -> Option<String> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return None;
    }

    if seconds < 1.0 {
        Some(format!("1/{}", (1.0 / seconds).round() as u64))
    } else {
        Some(format!("{}", round_one_decimal(seconds)))
    }
}

pub fn format_aperture(f_number: f64) -> String {
    format!("f/{}", round_one_decimal(f_number))
}

pub fn format_focal_length(millimeters: f64) -> String {
    format!("{}mm", round_one_decimal(millimeters))
}

pub fn format_location(latitude: f64, longitude: f64) -> String {
    format!("{:.6}, {:.6}", latitude, longitude)
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn apply_reference(value: f64, reference: Option<&str>, negative: &str) -> f64 {
    match reference {
        Some(r) if r.eq_ignore_ascii_case(negative) => -value.abs(),
        _ => value,
    }
}

fn exif_string(value: &Value) -> Option<String> {
    match value {
        Value::Ascii(values) => values
            .first()
            .and_then(|raw| std::str::from_utf8(raw).ok())
            .map(|s| s.trim_matches('\u{0}').trim().to_string())
            .filter(|s| !s.is_empty()),
        _ => None,
    }
}

fn parse_exif_datetime(value: &Value) -> Option<NaiveDateTime> {
    let raw = exif_string(value)?;
    NaiveDateTime::parse_from_str(&raw, "%Y:%m:%d %H:%M:%S").ok()
}

fn rational_value(value: &Value) -> Option<f64> {
    let v = match value {
        Value::Rational(values) => values.first().map(|r| r.to_f64()),
        Value::SRational(values) => values.first().map(|r| r.to_f64()),
        _ => None,
    }?;
    v.is_finite().then_some(v)
}

fn int_value(value: &Value) -> Option<u32> {
    match value {
        Value::Short(values) => values.first().map(|v| *v as u32),
        Value::Long(values) => values.first().copied(),
        _ => None,
    }
}

/// Gradi/minuti/secondi -> gradi decimali
fn dms_value(value: &Value) -> Option<f64> {
    match value {
        Value::Rational(values) if values.len() >= 3 => {
            let degrees = values[0].to_f64();
            let minutes = values[1].to_f64();
            let seconds = values[2].to_f64();
            let decimal = degrees + minutes / 60.0 + seconds / 3600.0;
            decimal.is_finite().then_some(decimal)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exif::Rational;

    fn field(tag: Tag, value: Value) -> Field {
        Field {
            tag,
            ifd_num: In::PRIMARY,
            value,
        }
    }

    fn ascii(s: &str) -> Value {
        Value::Ascii(vec![s.as_bytes().to_vec()])
    }

    fn rational(num: u32, denom: u32) -> Value {
        Value::Rational(vec![Rational { num, denom }])
    }

    fn dms(deg: u32, min: u32, sec_x100: u32) -> Value {
        Value::Rational(vec![
            Rational { num: deg, denom: 1 },
            Rational { num: min, denom: 1 },
            Rational { num: sec_x100, denom: 100 },
        ])
    }

    #[test]
    fn test_garbage_bytes_yield_empty_record() {
        let metadata = MetadataExtractor::extract(b"definitely not an image");
        assert!(metadata.is_empty());

        let metadata = MetadataExtractor::extract(&[]);
        assert!(metadata.is_empty());
    }

    #[test]
    fn test_png_without_exif_yields_empty_record() {
        let img = image::RgbImage::from_pixel(4, 4, image::Rgb([10, 20, 30]));
        let mut png = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut png), image::ImageOutputFormat::Png)
            .unwrap();

        assert!(MetadataExtractor::extract(&png).is_empty());
    }

    /// JPEG decodificabile con un segmento APP1 EXIF subito dopo SOI
    fn jpeg_with_exif(fields: &[Field]) -> Vec<u8> {
        let mut writer = exif::experimental::Writer::new();
        for field in fields {
            writer.push_field(field);
        }
        let mut tiff = Cursor::new(Vec::new());
        writer.write(&mut tiff, false).unwrap();
        let tiff = tiff.into_inner();

        let mut jpeg = Vec::new();
        image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(8, 8, image::Rgb([90, 120, 150])))
            .write_to(&mut Cursor::new(&mut jpeg), image::ImageOutputFormat::Jpeg(90))
            .unwrap();

        let segment_len = (2 + 6 + tiff.len()) as u16;
        let mut out = vec![0xFF, 0xD8, 0xFF, 0xE1];
        out.extend_from_slice(&segment_len.to_be_bytes());
        out.extend_from_slice(b"Exif\0\0");
        out.extend_from_slice(&tiff);
        out.extend_from_slice(&jpeg[2..]);
        out
    }

    #[test]
    fn test_extract_reads_exif_from_jpeg() {
        let fields = vec![
            field(Tag::Make, ascii("NIKON CORPORATION")),
            field(Tag::Model, ascii("Z 6")),
            field(Tag::ExposureTime, rational(1, 125)),
            field(Tag::FNumber, rational(56, 10)),
            field(Tag::DateTimeOriginal, ascii("2022:07:14 18:42:05")),
            field(Tag::GPSLatitudeRef, ascii("N")),
            field(Tag::GPSLatitude, dms(41, 54, 0)),
            field(Tag::GPSLongitudeRef, ascii("E")),
            field(Tag::GPSLongitude, dms(12, 30, 0)),
        ];
        let bytes = jpeg_with_exif(&fields);
        assert!(image::load_from_memory(&bytes).is_ok());

        let metadata = MetadataExtractor::extract(&bytes);
        assert_eq!(metadata.camera_make.as_deref(), Some("NIKON CORPORATION"));
        assert_eq!(metadata.camera_model.as_deref(), Some("Z 6"));
        assert_eq!(metadata.shutter_speed.as_deref(), Some("1/125"));
        assert_eq!(metadata.aperture.as_deref(), Some("f/5.6"));
        assert_eq!(metadata.location.as_deref(), Some("41.900000, 12.500000"));
        let expected = NaiveDateTime::parse_from_str("2022-07-14 18:42:05", "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(metadata.captured_at, Some(expected));
    }

    #[test]
    fn test_camera_fields_are_normalized() {
        let fields = vec![
            field(Tag::Make, ascii("FUJIFILM\0")),
            field(Tag::Model, ascii("X-T4")),
            field(Tag::LensModel, ascii("XF23mmF1.4 R")),
            field(Tag::FNumber, rational(28, 10)),
            field(Tag::ExposureTime, rational(1, 250)),
            field(Tag::PhotographicSensitivity, Value::Short(vec![400])),
            field(Tag::FocalLength, rational(23, 1)),
        ];

        let metadata = MetadataExtractor::from_fields(&fields);
        assert_eq!(metadata.camera_make.as_deref(), Some("FUJIFILM"));
        assert_eq!(metadata.camera_model.as_deref(), Some("X-T4"));
        assert_eq!(metadata.lens.as_deref(), Some("XF23mmF1.4 R"));
        assert_eq!(metadata.aperture.as_deref(), Some("f/2.8"));
        assert_eq!(metadata.shutter_speed.as_deref(), Some("1/250"));
        assert_eq!(metadata.iso, Some(400));
        assert_eq!(metadata.focal_length.as_deref(), Some("23mm"));
        assert!(metadata.location.is_none());
    }

    #[test]
    fn test_shutter_speed_formatting() {
        assert_eq!(format_shutter_speed(1.0 / 60.0).as_deref(), Some("1/60"));
        assert_eq!(format_shutter_speed(0.3).as_deref(), Some("1/3"));
        assert_eq!(format_shutter_speed(1.0).as_deref(), Some("1"));
        assert_eq!(format_shutter_speed(2.5).as_deref(), Some("2.5"));
        assert_eq!(format_shutter_speed(0.0), None);
    }

    #[test]
    fn test_gps_requires_both_coordinates() {
        let only_lat = vec![
            field(Tag::GPSLatitude, dms(45, 30, 0)),
            field(Tag::GPSLatitudeRef, ascii("N")),
        ];
        assert!(MetadataExtractor::from_fields(&only_lat).location.is_none());

        let both = vec![
            field(Tag::GPSLatitude, dms(45, 30, 0)),
            field(Tag::GPSLatitudeRef, ascii("N")),
            field(Tag::GPSLongitude, dms(9, 11, 2400)),
            field(Tag::GPSLongitudeRef, ascii("W")),
        ];
        let metadata = MetadataExtractor::from_fields(&both);
        assert_eq!(metadata.location.as_deref(), Some("45.500000, -9.190000"));
    }

    #[test]
    fn test_capture_time_prefers_original() {
        let fields = vec![
            field(Tag::DateTimeDigitized, ascii("2023:01:02 10:00:00")),
            field(Tag::DateTimeOriginal, ascii("2023:01:01 09:30:15")),
        ];
        let metadata = MetadataExtractor::from_fields(&fields);
        let expected = NaiveDateTime::parse_from_str("2023-01-01 09:30:15", "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(metadata.captured_at, Some(expected));

        let fallback = vec![field(Tag::DateTimeDigitized, ascii("2023:01:02 10:00:00"))];
        let metadata = MetadataExtractor::from_fields(&fallback);
        assert!(metadata.captured_at.is_some());
    }

    #[test]
    fn test_thumbnail_fields_are_ignored() {
        let fields = vec![Field {
            tag: Tag::Make,
            ifd_num: In::THUMBNAIL,
            value: ascii("Thumb"),
        }];
        assert!(MetadataExtractor::from_fields(&fields).is_empty());
    }
}
