//! Robustness tests for raster embeddings.
//!
//! These tests verify that embeddings keep their invariants for any decodable
//! image and stay close under re-encoding and resizing, which is how the same
//! radiograph typically reaches the service twice.

use image::{DynamicImage, GenericImageView, ImageBuffer, ImageFormat, Rgb, RgbImage};
use raiox_core::{Embedding, ImageEmbedder, RaioxError, RasterEmbedder, EMBEDDING_DIM};
use std::io::Cursor;

/// Maximum cosine distance for re-encoded or resized copies of one image.
const SAME_IMAGE_DISTANCE: f64 = 0.05;

/// Create a test image with recognizable structure: gradients plus a
/// checkerboard standing in for implant threads.
fn create_test_image(width: u32, height: u32) -> RgbImage {
    let mut img = ImageBuffer::new(width, height);

    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let r = ((x as f32 / width as f32) * 255.0) as u8;
        let g = ((y as f32 / height as f32) * 255.0) as u8;
        let b = (((x + y) as f32 / (width + height) as f32) * 200.0) as u8;

        let pattern = if (x / 20 + y / 20) % 2 == 0 { 30 } else { 0 };
        *pixel = Rgb([r.saturating_add(pattern), g, b]);
    }

    img
}

fn encode(img: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, format).expect("encoding failed");
    buffer.into_inner()
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality);
    img.write_with_encoder(encoder).expect("JPEG encoding failed");
    buffer.into_inner()
}

fn resize_image(img: &DynamicImage, percentage: u32) -> DynamicImage {
    let (width, height) = img.dimensions();
    img.resize_exact(
        (width * percentage) / 100,
        (height * percentage) / 100,
        image::imageops::FilterType::Lanczos3,
    )
}

fn embed(bytes: &[u8]) -> Embedding {
    RasterEmbedder::new().embed(bytes).expect("embedding failed")
}

fn assert_unit(embedding: &Embedding) {
    assert_eq!(embedding.len(), EMBEDDING_DIM);
    assert!(
        (embedding.norm() - 1.0).abs() < 1e-4,
        "norm was {}",
        embedding.norm()
    );
}

#[test]
fn test_invariants_across_sizes_and_formats() {
    for (w, h) in [(1, 1), (7, 300), (64, 64), (400, 300), (1024, 17)] {
        let img = DynamicImage::ImageRgb8(create_test_image(w, h));
        for format in [ImageFormat::Png, ImageFormat::Jpeg] {
            let bytes = if format == ImageFormat::Jpeg {
                encode_jpeg(&img, 90)
            } else {
                encode(&img, format)
            };
            assert_unit(&embed(&bytes));
        }
    }
}

#[test]
fn test_grayscale_and_color_inputs() {
    let color = DynamicImage::ImageRgb8(create_test_image(200, 160));
    let gray = DynamicImage::ImageLuma8(color.to_luma8());

    let e_color = embed(&encode(&color, ImageFormat::Png));
    let e_gray = embed(&encode(&gray, ImageFormat::Png));

    assert!(e_color.cosine_distance(&e_gray) < 1e-3);
}

#[test]
fn test_jpeg_compression_robustness() {
    let original = DynamicImage::ImageRgb8(create_test_image(400, 300));
    let reference = embed(&encode(&original, ImageFormat::Png));

    for quality in [95, 75, 50] {
        let compressed = embed(&encode_jpeg(&original, quality));
        let distance = reference.cosine_distance(&compressed);
        println!("JPEG Q{quality}: distance = {distance:.6}");
        assert!(distance < SAME_IMAGE_DISTANCE, "JPEG Q{quality} drifted: {distance}");
    }
}

#[test]
fn test_resize_robustness() {
    let original = DynamicImage::ImageRgb8(create_test_image(400, 300));
    let reference = embed(&encode(&original, ImageFormat::Png));

    for percentage in [50, 150] {
        let resized = embed(&encode(&resize_image(&original, percentage), ImageFormat::Png));
        let distance = reference.cosine_distance(&resized);
        println!("Resize {percentage}%: distance = {distance:.6}");
        assert!(distance < SAME_IMAGE_DISTANCE, "resize {percentage}% drifted: {distance}");
    }
}

#[test]
fn test_transformed_copy_closer_than_different_image() {
    let original = DynamicImage::ImageRgb8(create_test_image(400, 300));
    let reference = embed(&encode(&original, ImageFormat::Png));

    let compressed = embed(&encode_jpeg(&original, 75));
    let rotated = embed(&encode(&original.rotate180(), ImageFormat::Png));

    assert!(reference.cosine_distance(&compressed) < reference.cosine_distance(&rotated));
}

#[test]
fn test_truncated_file_is_decode_error() {
    let original = DynamicImage::ImageRgb8(create_test_image(64, 64));
    let bytes = encode(&original, ImageFormat::Png);

    let err = RasterEmbedder::new().embed(&bytes[..bytes.len() / 3]).unwrap_err();
    assert!(matches!(err, RaioxError::DecodeError(_)), "got {err:?}");
}

#[test]
fn test_concurrent_embedding_matches_sequential() {
    let embedder = std::sync::Arc::new(RasterEmbedder::new());
    let bytes = std::sync::Arc::new(encode(
        &DynamicImage::ImageRgb8(create_test_image(128, 96)),
        ImageFormat::Png,
    ));
    let expected = embedder.embed(&bytes).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let embedder = embedder.clone();
            let bytes = bytes.clone();
            std::thread::spawn(move || embedder.embed(&bytes).unwrap())
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), expected);
    }
}
