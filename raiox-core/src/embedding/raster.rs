//! Grid descriptor embeddings computed directly from pixels.
//!
//! # Algorithm
//!
//! The image is decoded, converted to 8-bit luma and reduced twice:
//!
//! 1. a `GRID_SIZE` x `GRID_SIZE` area-averaged resample, whose intensities
//!    (scaled to `[0, 1]`) form the first half of the descriptor;
//! 2. a `(GRID_SIZE + 1)` x `(GRID_SIZE + 1)` resample, from which forward
//!    differences give a gradient magnitude per cell for the second half.
//!
//! Every component is offset by [`FEATURE_BIAS`] and the concatenation of
//! `2 * GRID_SIZE^2` = [`EMBEDDING_DIM`] components is L2-normalized. The bias
//! keeps the norm positive, so a uniformly black image still embeds. Intensity captures the radiopaque silhouette of an implant,
//! gradients capture thread and edge structure.

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};

use super::{Embedding, ImageEmbedder, EMBEDDING_DIM};
use crate::error::{RaioxError, Result};

/// Cells per side of the descriptor grid.
pub const GRID_SIZE: u32 = 16;

/// Offset added to every feature before normalization (one 8-bit gray level).
pub const FEATURE_BIAS: f32 = 1.0 / 255.0;

const CELLS: usize = (GRID_SIZE * GRID_SIZE) as usize;

const MODEL_ID: &str = "raster-grid-16";

/// Pixel grid embedder backed by the `image` crate.
#[derive(Debug, Clone, Default)]
pub struct RasterEmbedder;

impl RasterEmbedder {
    pub fn new() -> Self {
        Self
    }

    /// Embed an already decoded image.
    pub fn embed_image(&self, image: &DynamicImage) -> Result<Embedding> {
        if image.width() == 0 || image.height() == 0 {
            return Err(RaioxError::DecodeError("image has no pixels".into()));
        }

        let luma = image.to_luma8();

        let mut features = Vec::with_capacity(EMBEDDING_DIM);
        features.extend(intensity_grid(&luma));
        features.extend(gradient_grid(&luma));
        for v in features.iter_mut() {
            *v += FEATURE_BIAS;
        }

        Embedding::from_features(features).map_err(|e| match e {
            RaioxError::ModelError(reason) => {
                RaioxError::ModelError(format!("{MODEL_ID}: {reason}"))
            }
            other => other,
        })
    }
}

impl ImageEmbedder for RasterEmbedder {
    fn embed(&self, image_bytes: &[u8]) -> Result<Embedding> {
        let image = image::load_from_memory(image_bytes)
            .map_err(|e| RaioxError::DecodeError(format!("Failed to decode image: {e}")))?;

        let embedding = self.embed_image(&image)?;

        tracing::debug!(
            model = MODEL_ID,
            width = image.width(),
            height = image.height(),
            "Embedding computed"
        );

        Ok(embedding)
    }

    fn model_id(&self) -> &str {
        MODEL_ID
    }
}

fn intensity_grid(luma: &GrayImage) -> Vec<f32> {
    let grid = image::imageops::resize(luma, GRID_SIZE, GRID_SIZE, FilterType::Triangle);
    grid.pixels().map(|p| f32::from(p.0[0]) / 255.0).collect()
}

fn gradient_grid(luma: &GrayImage) -> Vec<f32> {
    let side = GRID_SIZE + 1;
    let grid = image::imageops::resize(luma, side, side, FilterType::Triangle);
    let at = |x: u32, y: u32| f32::from(grid.get_pixel(x, y).0[0]) / 255.0;

    let mut out = Vec::with_capacity(CELLS);
    for y in 0..GRID_SIZE {
        for x in 0..GRID_SIZE {
            let gx = at(x + 1, y) - at(x, y);
            let gy = at(x, y + 1) - at(x, y);
            out.push((gx * gx + gy * gy).sqrt());
        }
    }
    out
}
