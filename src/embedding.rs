//! Image embedding support.
//!
//! An [`ImageEmbedder`] turns encoded image bytes into a unit-length
//! [`Embedding`](crate::vector::Embedding). The heavy lifting is delegated to
//! a [`FeatureExtractor`], which maps a decoded RGB image to raw features.
//!
//! # Feature Flags
//!
//! - `embeddings-candle` - CLIP vision transformer run locally with
//!   HuggingFace Candle ([`CandleImageExtractor`])
//!
//! Without a model backend the library still works as an index: vectors can be
//! inserted and searched directly through
//! [`VectorIndexStore`](crate::vector::VectorIndexStore).
//!
//! # Custom Implementation
//!
//! ```
//! use image::RgbImage;
//! use lumina::embedding::FeatureExtractor;
//! use lumina::error::Result;
//!
//! struct MeanColor;
//!
//! impl FeatureExtractor for MeanColor {
//!     fn extract(&self, image: &RgbImage) -> Result<Vec<f32>> {
//!         let mut sum = [0.0f32; 3];
//!         for pixel in image.pixels() {
//!             for (acc, channel) in sum.iter_mut().zip(pixel.0) {
//!                 *acc += f32::from(channel);
//!             }
//!         }
//!         Ok(sum.to_vec())
//!     }
//!
//!     fn dimension(&self) -> usize {
//!         3
//!     }
//! }
//! ```

pub mod extractor;
pub mod image_embedder;

#[cfg(feature = "embeddings-candle")]
pub mod candle_image_extractor;

pub use extractor::FeatureExtractor;
pub use image_embedder::{ImageEmbedder, ImageInput, decode_image};

#[cfg(feature = "embeddings-candle")]
pub use candle_image_extractor::CandleImageExtractor;
