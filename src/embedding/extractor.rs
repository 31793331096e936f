//! Visual feature extractor trait.

use image::RgbImage;

use crate::error::Result;

/// Maps a decoded image to a raw feature vector.
///
/// Implementations are expected to be deterministic for a given model and
/// may be slow, so callers run them off the async executor.
pub trait FeatureExtractor: Send + Sync {
    /// Raw, unnormalized features of `image`.
    ///
    /// The returned vector must have [`FeatureExtractor::dimension`] entries.
    fn extract(&self, image: &RgbImage) -> Result<Vec<f32>>;

    /// Number of features produced per image.
    fn dimension(&self) -> usize;

    /// Get the name/identifier of this extractor.
    ///
    /// This is useful for logging and debugging purposes.
    fn name(&self) -> &str {
        "unknown"
    }
}
