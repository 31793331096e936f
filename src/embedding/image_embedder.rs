//! Decoding and embedding of gallery images.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{DynamicImage, ImageReader, RgbImage};

use crate::embedding::extractor::FeatureExtractor;
use crate::error::{LuminaError, Result};
use crate::vector::core::embedding::Embedding;

/// An encoded image to embed.
#[derive(Debug, Clone)]
pub enum ImageInput {
    /// Image file on disk.
    Path(PathBuf),
    /// Encoded image bytes (JPEG, PNG, ...).
    Bytes(Vec<u8>),
}

impl ImageInput {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        ImageInput::Path(path.as_ref().to_path_buf())
    }

    pub fn from_bytes<B: Into<Vec<u8>>>(bytes: B) -> Self {
        ImageInput::Bytes(bytes.into())
    }
}

/// Decode `input` into an 8-bit RGB image. The format is guessed from content.
pub fn decode_image(input: &ImageInput) -> Result<RgbImage> {
    let image = match input {
        ImageInput::Path(path) => ImageReader::open(path)
            .map_err(|e| LuminaError::decode(format!("{}: {e}", path.display())))?
            .with_guessed_format()
            .map_err(|e| LuminaError::decode(format!("{}: {e}", path.display())))?
            .decode()
            .map_err(|e| LuminaError::decode(format!("{}: {e}", path.display())))?,
        ImageInput::Bytes(bytes) => {
            if bytes.is_empty() {
                return Err(LuminaError::decode("empty image payload"));
            }
            ImageReader::new(Cursor::new(bytes.as_slice()))
                .with_guessed_format()
                .map_err(|e| LuminaError::decode(e.to_string()))?
                .decode()
                .map_err(|e| LuminaError::decode(e.to_string()))?
        }
    };

    Ok(match image {
        DynamicImage::ImageRgb8(image) => image,
        image => image.to_rgb8(),
    })
}

/// Produces unit-length embeddings from encoded images.
#[derive(Clone)]
pub struct ImageEmbedder {
    extractor: Arc<dyn FeatureExtractor>,
}

impl std::fmt::Debug for ImageEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageEmbedder")
            .field("extractor", &self.extractor.name())
            .field("dimension", &self.extractor.dimension())
            .finish()
    }
}

impl ImageEmbedder {
    pub fn new(extractor: Arc<dyn FeatureExtractor>) -> Self {
        Self { extractor }
    }

    /// Dimension of the produced embeddings.
    pub fn dimension(&self) -> usize {
        self.extractor.dimension()
    }

    /// Name of the underlying extractor.
    pub fn name(&self) -> &str {
        self.extractor.name()
    }

    /// Decode `input` and embed it.
    pub fn embed(&self, input: &ImageInput) -> Result<Embedding> {
        let image = decode_image(input)?;
        self.embed_image(&image)
    }

    /// Embed an already decoded image.
    ///
    /// The raw features are L2-normalized; all-zero features are returned as
    /// the zero vector.
    pub fn embed_image(&self, image: &RgbImage) -> Result<Embedding> {
        let features = self.extractor.extract(image)?;
        if features.len() != self.extractor.dimension() {
            return Err(LuminaError::dimension_mismatch(
                self.extractor.dimension(),
                features.len(),
            ));
        }

        let embedding = Embedding::normalized(features);
        if !embedding.is_finite() {
            return Err(LuminaError::inference(format!(
                "{} produced non-finite features",
                self.extractor.name()
            )));
        }
        Ok(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use image::{ImageFormat, Rgb};

    struct ChannelSums;

    impl FeatureExtractor for ChannelSums {
        fn extract(&self, image: &RgbImage) -> Result<Vec<f32>> {
            let mut sums = vec![0.0f32; 3];
            for pixel in image.pixels() {
                for (acc, channel) in sums.iter_mut().zip(pixel.0) {
                    *acc += f32::from(channel);
                }
            }
            Ok(sums)
        }

        fn dimension(&self) -> usize {
            3
        }

        fn name(&self) -> &str {
            "channel-sums"
        }
    }

    struct WrongLength;

    impl FeatureExtractor for WrongLength {
        fn extract(&self, _image: &RgbImage) -> Result<Vec<f32>> {
            Ok(vec![1.0; 2])
        }

        fn dimension(&self) -> usize {
            3
        }
    }

    fn png(color: [u8; 3]) -> Vec<u8> {
        let image = RgbImage::from_pixel(4, 4, Rgb(color));
        let mut bytes = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(image)
            .write_to(&mut bytes, ImageFormat::Png)
            .unwrap();
        bytes.into_inner()
    }

    #[test]
    fn test_embed_is_unit_length() {
        let embedder = ImageEmbedder::new(Arc::new(ChannelSums));
        let embedding = embedder
            .embed(&ImageInput::from_bytes(png([200, 30, 10])))
            .unwrap();

        assert_eq!(embedding.dimension(), 3);
        assert!((embedding.norm() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_black_image_yields_zero_vector() {
        let embedder = ImageEmbedder::new(Arc::new(ChannelSums));
        let embedding = embedder
            .embed(&ImageInput::from_bytes(png([0, 0, 0])))
            .unwrap();

        assert!(embedding.is_zero());
    }

    #[test]
    fn test_embed_is_deterministic() {
        let embedder = ImageEmbedder::new(Arc::new(ChannelSums));
        let input = ImageInput::from_bytes(png([12, 140, 90]));

        assert_eq!(embedder.embed(&input).unwrap(), embedder.embed(&input).unwrap());
    }

    #[test]
    fn test_decode_failures() {
        let embedder = ImageEmbedder::new(Arc::new(ChannelSums));

        let garbage = embedder.embed(&ImageInput::from_bytes(b"definitely not an image".to_vec()));
        assert!(matches!(garbage, Err(LuminaError::Decode(_))));

        let empty = embedder.embed(&ImageInput::from_bytes(Vec::new()));
        assert!(matches!(empty, Err(LuminaError::Decode(_))));

        let missing = embedder.embed(&ImageInput::from_path("/nonexistent/image.png"));
        assert!(matches!(missing, Err(LuminaError::Decode(_))));
    }

    #[test]
    fn test_decode_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("red.png");
        std::fs::write(&path, png([255, 0, 0])).unwrap();

        let image = decode_image(&ImageInput::from_path(&path)).unwrap();
        assert_eq!(image.dimensions(), (4, 4));
        assert_eq!(image.get_pixel(0, 0), &Rgb([255, 0, 0]));
    }

    #[test]
    fn test_rejects_wrong_feature_length() {
        let embedder = ImageEmbedder::new(Arc::new(WrongLength));
        let result = embedder.embed(&ImageInput::from_bytes(png([1, 2, 3])));
        assert!(matches!(result, Err(LuminaError::DimensionMismatch { .. })));
    }
}
