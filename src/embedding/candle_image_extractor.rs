//! CLIP vision transformer run locally with HuggingFace Candle.
//!
//! Requires the `embeddings-candle` feature to be enabled.

use candle_core::{DType, Device, Module, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::clip;
use hf_hub::api::sync::ApiBuilder;
use image::RgbImage;
use image::imageops::{self, FilterType};
use log::info;

use crate::embedding::extractor::FeatureExtractor;
use crate::error::{LuminaError, Result};

const CLIP_MEAN: [f32; 3] = [0.48145466, 0.4578275, 0.40821073];
const CLIP_STD: [f32; 3] = [0.2686295, 0.2613026, 0.2757771];

/// Image feature extractor backed by the CLIP ViT-B/32 vision tower.
///
/// Features are the pooled output of the vision transformer (the
/// layer-normalized class token), taken before the projection into the joint
/// text/image space. For `openai/clip-vit-base-patch32` that gives 768 values.
///
/// Vectors from different models are not comparable, so an index must be
/// rebuilt when the model changes.
///
/// # Examples
///
/// ```no_run
/// use lumina::embedding::{CandleImageExtractor, FeatureExtractor};
///
/// # fn example() -> lumina::error::Result<()> {
/// let extractor = CandleImageExtractor::new("openai/clip-vit-base-patch32")?;
/// assert_eq!(extractor.dimension(), 768);
/// # Ok(())
/// # }
/// ```
pub struct CandleImageExtractor {
    vision_model: clip::vision_model::ClipVisionTransformer,
    device: Device,
    dimension: usize,
    image_size: usize,
    model_name: String,
}

impl std::fmt::Debug for CandleImageExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandleImageExtractor")
            .field("model_name", &self.model_name)
            .field("dimension", &self.dimension)
            .field("image_size", &self.image_size)
            .finish()
    }
}

fn model_error<E: std::fmt::Display>(context: &str) -> impl FnOnce(E) -> LuminaError + '_ {
    move |e| LuminaError::model_unavailable(format!("{context}: {e}"))
}

fn inference_error(e: candle_core::Error) -> LuminaError {
    LuminaError::inference(e.to_string())
}

impl CandleImageExtractor {
    /// Load the vision tower of a HuggingFace CLIP model.
    ///
    /// The weights are downloaded into the HuggingFace cache on first use.
    /// Every failure is reported as [`LuminaError::ModelUnavailable`].
    pub fn new(model_name: &str) -> Result<Self> {
        let device = Device::cuda_if_available(0).map_err(model_error("Device setup failed"))?;

        let cache_dir = std::env::var("HF_HOME")
            .or_else(|_| std::env::var("HOME").map(|home| format!("{home}/.cache/huggingface")))
            .unwrap_or_else(|_| "/tmp/huggingface".to_string());

        let api = ApiBuilder::new()
            .with_cache_dir(cache_dir.into())
            .build()
            .map_err(model_error("HF API initialization failed"))?;
        let repo = api.model(model_name.to_string());

        let config = clip::ClipConfig::vit_base_patch32();

        let weights = repo
            .get("model.safetensors")
            .or_else(|_| repo.get("pytorch_model.bin"))
            .map_err(model_error("Weights download failed"))?;

        let vb = if weights.to_string_lossy().ends_with(".safetensors") {
            unsafe {
                VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, &device)
                    .map_err(model_error("VarBuilder creation failed"))?
            }
        } else {
            VarBuilder::from_pth(&weights, DType::F32, &device)
                .map_err(model_error("VarBuilder creation failed"))?
        };

        let vision_model = clip::vision_model::ClipVisionTransformer::new(
            vb.pp("vision_model"),
            &config.vision_config,
        )
        .map_err(model_error("Vision model load failed"))?;

        info!("Loaded CLIP vision model {model_name}");

        Ok(Self {
            vision_model,
            device,
            dimension: config.vision_config.embed_dim,
            image_size: config.vision_config.image_size,
            model_name: model_name.to_string(),
        })
    }

    /// Resize and normalize to a `[1, 3, H, W]` tensor.
    fn preprocess(&self, image: &RgbImage) -> Result<Tensor> {
        let size = self.image_size as u32;
        let resized = imageops::resize(image, size, size, FilterType::Triangle);

        let pixels = Tensor::from_vec(
            resized.into_raw(),
            (self.image_size, self.image_size, 3),
            &self.device,
        )
        .map_err(inference_error)?;

        let mean = Tensor::new(&CLIP_MEAN, &self.device)
            .and_then(|t| t.reshape((1, 1, 3)))
            .map_err(inference_error)?;
        let std = Tensor::new(&CLIP_STD, &self.device)
            .and_then(|t| t.reshape((1, 1, 3)))
            .map_err(inference_error)?;

        pixels
            .to_dtype(DType::F32)
            .and_then(|t| t.affine(1.0 / 255.0, 0.0))
            .and_then(|t| t.broadcast_sub(&mean))
            .and_then(|t| t.broadcast_div(&std))
            .and_then(|t| t.permute((2, 0, 1)))
            .and_then(|t| t.unsqueeze(0))
            .map_err(inference_error)
    }
}

impl FeatureExtractor for CandleImageExtractor {
    fn extract(&self, image: &RgbImage) -> Result<Vec<f32>> {
        let input = self.preprocess(image)?;
        self.vision_model
            .forward(&input)
            .and_then(|features| features.squeeze(0))
            .and_then(|features| features.to_vec1::<f32>())
            .map_err(inference_error)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}
