//! Command implementations for the Lumina CLI.

use std::sync::Arc;
use std::time::Instant;

use log::info;

use crate::cli::args::*;
use crate::cli::output::*;
use crate::config::LuminaConfig;
use crate::embedding::extractor::FeatureExtractor;
use crate::embedding::image_embedder::ImageInput;
use crate::error::Result;
use crate::service::SimilarityService;
use crate::storage::StorageFactory;
use crate::vector::VectorIndexStore;

/// Execute a CLI command.
pub fn execute_command(args: LuminaArgs) -> Result<()> {
    let config = args.load_config()?;

    if let Command::Stats = args.command {
        return show_stats(&config, &args);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let service = SimilarityService::new(config.clone(), load_extractor(&config))?;
        match &args.command {
            Command::Insert(insert_args) => insert_image(&service, insert_args, &args).await,
            Command::Similar(similar_args) => similar_images(&service, similar_args, &args).await,
            Command::SimilarTo(similar_to_args) => {
                similar_to_id(&service, similar_to_args, &args).await
            }
            Command::Suggest(suggest_args) => suggest_images(&service, suggest_args, &args).await,
            Command::Stats => show_stats(&config, &args),
        }
    })
}

/// Load the configured feature extractor.
#[cfg(feature = "embeddings-candle")]
pub fn load_extractor(config: &LuminaConfig) -> Result<Arc<dyn FeatureExtractor>> {
    use crate::embedding::candle_image_extractor::CandleImageExtractor;

    let extractor = CandleImageExtractor::new(&config.model_name)?;
    Ok(Arc::new(extractor))
}

/// Load the configured feature extractor.
#[cfg(not(feature = "embeddings-candle"))]
pub fn load_extractor(config: &LuminaConfig) -> Result<Arc<dyn FeatureExtractor>> {
    Err(crate::error::LuminaError::model_unavailable(format!(
        "{} cannot be loaded: built without the embeddings-candle feature",
        config.model_name
    )))
}

async fn insert_image(
    service: &SimilarityService,
    args: &InsertArgs,
    cli_args: &LuminaArgs,
) -> Result<()> {
    info!("Inserting {} as image {}", args.image.display(), args.id);
    let outcome = service
        .insert(args.id, ImageInput::from_path(&args.image))
        .await?;

    output_result(
        "Image indexed",
        &InsertResult {
            id: args.id,
            outcome,
            entries: service.store().len(),
        },
        cli_args,
    )
}

async fn similar_images(
    service: &SimilarityService,
    args: &SimilarArgs,
    cli_args: &LuminaArgs,
) -> Result<()> {
    let start = Instant::now();
    let limit = args.limit.unwrap_or(service.config().default_max_results);
    let ids = service
        .search_by_image(ImageInput::from_path(&args.image), &args.exclude, limit)
        .await?;

    output_result(
        "Similar images",
        &SimilarImages {
            query: args.image.display().to_string(),
            ids,
            duration_ms: start.elapsed().as_millis() as u64,
        },
        cli_args,
    )
}

async fn similar_to_id(
    service: &SimilarityService,
    args: &SimilarToArgs,
    cli_args: &LuminaArgs,
) -> Result<()> {
    let start = Instant::now();
    let limit = args.limit.unwrap_or(service.config().default_max_results);
    let ids = service.search_by_id(args.id, limit).await?;

    output_result(
        "Similar images",
        &SimilarImages {
            query: format!("id {}", args.id),
            ids,
            duration_ms: start.elapsed().as_millis() as u64,
        },
        cli_args,
    )
}

async fn suggest_images(
    service: &SimilarityService,
    args: &SuggestArgs,
    cli_args: &LuminaArgs,
) -> Result<()> {
    let start = Instant::now();
    let limit = args.limit.unwrap_or(service.config().default_max_results);
    let ids = service
        .search_by_ids_average(&args.ids, &args.exclude, limit)
        .await?;

    let query = args
        .ids
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",");
    output_result(
        "Suggested images",
        &SimilarImages {
            query: format!("average of {query}"),
            ids,
            duration_ms: start.elapsed().as_millis() as u64,
        },
        cli_args,
    )
}

/// Show index statistics without loading the model.
fn show_stats(config: &LuminaConfig, cli_args: &LuminaArgs) -> Result<()> {
    let storage = StorageFactory::create(config.storage_config())?;
    let store = VectorIndexStore::open(storage, config.dimension)?;
    output_result("Index statistics", &store.health(), cli_args)
}
