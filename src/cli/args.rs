//! Command line argument parsing for the Lumina CLI using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::config::LuminaConfig;
use crate::error::Result;
use crate::vector::ImageId;

/// Lumina - visual similarity index for image galleries
#[derive(Parser, Debug, Clone)]
#[command(name = "lumina")]
#[command(about = "Find visually similar images in a gallery")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct LuminaArgs {
    /// Verbosity level (0=quiet, 1=normal, 2=verbose, 3=debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (overrides verbose)
    #[arg(short, long)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human")]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,

    /// JSON configuration file
    #[arg(short, long, env = "LUMINA_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory holding the index (overrides the configuration file)
    #[arg(long, env = "LUMINA_INDEX_DIR", value_name = "DIR")]
    pub index_dir: Option<PathBuf>,

    /// Minimum similarity of a result (overrides the configuration file)
    #[arg(long, env = "LUMINA_SIMILARITY_THRESHOLD")]
    pub threshold: Option<f32>,

    /// HuggingFace vision model (overrides the configuration file)
    #[arg(long, env = "LUMINA_MODEL")]
    pub model: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl LuminaArgs {
    /// Get the effective verbosity level
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            match self.verbose {
                0 => 1,
                n => n,
            }
        }
    }

    /// Configuration file values with the command line overrides applied.
    pub fn load_config(&self) -> Result<LuminaConfig> {
        let mut config = match &self.config {
            Some(path) => LuminaConfig::from_file(path)?,
            None => LuminaConfig::default(),
        };

        if let Some(index_dir) = &self.index_dir {
            config.index_dir = index_dir.clone();
        }
        if let Some(threshold) = self.threshold {
            config.similarity_threshold = threshold;
        }
        if let Some(model) = &self.model {
            config.model_name = model.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Embed an image and add it to the index
    Insert(InsertArgs),

    /// Find indexed images similar to an image file
    Similar(SimilarArgs),

    /// Find indexed images similar to an indexed image
    #[command(name = "similar-to")]
    SimilarTo(SimilarToArgs),

    /// Suggest images matching the average look of a set of indexed images
    Suggest(SuggestArgs),

    /// Show index statistics and health
    Stats,
}

/// Arguments for inserting an image
#[derive(Parser, Debug, Clone)]
pub struct InsertArgs {
    /// Identifier of the image
    #[arg(value_name = "ID", allow_negative_numbers = true)]
    pub id: ImageId,

    /// Image file path
    #[arg(value_name = "IMAGE")]
    pub image: PathBuf,
}

/// Arguments for searching by image file
#[derive(Parser, Debug, Clone)]
pub struct SimilarArgs {
    /// Image file path
    #[arg(value_name = "IMAGE")]
    pub image: PathBuf,

    /// Ids to leave out of the results (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    pub exclude: Vec<ImageId>,

    /// Maximum number of results to return
    #[arg(short, long)]
    pub limit: Option<usize>,
}

/// Arguments for searching by indexed id
#[derive(Parser, Debug, Clone)]
pub struct SimilarToArgs {
    /// Identifier of an indexed image
    #[arg(value_name = "ID", allow_negative_numbers = true)]
    pub id: ImageId,

    /// Maximum number of results to return
    #[arg(short, long)]
    pub limit: Option<usize>,
}

/// Arguments for average-look suggestions
#[derive(Parser, Debug, Clone)]
pub struct SuggestArgs {
    /// Ids of the images to average (comma-separated)
    #[arg(long, value_delimiter = ',', required = true)]
    pub ids: Vec<ImageId>,

    /// Additional ids to leave out of the results (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    pub exclude: Vec<ImageId>,

    /// Maximum number of results to return
    #[arg(short, long)]
    pub limit: Option<usize>,
}

/// Output formats
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}
