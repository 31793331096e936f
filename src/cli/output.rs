//! Output formatting for CLI commands.

use serde::Serialize;

use crate::cli::args::{LuminaArgs, OutputFormat};
use crate::error::Result;
use crate::vector::{ImageId, InsertOutcome};

/// Result of an insert command.
#[derive(Debug, Serialize)]
pub struct InsertResult {
    pub id: ImageId,
    pub outcome: InsertOutcome,
    pub entries: usize,
}

/// Result of a similarity command.
#[derive(Debug, Serialize)]
pub struct SimilarImages {
    pub query: String,
    pub ids: Vec<ImageId>,
    pub duration_ms: u64,
}

/// Output a result in the specified format.
pub fn output_result<T: Serialize>(message: &str, result: &T, args: &LuminaArgs) -> Result<()> {
    match args.output_format {
        OutputFormat::Human => output_human(message, result, args),
        OutputFormat::Json => output_json(result, args),
    }
}

fn output_human<T: Serialize>(message: &str, result: &T, args: &LuminaArgs) -> Result<()> {
    if args.verbosity() > 0 {
        println!("{message}");
        println!();
    }

    let value = serde_json::to_value(result)?;
    print_human_value(&value, 0);
    Ok(())
}

fn print_human_value(value: &serde_json::Value, indent: usize) {
    let pad = "  ".repeat(indent);
    match value {
        serde_json::Value::Object(obj) => {
            for (key, val) in obj {
                if val.is_object() {
                    println!("{pad}{key}:");
                    print_human_value(val, indent + 1);
                } else {
                    println!("{pad}{key}: {}", format_value(val));
                }
            }
        }
        _ => println!("{pad}{}", format_value(value)),
    }
}

fn output_json<T: Serialize>(result: &T, args: &LuminaArgs) -> Result<()> {
    let json = if args.pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };

    println!("{json}");
    Ok(())
}

fn format_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Array(arr) => {
            let formatted_values = arr.iter().map(format_value).collect::<Vec<_>>().join(", ");
            format!("[{formatted_values}]")
        }
        serde_json::Value::Object(_) => "[object]".to_string(),
        serde_json::Value::Null => "-".to_string(),
    }
}
