use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use canvasxpress_rag::core::config::{AppPaths, ConfigService, Settings};
use canvasxpress_rag::logging;
use canvasxpress_rag::pipeline::{
    self, GenerationOptions, Generator, PromptBuilder, DEFAULT_MAX_RETRIES, DEFAULT_TEMPERATURE,
};
use canvasxpress_rag::rag::IndexOutcome;

/// Generate CanvasXpress chart configurations from plain-English descriptions.
#[derive(Parser)]
#[command(name = "canvasxpress-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the example index
    Index {
        /// Drop the collection and embed every example again
        #[arg(long)]
        rebuild: bool,
    },

    /// Show the closest examples for a description
    Search {
        #[arg(allow_hyphen_values = true)]
        description: String,
        /// Number of distinct examples (defaults to retrieval.top_k)
        #[arg(short)]
        k: Option<usize>,
    },

    /// Print the assembled prompt
    Prompt {
        #[arg(allow_hyphen_values = true)]
        description: String,
        /// Column names of the user's data
        #[arg(long)]
        headers: Option<String>,
    },

    /// Generate a configuration
    Generate {
        #[arg(allow_hyphen_values = true)]
        description: String,
        #[arg(long)]
        headers: Option<String>,
        /// Sampling temperature in [0.0, 1.0]
        #[arg(long, default_value_t = DEFAULT_TEMPERATURE)]
        temperature: f32,
        /// Attempts before giving up on the model
        #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
        retries: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = Arc::new(AppPaths::new());
    logging::init(&paths.log_dir);

    let settings: Settings = ConfigService::new(paths.clone())
        .load_settings()
        .context("Failed to load configuration")?;

    match cli.command {
        Command::Index { rebuild } => {
            let outcome = pipeline::build_index(&settings, &paths, rebuild)
                .await
                .context("Failed to build the example index")?;
            match outcome {
                IndexOutcome::Created { rows } => println!("indexed {} rows", rows),
                IndexOutcome::Reused { rows } => {
                    println!("index already present ({} rows); use --rebuild to repopulate", rows)
                }
            }
        }
        Command::Search { description, k } => {
            let prompts = PromptBuilder::initialize(&settings, &paths).await?;
            let k = k.unwrap_or(settings.retrieval.top_k);
            let examples = prompts.similar_examples(&description, k).await?;
            println!("{}", serde_json::to_string_pretty(&examples)?);
        }
        Command::Prompt {
            description,
            headers,
        } => {
            let prompts = PromptBuilder::initialize(&settings, &paths).await?;
            let prompt = prompts
                .build_prompt(&description, headers.as_deref())
                .await?;
            println!("{}", prompt);
        }
        Command::Generate {
            description,
            headers,
            temperature,
            retries,
        } => {
            let options = GenerationOptions {
                temperature,
                max_retries: retries,
            };
            let generator = Generator::initialize(&settings, &paths)
                .await
                .context("Failed to initialize generator")?;
            let config = generator
                .generate_configuration(&description, headers.as_deref(), options)
                .await?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Result<Command, clap::Error> {
        Cli::try_parse_from(std::iter::once("canvasxpress-rag").chain(args.iter().copied()))
            .map(|cli| cli.command)
    }

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_generate_options() {
        let command = parse(&[
            "generate",
            "bar chart",
            "--headers",
            "Gene,Value",
            "--temperature",
            "0.3",
            "--retries",
            "5",
        ])
        .unwrap();
        match command {
            Command::Generate {
                description,
                headers,
                temperature,
                retries,
            } => {
                assert_eq!(description, "bar chart");
                assert_eq!(headers.as_deref(), Some("Gene,Value"));
                assert!((temperature - 0.3).abs() < 1e-6);
                assert_eq!(retries, 5);
            }
            _ => panic!("expected generate"),
        }

        match parse(&["generate", "pie"]).unwrap() {
            Command::Generate {
                temperature,
                retries,
                ..
            } => {
                assert_eq!(temperature, DEFAULT_TEMPERATURE);
                assert_eq!(retries, DEFAULT_MAX_RETRIES);
            }
            _ => panic!("expected generate"),
        }
    }

    #[test]
    fn description_may_start_with_a_dash() {
        match parse(&["search", "-log scale bars", "-k", "5"]).unwrap() {
            Command::Search { description, k } => {
                assert_eq!(description, "-log scale bars");
                assert_eq!(k, Some(5));
            }
            _ => panic!("expected search"),
        }
    }

    #[test]
    fn flags_are_scoped_to_their_subcommand() {
        assert!(parse(&["index", "-k", "5"]).is_err());
        assert!(parse(&["search", "bars", "--rebuild"]).is_err());
        assert!(parse(&["search"]).is_err());
        assert!(parse(&[]).is_err());
        assert!(matches!(
            parse(&["index", "--rebuild"]).unwrap(),
            Command::Index { rebuild: true }
        ));
    }
}
