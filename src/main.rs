use anyhow::Result;
use clap::{Parser, Subcommand};
use docs_rag::commands::{
    ModelOverrides, ask, chat, clear_analytics, ingest_files, reset_store, search, show_analytics,
    show_stats,
};
use docs_rag::config::{run_interactive_config, show_config};
use docs_rag::llm::Provider;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "docs-rag")]
#[command(about = "Ask questions about your PDF and text documents")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Debug, Clone, Default)]
struct ModelArgs {
    /// Chat provider to answer with
    #[arg(long, value_enum)]
    provider: Option<Provider>,
    /// Chat model name, defaults to the provider's configured model
    #[arg(long)]
    model: Option<String>,
    /// Sampling temperature between 0.0 and 1.0
    #[arg(long)]
    temperature: Option<f32>,
}

impl From<ModelArgs> for ModelOverrides {
    fn from(args: ModelArgs) -> Self {
        Self {
            provider: args.provider,
            model: args.model,
            temperature: args.temperature,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Configure models, providers and embeddings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Add PDF or text files to the document store
    Ingest {
        /// Files to ingest
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Show the stored chunks most similar to a query
    Search {
        query: String,
        /// Number of results, defaults to the configured retrieval count
        #[arg(short, long)]
        k: Option<usize>,
    },
    /// Show what is in the document store
    Stats,
    /// Delete all ingested documents
    Reset {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Answer one question from your documents
    Ask {
        question: String,
        #[command(flatten)]
        model: ModelArgs,
    },
    /// Start an interactive conversation
    Chat {
        #[command(flatten)]
        model: ModelArgs,
    },
    /// Show statistics about past questions
    Analytics {
        /// Number of recent questions to list
        #[arg(long, default_value_t = 10)]
        recent: u32,
        /// Delete the logged questions instead of showing them
        #[arg(long, conflicts_with = "recent")]
        clear: bool,
        /// Skip the confirmation prompt when clearing
        #[arg(long, requires = "clear")]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Ingest { paths } => {
            ingest_files(&paths).await?;
        }
        Commands::Search { query, k } => {
            search(&query, k).await?;
        }
        Commands::Stats => {
            show_stats().await?;
        }
        Commands::Reset { yes } => {
            reset_store(yes).await?;
        }
        Commands::Ask { question, model } => {
            ask(&question, model.into()).await?;
        }
        Commands::Chat { model } => {
            chat(model.into()).await?;
        }
        Commands::Analytics { clear: true, yes, .. } => {
            clear_analytics(yes).await?;
        }
        Commands::Analytics { recent, .. } => {
            show_analytics(recent).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn ingest_takes_several_files() {
        let cli = Cli::try_parse_from(["docs-rag", "ingest", "a.pdf", "notes/b.txt"])
            .expect("should parse");

        if let Commands::Ingest { paths } = cli.command {
            assert_eq!(
                paths,
                vec![PathBuf::from("a.pdf"), PathBuf::from("notes/b.txt")]
            );
        } else {
            panic!("expected ingest command");
        }
    }

    #[test]
    fn ingest_requires_a_file() {
        let cli = Cli::try_parse_from(["docs-rag", "ingest"]);
        assert!(cli.is_err());
    }

    #[test]
    fn ask_with_model_overrides() {
        let cli = Cli::try_parse_from([
            "docs-rag",
            "ask",
            "What changed in Q3?",
            "--provider",
            "ollama",
            "--model",
            "mistral",
            "--temperature",
            "0.2",
        ])
        .expect("should parse");

        if let Commands::Ask { question, model } = cli.command {
            assert_eq!(question, "What changed in Q3?");
            let overrides = ModelOverrides::from(model);
            assert_eq!(overrides.provider, Some(Provider::Ollama));
            assert_eq!(overrides.model.as_deref(), Some("mistral"));
            assert_eq!(overrides.temperature, Some(0.2));
        } else {
            panic!("expected ask command");
        }
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let cli = Cli::try_parse_from(["docs-rag", "chat", "--provider", "openai"]);
        assert!(matches!(cli, Err(ref e) if e.kind() == ErrorKind::InvalidValue));
    }

    #[test]
    fn search_with_k() {
        let cli = Cli::try_parse_from(["docs-rag", "search", "capital", "-k", "3"])
            .expect("should parse");
        assert!(matches!(cli.command, Commands::Search { k: Some(3), .. }));
    }

    #[test]
    fn reset_and_analytics_defaults() {
        let cli = Cli::try_parse_from(["docs-rag", "reset"]).expect("should parse");
        assert!(matches!(cli.command, Commands::Reset { yes: false }));

        let cli = Cli::try_parse_from(["docs-rag", "analytics"]).expect("should parse");
        assert!(matches!(
            cli.command,
            Commands::Analytics {
                recent: 10,
                clear: false,
                yes: false
            }
        ));
    }

    #[test]
    fn analytics_clear_flags() {
        let cli = Cli::try_parse_from(["docs-rag", "analytics", "--clear", "--yes"])
            .expect("should parse");
        assert!(matches!(
            cli.command,
            Commands::Analytics {
                clear: true,
                yes: true,
                ..
            }
        ));

        let cli = Cli::try_parse_from(["docs-rag", "analytics", "--yes"]);
        assert!(matches!(cli, Err(ref e) if e.kind() == ErrorKind::MissingRequiredArgument));

        let cli = Cli::try_parse_from(["docs-rag", "analytics", "--clear", "--recent", "3"]);
        assert!(matches!(cli, Err(ref e) if e.kind() == ErrorKind::ArgumentConflict));
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["docs-rag", "config", "--show"]).expect("should parse");
        assert!(matches!(cli.command, Commands::Config { show: true }));
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["docs-rag", "serve"]);

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        } else {
            panic!("serve is not a command");
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["docs-rag", "--help"]);

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        } else {
            panic!("--help should short-circuit parsing");
        }
    }
}
