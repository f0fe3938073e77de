
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Password, Select};

use super::{Config, ConfigError, OllamaConfig};
use crate::chat::session::MemoryPolicy;
use crate::embeddings::EmbeddingBackend;
use crate::llm::Provider;

#[inline]
pub fn run_interactive_config() -> Result<()> {
    eprintln!("{}", style("🔧 Docs RAG Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config()?;

    eprintln!("{}", style("Language Model").bold().yellow());
    eprintln!("Choose which model answers questions about your documents.");
    eprintln!();
    configure_llm(&mut config)?;

    eprintln!();
    eprintln!("{}", style("Ollama Configuration").bold().yellow());
    eprintln!("Configure your local Ollama instance for chat and local embeddings.");
    eprintln!();
    configure_ollama(&mut config.ollama)?;

    eprintln!();
    eprintln!("{}", style("Gemini Configuration").bold().yellow());
    configure_gemini(&mut config)?;

    eprintln!();
    eprintln!("{}", style("Embeddings").bold().yellow());
    eprintln!(
        "{}",
        style("Switching embedding provider requires resetting the document store.").dim()
    );
    configure_embeddings(&mut config)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    if test_ollama_connection(&config.ollama) {
        eprintln!("{}", style("✓ Ollama connection successful!").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not connect to Ollama").yellow()
        );
        eprintln!("You can continue, but make sure Ollama is running before using local models.");
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config() -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Language Model:").bold().yellow());
    eprintln!("  Provider: {}", style(config.llm.provider).cyan());
    eprintln!(
        "  Model: {}",
        style(config.default_chat_model(config.llm.provider)).cyan()
    );
    eprintln!("  Temperature: {}", style(config.llm.temperature).cyan());
    eprintln!("  Memory: {}", style(config.chat.memory_policy).cyan());
    eprintln!("  Retrieved chunks (k): {}", style(config.retrieval.k).cyan());

    eprintln!();
    eprintln!("{}", style("Ollama Settings:").bold().yellow());
    match config.ollama_url() {
        Ok(url) => eprintln!("  URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  URL: {} ({})", style("Invalid").red(), e),
    }
    eprintln!("  Chat Model: {}", style(&config.ollama.chat_model).cyan());
    eprintln!(
        "  Embedding Model: {}",
        style(&config.ollama.embedding_model).cyan()
    );
    eprintln!("  Batch Size: {}", style(config.ollama.batch_size).cyan());

    eprintln!();
    eprintln!("{}", style("Gemini Settings:").bold().yellow());
    eprintln!("  Endpoint: {}", style(&config.gemini.base_url).cyan());
    eprintln!(
        "  API Key: {}",
        config
            .gemini
            .api_key()
            .map_or_else(|| style("not set".to_string()).red(), |key| style(mask_key(key)).cyan())
    );
    eprintln!("  Chat Model: {}", style(&config.gemini.chat_model).cyan());
    eprintln!(
        "  Embedding Model: {}",
        style(&config.gemini.embedding_model).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Embeddings:").bold().yellow());
    eprintln!("  Provider: {}", style(config.embeddings.provider).cyan());
    eprintln!(
        "  Chunking: {} chars, {} overlap",
        style(config.chunking.chunk_size).cyan(),
        style(config.chunking.chunk_overlap).cyan()
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );
    eprintln!(
        "Vector store: {}",
        style(config.vector_database_path().display()).dim()
    );

    Ok(())
}

fn load_existing_config() -> Result<Config> {
    let config_dir = Config::config_dir().context("Failed to determine config directory")?;
    Config::load(&config_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No valid configuration found. Using defaults.").yellow()
            );
            Ok(Config {
                base_dir: config_dir.clone(),
                ..Config::default()
            })
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            Ok(config)
        },
    )
}

fn configure_llm(config: &mut Config) -> Result<()> {
    let providers = [Provider::Gemini, Provider::Ollama];
    let default_index = providers
        .iter()
        .position(|p| *p == config.llm.provider)
        .unwrap_or(0);

    let provider_index = Select::new()
        .with_prompt("Chat provider")
        .default(default_index)
        .items(&providers)
        .interact()?;
    config.llm.provider = providers[provider_index];

    let temperature: f32 = Input::new()
        .with_prompt("Temperature (0.0 - 1.0)")
        .default(config.llm.temperature)
        .validate_with(|input: &f32| -> Result<(), &str> {
            if (0.0..=1.0).contains(input) {
                Ok(())
            } else {
                Err("Temperature must be between 0.0 and 1.0")
            }
        })
        .interact_text()?;
    config.llm.temperature = temperature;

    let policies = [
        MemoryPolicy::Persist,
        MemoryPolicy::ResetOnRebuild,
        MemoryPolicy::Stateless,
    ];
    let default_index = policies
        .iter()
        .position(|p| *p == config.chat.memory_policy)
        .unwrap_or(0);
    let policy_index = Select::new()
        .with_prompt("Conversation memory")
        .default(default_index)
        .items(&policies)
        .interact()?;
    config.chat.memory_policy = policies[policy_index];

    Ok(())
}

fn configure_ollama(ollama: &mut OllamaConfig) -> Result<()> {
    let protocols = &["http", "https"];
    let default_index = protocols
        .iter()
        .position(|&p| p == ollama.protocol)
        .unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt("Ollama protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;

    let protocol = protocols[protocol_index].to_string();

    let host: String = Input::new()
        .with_prompt("Ollama host")
        .default(ollama.host.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = OllamaConfig {
                protocol: protocol.clone(),
                host: input.clone(),
                ..OllamaConfig::default()
            };
            temp_config.validate()?;
            Ok(())
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Ollama port")
        .default(ollama.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let chat_model: String = Input::new()
        .with_prompt("Chat model")
        .default(ollama.chat_model.clone())
        .validate_with(non_empty)
        .interact_text()?;

    let embedding_model: String = Input::new()
        .with_prompt("Embedding model")
        .default(ollama.embedding_model.clone())
        .validate_with(non_empty)
        .interact_text()?;

    let batch_size: u32 = Input::new()
        .with_prompt("Batch size for embedding generation")
        .default(ollama.batch_size)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if *input == 0 {
                Err("Batch size must be greater than 0")
            } else if *input > 1000 {
                Err("Batch size must be 1000 or less")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    ollama.set_protocol(protocol)?;
    ollama.set_host(host)?;
    ollama.set_port(port)?;
    ollama.set_chat_model(chat_model)?;
    ollama.set_embedding_model(embedding_model)?;
    ollama.set_batch_size(batch_size)?;

    Ok(())
}

fn configure_gemini(config: &mut Config) -> Result<()> {
    let has_key = config.gemini.api_key().is_some();
    let prompt = if has_key {
        "Replace the stored Gemini API key?"
    } else {
        "Store a Gemini API key? (GOOGLE_API_KEY in the environment also works)"
    };

    if Confirm::new().with_prompt(prompt).default(false).interact()? {
        let key = Password::new()
            .with_prompt("Gemini API key")
            .allow_empty_password(true)
            .interact()?;
        config.gemini.api_key = Some(key).filter(|k| !k.trim().is_empty());
    }

    let chat_model: String = Input::new()
        .with_prompt("Gemini chat model")
        .default(config.gemini.chat_model.clone())
        .validate_with(non_empty)
        .interact_text()?;
    config.gemini.chat_model = chat_model;

    Ok(())
}

fn configure_embeddings(config: &mut Config) -> Result<()> {
    let backends = [EmbeddingBackend::Local, EmbeddingBackend::Gemini];
    let default_index = backends
        .iter()
        .position(|b| *b == config.embeddings.provider)
        .unwrap_or(0);

    let index = Select::new()
        .with_prompt("Embedding provider")
        .default(default_index)
        .items(&backends)
        .interact()?;
    config.embeddings.provider = backends[index];

    Ok(())
}

fn non_empty(input: &String) -> Result<(), &'static str> {
    if input.trim().is_empty() {
        Err("Model name cannot be empty")
    } else {
        Ok(())
    }
}

fn mask_key(key: &str) -> String {
    let visible: String = key
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("****{}", visible)
}

fn test_ollama_connection(ollama: &OllamaConfig) -> bool {
    let url = format!(
        "{}://{}:{}/api/version",
        ollama.protocol, ollama.host, ollama.port
    );

    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(std::time::Duration::from_secs(5)))
        .build()
        .into();

    match agent.get(&url).call() {
        Ok(_) => true,
        Err(ureq::Error::StatusCode(code)) if (400..500).contains(&code) => true,
        Err(_) => false,
    }
}
