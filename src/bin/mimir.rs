//! mimir: operator CLI for the generation engine.
//!
//! Loads configuration and secrets from the standard locations, builds a
//! [`GenerationService`](mimir::GenerationService) and runs one command,
//! printing the result as JSON.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use mimir::config::{Config, Secrets};
use mimir::{KeywordRequest, PaperRequest, TopicRequest};

#[derive(Parser)]
#[command(name = "mimir")]
#[command(version = mimir::PKG_VERSION)]
#[command(about = "Generate exam questions from retrieved examples")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to secrets file (default: ~/.mimir/secrets.toml).
    #[arg(long)]
    secrets: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate questions for one topic
    Topic {
        /// Subject (GS1..GS4)
        subject: String,
        /// Topic name
        topic: String,
        /// Number of questions
        #[arg(short, long, default_value_t = 5)]
        num: usize,
        /// Ground questions in news from the last N months
        #[arg(long, value_name = "MONTHS")]
        current_affairs: Option<u32>,
        /// Try this model first
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Generate a whole paper for a subject
    Paper {
        subject: String,
        #[arg(long, value_name = "MONTHS")]
        current_affairs: Option<u32>,
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Generate questions connecting a set of keywords
    Keywords {
        /// Keywords (at least one)
        #[arg(required = true)]
        keywords: Vec<String>,
        #[arg(short, long, default_value_t = 5)]
        num: usize,
        /// Subject to cache under (inferred when omitted)
        #[arg(short, long)]
        subject: Option<String>,
        #[arg(long, value_name = "MONTHS")]
        current_affairs: Option<u32>,
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Show cached question counts per subject
    CacheStats,

    /// Delete cached generations
    ClearCache {
        #[arg(long)]
        subject: Option<String>,
        /// Only meaningful together with --subject
        #[arg(long, requires = "subject")]
        topic: Option<String>,
    },

    /// List the topics known for a subject
    Topics { subject: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Default: warn for CLI; override with RUST_LOG.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::load(args.config.as_deref())?;
    let secrets = match args.secrets.as_deref() {
        Some(path) => Secrets::load_from(path)?,
        None => Secrets::load()?,
    };

    let service = config.service_builder(&secrets)?.build()?;
    info!(version = mimir::PKG_VERSION, "mimir starting");

    match args.command {
        Command::Topic {
            subject,
            topic,
            num,
            current_affairs,
            model,
        } => {
            service.initialize().await;
            let mut request = TopicRequest::new(subject, topic, num);
            if let Some(months) = current_affairs {
                request = request.current_affairs(months);
            }
            if let Some(model) = model {
                request = request.model(model);
            }
            print_json(&service.generate_for_topic(&request).await)?;
        }
        Command::Paper {
            subject,
            current_affairs,
            model,
        } => {
            service.initialize().await;
            let mut request = PaperRequest::new(subject);
            if let Some(months) = current_affairs {
                request = request.current_affairs(months);
            }
            if let Some(model) = model {
                request = request.model(model);
            }
            print_json(&service.generate_whole_paper(&request).await)?;
        }
        Command::Keywords {
            keywords,
            num,
            subject,
            current_affairs,
            model,
        } => {
            service.initialize().await;
            let mut request = KeywordRequest::new(keywords, num);
            if let Some(subject) = subject {
                request = request.subject(subject);
            }
            if let Some(months) = current_affairs {
                request = request.current_affairs(months);
            }
            if let Some(model) = model {
                request = request.model(model);
            }
            print_json(&service.generate_from_keywords(&request).await)?;
        }
        Command::CacheStats => {
            print_json(&service.get_cache_stats().await?)?;
        }
        Command::ClearCache { subject, topic } => {
            service
                .clear_cache(subject.as_deref(), topic.as_deref())
                .await?;
            println!("cache cleared");
        }
        Command::Topics { subject } => {
            service.refresh_topics().await;
            for topic in service.topics_for_subject(&subject).await {
                println!("{topic}");
            }
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
