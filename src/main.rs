// ┌─┐┬─┐─┐ ┬┬┬  ┬  ┌┬┐┬┌─┐┌─┐┌─┐┌┬┐
// ├─┤├┬┘┌┴┬┘│└┐┌┘   │││├┬┘├┤ └─┐ │
// ┴ ┴┴└─┴ └─┴ └┘   ─┴┘┴└─┘└─┘└─┘ ┴

// Requires a Gemini API key or a local Ollama
// fetches new arXiv papers per topic, has an LLM pick the best ones, and archives the picks as JSON.

// Copyright 2025 Servus Altissimi (Pseudonym)

// Permission is hereby granted, free of charge, to any person obtaining a copy of this software and associated documentation files (the "Software"), to deal in the Software without restriction, including without limitation the rights to use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of the Software, and to permit persons to whom the Software is furnished to do so, subject to the following conditions:
// The above copyright notice and this permission notice shall be included in all copies or substantial portions of the Software.
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

mod archive;
mod arxiv;
mod config;
mod digest;
mod error;
mod llm;
mod parse;
mod pipeline;
mod query;
mod ranker;
mod retry;
mod web;
mod window;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::archive::Archive;
use crate::arxiv::{ArxivClient, ARXIV_ENDPOINT};
use crate::config::{default_topics, load_topics, select_topics, TopicConfig};
use crate::llm::{Backend, GeminiBackend, OllamaBackend, Provider, GEMINI_ENDPOINT};
use crate::pipeline::Pipeline;
use crate::ranker::Ranker;
use crate::retry::RetryPolicy;
use crate::window::{default_reference, Cadence};

const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_OLLAMA_MODEL: &str = "llama3.2:latest";

// CL arguments for config
#[derive(Parser, Debug)]
#[command(author, version, about = "arXiv research digest with LLM ranking", long_about = None)]
struct Args {
    /// Root directory of the digest archive
    #[arg(long, global = true, default_value = "archive")]
    archive_dir: PathBuf,

    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Digest the daily topics for one day (default: yesterday)
    Daily(RunArgs),
    /// Digest the weekly topics for the week ending on a day (default: today)
    Weekly(RunArgs),
    /// Serve the archive as a web dashboard
    Serve {
        #[arg(short, long, default_value_t = 6601)]
        port: u16,

        /// JSON list of topics (default: built-in topics)
        #[arg(long)]
        topics: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Reference day, YYYY-MM-DD
    #[arg(short, long)]
    date: Option<NaiveDate>,

    /// JSON list of topics (default: built-in topics)
    #[arg(long)]
    topics: Option<PathBuf>,

    /// Only run these topic keys
    #[arg(long)]
    only: Vec<String>,

    /// Topics processed in parallel
    #[arg(short, long, default_value_t = 1)]
    jobs: usize,

    #[command(flatten)]
    rank: RankArgs,

    #[command(flatten)]
    fetch: FetchArgs,
}

#[derive(clap::Args, Debug)]
struct RankArgs {
    #[arg(long, value_enum, default_value_t = Provider::Gemini)]
    provider: Provider,

    /// Model name (default depends on the provider)
    #[arg(long)]
    model: Option<String>,

    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long, default_value = GEMINI_ENDPOINT)]
    gemini_endpoint: String,

    #[arg(long, default_value = "http://localhost")]
    ollama_host: String,

    #[arg(long, default_value_t = 11434)]
    ollama_port: u16,

    #[arg(long, default_value_t = 5)]
    max_attempts: u32,

    #[arg(long, default_value_t = 2000)]
    base_delay_ms: u64,

    #[arg(long, default_value_t = 1000)]
    jitter_ms: u64,
}

#[derive(clap::Args, Debug)]
struct FetchArgs {
    #[arg(long, default_value_t = 100)]
    page_size: usize,

    /// Pause between result pages, per arXiv's rate limit
    #[arg(long, default_value_t = 3000)]
    page_delay_ms: u64,

    #[arg(long, default_value = ARXIV_ENDPOINT)]
    search_endpoint: String,
}

impl RankArgs {
    fn backend(&self) -> Result<Backend> {
        let backend = match self.provider {
            Provider::Gemini => {
                let model = self.model.clone().unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string());
                let gemini = GeminiBackend::new(model, self.api_key.clone())?
                    .with_endpoint(&self.gemini_endpoint);
                Backend::Gemini(gemini)
            }
            Provider::Ollama => {
                let model = self.model.clone().unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string());
                Backend::Ollama(OllamaBackend::new(&self.ollama_host, self.ollama_port, model))
            }
        };
        Ok(backend)
    }

    fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_jitter: Duration::from_millis(self.jitter_ms),
        }
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "info,arxiv_digest=debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn topics_from(path: Option<&Path>) -> Result<Vec<TopicConfig>> {
    match path {
        Some(path) => {
            let topics = load_topics(path)?;
            info!("Loaded {} topics from {}", topics.len(), path.display());
            Ok(topics)
        }
        None => Ok(default_topics()),
    }
}

async fn run_digest(cadence: Cadence, archive: Archive, args: RunArgs) -> Result<()> {
    let reference = args
        .date
        .unwrap_or_else(|| default_reference(cadence, Local::now().date_naive()));
    let topics = select_topics(topics_from(args.topics.as_deref())?, cadence, &args.only)?;
    if topics.is_empty() {
        warn!("No {:?} topics to run", cadence);
        return Ok(());
    }

    let fetcher = ArxivClient::new(
        &args.fetch.search_endpoint,
        args.fetch.page_size,
        Duration::from_millis(args.fetch.page_delay_ms),
    )?;
    let ranker = Ranker::new(args.rank.backend()?, args.rank.policy());

    info!("Reference day {}, archive at {}", reference, archive.root().display());
    let pipeline = Pipeline::new(fetcher, ranker, archive);
    pipeline.run_all(&topics, reference, args.jobs).await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let archive = Archive::new(args.archive_dir.clone());
    match args.command {
        Command::Daily(run) => run_digest(Cadence::Daily, archive, run).await,
        Command::Weekly(run) => run_digest(Cadence::Weekly, archive, run).await,
        Command::Serve { port, topics } => {
            let topics = topics_from(topics.as_deref())?;
            web::start_web_server(port, archive, topics).await;
            Ok(())
        }
    }
}
