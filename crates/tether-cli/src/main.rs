//! tether - IDE-bridge chat enrichment pipeline CLI
//!
//! Runs one payload through the interception pipeline: enriches it with
//! project context from the IDE host bridge, forwards it upstream, and
//! post-processes the response.

mod config;

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use futures::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;

use tether_bridge::HttpBridge;
use tether_intercept::{
    ExplorationConfig, HttpUpstream, InterceptConfig, Interceptor, Mode, RequestBody,
    UpstreamRequest,
};

/// tether - IDE-bridge chat enrichment pipeline
#[derive(Parser, Debug)]
#[command(name = "tether")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Payload file to enrich and forward ("-" or omitted for stdin)
    #[arg(short, long)]
    payload: Option<String>,

    /// Upstream chat-completions URL
    #[arg(short, long)]
    url: Option<String>,

    /// Host bridge RPC base URL
    #[arg(short, long)]
    bridge: Option<String>,

    /// Operating mode (neutral, project, agent)
    #[arg(short, long)]
    mode: Option<String>,

    /// Model-name override
    #[arg(long)]
    model: Option<String>,

    /// Usage tag stamped onto outgoing payloads
    #[arg(long)]
    usage_tag: Option<String>,

    /// Page URL used for conversation-id extraction
    #[arg(long)]
    page_url: Option<String>,

    /// Print the enriched payload instead of forwarding it
    #[arg(long)]
    dry_run: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,

    /// Print an example config file and exit
    #[arg(long)]
    example_config: bool,
}

fn init_logging(verbose: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new(if verbose { "debug" } else { "warn" })
        });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_payload(source: Option<&str>) -> anyhow::Result<String> {
    match source {
        None | Some("-") => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("reading payload from stdin")?;
            Ok(buffer)
        }
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading payload from {}", path)),
    }
}

fn build_intercept_config(args: &Args, config: &config::Config) -> InterceptConfig {
    let mode = args
        .mode
        .as_deref()
        .or(config.mode.as_deref())
        .map(Mode::parse)
        .unwrap_or_default();

    let system_prompt = config.system_prompt_file.as_deref().and_then(|path| {
        match std::fs::read_to_string(path) {
            Ok(prompt) => Some(prompt),
            Err(e) => {
                tracing::warn!("cannot read system prompt file {}: {}", path, e);
                None
            }
        }
    });

    let defaults = ExplorationConfig::default();
    let exploration = ExplorationConfig {
        exploration_timeout: config
            .exploration_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.exploration_timeout),
        indexing_timeout: config
            .indexing_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.indexing_timeout),
    };

    InterceptConfig {
        mode,
        system_prompt,
        usage_tag: args.usage_tag.clone().or_else(|| config.usage_tag.clone()),
        model_override: args.model.clone().or_else(|| config.model_override.clone()),
        exploration,
        ..Default::default()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    if args.example_config {
        print!("{}", config::example_config());
        return Ok(());
    }
    if args.init_config {
        let path = config::Config::init().context("initializing config file")?;
        println!("Config file at {}", path.display());
        return Ok(());
    }

    let config = config::Config::load();
    let intercept_config = build_intercept_config(&args, &config);

    let bridge_url = args
        .bridge
        .clone()
        .or_else(|| config.bridge_url.clone())
        .unwrap_or_else(|| "http://127.0.0.1:8765".to_string());
    let upstream_url = args
        .url
        .clone()
        .or_else(|| config.upstream_url.clone())
        .unwrap_or_else(|| "http://127.0.0.1:3000/api/chat/completions".to_string());

    let bridge = Arc::new(HttpBridge::new(bridge_url));
    let cancel = CancellationToken::new();
    let listener = bridge.spawn_event_listener(cancel.child_token());

    let upstream = Arc::new(HttpUpstream::new());
    let interceptor = Interceptor::new(intercept_config, bridge, upstream);

    if let Some(page_url) = args.page_url.clone().or_else(|| config.page_url.clone()) {
        interceptor.session().set_page_url(page_url);
    }

    // Surface pipeline progress on stderr when asked.
    if args.verbose {
        let mut events = BroadcastStream::new(interceptor.subscribe());
        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let Ok(event) = event {
                    tracing::info!(event = ?event, "pipeline");
                }
            }
        });
    }

    let payload = read_payload(args.payload.as_deref())?;
    let request = UpstreamRequest::post(&upstream_url, RequestBody::Text(payload));

    if args.dry_run {
        let enriched = interceptor.enrich(request).await;
        let body = String::from_utf8(enriched.body.as_bytes())
            .context("enriched body is not UTF-8")?;
        println!("{}", body);
    } else {
        let response = interceptor
            .intercept(request)
            .await
            .context("forwarding request upstream")?;
        tracing::debug!(status = response.status, url = %response.url, "upstream reply");
        println!("{}", response.body);
    }

    cancel.cancel();
    listener.abort();
    Ok(())
}
