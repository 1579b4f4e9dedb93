use std::{future::Future, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use orchestrator::{load_settings, HookName, Orchestrator, OrchestratorConfig};
use shared::{
    domain::{ExportFormat, WEBSOCKET_DATA_KEY},
    protocol::{HttpMethod, RequestOptions},
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const LIVENESS_POLL: Duration = Duration::from_millis(200);

#[derive(Parser, Debug)]
struct Cli {
    /// Overrides `websocket_url` from orchestrator.toml and the environment.
    #[arg(long, global = true)]
    websocket_url: Option<String>,
    #[arg(long, global = true)]
    api_base_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import a json, yaml or csv file into state and print the exported state.
    Import {
        path: PathBuf,
        #[arg(long, default_value = "json")]
        export: ExportFormat,
    },
    /// Call `<api base url><endpoint>` and print the JSON result.
    Fetch {
        endpoint: String,
        #[arg(long, default_value = "GET")]
        method: HttpMethod,
        #[arg(long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,
        #[arg(long)]
        body: Option<String>,
    },
    /// Connect the push channel and print each received payload.
    Listen {
        #[arg(long)]
        url: Option<String>,
        /// Stop after this many payloads; runs until Ctrl-C otherwise.
        #[arg(long)]
        count: Option<usize>,
    },
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got `{raw}`"))?;
    Ok((name.trim().to_string(), value.trim().to_string()))
}

fn build_config(cli: &Cli) -> OrchestratorConfig {
    let mut config = OrchestratorConfig::from(load_settings());
    if let Some(url) = &cli.websocket_url {
        config = config.with_websocket_url(url.clone());
    }
    if let Some(url) = &cli.api_base_url {
        config = config.with_api_base_url(url.clone());
    }
    for name in HookName::DEFAULTS {
        let label = name.to_string();
        config = config.with_hook(name, move |event| {
            debug!(hook = %label, ?event, "hook fired");
            Ok(())
        });
    }
    config
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let cli = Cli::parse();

    let orchestrator = Orchestrator::new(build_config(&cli));
    let outcome = run(&orchestrator, cli.command).await;
    orchestrator.dispose().await;
    outcome
}

async fn run(orchestrator: &Arc<Orchestrator>, command: Command) -> Result<()> {
    match command {
        Command::Import { path, export } => {
            let upload = orchestrator
                .handle_file_upload(&path)
                .await
                .with_context(|| format!("importing {}", path.display()))?;
            println!("imported {} as {}", upload.name, upload.format);
            println!("{}", orchestrator.export_state(export).await?);
        }
        Command::Fetch {
            endpoint,
            method,
            headers,
            body,
        } => {
            let mut options = RequestOptions::new(method);
            for (name, value) in headers {
                options = options.with_header(name, value);
            }
            if let Some(body) = body {
                options = options.with_body(body);
            }
            let result = orchestrator.api_request(&endpoint, options).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Listen { url, count } => {
            let ctrl_c = async {
                let _ = tokio::signal::ctrl_c().await;
            };
            listen(orchestrator, url.as_deref(), count, ctrl_c).await?;
        }
    }

    Ok(())
}

/// Prints each `websocketData` update until `count` have arrived, the peer closes the
/// connection, or `shutdown` completes. Returns how many updates were printed.
async fn listen(
    orchestrator: &Arc<Orchestrator>,
    url: Option<&str>,
    count: Option<usize>,
    shutdown: impl Future<Output = ()>,
) -> Result<usize> {
    let mut subscription = orchestrator.subscribe();
    orchestrator.connect_websocket(url).await?;
    let connected_to = orchestrator.websocket_url().await.unwrap_or_default();
    info!(url = %connected_to, "listening for push updates");

    tokio::pin!(shutdown);
    let mut liveness = tokio::time::interval(LIVENESS_POLL);
    let mut received = 0usize;
    while count.map_or(true, |limit| received < limit) {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            snapshot = subscription.next() => {
                let Some(snapshot) = snapshot else { break };
                if let Some(data) = snapshot.get(WEBSOCKET_DATA_KEY) {
                    received += 1;
                    println!("{}", serde_json::to_string(data)?);
                }
            }
            _ = liveness.tick() => {
                if !orchestrator.is_websocket_connected().await {
                    info!("push channel closed by peer");
                    break;
                }
            }
        }
    }
    orchestrator.disconnect_websocket().await;
    Ok(received)
}
