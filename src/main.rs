//! Membot CLI entry point: one binary, one subcommand per service.

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use membot::assistant::{
    Agent, AssistantCoreClient, BriefingBuilder, ContextManager, DigestScheduler, OpenAiChatClient,
    RedisSessionStore, TokenCounter, ToolRegistry,
};
use membot::config::{AssistantConfig, CoreConfig, GatewayConfig, WorkerConfig};
use membot::gateway::{ChatInterface, ConsoleChatInterface};
use membot::scheduler::Scheduler;
use membot::streams::Broker;
use membot::worker::{default_handlers, CoreApiClient, LlmClient};
use std::sync::Arc;
use tokio::io::AsyncBufReadExt as _;

#[derive(Parser)]
#[command(name = "membot", version)]
#[command(about = "Personal memory-and-task assistant backend")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run the Core service: REST API and housekeeping scheduler
    Core,
    /// Run one LLM worker replica
    Worker,
    /// Run the assistant agent service (digest loop + dev REPL)
    Assistant,
    /// Run the chat gateway notification consumer
    Gateway,
}

fn init_tracing(debug: bool) {
    let default_filter = if debug { "membot=debug,info" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Shutdown signal shared by all long-running tasks. Flips once on
/// ctrl-c / SIGTERM.
fn shutdown_channel() -> tokio::sync::watch::Receiver<bool> {
    let (tx, rx) = tokio::sync::watch::channel(false);

    tokio::spawn(async move {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(%error, "failed to listen for shutdown signal");
            return;
        }
        tracing::info!("shutdown signal received");
        let _ = tx.send(true);
    });

    rx
}

/// Bounded grace for an outstanding task during shutdown.
async fn await_with_grace(name: &str, handle: tokio::task::JoinHandle<()>) {
    match tokio::time::timeout(std::time::Duration::from_secs(10), handle).await {
        Ok(_) => tracing::debug!(task = name, "task finished"),
        Err(_) => tracing::warn!(task = name, "task did not finish within grace period"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match cli.command {
        Command::Core => run_core().await,
        Command::Worker => run_worker().await,
        Command::Assistant => run_assistant().await,
        Command::Gateway => run_gateway().await,
    }
}

async fn run_core() -> anyhow::Result<()> {
    let config = CoreConfig::load().context("failed to load core config")?;

    std::fs::create_dir_all(&config.media_dir)
        .with_context(|| format!("failed to create media directory {}", config.media_dir))?;

    let pool = membot::db::connect(&config.database_path)
        .await
        .context("failed to open database")?;
    let broker = Broker::connect(&config.redis_url)
        .await
        .context("failed to connect to broker")?;

    let shutdown = shutdown_channel();

    let scheduler = Scheduler::new(
        pool.clone(),
        Arc::new(broker.clone()),
        config.scheduler_interval_secs,
    );
    let scheduler_shutdown = shutdown.clone();
    let scheduler_handle = tokio::spawn(async move {
        scheduler.run(scheduler_shutdown).await;
    });

    let state = Arc::new(membot::api::ApiState::new(pool, Some(broker)));
    let server_handle =
        membot::api::start_http_server(config.bind_addr, state, shutdown.clone()).await?;

    let mut shutdown_wait = shutdown;
    let _ = shutdown_wait.wait_for(|stopped| *stopped).await;

    await_with_grace("scheduler", scheduler_handle).await;
    await_with_grace("http server", server_handle).await;
    tracing::info!("core service stopped");
    Ok(())
}

async fn run_worker() -> anyhow::Result<()> {
    let config = WorkerConfig::load().context("failed to load worker config")?;

    let broker = Broker::connect(&config.redis_url)
        .await
        .context("failed to connect to broker")?;
    let core = Arc::new(CoreApiClient::new(&config.core_api_url)?);
    let llm = Arc::new(LlmClient::new(&config.llm_base_url, &config.llm_api_key)?);

    let handlers = default_handlers(
        llm,
        core.clone(),
        &config.llm_text_model,
        &config.llm_vision_model,
    );
    let ctx = membot::worker::consumer::WorkerContext {
        handlers,
        core,
        publisher: Arc::new(broker.clone()),
        acker: Arc::new(broker.clone()),
        consumer_name: config.consumer_name.clone(),
    };

    let shutdown = shutdown_channel();
    membot::worker::run_consumer(broker, ctx, config.max_retries, shutdown).await?;
    tracing::info!("worker stopped");
    Ok(())
}

async fn run_assistant() -> anyhow::Result<()> {
    let config = AssistantConfig::load().context("failed to load assistant config")?;

    let sessions = Arc::new(
        RedisSessionStore::connect(&config.redis_url)
            .await
            .context("failed to connect to session store")?,
    );
    let api = Arc::new(AssistantCoreClient::new(&config.core_api_url)?);
    let model = Arc::new(OpenAiChatClient::new(
        &config.llm_base_url,
        &config.llm_api_key,
        &config.llm_model,
    )?);

    let briefing = Arc::new(BriefingBuilder::new(
        api.clone(),
        sessions.clone(),
        config.briefing_budget_tokens,
    ));
    let agent = Agent::new(
        model,
        api.clone(),
        sessions.clone(),
        ContextManager::new(
            &config.llm_model,
            config.context_window_tokens,
            config.briefing_budget_tokens,
            config.response_reserve_tokens,
        ),
        briefing.clone(),
        ToolRegistry::standard(),
    );

    let interface: Arc<dyn ChatInterface> = Arc::new(ConsoleChatInterface);
    let digest = DigestScheduler::new(
        api,
        sessions,
        briefing,
        interface,
        TokenCounter::for_model(&config.llm_model),
        config.allowed_user_ids.clone(),
        config.digest_hour,
    );

    let shutdown = shutdown_channel();
    let digest_shutdown = shutdown.clone();
    let digest_handle = tokio::spawn(async move {
        digest.run(digest_shutdown).await;
    });

    // Development chat interface: one line of stdin is one user turn for
    // the first allowed user. A platform adapter replaces this in
    // deployment.
    let repl_user = config.allowed_user_ids.first().copied().unwrap_or(0);
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut shutdown_wait = shutdown;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(text)) if !text.trim().is_empty() => {
                        match agent.handle_message(repl_user, text.trim()).await {
                            Ok(reply) => println!("{reply}"),
                            Err(error) => {
                                tracing::error!(%error, "agent turn failed");
                                println!("Sorry, something went wrong. Please try again.");
                            }
                        }
                    }
                    Ok(Some(_)) => {}
                    Ok(None) | Err(_) => {
                        let _ = shutdown_wait.wait_for(|stopped| *stopped).await;
                        break;
                    }
                }
            }
            _ = shutdown_wait.changed() => {
                if *shutdown_wait.borrow() {
                    break;
                }
            }
        }
    }

    await_with_grace("digest scheduler", digest_handle).await;
    tracing::info!("assistant stopped");
    Ok(())
}

async fn run_gateway() -> anyhow::Result<()> {
    let config = GatewayConfig::load().context("failed to load gateway config")?;

    let broker = Broker::connect(&config.redis_url)
        .await
        .context("failed to connect to broker")?;
    let interface: Arc<dyn ChatInterface> = Arc::new(ConsoleChatInterface);

    let shutdown = shutdown_channel();
    membot::gateway::run_notify_consumer(broker, interface, &config.consumer_name, shutdown)
        .await?;
    tracing::info!("gateway stopped");
    Ok(())
}
