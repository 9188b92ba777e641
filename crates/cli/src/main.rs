use std::{path::PathBuf, sync::Arc};

use {
    clap::Parser,
    tracing::{error, info},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    crosstalk_config::CrosstalkConfig,
    crosstalk_fleet::TeamSupervisor,
    crosstalk_highlight::HighlightMatcher,
    crosstalk_pipeline::{ConsoleHandler, MessagePipeline, NotificationHandler, SpeechHandler},
    crosstalk_slack::SlackTransportFactory,
};

#[derive(Parser)]
#[command(
    name = "crosstalk",
    about = "crosstalk — one terminal feed for every chat workspace"
)]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long, env = "CROSSTALK_CONFIG", default_value = crosstalk_config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, default_value_t = false)]
    json_logs: bool,
}

/// Initialise tracing on stderr, keeping stdout clear for message lines.
fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "crosstalk starting");

    if let Err(e) = run(cli).await {
        error!(error = %e, "fatal error");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = crosstalk_config::load_config(&cli.config)?;

    let pipeline = Arc::new(build_pipeline(&config)?);
    let supervisor = Arc::new(TeamSupervisor::new(
        pipeline,
        Arc::new(SlackTransportFactory::new()),
    ));

    supervisor.initialize(config.teams)?;
    let summary = supervisor.connect_all().await?;
    info!(
        connected = summary.connected,
        failed = summary.failed,
        "streaming; press Ctrl-C to exit"
    );

    shutdown_signal().await;
    supervisor.shutdown().await;
    Ok(())
}

fn build_pipeline(config: &CrosstalkConfig) -> anyhow::Result<MessagePipeline> {
    let pipeline = MessagePipeline::new();

    let mut console = ConsoleHandler::new(config.handlers.console.enabled);
    if !config.highlight.keywords.is_empty() {
        // The loader already validated every spec; a failure here still
        // surfaces as a startup error rather than a panic.
        let matcher = HighlightMatcher::new(&config.highlight.keywords)?;
        console = console.with_highlight(Arc::new(matcher));
    }
    pipeline.register(Arc::new(console));
    pipeline.register(Arc::new(NotificationHandler::new(
        config.handlers.notification.enabled,
    )));
    pipeline.register(Arc::new(SpeechHandler::new(
        config.handlers.speech.enabled,
        config.handlers.speech.command.clone(),
    )));

    Ok(pipeline)
}

/// Resolve on SIGINT or SIGTERM, whichever arrives first.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT"),
        _ = terminate => info!("received SIGTERM"),
    }
}
