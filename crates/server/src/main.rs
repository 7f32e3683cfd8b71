use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;
use concierge::error::{BindSnafu, CreateInvokerSnafu, LoadSettingsSnafu, ServeSnafu};
use concierge::logging::init_logging;
use concierge::{AppState, ServerError, Settings, build_router};
use concierge_core::ValidationGate;
use snafu::ResultExt;

#[derive(Debug, Parser)]
#[command(name = "concierge", about = "Support chatbot server", version)]
struct Cli {
    /// Settings file, defaults to $CONCIERGE_CONFIG or ./concierge.json
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides the configured listen port
    #[arg(long)]
    port: Option<u16>,
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), ServerError> {
    let cli = Cli::parse();

    let path = Settings::resolve_path(cli.config);
    let mut settings = Settings::load(&path).context(LoadSettingsSnafu {
        stage: "load-settings",
    })?;
    if let Some(port) = cli.port {
        settings.server.port = port;
    }

    let _guard = init_logging(&settings.log)?;
    tracing::info!("=====================================");
    tracing::info!("Starting Server");
    tracing::info!(
        settings = %path.display(),
        provider_id = %settings.model.provider_id,
        model_id = %settings.model.model_id,
        "loaded settings"
    );

    let invoker = concierge_llm::create_invoker(settings.model_config()).context(
        CreateInvokerSnafu {
            stage: "create-invoker",
        },
    )?;
    let state = AppState::new(
        ValidationGate::new(settings.limits),
        settings.persona_prefix(),
        invoker,
    );
    let router = build_router(state, &settings.server.public_dir);

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, settings.server.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(BindSnafu {
            stage: "bind-listener",
            addr,
        })?;
    tracing::info!(%addr, public_dir = %settings.server.public_dir.display(), "listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context(ServeSnafu { stage: "serve" })?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
