use std::{process, sync::Arc};

use edgepurge::{
    application::{
        error::AppError,
        purge::{PurgeApi, PurgeService, VerificationDispatch},
    },
    config,
    infra::{
        akamai::AkamaiPurgeClient,
        cache_warmer::CacheWarmer,
        error::InfraError,
        http::{self, PurgeState},
        signing::{EdgeGridSigner, RequestSigner},
        telemetry,
    },
};
use tokio::{net::TcpListener, signal, sync::oneshot};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use url::Url;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let edgegrid = EdgeGridSigner::new(
        settings.akamai.edgerc_path.clone(),
        settings.akamai.edgerc_section.clone(),
    );
    let host = resolve_api_host(&settings, &edgegrid).await?;

    let signer: Arc<dyn RequestSigner> = Arc::new(edgegrid);
    let api: Arc<dyn PurgeApi> = Arc::new(AkamaiPurgeClient::new(
        settings.akamai.request_timeout,
        signer,
    )?);
    let purge = Arc::new(PurgeService::new(
        host.as_str(),
        api,
        settings.post_purge.enabled,
    ));
    let verifier: Arc<dyn VerificationDispatch> =
        Arc::new(CacheWarmer::new(&settings.post_purge)?);

    info!(
        target = "edgepurge::serve",
        akamai_host = %host,
        edgerc_path = %settings.akamai.edgerc_path.display(),
        edgerc_section = %settings.akamai.edgerc_section,
        post_purge = settings.post_purge.enabled,
        "purge service configured"
    );

    let router = http::build_router(PurgeState { purge, verifier });
    serve_http(&settings, router).await
}

/// `akamai.host` when configured, otherwise the `host` of the credentials section.
async fn resolve_api_host(
    settings: &config::Settings,
    signer: &EdgeGridSigner,
) -> Result<Url, AppError> {
    if let Some(host) = settings.akamai.host.clone() {
        return Ok(host);
    }

    let from_edgerc = signer.credentials_host().await.map_err(|err| {
        InfraError::configuration(format!(
            "akamai.host is not set and the credentials file could not be read: {err}"
        ))
    })?;
    match from_edgerc {
        Some(host) => Ok(config::parse_api_host(&host)?),
        None => Err(InfraError::configuration(
            "akamai.host is required (set EDGEPURGE__AKAMAI__HOST, --akamai-host, \
             or `host` in the .edgerc section)",
        )
        .into()),
    }
}

async fn serve_http(settings: &config::Settings, router: axum::Router) -> Result<(), AppError> {
    let listener = TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "edgepurge::serve",
        addr = %settings.server.addr,
        "listening"
    );

    let (signalled_tx, signalled_rx) = oneshot::channel();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                let _ = signalled_tx.send(());
            })
            .await
    });

    tokio::select! {
        joined = &mut server => return server_result(joined),
        _ = signalled_rx => {}
    }

    let grace = settings.server.graceful_shutdown;
    match tokio::time::timeout(grace, &mut server).await {
        Ok(joined) => server_result(joined),
        Err(_) => {
            warn!(
                target = "edgepurge::serve",
                grace_seconds = grace.as_secs(),
                "in-flight requests did not finish in time; forcing shutdown"
            );
            server.abort();
            Ok(())
        }
    }
}

fn server_result(
    joined: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), AppError> {
    match joined {
        Ok(Ok(())) => {
            info!(target = "edgepurge::serve", "server stopped");
            Ok(())
        }
        Ok(Err(err)) => Err(AppError::unexpected(format!("server error: {err}"))),
        Err(err) => Err(AppError::unexpected(format!("server task failed: {err}"))),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(target = "edgepurge::serve", error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                error!(target = "edgepurge::serve", error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!(target = "edgepurge::serve", "received SIGINT, shutting down"),
        _ = terminate => info!(target = "edgepurge::serve", "received SIGTERM, shutting down"),
    }
}
