use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use clap::Parser;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;
use toolpatch_rs::config::cli::CliArgs;
use toolpatch_rs::config::AppConfig;
use toolpatch_rs::fixes::FixConfigStore;
use toolpatch_rs::observability::init_tracing;
use toolpatch_rs::routing::dispatch_request;
use toolpatch_rs::state::AppState;
use toolpatch_rs::transport::HttpTransport;

/// How long open streams may keep running after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

fn main() -> ExitCode {
    let config = match CliArgs::parse().resolve_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Failed to load configuration: {err}");
            eprintln!("Please copy 'config.example.yaml' to 'config.yaml' and modify as needed.");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.features.log_level);

    let runtime = match config.server.runtime_worker_threads {
        Some(1) => tokio::runtime::Builder::new_current_thread().enable_all().build(),
        Some(threads) => tokio::runtime::Builder::new_multi_thread()
            .worker_threads(threads)
            .enable_all()
            .build(),
        None => tokio::runtime::Builder::new_multi_thread().enable_all().build(),
    };
    let result = match runtime {
        Ok(runtime) => runtime.block_on(run(config)),
        Err(err) => Err(format!("failed to initialize Tokio runtime: {err}")),
    };
    if let Err(err) = result {
        eprintln!("{err}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn run(config: AppConfig) -> Result<(), String> {
    let listen_addr = config.server.listen_addr();
    let listener = TcpListener::bind(&listen_addr)
        .await
        .map_err(|err| format!("failed to bind to {listen_addr}: {err}"))?;

    let transport = HttpTransport::new(&config.server);
    let fixes = FixConfigStore::load(config.features.fixes_path.clone());
    let state = Arc::new(AppState::new(config, transport, fixes));
    tracing::info!(
        listen = %listen_addr,
        target = %state.config.server.target_url,
        fixes = ?state.fixes.path(),
        fixes_from_file = state.fixes.loaded_from_file(),
        "toolpatch proxy ready (health: GET /_health, reload: POST /_reload)"
    );

    serve(listener, state).await;
    Ok(())
}

/// Accept connections until Ctrl-C, then give in-flight streams a bounded
/// window to finish.
async fn serve(listener: TcpListener, state: Arc<AppState>) {
    let builder = AutoBuilder::new(TokioExecutor::new());
    let graceful = GracefulShutdown::new();
    let mut shutdown = std::pin::pin!(tokio::signal::ctrl_c());

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(err) => {
                    tracing::warn!(error = %err, "accept error");
                    continue;
                }
            },
            signal = &mut shutdown => {
                if let Err(err) = signal {
                    tracing::error!(error = %err, "failed to listen for shutdown signal");
                }
                break;
            }
        };
        if let Err(err) = stream.set_nodelay(true) {
            tracing::debug!(%peer, error = %err, "failed to enable TCP_NODELAY");
        }

        let state = Arc::clone(&state);
        let service = service_fn(move |request: hyper::Request<Incoming>| {
            dispatch_request(Arc::clone(&state), request.map(Body::new))
        });
        let connection = graceful.watch(
            builder
                .serve_connection(TokioIo::new(stream), service)
                .into_owned(),
        );
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                tracing::debug!(%peer, error = %err, "connection ended with error");
            }
        });
    }

    tracing::info!("shutting down");
    if tokio::time::timeout(DRAIN_TIMEOUT, graceful.shutdown()).await.is_err() {
        tracing::warn!(timeout_secs = DRAIN_TIMEOUT.as_secs(), "streams still open at shutdown");
    }
}
