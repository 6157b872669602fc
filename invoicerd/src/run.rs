use axum::Router;
use axum::http::Method;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tower_http::cors;

use invoicer_node::hook::{HttpHook, NoHook};
use invoicer_node::node_view::NodeView;
use invoicer_node::settlement::InvoicePaymentNotification;
use invoicer_node::signer::LocalSigner;
use invoicer_node::store::MemoryInvoiceStore;
use invoicer_node::util::{ShutdownSignal, Telemetry};
use invoicer_node::{Collaborators, InvoiceNode, NodeSettings, handlers};
use invoicer_types::collaborator::PaymentHook;

use crate::config::Config;

/// Starts the invoice node server.
///
/// - Loads `.env` variables and installs logging.
/// - Builds the node from the config file.
/// - Serves the command endpoints until SIGINT or SIGTERM.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let telemetry = Telemetry::new()
        .with_name(env!("CARGO_PKG_NAME"))
        .with_version(env!("CARGO_PKG_VERSION"))
        .register()?;

    let config = Config::load()?;

    let hook: Arc<dyn PaymentHook> = match config.hook() {
        Some(hook_config) => {
            let hook = HttpHook::new(hook_config.url.clone());
            let hook = match hook_config.timeout() {
                Some(timeout) => hook.with_timeout(timeout),
                None => hook,
            };
            tracing::info!(url = %hook.url(), "payment hook registered");
            Arc::new(hook)
        }
        None => Arc::new(NoHook),
    };
    let view = Arc::new(NodeView::from_channels(config.channels().iter().cloned()));
    let node = InvoiceNode::new(
        Collaborators {
            store: Arc::new(MemoryInvoiceStore::new()),
            gossip: view.clone(),
            peers: view,
            signer: Arc::new(LocalSigner::new(config.node_secret())),
            hook,
        },
        NodeSettings {
            network: config.network(),
            cltv_final: config.cltv_final(),
            dev_routes: config.dev_routes(),
        },
    )?;
    tracing::info!(
        id = %node.node_id(),
        network = %config.network(),
        channels = config.channels().len(),
        "invoice node ready"
    );

    let shutdown = ShutdownSignal::listen()?;
    tokio::spawn(log_payments(node.subscribe_payments(), shutdown.token()));

    let axum_state = Arc::new(node);
    let http_endpoints = Router::new()
        .merge(handlers::routes().with_state(axum_state))
        .layer(telemetry.http_tracing())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any),
        );

    let addr = SocketAddr::new(config.host(), config.port());
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .inspect_err(|e| tracing::error!("Failed to bind to {}: {}", addr, e))?;

    let axum_cancellation_token = shutdown.token();
    let axum_graceful_shutdown = async move { axum_cancellation_token.cancelled().await };
    axum::serve(listener, http_endpoints)
        .with_graceful_shutdown(axum_graceful_shutdown)
        .await?;

    Ok(())
}

/// Logs every payment attempt that reached the payment hook.
async fn log_payments(
    mut payments: tokio::sync::broadcast::Receiver<InvoicePaymentNotification>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            received = payments.recv() => match received {
                Ok(payment) => {
                    tracing::info!(label = %payment.label, msat = %payment.msat, "invoice payment offered")
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "payment log fell behind")
                }
                Err(RecvError::Closed) => return,
            },
        }
    }
}
