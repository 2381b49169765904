use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use clap::Parser;
use log::{info, warn};
use tokio::sync::watch;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod api;
mod blockchain;
mod config;
mod network;
mod node;

use config::NodeConfig;
use network::discovery;
use network::{HttpChainSource, HttpPeerRegistry, PeerRegistry};
use node::Node;

/// A proof-of-work ledger node
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Port to listen on
    #[arg(short, long, default_value_t = 5000)]
    port: u16,

    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Leading zero hex characters required of a proof digest
    #[arg(short, long, default_value_t = 4)]
    difficulty: usize,

    /// Peer registry base URL, e.g. http://127.0.0.1:5001
    #[arg(long)]
    registry: Option<String>,

    /// URL announced to the registry (defaults to http://127.0.0.1:<port>)
    #[arg(long)]
    advertise: Option<String>,

    /// Seconds between registry syncs
    #[arg(long, default_value_t = 300)]
    sync_interval: u64,

    /// Rule code every submitted transaction must pass
    #[arg(long)]
    governing_contract: Option<String>,
}

impl Cli {
    fn into_config(self) -> NodeConfig {
        let advertise_url = self
            .advertise
            .or_else(|| self.registry.as_ref().map(|_| format!("http://127.0.0.1:{}", self.port)));

        NodeConfig {
            host: self.host,
            port: self.port,
            difficulty: self.difficulty,
            registry_url: self.registry,
            advertise_url,
            sync_interval_secs: self.sync_interval,
            governing_contract: self.governing_contract,
            ..NodeConfig::default()
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::get_chain,
        api::handlers::get_latest_block,
        api::handlers::get_height,
        api::handlers::mine_block,
        api::handlers::new_transaction,
        api::handlers::get_pending_transactions,
        api::handlers::get_balance,
        api::handlers::get_balances,
        api::handlers::validate_chain,
        api::handlers::register_nodes,
        api::handlers::get_peers,
        api::handlers::resolve_conflicts,
        api::handlers::generate_keypair,
        api::handlers::deploy_contract,
        api::handlers::execute_contract,
        api::handlers::set_governing_contract,
        api::handlers::clear_governing_contract
    ),
    components(
        schemas(
            blockchain::Block,
            blockchain::Transaction,
            blockchain::EncodedKeyPair,
            network::ChainResponse,
            api::handlers::TransactionRequest,
            api::handlers::TransactionResponse,
            api::handlers::MineResponse,
            api::handlers::HeightResponse,
            api::handlers::BalanceResponse,
            api::handlers::ValidateResponse,
            api::handlers::GovernRequest,
            api::handlers::RegisterNodesRequest,
            api::handlers::RegisterNodesResponse,
            api::handlers::ResolveResponse,
            api::handlers::DeployContractRequest,
            api::handlers::DeployContractResponse,
            api::handlers::ExecuteContractRequest,
            api::handlers::ExecuteContractResponse
        )
    ),
    tags(
        (name = "ledger", description = "Ledger node endpoints")
    ),
    info(
        title = "Ledger Node API",
        version = "0.1.0",
        description = "A proof-of-work ledger node with peer consensus"
    )
)]
struct ApiDoc;

/// Announces this node and keeps its peer set in sync with the registry
async fn start_discovery(
    node: &Node,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<Option<tokio::task::JoinHandle<()>>> {
    let config = node.config();
    let registry_url = match &config.registry_url {
        Some(url) => url,
        None => return Ok(None),
    };

    let registry: Arc<dyn PeerRegistry> =
        Arc::new(HttpPeerRegistry::new(registry_url, config.peer_timeout())?);

    if let Some(advertise_url) = &config.advertise_url {
        match registry.announce(advertise_url).await {
            Ok(()) => info!("Registered {} with registry {}", advertise_url, registry_url),
            Err(err) => warn!("Failed to register with registry {}: {}", registry_url, err),
        }
    }

    Ok(Some(discovery::spawn_sync(
        registry,
        node.peers().clone(),
        config.sync_interval(),
        shutdown,
    )))
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = Cli::parse().into_config();
    let bind = (config.host.clone(), config.port);

    let chain_source = Arc::new(HttpChainSource::new(config.peer_timeout())?);
    let node = Node::new(config, chain_source);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sync_task = start_discovery(&node, shutdown_rx).await?;

    info!("Node {} listening on http://{}:{}", node.id(), bind.0, bind.1);

    let data = web::Data::new(node);

    // Start HTTP server
    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        let openapi = ApiDoc::openapi();

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(data.clone())
            .configure(api::configure_routes)
            .service(SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", openapi))
    })
    .bind(bind)?
    .run()
    .await?;

    // Server has stopped; stop background sync too
    let _ = shutdown_tx.send(true);
    if let Some(task) = sync_task {
        if let Err(err) = task.await {
            warn!("Peer sync task ended abnormally: {}", err);
        }
    }

    info!("Node stopped");
    Ok(())
}
