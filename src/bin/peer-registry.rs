//! Central peer registry.
//!
//! Nodes announce themselves with `POST /register {"url": ...}` and read the
//! full set back from `GET /peers`. State lives in memory only.

use std::collections::BTreeSet;

use actix_web::{middleware, web, App, HttpResponse, HttpServer, Responder};
use clap::Parser;
use log::info;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Peer registry for ledger nodes
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Port to listen on
    #[arg(short, long, default_value_t = 5001)]
    port: u16,

    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
}

#[derive(Default)]
struct Registry {
    nodes: Mutex<BTreeSet<String>>,
}

#[derive(Deserialize)]
struct RegisterRequest {
    url: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct RegisterResponse {
    message: String,
    total_nodes: Vec<String>,
}

async fn register(registry: web::Data<Registry>, request: web::Json<RegisterRequest>) -> impl Responder {
    let url = match request.into_inner().url {
        Some(url) if !url.trim().is_empty() => url,
        _ => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "Please supply a valid node URL"
            }))
        }
    };

    let total_nodes = {
        let mut nodes = registry.nodes.lock();
        nodes.insert(url.clone());
        nodes.iter().cloned().collect()
    };
    info!("Registered node: {}", url);

    HttpResponse::Ok().json(RegisterResponse {
        message: "Node registered successfully".to_string(),
        total_nodes,
    })
}

async fn peers(registry: web::Data<Registry>) -> impl Responder {
    let nodes: Vec<String> = registry.nodes.lock().iter().cloned().collect();
    HttpResponse::Ok().json(nodes)
}

fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/register", web::post().to(register))
        .route("/peers", web::get().to(peers));
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = Cli::parse();
    let registry = web::Data::new(Registry::default());

    info!("Peer registry listening on http://{}:{}", cli.host, cli.port);

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(registry.clone())
            .configure(configure_routes)
    })
    .bind((cli.host, cli.port))?
    .run()
    .await
}
