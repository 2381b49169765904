use actix_web::web;

use super::handlers;

/// Configures the node routes
///
/// Routes live at the root so peers can reach `GET /chain` directly.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/chain", web::get().to(handlers::get_chain))
        .route("/blockchain/latest", web::get().to(handlers::get_latest_block))
        .route("/blockchain/height", web::get().to(handlers::get_height))
        .route("/mine", web::get().to(handlers::mine_block))
        .route("/transactions/new", web::post().to(handlers::new_transaction))
        .route("/transactions/pending", web::get().to(handlers::get_pending_transactions))
        .route("/balance/{account}", web::get().to(handlers::get_balance))
        .route("/balances", web::get().to(handlers::get_balances))
        .route("/validate", web::get().to(handlers::validate_chain))
        .route("/nodes/register", web::post().to(handlers::register_nodes))
        .route("/nodes/peers", web::get().to(handlers::get_peers))
        .route("/nodes/resolve", web::get().to(handlers::resolve_conflicts))
        .route("/generate_keypair", web::get().to(handlers::generate_keypair))
        .route("/contracts/deploy", web::post().to(handlers::deploy_contract))
        .route("/contracts/execute", web::post().to(handlers::execute_contract))
        .route("/contracts/govern", web::post().to(handlers::set_governing_contract))
        .route("/contracts/govern", web::delete().to(handlers::clear_governing_contract));
}
