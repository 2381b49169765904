use actix_web::{web, HttpResponse, Responder};
use log::error;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::blockchain::{Block, BlockchainError, ContractError, EncodedKeyPair, Transaction};
use crate::network::{ChainResponse, Resolution};
use crate::node::Node;

/// Data structure for the node state
pub type NodeData = web::Data<Node>;

/// Request for the transaction endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransactionRequest {
    /// The sender's account, or "0" to mint
    pub sender: String,

    /// The recipient's account
    pub recipient: String,

    /// The amount to transfer
    pub amount: f64,

    /// Hex signature over the canonical transaction encoding
    pub signature: Option<String>,

    /// Base58 public key the signature verifies against
    pub public_key: Option<String>,
}

/// Response for the transaction endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransactionResponse {
    /// The message
    pub message: String,

    /// The index of the block that will include this transaction
    pub block_index: u64,
}

/// Response for the mine endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MineResponse {
    /// The message
    pub message: String,

    /// Index of the forged block
    pub index: u64,

    /// Transactions in the forged block
    pub transactions: Vec<Transaction>,

    /// Proof of the forged block
    pub proof: u64,

    /// Hash of the block before it
    pub previous_hash: String,
}

/// Request for the register nodes endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct RegisterNodesRequest {
    /// Peer addresses, e.g. `http://192.168.0.5:5000`
    pub nodes: Vec<String>,
}

/// Response for the register nodes endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct RegisterNodesResponse {
    pub message: String,
    pub total_nodes: Vec<String>,
}

/// Response for the resolve endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ResolveResponse {
    pub message: String,

    /// Whether the local chain was replaced
    pub replaced: bool,

    /// The local chain after resolution
    pub chain: Vec<Block>,
}

/// Request for the deploy contract endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct DeployContractRequest {
    /// Rule source
    pub code: String,
}

/// Response for the deploy contract endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct DeployContractResponse {
    pub message: String,

    /// Content address of the contract
    pub address: String,
}

/// Request for the execute contract endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ExecuteContractRequest {
    pub address: String,
    pub transaction: Transaction,
}

/// Response for the execute contract endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ExecuteContractResponse {
    /// Whether the contract approved the transaction
    pub result: bool,
}

/// Response for the balance endpoints
#[derive(Serialize, Deserialize, ToSchema)]
pub struct BalanceResponse {
    pub account: String,
    pub balance: f64,
}

/// Response for the height endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct HeightResponse {
    /// Number of blocks, genesis included
    pub height: usize,
}

/// Request for the governing contract endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct GovernRequest {
    /// Address of a deployed contract
    pub address: String,
}

/// Response for the validate endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ValidateResponse {
    pub valid: bool,
}

fn error_response(err: &BlockchainError) -> HttpResponse {
    let body = serde_json::json!({ "error": err.to_string() });
    match err {
        BlockchainError::ContractError(ContractError::UnknownContract(_)) => {
            HttpResponse::NotFound().json(body)
        }
        _ => HttpResponse::BadRequest().json(body),
    }
}

/// Get the full chain
///
/// This is also the endpoint peers read during consensus
#[utoipa::path(
    get,
    path = "/chain",
    responses(
        (status = 200, description = "Chain retrieved successfully", body = ChainResponse)
    )
)]
pub async fn get_chain(node: NodeData) -> impl Responder {
    let (chain, _) = node.get_chain();
    HttpResponse::Ok().json(ChainResponse::new(chain))
}

/// Get the latest block
#[utoipa::path(
    get,
    path = "/blockchain/latest",
    responses(
        (status = 200, description = "Latest block retrieved successfully", body = Block)
    )
)]
pub async fn get_latest_block(node: NodeData) -> impl Responder {
    HttpResponse::Ok().json(node.last_block())
}

/// Get the chain height
#[utoipa::path(
    get,
    path = "/blockchain/height",
    responses(
        (status = 200, description = "Height retrieved successfully", body = HeightResponse)
    )
)]
pub async fn get_height(node: NodeData) -> impl Responder {
    HttpResponse::Ok().json(HeightResponse {
        height: node.height(),
    })
}

/// Mine a new block
///
/// Searches for a proof, pays the node its reward and forges the block
#[utoipa::path(
    get,
    path = "/mine",
    responses(
        (status = 200, description = "Block mined successfully", body = MineResponse),
        (status = 500, description = "Mining task failed")
    )
)]
pub async fn mine_block(node: NodeData) -> impl Responder {
    let miner = node.get_ref().clone();

    // The proof search is CPU bound; keep it off the async workers
    match web::block(move || miner.mine()).await {
        Ok(block) => HttpResponse::Ok().json(mine_response(block)),
        Err(err) => {
            error!("Mining task failed: {}", err);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Failed to mine block: {}", err)
            }))
        }
    }
}

fn mine_response(block: Block) -> MineResponse {
    MineResponse {
        message: "New Block Forged".to_string(),
        index: block.index,
        transactions: block.transactions,
        proof: block.proof,
        previous_hash: block.previous_hash,
    }
}

/// Create a new transaction
///
/// Verifies, vets and queues a transfer
#[utoipa::path(
    post,
    path = "/transactions/new",
    request_body = TransactionRequest,
    responses(
        (status = 201, description = "Transaction accepted", body = TransactionResponse),
        (status = 400, description = "Transaction rejected")
    )
)]
pub async fn new_transaction(
    node: NodeData,
    transaction_req: web::Json<TransactionRequest>,
) -> impl Responder {
    let request = transaction_req.into_inner();

    match node.submit_transaction(
        &request.sender,
        &request.recipient,
        request.amount,
        request.signature,
        request.public_key,
    ) {
        Ok(block_index) => HttpResponse::Created().json(TransactionResponse {
            message: format!("Transaction will be added to Block {}", block_index),
            block_index,
        }),
        Err(err) => error_response(&err),
    }
}

/// Get all pending transactions
#[utoipa::path(
    get,
    path = "/transactions/pending",
    responses(
        (status = 200, description = "Pending transactions retrieved successfully", body = Vec<Transaction>)
    )
)]
pub async fn get_pending_transactions(node: NodeData) -> impl Responder {
    HttpResponse::Ok().json(node.pending_transactions())
}

/// Get an account balance
#[utoipa::path(
    get,
    path = "/balance/{account}",
    params(
        ("account" = String, Path, description = "Account identifier")
    ),
    responses(
        (status = 200, description = "Balance retrieved successfully", body = BalanceResponse)
    )
)]
pub async fn get_balance(node: NodeData, account: web::Path<String>) -> impl Responder {
    let account = account.into_inner();
    let balance = node.balance(&account);

    HttpResponse::Ok().json(BalanceResponse { account, balance })
}

/// Get every tracked balance
#[utoipa::path(
    get,
    path = "/balances",
    responses(
        (status = 200, description = "Balances retrieved successfully", body = Vec<BalanceResponse>)
    )
)]
pub async fn get_balances(node: NodeData) -> impl Responder {
    let balances: Vec<BalanceResponse> = node
        .balances()
        .into_iter()
        .map(|(account, balance)| BalanceResponse {
            account: account.to_string(),
            balance,
        })
        .collect();

    HttpResponse::Ok().json(balances)
}

/// Validate the local chain
#[utoipa::path(
    get,
    path = "/validate",
    responses(
        (status = 200, description = "Chain validation result", body = ValidateResponse)
    )
)]
pub async fn validate_chain(node: NodeData) -> impl Responder {
    HttpResponse::Ok().json(ValidateResponse {
        valid: node.is_chain_valid(),
    })
}

/// Register peers
#[utoipa::path(
    post,
    path = "/nodes/register",
    request_body = RegisterNodesRequest,
    responses(
        (status = 201, description = "Peers registered", body = RegisterNodesResponse),
        (status = 400, description = "Invalid peer address")
    )
)]
pub async fn register_nodes(
    node: NodeData,
    register_req: web::Json<RegisterNodesRequest>,
) -> impl Responder {
    if let Err(err) = node.register_peers(&register_req.nodes) {
        return error_response(&err.into());
    }

    HttpResponse::Created().json(RegisterNodesResponse {
        message: "New nodes have been added".to_string(),
        total_nodes: node.get_peers(),
    })
}

/// List known peers
#[utoipa::path(
    get,
    path = "/nodes/peers",
    responses(
        (status = 200, description = "Known peers", body = Vec<String>)
    )
)]
pub async fn get_peers(node: NodeData) -> impl Responder {
    HttpResponse::Ok().json(node.get_peers())
}

/// Resolve conflicts with peers
///
/// Adopts the longest valid chain among the known peers
#[utoipa::path(
    get,
    path = "/nodes/resolve",
    responses(
        (status = 200, description = "Resolution finished", body = ResolveResponse)
    )
)]
pub async fn resolve_conflicts(node: NodeData) -> impl Responder {
    let Resolution { replaced, chain } = node.resolve_consensus().await;

    let message = if replaced {
        "Our chain was replaced"
    } else {
        "Our chain is authoritative"
    };

    HttpResponse::Ok().json(ResolveResponse {
        message: message.to_string(),
        replaced,
        chain,
    })
}

/// Generate a keypair
///
/// The private key is not stored by the node
#[utoipa::path(
    get,
    path = "/generate_keypair",
    responses(
        (status = 200, description = "Keypair generated", body = EncodedKeyPair)
    )
)]
pub async fn generate_keypair(node: NodeData) -> impl Responder {
    let keypair: EncodedKeyPair = node.generate_keypair();
    HttpResponse::Ok().json(keypair)
}

/// Deploy a contract
#[utoipa::path(
    post,
    path = "/contracts/deploy",
    request_body = DeployContractRequest,
    responses(
        (status = 201, description = "Contract deployed", body = DeployContractResponse)
    )
)]
pub async fn deploy_contract(
    node: NodeData,
    deploy_req: web::Json<DeployContractRequest>,
) -> impl Responder {
    let address = node.deploy_contract(&deploy_req.code);

    HttpResponse::Created().json(DeployContractResponse {
        message: "Contract deployed".to_string(),
        address,
    })
}

/// Execute a contract against a transaction
#[utoipa::path(
    post,
    path = "/contracts/execute",
    request_body = ExecuteContractRequest,
    responses(
        (status = 200, description = "Contract evaluated", body = ExecuteContractResponse),
        (status = 404, description = "Unknown contract")
    )
)]
pub async fn execute_contract(
    node: NodeData,
    execute_req: web::Json<ExecuteContractRequest>,
) -> impl Responder {
    match node.execute_contract(&execute_req.address, &execute_req.transaction) {
        Ok(result) => HttpResponse::Ok().json(ExecuteContractResponse { result }),
        Err(err) => error_response(&err.into()),
    }
}

/// Put admissions under a deployed contract
#[utoipa::path(
    post,
    path = "/contracts/govern",
    request_body = GovernRequest,
    responses(
        (status = 200, description = "Governing contract set"),
        (status = 404, description = "Unknown contract")
    )
)]
pub async fn set_governing_contract(
    node: NodeData,
    govern_req: web::Json<GovernRequest>,
) -> impl Responder {
    match node.set_governing_contract(&govern_req.address) {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "message": format!("Transactions are now governed by {}", govern_req.address)
        })),
        Err(err) => error_response(&err.into()),
    }
}

/// Stop vetting admissions with a contract
#[utoipa::path(
    delete,
    path = "/contracts/govern",
    responses(
        (status = 200, description = "Governing contract cleared")
    )
)]
pub async fn clear_governing_contract(node: NodeData) -> impl Responder {
    node.clear_governing_contract();
    HttpResponse::Ok().json(serde_json::json!({ "message": "Governing contract cleared" }))
}
