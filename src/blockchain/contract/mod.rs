//! Content-addressed rule contracts.
//!
//! A contract is rule source keyed by the SHA-256 of that source. Executing
//! a contract against a transaction yields approve or reject; anything short
//! of an explicit `approve()` is a reject.

pub mod interpreter;
pub mod lexer;
pub mod parser;

use std::sync::Arc;

use dashmap::DashMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use super::hash::sha256_hex;
use super::transaction::Transaction;
use interpreter::EvalError;
use parser::{Decision, ParseError};

/// Errors that can occur during contract operations
#[derive(Debug, Error)]
pub enum ContractError {
    #[error("Unknown contract: {0}")]
    UnknownContract(String),

    #[error("Transaction rejected by contract {0}")]
    Rejected(String),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Evaluation error: {0}")]
    Eval(#[from] EvalError),
}

/// A deployed rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Contract {
    /// SHA-256 hex of `code`
    pub address: String,

    /// Rule source
    pub code: String,
}

impl Contract {
    pub fn new(code: &str) -> Self {
        Contract {
            address: Contract::address_of(code),
            code: code.to_string(),
        }
    }

    /// The address `code` deploys to
    pub fn address_of(code: &str) -> String {
        sha256_hex(code.as_bytes())
    }

    /// Parses and runs the rule, surfacing any error
    pub fn evaluate(&self, transaction: &Transaction) -> Result<Decision, ContractError> {
        let program = parser::parse(&self.code)?;
        let decision = interpreter::run(&program, transaction)?;
        Ok(decision.unwrap_or(Decision::Reject))
    }

    /// Runs the rule; `true` only on an explicit approve
    ///
    /// Malformed code and evaluation errors are logged and count as reject.
    pub fn execute(&self, transaction: &Transaction) -> bool {
        match self.evaluate(transaction) {
            Ok(decision) => {
                debug!("Contract {} decided {:?}", self.address, decision);
                decision == Decision::Approve
            }
            Err(err) => {
                warn!("Contract {} failed, treating as reject: {}", self.address, err);
                false
            }
        }
    }
}

/// Deployed contracts by address
#[derive(Debug, Clone, Default)]
pub struct ContractRegistry {
    contracts: Arc<DashMap<String, Contract>>,
}

impl ContractRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `code`, returning its address
    ///
    /// Deploying the same code again re-registers the same entry.
    pub fn deploy(&self, code: &str) -> String {
        let contract = Contract::new(code);
        let address = contract.address.clone();
        self.contracts.insert(address.clone(), contract);
        address
    }

    pub fn get(&self, address: &str) -> Option<Contract> {
        self.contracts.get(address).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    /// Runs the contract at `address` against `transaction`
    pub fn execute(&self, address: &str, transaction: &Transaction) -> Result<bool, ContractError> {
        let contract = self
            .get(address)
            .ok_or_else(|| ContractError::UnknownContract(address.to_string()))?;

        Ok(contract.execute(transaction))
    }
}
