use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use super::crypto::{verify_signature, KeyPair};
use super::hash::canonical_string;

/// Sender used for mining rewards; exempt from balance checks
pub const MINT_SENDER: &str = "0";

/// Errors that can occur during transaction operations
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Invalid transaction signature")]
    InvalidSignature,

    #[error("Malformed transaction: {0}")]
    MalformedTransaction(String),
}

/// An account identifier, or the mint sentinel `"0"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub String);

impl Address {
    pub fn mint() -> Self {
        Address(MINT_SENDER.to_string())
    }

    pub fn is_mint(&self) -> bool {
        self.0 == MINT_SENDER
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Address(s.to_string())
    }
}

impl From<String> for Address {
    fn from(s: String) -> Self {
        Address(s)
    }
}

/// Represents a transfer in the ledger
///
/// Two transactions are equal when every field matches, which is also how
/// the mempool identifies entries to remove.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Transaction {
    /// Sender's account
    #[schema(value_type = String)]
    pub sender: Address,

    /// Recipient's account
    #[schema(value_type = String)]
    pub recipient: Address,

    /// Amount being transferred
    pub amount: f64,

    /// Hex Ed25519 signature over the signing bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,

    /// Base58 Ed25519 public key the signature verifies against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

impl Transaction {
    /// Creates a new unsigned transaction
    pub fn new(sender: impl Into<Address>, recipient: impl Into<Address>, amount: f64) -> Self {
        Transaction {
            sender: sender.into(),
            recipient: recipient.into(),
            amount,
            signature: None,
            public_key: None,
        }
    }

    /// Creates a mint transaction (mining reward)
    pub fn new_mint(recipient: impl Into<Address>, amount: f64) -> Self {
        Transaction::new(Address::mint(), recipient, amount)
    }

    /// Attaches a signature and public key
    pub fn with_signature(mut self, signature: Option<String>, public_key: Option<String>) -> Self {
        self.signature = signature;
        self.public_key = public_key;
        self
    }

    /// Signs the transaction with the given keypair
    pub fn sign(mut self, keypair: &KeyPair) -> Self {
        let message = self.signing_bytes();
        self.signature = Some(keypair.sign(&message));
        self.public_key = Some(keypair.public_key());
        self
    }

    /// Canonical encoding of the transfer fields, used as the signed message
    ///
    /// Compact JSON of sender, recipient and amount with sorted keys.
    pub fn signing_bytes(&self) -> Vec<u8> {
        canonical_string(serde_json::json!({
            "sender": self.sender.0,
            "recipient": self.recipient.0,
            "amount": self.amount,
        }))
        .into_bytes()
    }

    pub fn is_mint(&self) -> bool {
        self.sender.is_mint()
    }

    /// Checks that the required fields carry usable values
    pub fn check_well_formed(&self) -> Result<(), TransactionError> {
        if self.sender.0.is_empty() {
            return Err(TransactionError::MalformedTransaction("missing sender".to_string()));
        }

        if self.recipient.0.is_empty() {
            return Err(TransactionError::MalformedTransaction("missing recipient".to_string()));
        }

        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err(TransactionError::MalformedTransaction(format!(
                "amount must be a non-negative number, got {}",
                self.amount
            )));
        }

        Ok(())
    }

    /// Verifies the attached signature, if any
    ///
    /// Unsigned transactions pass. A signature without a public key (or the
    /// reverse) is malformed.
    pub fn verify(&self) -> Result<(), TransactionError> {
        match (&self.signature, &self.public_key) {
            (None, None) => Ok(()),
            (Some(signature), Some(public_key)) => {
                match verify_signature(&self.signing_bytes(), signature, public_key) {
                    Ok(true) => Ok(()),
                    Ok(false) | Err(_) => Err(TransactionError::InvalidSignature),
                }
            }
            _ => Err(TransactionError::MalformedTransaction(
                "signature and public key must be supplied together".to_string(),
            )),
        }
    }
}
