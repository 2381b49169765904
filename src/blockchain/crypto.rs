use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Decoding error: {0}")]
    DecodingError(String),
}

/// A keypair in its exchange encoding
///
/// The public key is base58, the private key is hex. Both round-trip
/// through [`KeyPair::from_private_key_hex`].
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EncodedKeyPair {
    /// Hex-encoded 32 byte Ed25519 secret
    pub private_key: String,

    /// Base58-encoded Ed25519 verifying key
    pub public_key: String,
}

/// An Ed25519 keypair used to sign transactions
#[derive(Debug, Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl KeyPair {
    /// Generates a fresh keypair from the OS random source
    pub fn generate() -> Self {
        let mut csprng = OsRng;
        let signing_key = SigningKey::generate(&mut csprng);
        let verifying_key = VerifyingKey::from(&signing_key);

        KeyPair {
            signing_key,
            verifying_key,
        }
    }

    /// Restores a keypair from a hex-encoded secret key
    pub fn from_private_key_hex(private_key: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(private_key)
            .map_err(|e| CryptoError::DecodingError(e.to_string()))?;

        let bytes_array: [u8; 32] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidPrivateKey("Invalid private key length".to_string())
        })?;

        let signing_key = SigningKey::from_bytes(&bytes_array);
        let verifying_key = VerifyingKey::from(&signing_key);

        Ok(KeyPair {
            signing_key,
            verifying_key,
        })
    }

    /// Base58 encoding of the verifying key
    pub fn public_key(&self) -> String {
        bs58::encode(self.verifying_key.as_bytes()).into_string()
    }

    /// Hex encoding of the secret key
    pub fn private_key_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    pub fn encode(&self) -> EncodedKeyPair {
        EncodedKeyPair {
            private_key: self.private_key_hex(),
            public_key: self.public_key(),
        }
    }

    /// Signs a message, returning the hex-encoded signature
    ///
    /// Ed25519 signing is deterministic: the same key and message always
    /// produce the same signature.
    pub fn sign(&self, message: &[u8]) -> String {
        hex::encode(self.signing_key.sign(message).to_bytes())
    }
}

/// Decodes a base58 verifying key
pub fn decode_public_key(public_key: &str) -> Result<VerifyingKey, CryptoError> {
    let bytes = bs58::decode(public_key)
        .into_vec()
        .map_err(|e| CryptoError::DecodingError(e.to_string()))?;

    let bytes_array: [u8; 32] = bytes.try_into().map_err(|_| {
        CryptoError::InvalidPublicKey("Invalid public key length".to_string())
    })?;

    VerifyingKey::from_bytes(&bytes_array)
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
}

/// Decodes a hex signature
pub fn decode_signature(signature: &str) -> Result<Signature, CryptoError> {
    let bytes = hex::decode(signature)
        .map_err(|e| CryptoError::DecodingError(e.to_string()))?;

    let signature_bytes: [u8; 64] = bytes.try_into().map_err(|_| {
        CryptoError::InvalidSignature("Invalid signature length".to_string())
    })?;

    Ok(Signature::from_bytes(&signature_bytes))
}

/// Verifies a hex signature over `message` against a base58 public key
///
/// Returns `Ok(false)` for a well-formed signature that does not match, and
/// an error when either encoding cannot be decoded.
pub fn verify_signature(
    message: &[u8],
    signature: &str,
    public_key: &str,
) -> Result<bool, CryptoError> {
    let public_key = decode_public_key(public_key)?;
    let signature = decode_signature(signature)?;

    match public_key.verify(message, &signature) {
        Ok(_) => Ok(true),
        Err(_) => Ok(false),
    }
}
