//! Chain access seam
//!
//! The transaction engine only talks to a network through [`ChainClient`].
//! Production uses [`rpc::JsonRpcClient`]; tests plug in counting mocks.

pub mod decode;
#[cfg(test)]
pub mod mock;
pub mod rpc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::errors::ChainError;

pub use rpc::JsonRpcClient;

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Authoritative transaction count (pending) for `address`
    async fn transaction_count(&self, address: &str) -> Result<u64, ChainError>;

    /// Decode the signed payload and estimate the gas it will consume
    async fn estimate_gas(&self, signed_payload: &[u8], from_address: &str)
        -> Result<u64, ChainError>;

    /// Submit the signed payload; returns the network transaction hash
    async fn send_raw_transaction(&self, signed_payload: &[u8]) -> Result<String, ChainError>;
}

/// Lowercase hex with 0x prefix
pub fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("0x");
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

/// Transaction identifier used in logs: hex SHA-256 of the signed payload
pub fn tx_id(signed_payload: &[u8]) -> String {
    let digest = Sha256::digest(signed_payload);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Addresses are keyed case-insensitively everywhere
pub fn normalize_address(address: &str) -> String {
    address.trim().to_lowercase()
}
