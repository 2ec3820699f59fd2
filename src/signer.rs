//! Base-chain signers
//!
//! A signer owns a secp256k1 key and knows its base-chain address. The rollup
//! account of a wallet is bound to this address, so the same signer always
//! yields the same rollup account.
//!
//! Test accounts derive from a fixed seed so addresses stay stable across
//! restarts (NEVER use them with real funds).

use secp256k1::{PublicKey, Secp256k1, SecretKey};
use sha2::{Digest as _, Sha256};
use sha3::{Digest, Keccak256};
use std::fmt;

use crate::models::Address;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Master seed for deterministic test keys
pub const TEST_ACCOUNT_SEED: &[u8; 32] = b"ZKBRIDGE_TEST_ACCOUNT_SEED_V0001";

/// Names of the built-in test accounts
pub const TEST_ACCOUNT_NAMES: [&str; 2] = ["ALICE", "BOB"];

// ============================================================================
// SIGNER TRAIT
// ============================================================================

/// Anything that controls a base-chain address
pub trait EthSigner: Send + Sync {
    fn address(&self) -> Address;
}

/// Signer backed by an in-process secp256k1 secret key
#[derive(Clone)]
pub struct LocalSigner {
    address: Address,
}

impl LocalSigner {
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::signing_only();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        let address = address_from_public_key(&public_key);
        LocalSigner { address }
    }

    /// Load from a 32-byte hex private key (with or without `0x`)
    pub fn from_hex(private_key: &str) -> Result<Self, secp256k1::Error> {
        let trimmed = private_key.trim();
        let hex_part = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(hex_part).map_err(|_| secp256k1::Error::InvalidSecretKey)?;
        let secret_key = SecretKey::from_slice(&bytes)?;
        Ok(Self::from_secret_key(secret_key))
    }

    pub fn random() -> Self {
        let secret_key = SecretKey::new(&mut rand::thread_rng());
        Self::from_secret_key(secret_key)
    }
}

impl EthSigner for LocalSigner {
    fn address(&self) -> Address {
        self.address
    }
}

impl fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address)
            .finish()
    }
}

/// Ethereum address: last 20 bytes of keccak256(uncompressed pubkey without prefix)
pub fn address_from_public_key(public_key: &PublicKey) -> Address {
    let uncompressed = public_key.serialize_uncompressed();
    let hash = Keccak256::digest(&uncompressed[1..]);
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&hash[12..]);
    Address::from_bytes(bytes)
}

// ============================================================================
// TEST ACCOUNTS
// ============================================================================

/// A named test account with a deterministic key
#[derive(Debug, Clone)]
pub struct TestAccount {
    pub name: String,
    pub signer: LocalSigner,
}

impl TestAccount {
    /// Derive the key as SHA256(seed || name)
    pub fn from_seed(seed: &[u8; 32], name: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(seed);
        hasher.update(name.as_bytes());
        let derived: [u8; 32] = hasher.finalize().into();

        // A SHA-256 output is a valid secp256k1 scalar with overwhelming
        // probability; rehash on the rare miss.
        let secret_key = match SecretKey::from_slice(&derived) {
            Ok(key) => key,
            Err(_) => {
                let rehashed: [u8; 32] = Sha256::digest(derived).into();
                SecretKey::from_slice(&rehashed).unwrap_or_else(|_| SecretKey::new(&mut rand::thread_rng()))
            }
        };

        TestAccount {
            name: name.to_string(),
            signer: LocalSigner::from_secret_key(secret_key),
        }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }
}

/// All built-in test accounts
pub fn test_accounts() -> Vec<TestAccount> {
    TEST_ACCOUNT_NAMES
        .iter()
        .map(|name| TestAccount::from_seed(TEST_ACCOUNT_SEED, name))
        .collect()
}
