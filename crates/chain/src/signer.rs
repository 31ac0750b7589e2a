//! EIP-1559 transaction signing and local nonce control.
//!
//! The nine-field core list (chain id, nonce, both fees, gas limit, to,
//! value, data, empty access list) is RLP-encoded by hand; the digest is
//! `keccak256(0x02 || rlp_core)`; secp256k1 yields `(r, s, recid)` and
//! `(yParity, r, s)` are appended as left-trimmed unsigned integers before
//! the full 12-field list is RLP-encoded again. The raw transaction is
//! `0x02 || rlp_full`. The wallet address is
//! `keccak256(pubkey[1..65])[12..32]`; an override is allowed for fork
//! testing against impersonated accounts.

use std::sync::atomic::{AtomicU64, Ordering};

use alloy::primitives::{Address, Bytes, U256};
use k256::ecdsa::SigningKey;

use crate::crypto::keccak::keccak256;
use crate::crypto::secp256k1;
use crate::error::Result;
use crate::rlp;
use crate::rpc::RpcClient;

/// The mutable fields of one submission attempt. Short-lived: built per
/// attempt, fee fields bumped in place under RBF, then signed again.
#[derive(Debug, Clone)]
pub struct TxFields {
    pub chain_id: u64,
    pub nonce: u64,
    pub gas_limit: u64,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

pub struct Wallet {
    key: SigningKey,
    address: Address,
}

impl Wallet {
    pub fn from_private_key(key: &str) -> Result<Self> {
        let key = secp256k1::parse_private_key(key)?;
        let address = secp256k1::derive_address(&key);
        Ok(Self { key, address })
    }

    /// Report a different address (fork testing with impersonation).
    pub fn with_address_override(mut self, address: Address) -> Self {
        self.address = address;
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign `fields` into the raw `0x02`-typed envelope ready for
    /// `eth_sendRawTransaction`.
    pub fn sign_transaction(&self, fields: &TxFields) -> Result<Bytes> {
        let core = rlp_core_fields(fields);
        let core_rlp = rlp::encode_list(&core);

        let mut preimage = Vec::with_capacity(1 + core_rlp.len());
        preimage.push(0x02);
        preimage.extend_from_slice(&core_rlp);
        let digest = keccak256(&preimage);

        let signature = secp256k1::sign_digest(&self.key, &digest)?;

        let mut full = core;
        full.push(rlp::encode_uint(signature.y_parity() as u128));
        full.push(rlp::encode_bytes(trim_leading_zeros(&signature.r)));
        full.push(rlp::encode_bytes(trim_leading_zeros(&signature.s)));
        let full_rlp = rlp::encode_list(&full);

        let mut raw = Vec::with_capacity(1 + full_rlp.len());
        raw.push(0x02);
        raw.extend_from_slice(&full_rlp);
        Ok(Bytes::from(raw))
    }
}

/// [chainId, nonce, maxPriorityFeePerGas, maxFeePerGas, gasLimit, to,
/// value, data, accessList].
fn rlp_core_fields(fields: &TxFields) -> Vec<Vec<u8>> {
    vec![
        rlp::encode_uint(fields.chain_id as u128),
        rlp::encode_uint(fields.nonce as u128),
        rlp::encode_uint(fields.max_priority_fee_per_gas),
        rlp::encode_uint(fields.max_fee_per_gas),
        rlp::encode_uint(fields.gas_limit as u128),
        rlp::encode_bytes(fields.to.as_slice()),
        rlp::encode_u256(fields.value),
        rlp::encode_bytes(&fields.data),
        rlp::encode_list(&[]),
    ]
}

fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[first..]
}

/// Strictly monotonic nonce source. Seeded once from the chain's pending
/// count; every issued value comes from a single atomic fetch-add, and RBF
/// bumps re-sign under the value already issued.
pub struct NonceManager {
    next: AtomicU64,
}

impl NonceManager {
    pub fn new(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }

    /// Resolve the initial value from `eth_getTransactionCount(addr, "pending")`.
    pub async fn from_pending(rpc: &RpcClient, address: Address) -> Result<Self> {
        let pending = rpc.transaction_count(address, "pending").await?;
        Ok(Self::new(pending))
    }

    #[inline]
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    #[inline]
    pub fn current(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }

    /// Advance to the chain's view if it is ahead; never moves backwards.
    pub fn sync(&self, chain_nonce: u64) {
        self.next.fetch_max(chain_nonce, Ordering::SeqCst);
    }

    /// Force a value (recovery after a dropped transaction).
    pub fn reset(&self, nonce: u64) {
        self.next.store(nonce, Ordering::SeqCst);
    }
}
