//! Owner signature verification and packing.
//!
//! The Safe contract checks signatures in ascending signer order, each as
//! `r(32) ∥ s(32) ∥ v(1)` with `v` in {27, 28}.

use alloy::hex;
use alloy::primitives::{Address, Bytes, Signature, B256, U256};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::execution::ExecutionError;
use crate::observability::metrics;
use crate::store::SignatureRecord;

pub const SIGNATURE_LEN: usize = 65;

/// Why a signature was left out.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureDefect {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("expected 65 bytes, got {0}")]
    WrongLength(usize),

    #[error("signer could not be recovered")]
    Unrecoverable,

    #[error("recovered {recovered}, expected {expected}")]
    SignerMismatch { expected: Address, recovered: Address },

    #[error("duplicate signature from {0}")]
    Duplicate(Address),
}

impl SignatureDefect {
    /// Metric label.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::InvalidHex(_) => "invalid_hex",
            Self::WrongLength(_) => "wrong_length",
            Self::Unrecoverable => "unrecoverable",
            Self::SignerMismatch { .. } => "signer_mismatch",
            Self::Duplicate(_) => "duplicate",
        }
    }
}

/// Recovery parity encoded by `v`, for the conventions owners' wallets use.
///
/// `0/1` raw, `27/28` legacy, `>= 35` EIP-155 (`chain_id * 2 + 35 + parity`).
pub fn parity_from_v(v: u8) -> Option<bool> {
    match v {
        0 | 1 => Some(v == 1),
        27 | 28 => Some(v == 28),
        35..=u8::MAX => Some((v - 35) % 2 == 1),
        _ => None,
    }
}

/// Packed, ordered signatures ready for `execTransaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregated {
    pub signatures: Bytes,
    /// Signers in packing order.
    pub signers: Vec<Address>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureAggregator;

impl SignatureAggregator {
    /// Check one signature against `target_hash`.
    ///
    /// Returns the 65 bytes with `v` normalised to 27/28.
    pub fn verify(target_hash: B256, expected: Address, signature_hex: &str) -> Result<[u8; SIGNATURE_LEN], SignatureDefect> {
        let trimmed = signature_hex.trim();
        let raw = hex::decode(trimmed.strip_prefix("0x").unwrap_or(trimmed))
            .map_err(|e| SignatureDefect::InvalidHex(e.to_string()))?;
        let bytes: [u8; SIGNATURE_LEN] = raw
            .as_slice()
            .try_into()
            .map_err(|_| SignatureDefect::WrongLength(raw.len()))?;

        let r = U256::from_be_slice(&bytes[..32]);
        let s = U256::from_be_slice(&bytes[32..64]);
        let recover = |parity: bool| {
            Signature::new(r, s, parity)
                .recover_address_from_prehash(&target_hash)
                .ok()
        };

        let parity = match parity_from_v(bytes[64]).and_then(|p| recover(p).map(|a| (p, a))) {
            Some((parity, recovered)) => {
                if recovered != expected {
                    return Err(SignatureDefect::SignerMismatch { expected, recovered });
                }
                parity
            }
            // Unknown `v` or a failed recovery: try both parities, at most twice.
            None => [false, true]
                .into_iter()
                .find(|p| recover(*p) == Some(expected))
                .ok_or(SignatureDefect::Unrecoverable)?,
        };

        let mut normalised = bytes;
        normalised[64] = 27 + u8::from(parity);
        Ok(normalised)
    }

    /// Verify, de-duplicate, order and pack `signatures`.
    ///
    /// Defective signatures are logged and skipped. Fails when fewer than
    /// `required` survive.
    pub fn aggregate(
        target_hash: B256,
        signatures: &[SignatureRecord],
        required: usize,
        current_nonce: u64,
    ) -> Result<Aggregated, ExecutionError> {
        // Ordered by signer: Address compares as a big-endian number.
        let mut accepted: BTreeMap<Address, [u8; SIGNATURE_LEN]> = BTreeMap::new();

        for record in signatures {
            let result = if accepted.contains_key(&record.signer) {
                Err(SignatureDefect::Duplicate(record.signer))
            } else {
                Self::verify(target_hash, record.signer, &record.signature)
            };

            match result {
                Ok(bytes) => {
                    accepted.insert(record.signer, bytes);
                }
                Err(defect) => {
                    metrics::record_signature_rejected(defect.reason());
                    tracing::warn!(
                        signature_id = %record.id,
                        signer = %record.signer,
                        reason = %defect,
                        "Excluding signature"
                    );
                }
            }
        }

        if accepted.len() < required {
            return Err(ExecutionError::SignatureQuorum {
                current_nonce,
                valid: accepted.len(),
                required,
            });
        }

        let mut packed = Vec::with_capacity(accepted.len() * SIGNATURE_LEN);
        for bytes in accepted.values() {
            packed.extend_from_slice(bytes);
        }
        Ok(Aggregated {
            signatures: Bytes::from(packed),
            signers: accepted.into_keys().collect(),
        })
    }
}
