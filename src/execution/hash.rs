//! EIP-712 Safe transaction hash.
//!
//! ```text
//! domain = keccak(DOMAIN_TYPEHASH ∥ chainId ∥ safe)
//! struct = keccak(SAFE_TX_TYPEHASH ∥ to ∥ value ∥ keccak(data) ∥ operation
//!                 ∥ safeTxGas ∥ baseGas ∥ gasPrice ∥ gasToken ∥ refundReceiver ∥ nonce)
//! hash   = keccak(0x19 0x01 ∥ domain ∥ struct)
//! ```
//! Every field is one 32-byte word. Gas and refund fields are always zero:
//! the executor pays.

use alloy::primitives::{b256, keccak256, Address, Bytes, B256, U256};

use crate::blockchain::contracts::OPERATION_CALL;

/// `keccak256("EIP712Domain(uint256 chainId,address verifyingContract)")`
pub const DOMAIN_SEPARATOR_TYPEHASH: B256 =
    b256!("0x47e79534a245952e8b16893a336b85a3d9ea9fa8c573f3d803afb92a79469218");

/// `keccak256("SafeTx(address to,uint256 value,bytes data,uint8 operation,uint256 safeTxGas,uint256 baseGas,uint256 gasPrice,address gasToken,address refundReceiver,uint256 nonce)")`
pub const SAFE_TX_TYPEHASH: B256 =
    b256!("0xbb8310d486368db6bd6f849402fdd73ad53d316b5a4b2644ad6efe0f941286d8");

/// The inner call a Safe transaction performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeCall {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

/// Hashes Safe transactions for one Safe on one chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafeTxHashBuilder {
    chain_id: u64,
    safe: Address,
}

impl SafeTxHashBuilder {
    pub fn new(chain_id: u64, safe: Address) -> Self {
        Self { chain_id, safe }
    }

    pub fn domain_separator(&self) -> B256 {
        let mut buf = Vec::with_capacity(3 * 32);
        buf.extend_from_slice(DOMAIN_SEPARATOR_TYPEHASH.as_slice());
        buf.extend_from_slice(&U256::from(self.chain_id).to_be_bytes::<32>());
        buf.extend_from_slice(self.safe.into_word().as_slice());
        keccak256(buf)
    }

    pub fn struct_hash(&self, call: &SafeCall, nonce: u64) -> B256 {
        let zero_word = [0u8; 32];
        let mut buf = Vec::with_capacity(11 * 32);
        buf.extend_from_slice(SAFE_TX_TYPEHASH.as_slice());
        buf.extend_from_slice(call.to.into_word().as_slice());
        buf.extend_from_slice(&call.value.to_be_bytes::<32>());
        buf.extend_from_slice(keccak256(&call.data).as_slice());
        buf.extend_from_slice(&U256::from(OPERATION_CALL).to_be_bytes::<32>());
        buf.extend_from_slice(&zero_word); // safeTxGas
        buf.extend_from_slice(&zero_word); // baseGas
        buf.extend_from_slice(&zero_word); // gasPrice
        buf.extend_from_slice(&zero_word); // gasToken
        buf.extend_from_slice(&zero_word); // refundReceiver
        buf.extend_from_slice(&U256::from(nonce).to_be_bytes::<32>());
        keccak256(buf)
    }

    /// The hash owners sign for `call` at `nonce`.
    pub fn hash(&self, call: &SafeCall, nonce: u64) -> B256 {
        let mut buf = Vec::with_capacity(2 + 2 * 32);
        buf.extend_from_slice(&[0x19, 0x01]);
        buf.extend_from_slice(self.domain_separator().as_slice());
        buf.extend_from_slice(self.struct_hash(call, nonce).as_slice());
        keccak256(buf)
    }
}
