//! `ProxyCreation` log decoding.
//!
//! Factory versions emit the same event signature two ways:
//! ```text
//! legacy   topics = [sig]           data = 0x00 * 12 ∥ proxy(20) ∥ singleton(32)
//! indexed  topics = [sig, proxy]    data = singleton(32)
//! ```
//! The shape of the log picks the rule; anything else is rejected.

use alloy::primitives::{Address, B256};
use thiserror::Error;

use crate::blockchain::contracts::PROXY_CREATION_TOPIC;
use crate::blockchain::ChainLog;

/// How the proxy address was carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreationEncoding {
    /// Address in the first data word.
    Legacy,
    /// Address in topic1.
    Indexed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CreationLogError {
    #[error("not a ProxyCreation log")]
    WrongTopic,

    #[error("unexpected ProxyCreation shape: {topics} topics, {data_len} data bytes")]
    UnexpectedShape { topics: usize, data_len: usize },

    #[error("non-zero padding in address word")]
    DirtyPadding,

    #[error("ProxyCreation carries the zero address")]
    ZeroAddress,
}

/// A decoded creation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreationEvent {
    pub proxy: Address,
    pub encoding: CreationEncoding,
}

/// Is this a `ProxyCreation` log from `factory`?
pub fn is_creation_log(log: &ChainLog, factory: Address) -> bool {
    log.address == factory && log.topics.first() == Some(&PROXY_CREATION_TOPIC)
}

/// Extract the deployed proxy address from a `ProxyCreation` log.
pub fn decode_creation_log(log: &ChainLog) -> Result<CreationEvent, CreationLogError> {
    if log.topics.first() != Some(&PROXY_CREATION_TOPIC) {
        return Err(CreationLogError::WrongTopic);
    }

    let (word, encoding) = match log.topics.len() {
        1 if log.data.len() >= 32 => (&log.data[..32], CreationEncoding::Legacy),
        2 | 3 => (log.topics[1].as_slice(), CreationEncoding::Indexed),
        topics => {
            return Err(CreationLogError::UnexpectedShape {
                topics,
                data_len: log.data.len(),
            })
        }
    };

    let proxy = address_from_word(word)?;
    if proxy.is_zero() {
        return Err(CreationLogError::ZeroAddress);
    }
    Ok(CreationEvent { proxy, encoding })
}

/// The first creation address among `logs` emitted by `factory`.
///
/// `None` when no log matches; the last decode error when every match is
/// malformed.
pub fn find_creation_address(
    logs: &[ChainLog],
    factory: Address,
) -> Option<Result<Address, CreationLogError>> {
    let mut last_error = None;
    for log in logs.iter().filter(|l| is_creation_log(l, factory)) {
        match decode_creation_log(log) {
            Ok(event) => return Some(Ok(event.proxy)),
            Err(e) => last_error = Some(e),
        }
    }
    last_error.map(Err)
}

fn address_from_word(word: &[u8]) -> Result<Address, CreationLogError> {
    let word = B256::from_slice(word);
    if word[..12].iter().any(|b| *b != 0) {
        return Err(CreationLogError::DirtyPadding);
    }
    Ok(Address::from_word(word))
}
