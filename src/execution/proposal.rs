//! Proposal kind → Safe call.
//!
//! Each [`ProposalKind`] has one handler in [`HANDLERS`]. Owner management
//! calls target the Safe itself.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolCall;

use crate::blockchain::contracts::{ISafe, SENTINEL_OWNERS};
use crate::execution::hash::SafeCall;
use crate::execution::ExecutionError;
use crate::store::ProposalKind;

/// On-chain facts a handler may need.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    pub safe: Address,
    /// Current owners in linked-list order. Only loaded for owner management.
    pub owners: Vec<Address>,
}

type Handler = fn(&ProposalKind, &CallContext) -> Result<SafeCall, ExecutionError>;

pub const HANDLERS: &[(&str, Handler)] = &[
    ("transfer", transfer),
    ("contract_call", contract_call),
    ("add_owner", add_owner),
    ("remove_owner", remove_owner),
    ("change_threshold", change_threshold),
];

/// Whether building the call needs the Safe's owner list.
pub fn needs_owners(kind: &ProposalKind) -> bool {
    matches!(
        kind,
        ProposalKind::AddOwner { .. } | ProposalKind::RemoveOwner { .. } | ProposalKind::ChangeThreshold { .. }
    )
}

pub fn build_call(kind: &ProposalKind, ctx: &CallContext) -> Result<SafeCall, ExecutionError> {
    let name = kind.name();
    let (_, handler) = HANDLERS
        .iter()
        .find(|(n, _)| *n == name)
        .ok_or_else(|| ExecutionError::InvalidProposal(format!("no handler for {}", name)))?;
    handler(kind, ctx)
}

/// Owner preceding `owner` in the Safe's linked list.
pub fn previous_owner(owners: &[Address], owner: Address) -> Result<Address, ExecutionError> {
    match owners.iter().position(|o| *o == owner) {
        Some(0) => Ok(SENTINEL_OWNERS),
        Some(i) => Ok(owners[i - 1]),
        None => Err(ExecutionError::OwnerNotFound(owner)),
    }
}

fn mismatch(kind: &ProposalKind) -> ExecutionError {
    ExecutionError::InvalidProposal(format!("handler mismatch for {}", kind.name()))
}

fn check_threshold(threshold: u32, owner_count: usize) -> Result<(), ExecutionError> {
    if threshold == 0 || threshold as usize > owner_count {
        return Err(ExecutionError::InvalidProposal(format!(
            "threshold {} invalid for {} owners",
            threshold, owner_count
        )));
    }
    Ok(())
}

fn self_call(ctx: &CallContext, data: Vec<u8>) -> SafeCall {
    SafeCall {
        to: ctx.safe,
        value: U256::ZERO,
        data: Bytes::from(data),
    }
}

fn transfer(kind: &ProposalKind, _ctx: &CallContext) -> Result<SafeCall, ExecutionError> {
    let ProposalKind::Transfer { to, value } = kind else {
        return Err(mismatch(kind));
    };
    Ok(SafeCall {
        to: *to,
        value: *value,
        data: Bytes::new(),
    })
}

fn contract_call(kind: &ProposalKind, _ctx: &CallContext) -> Result<SafeCall, ExecutionError> {
    let ProposalKind::ContractCall { to, value, data } = kind else {
        return Err(mismatch(kind));
    };
    Ok(SafeCall {
        to: *to,
        value: *value,
        data: data.clone(),
    })
}

fn add_owner(kind: &ProposalKind, ctx: &CallContext) -> Result<SafeCall, ExecutionError> {
    let ProposalKind::AddOwner { owner, threshold } = kind else {
        return Err(mismatch(kind));
    };
    if owner.is_zero() || *owner == SENTINEL_OWNERS || ctx.owners.contains(owner) {
        return Err(ExecutionError::InvalidProposal(format!("cannot add owner {}", owner)));
    }
    check_threshold(*threshold, ctx.owners.len() + 1)?;

    let data = ISafe::addOwnerWithThresholdCall {
        owner: *owner,
        _threshold: U256::from(*threshold),
    }
    .abi_encode();
    Ok(self_call(ctx, data))
}

fn remove_owner(kind: &ProposalKind, ctx: &CallContext) -> Result<SafeCall, ExecutionError> {
    let ProposalKind::RemoveOwner { owner, threshold } = kind else {
        return Err(mismatch(kind));
    };
    let prev_owner = previous_owner(&ctx.owners, *owner)?;
    check_threshold(*threshold, ctx.owners.len() - 1)?;

    let data = ISafe::removeOwnerCall {
        prevOwner: prev_owner,
        owner: *owner,
        _threshold: U256::from(*threshold),
    }
    .abi_encode();
    Ok(self_call(ctx, data))
}

fn change_threshold(kind: &ProposalKind, ctx: &CallContext) -> Result<SafeCall, ExecutionError> {
    let ProposalKind::ChangeThreshold { threshold } = kind else {
        return Err(mismatch(kind));
    };
    check_threshold(*threshold, ctx.owners.len())?;

    let data = ISafe::changeThresholdCall {
        _threshold: U256::from(*threshold),
    }
    .abi_encode();
    Ok(self_call(ctx, data))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> CallContext {
        CallContext {
            safe: Address::repeat_byte(0x5a),
            owners: vec![
                Address::repeat_byte(0xaa),
                Address::repeat_byte(0xbb),
                Address::repeat_byte(0xcc),
            ],
        }
    }

    #[test]
    fn test_every_kind_has_a_handler() {
        let kinds = [
            ProposalKind::Transfer { to: Address::ZERO, value: U256::ZERO },
            ProposalKind::ContractCall { to: Address::ZERO, value: U256::ZERO, data: Bytes::new() },
            ProposalKind::AddOwner { owner: Address::ZERO, threshold: 1 },
            ProposalKind::RemoveOwner { owner: Address::ZERO, threshold: 1 },
            ProposalKind::ChangeThreshold { threshold: 1 },
        ];
        for kind in kinds {
            assert!(HANDLERS.iter().any(|(name, _)| *name == kind.name()), "{}", kind.name());
        }
    }

    #[test]
    fn test_transfer() {
        let to = Address::repeat_byte(0x01);
        let call = build_call(&ProposalKind::Transfer { to, value: U256::from(5) }, &ctx()).unwrap();
        assert_eq!(call.to, to);
        assert_eq!(call.value, U256::from(5));
        assert!(call.data.is_empty());
    }

    #[test]
    fn test_contract_call_passes_data_through() {
        let data = Bytes::from(vec![0xde, 0xad]);
        let call = build_call(
            &ProposalKind::ContractCall { to: Address::repeat_byte(1), value: U256::ZERO, data: data.clone() },
            &ctx(),
        )
        .unwrap();
        assert_eq!(call.data, data);
    }

    #[test]
    fn test_add_owner_targets_safe() {
        let owner = Address::repeat_byte(0xdd);
        let call = build_call(&ProposalKind::AddOwner { owner, threshold: 2 }, &ctx()).unwrap();
        assert_eq!(call.to, ctx().safe);
        assert_eq!(call.value, U256::ZERO);

        let decoded = ISafe::addOwnerWithThresholdCall::abi_decode(&call.data).unwrap();
        assert_eq!(decoded.owner, owner);
        assert_eq!(decoded._threshold, U256::from(2));
    }

    #[test]
    fn test_add_existing_owner_rejected() {
        let err = build_call(
            &ProposalKind::AddOwner { owner: Address::repeat_byte(0xaa), threshold: 2 },
            &ctx(),
        )
        .unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidProposal(_)));
    }

    #[test]
    fn test_remove_owner_resolves_prev_owner() {
        let call = build_call(
            &ProposalKind::RemoveOwner { owner: Address::repeat_byte(0xbb), threshold: 1 },
            &ctx(),
        )
        .unwrap();
        let decoded = ISafe::removeOwnerCall::abi_decode(&call.data).unwrap();
        assert_eq!(decoded.prevOwner, Address::repeat_byte(0xaa));

        let call = build_call(
            &ProposalKind::RemoveOwner { owner: Address::repeat_byte(0xaa), threshold: 1 },
            &ctx(),
        )
        .unwrap();
        let decoded = ISafe::removeOwnerCall::abi_decode(&call.data).unwrap();
        assert_eq!(decoded.prevOwner, SENTINEL_OWNERS);
    }

    #[test]
    fn test_remove_unknown_owner() {
        let err = build_call(
            &ProposalKind::RemoveOwner { owner: Address::repeat_byte(0x77), threshold: 1 },
            &ctx(),
        )
        .unwrap_err();
        assert!(matches!(err, ExecutionError::OwnerNotFound(_)));
    }

    #[test]
    fn test_threshold_bounds() {
        assert!(build_call(&ProposalKind::ChangeThreshold { threshold: 3 }, &ctx()).is_ok());
        assert!(build_call(&ProposalKind::ChangeThreshold { threshold: 4 }, &ctx()).is_err());
        assert!(build_call(&ProposalKind::ChangeThreshold { threshold: 0 }, &ctx()).is_err());
        // Removing leaves two owners.
        assert!(build_call(
            &ProposalKind::RemoveOwner { owner: Address::repeat_byte(0xcc), threshold: 3 },
            &ctx()
        )
        .is_err());
    }
}
