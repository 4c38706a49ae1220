//! Safe contract interfaces.

use alloy::primitives::{address, Address, B256};
use alloy::sol;
use alloy::sol_types::SolEvent;

sol! {
    /// Safe singleton functions the coordinator calls or encodes.
    #[derive(Debug, PartialEq, Eq)]
    interface ISafe {
        function execTransaction(
            address to,
            uint256 value,
            bytes calldata data,
            uint8 operation,
            uint256 safeTxGas,
            uint256 baseGas,
            uint256 gasPrice,
            address gasToken,
            address refundReceiver,
            bytes memory signatures
        ) external payable returns (bool success);

        function nonce() external view returns (uint256);

        function getOwners() external view returns (address[] memory);

        function addOwnerWithThreshold(address owner, uint256 _threshold) external;

        function removeOwner(address prevOwner, address owner, uint256 _threshold) external;

        function changeThreshold(uint256 _threshold) external;
    }

    /// Safe proxy factory.
    #[derive(Debug, PartialEq, Eq)]
    interface ISafeProxyFactory {
        /// Emitted when a new Safe proxy is deployed.
        event ProxyCreation(address proxy, address singleton);
    }
}

/// Head of the Safe owner linked list.
pub const SENTINEL_OWNERS: Address = address!("0x0000000000000000000000000000000000000001");

/// `operation` value for a plain CALL.
pub const OPERATION_CALL: u8 = 0;

/// topic0 of `ProxyCreation(address,address)`, indexed or not.
pub const PROXY_CREATION_TOPIC: B256 = ISafeProxyFactory::ProxyCreation::SIGNATURE_HASH;
