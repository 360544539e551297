//! Solidity bindings for the two benchmark contracts.
//!
//! Bytecode is not compiled in; it is loaded at runtime by
//! [`ContractRegistry`](crate::registry::ContractRegistry).

use alloy::sol;

sol! {
    /// Holds native currency and hands a fixed share to each benchmark account.
    #[derive(Debug)]
    interface IValueDistributor {
        struct Beneficiary {
            address testAccount;
        }

        /// Credits every beneficiary in one transaction. Reverts as a whole.
        function addFunds(Beneficiary[] calldata beneficiaries) external;
    }

    /// Token that anyone holding gas can mint.
    #[derive(Debug)]
    interface IMintableToken {
        event Transfer(address indexed from, address indexed to, uint256 value);

        function mint(address to, uint256 amount) external;
        function totalSupply() external view returns (uint256);
    }
}
