//! Solidity ABI surfaces the dispatcher encodes against and the wallet decodes.
//!
//! The relayed calldata must be byte-identical to a direct call of these functions
//! (plus the trailing sender suffix), so the surfaces live in one place and both
//! sides derive their layout from it.

use alloy_sol_types::sol;

sol! {
    /// Capability query a dispatcher issues before relaying anything.
    interface ITrustProbe {
        function isTrustedForwarder(address forwarder) external view returns (bool);
    }

    /// Proof-gated wallet surface. Every mutating function returns a single
    /// outcome word (zero = success) rather than reverting on classified
    /// failures, so the dispatcher can hand distinct codes back to clients.
    interface IProofWallet {
        function execute(bytes proof, address to, uint256 value, bytes data)
            external
            payable
            returns (uint256);

        function executeWithFee(
            bytes proof,
            address to,
            uint256 value,
            bytes data,
            uint256 feeRate,
            address feeToken
        ) external payable returns (uint256);

        function executeBatch(bytes proof, address[] targets, uint256[] values, bytes[] datas)
            external
            payable
            returns (uint256);

        function executeBatchWithFee(
            bytes proof,
            address[] targets,
            uint256[] values,
            bytes[] datas,
            uint256 feeRate,
            address feeToken
        ) external payable returns (uint256);

        function changeTxPolicy(bytes proof, bytes32 newCommitment) external returns (uint256);

        function changeRecoveryPolicy(bytes proof, bytes32 newCommitment) external returns (uint256);
    }

    /// Deployment factory surface (address derivation is the factory's concern).
    interface IWalletFactory {
        function deploy(bytes initCode, bytes32 salt) external returns (address);
    }

    /// Fungible token surface consumed by the fee path.
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function transfer(address to, uint256 amount) external returns (bool);
        function transferFrom(address from, address to, uint256 amount) external returns (bool);
        function decimals() external view returns (uint8);
    }
}
