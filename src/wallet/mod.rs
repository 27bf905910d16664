//! Boundary to the chain-side collaborators: balance reads, the stake
//! reduction made when a session starts, and the two payout actions.

pub mod balance;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::error::WalletError;

pub use balance::BalanceCache;
pub use memory::{InMemoryWallet, WalletCall, WalletOp};

/// Identifier of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHandle(pub String);

impl fmt::Display for TxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Payout chosen by the user once a session completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClaimKind {
    /// Fungible token payout.
    Staking,
    /// NFT tree mint.
    Tree,
}

impl FromStr for ClaimKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "staking" | "token" | "tokens" => Ok(ClaimKind::Staking),
            "tree" | "nft" | "mint" => Ok(ClaimKind::Tree),
            other => Err(format!("unknown claim kind '{other}'")),
        }
    }
}

#[async_trait]
pub trait Wallet: Send + Sync {
    async fn virtual_balance(&self, address: &str) -> Result<f64, WalletError>;

    async fn reduce_balance(&self, address: &str, amount: f64) -> Result<TxHandle, WalletError>;

    async fn claim_staking(&self, address: &str, total: f64) -> Result<TxHandle, WalletError>;

    async fn mint_tree(&self, address: &str, total: f64) -> Result<TxHandle, WalletError>;

    async fn claim(
        &self,
        kind: ClaimKind,
        address: &str,
        total: f64,
    ) -> Result<TxHandle, WalletError> {
        match kind {
            ClaimKind::Staking => self.claim_staking(address, total).await,
            ClaimKind::Tree => self.mint_tree(address, total).await,
        }
    }
}
