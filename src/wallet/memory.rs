use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use log::info;
use uuid::Uuid;

use crate::error::WalletError;

use super::{TxHandle, Wallet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WalletOp {
    Balance,
    ReduceBalance,
    ClaimStaking,
    MintTree,
}

/// One recorded call against the wallet, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub struct WalletCall {
    pub op: WalletOp,
    pub address: String,
    pub amount: Option<f64>,
}

#[derive(Debug, Clone, Default)]
struct Account {
    balance: f64,
    claimed: f64,
    trees: Vec<u64>,
}

#[derive(Default)]
struct Ledger {
    accounts: HashMap<String, Account>,
    calls: Vec<WalletCall>,
    failures: HashMap<WalletOp, WalletError>,
    next_tree_id: u64,
}

/// Ledger simulator standing in for the chain-side wallet.
#[derive(Default)]
pub struct InMemoryWallet {
    ledger: Mutex<Ledger>,
}

impl InMemoryWallet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(address: &str, balance: f64) -> Self {
        let wallet = Self::new();
        wallet.deposit(address, balance);
        wallet
    }

    pub fn deposit(&self, address: &str, amount: f64) {
        let mut ledger = self.lock();
        ledger.accounts.entry(address.to_string()).or_default().balance += amount;
    }

    /// Makes the next call of `op` fail with `error`.
    pub fn fail_next(&self, op: WalletOp, error: WalletError) {
        self.lock().failures.insert(op, error);
    }

    pub fn balance_of(&self, address: &str) -> Option<f64> {
        self.lock().accounts.get(address).map(|account| account.balance)
    }

    pub fn claimed_by(&self, address: &str) -> f64 {
        self.lock()
            .accounts
            .get(address)
            .map(|account| account.claimed)
            .unwrap_or(0.0)
    }

    pub fn trees_of(&self, address: &str) -> Vec<u64> {
        self.lock()
            .accounts
            .get(address)
            .map(|account| account.trees.clone())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<WalletCall> {
        self.lock().calls.clone()
    }

    pub fn count(&self, op: WalletOp) -> usize {
        self.lock().calls.iter().filter(|call| call.op == op).count()
    }

    fn lock(&self) -> MutexGuard<'_, Ledger> {
        match self.ledger.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn record(
        &self,
        op: WalletOp,
        address: &str,
        amount: Option<f64>,
    ) -> Result<MutexGuard<'_, Ledger>, WalletError> {
        let mut ledger = self.lock();
        ledger.calls.push(WalletCall {
            op,
            address: address.to_string(),
            amount,
        });
        let failure = ledger.failures.remove(&op);
        match failure {
            Some(err) => Err(err),
            None => Ok(ledger),
        }
    }
}

fn new_tx() -> TxHandle {
    TxHandle(format!("0x{}", Uuid::new_v4().simple()))
}

#[async_trait]
impl Wallet for InMemoryWallet {
    async fn virtual_balance(&self, address: &str) -> Result<f64, WalletError> {
        let ledger = self.record(WalletOp::Balance, address, None)?;
        ledger
            .accounts
            .get(address)
            .map(|account| account.balance)
            .ok_or_else(|| WalletError::UnknownAccount(address.to_string()))
    }

    async fn reduce_balance(&self, address: &str, amount: f64) -> Result<TxHandle, WalletError> {
        let mut ledger = self.record(WalletOp::ReduceBalance, address, Some(amount))?;
        let account = ledger
            .accounts
            .get_mut(address)
            .ok_or_else(|| WalletError::UnknownAccount(address.to_string()))?;
        if account.balance < amount {
            return Err(WalletError::InsufficientFunds {
                available: account.balance,
                requested: amount,
            });
        }
        account.balance -= amount;
        let tx = new_tx();
        info!("Reduced balance of {} by {} ({})", address, amount, tx);
        Ok(tx)
    }

    async fn claim_staking(&self, address: &str, total: f64) -> Result<TxHandle, WalletError> {
        let mut ledger = self.record(WalletOp::ClaimStaking, address, Some(total))?;
        let account = ledger.accounts.entry(address.to_string()).or_default();
        account.balance += total;
        account.claimed += total;
        let tx = new_tx();
        info!("Paid {} tokens to {} ({})", total, address, tx);
        Ok(tx)
    }

    async fn mint_tree(&self, address: &str, total: f64) -> Result<TxHandle, WalletError> {
        let mut ledger = self.record(WalletOp::MintTree, address, Some(total))?;
        ledger.next_tree_id += 1;
        let tree_id = ledger.next_tree_id;
        let account = ledger.accounts.entry(address.to_string()).or_default();
        account.trees.push(tree_id);
        account.claimed += total;
        let tx = new_tx();
        info!("Minted tree #{} worth {} for {} ({})", tree_id, total, address, tx);
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::ClaimKind;
    use assert_matches::assert_matches;

    const ADDR: &str = "0xforest";

    #[tokio::test]
    async fn reduce_balance_debits_account() {
        let wallet = InMemoryWallet::with_account(ADDR, 10.0);
        wallet.reduce_balance(ADDR, 3.0).await.unwrap();
        assert_eq!(wallet.virtual_balance(ADDR).await.unwrap(), 7.0);
    }

    #[tokio::test]
    async fn reduce_balance_refuses_overdraft() {
        let wallet = InMemoryWallet::with_account(ADDR, 1.0);
        let err = wallet.reduce_balance(ADDR, 3.0).await.unwrap_err();
        assert_matches!(err, WalletError::InsufficientFunds { .. });
        assert_eq!(wallet.balance_of(ADDR), Some(1.0));
    }

    #[tokio::test]
    async fn unknown_account_has_no_balance() {
        let wallet = InMemoryWallet::new();
        let err = wallet.virtual_balance(ADDR).await.unwrap_err();
        assert_eq!(err, WalletError::UnknownAccount(ADDR.to_string()));
    }

    #[tokio::test]
    async fn claims_route_to_matching_action() {
        let wallet = InMemoryWallet::with_account(ADDR, 0.0);
        wallet.claim(ClaimKind::Staking, ADDR, 2.4).await.unwrap();
        wallet.claim(ClaimKind::Tree, ADDR, 1.0).await.unwrap();

        assert_eq!(wallet.balance_of(ADDR), Some(2.4));
        assert_eq!(wallet.trees_of(ADDR), vec![1]);
        assert_eq!(wallet.count(WalletOp::ClaimStaking), 1);
        assert_eq!(wallet.count(WalletOp::MintTree), 1);
    }

    #[tokio::test]
    async fn injected_failure_applies_once() {
        let wallet = InMemoryWallet::with_account(ADDR, 5.0);
        wallet.fail_next(
            WalletOp::ClaimStaking,
            WalletError::Unavailable("rpc timeout".into()),
        );

        assert!(wallet.claim_staking(ADDR, 1.0).await.is_err());
        assert!(wallet.claim_staking(ADDR, 1.0).await.is_ok());
        assert_eq!(wallet.count(WalletOp::ClaimStaking), 2);
    }
}
