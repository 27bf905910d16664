use std::{sync::Arc, time::Duration};

use tokio::{sync::Mutex, time::Instant};

use crate::error::WalletError;

use super::Wallet;

/// Read-mostly view of an address's virtual balance.
///
/// `refresh` reuses a value fetched within the debounce window so rapid UI
/// refreshes collapse into one wallet read; `refresh_now` always goes to the
/// wallet and is what the start validation relies on.
pub struct BalanceCache {
    wallet: Arc<dyn Wallet>,
    address: String,
    debounce: Duration,
    last: Mutex<Option<(Instant, f64)>>,
}

impl BalanceCache {
    pub fn new(wallet: Arc<dyn Wallet>, address: impl Into<String>, debounce: Duration) -> Self {
        Self {
            wallet,
            address: address.into(),
            debounce,
            last: Mutex::new(None),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub async fn refresh(&self) -> Result<f64, WalletError> {
        let mut last = self.last.lock().await;
        if let Some((fetched_at, balance)) = *last {
            if fetched_at.elapsed() < self.debounce {
                return Ok(balance);
            }
        }
        let balance = self.wallet.virtual_balance(&self.address).await?;
        *last = Some((Instant::now(), balance));
        Ok(balance)
    }

    pub async fn refresh_now(&self) -> Result<f64, WalletError> {
        let mut last = self.last.lock().await;
        let balance = self.wallet.virtual_balance(&self.address).await?;
        *last = Some((Instant::now(), balance));
        Ok(balance)
    }

    /// Drops the cached value, e.g. after a write changed the balance.
    pub async fn invalidate(&self) {
        *self.last.lock().await = None;
    }

    pub async fn cached(&self) -> Option<f64> {
        self.last.lock().await.map(|(_, balance)| balance)
    }
}
