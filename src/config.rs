use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};

use crate::reward::RewardCurve;

/// Upper bound on every configured interval: one day.
const MAX_INTERVAL_MS: u64 = 24 * 60 * 60 * 1000;

/// Inclusive bounds on the amount a user may stake for one session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StakeBounds {
    pub min: f64,
    pub max: f64,
}

impl Default for StakeBounds {
    fn default() -> Self {
        Self { min: 1.0, max: 5.0 }
    }
}

impl StakeBounds {
    pub fn contains(&self, amount: f64) -> bool {
        amount.is_finite() && amount >= self.min && amount <= self.max
    }
}

/// The discrete slider stops a session duration may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DurationSteps {
    pub min_secs: u64,
    pub max_secs: u64,
    pub step_secs: u64,
}

impl Default for DurationSteps {
    fn default() -> Self {
        Self {
            min_secs: 5,
            max_secs: 15,
            step_secs: 5,
        }
    }
}

impl DurationSteps {
    pub fn permits(&self, duration_secs: u64) -> bool {
        duration_secs >= self.min_secs
            && duration_secs <= self.max_secs
            && (duration_secs - self.min_secs) % self.step_secs == 0
    }

    pub fn values(&self) -> impl Iterator<Item = u64> {
        (self.min_secs..=self.max_secs).step_by(self.step_secs as usize)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FocusConfig {
    pub stake: StakeBounds,
    pub duration: DurationSteps,
    pub reward: RewardCurve,
    /// How long a backgrounded session may stay away before it is forfeited.
    pub grace_period_ms: u64,
    pub tick_interval_ms: u64,
    /// Balance refreshes closer together than this reuse the cached value.
    pub balance_debounce_ms: u64,
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            stake: StakeBounds::default(),
            duration: DurationSteps::default(),
            reward: RewardCurve::default(),
            grace_period_ms: 10_000,
            tick_interval_ms: 1_000,
            balance_debounce_ms: 2_000,
        }
    }
}

impl FocusConfig {
    /// Loads the config from `path`, falling back to defaults when no file exists.
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config in {}", path.display()))?
        } else {
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        let stake = self.stake;
        if !(stake.min.is_finite() && stake.max.is_finite()) || stake.min <= 0.0 {
            bail!("stake bounds must be positive finite numbers");
        }
        if stake.min > stake.max {
            bail!("stake min {} exceeds max {}", stake.min, stake.max);
        }

        let duration = self.duration;
        if duration.min_secs == 0 || duration.step_secs == 0 {
            bail!("duration min and step must be greater than zero");
        }
        if duration.min_secs >= duration.max_secs {
            bail!(
                "duration min {}s must be below max {}s",
                duration.min_secs,
                duration.max_secs
            );
        }
        if (duration.max_secs - duration.min_secs) % duration.step_secs != 0 {
            bail!(
                "duration range {}..={}s is not a whole number of {}s steps",
                duration.min_secs,
                duration.max_secs,
                duration.step_secs
            );
        }

        self.reward.validate(stake.min)?;

        if self.grace_period_ms == 0 || self.tick_interval_ms == 0 {
            bail!("grace period and tick interval must be greater than zero");
        }
        for (name, value) in [
            ("gracePeriodMs", self.grace_period_ms),
            ("tickIntervalMs", self.tick_interval_ms),
            ("balanceDebounceMs", self.balance_debounce_ms),
        ] {
            if value > MAX_INTERVAL_MS {
                bail!("{name} {value} exceeds the limit of {MAX_INTERVAL_MS}ms");
            }
        }
        Ok(())
    }

    pub fn grace_period(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.grace_period_ms.min(MAX_INTERVAL_MS) as i64)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.min(MAX_INTERVAL_MS))
    }

    pub fn balance_debounce(&self) -> Duration {
        Duration::from_millis(self.balance_debounce_ms.min(MAX_INTERVAL_MS))
    }
}
