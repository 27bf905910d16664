use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::config::DurationSteps;

/// One bucket of the stake multiplier table. A tier applies from its
/// `from_stake` (inclusive) up to the next tier's `from_stake` (exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardTier {
    pub from_stake: f64,
    pub factor: f64,
}

/// Tunable parameters of the reward formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RewardCurve {
    /// Minutes credited for the shortest permitted duration
    pub min_minutes: f64,
    /// Minutes credited for the longest permitted duration
    pub max_minutes: f64,
    /// Ascending by `from_stake`
    pub tiers: Vec<RewardTier>,
}

impl Default for RewardCurve {
    fn default() -> Self {
        Self {
            min_minutes: 1.0,
            max_minutes: 3.0,
            tiers: vec![
                RewardTier {
                    from_stake: 1.0,
                    factor: 0.2,
                },
                RewardTier {
                    from_stake: 3.0,
                    factor: 0.1667,
                },
                RewardTier {
                    from_stake: 4.0,
                    factor: 0.1,
                },
            ],
        }
    }
}

impl RewardCurve {
    pub(crate) fn validate(&self, min_stake: f64) -> Result<()> {
        if !(self.min_minutes.is_finite() && self.max_minutes.is_finite())
            || self.min_minutes > self.max_minutes
        {
            bail!(
                "reward minutes {}..={} is not a valid range",
                self.min_minutes,
                self.max_minutes
            );
        }
        let Some(first) = self.tiers.first() else {
            bail!("reward curve needs at least one tier");
        };
        if first.from_stake > min_stake {
            bail!(
                "lowest reward tier starts at {} but stakes may be as small as {}",
                first.from_stake,
                min_stake
            );
        }
        if self
            .tiers
            .windows(2)
            .any(|pair| pair[0].from_stake >= pair[1].from_stake)
        {
            bail!("reward tiers must be strictly ascending by stake");
        }
        Ok(())
    }

    /// Multiplier for the bucket `staked_amount` falls into.
    pub fn tier_factor(&self, staked_amount: f64) -> f64 {
        self.tiers
            .iter()
            .rev()
            .find(|tier| staked_amount >= tier.from_stake)
            .or_else(|| self.tiers.first())
            .map(|tier| tier.factor)
            .unwrap_or(0.0)
    }

    /// Linearly maps the permitted duration range onto the minutes range.
    pub fn minutes_for(&self, duration_secs: u64, durations: &DurationSteps) -> f64 {
        let span = (durations.max_secs - durations.min_secs) as f64;
        let offset = duration_secs as f64 - durations.min_secs as f64;
        (offset / span) * (self.max_minutes - self.min_minutes) + self.min_minutes
    }
}

/// Reward earned for staking `staked_amount` over `duration_secs`.
///
/// Pure: callers use it for the live preview while the sliders move and again
/// at completion, and both must agree exactly. Inputs are validated upstream,
/// so there is no error path here.
pub fn reward(
    staked_amount: f64,
    duration_secs: u64,
    durations: &DurationSteps,
    curve: &RewardCurve,
) -> f64 {
    let minutes = curve.minutes_for(duration_secs, durations);
    let factor = curve.tier_factor(staked_amount);
    staked_amount * minutes * factor
}

/// Total handed to the claim action: the stake comes back with the reward.
pub fn payout(staked_amount: f64, reward: f64) -> f64 {
    staked_amount + reward
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn short_low_stake_session() {
        let value = reward(2.0, 5, &DurationSteps::default(), &RewardCurve::default());
        assert!(approx(value, 0.4), "got {value}");
    }

    #[test]
    fn long_high_stake_session() {
        let value = reward(4.0, 15, &DurationSteps::default(), &RewardCurve::default());
        assert!(approx(value, 1.2), "got {value}");
    }

    #[test]
    fn tier_boundaries_are_half_open() {
        let curve = RewardCurve::default();
        assert_eq!(curve.tier_factor(1.0), 0.2);
        assert_eq!(curve.tier_factor(2.99), 0.2);
        assert_eq!(curve.tier_factor(3.0), 0.1667);
        assert_eq!(curve.tier_factor(3.99), 0.1667);
        assert_eq!(curve.tier_factor(4.0), 0.1);
        assert_eq!(curve.tier_factor(5.0), 0.1);
    }

    #[test]
    fn duration_endpoints_map_to_minute_endpoints() {
        let curve = RewardCurve::default();
        let durations = DurationSteps::default();
        assert_eq!(curve.minutes_for(5, &durations), 1.0);
        assert_eq!(curve.minutes_for(10, &durations), 2.0);
        assert_eq!(curve.minutes_for(15, &durations), 3.0);
    }

    #[test]
    fn same_inputs_same_reward() {
        let durations = DurationSteps::default();
        let curve = RewardCurve::default();
        for stake in [1.0, 2.5, 3.0, 3.3, 4.0, 5.0] {
            for duration in durations.values() {
                let first = reward(stake, duration, &durations, &curve);
                let second = reward(stake, duration, &durations, &curve);
                assert_eq!(first.to_bits(), second.to_bits());
            }
        }
    }

    #[test]
    fn payout_returns_stake_with_reward() {
        assert!(approx(payout(2.0, 0.4), 2.4));
    }

    #[test]
    fn validate_rejects_unsorted_tiers() {
        let mut curve = RewardCurve::default();
        curve.tiers.swap(0, 1);
        assert!(curve.validate(1.0).is_err());
        assert!(RewardCurve::default().validate(1.0).is_ok());
    }

    #[test]
    fn validate_rejects_gap_below_min_stake() {
        let curve = RewardCurve::default();
        assert!(curve.validate(0.5).is_err());
    }
}
