//! Quota arithmetic

use serde::{Serialize, Serializer};

use crate::keys::Tier;

/// A request allowance: a concrete count, or no limit at all
///
/// Serializes as a JSON number or the string `"unlimited"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Allowance {
    Limited(u64),
    Unlimited,
}

impl Allowance {
    pub fn is_unlimited(&self) -> bool {
        matches!(self, Allowance::Unlimited)
    }
}

impl Serialize for Allowance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Allowance::Limited(n) => serializer.serialize_u64(*n),
            Allowance::Unlimited => serializer.serialize_str("unlimited"),
        }
    }
}

/// Outcome of comparing usage against a tier's limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaCheck {
    pub allowed: bool,
    pub remaining: Allowance,
}

/// The monthly limit that applies to `tier`
pub fn limit_for(tier: Tier, free_tier_limit: u64) -> Allowance {
    if tier.is_metered() {
        Allowance::Limited(free_tier_limit)
    } else {
        Allowance::Unlimited
    }
}

/// Compare `current_usage` against `limit` for `tier`
///
/// Unmetered tiers are always allowed. A metered tier is allowed while
/// `current_usage < limit`; `remaining` never goes below zero.
pub fn check_quota(tier: Tier, current_usage: u64, limit: u64) -> QuotaCheck {
    if !tier.is_metered() {
        return QuotaCheck {
            allowed: true,
            remaining: Allowance::Unlimited,
        };
    }

    QuotaCheck {
        allowed: current_usage < limit,
        remaining: Allowance::Limited(limit.saturating_sub(current_usage)),
    }
}
