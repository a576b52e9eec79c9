//! Cache record freshness tiers.
//!
//! A record's age puts it in exactly one tier, computed by one pure
//! function so the three behaviors stay independently testable.

use std::time::Duration;

/// Records younger than this are served without any network activity.
pub const FRESH_FOR: Duration = Duration::from_secs(24 * 60 * 60);

/// Records younger than this still serve reads; older ones are expired.
pub const USABLE_FOR: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Freshness tier of one cache record at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Served as-is, no network call.
    Fresh,
    /// Served as-is; a detached background refresh revalidates it.
    Stale,
    /// Treated as absent except for cache-first/cache-only reads.
    Expired,
}

impl Freshness {
    pub fn classify(age: Duration) -> Self {
        if age < FRESH_FOR {
            Self::Fresh
        } else if age < USABLE_FOR {
            Self::Stale
        } else {
            Self::Expired
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_boundaries() {
        assert_eq!(Freshness::classify(Duration::ZERO), Freshness::Fresh);
        assert_eq!(
            Freshness::classify(FRESH_FOR - Duration::from_secs(1)),
            Freshness::Fresh
        );
        assert_eq!(Freshness::classify(FRESH_FOR), Freshness::Stale);
        assert_eq!(
            Freshness::classify(Duration::from_secs(25 * 60 * 60)),
            Freshness::Stale
        );
        assert_eq!(Freshness::classify(USABLE_FOR), Freshness::Expired);
        assert_eq!(
            Freshness::classify(Duration::from_secs(8 * 24 * 60 * 60)),
            Freshness::Expired
        );
    }
}
