//! Refresh-token reuse detection.
//!
//! A redeemed generation must equal the family's current generation. The
//! one exception is a client retrying a refresh whose first attempt
//! succeeded server-side but whose response was lost: the immediately
//! preceding generation is honoured once inside a short grace window. That
//! retry is indistinguishable from a replayed stolen token, so the window is
//! kept small and a second presentation is always a breach.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::models::TokenFamily;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreachResult {
    /// Presented generation is current; rotate normally.
    Ok,
    /// First redemption of generation `current - 1` inside the grace window.
    GraceReplay,
    Breach,
}

#[derive(Debug, Clone, Copy)]
pub struct BreachDetector {
    grace_window: Duration,
}

impl BreachDetector {
    pub fn new(grace_window: Duration) -> Self {
        Self { grace_window }
    }

    pub fn grace_window(&self) -> Duration {
        self.grace_window
    }

    /// Pure decision; revocation of the family is the caller's job.
    pub fn check(
        &self,
        family: &TokenFamily,
        presented_generation: u64,
        now: DateTime<Utc>,
    ) -> BreachResult {
        let current = family.generation;

        if presented_generation == current {
            return BreachResult::Ok;
        }

        let is_previous = current > 0 && presented_generation == current - 1;
        if !is_previous || family.grace_consumed || self.grace_window.is_zero() {
            return BreachResult::Breach;
        }

        let elapsed = (now - family.rotated_at).to_std().unwrap_or(Duration::ZERO);
        if elapsed <= self.grace_window {
            BreachResult::GraceReplay
        } else {
            BreachResult::Breach
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn family_at(generation: u64, rotated_ago_ms: i64) -> (TokenFamily, DateTime<Utc>) {
        let now = Utc::now();
        let mut family = TokenFamily::new("user-1");
        family.generation = generation;
        family.rotated_at = now - ChronoDuration::milliseconds(rotated_ago_ms);
        (family, now)
    }

    fn detector() -> BreachDetector {
        BreachDetector::new(Duration::from_secs(5))
    }

    #[test]
    fn current_generation_is_ok() {
        let (family, now) = family_at(3, 60_000);
        assert_eq!(detector().check(&family, 3, now), BreachResult::Ok);
    }

    #[test]
    fn previous_generation_inside_window_is_grace() {
        let (family, now) = family_at(3, 1_000);
        assert_eq!(detector().check(&family, 2, now), BreachResult::GraceReplay);
    }

    #[test]
    fn previous_generation_outside_window_is_breach() {
        let (family, now) = family_at(3, 6_000);
        assert_eq!(detector().check(&family, 2, now), BreachResult::Breach);
    }

    #[test]
    fn grace_is_single_use() {
        let (mut family, now) = family_at(3, 1_000);
        family.grace_consumed = true;
        assert_eq!(detector().check(&family, 2, now), BreachResult::Breach);
    }

    #[test]
    fn older_generations_are_always_breach() {
        let (family, now) = family_at(3, 0);
        assert_eq!(detector().check(&family, 1, now), BreachResult::Breach);
        assert_eq!(detector().check(&family, 0, now), BreachResult::Breach);
    }

    #[test]
    fn future_generation_is_breach() {
        let (family, now) = family_at(3, 0);
        assert_eq!(detector().check(&family, 4, now), BreachResult::Breach);
    }

    #[test]
    fn zero_window_disables_grace() {
        let (family, now) = family_at(1, 0);
        let detector = BreachDetector::new(Duration::ZERO);
        assert_eq!(detector.check(&family, 0, now), BreachResult::Breach);
    }

    #[test]
    fn fresh_family_has_no_previous_generation() {
        let (family, now) = family_at(0, 0);
        assert_eq!(detector().check(&family, 0, now), BreachResult::Ok);
        assert_eq!(detector().check(&family, 1, now), BreachResult::Breach);
    }
}
