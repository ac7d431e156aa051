//! Lifecycle state machine.
//!
//! A memory is created [`Lifecycle::Active`], drifts to
//! [`Lifecycle::Dormant`] when idle, is pulled into [`Lifecycle::Dreaming`]
//! for the duration of a consolidation cycle, and ends in
//! [`Lifecycle::Composting`], where it keeps losing resolution but is never
//! removed.
//!
//! Transitions are data: [`TRANSITIONS`] lists every legal
//! `(from, trigger, to)` row and [`Lifecycle::next`] looks them up.
//!
//! ```text
//!            Recall                    EnterDream
//!   ACTIVE ◄────────── DORMANT ─────────────────► DREAMING
//!     │  ──────────────►   ▲ ◄──────────────────────  │
//!     │  Idle/Deactivate   │          Wake            │ Demote / MergeLoss
//!     │                    │ Forget                   ▼
//!     └───── Forget ───────┴────────────────────► COMPOSTING ⟲ Degrade
//!                          ▲                          │
//!                          └──────── Cherish ─────────┘
//! ```
//!
//! Whether a memory is cherished lives on [`Memory`][crate::Memory]; this
//! table only says where [`Trigger::Cherish`] leads.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Availability state of a memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    /// Recently used; fully visible to recall.
    Active,
    /// Idle but retrievable; eligible for the next consolidation cycle.
    Dormant,
    /// Being consolidated.  Invisible to recall until woken.
    Dreaming,
    /// Forgotten.  Resolution shrinks every cycle; never hard-deleted.
    Composting,
}

/// Event that drives a lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// Idle timeout elapsed.
    Idle,
    /// Explicit deactivation.
    Deactivate,
    /// The memory was returned by a recall.
    Recall,
    /// A consolidation cycle started.
    EnterDream,
    /// A consolidation cycle ended, or was aborted.
    Wake,
    /// Decayed relevance fell below the demotion threshold.
    Demote,
    /// Lost a near-duplicate merge.
    MergeLoss,
    /// Explicit forget.
    Forget,
    /// Resolution decay while composting.
    Degrade,
    /// The memory was cherished; protection lifts it out of COMPOSTING.
    Cherish,
}

/// Every legal transition.  Anything not listed is rejected.
pub const TRANSITIONS: &[(Lifecycle, Trigger, Lifecycle)] = &[
    (Lifecycle::Active, Trigger::Idle, Lifecycle::Dormant),
    (Lifecycle::Active, Trigger::Deactivate, Lifecycle::Dormant),
    (Lifecycle::Active, Trigger::Recall, Lifecycle::Active),
    (Lifecycle::Dormant, Trigger::Recall, Lifecycle::Active),
    (Lifecycle::Dormant, Trigger::EnterDream, Lifecycle::Dreaming),
    (Lifecycle::Dreaming, Trigger::Wake, Lifecycle::Dormant),
    (Lifecycle::Dreaming, Trigger::Demote, Lifecycle::Composting),
    (Lifecycle::Dreaming, Trigger::MergeLoss, Lifecycle::Composting),
    (Lifecycle::Active, Trigger::Forget, Lifecycle::Composting),
    (Lifecycle::Dormant, Trigger::Forget, Lifecycle::Composting),
    (Lifecycle::Dreaming, Trigger::Forget, Lifecycle::Composting),
    (Lifecycle::Composting, Trigger::Degrade, Lifecycle::Composting),
    (Lifecycle::Composting, Trigger::Cherish, Lifecycle::Dormant),
];

/// All states, in declaration order.
pub const ALL_STATES: [Lifecycle; 4] = [
    Lifecycle::Active,
    Lifecycle::Dormant,
    Lifecycle::Dreaming,
    Lifecycle::Composting,
];

impl Lifecycle {
    /// State reached from `self` on `trigger`, or `None` if the transition is
    /// not in [`TRANSITIONS`].
    pub fn next(self, trigger: Trigger) -> Option<Lifecycle> {
        TRANSITIONS
            .iter()
            .find(|(from, t, _)| *from == self && *t == trigger)
            .map(|(_, _, to)| *to)
    }

    /// `true` if `trigger` is legal from `self`.
    pub fn accepts(self, trigger: Trigger) -> bool {
        self.next(trigger).is_some()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Lifecycle::Active => "active",
            Lifecycle::Dormant => "dormant",
            Lifecycle::Dreaming => "dreaming",
            Lifecycle::Composting => "composting",
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Lifecycle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Lifecycle::Active),
            "dormant" => Ok(Lifecycle::Dormant),
            "dreaming" => Ok(Lifecycle::Dreaming),
            "composting" => Ok(Lifecycle::Composting),
            other => Err(format!("unknown lifecycle state '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_goes_dormant_on_idle_or_deactivate() {
        assert_eq!(Lifecycle::Active.next(Trigger::Idle), Some(Lifecycle::Dormant));
        assert_eq!(
            Lifecycle::Active.next(Trigger::Deactivate),
            Some(Lifecycle::Dormant)
        );
    }

    #[test]
    fn only_dormant_enters_dreaming() {
        assert_eq!(
            Lifecycle::Dormant.next(Trigger::EnterDream),
            Some(Lifecycle::Dreaming)
        );
        assert!(!Lifecycle::Active.accepts(Trigger::EnterDream));
        assert!(!Lifecycle::Composting.accepts(Trigger::EnterDream));
        assert!(!Lifecycle::Dreaming.accepts(Trigger::EnterDream));
    }

    #[test]
    fn wake_only_from_dreaming() {
        assert_eq!(Lifecycle::Dreaming.next(Trigger::Wake), Some(Lifecycle::Dormant));
        assert!(!Lifecycle::Active.accepts(Trigger::Wake));
        assert!(!Lifecycle::Dormant.accepts(Trigger::Wake));
    }

    #[test]
    fn automatic_demotion_only_from_dreaming() {
        assert!(Lifecycle::Dreaming.accepts(Trigger::Demote));
        assert!(Lifecycle::Dreaming.accepts(Trigger::MergeLoss));
        assert!(!Lifecycle::Dormant.accepts(Trigger::Demote));
        assert!(!Lifecycle::Active.accepts(Trigger::MergeLoss));
    }

    #[test]
    fn forget_composts_from_every_live_state() {
        for state in [Lifecycle::Active, Lifecycle::Dormant, Lifecycle::Dreaming] {
            assert_eq!(state.next(Trigger::Forget), Some(Lifecycle::Composting));
        }
    }

    #[test]
    fn cherish_is_the_only_way_out_of_composting() {
        for (from, trigger, to) in TRANSITIONS {
            if *from == Lifecycle::Composting && *trigger != Trigger::Cherish {
                assert_eq!(*to, Lifecycle::Composting);
            }
        }
        assert!(!Lifecycle::Composting.accepts(Trigger::Recall));
        assert_eq!(
            Lifecycle::Composting.next(Trigger::Cherish),
            Some(Lifecycle::Dormant)
        );
        for state in [Lifecycle::Active, Lifecycle::Dormant, Lifecycle::Dreaming] {
            assert!(!state.accepts(Trigger::Cherish));
        }
    }

    #[test]
    fn parse_and_display_roundtrip() {
        for state in ALL_STATES {
            assert_eq!(state.to_string().parse::<Lifecycle>().unwrap(), state);
        }
        assert!("asleep".parse::<Lifecycle>().is_err());
        assert_eq!(" DORMANT ".parse::<Lifecycle>().unwrap(), Lifecycle::Dormant);
    }
}
