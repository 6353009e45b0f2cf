use serde::{Deserialize, Serialize};

/// Governs how `reserve` / `claim` / `release` interact across apps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceAllocationPolicy {
    /// First app to reserve holds the speaker until it releases; a claim
    /// from another app pre-empts but the reservation is remembered and
    /// restored once the claim is released.
    Reservation,
    /// A higher-priority app can always pre-empt, but pre-emption
    /// downgrades to `Open` semantics (see design notes) rather than
    /// remembering a reservation.
    Priority,
    /// No arbitration: every session may speak; last speaker wins the
    /// speaker handle.
    Open,
}

impl Default for ResourceAllocationPolicy {
    fn default() -> Self {
        ResourceAllocationPolicy::Reservation
    }
}
