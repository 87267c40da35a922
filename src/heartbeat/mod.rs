//! Heartbeat status model and transition engine.
//!
//! A heartbeat is one health-check result for a monitor. The transition
//! engine turns a raw up/down signal into a stable status using the
//! monitor's retry budget: a previously-up monitor that starts failing sits
//! in PENDING until the budget is exhausted, then settles to DOWN.

mod ingest;

pub use ingest::*;

use serde::{Deserialize, Serialize};

/// Monitor status codes. The wire values match the heartbeat rows in the
/// database: 0=down, 1=up, 2=pending, 3=maintenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Status {
    Down,
    Up,
    Pending,
    Maintenance,
}

impl Status {
    pub fn code(self) -> u8 {
        match self {
            Status::Down => 0,
            Status::Up => 1,
            Status::Pending => 2,
            Status::Maintenance => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Status::Down),
            1 => Some(Status::Up),
            2 => Some(Status::Pending),
            3 => Some(Status::Maintenance),
            _ => None,
        }
    }

    /// Flip UP and DOWN for inverted monitors; other statuses pass through.
    pub fn flip(self) -> Self {
        match self {
            Status::Up => Status::Down,
            Status::Down => Status::Up,
            other => other,
        }
    }
}

impl From<Status> for u8 {
    fn from(s: Status) -> u8 {
        s.code()
    }
}

impl TryFrom<u8> for Status {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Status::from_code(code).ok_or_else(|| format!("invalid status code: {}", code))
    }
}

/// The previous observed state a transition is computed from.
#[derive(Debug, Clone, Copy)]
pub struct PreviousBeat {
    pub status: Status,
    pub retries: u32,
}

/// Result of a status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub status: Status,
    pub retries: u32,
}

/// Compute the next status for a raw up/down signal.
///
/// Pure and total: every (signal, previous, budget) combination maps to a
/// status and retry counter, and the function never fails. Maintenance
/// overrides are handled by the caller before this runs.
pub fn next_status(
    raw: Status,
    previous: Option<PreviousBeat>,
    retry_budget: u32,
    inverted: bool,
) -> Transition {
    let signal = if inverted { raw.flip() } else { raw };

    match previous {
        Some(prev) => {
            if prev.status == Status::Up && signal == Status::Down {
                // Going down
                if retry_budget > 0 && prev.retries < retry_budget {
                    Transition {
                        status: Status::Pending,
                        retries: prev.retries + 1,
                    }
                } else {
                    // No retry budget, settle immediately
                    Transition {
                        status: Status::Down,
                        retries: 0,
                    }
                }
            } else if prev.status == Status::Pending
                && signal == Status::Down
                && prev.retries < retry_budget
            {
                // Still retrying
                Transition {
                    status: Status::Pending,
                    retries: prev.retries + 1,
                }
            } else if signal == Status::Down {
                // Already settled down, or retries exhausted. Resend
                // bookkeeping is the ingest layer's down_count, so the
                // retry counter resets once the status settles.
                Transition {
                    status: Status::Down,
                    retries: 0,
                }
            } else {
                Transition {
                    status: Status::Up,
                    retries: 0,
                }
            }
        }
        None => {
            // First beat
            if signal == Status::Down && retry_budget > 0 {
                Transition {
                    status: Status::Pending,
                    retries: 1,
                }
            } else {
                Transition {
                    status: signal,
                    retries: 0,
                }
            }
        }
    }
}

/// Whether a transition is worth recording and notifying about: the first
/// beat ever, or any change of status category. Consecutive beats with the
/// same status (and PENDING beats still settling) are not notable.
pub fn is_notable_transition(is_first: bool, previous: Option<Status>, next: Status) -> bool {
    if is_first {
        return true;
    }
    match previous {
        Some(prev) => prev != next,
        None => true,
    }
}
