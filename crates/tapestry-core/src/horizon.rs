//! Short-range forecast of where the ledger is heading.
//!
//! Looks only at the tail of the snapshot: how long the latest intention
//! has repeated, and which next weave would continue that run versus which
//! would restore balance.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::thread::{Intention, Thread, TimeOfDay};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Momentum {
    /// The latest intention repeated at least once.
    Accelerating,
    #[default]
    Stable,
}

/// A suggested next weave.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projection {
    pub intention: Intention,
    pub time_of_day: TimeOfDay,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Horizon {
    /// Length of the trailing run of equal intentions.
    pub streak: usize,
    pub last_intention: Option<Intention>,
    pub momentum: Momentum,
    /// Continue the current run at the next time of day.
    pub continue_with: Option<Projection>,
    /// Least-represented known intention, unless it is the one already
    /// running.
    pub rebalance_with: Option<Projection>,
}

/// Forecast from the snapshot tail. `counts` holds every known intention,
/// zero-filled.
pub fn forecast(threads: &[Thread], counts: &BTreeMap<Intention, usize>) -> Horizon {
    let Some(last) = threads.last() else {
        return Horizon::default();
    };

    let streak = threads
        .iter()
        .rev()
        .take_while(|t| t.intention == last.intention)
        .count();
    let time_of_day = next_time(last.time_of_day);

    // First minimum in declaration order.
    let least = Intention::KNOWN
        .iter()
        .copied()
        .fold(None, |best: Option<(Intention, usize)>, i| {
            let count = counts.get(&i).copied().unwrap_or(0);
            match best {
                Some((_, c)) if c <= count => best,
                _ => Some((i, count)),
            }
        })
        .map(|(i, _)| i);

    Horizon {
        streak,
        last_intention: Some(last.intention),
        momentum: if streak > 1 {
            Momentum::Accelerating
        } else {
            Momentum::Stable
        },
        continue_with: Some(Projection {
            intention: last.intention,
            time_of_day,
        }),
        rebalance_with: least
            .filter(|&i| i != last.intention)
            .map(|intention| Projection {
                intention,
                time_of_day,
            }),
    }
}

/// Next slot on the day cycle; an unknown slot restarts at dawn.
fn next_time(current: TimeOfDay) -> TimeOfDay {
    let cycle = TimeOfDay::KNOWN;
    match cycle.iter().position(|&t| t == current) {
        Some(i) => cycle[(i + 1) % cycle.len()],
        None => cycle[0],
    }
}
