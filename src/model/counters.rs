use serde::{Deserialize, Serialize};

/// Cumulative solve counters as reported by the platform for one user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub user_flags: u64,
    pub root_flags: u64,
    pub challenge_solves: u64,
}

impl Counters {
    pub fn total(self) -> u64 {
        self.user_flags + self.root_flags + self.challenge_solves
    }

    /// Per-field progress since `baseline`, clamped at zero.
    ///
    /// The platform counters are cumulative, so a decrease means the platform
    /// served inconsistent data. Those fields are clamped and returned as
    /// anomalies so the caller can log them for the operator.
    pub fn since(self, baseline: Counters) -> (Counters, Vec<Anomaly>) {
        let mut anomalies = Vec::new();

        let mut field = |name, current: u64, previous: u64| {
            if current < previous {
                anomalies.push(Anomaly {
                    field: name,
                    baseline: previous,
                    current,
                });
            }
            current.saturating_sub(previous)
        };

        let delta = Counters {
            user_flags: field("user_flags", self.user_flags, baseline.user_flags),
            root_flags: field("root_flags", self.root_flags, baseline.root_flags),
            challenge_solves: field(
                "challenge_solves",
                self.challenge_solves,
                baseline.challenge_solves,
            ),
        };

        (delta, anomalies)
    }
}

/// A cumulative counter went backwards between polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anomaly {
    pub field: &'static str,
    pub baseline: u64,
    pub current: u64,
}

impl std::fmt::Display for Anomaly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} decreased from {} to {}",
            self.field, self.baseline, self.current
        )
    }
}
