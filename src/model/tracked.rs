use std::collections::BTreeSet;

use derive_new::new;
use serde::{Deserialize, Serialize};

use super::{now, Anomaly, Counters, Timestamp, UserId};

/// Per-period targets for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct Goals {
    pub machines: u32,
    pub challenges: u32,
}

impl Default for Goals {
    fn default() -> Self {
        Self {
            machines: 1,
            challenges: 2,
        }
    }
}

/// How a machine completion is counted.
///
/// `Paired` requires both the user and the root flag of the same target to be
/// captured within the period. `RootOnly` counts any in-period root flag,
/// regardless of when the user flag landed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MachineRule {
    #[default]
    Paired,
    RootOnly,
}

/// Per-target identifiers backing the cumulative counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityDetail {
    pub user_flag_targets: BTreeSet<u64>,
    pub root_flag_targets: BTreeSet<u64>,
    pub challenges: BTreeSet<u64>,
}

/// Cumulative platform state at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivitySnapshot {
    pub counters: Counters,
    #[serde(default)]
    pub detail: ActivityDetail,
}

/// One fetch result. `detail` is present when the platform supplied
/// per-target granularity; without it the evaluator falls back to a
/// totals-only approximation.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct Observation {
    pub counters: Counters,
    pub detail: Option<ActivityDetail>,
}

impl From<Observation> for ActivitySnapshot {
    fn from(observation: Observation) -> Self {
        Self {
            counters: observation.counters,
            detail: observation.detail.unwrap_or_default(),
        }
    }
}

/// Progress within the current period, derived from an observation against
/// the baseline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Raw per-field deltas since the baseline.
    pub counters: Counters,
    /// Completed machines this period, per the active [MachineRule].
    pub machines: u64,
    /// Distinct challenges solved this period.
    pub challenges: u64,
}

impl Progress {
    pub fn total(self) -> u64 {
        self.counters.total()
    }

    pub fn meets(self, goals: Goals) -> bool {
        self.machines >= u64::from(goals.machines) && self.challenges >= u64::from(goals.challenges)
    }
}

/// The result of evaluating one observation against a user's baseline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub progress: Progress,
    /// Counter fields that went backwards on the platform, clamped to zero.
    pub anomalies: Vec<Anomaly>,
}

impl Evaluation {
    pub fn goals_met(&self, goals: Goals) -> bool {
        self.progress.meets(goals)
    }
}

/// How one user's period ended, for the weekly report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodOutcome {
    pub id: UserId,
    pub name: String,
    pub discord_handle: Option<String>,
    pub met: bool,
    pub machines: u64,
    pub challenges: u64,
    pub goals: Goals,
    pub streak: u32,
}

/// A user whose platform activity is measured against weekly goals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedUser {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub discord_handle: Option<String>,
    pub tracked_at: Timestamp,
    #[serde(default)]
    pub goals: Goals,
    #[serde(default)]
    pub streak: u32,
    /// Cumulative state at the start of the current period. Only replaced at
    /// a period boundary, never mid-period.
    pub baseline: ActivitySnapshot,
    /// Latest cumulative state seen by the fetcher.
    #[serde(default)]
    pub observed: ActivitySnapshot,
    #[serde(default)]
    pub progress: Progress,
}

impl TrackedUser {
    /// Start tracking from the user's current platform state. Existing solves
    /// land in the baseline so they are not counted toward the first period.
    pub fn begin(
        id: UserId,
        name: String,
        discord_handle: Option<String>,
        goals: Goals,
        start: ActivitySnapshot,
    ) -> Self {
        Self {
            id,
            name,
            discord_handle,
            tracked_at: now(),
            goals,
            streak: 0,
            baseline: start.clone(),
            observed: start,
            progress: Progress::default(),
        }
    }

    /// Compute this period's progress from an observation.
    ///
    /// Progress is always recomputed from the baseline, never accumulated, so
    /// repeated polls with an identical observation yield identical progress.
    pub fn evaluate(&self, observation: &Observation, rule: MachineRule) -> Evaluation {
        let (counters, anomalies) = observation.counters.since(self.baseline.counters);

        let (machines, challenges) = match &observation.detail {
            Some(detail) => {
                let users: BTreeSet<u64> = detail
                    .user_flag_targets
                    .difference(&self.baseline.detail.user_flag_targets)
                    .copied()
                    .collect();
                let roots: BTreeSet<u64> = detail
                    .root_flag_targets
                    .difference(&self.baseline.detail.root_flag_targets)
                    .copied()
                    .collect();

                let machines = match rule {
                    MachineRule::Paired => users.intersection(&roots).count(),
                    MachineRule::RootOnly => roots.len(),
                };
                let challenges = detail
                    .challenges
                    .difference(&self.baseline.detail.challenges)
                    .count();

                (machines as u64, challenges as u64)
            }

            // Totals-only fallback: two flags make one machine, an
            // approximation of the paired rule.
            None => (
                (counters.user_flags + counters.root_flags) / 2,
                counters.challenge_solves,
            ),
        };

        Evaluation {
            progress: Progress {
                counters,
                machines,
                challenges,
            },
            anomalies,
        }
    }

    /// Absorb an observation that has already been evaluated.
    pub fn apply(&mut self, observation: Observation, evaluation: &Evaluation) {
        self.observed.counters = observation.counters;
        if let Some(detail) = observation.detail {
            self.observed.detail = detail;
        }
        self.progress = evaluation.progress;
    }

    /// Close the current period: settle the streak against the goals, then
    /// promote the latest observation to the new baseline.
    pub fn rollover(&mut self) -> PeriodOutcome {
        let met = self.progress.meets(self.goals);
        self.streak = if met { self.streak + 1 } else { 0 };

        let outcome = PeriodOutcome {
            id: self.id,
            name: self.name.clone(),
            discord_handle: self.discord_handle.clone(),
            met,
            machines: self.progress.machines,
            challenges: self.progress.challenges,
            goals: self.goals,
            streak: self.streak,
        };

        self.baseline = self.observed.clone();
        self.progress = Progress::default();

        outcome
    }
}
