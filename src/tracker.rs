use std::time::Duration;

use futures::StreamExt as _;
use itertools::Itertools as _;
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::instrument;

use crate::config::Config;
use crate::discord::{Channel, Message};
use crate::htb::{self, ActivityEntry, FlagType, Htb, HtbError, ObjectType};
use crate::model::{
    now, rank, ActivityDetail, ActivitySnapshot, Goals, MachineRule, TrackedUser, UserId,
};
use crate::repl::{Action, Command};
use crate::report::{self, Solve};
use crate::store::{Roster, Store};
use crate::time::WeeklySchedule;

/// How many activity fetches may be in flight during one sweep.
const FETCH_CONCURRENCY: usize = 4;

const LEADERBOARD_SIZE: usize = 10;

/// Owns the roster and its durability boundary.
///
/// Every mutation happens on the task driving [Watcher::run], so polling
/// ticks, weekly boundaries and operator commands never interleave.
pub struct Watcher {
    roster: Roster,
    store: Store,
    htb: Htb,
    channel: Channel,
    goals: Goals,
    rule: MachineRule,
    schedule: WeeklySchedule,
    poll: Duration,
    dirty: bool,
}

impl Watcher {
    pub fn new(roster: Roster, store: Store, htb: Htb, channel: Channel, config: &Config) -> Self {
        Self {
            roster,
            store,
            htb,
            channel,
            goals: config.goals(),
            rule: config.machine_rule,
            schedule: config.schedule(),
            poll: config.poll_interval,
            dirty: false,
        }
    }

    /// Drive polling ticks, the weekly boundary and operator commands until
    /// the command channel closes.
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let mut ticks = tokio::time::interval(self.poll);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let boundary = tokio::time::sleep(self.schedule.duration_until_next(now()));

            select! {
                _ = ticks.tick() => self.sweep().await,
                _ = boundary => self.close_period().await,
                command = commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    // the console hung up, shut down
                    None => break,
                },
            }
        }

        self.persist();
        tracing::info!("watcher stopped");
    }

    /// One polling pass over every tracked user.
    #[instrument(skip(self))]
    async fn sweep(&mut self) {
        // a save that failed last time gets another chance every tick
        self.persist();

        if self.roster.is_empty() {
            return;
        }

        tracing::info!(users = self.roster.len(), "poll sweep started");

        let ids: Vec<UserId> = self.roster.ids().collect();
        let feeds: Vec<(UserId, Result<Vec<ActivityEntry>, HtbError>)> =
            futures::stream::iter(ids)
                .map(|id| {
                    let htb = self.htb.clone();
                    async move { (id, htb.activity(id).await) }
                })
                .buffer_unordered(FETCH_CONCURRENCY)
                .collect()
                .await;

        let mut fresh = Vec::new();
        for (id, feed) in feeds {
            match feed {
                Err(error) => {
                    tracing::warn!(user = %id, %error, "fetch failed, skipping this user until the next tick");
                }
                Ok(entries) => fresh.extend(self.absorb(id, entries)),
            }
        }

        self.persist();

        for (id, entry) in fresh {
            self.announce(id, &entry).await;
        }
    }

    /// Fold one fetched activity feed into the owning user's period state.
    /// Returns the entries nobody has seen before, for announcement.
    fn absorb(&mut self, id: UserId, entries: Vec<ActivityEntry>) -> Vec<(UserId, ActivityEntry)> {
        let observation = htb::observation(&entries);

        let Some(user) = self.roster.get_mut(id) else {
            // untracked while the fetch was in flight
            return Vec::new();
        };

        let fresh: Vec<(UserId, ActivityEntry)> = entries
            .into_iter()
            .filter(|entry| is_fresh(&user.observed.detail, entry))
            .map(|entry| (id, entry))
            .collect();

        let evaluation = user.evaluate(&observation, self.rule);
        for anomaly in &evaluation.anomalies {
            tracing::warn!(user = %id, %anomaly, "platform counter went backwards, progress clamped");
        }

        user.apply(observation, &evaluation);
        self.dirty = true;

        fresh
    }

    async fn announce(&self, id: UserId, entry: &ActivityEntry) {
        let Some(user) = self.roster.get(id) else {
            return;
        };

        let solve = match (entry.object_type, entry.flag) {
            (ObjectType::Machine, Some(FlagType::User)) => Solve::UserFlag {
                target: entry.name.clone(),
            },
            (ObjectType::Machine, Some(FlagType::Root)) => Solve::RootFlag {
                target: entry.name.clone(),
            },
            (ObjectType::Challenge, _) => {
                let category = match self.htb.challenge_category(entry.id).await {
                    Ok(category) => category,
                    Err(error) => {
                        tracing::debug!(%error, challenge = entry.id, "could not resolve the challenge category");
                        None
                    }
                };
                Solve::Challenge {
                    target: entry.name.clone(),
                    category,
                }
            }
            _ => return,
        };

        let avatar = match self.htb.profile(id).await {
            Ok(profile) => Some(profile.avatar),
            Err(error) => {
                tracing::debug!(user = %id, %error, "could not refresh the avatar");
                None
            }
        };

        tracing::info!(user = %user.name, ?solve, "announcing solve");
        self.deliver(report::solve(user, &solve, avatar.as_deref()))
            .await;
    }

    /// The weekly boundary: final refresh, settle streaks, report, reset.
    #[instrument(skip(self))]
    async fn close_period(&mut self) {
        tracing::info!("closing the weekly period");

        self.sweep().await;

        let outcomes: Vec<_> = self
            .roster
            .users_mut()
            .map(TrackedUser::rollover)
            .collect();

        if !outcomes.is_empty() {
            self.dirty = true;
        }
        self.persist();

        let (message, shame) = report::weekly(&outcomes);
        self.deliver(message).await;
        if let Some(shame) = shame {
            self.deliver(shame).await;
        }
    }

    async fn handle(&mut self, command: Command) {
        let Command { action, reply } = command;
        tracing::debug!(?action, "operator command");

        let answer = match action {
            Action::Track { target, handle } => self.track(&target, handle).await,
            Action::Untrack { target } => self.untrack(&target),
            Action::Stats { target } => self.stats(&target).await,
            Action::Top => self.top().await,
            Action::Reset => {
                self.close_period().await;
                "period closed, report delivered".to_string()
            }
            Action::List => self.list(),
            _ => return,
        };

        self.persist();
        let _ = reply.send(answer);
    }

    async fn track(&mut self, target: &str, handle: Option<String>) -> String {
        let id = match htb::parse_user_id(target) {
            Ok(id) => id,
            Err(error) => return error.to_string(),
        };

        if let Some(user) = self.roster.get(id) {
            return format!("`{}` is already tracked", user.name);
        }

        let profile = match self.htb.profile(id).await {
            Ok(profile) => profile,
            Err(error) => return format!("could not verify user {id}: {error}"),
        };

        let entries = match self.htb.activity(id).await {
            Ok(entries) => entries,
            Err(error) => return format!("could not fetch activity for {id}: {error}"),
        };

        // existing solves land in the baseline, not in the first period
        let start = ActivitySnapshot::from(htb::observation(&entries));
        let user = TrackedUser::begin(id, profile.name.clone(), handle, self.goals, start);

        self.deliver(report::tracked(&user, &profile.avatar)).await;
        self.roster.insert(user);
        self.dirty = true;

        format!("tracking `{}` ({id})", profile.name)
    }

    fn untrack(&mut self, target: &str) -> String {
        let Some(id) = self.resolve(target) else {
            return format!("`{target}` is not tracked");
        };

        match self.roster.remove(id) {
            Some(user) => {
                self.dirty = true;
                format!("stopped tracking `{}`", user.name)
            }
            None => format!("`{target}` is not tracked"),
        }
    }

    async fn stats(&mut self, target: &str) -> String {
        let Some(id) = self.resolve(target) else {
            return format!("`{target}` is not tracked");
        };
        let Some(user) = self.roster.get(id) else {
            return format!("`{target}` is not tracked");
        };

        let name = user.name.clone();
        let message = report::stats(user);
        self.deliver(message).await;

        format!("stats for `{name}` delivered to the channel")
    }

    async fn top(&mut self) -> String {
        let entries = rank(self.roster.users(), LEADERBOARD_SIZE);
        if entries.is_empty() {
            return "nobody is tracked yet".to_string();
        }

        let message = report::leaderboard(&entries, self.roster.len());
        self.deliver(message).await;

        "leaderboard delivered to the channel".to_string()
    }

    fn list(&self) -> String {
        if self.roster.is_empty() {
            return "nobody is tracked yet".to_string();
        }

        self.roster
            .users()
            .map(|user| {
                format!(
                    "  {} `{}` streak {} ({}/{} machines, {}/{} challenges)",
                    user.id,
                    user.name,
                    user.streak,
                    user.progress.machines,
                    user.goals.machines,
                    user.progress.challenges,
                    user.goals.challenges,
                )
            })
            .join("\n")
    }

    /// A command target is the platform id, the chat handle, or the name.
    fn resolve(&self, target: &str) -> Option<UserId> {
        if let Ok(id) = target.parse::<UserId>() {
            if self.roster.contains(id) {
                return Some(id);
            }
        }

        self.roster
            .users()
            .find(|user| user.discord_handle.as_deref() == Some(target) || user.name == target)
            .map(|user| user.id)
    }

    async fn deliver(&self, message: Message) {
        if let Err(error) = self.channel.post(&message).await {
            tracing::warn!(%error, "could not deliver the message to the channel");
        }
    }

    fn persist(&mut self) {
        if !self.dirty {
            return;
        }

        match self.store.save(&self.roster) {
            Ok(()) => self.dirty = false,
            Err(error) => {
                tracing::error!(%error, "could not persist the roster, keeping in-memory state until the next attempt");
            }
        }
    }
}

/// Whether an activity entry has not been seen in any earlier observation.
fn is_fresh(seen: &ActivityDetail, entry: &ActivityEntry) -> bool {
    match (entry.object_type, entry.flag) {
        (ObjectType::Machine, Some(FlagType::User)) => !seen.user_flag_targets.contains(&entry.id),
        (ObjectType::Machine, Some(FlagType::Root)) => !seen.root_flag_targets.contains(&entry.id),
        (ObjectType::Challenge, _) => !seen.challenges.contains(&entry.id),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use url::Url;

    use crate::discord::DiscordConfig;
    use crate::htb::HtbConfig;
    use crate::model::Counters;

    fn watcher() -> Watcher {
        let htb = htb::connect(&HtbConfig {
            htb_api_token: "test-token".to_string(),
            htb_api_url: Url::parse("http://localhost:1").unwrap(),
        })
        .unwrap();

        let channel = crate::discord::connect(&DiscordConfig {
            discord_webhook_url: Url::parse("http://localhost:1").unwrap(),
        })
        .unwrap();

        Watcher {
            roster: Roster::default(),
            // never written by these tests, they only mutate in-memory state
            store: Store::new(std::env::temp_dir().join("talon-watcher-test.json")),
            htb,
            channel,
            goals: Goals::default(),
            rule: MachineRule::Paired,
            schedule: crate::time::WeeklySchedule::new(
                chrono::Weekday::Sat,
                chrono::NaiveTime::from_hms_opt(21, 0, 0).unwrap(),
                chrono::FixedOffset::east_opt(3 * 3600).unwrap(),
            ),
            poll: Duration::from_secs(600),
            dirty: false,
        }
    }

    fn tracked(id: u64, name: &str, handle: &str) -> TrackedUser {
        TrackedUser::begin(
            UserId::new(id),
            name.to_string(),
            Some(handle.to_string()),
            Goals::default(),
            ActivitySnapshot::default(),
        )
    }

    fn entry(id: u64, object_type: ObjectType, flag: Option<FlagType>) -> ActivityEntry {
        ActivityEntry {
            id,
            name: "Target".to_string(),
            object_type,
            flag,
            date: None,
        }
    }

    #[test]
    fn resolve_accepts_id_handle_and_name() {
        let mut watcher = watcher();
        watcher.roster.insert(tracked(7, "m4verick", "1001"));

        assert_eq!(watcher.resolve("7"), Some(UserId::new(7)));
        assert_eq!(watcher.resolve("1001"), Some(UserId::new(7)));
        assert_eq!(watcher.resolve("m4verick"), Some(UserId::new(7)));
        assert_eq!(watcher.resolve("gh0st"), None);
    }

    #[test]
    fn untrack_removes_the_user() {
        let mut watcher = watcher();
        watcher.roster.insert(tracked(7, "m4verick", "1001"));

        let answer = watcher.untrack("m4verick");

        assert!(answer.contains("stopped tracking"));
        assert!(watcher.roster.is_empty());
    }

    #[test]
    fn untrack_reports_unknown_targets() {
        let mut watcher = watcher();

        let answer = watcher.untrack("nobody");

        assert!(answer.contains("not tracked"));
    }

    #[test]
    fn absorb_reports_only_unseen_entries() {
        let mut watcher = watcher();
        watcher.roster.insert(tracked(7, "m4verick", "1001"));

        let feed = vec![
            entry(418, ObjectType::Machine, Some(FlagType::User)),
            entry(73, ObjectType::Challenge, None),
        ];

        let fresh = watcher.absorb(UserId::new(7), feed.clone());
        assert_eq!(fresh.len(), 2, "everything is new on the first pass");

        let fresh = watcher.absorb(UserId::new(7), feed);
        assert!(fresh.is_empty(), "a repeated feed announces nothing");
    }

    #[test]
    fn absorb_updates_the_period_progress() {
        let mut watcher = watcher();
        watcher.roster.insert(tracked(7, "m4verick", "1001"));

        let feed = vec![
            entry(418, ObjectType::Machine, Some(FlagType::User)),
            entry(418, ObjectType::Machine, Some(FlagType::Root)),
            entry(73, ObjectType::Challenge, None),
        ];
        watcher.absorb(UserId::new(7), feed);

        let user = watcher.roster.get(UserId::new(7)).unwrap();
        assert_eq!(
            user.progress.counters,
            Counters {
                user_flags: 1,
                root_flags: 1,
                challenge_solves: 1,
            }
        );
        assert_eq!(user.progress.machines, 1);
    }

    #[test]
    fn entries_for_an_untracked_user_are_dropped() {
        let mut watcher = watcher();

        let fresh = watcher.absorb(
            UserId::new(9),
            vec![entry(418, ObjectType::Machine, Some(FlagType::Root))],
        );

        assert!(fresh.is_empty());
    }

    #[test]
    fn fresh_ignores_foreign_object_types() {
        let seen = ActivityDetail::default();

        assert!(!is_fresh(
            &seen,
            &entry(9, ObjectType::Other, Some(FlagType::Other))
        ));
    }
}
