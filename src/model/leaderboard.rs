use super::TrackedUser;

/// One rendered leaderboard row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub machines: u64,
    pub challenges: u64,
    pub streak: u32,
    pub total: u64,
}

impl From<&TrackedUser> for Entry {
    fn from(user: &TrackedUser) -> Self {
        Self {
            name: user.name.clone(),
            machines: user.progress.machines,
            challenges: user.progress.challenges,
            streak: user.streak,
            total: user.progress.total(),
        }
    }
}

/// Rank users by total period solves, then streak, descending.
///
/// The sort is stable, so ties keep the order the input iterator produced
/// (roster insertion order). Recomputed fresh on every call.
pub fn rank<'a>(users: impl IntoIterator<Item = &'a TrackedUser>, top: usize) -> Vec<Entry> {
    let mut entries: Vec<Entry> = users.into_iter().map(Entry::from).collect();
    entries.sort_by(|a, b| b.total.cmp(&a.total).then(b.streak.cmp(&a.streak)));
    entries.truncate(top);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActivitySnapshot, Counters, Goals, Progress, TrackedUser, UserId};

    fn user(id: u64, name: &str, total: u64, streak: u32) -> TrackedUser {
        let mut user = TrackedUser::begin(
            UserId::new(id),
            name.to_string(),
            None,
            Goals::default(),
            ActivitySnapshot::default(),
        );
        user.streak = streak;
        user.progress = Progress {
            counters: Counters {
                user_flags: total,
                root_flags: 0,
                challenge_solves: 0,
            },
            machines: 0,
            challenges: 0,
        };
        user
    }

    #[test]
    fn ranks_by_total_then_streak() {
        let users = [
            user(1, "low", 3, 0),
            user(2, "tied-weak", 5, 1),
            user(3, "tied-strong", 5, 2),
        ];

        let ranked = rank(&users, 10);
        let names: Vec<&str> = ranked.iter().map(|e| e.name.as_str()).collect();

        assert_eq!(names, ["tied-strong", "tied-weak", "low"]);
    }

    #[test]
    fn full_ties_keep_insertion_order() {
        let users = [user(1, "first", 4, 1), user(2, "second", 4, 1)];

        let ranked = rank(&users, 10);
        let names: Vec<&str> = ranked.iter().map(|e| e.name.as_str()).collect();

        assert_eq!(names, ["first", "second"]);
    }

    #[test]
    fn truncates_to_the_requested_size() {
        let users: Vec<TrackedUser> = (0..15).map(|n| user(n, "hacker", n, 0)).collect();

        assert_eq!(rank(&users, 10).len(), 10);
    }
}
