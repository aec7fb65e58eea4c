//! Pure formatting of evaluator output into channel messages.

use itertools::Itertools as _;

use crate::discord::{color, Embed, Message};
use crate::model::{Entry, PeriodOutcome, TrackedUser};

const PROFILE_URL: &str = "https://app.hackthebox.com/users";

/// Discord rejects embed field values past 1024 characters; clip well below.
const FIELD_LIMIT: usize = 1000;

const MEDALS: [&str; 3] = ["🥇", "🥈", "🥉"];

/// A newly observed solve, ready for announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Solve {
    UserFlag { target: String },
    RootFlag { target: String },
    Challenge { target: String, category: Option<String> },
}

pub fn tracked(user: &TrackedUser, avatar: &str) -> Message {
    let embed = Embed::titled("🕵️ New Agent Tracked!")
        .description(format!(
            "**[{}]({}/{})** joined.",
            user.name, PROFILE_URL, user.id
        ))
        .color(color::BLUE)
        .thumbnail(avatar);

    Message::embed(embed)
}

pub fn solve(user: &TrackedUser, solve: &Solve, avatar: Option<&str>) -> Message {
    let (kind, description, color) = match solve {
        Solve::UserFlag { target } => (
            "👤 User Flag",
            format!("**{target}** user access obtained! Keep going for Root! 🚀"),
            color::ORANGE,
        ),
        Solve::RootFlag { target } => (
            "💀 Root Flag",
            format!("**{target}** has been fully compromised! System Own3d."),
            color::RED,
        ),
        Solve::Challenge { target, category } => {
            let suffix = category
                .as_deref()
                .map(|category| format!(" ({category})"))
                .unwrap_or_default();
            (
                "🧩 Challenge",
                format!("**{target}**{suffix} has been solved."),
                color::GREEN,
            )
        }
    };

    let mut embed = Embed::titled(format!("🚩 {} got a {}!", user.name, kind))
        .description(description)
        .color(color)
        .field("Weekly Progress", progress_lines(user), true)
        .field("Streak", format!("{} 🔥", user.streak), true);

    if let Some(avatar) = avatar {
        embed = embed.thumbnail(avatar);
    }

    Message::embed(embed)
}

pub fn stats(user: &TrackedUser) -> Message {
    let embed = Embed::titled(format!("📊 Stats for {}", user.name))
        .color(color::PURPLE)
        .field("Progress", progress_lines(user), true)
        .field("Streak", format!("{} weeks 🔥", user.streak), true);

    Message::embed(embed)
}

pub fn leaderboard(entries: &[Entry], total_tracked: usize) -> Message {
    let mut embed = Embed::titled("🏆 Weekly Hacker Leaderboard")
        .description("Ranked by Total Solves (User + Root + Challenges)")
        .color(color::GOLD);

    for (rank, entry) in entries.iter().enumerate() {
        let badge = MEDALS
            .get(rank)
            .map(|medal| medal.to_string())
            .unwrap_or_else(|| format!("**#{}**", rank + 1));

        embed = embed.field(
            format!("{} {}", badge, entry.name),
            format!(
                "🖥️ **{}**  🧩 **{}**  |  🔥 **{}**",
                entry.machines, entry.challenges, entry.streak
            ),
            false,
        );
    }

    Message::embed(embed.footer(format!("Total Tracked Hackers: {total_tracked}")))
}

/// The weekly report embed, plus a follow-up ping for everyone who missed
/// their goals (when any of them has a chat handle on file).
pub fn weekly(outcomes: &[PeriodOutcome]) -> (Message, Option<Message>) {
    let achieved = outcomes
        .iter()
        .filter(|outcome| outcome.met)
        .map(|outcome| format!("🔥 **{}** (Streak: {})", outcome.name, outcome.streak))
        .join("\n");

    let missed = outcomes
        .iter()
        .filter(|outcome| !outcome.met)
        .map(|outcome| {
            format!(
                "💀 **{}** ({}/{} 🖥️, {}/{} 🧩)",
                outcome.name,
                outcome.machines,
                outcome.goals.machines,
                outcome.challenges,
                outcome.goals.challenges
            )
        })
        .join("\n");

    let embed = Embed::titled("🗓️ Weekly Reset & Report")
        .description("The week has ended! Here is the breakdown:")
        .color(color::DARK_GREY)
        .field(
            "✅ Goal Achieved",
            fallback(achieved, "None... 😢 Do better next week!"),
            false,
        )
        .field(
            "❌ Missed Goals",
            fallback(missed, "None! Everyone is a Legend! 🎉"),
            false,
        );

    let pings = outcomes
        .iter()
        .filter(|outcome| !outcome.met)
        .filter_map(|outcome| outcome.discord_handle.as_deref())
        .map(|handle| format!("<@{handle}>"))
        .join(" ");

    let shame = (!pings.is_empty()).then(|| Message::text(format!("{pings} why you slack bro 📉")));

    (Message::embed(embed), shame)
}

fn progress_lines(user: &TrackedUser) -> String {
    let machines_met = user.progress.machines >= u64::from(user.goals.machines);
    let challenges_met = user.progress.challenges >= u64::from(user.goals.challenges);

    format!(
        "🖥️ {}/{} {}\n🧩 {}/{} {}",
        user.progress.machines,
        user.goals.machines,
        check_mark(machines_met),
        user.progress.challenges,
        user.goals.challenges,
        check_mark(challenges_met),
    )
}

fn check_mark(met: bool) -> &'static str {
    if met {
        "✅"
    } else {
        "❌"
    }
}

fn fallback(text: String, empty: &str) -> String {
    if text.is_empty() {
        empty.to_string()
    } else {
        clip(text)
    }
}

fn clip(text: String) -> String {
    if text.chars().count() <= FIELD_LIMIT {
        return text;
    }

    let clipped: String = text.chars().take(FIELD_LIMIT).collect();
    format!("{clipped}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::{ActivitySnapshot, Goals, Progress, TrackedUser, UserId};

    fn user(name: &str, machines: u64, challenges: u64, streak: u32) -> TrackedUser {
        let mut user = TrackedUser::begin(
            UserId::new(7),
            name.to_string(),
            Some("1001".to_string()),
            Goals::default(),
            ActivitySnapshot::default(),
        );
        user.streak = streak;
        user.progress = Progress {
            machines,
            challenges,
            ..Progress::default()
        };
        user
    }

    fn outcome(name: &str, met: bool, handle: Option<&str>) -> PeriodOutcome {
        PeriodOutcome {
            id: UserId::new(7),
            name: name.to_string(),
            discord_handle: handle.map(str::to_string),
            met,
            machines: 0,
            challenges: 1,
            goals: Goals::default(),
            streak: u32::from(met),
        }
    }

    #[test]
    fn solve_announcement_carries_goal_check_marks() {
        let message = solve(
            &user("m4verick", 1, 0, 2),
            &Solve::RootFlag {
                target: "Blue".to_string(),
            },
            None,
        );

        let embed = &message.embeds[0];
        assert_eq!(embed.title.as_deref(), Some("🚩 m4verick got a 💀 Root Flag!"));
        let progress = &embed.fields[0].value;
        assert!(progress.contains("🖥️ 1/1 ✅"));
        assert!(progress.contains("🧩 0/2 ❌"));
    }

    #[test]
    fn challenge_announcement_includes_the_category() {
        let message = solve(
            &user("m4verick", 0, 1, 0),
            &Solve::Challenge {
                target: "BabyEncryption".to_string(),
                category: Some("Crypto".to_string()),
            },
            None,
        );

        let description = message.embeds[0].description.as_deref().unwrap();
        assert!(description.contains("**BabyEncryption** (Crypto)"));
    }

    #[test]
    fn weekly_report_splits_achievers_from_missers() {
        let outcomes = [
            outcome("winner", true, Some("1001")),
            outcome("slacker", false, Some("1002")),
        ];

        let (report, shame) = weekly(&outcomes);

        let embed = &report.embeds[0];
        assert!(embed.fields[0].value.contains("**winner**"));
        assert!(embed.fields[1].value.contains("**slacker**"));

        let shame = shame.unwrap();
        assert_eq!(
            shame.content.as_deref(),
            Some("<@1002> why you slack bro 📉")
        );
    }

    #[test]
    fn weekly_report_without_missers_skips_the_ping() {
        let outcomes = [outcome("winner", true, Some("1001"))];

        let (report, shame) = weekly(&outcomes);

        assert!(shame.is_none());
        assert!(report.embeds[0].fields[1].value.contains("None!"));
    }

    #[test]
    fn leaderboard_awards_medals_to_the_top_three() {
        let entries: Vec<Entry> = (0..4)
            .map(|n| Entry {
                name: format!("hacker-{n}"),
                machines: 0,
                challenges: 0,
                streak: 0,
                total: 0,
            })
            .collect();

        let message = leaderboard(&entries, 4);
        let embed = &message.embeds[0];

        assert!(embed.fields[0].name.starts_with("🥇"));
        assert!(embed.fields[2].name.starts_with("🥉"));
        assert!(embed.fields[3].name.starts_with("**#4**"));
        assert_eq!(
            embed.footer.as_ref().unwrap().text,
            "Total Tracked Hackers: 4"
        );
    }

    #[test]
    fn overlong_lists_are_clipped() {
        let long = "x".repeat(FIELD_LIMIT + 50);

        let clipped = clip(long);

        assert_eq!(clipped.chars().count(), FIELD_LIMIT + 3);
        assert!(clipped.ends_with("..."));
    }
}
