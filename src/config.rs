use std::path::PathBuf;
use std::time::Duration;

use chrono::{FixedOffset, NaiveTime, Weekday};
use serde::{Deserialize, Deserializer};
use serde_with::{serde_as, DisplayFromStr};
use snafu::ResultExt;

use crate::discord::DiscordConfig;
use crate::error::{ApplicationError, ConfigLoadSnafu};
use crate::htb::HtbConfig;
use crate::model::{Goals, MachineRule};
use crate::time::WeeklySchedule;

pub fn load() -> Result<Config, ApplicationError> {
    envy::from_env::<Config>().context(ConfigLoadSnafu)
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(flatten)]
    pub htb: HtbConfig,
    #[serde(flatten)]
    pub discord: DiscordConfig,

    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    #[serde(
        default = "default_poll_interval",
        deserialize_with = "humantime_duration"
    )]
    pub poll_interval: Duration,

    #[serde_as(as = "DisplayFromStr")]
    #[serde(default = "default_reset_weekday")]
    pub reset_weekday: Weekday,
    #[serde_as(as = "DisplayFromStr")]
    #[serde(default = "default_reset_time")]
    pub reset_time: NaiveTime,
    #[serde_as(as = "DisplayFromStr")]
    #[serde(default = "default_reset_offset")]
    pub reset_offset: FixedOffset,

    #[serde(default = "default_goal_machines")]
    pub goal_machines: u32,
    #[serde(default = "default_goal_challenges")]
    pub goal_challenges: u32,
    #[serde(default)]
    pub machine_rule: MachineRule,
}

impl Config {
    pub fn goals(&self) -> Goals {
        Goals::new(self.goal_machines, self.goal_challenges)
    }

    pub fn schedule(&self) -> WeeklySchedule {
        WeeklySchedule::new(self.reset_weekday, self.reset_time, self.reset_offset)
    }
}

fn humantime_duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let text = String::deserialize(deserializer)?;
    humantime::parse_duration(&text).map_err(serde::de::Error::custom)
}

fn default_store_path() -> PathBuf {
    PathBuf::from("talon.json")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_reset_weekday() -> Weekday {
    Weekday::Sat
}

fn default_reset_time() -> NaiveTime {
    NaiveTime::from_hms_opt(21, 0, 0).expect("21:00:00 is a valid wall clock time")
}

fn default_reset_offset() -> FixedOffset {
    FixedOffset::east_opt(3 * 3600).expect("+03:00 is a valid utc offset")
}

fn default_goal_machines() -> u32 {
    1
}

fn default_goal_challenges() -> u32 {
    2
}
