use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::Deserialize;
use snafu::{Location, OptionExt as _, ResultExt, Snafu};
use tokio_retry::strategy::FixedInterval;
use tokio_retry::Retry;
use tracing::instrument;
use url::Url;

use crate::error::{ApplicationError, HtbClientSnafu, HtbCredentialsSnafu};
use crate::model::{ActivityDetail, Counters, Observation, Timestamp, UserId};

/// Transient transport failures get a couple of quick retries within the
/// tick; anything still failing is skipped until the next tick.
const RETRY_DELAY_MS: u64 = 500;
const RETRY_ATTEMPTS: usize = 2;

const DEFAULT_AVATAR: &str = "/images/logo-htb.png";

pub fn connect(config: &HtbConfig) -> Result<Htb, ApplicationError> {
    let mut bearer = HeaderValue::from_str(&format!("Bearer {}", config.htb_api_token))
        .context(HtbCredentialsSnafu)?;
    bearer.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, bearer);
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(USER_AGENT, HeaderValue::from_static("talon/0.1"));

    let client = reqwest::Client::builder()
        .default_headers(headers)
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .context(HtbClientSnafu)?;

    Ok(Htb {
        client,
        base: config.htb_api_url.clone(),
    })
}

/// Accepts a raw numeric id, or an HTB profile url to lift the id out of.
pub fn parse_user_id(text: &str) -> Result<UserId, ParseUserIdErr> {
    // if text is not a url, it must be the id itself
    let Ok(url) = Url::parse(text) else {
        return text.parse().ok().context(ExpectNumericIdSnafu { text });
    };

    let host = url.host_str();
    if host == Some("app.hackthebox.com") || host == Some("labs.hackthebox.com") {
        let id = url
            .path_segments()
            .context(MissingIdFragmentSnafu { text })?
            .skip_while(|segment| *segment != "users" && *segment != "profile")
            .nth(1)
            .context(MissingIdFragmentSnafu { text })?;
        return id.parse().ok().context(ExpectNumericIdSnafu { text });
    }

    Err(ParseUserIdErr::ExpectProfileUrl {
        text: text.to_string(),
    })
}

#[derive(Debug, Snafu, PartialEq)]
pub enum ParseUserIdErr {
    /// text is not a numeric user id
    ExpectNumericId { text: String },

    /// text is a url, but it doesn't point to an htb profile
    ExpectProfileUrl { text: String },

    /// text is a profile url, but it's missing the id segment
    MissingIdFragment { text: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct HtbConfig {
    pub htb_api_token: String,
    #[serde(default = "default_api_url")]
    pub htb_api_url: Url,
}

fn default_api_url() -> Url {
    Url::parse("https://labs.hackthebox.com").expect("the default api url is well formed")
}

#[derive(Clone)]
pub struct Htb {
    client: reqwest::Client,
    base: Url,
}

impl Htb {
    #[instrument(skip(self))]
    pub async fn profile(&self, user_id: UserId) -> Result<Profile, HtbError> {
        let envelope: ProfileEnvelope = self
            .fetch(format!("/api/v4/user/profile/basic/{user_id}"))
            .await?
            .context(UserNotFoundSnafu { user_id })?;

        let avatar = self.avatar_url(envelope.profile.avatar.as_deref());
        Ok(Profile {
            name: envelope.profile.name,
            avatar,
        })
    }

    /// The user's full activity feed, newest first.
    #[instrument(skip(self))]
    pub async fn activity(&self, user_id: UserId) -> Result<Vec<ActivityEntry>, HtbError> {
        let envelope: ActivityEnvelope = self
            .fetch(format!("/api/v4/user/profile/activity/{user_id}"))
            .await?
            .context(UserNotFoundSnafu { user_id })?;

        Ok(envelope.profile.activity)
    }

    /// Category of a challenge, for announcement flavor. A challenge that has
    /// vanished from the platform is not an error.
    #[instrument(skip(self))]
    pub async fn challenge_category(&self, challenge_id: u64) -> Result<Option<String>, HtbError> {
        let envelope: Option<ChallengeEnvelope> = self
            .fetch(format!("/api/v4/challenge/info/{challenge_id}"))
            .await?;

        Ok(envelope.and_then(|envelope| envelope.challenge.category_name))
    }

    async fn fetch<T: serde::de::DeserializeOwned>(
        &self,
        path: String,
    ) -> Result<Option<T>, HtbError> {
        let url = self.base.join(&path).context(EndpointSnafu)?;

        let strategy = FixedInterval::from_millis(RETRY_DELAY_MS).take(RETRY_ATTEMPTS);
        let response = Retry::spawn(strategy, || self.client.get(url.clone()).send())
            .await
            .context(TransportSnafu)?;

        match response.status() {
            reqwest::StatusCode::NOT_FOUND => Ok(None),
            reqwest::StatusCode::UNAUTHORIZED => UnauthorizedSnafu.fail(),
            status if !status.is_success() => ApiSnafu { status, url }.fail(),
            _ => response.json().await.context(DecodeSnafu).map(Some),
        }
    }

    fn avatar_url(&self, avatar: Option<&str>) -> String {
        let path = avatar.unwrap_or(DEFAULT_AVATAR);
        self.base
            .join(path)
            .map(|url| url.to_string())
            .unwrap_or_else(|_| path.to_string())
    }
}

/// Collapse an activity feed into cumulative counters plus the per-target id
/// sets behind them.
pub fn observation(entries: &[ActivityEntry]) -> Observation {
    let mut detail = ActivityDetail::default();

    for entry in entries {
        match (entry.object_type, entry.flag) {
            (ObjectType::Machine, Some(FlagType::User)) => {
                detail.user_flag_targets.insert(entry.id);
            }
            (ObjectType::Machine, Some(FlagType::Root)) => {
                detail.root_flag_targets.insert(entry.id);
            }
            (ObjectType::Challenge, _) => {
                detail.challenges.insert(entry.id);
            }
            // fortresses, endgames and the like carry no weekly goal
            _ => {}
        }
    }

    let counters = Counters {
        user_flags: detail.user_flag_targets.len() as u64,
        root_flags: detail.root_flag_targets.len() as u64,
        challenge_solves: detail.challenges.len() as u64,
    };

    Observation::new(counters, Some(detail))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub avatar: String,
}

/// One row of a user's activity feed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ActivityEntry {
    pub id: u64,
    pub name: String,
    pub object_type: ObjectType,
    #[serde(rename = "type", default)]
    pub flag: Option<FlagType>,
    #[serde(default)]
    pub date: Option<Timestamp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    Machine,
    Challenge,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagType {
    User,
    Root,
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ProfileEnvelope {
    profile: ProfileBody,
}

#[derive(Debug, Deserialize)]
struct ProfileBody {
    name: String,
    #[serde(default)]
    avatar: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ActivityEnvelope {
    profile: ActivityBody,
}

#[derive(Debug, Deserialize)]
struct ActivityBody {
    #[serde(default)]
    activity: Vec<ActivityEntry>,
}

#[derive(Debug, Deserialize)]
struct ChallengeEnvelope {
    challenge: ChallengeBody,
}

#[derive(Debug, Deserialize)]
struct ChallengeBody {
    #[serde(default)]
    category_name: Option<String>,
}

#[derive(Debug, Snafu)]
pub enum HtbError {
    /// the user does not exist on the platform
    UserNotFound {
        user_id: UserId,
        #[snafu(implicit)]
        location: Location,
    },

    /// the api token was rejected, check HTB_API_TOKEN
    Unauthorized {
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("the api answered {status} for {url}"))]
    Api {
        status: reqwest::StatusCode,
        url: Url,
        #[snafu(implicit)]
        location: Location,
    },

    /// could not reach the platform api
    Transport {
        source: reqwest::Error,
        #[snafu(implicit)]
        location: Location,
    },

    /// could not decode the platform response
    Decode {
        source: reqwest::Error,
        #[snafu(implicit)]
        location: Location,
    },

    /// not a valid api endpoint path
    Endpoint {
        source: url::ParseError,
        #[snafu(implicit)]
        location: Location,
    },
}
