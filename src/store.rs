use std::ffi::OsString;
use std::path::{Path, PathBuf};

use derive_new::new;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use snafu::{Location, ResultExt, Snafu};

use crate::model::{TrackedUser, UserId};

pub const FORMAT_VERSION: u32 = 1;

/// Everyone the bot is watching, in tracking order.
///
/// Insertion order is load-bearing: it is the final leaderboard tie-break.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Roster {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    users: IndexMap<UserId, TrackedUser>,
}

impl Default for Roster {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION,
            users: IndexMap::new(),
        }
    }
}

impl Roster {
    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn contains(&self, id: UserId) -> bool {
        self.users.contains_key(&id)
    }

    pub fn get(&self, id: UserId) -> Option<&TrackedUser> {
        self.users.get(&id)
    }

    pub fn get_mut(&mut self, id: UserId) -> Option<&mut TrackedUser> {
        self.users.get_mut(&id)
    }

    pub fn insert(&mut self, user: TrackedUser) {
        self.users.insert(user.id, user);
    }

    /// Remove a user, keeping the relative order of everyone else.
    pub fn remove(&mut self, id: UserId) -> Option<TrackedUser> {
        self.users.shift_remove(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = UserId> + '_ {
        self.users.keys().copied()
    }

    pub fn users(&self) -> impl Iterator<Item = &TrackedUser> {
        self.users.values()
    }

    pub fn users_mut(&mut self) -> impl Iterator<Item = &mut TrackedUser> {
        self.users.values_mut()
    }

    /// Patch up entries written by an older version of the snapshot format.
    ///
    /// Entries that predate the `observed` field deserialize with an empty
    /// snapshot there; seed it from the baseline so the first poll after an
    /// upgrade does not report every counter as an anomaly.
    fn migrate(&mut self) {
        for user in self.users.values_mut() {
            if user.observed == Default::default() {
                user.observed = user.baseline.clone();
            }
        }
        self.version = FORMAT_VERSION;
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    /// could not serialize the roster
    Encode {
        source: serde_json::Error,
        #[snafu(implicit)]
        location: Location,
    },

    /// could not write the roster snapshot
    Write {
        path: PathBuf,
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },

    /// could not move the roster snapshot into place
    Commit {
        path: PathBuf,
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },
}

/// Flat-file snapshot store for the roster. Single writer: only the task
/// that owns the roster calls [Store::save].
#[derive(Debug, Clone, new)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    /// Load the roster from disk.
    ///
    /// A missing snapshot is a fresh start. A corrupt one is moved aside to
    /// `<path>.bak` and also treated as a fresh start; losing tracking state
    /// beats refusing to boot.
    pub fn load(&self) -> Roster {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "no roster snapshot, starting fresh");
                return Roster::default();
            }
            Err(error) => {
                tracing::warn!(%error, path = %self.path.display(), "could not read the roster snapshot, starting fresh");
                return Roster::default();
            }
        };

        match serde_json::from_slice::<Roster>(&bytes) {
            Ok(mut roster) => {
                roster.migrate();
                roster
            }
            Err(error) => {
                let backup = append_extension(&self.path, "bak");
                tracing::warn!(
                    %error,
                    path = %self.path.display(),
                    backup = %backup.display(),
                    "roster snapshot is corrupt, moving it aside and starting fresh"
                );
                if let Err(error) = std::fs::rename(&self.path, &backup) {
                    tracing::warn!(%error, "could not move the corrupt snapshot aside");
                }
                Roster::default()
            }
        }
    }

    /// Persist the roster.
    ///
    /// Writes to a sibling temp file and renames it over the target, so a
    /// crash mid-write can never clobber the last committed snapshot.
    pub fn save(&self, roster: &Roster) -> Result<(), StoreError> {
        let body = serde_json::to_vec_pretty(roster).context(EncodeSnafu)?;

        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context(WriteSnafu {
                path: parent.to_path_buf(),
            })?;
        }

        let staging = append_extension(&self.path, "tmp");
        std::fs::write(&staging, body).context(WriteSnafu {
            path: staging.clone(),
        })?;
        std::fs::rename(&staging, &self.path).context(CommitSnafu {
            path: self.path.clone(),
        })
    }
}

fn append_extension(path: &Path, extension: &str) -> PathBuf {
    let mut raw = OsString::from(path.as_os_str());
    raw.push(".");
    raw.push(extension);
    PathBuf::from(raw)
}
