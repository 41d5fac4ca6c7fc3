//! Thread records and their categorical fields.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Declares a categorical thread field with an explicit `Unknown` variant.
///
/// Values serialize as lowercase strings. Anything unrecognised, including a
/// missing field, reads back as `Unknown` so malformed records never fail
/// deserialization.
macro_rules! category {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
            Deserialize,
        )]
        #[serde(from = "String", into = "String")]
        pub enum $name {
            $($variant,)+
            #[default]
            Unknown,
        }

        impl $name {
            /// Every variant except `Unknown`, in declaration order.
            pub const KNOWN: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                    $name::Unknown => "unknown",
                }
            }

            pub fn is_known(self) -> bool {
                self != $name::Unknown
            }

            /// Lenient parse: unrecognised input maps to `Unknown`.
            pub fn parse(s: &str) -> Self {
                Self::parse_strict(s).unwrap_or($name::Unknown)
            }

            /// Strict parse: `None` unless the input is a declared value or
            /// the literal `unknown`.
            pub fn parse_strict(s: &str) -> Option<Self> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Some($name::$variant),)+
                    "unknown" => Some($name::Unknown),
                    _ => None,
                }
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::parse(&s)
            }
        }

        impl From<$name> for String {
            fn from(v: $name) -> Self {
                v.as_str().to_string()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(self.as_str())
            }
        }
    };
}

category! {
    /// What the user meant by a weave.
    Intention {
        Serenity => "serenity",
        Vibrancy => "vibrancy",
        Awe => "awe",
        Legacy => "legacy",
    }
}

category! {
    TimeOfDay {
        Dawn => "dawn",
        Midday => "midday",
        Dusk => "dusk",
        Night => "night",
    }
}

category! {
    /// Map sector a thread was woven in.
    Region {
        Coast => "coast",
        Medina => "medina",
        Sahara => "sahara",
        Kasbah => "kasbah",
    }
}

/// One immutable ledger record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    /// Short content hash, unique within a ledger.
    pub id: String,
    #[serde(default)]
    pub intention: Intention,
    #[serde(rename = "time", default)]
    pub time_of_day: TimeOfDay,
    #[serde(default)]
    pub region: Region,
    #[serde(default)]
    pub title: Option<String>,
    /// Unix milliseconds.
    pub timestamp: u64,
    #[serde(default)]
    pub previous_hash: String,
    #[serde(default)]
    pub hash: String,
}

impl Thread {
    /// True when any categorical field is `Unknown`.
    pub fn is_malformed(&self) -> bool {
        !self.intention.is_known() || !self.time_of_day.is_known() || !self.region.is_known()
    }

    pub fn title_str(&self) -> &str {
        self.title.as_deref().unwrap_or("")
    }

    /// Same intention, time of day, region and title.
    pub fn same_semantics(&self, other: &Thread) -> bool {
        self.intention == other.intention
            && self.time_of_day == other.time_of_day
            && self.region == other.region
            && self.title_str() == other.title_str()
    }
}

/// Input to [`Ledger::append`](crate::Ledger::append).
///
/// `id` and `timestamp` are assigned by the ledger when absent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadDraft {
    pub intention: Intention,
    pub time_of_day: TimeOfDay,
    pub region: Region,
    pub title: Option<String>,
    pub id: Option<String>,
    pub timestamp: Option<u64>,
}

impl ThreadDraft {
    pub fn new(intention: Intention, time_of_day: TimeOfDay, region: Region) -> Self {
        Self {
            intention,
            time_of_day,
            region,
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChainPayload<'a> {
    intention: &'a str,
    time: &'a str,
    region: &'a str,
    title: &'a str,
    timestamp: u64,
    previous_hash: &'a str,
}

/// SHA-256 over the canonical JSON payload, as 64 lowercase hex characters.
pub fn chain_hash(
    intention: Intention,
    time_of_day: TimeOfDay,
    region: Region,
    title: &str,
    timestamp: u64,
    previous_hash: &str,
) -> String {
    let payload = ChainPayload {
        intention: intention.as_str(),
        time: time_of_day.as_str(),
        region: region.as_str(),
        title,
        timestamp,
        previous_hash,
    };
    // A struct of strings and integers always serializes.
    let bytes = serde_json::to_vec(&payload).unwrap_or_default();
    format!("{:x}", Sha256::digest(&bytes))
}

/// Recompute a thread's chain hash from its own fields.
pub fn rehash(thread: &Thread, previous_hash: &str) -> String {
    chain_hash(
        thread.intention,
        thread.time_of_day,
        thread.region,
        thread.title_str(),
        thread.timestamp,
        previous_hash,
    )
}
