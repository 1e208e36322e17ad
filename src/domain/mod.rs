//! Domain types for the catalog, ledger and delivery engine.
//!
//! IDs follow the newtype pattern so a `SeriesId` can never be passed where an
//! `EpisodeId` is expected. Enums that are persisted as text expose
//! `as_str`/`parse` pairs so the entity layer can stay on plain strings.

pub mod clock;
pub mod events;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use clock::{Clock, ManualClock, SystemClock};

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident, $inner:ty) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name($inner);

        impl $name {
            #[must_use]
            pub const fn new(id: $inner) -> Self {
                Self(id)
            }

            #[must_use]
            pub const fn value(&self) -> $inner {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$inner> for $name {
            fn from(id: $inner) -> Self {
                Self(id)
            }
        }

        impl From<$name> for $inner {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

id_newtype!(
    /// Chat-platform user identifier. Users are not stored as their own
    /// entity; the token account is keyed by this value.
    UserId,
    i64
);
id_newtype!(SeriesId, i32);
id_newtype!(SeasonId, i32);
id_newtype!(EpisodeId, i32);
id_newtype!(
    /// A single downloadable file of an episode (quality/audio/subtitle combination).
    VariantId,
    i32
);
id_newtype!(RequestId, i32);

/// Error returned when a persisted enum value is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum!(
    /// Release status of a series.
    SeriesStatus, "series status" {
        Ongoing => "ongoing",
        Completed => "completed",
        Movie => "movie",
        Ova => "ova",
    }
);

text_enum!(
    /// Why a ledger transaction happened.
    LedgerCause, "ledger cause" {
        Redeem => "redeem",
        AdminGrant => "admin-grant",
        AdminRevoke => "admin-revoke",
        DownloadDebit => "download-debit",
        RequestDebit => "request-debit",
        Welcome => "welcome",
        ReferralJoin => "referral-join",
    }
);

text_enum!(
    /// Stored state of a redeem link. `Pending` links past their expiry are
    /// treated as expired regardless of what is stored.
    LinkState, "link state" {
        Pending => "pending",
        Completed => "completed",
        Expired => "expired",
    }
);

text_enum!(
    /// Delivery state of one (user, episode) notification.
    MarkerState, "notification marker state" {
        Pending => "pending",
        Delivered => "delivered",
        Failed => "failed",
        Abandoned => "abandoned",
    }
);

text_enum!(
    /// Lifecycle of a user's catalog addition request.
    RequestStatus, "request status" {
        Pending => "pending",
        Fulfilled => "fulfilled",
        Unavailable => "unavailable",
        NotReleased => "not-released",
        Ignored => "ignored",
    }
);

text_enum!(
    /// Persisted maintenance state of the whole store.
    MaintenanceState, "maintenance state" {
        Active => "active",
        WipeInProgress => "wipe-in-progress",
        Wiped => "wiped",
    }
);

/// Parses a persisted enum, falling back to `default` and logging when the
/// stored text is unknown.
pub(crate) fn parse_or<T: FromStr<Err = UnknownVariant>>(value: &str, default: T) -> T {
    value.parse().unwrap_or_else(|e: UnknownVariant| {
        tracing::warn!(kind = e.kind, value = %e.value, "Unknown persisted value, using default");
        default
    })
}

/// One page of a listing, with the total number of matching items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u64,
    pub page_size: u64,
    pub total: u64,
}

impl<T> Page<T> {
    #[must_use]
    pub fn total_pages(&self) -> u64 {
        if self.page_size == 0 {
            return 0;
        }
        self.total.div_ceil(self.page_size)
    }

    #[must_use]
    pub fn has_next(&self) -> bool {
        self.page + 1 < self.total_pages()
    }
}
