use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{LinkState, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedeemLink {
    pub id: String,
    pub token: String,
    pub user_id: UserId,
    pub state: LinkState,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub claimed_by: Option<UserId>,
}

impl RedeemLink {
    /// State as seen at `now`. A pending link past its expiry reads as
    /// expired whether or not that was ever written back.
    #[must_use]
    pub fn effective_state(&self, now: DateTime<Utc>) -> LinkState {
        match self.state {
            LinkState::Pending if now >= self.expires_at => LinkState::Expired,
            state => state,
        }
    }
}

/// What `issue` hands back to the caller: the stored link plus the URL to
/// show the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuedLink {
    pub link: RedeemLink,
    pub long_url: String,
    pub short_url: String,
}

/// Outcome of a successful `resolve`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Redemption {
    pub user_id: UserId,
    pub credited: i64,
    pub balance: i64,
    pub claimed_by: Option<UserId>,
    /// Joining bonus credited to `claimed_by`; zero for self-claims.
    pub joiner_credited: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn link(state: LinkState, created: DateTime<Utc>) -> RedeemLink {
        RedeemLink {
            id: "l1".to_string(),
            token: "t1".to_string(),
            user_id: UserId::new(1),
            state,
            created_at: created,
            expires_at: created + Duration::hours(1),
            completed_at: None,
            claimed_by: None,
        }
    }

    #[test]
    fn pending_link_expires_at_boundary() {
        let created = Utc::now();
        let l = link(LinkState::Pending, created);

        assert_eq!(l.effective_state(created + Duration::minutes(59)), LinkState::Pending);
        assert_eq!(l.effective_state(created + Duration::hours(1)), LinkState::Expired);
        assert_eq!(l.effective_state(created + Duration::minutes(61)), LinkState::Expired);
    }

    #[test]
    fn completed_link_stays_completed_after_expiry() {
        let created = Utc::now();
        let l = link(LinkState::Completed, created);
        assert_eq!(l.effective_state(created + Duration::days(2)), LinkState::Completed);
    }
}
