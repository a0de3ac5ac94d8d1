use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Persistent state for a scheduled event (§3).
///
/// Invariants enforced at the storage layer (not just here):
/// `0 <= available_tickets <= total_tickets`; `version` strictly
/// increases on every mutation.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub id: Uuid,
    pub name: String,
    pub starts_at: DateTime<Utc>,
    pub total_tickets: i64,
    pub available_tickets: i64,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// Whether the event has already started as of `now`. An event whose
    /// `starts_at` is in the past is not purchasable (§3, §4.2 step 4).
    pub fn is_past(&self, now: DateTime<Utc>) -> bool {
        self.starts_at <= now
    }
}

/// A single issued ticket (§3). Tickets are never mutated after the
/// Allocator's transaction that creates them commits.
#[derive(Clone, Debug, PartialEq)]
pub struct Ticket {
    pub id: Uuid,
    pub event_id: Uuid,
    pub purchase_id: Uuid,
    pub issued_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn mk_event(starts_at: DateTime<Utc>) -> Event {
        Event {
            id: Uuid::new_v4(),
            name: "Example".into(),
            starts_at,
            total_tickets: 100,
            available_tickets: 100,
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn future_event_is_not_past() {
        let e = mk_event(Utc::now() + Duration::hours(1));
        assert!(!e.is_past(Utc::now()));
    }

    #[test]
    fn elapsed_event_is_past() {
        let e = mk_event(Utc::now() - Duration::seconds(1));
        assert!(e.is_past(Utc::now()));
    }

    #[test]
    fn starts_at_exactly_now_counts_as_past() {
        let now = Utc::now();
        let e = mk_event(now);
        assert!(e.is_past(now));
    }
}
