//! Scheduled training sessions.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Scheduled,
    Completed,
    Cancelled,
    NoShow,
}

/// Trainer/student appointment (`sessions` table).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainingSession {
    pub id: Uuid,
    pub trainer_id: Uuid,
    pub student_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: u32,
    pub status: SessionStatus,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TrainingSession {
    pub fn ends_at(&self) -> DateTime<Utc> {
        self.scheduled_at + Duration::minutes(i64::from(self.duration_minutes))
    }

    /// Whether two active sessions occupy overlapping time.
    pub fn overlaps(&self, start: DateTime<Utc>, duration_minutes: u32) -> bool {
        if self.status == SessionStatus::Cancelled {
            return false;
        }
        let end = start + Duration::minutes(i64::from(duration_minutes));
        self.scheduled_at < end && start < self.ends_at()
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewSession {
    pub student_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    #[validate(range(min = 15, max = 480))]
    pub duration_minutes: u32,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub location: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewSession {
    pub fn into_session(self, trainer_id: Uuid, now: DateTime<Utc>) -> TrainingSession {
        TrainingSession {
            id: Uuid::new_v4(),
            trainer_id,
            student_id: self.student_id,
            scheduled_at: self.scheduled_at,
            duration_minutes: self.duration_minutes,
            status: SessionStatus::Scheduled,
            location: self.location,
            notes: self.notes,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct SessionUpdate {
    pub scheduled_at: Option<DateTime<Utc>>,
    #[validate(range(min = 15, max = 480))]
    pub duration_minutes: Option<u32>,
    pub status: Option<SessionStatus>,
    #[validate(length(max = 200))]
    pub location: Option<String>,
    pub notes: Option<String>,
}

impl SessionUpdate {
    /// Whether this update moves the session in time.
    pub fn reschedules(&self) -> bool {
        self.scheduled_at.is_some() || self.duration_minutes.is_some()
    }

    pub fn apply(self, session: &mut TrainingSession, now: DateTime<Utc>) {
        if let Some(at) = self.scheduled_at {
            session.scheduled_at = at;
        }
        if let Some(minutes) = self.duration_minutes {
            session.duration_minutes = minutes;
        }
        if let Some(status) = self.status {
            session.status = status;
        }
        if let Some(location) = self.location {
            session.location = Some(location);
        }
        if let Some(notes) = self.notes {
            session.notes = Some(notes);
        }
        session.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn session_at(hour: u32, minutes: u32) -> TrainingSession {
        NewSession {
            student_id: Uuid::new_v4(),
            scheduled_at: Utc.with_ymd_and_hms(2026, 3, 2, hour, 0, 0).unwrap(),
            duration_minutes: minutes,
            location: None,
            notes: None,
        }
        .into_session(Uuid::new_v4(), Utc::now())
    }

    #[test]
    fn test_overlap_detection() {
        let session = session_at(9, 60);

        let start = Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 0).unwrap();
        assert!(session.overlaps(start, 60));

        let adjacent = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
        assert!(!session.overlaps(adjacent, 60));

        let before = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        assert!(!session.overlaps(before, 60));
    }

    #[test]
    fn test_cancelled_sessions_never_overlap() {
        let mut session = session_at(9, 60);
        session.status = SessionStatus::Cancelled;
        assert!(!session.overlaps(session.scheduled_at, 60));
    }
}
