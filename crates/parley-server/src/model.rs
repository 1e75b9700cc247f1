//! Entity shapes shared between the store and the command handlers.
//!
//! Entities reference each other by integer id only; whenever an object
//! graph is needed, the handler fetches the related row from the store at
//! the point of use.

use chrono::{DateTime, Utc};
use common::protocol::{InvitationStatus, MeetingKind, MeetingStatus, Role};

pub type UserId = i64;
pub type MeetingId = i64;
pub type MessageId = i64;
pub type PollId = i64;
pub type OptionId = i64;

/// Authenticated account.
#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    /// Unique login name.
    pub login: String,
    /// Bcrypt hash; never the clear-text password.
    pub password_hash: String,
    /// Display name.
    pub name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Fields required to create a [`User`].
#[derive(Debug, Clone)]
pub struct NewUser {
    pub login: String,
    pub password_hash: String,
    pub name: String,
    pub role: Role,
}

/// A mediation meeting. The organizer is fixed at creation.
#[derive(Debug, Clone)]
pub struct Meeting {
    pub id: MeetingId,
    pub title: String,
    pub agenda: String,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: u32,
    pub kind: MeetingKind,
    pub status: MeetingStatus,
    pub organizer_id: UserId,
    pub created_at: DateTime<Utc>,
}

/// Fields required to create a [`Meeting`]. Status always starts Planned.
#[derive(Debug, Clone)]
pub struct NewMeeting {
    pub title: String,
    pub agenda: String,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: u32,
    pub kind: MeetingKind,
    pub organizer_id: UserId,
}

/// One row per (meeting, user) pair; re-joining updates the row.
#[derive(Debug, Clone)]
pub struct Participant {
    pub meeting_id: MeetingId,
    pub user_id: UserId,
    pub status: InvitationStatus,
    pub joined_at: Option<DateTime<Utc>>,
    pub left_at: Option<DateTime<Utc>>,
}

/// Chat message. Append-only; never mutated or deleted.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: MessageId,
    pub meeting_id: MeetingId,
    pub author_id: UserId,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

/// A poll with its ordered options.
#[derive(Debug, Clone)]
pub struct Poll {
    pub id: PollId,
    pub meeting_id: MeetingId,
    pub question: String,
    pub created_at: DateTime<Utc>,
    pub options: Vec<PollOption>,
}

#[derive(Debug, Clone)]
pub struct PollOption {
    pub id: OptionId,
    pub text: String,
}

/// Append-only reaction telemetry.
#[derive(Debug, Clone)]
pub struct Reaction {
    pub meeting_id: MeetingId,
    pub user_id: UserId,
    pub kind: String,
    pub sent_at: DateTime<Utc>,
}

/// Append-only meeting rating.
#[derive(Debug, Clone)]
pub struct MeetingRating {
    pub meeting_id: MeetingId,
    pub user_id: UserId,
    /// 1..=5.
    pub rating: u8,
    pub comment: String,
    pub rated_at: DateTime<Utc>,
}

/// Append-only bandwidth sample reported by a client.
#[derive(Debug, Clone)]
pub struct BandwidthStat {
    pub meeting_id: MeetingId,
    pub user_id: UserId,
    pub recorded_at: DateTime<Utc>,
    pub upload_bytes: u64,
    pub download_bytes: u64,
}
