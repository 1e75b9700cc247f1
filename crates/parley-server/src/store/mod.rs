//! Entity persistence.
//!
//! [`EntityStore`] is the seam between the command handlers and storage.
//! Each method is one atomic operation; handlers never hold store state
//! across calls. The in-memory implementation lives in [`memory`].

pub mod memory;

use async_trait::async_trait;
use common::protocol::{MeetingStatus, Role};

use crate::errors::StoreError;
use crate::model::{
    BandwidthStat, Meeting, MeetingId, MeetingRating, Message, NewMeeting, NewUser, OptionId,
    Participant, Poll, PollId, Reaction, User, UserId,
};

/// Aggregated tally for one poll option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionTally {
    pub option_id: OptionId,
    pub text: String,
    pub votes: usize,
}

/// Storage seam for users, meetings and everything attached to them.
///
/// Contract: every id an implementation allocates is strictly positive.
/// Zero is reserved as the "no user / no meeting" sentinel in the
/// connection registry's atomic slots.
#[async_trait]
pub trait EntityStore: Send + Sync {
    // --- users ---

    /// Creates a user. Fails with [`StoreError::DuplicateLogin`] if the login
    /// is taken.
    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError>;

    async fn user_by_id(&self, id: UserId) -> Result<User, StoreError>;

    async fn user_by_login(&self, login: &str) -> Result<User, StoreError>;

    async fn list_users(&self) -> Result<Vec<User>, StoreError>;

    async fn update_user(&self, id: UserId, name: String, role: Role) -> Result<User, StoreError>;

    /// Deletes a user. Refuses to remove the last remaining admin; the check
    /// and the removal happen under one lock.
    async fn delete_user(&self, id: UserId) -> Result<(), StoreError>;

    async fn admin_exists(&self) -> Result<bool, StoreError>;

    // --- meetings ---

    /// Creates a meeting in Planned status and enrolls the organizer as an
    /// accepted participant.
    async fn create_meeting(&self, new_meeting: NewMeeting) -> Result<Meeting, StoreError>;

    async fn meeting_by_id(&self, id: MeetingId) -> Result<Meeting, StoreError>;

    async fn list_meetings(&self) -> Result<Vec<Meeting>, StoreError>;

    /// Moves a meeting to `status`. Returns `Ok(true)` if the status changed,
    /// `Ok(false)` if it already held (idempotent no-op), and
    /// [`StoreError::Constraint`] for a backward transition.
    async fn set_meeting_status(
        &self,
        id: MeetingId,
        status: MeetingStatus,
    ) -> Result<bool, StoreError>;

    // --- participants ---

    async fn participant(
        &self,
        meeting_id: MeetingId,
        user_id: UserId,
    ) -> Result<Option<Participant>, StoreError>;

    /// Inserts or replaces the (meeting, user) enrollment row.
    async fn upsert_participant(&self, participant: Participant) -> Result<(), StoreError>;

    /// Marks the user as joined and stamps `joined_at`.
    async fn mark_joined(&self, meeting_id: MeetingId, user_id: UserId)
        -> Result<(), StoreError>;

    /// Stamps `left_at` and reverts the row to accepted.
    async fn mark_left(&self, meeting_id: MeetingId, user_id: UserId) -> Result<(), StoreError>;

    async fn participants_for_meeting(
        &self,
        meeting_id: MeetingId,
    ) -> Result<Vec<Participant>, StoreError>;

    /// Number of participants currently in joined status.
    async fn joined_count(&self, meeting_id: MeetingId) -> Result<usize, StoreError>;

    // --- chat ---

    async fn append_message(
        &self,
        meeting_id: MeetingId,
        author_id: UserId,
        content: String,
    ) -> Result<Message, StoreError>;

    /// The most recent `limit` messages, oldest first.
    async fn recent_messages(
        &self,
        meeting_id: MeetingId,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError>;

    // --- polls ---

    /// Creates a poll and its options in one step.
    async fn create_poll(
        &self,
        meeting_id: MeetingId,
        question: String,
        options: Vec<String>,
    ) -> Result<Poll, StoreError>;

    async fn poll_by_id(&self, id: PollId) -> Result<Poll, StoreError>;

    /// Records a vote, replacing the voter's previous vote on this poll if
    /// any. The option must belong to the poll.
    async fn cast_vote(
        &self,
        poll_id: PollId,
        option_id: OptionId,
        user_id: UserId,
    ) -> Result<(), StoreError>;

    /// Live tallies for every option of the poll, in option order.
    async fn poll_results(&self, poll_id: PollId) -> Result<Vec<OptionTally>, StoreError>;

    // --- telemetry ---

    async fn add_reaction(&self, reaction: Reaction) -> Result<(), StoreError>;

    async fn add_rating(&self, rating: MeetingRating) -> Result<(), StoreError>;

    async fn ratings_for_meeting(
        &self,
        meeting_id: MeetingId,
    ) -> Result<Vec<MeetingRating>, StoreError>;

    async fn add_bandwidth_stat(&self, stat: BandwidthStat) -> Result<(), StoreError>;
}
