//! In-memory [`EntityStore`] backed by a single mutex.
//!
//! Every trait method takes the lock once, so each call is one atomic
//! critical section. Ids are sequential per entity kind, starting at 1.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use common::protocol::{InvitationStatus, MeetingStatus, Role};

use crate::errors::StoreError;
use crate::model::{
    BandwidthStat, Meeting, MeetingId, MeetingRating, Message, MessageId, NewMeeting, NewUser,
    OptionId, Participant, Poll, PollId, PollOption, Reaction, User, UserId,
};
use crate::store::{EntityStore, OptionTally};

#[derive(Debug)]
struct PollRecord {
    poll: Poll,
    /// One entry per voter; replacing a vote is a plain insert.
    votes: HashMap<UserId, OptionId>,
}

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    meetings: HashMap<MeetingId, Meeting>,
    participants: HashMap<(MeetingId, UserId), Participant>,
    messages: Vec<Message>,
    polls: HashMap<PollId, PollRecord>,
    reactions: Vec<Reaction>,
    ratings: Vec<MeetingRating>,
    bandwidth: Vec<BandwidthStat>,
    next_user_id: UserId,
    next_meeting_id: MeetingId,
    next_message_id: MessageId,
    next_poll_id: PollId,
    next_option_id: OptionId,
}

/// In-memory entity store. Cheap to clone via `Arc`; state lives for the
/// process lifetime only.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        // A poisoned lock only means another call panicked mid-write in a
        // test build; the data itself is still usable.
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn next_id(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        let mut tables = self.lock();
        if tables.users.values().any(|u| u.login == new_user.login) {
            return Err(StoreError::DuplicateLogin);
        }
        let id = next_id(&mut tables.next_user_id);
        let user = User {
            id,
            login: new_user.login,
            password_hash: new_user.password_hash,
            name: new_user.name,
            role: new_user.role,
            created_at: Utc::now(),
        };
        tables.users.insert(id, user.clone());
        Ok(user)
    }

    async fn user_by_id(&self, id: UserId) -> Result<User, StoreError> {
        self.lock()
            .users
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound("user"))
    }

    async fn user_by_login(&self, login: &str) -> Result<User, StoreError> {
        self.lock()
            .users
            .values()
            .find(|u| u.login == login)
            .cloned()
            .ok_or(StoreError::NotFound("user"))
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let mut users: Vec<User> = self.lock().users.values().cloned().collect();
        users.sort_by_key(|u| u.id);
        Ok(users)
    }

    async fn update_user(&self, id: UserId, name: String, role: Role) -> Result<User, StoreError> {
        let mut tables = self.lock();
        let user = tables
            .users
            .get_mut(&id)
            .ok_or(StoreError::NotFound("user"))?;
        user.name = name;
        user.role = role;
        Ok(user.clone())
    }

    async fn delete_user(&self, id: UserId) -> Result<(), StoreError> {
        let mut tables = self.lock();
        let user = tables.users.get(&id).ok_or(StoreError::NotFound("user"))?;
        if user.role == Role::Admin {
            let admins = tables
                .users
                .values()
                .filter(|u| u.role == Role::Admin)
                .count();
            if admins <= 1 {
                return Err(StoreError::LastAdmin);
            }
        }
        tables.users.remove(&id);
        tables.participants.retain(|(_, user_id), _| *user_id != id);
        Ok(())
    }

    async fn admin_exists(&self) -> Result<bool, StoreError> {
        Ok(self.lock().users.values().any(|u| u.role == Role::Admin))
    }

    async fn create_meeting(&self, new_meeting: NewMeeting) -> Result<Meeting, StoreError> {
        let mut tables = self.lock();
        if !tables.users.contains_key(&new_meeting.organizer_id) {
            return Err(StoreError::NotFound("user"));
        }
        let id = next_id(&mut tables.next_meeting_id);
        let meeting = Meeting {
            id,
            title: new_meeting.title,
            agenda: new_meeting.agenda,
            scheduled_at: new_meeting.scheduled_at,
            duration_minutes: new_meeting.duration_minutes,
            kind: new_meeting.kind,
            status: MeetingStatus::Planned,
            organizer_id: new_meeting.organizer_id,
            created_at: Utc::now(),
        };
        tables.meetings.insert(id, meeting.clone());
        tables.participants.insert(
            (id, meeting.organizer_id),
            Participant {
                meeting_id: id,
                user_id: meeting.organizer_id,
                status: InvitationStatus::Accepted,
                joined_at: None,
                left_at: None,
            },
        );
        Ok(meeting)
    }

    async fn meeting_by_id(&self, id: MeetingId) -> Result<Meeting, StoreError> {
        self.lock()
            .meetings
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound("meeting"))
    }

    async fn list_meetings(&self) -> Result<Vec<Meeting>, StoreError> {
        let mut meetings: Vec<Meeting> = self.lock().meetings.values().cloned().collect();
        meetings.sort_by_key(|m| m.id);
        Ok(meetings)
    }

    async fn set_meeting_status(
        &self,
        id: MeetingId,
        status: MeetingStatus,
    ) -> Result<bool, StoreError> {
        let mut tables = self.lock();
        let meeting = tables
            .meetings
            .get_mut(&id)
            .ok_or(StoreError::NotFound("meeting"))?;
        if meeting.status == status {
            return Ok(false);
        }
        if status < meeting.status {
            return Err(StoreError::Constraint("meeting status cannot move backward"));
        }
        meeting.status = status;
        Ok(true)
    }

    async fn participant(
        &self,
        meeting_id: MeetingId,
        user_id: UserId,
    ) -> Result<Option<Participant>, StoreError> {
        Ok(self.lock().participants.get(&(meeting_id, user_id)).cloned())
    }

    async fn upsert_participant(&self, participant: Participant) -> Result<(), StoreError> {
        let mut tables = self.lock();
        if !tables.meetings.contains_key(&participant.meeting_id) {
            return Err(StoreError::NotFound("meeting"));
        }
        if !tables.users.contains_key(&participant.user_id) {
            return Err(StoreError::NotFound("user"));
        }
        tables
            .participants
            .insert((participant.meeting_id, participant.user_id), participant);
        Ok(())
    }

    async fn mark_joined(
        &self,
        meeting_id: MeetingId,
        user_id: UserId,
    ) -> Result<(), StoreError> {
        let mut tables = self.lock();
        let row = tables
            .participants
            .get_mut(&(meeting_id, user_id))
            .ok_or(StoreError::NotFound("participant"))?;
        row.status = InvitationStatus::Joined;
        row.joined_at = Some(Utc::now());
        row.left_at = None;
        Ok(())
    }

    async fn mark_left(&self, meeting_id: MeetingId, user_id: UserId) -> Result<(), StoreError> {
        let mut tables = self.lock();
        let row = tables
            .participants
            .get_mut(&(meeting_id, user_id))
            .ok_or(StoreError::NotFound("participant"))?;
        row.status = InvitationStatus::Accepted;
        row.left_at = Some(Utc::now());
        Ok(())
    }

    async fn participants_for_meeting(
        &self,
        meeting_id: MeetingId,
    ) -> Result<Vec<Participant>, StoreError> {
        let mut rows: Vec<Participant> = self
            .lock()
            .participants
            .values()
            .filter(|p| p.meeting_id == meeting_id)
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.user_id);
        Ok(rows)
    }

    async fn joined_count(&self, meeting_id: MeetingId) -> Result<usize, StoreError> {
        Ok(self
            .lock()
            .participants
            .values()
            .filter(|p| p.meeting_id == meeting_id && p.status == InvitationStatus::Joined)
            .count())
    }

    async fn append_message(
        &self,
        meeting_id: MeetingId,
        author_id: UserId,
        content: String,
    ) -> Result<Message, StoreError> {
        let mut tables = self.lock();
        if !tables.meetings.contains_key(&meeting_id) {
            return Err(StoreError::NotFound("meeting"));
        }
        let id = next_id(&mut tables.next_message_id);
        let message = Message {
            id,
            meeting_id,
            author_id,
            content,
            sent_at: Utc::now(),
        };
        tables.messages.push(message.clone());
        Ok(message)
    }

    async fn recent_messages(
        &self,
        meeting_id: MeetingId,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let tables = self.lock();
        let matching: Vec<&Message> = tables
            .messages
            .iter()
            .filter(|m| m.meeting_id == meeting_id)
            .collect();
        let skip = matching.len().saturating_sub(limit);
        Ok(matching.into_iter().skip(skip).cloned().collect())
    }

    async fn create_poll(
        &self,
        meeting_id: MeetingId,
        question: String,
        options: Vec<String>,
    ) -> Result<Poll, StoreError> {
        let mut tables = self.lock();
        if !tables.meetings.contains_key(&meeting_id) {
            return Err(StoreError::NotFound("meeting"));
        }
        let id = next_id(&mut tables.next_poll_id);
        let options = options
            .into_iter()
            .map(|text| PollOption {
                id: next_id(&mut tables.next_option_id),
                text,
            })
            .collect();
        let poll = Poll {
            id,
            meeting_id,
            question,
            created_at: Utc::now(),
            options,
        };
        tables.polls.insert(
            id,
            PollRecord {
                poll: poll.clone(),
                votes: HashMap::new(),
            },
        );
        Ok(poll)
    }

    async fn poll_by_id(&self, id: PollId) -> Result<Poll, StoreError> {
        self.lock()
            .polls
            .get(&id)
            .map(|r| r.poll.clone())
            .ok_or(StoreError::NotFound("poll"))
    }

    async fn cast_vote(
        &self,
        poll_id: PollId,
        option_id: OptionId,
        user_id: UserId,
    ) -> Result<(), StoreError> {
        let mut tables = self.lock();
        let record = tables
            .polls
            .get_mut(&poll_id)
            .ok_or(StoreError::NotFound("poll"))?;
        if !record.poll.options.iter().any(|o| o.id == option_id) {
            return Err(StoreError::Constraint("option does not belong to this poll"));
        }
        record.votes.insert(user_id, option_id);
        Ok(())
    }

    async fn poll_results(&self, poll_id: PollId) -> Result<Vec<OptionTally>, StoreError> {
        let tables = self.lock();
        let record = tables.polls.get(&poll_id).ok_or(StoreError::NotFound("poll"))?;
        Ok(record
            .poll
            .options
            .iter()
            .map(|option| OptionTally {
                option_id: option.id,
                text: option.text.clone(),
                votes: record.votes.values().filter(|&&v| v == option.id).count(),
            })
            .collect())
    }

    async fn add_reaction(&self, reaction: Reaction) -> Result<(), StoreError> {
        let mut tables = self.lock();
        if !tables.meetings.contains_key(&reaction.meeting_id) {
            return Err(StoreError::NotFound("meeting"));
        }
        tables.reactions.push(reaction);
        Ok(())
    }

    async fn add_rating(&self, rating: MeetingRating) -> Result<(), StoreError> {
        let mut tables = self.lock();
        if !tables.meetings.contains_key(&rating.meeting_id) {
            return Err(StoreError::NotFound("meeting"));
        }
        tables.ratings.push(rating);
        Ok(())
    }

    async fn ratings_for_meeting(
        &self,
        meeting_id: MeetingId,
    ) -> Result<Vec<MeetingRating>, StoreError> {
        let tables = self.lock();
        Ok(tables
            .ratings
            .iter()
            .filter(|r| r.meeting_id == meeting_id)
            .cloned()
            .collect())
    }

    async fn add_bandwidth_stat(&self, stat: BandwidthStat) -> Result<(), StoreError> {
        let mut tables = self.lock();
        if !tables.meetings.contains_key(&stat.meeting_id) {
            return Err(StoreError::NotFound("meeting"));
        }
        tables.bandwidth.push(stat);
        Ok(())
    }
}
