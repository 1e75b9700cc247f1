//! Wire protocol constants and domain enums.
//!
//! Every client command produces exactly one direct reply line, except
//! `CHAT_MSG` whose only effect is the broadcast. Pushes are unsolicited
//! server→client lines with their own tags; a client can always tell a push
//! from a reply by the leading tag.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Field separator within a line.
pub const FIELD_SEPARATOR: char = '|';

/// Separator between items of a list-valued field.
pub const LIST_SEPARATOR: &str = ";;";

/// Separator within a grouped list item (e.g. `id,text,count`).
pub const ITEM_SEPARATOR: char = ',';

// ======= Client → server commands =======

pub const CMD_LOGIN: &str = "LOGIN";
pub const CMD_LOGOUT: &str = "LOGOUT";
pub const CMD_REGISTER: &str = "REGISTER";

pub const CMD_GET_MEETINGS: &str = "GET_MEETINGS";
pub const CMD_NEW_MEETING: &str = "NEW_MEETING";
pub const CMD_JOIN: &str = "JOIN";
pub const CMD_LEAVE: &str = "LEAVE";
pub const CMD_CLOSE_MEETING: &str = "CLOSE_MEETING";

pub const CMD_CHAT_MSG: &str = "CHAT_MSG";
pub const CMD_REQUEST_SPEAK: &str = "REQUEST_SPEAK";
pub const CMD_ALLOW_SPEAK: &str = "ALLOW_SPEAK";
pub const CMD_DENY_SPEAK: &str = "DENY_SPEAK";

pub const CMD_CREATE_POLL: &str = "CREATE_POLL";
pub const CMD_VOTE: &str = "VOTE";
pub const CMD_GET_POLL_RESULTS: &str = "GET_POLL_RESULTS";

pub const CMD_REACTION: &str = "REACTION";
pub const CMD_RATE_MEETING: &str = "RATE_MEETING";
pub const CMD_START_RECORDING: &str = "START_RECORDING";
pub const CMD_STOP_RECORDING: &str = "STOP_RECORDING";
pub const CMD_UPDATE_BANDWIDTH: &str = "UPDATE_BANDWIDTH";

pub const CMD_GET_USERS: &str = "GET_USERS";
pub const CMD_ADD_USER: &str = "ADD_USER";
pub const CMD_UPDATE_USER: &str = "UPDATE_USER";
pub const CMD_DELETE_USER: &str = "DELETE_USER";

// ======= Server → client replies =======

pub const RESP_OK: &str = "OK";
pub const RESP_ERROR: &str = "ERROR";
pub const RESP_AUTH_OK: &str = "AUTH_OK";
pub const RESP_AUTH_FAIL: &str = "AUTH_FAIL";
pub const RESP_JOIN_OK: &str = "JOIN_OK";
pub const RESP_MEETINGS: &str = "MEETINGS";
pub const RESP_USERS: &str = "USERS";
pub const RESP_POLL_RESULTS: &str = "POLL_RESULTS";

// ======= Server → client pushes =======

pub const PUSH_MEETING_CREATED: &str = "MEETING_CREATED";
pub const PUSH_MEETING_STATUS: &str = "MEETING_STATUS";
pub const PUSH_MEETING_CLOSED: &str = "MEETING_CLOSED";

pub const PUSH_USER_JOINED: &str = "USER_JOINED";
pub const PUSH_USER_LEFT: &str = "USER_LEFT";
pub const PUSH_PARTICIPANTS: &str = "PARTICIPANTS";
pub const PUSH_CHAT_HISTORY: &str = "CHAT_HISTORY";

pub const PUSH_CHAT_MSG: &str = "CHAT_MSG";
pub const PUSH_SPEAK_REQUEST: &str = "SPEAK_REQUEST";
pub const PUSH_SPEAK_GRANTED: &str = "SPEAK_GRANTED";
pub const PUSH_SPEAK_DENIED: &str = "SPEAK_DENIED";
pub const PUSH_SPEAKER_ACTIVE: &str = "SPEAKER_ACTIVE";

pub const PUSH_NEW_POLL: &str = "NEW_POLL";
pub const PUSH_POLL_RESULTS: &str = "POLL_RESULTS";

pub const PUSH_REACTION: &str = "REACTION";
pub const PUSH_MEETING_RATED: &str = "MEETING_RATED";
pub const PUSH_RECORDING_STARTED: &str = "RECORDING_STARTED";
pub const PUSH_RECORDING_STOPPED: &str = "RECORDING_STOPPED";

/// Timestamp format used on the wire (RFC 3339, second precision).
pub const WIRE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A string that is not a valid wire form of the expected enum.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid {kind} value: {value}")]
pub struct InvalidWireValue {
    /// Which enum was being parsed.
    pub kind: &'static str,
    /// The offending input.
    pub value: String,
}

impl InvalidWireValue {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// User role. Two fixed roles, no further policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    User,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::User => "USER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = InvalidWireValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADMIN" => Ok(Role::Admin),
            "USER" => Ok(Role::User),
            other => Err(InvalidWireValue::new("role", other)),
        }
    }
}

/// Meeting type, governing enrollment and poll-creation rights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeetingKind {
    /// Open to self-enrollment without prior invitation.
    Standard,
    /// Invitation required to join.
    Private,
    /// Invitation required; every participant may create polls.
    Democratic,
}

impl MeetingKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MeetingKind::Standard => "Standard",
            MeetingKind::Private => "Private",
            MeetingKind::Democratic => "Democratic",
        }
    }
}

impl fmt::Display for MeetingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MeetingKind {
    type Err = InvalidWireValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Standard" => Ok(MeetingKind::Standard),
            "Private" => Ok(MeetingKind::Private),
            "Democratic" => Ok(MeetingKind::Democratic),
            other => Err(InvalidWireValue::new("meeting kind", other)),
        }
    }
}

/// Meeting status. Transitions are strictly forward: Planned → Open → Closed.
///
/// Declaration order is the transition order; `derive(Ord)` is what enforces
/// "never backward" in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MeetingStatus {
    Planned,
    Open,
    Closed,
}

impl MeetingStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MeetingStatus::Planned => "Planned",
            MeetingStatus::Open => "Open",
            MeetingStatus::Closed => "Closed",
        }
    }
}

impl fmt::Display for MeetingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MeetingStatus {
    type Err = InvalidWireValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Planned" => Ok(MeetingStatus::Planned),
            "Open" => Ok(MeetingStatus::Open),
            "Closed" => Ok(MeetingStatus::Closed),
            other => Err(InvalidWireValue::new("meeting status", other)),
        }
    }
}

/// Invitation/attendance status of one (meeting, user) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvitationStatus {
    Invited,
    Accepted,
    Declined,
    Joined,
}

impl InvitationStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            InvitationStatus::Invited => "invited",
            InvitationStatus::Accepted => "accepted",
            InvitationStatus::Declined => "declined",
            InvitationStatus::Joined => "joined",
        }
    }
}

impl fmt::Display for InvitationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvitationStatus {
    type Err = InvalidWireValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invited" => Ok(InvitationStatus::Invited),
            "accepted" => Ok(InvitationStatus::Accepted),
            "declined" => Ok(InvitationStatus::Declined),
            "joined" => Ok(InvitationStatus::Joined),
            other => Err(InvalidWireValue::new("invitation status", other)),
        }
    }
}
