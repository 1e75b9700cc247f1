//! Command dispatch.
//!
//! One inbound line is one command: fields split on `|`, field zero names
//! the command. Handlers push every wire line themselves through the
//! session's connection; `dispatch` only converts a [`CommandError`] into
//! the single error reply. The connection stays open after any command
//! failure.

pub mod admin;
pub mod auth;
pub mod chat;
pub mod meetings;
pub mod polls;
pub mod telemetry;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::protocol::{self, FIELD_SEPARATOR};
use tracing::{debug, error, instrument, warn};

use crate::errors::CommandError;
use crate::model::{MeetingId, User};
use crate::registry::ClientConn;
use crate::server::ServerContext;

/// Per-connection state the handlers operate on. Exactly two facts:
/// who is logged in, and which meeting they are attending.
pub struct Session {
    pub conn: Arc<ClientConn>,
    pub user: Option<User>,
    pub current_meeting: Option<MeetingId>,
}

impl Session {
    #[must_use]
    pub fn new(conn: Arc<ClientConn>) -> Self {
        Self {
            conn,
            user: None,
            current_meeting: None,
        }
    }

    pub fn require_user(&self) -> Result<&User, CommandError> {
        self.user.as_ref().ok_or(CommandError::Unauthenticated)
    }

    pub fn require_admin(&self) -> Result<&User, CommandError> {
        let user = self.require_user()?;
        if user.role != common::protocol::Role::Admin {
            return Err(CommandError::Forbidden("admin role required".to_string()));
        }
        Ok(user)
    }

    pub fn require_meeting(&self) -> Result<MeetingId, CommandError> {
        self.current_meeting
            .ok_or_else(|| CommandError::Domain("not in a meeting".to_string()))
    }
}

/// Executes one command line against the session.
#[instrument(skip_all, fields(conn_id = session.conn.id))]
pub async fn dispatch(ctx: &ServerContext, session: &mut Session, line: &str) {
    let mut fields = line.split(FIELD_SEPARATOR);
    let command = fields.next().unwrap_or_default();
    let args: Vec<&str> = fields.collect();

    debug!(
        target: "parley_server::commands",
        command,
        user_id = session.user.as_ref().map(|u| u.id),
        meeting_id = session.current_meeting,
        "dispatching command"
    );

    if let Err(err) = route(ctx, session, command, &args).await {
        match &err {
            // Store and internal failures are server problems, not client
            // mistakes.
            CommandError::Store(_) | CommandError::Internal(_) => error!(
                target: "parley_server::commands",
                command,
                error = %err,
                "command failed"
            ),
            _ => warn!(
                target: "parley_server::commands",
                command,
                error = %err,
                "command rejected"
            ),
        }
        let tag = if command == protocol::CMD_LOGIN {
            protocol::RESP_AUTH_FAIL
        } else {
            protocol::RESP_ERROR
        };
        session.conn.push(format!("{tag}|{}", err.client_reason()));
    }
}

async fn route(
    ctx: &ServerContext,
    session: &mut Session,
    command: &str,
    args: &[&str],
) -> Result<(), CommandError> {
    match command {
        protocol::CMD_LOGIN => auth::login(ctx, session, args).await,
        protocol::CMD_LOGOUT => auth::logout(ctx, session).await,
        protocol::CMD_REGISTER => auth::register(ctx, session, args).await,

        protocol::CMD_GET_MEETINGS => meetings::get_meetings(ctx, session).await,
        protocol::CMD_NEW_MEETING => meetings::new_meeting(ctx, session, args).await,
        protocol::CMD_JOIN => meetings::join(ctx, session, args).await,
        protocol::CMD_LEAVE => meetings::leave(ctx, session).await,
        protocol::CMD_CLOSE_MEETING => meetings::close_meeting(ctx, session, args).await,

        protocol::CMD_CHAT_MSG => chat::chat_msg(ctx, session, args).await,
        protocol::CMD_REQUEST_SPEAK => chat::request_speak(ctx, session).await,
        protocol::CMD_ALLOW_SPEAK => chat::allow_speak(ctx, session, args).await,
        protocol::CMD_DENY_SPEAK => chat::deny_speak(ctx, session, args).await,

        protocol::CMD_CREATE_POLL => polls::create_poll(ctx, session, args).await,
        protocol::CMD_VOTE => polls::vote(ctx, session, args).await,
        protocol::CMD_GET_POLL_RESULTS => polls::get_poll_results(ctx, session, args).await,

        protocol::CMD_REACTION => telemetry::reaction(ctx, session, args).await,
        protocol::CMD_RATE_MEETING => telemetry::rate_meeting(ctx, session, args).await,
        protocol::CMD_START_RECORDING => telemetry::start_recording(ctx, session).await,
        protocol::CMD_STOP_RECORDING => telemetry::stop_recording(ctx, session).await,
        protocol::CMD_UPDATE_BANDWIDTH => telemetry::update_bandwidth(ctx, session, args).await,

        protocol::CMD_GET_USERS => admin::get_users(ctx, session).await,
        protocol::CMD_ADD_USER => admin::add_user(ctx, session, args).await,
        protocol::CMD_UPDATE_USER => admin::update_user(ctx, session, args).await,
        protocol::CMD_DELETE_USER => admin::delete_user(ctx, session, args).await,

        _ => Err(CommandError::Protocol("unknown command".to_string())),
    }
}

/// Positional argument, or a protocol error naming what is missing.
pub(crate) fn arg<'a>(args: &[&'a str], index: usize, what: &str) -> Result<&'a str, CommandError> {
    args.get(index)
        .copied()
        .ok_or_else(|| CommandError::Protocol(format!("missing {what}")))
}

/// Positional argument parsed as a number.
pub(crate) fn parse_arg<T>(args: &[&str], index: usize, what: &str) -> Result<T, CommandError>
where
    T: std::str::FromStr,
{
    arg(args, index, what)?
        .parse()
        .map_err(|_| CommandError::Protocol(format!("invalid {what}")))
}

/// Timestamp rendering used everywhere on the wire.
pub(crate) fn wire_time(at: &DateTime<Utc>) -> String {
    at.format(protocol::WIRE_TIME_FORMAT).to_string()
}

/// Parses a wire timestamp.
pub(crate) fn parse_wire_time(raw: &str, what: &str) -> Result<DateTime<Utc>, CommandError> {
    chrono::NaiveDateTime::parse_from_str(raw, protocol::WIRE_TIME_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| CommandError::Protocol(format!("invalid {what}")))
}
