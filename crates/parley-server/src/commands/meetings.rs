//! Meeting lifecycle: listing, creation, join/leave, close.
//!
//! Status only ever moves forward (Planned, then Open, then Closed). The
//! organizer's first join opens the meeting; closing happens explicitly or
//! automatically when the organizer leaves an emptied meeting.

use common::protocol::{
    self, InvitationStatus, MeetingKind, MeetingStatus, ITEM_SEPARATOR, LIST_SEPARATOR,
};
use tracing::{info, warn};

use crate::commands::{arg, parse_arg, parse_wire_time, wire_time, Session};
use crate::errors::CommandError;
use crate::model::{Meeting, NewMeeting, Participant, UserId};
use crate::server::ServerContext;

/// Sends the full meeting listing to the caller.
pub(crate) async fn send_meeting_list(
    ctx: &ServerContext,
    session: &Session,
) -> Result<(), CommandError> {
    let meetings = ctx.store.list_meetings().await?;
    let mut entries = Vec::with_capacity(meetings.len());
    for meeting in &meetings {
        let organizer_name = match ctx.store.user_by_id(meeting.organizer_id).await {
            Ok(user) => user.name,
            // Organizer account deleted; the meeting row outlives it.
            Err(_) => "?".to_string(),
        };
        entries.push(
            [
                meeting.id.to_string(),
                meeting.title.clone(),
                wire_time(&meeting.scheduled_at),
                meeting.duration_minutes.to_string(),
                meeting.kind.to_string(),
                meeting.status.to_string(),
                meeting.organizer_id.to_string(),
                organizer_name,
            ]
            .join(&ITEM_SEPARATOR.to_string()),
        );
    }
    session.conn.push(format!(
        "{}|{}",
        protocol::RESP_MEETINGS,
        entries.join(LIST_SEPARATOR)
    ));
    Ok(())
}

pub async fn get_meetings(ctx: &ServerContext, session: &mut Session) -> Result<(), CommandError> {
    session.require_user()?;
    send_meeting_list(ctx, session).await
}

/// Creates a meeting in Planned status. Invitees, if given, receive invited
/// rows; unknown invitee ids are skipped with a warning rather than failing
/// the whole command.
pub async fn new_meeting(
    ctx: &ServerContext,
    session: &mut Session,
    args: &[&str],
) -> Result<(), CommandError> {
    let organizer_id = session.require_user()?.id;
    let title = arg(args, 0, "title")?.trim().to_string();
    if title.is_empty() {
        return Err(CommandError::Protocol("title must not be empty".to_string()));
    }
    let agenda = arg(args, 1, "agenda")?.to_string();
    let scheduled_at = parse_wire_time(arg(args, 2, "datetime")?, "datetime")?;
    let duration_minutes: u32 = parse_arg(args, 3, "duration")?;
    let kind: MeetingKind = arg(args, 4, "kind")?
        .parse()
        .map_err(|e: protocol::InvalidWireValue| CommandError::Protocol(e.to_string()))?;

    let meeting = ctx
        .store
        .create_meeting(NewMeeting {
            title,
            agenda,
            scheduled_at,
            duration_minutes,
            kind,
            organizer_id,
        })
        .await?;

    if let Some(raw_invitees) = args.get(5) {
        invite(ctx, &meeting, raw_invitees).await;
    }

    info!(
        target: "parley_server::commands",
        meeting_id = meeting.id,
        user_id = organizer_id,
        kind = %meeting.kind,
        "meeting created"
    );
    session
        .conn
        .push(format!("{}|{}", protocol::RESP_OK, meeting.id));
    ctx.registry.notify_authenticated(&format!(
        "{}|{}|{}|{}",
        protocol::PUSH_MEETING_CREATED,
        meeting.id,
        meeting.title,
        meeting.kind
    ));
    Ok(())
}

async fn invite(ctx: &ServerContext, meeting: &Meeting, raw_invitees: &str) {
    for raw_id in raw_invitees.split(ITEM_SEPARATOR).filter(|s| !s.is_empty()) {
        let Ok(user_id) = raw_id.parse::<UserId>() else {
            warn!(
                target: "parley_server::commands",
                meeting_id = meeting.id,
                invitee = raw_id,
                "unparsable invitee id skipped"
            );
            continue;
        };
        if user_id == meeting.organizer_id {
            continue;
        }
        let row = Participant {
            meeting_id: meeting.id,
            user_id,
            status: InvitationStatus::Invited,
            joined_at: None,
            left_at: None,
        };
        if let Err(err) = ctx.store.upsert_participant(row).await {
            warn!(
                target: "parley_server::commands",
                meeting_id = meeting.id,
                user_id,
                error = %err,
                "invitee skipped"
            );
        }
    }
}

/// Joins a meeting. Side effects in order: possible Planned→Open transition
/// for the organizer, enrollment marked joined, `JOIN_OK`, `PARTICIPANTS`
/// and `CHAT_HISTORY` to the caller, `USER_JOINED` to everyone else inside.
pub async fn join(
    ctx: &ServerContext,
    session: &mut Session,
    args: &[&str],
) -> Result<(), CommandError> {
    let user = session.require_user()?.clone();
    if session.current_meeting.is_some() {
        return Err(CommandError::Domain("already in a meeting".to_string()));
    }
    let meeting_id = parse_arg(args, 0, "meeting id")?;
    let meeting = ctx.store.meeting_by_id(meeting_id).await?;
    if meeting.status == MeetingStatus::Closed {
        return Err(CommandError::Domain("meeting is closed".to_string()));
    }

    let enrollment = ctx.store.participant(meeting_id, user.id).await?;
    if enrollment.is_none() {
        if meeting.kind == MeetingKind::Standard {
            // Standard meetings allow self-enrollment at join time.
            ctx.store
                .upsert_participant(Participant {
                    meeting_id,
                    user_id: user.id,
                    status: InvitationStatus::Accepted,
                    joined_at: None,
                    left_at: None,
                })
                .await?;
        } else {
            return Err(CommandError::Forbidden(
                "invitation required for this meeting".to_string(),
            ));
        }
    }

    if user.id == meeting.organizer_id && meeting.status == MeetingStatus::Planned {
        let changed = ctx
            .store
            .set_meeting_status(meeting_id, MeetingStatus::Open)
            .await?;
        if changed {
            info!(
                target: "parley_server::commands",
                meeting_id,
                "meeting opened by organizer"
            );
            ctx.registry.notify_authenticated(&format!(
                "{}|{}|{}",
                protocol::PUSH_MEETING_STATUS,
                meeting_id,
                MeetingStatus::Open
            ));
        }
    }

    ctx.store.mark_joined(meeting_id, user.id).await?;
    session.current_meeting = Some(meeting_id);
    session.conn.set_meeting_id(Some(meeting_id));
    info!(
        target: "parley_server::commands",
        meeting_id,
        user_id = user.id,
        "user joined meeting"
    );

    session.conn.push(format!(
        "{}|{}|{}",
        protocol::RESP_JOIN_OK,
        meeting.id,
        meeting.title
    ));
    send_participants(ctx, session, meeting_id).await?;
    send_chat_history(ctx, session, meeting_id).await?;
    ctx.registry.notify_meeting_except(
        meeting_id,
        session.conn.id,
        &format!("{}|{}|{}", protocol::PUSH_USER_JOINED, user.id, user.name),
    );
    Ok(())
}

async fn send_participants(
    ctx: &ServerContext,
    session: &Session,
    meeting_id: i64,
) -> Result<(), CommandError> {
    let rows = ctx.store.participants_for_meeting(meeting_id).await?;
    let mut entries = Vec::with_capacity(rows.len());
    for row in &rows {
        let name = match ctx.store.user_by_id(row.user_id).await {
            Ok(user) => user.name,
            Err(_) => "?".to_string(),
        };
        entries.push(format!(
            "{}{sep}{}{sep}{}",
            row.user_id,
            name,
            row.status,
            sep = ITEM_SEPARATOR
        ));
    }
    session.conn.push(format!(
        "{}|{}|{}",
        protocol::PUSH_PARTICIPANTS,
        meeting_id,
        entries.join(LIST_SEPARATOR)
    ));
    Ok(())
}

async fn send_chat_history(
    ctx: &ServerContext,
    session: &Session,
    meeting_id: i64,
) -> Result<(), CommandError> {
    let messages = ctx
        .store
        .recent_messages(meeting_id, ctx.config.chat_history_limit)
        .await?;
    for message in messages {
        let author_name = match ctx.store.user_by_id(message.author_id).await {
            Ok(user) => user.name,
            Err(_) => "?".to_string(),
        };
        session.conn.push(format!(
            "{}|{}|{}|{}|{}",
            protocol::PUSH_CHAT_HISTORY,
            message.author_id,
            author_name,
            wire_time(&message.sent_at),
            message.content
        ));
    }
    Ok(())
}

pub async fn leave(ctx: &ServerContext, session: &mut Session) -> Result<(), CommandError> {
    session.require_user()?;
    session.require_meeting()?;
    leave_current(ctx, session).await?;
    session.conn.push(format!("{}|left", protocol::RESP_OK));
    Ok(())
}

/// Detaches the session from its meeting, if attending. Shared by LEAVE,
/// LOGOUT and the disconnect cleanup; a missing session or meeting is a
/// no-op. When the organizer leaves and nobody remains joined, the meeting
/// closes automatically.
pub(crate) async fn leave_current(
    ctx: &ServerContext,
    session: &mut Session,
) -> Result<(), CommandError> {
    let (Some(user), Some(meeting_id)) = (session.user.clone(), session.current_meeting) else {
        return Ok(());
    };

    ctx.store.mark_left(meeting_id, user.id).await?;
    session.current_meeting = None;
    session.conn.set_meeting_id(None);
    info!(
        target: "parley_server::commands",
        meeting_id,
        user_id = user.id,
        "user left meeting"
    );
    ctx.registry.notify_meeting(
        meeting_id,
        &format!("{}|{}|{}", protocol::PUSH_USER_LEFT, user.id, user.name),
    );

    let meeting = ctx.store.meeting_by_id(meeting_id).await?;
    if user.id == meeting.organizer_id
        && meeting.status == MeetingStatus::Open
        && ctx.store.joined_count(meeting_id).await? == 0
    {
        let changed = ctx
            .store
            .set_meeting_status(meeting_id, MeetingStatus::Closed)
            .await?;
        if changed {
            info!(
                target: "parley_server::commands",
                meeting_id,
                "meeting auto-closed after organizer left"
            );
            broadcast_closed(ctx, meeting_id);
        }
    }
    Ok(())
}

/// Closes a meeting. Organizer or any admin; the id defaults to the caller's
/// current meeting. Closing an already-closed meeting is an OK no-op.
pub async fn close_meeting(
    ctx: &ServerContext,
    session: &mut Session,
    args: &[&str],
) -> Result<(), CommandError> {
    let user = session.require_user()?.clone();
    let meeting_id = match args.first() {
        Some(_) => parse_arg(args, 0, "meeting id")?,
        None => session.require_meeting()?,
    };
    let meeting = ctx.store.meeting_by_id(meeting_id).await?;
    if user.id != meeting.organizer_id && user.role != protocol::Role::Admin {
        return Err(CommandError::Forbidden(
            "only the organizer or an admin can close a meeting".to_string(),
        ));
    }

    let changed = ctx
        .store
        .set_meeting_status(meeting_id, MeetingStatus::Closed)
        .await?;
    // Closing the meeting the caller is sitting in detaches them, so
    // follow-up CHAT_MSG or VOTE lands outside a meeting.
    if session.current_meeting == Some(meeting_id) {
        ctx.store.mark_left(meeting_id, user.id).await?;
        session.current_meeting = None;
        session.conn.set_meeting_id(None);
    }
    session
        .conn
        .push(format!("{}|closed", protocol::RESP_OK));
    if changed {
        info!(
            target: "parley_server::commands",
            meeting_id,
            user_id = user.id,
            "meeting closed"
        );
        broadcast_closed(ctx, meeting_id);
    }
    Ok(())
}

// The close affects the global listing, so every authenticated connection
// hears about it, not just the participants still inside.
fn broadcast_closed(ctx: &ServerContext, meeting_id: i64) {
    ctx.registry.notify_authenticated(&format!(
        "{}|{}",
        protocol::PUSH_MEETING_CLOSED,
        meeting_id
    ));
}
