//! In-meeting chat and the speak-request flow.

use common::protocol;
use tracing::info;

use crate::commands::{parse_arg, wire_time, Session};
use crate::errors::CommandError;
use crate::server::ServerContext;

/// Persists a chat message and broadcasts it to everyone in the meeting,
/// the sender included. The broadcast is the acknowledgement; there is no
/// separate OK reply.
pub async fn chat_msg(
    ctx: &ServerContext,
    session: &mut Session,
    args: &[&str],
) -> Result<(), CommandError> {
    let user = session.require_user()?.clone();
    let meeting_id = session.require_meeting()?;

    // The content may itself contain the field separator; everything after
    // the command is the message.
    let content = args.join("|");
    if content.trim().is_empty() {
        return Err(CommandError::Protocol("empty chat message".to_string()));
    }

    let message = ctx
        .store
        .append_message(meeting_id, user.id, content)
        .await?;
    ctx.registry.notify_meeting(
        meeting_id,
        &format!(
            "{}|{}|{}|{}|{}",
            protocol::PUSH_CHAT_MSG,
            user.id,
            user.name,
            wire_time(&message.sent_at),
            message.content
        ),
    );
    Ok(())
}

/// Asks the organizer for the floor. The request goes directly to the
/// organizer's connection; nobody else sees it.
pub async fn request_speak(ctx: &ServerContext, session: &mut Session) -> Result<(), CommandError> {
    let user = session.require_user()?.clone();
    let meeting_id = session.require_meeting()?;
    let meeting = ctx.store.meeting_by_id(meeting_id).await?;

    ctx.registry.notify_user(
        meeting.organizer_id,
        &format!(
            "{}|{}|{}",
            protocol::PUSH_SPEAK_REQUEST,
            user.id,
            user.name
        ),
    );
    session
        .conn
        .push(format!("{}|speak requested", protocol::RESP_OK));
    Ok(())
}

/// Grants the floor. Organizer only; the grantee hears `SPEAK_GRANTED` and
/// the whole meeting hears who the active speaker is.
pub async fn allow_speak(
    ctx: &ServerContext,
    session: &mut Session,
    args: &[&str],
) -> Result<(), CommandError> {
    let (meeting_id, target) = organizer_and_target(ctx, session, args).await?;

    ctx.registry.notify_user(
        target.id,
        &format!("{}|{}", protocol::PUSH_SPEAK_GRANTED, meeting_id),
    );
    ctx.registry.notify_meeting(
        meeting_id,
        &format!(
            "{}|{}|{}",
            protocol::PUSH_SPEAKER_ACTIVE,
            target.id,
            target.name
        ),
    );
    info!(
        target: "parley_server::commands",
        meeting_id,
        user_id = target.id,
        "speak request granted"
    );
    session
        .conn
        .push(format!("{}|granted", protocol::RESP_OK));
    Ok(())
}

/// Denies the floor. Organizer only; only the requester is told.
pub async fn deny_speak(
    ctx: &ServerContext,
    session: &mut Session,
    args: &[&str],
) -> Result<(), CommandError> {
    let (meeting_id, target) = organizer_and_target(ctx, session, args).await?;

    ctx.registry.notify_user(
        target.id,
        &format!("{}|{}", protocol::PUSH_SPEAK_DENIED, meeting_id),
    );
    session
        .conn
        .push(format!("{}|denied", protocol::RESP_OK));
    Ok(())
}

async fn organizer_and_target(
    ctx: &ServerContext,
    session: &Session,
    args: &[&str],
) -> Result<(i64, crate::model::User), CommandError> {
    let caller = session.require_user()?;
    let meeting_id = session.require_meeting()?;
    let meeting = ctx.store.meeting_by_id(meeting_id).await?;
    if caller.id != meeting.organizer_id {
        return Err(CommandError::Forbidden(
            "only the organizer can moderate speakers".to_string(),
        ));
    }
    let target_id = parse_arg(args, 0, "user id")?;
    let target = ctx.store.user_by_id(target_id).await?;
    Ok((meeting_id, target))
}
