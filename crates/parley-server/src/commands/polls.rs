//! Polls and voting.
//!
//! Poll creation is allowed for the organizer anywhere, and for every
//! participant in Democratic meetings. A voter has at most one active vote
//! per poll; voting again replaces the earlier choice.

use common::protocol::{self, MeetingKind, ITEM_SEPARATOR, LIST_SEPARATOR};
use tracing::info;

use crate::commands::{arg, parse_arg, Session};
use crate::errors::CommandError;
use crate::server::ServerContext;

/// `CREATE_POLL|question|opt1;;opt2;;...`: at least two distinct options.
pub async fn create_poll(
    ctx: &ServerContext,
    session: &mut Session,
    args: &[&str],
) -> Result<(), CommandError> {
    let user = session.require_user()?.clone();
    let meeting_id = session.require_meeting()?;
    let meeting = ctx.store.meeting_by_id(meeting_id).await?;
    if user.id != meeting.organizer_id && meeting.kind != MeetingKind::Democratic {
        return Err(CommandError::Forbidden(
            "only the organizer can create polls in this meeting".to_string(),
        ));
    }

    let question = arg(args, 0, "question")?.trim().to_string();
    if question.is_empty() {
        return Err(CommandError::Protocol("question must not be empty".to_string()));
    }
    let options: Vec<String> = arg(args, 1, "options")?
        .split(LIST_SEPARATOR)
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect();
    let distinct: std::collections::HashSet<&str> =
        options.iter().map(String::as_str).collect();
    if options.len() < 2 || distinct.len() != options.len() {
        return Err(CommandError::Domain(
            "a poll needs at least two distinct options".to_string(),
        ));
    }

    let poll = ctx
        .store
        .create_poll(meeting_id, question, options)
        .await?;
    info!(
        target: "parley_server::commands",
        meeting_id,
        poll_id = poll.id,
        user_id = user.id,
        "poll created"
    );

    session
        .conn
        .push(format!("{}|{}", protocol::RESP_OK, poll.id));
    let listed = poll
        .options
        .iter()
        .map(|o| format!("{}{}{}", o.id, ITEM_SEPARATOR, o.text))
        .collect::<Vec<_>>()
        .join(LIST_SEPARATOR);
    ctx.registry.notify_meeting(
        meeting_id,
        &format!(
            "{}|{}|{}|{}",
            protocol::PUSH_NEW_POLL,
            poll.id,
            poll.question,
            listed
        ),
    );
    Ok(())
}

/// `VOTE|pollId|optionId`: replaces any earlier vote by the caller, then
/// broadcasts the live tallies to the meeting.
pub async fn vote(
    ctx: &ServerContext,
    session: &mut Session,
    args: &[&str],
) -> Result<(), CommandError> {
    let user_id = session.require_user()?.id;
    let meeting_id = session.require_meeting()?;
    let poll_id = parse_arg(args, 0, "poll id")?;
    let option_id = parse_arg(args, 1, "option id")?;

    let poll = ctx.store.poll_by_id(poll_id).await?;
    if poll.meeting_id != meeting_id {
        return Err(CommandError::Domain(
            "poll belongs to another meeting".to_string(),
        ));
    }
    ctx.store.cast_vote(poll_id, option_id, user_id).await?;

    session
        .conn
        .push(format!("{}|vote recorded", protocol::RESP_OK));
    let tallies = ctx.store.poll_results(poll_id).await?;
    let listed = tallies
        .iter()
        .map(|t| format!("{}{}{}", t.option_id, ITEM_SEPARATOR, t.votes))
        .collect::<Vec<_>>()
        .join(LIST_SEPARATOR);
    ctx.registry.notify_meeting(
        meeting_id,
        &format!("{}|{}|{}", protocol::PUSH_POLL_RESULTS, poll_id, listed),
    );
    Ok(())
}

/// `GET_POLL_RESULTS|pollId`: full snapshot with option texts. Only
/// attendees of the poll's meeting may read it.
pub async fn get_poll_results(
    ctx: &ServerContext,
    session: &mut Session,
    args: &[&str],
) -> Result<(), CommandError> {
    session.require_user()?;
    let meeting_id = session.require_meeting()?;
    let poll_id = parse_arg(args, 0, "poll id")?;
    let poll = ctx.store.poll_by_id(poll_id).await?;
    if poll.meeting_id != meeting_id {
        return Err(CommandError::Domain(
            "poll belongs to another meeting".to_string(),
        ));
    }
    let tallies = ctx.store.poll_results(poll_id).await?;
    let listed = tallies
        .iter()
        .map(|t| {
            format!(
                "{}{sep}{}{sep}{}",
                t.option_id,
                t.text,
                t.votes,
                sep = ITEM_SEPARATOR
            )
        })
        .collect::<Vec<_>>()
        .join(LIST_SEPARATOR);
    session.conn.push(format!(
        "{}|{}|{}|{}",
        protocol::RESP_POLL_RESULTS,
        poll.id,
        poll.question,
        listed
    ));
    Ok(())
}
