//! Reactions, ratings, recording markers and bandwidth samples.
//!
//! Everything here is append-only telemetry; none of it feeds back into the
//! meeting lifecycle.

use chrono::Utc;
use common::protocol;
use tracing::info;

use crate::commands::{arg, parse_arg, Session};
use crate::errors::CommandError;
use crate::model::{BandwidthStat, MeetingRating, Reaction};
use crate::server::ServerContext;

/// `REACTION|kind`: broadcast to the meeting, sender included.
pub async fn reaction(
    ctx: &ServerContext,
    session: &mut Session,
    args: &[&str],
) -> Result<(), CommandError> {
    let user = session.require_user()?.clone();
    let meeting_id = session.require_meeting()?;
    let kind = arg(args, 0, "reaction kind")?.trim().to_string();
    if kind.is_empty() {
        return Err(CommandError::Protocol("missing reaction kind".to_string()));
    }

    ctx.store
        .add_reaction(Reaction {
            meeting_id,
            user_id: user.id,
            kind: kind.clone(),
            sent_at: Utc::now(),
        })
        .await?;
    session.conn.push(format!("{}|noted", protocol::RESP_OK));
    ctx.registry.notify_meeting(
        meeting_id,
        &format!("{}|{}|{}", protocol::PUSH_REACTION, user.id, kind),
    );
    Ok(())
}

/// `RATE_MEETING|meetingId|rating[|comment]`: participants only, rating
/// 1..=5. The organizer is told directly; nobody else is.
pub async fn rate_meeting(
    ctx: &ServerContext,
    session: &mut Session,
    args: &[&str],
) -> Result<(), CommandError> {
    let user = session.require_user()?.clone();
    let meeting_id = parse_arg(args, 0, "meeting id")?;
    let rating: u8 = parse_arg(args, 1, "rating")?;
    if !(1..=5).contains(&rating) {
        return Err(CommandError::Domain(
            "rating must be between 1 and 5".to_string(),
        ));
    }
    // Like chat, the comment may itself contain the field separator.
    let comment = args.get(2..).unwrap_or_default().join("|");

    let meeting = ctx.store.meeting_by_id(meeting_id).await?;
    if ctx.store.participant(meeting_id, user.id).await?.is_none() {
        return Err(CommandError::Forbidden(
            "only participants can rate a meeting".to_string(),
        ));
    }

    ctx.store
        .add_rating(MeetingRating {
            meeting_id,
            user_id: user.id,
            rating,
            comment,
            rated_at: Utc::now(),
        })
        .await?;
    info!(
        target: "parley_server::commands",
        meeting_id,
        user_id = user.id,
        rating,
        "meeting rated"
    );
    session.conn.push(format!("{}|rated", protocol::RESP_OK));
    ctx.registry.notify_user(
        meeting.organizer_id,
        &format!(
            "{}|{}|{}|{}",
            protocol::PUSH_MEETING_RATED,
            meeting_id,
            user.id,
            rating
        ),
    );
    Ok(())
}

/// Organizer-only recording markers. The server records nothing itself; the
/// broadcast lets clients show the indicator.
pub async fn start_recording(
    ctx: &ServerContext,
    session: &mut Session,
) -> Result<(), CommandError> {
    recording_marker(ctx, session, protocol::PUSH_RECORDING_STARTED).await
}

pub async fn stop_recording(
    ctx: &ServerContext,
    session: &mut Session,
) -> Result<(), CommandError> {
    recording_marker(ctx, session, protocol::PUSH_RECORDING_STOPPED).await
}

async fn recording_marker(
    ctx: &ServerContext,
    session: &mut Session,
    tag: &str,
) -> Result<(), CommandError> {
    let user = session.require_user()?.clone();
    let meeting_id = session.require_meeting()?;
    let meeting = ctx.store.meeting_by_id(meeting_id).await?;
    if user.id != meeting.organizer_id {
        return Err(CommandError::Forbidden(
            "only the organizer can control recording".to_string(),
        ));
    }

    session.conn.push(format!("{}|ok", protocol::RESP_OK));
    ctx.registry
        .notify_meeting(meeting_id, &format!("{tag}|{meeting_id}|{}", user.name));
    Ok(())
}

/// `UPDATE_BANDWIDTH|uploadBytes|downloadBytes`: stored, bare OK back.
pub async fn update_bandwidth(
    ctx: &ServerContext,
    session: &mut Session,
    args: &[&str],
) -> Result<(), CommandError> {
    let user_id = session.require_user()?.id;
    let meeting_id = session.require_meeting()?;
    let upload_bytes: u64 = parse_arg(args, 0, "upload bytes")?;
    let download_bytes: u64 = parse_arg(args, 1, "download bytes")?;

    ctx.store
        .add_bandwidth_stat(BandwidthStat {
            meeting_id,
            user_id,
            recorded_at: Utc::now(),
            upload_bytes,
            download_bytes,
        })
        .await?;
    session.conn.push(protocol::RESP_OK.to_string());
    Ok(())
}
