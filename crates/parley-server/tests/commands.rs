//! Handler-level tests: commands dispatched against an in-process context,
//! asserting on the store and each connection's outbound queue directly.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;

use common::protocol::MeetingStatus;
use parley_server::commands::{self, Session};
use parley_server::config::Config;
use parley_server::registry::SessionRegistry;
use parley_server::server::ServerContext;
use parley_server::store::memory::MemoryStore;

fn test_context() -> ServerContext {
    let mut vars = HashMap::new();
    vars.insert("PARLEY_ADMIN_PASSWORD".to_string(), "rootpw".to_string());
    vars.insert("PARLEY_BCRYPT_COST".to_string(), "4".to_string());
    ServerContext {
        config: Config::from_vars(&vars).expect("test config"),
        store: Arc::new(MemoryStore::new()),
        registry: SessionRegistry::new(),
    }
}

struct Client {
    session: Session,
    rx: UnboundedReceiver<String>,
}

impl Client {
    fn new(ctx: &ServerContext) -> Self {
        let (conn, rx) = ctx.registry.register();
        Self {
            session: Session::new(conn),
            rx,
        }
    }

    async fn run(&mut self, ctx: &ServerContext, line: &str) {
        commands::dispatch(ctx, &mut self.session, line).await;
    }

    /// Next queued outbound line; every send in dispatch is synchronous, so
    /// the queue is complete by the time the handler returns.
    fn next_line(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }

    fn drain(&mut self) {
        while self.rx.try_recv().is_ok() {}
    }
}

/// Registers, logs in and drains the replies.
async fn signed_in(ctx: &ServerContext, login: &str, name: &str) -> Client {
    let mut client = Client::new(ctx);
    client
        .run(ctx, &format!("REGISTER|{login}|pw|{name}"))
        .await;
    client.run(ctx, &format!("LOGIN|{login}|pw")).await;
    client.drain();
    client
}

async fn make_meeting(ctx: &ServerContext, organizer: &mut Client, kind: &str) -> i64 {
    organizer
        .run(
            ctx,
            &format!("NEW_MEETING|Mediation|Agenda|2026-09-10T10:00:00|60|{kind}"),
        )
        .await;
    let ok = organizer.next_line().expect("reply");
    organizer.drain();
    ok.strip_prefix("OK|").expect("meeting id").parse().unwrap()
}

#[tokio::test]
async fn rejected_private_join_leaves_no_trace() {
    let ctx = test_context();
    let mut alice = signed_in(&ctx, "alice", "Alice").await;
    let mut carol = signed_in(&ctx, "carol", "Carol").await;
    let meeting_id = make_meeting(&ctx, &mut alice, "Private").await;
    carol.drain();

    carol.run(&ctx, &format!("JOIN|{meeting_id}")).await;
    assert_eq!(
        carol.next_line().expect("reply"),
        "ERROR|invitation required for this meeting"
    );

    // No enrollment row appears and the session stays detached.
    let carol_id = carol.session.user.as_ref().expect("user").id;
    assert!(ctx
        .store
        .participant(meeting_id, carol_id)
        .await
        .unwrap()
        .is_none());
    assert!(carol.session.current_meeting.is_none());
}

#[tokio::test]
async fn auto_close_fires_only_for_the_organizer_of_an_empty_meeting() {
    let ctx = test_context();
    let mut alice = signed_in(&ctx, "alice", "Alice").await;
    let mut bob = signed_in(&ctx, "bob", "Bob").await;
    let meeting_id = make_meeting(&ctx, &mut alice, "Standard").await;
    bob.drain();

    alice.run(&ctx, &format!("JOIN|{meeting_id}")).await;
    bob.run(&ctx, &format!("JOIN|{meeting_id}")).await;
    alice.drain();
    bob.drain();

    // Organizer leaves first, but Bob is still inside: stays Open.
    alice.run(&ctx, "LEAVE").await;
    assert_eq!(
        ctx.store.meeting_by_id(meeting_id).await.unwrap().status,
        MeetingStatus::Open
    );

    // The last guest leaving does not auto-close either.
    bob.run(&ctx, "LEAVE").await;
    assert_eq!(
        ctx.store.meeting_by_id(meeting_id).await.unwrap().status,
        MeetingStatus::Open
    );

    // Organizer re-joins and leaves the now-empty meeting: auto-close.
    alice.run(&ctx, &format!("JOIN|{meeting_id}")).await;
    alice.run(&ctx, "LEAVE").await;
    assert_eq!(
        ctx.store.meeting_by_id(meeting_id).await.unwrap().status,
        MeetingStatus::Closed
    );
}

#[tokio::test]
async fn close_is_idempotent_and_broadcast_once() {
    let ctx = test_context();
    let mut alice = signed_in(&ctx, "alice", "Alice").await;
    let meeting_id = make_meeting(&ctx, &mut alice, "Standard").await;

    alice.run(&ctx, &format!("CLOSE_MEETING|{meeting_id}")).await;
    assert_eq!(alice.next_line().expect("reply"), "OK|closed");
    assert_eq!(
        alice.next_line().expect("push"),
        format!("MEETING_CLOSED|{meeting_id}")
    );

    // Second close: OK again, but no second broadcast.
    alice.run(&ctx, &format!("CLOSE_MEETING|{meeting_id}")).await;
    assert_eq!(alice.next_line().expect("reply"), "OK|closed");
    assert!(alice.next_line().is_none());
}

#[tokio::test]
async fn closing_the_current_meeting_detaches_the_caller() {
    let ctx = test_context();
    let mut alice = signed_in(&ctx, "alice", "Alice").await;
    let meeting_id = make_meeting(&ctx, &mut alice, "Standard").await;

    alice.run(&ctx, &format!("JOIN|{meeting_id}")).await;
    alice.drain();

    // No id argument: closes the meeting the caller is attending.
    alice.run(&ctx, "CLOSE_MEETING").await;
    assert_eq!(alice.next_line().expect("reply"), "OK|closed");
    assert_eq!(
        alice.next_line().expect("push"),
        format!("MEETING_CLOSED|{meeting_id}")
    );
    assert!(alice.session.current_meeting.is_none());

    // The closed meeting no longer accepts chat or votes from the closer.
    alice.run(&ctx, "CHAT_MSG|anyone there?").await;
    assert_eq!(alice.next_line().expect("reply"), "ERROR|not in a meeting");
    alice.run(&ctx, "VOTE|1|1").await;
    assert_eq!(alice.next_line().expect("reply"), "ERROR|not in a meeting");
}

#[tokio::test]
async fn close_requires_organizer_or_admin() {
    let ctx = test_context();
    let mut alice = signed_in(&ctx, "alice", "Alice").await;
    let mut bob = signed_in(&ctx, "bob", "Bob").await;
    let meeting_id = make_meeting(&ctx, &mut alice, "Standard").await;
    bob.drain();

    bob.run(&ctx, &format!("CLOSE_MEETING|{meeting_id}")).await;
    assert_eq!(
        bob.next_line().expect("reply"),
        "ERROR|only the organizer or an admin can close a meeting"
    );
    assert_eq!(
        ctx.store.meeting_by_id(meeting_id).await.unwrap().status,
        MeetingStatus::Planned
    );
}

#[tokio::test]
async fn speak_flow_targets_the_right_connections() {
    let ctx = test_context();
    let mut alice = signed_in(&ctx, "alice", "Alice").await;
    let mut bob = signed_in(&ctx, "bob", "Bob").await;
    let meeting_id = make_meeting(&ctx, &mut alice, "Standard").await;
    bob.drain();

    alice.run(&ctx, &format!("JOIN|{meeting_id}")).await;
    bob.run(&ctx, &format!("JOIN|{meeting_id}")).await;
    alice.drain();
    bob.drain();

    let bob_id = bob.session.user.as_ref().expect("user").id;

    // The request reaches only the organizer.
    bob.run(&ctx, "REQUEST_SPEAK").await;
    assert_eq!(bob.next_line().expect("reply"), "OK|speak requested");
    assert_eq!(
        alice.next_line().expect("push"),
        format!("SPEAK_REQUEST|{bob_id}|Bob")
    );

    // Only the organizer may grant.
    bob.run(&ctx, &format!("ALLOW_SPEAK|{bob_id}")).await;
    assert_eq!(
        bob.next_line().expect("reply"),
        "ERROR|only the organizer can moderate speakers"
    );

    alice.run(&ctx, &format!("ALLOW_SPEAK|{bob_id}")).await;
    assert_eq!(
        bob.next_line().expect("push"),
        format!("SPEAK_GRANTED|{meeting_id}")
    );
    assert_eq!(
        bob.next_line().expect("push"),
        format!("SPEAKER_ACTIVE|{bob_id}|Bob")
    );
    assert_eq!(
        alice.next_line().expect("push"),
        format!("SPEAKER_ACTIVE|{bob_id}|Bob")
    );
    assert_eq!(alice.next_line().expect("reply"), "OK|granted");
}

#[tokio::test]
async fn tallies_never_exceed_the_number_of_voters() {
    let ctx = test_context();
    let mut alice = signed_in(&ctx, "alice", "Alice").await;
    let mut bob = signed_in(&ctx, "bob", "Bob").await;
    let meeting_id = make_meeting(&ctx, &mut alice, "Standard").await;
    bob.drain();

    alice.run(&ctx, &format!("JOIN|{meeting_id}")).await;
    bob.run(&ctx, &format!("JOIN|{meeting_id}")).await;
    alice.drain();
    bob.drain();

    alice.run(&ctx, "CREATE_POLL|Adjourn?|Yes;;No").await;
    let poll_id: i64 = alice
        .next_line()
        .expect("reply")
        .strip_prefix("OK|")
        .expect("poll id")
        .parse()
        .unwrap();
    alice.drain();
    bob.drain();

    let poll = ctx.store.poll_by_id(poll_id).await.unwrap();
    let yes = poll.options.first().unwrap().id;
    let no = poll.options.get(1).unwrap().id;

    alice.run(&ctx, &format!("VOTE|{poll_id}|{yes}")).await;
    bob.run(&ctx, &format!("VOTE|{poll_id}|{no}")).await;
    let tallies = ctx.store.poll_results(poll_id).await.unwrap();
    assert_eq!(
        tallies.iter().map(|t| t.votes).collect::<Vec<_>>(),
        vec![1, 1]
    );

    // Alice switches sides: her old vote is retracted, the total stays 2.
    alice.run(&ctx, &format!("VOTE|{poll_id}|{no}")).await;
    let tallies = ctx.store.poll_results(poll_id).await.unwrap();
    assert_eq!(
        tallies.iter().map(|t| t.votes).collect::<Vec<_>>(),
        vec![0, 2]
    );
    assert_eq!(tallies.iter().map(|t| t.votes).sum::<usize>(), 2);
}

#[tokio::test]
async fn chat_outside_a_meeting_is_an_error() {
    let ctx = test_context();
    let mut alice = signed_in(&ctx, "alice", "Alice").await;

    alice.run(&ctx, "CHAT_MSG|anyone there?").await;
    assert_eq!(alice.next_line().expect("reply"), "ERROR|not in a meeting");
}

#[tokio::test]
async fn join_while_attending_is_rejected() {
    let ctx = test_context();
    let mut alice = signed_in(&ctx, "alice", "Alice").await;
    let first = make_meeting(&ctx, &mut alice, "Standard").await;
    let second = make_meeting(&ctx, &mut alice, "Standard").await;

    alice.run(&ctx, &format!("JOIN|{first}")).await;
    alice.drain();
    alice.run(&ctx, &format!("JOIN|{second}")).await;
    assert_eq!(
        alice.next_line().expect("reply"),
        "ERROR|already in a meeting"
    );
    assert_eq!(alice.session.current_meeting, Some(first));
}

#[tokio::test]
async fn admin_management_guards() {
    let ctx = test_context();

    // Bootstrap admin comes from the store seam the server would use.
    let mut admin = Client::new(&ctx);
    let hash = bcrypt::hash("rootpw", 4).unwrap();
    ctx.store
        .create_user(parley_server::model::NewUser {
            login: "admin".to_string(),
            password_hash: hash,
            name: "Administrator".to_string(),
            role: common::protocol::Role::Admin,
        })
        .await
        .unwrap();
    admin.run(&ctx, "LOGIN|admin|rootpw").await;
    admin.drain();

    let mut mallory = signed_in(&ctx, "mallory", "Mallory").await;
    let mallory_id = mallory.session.user.as_ref().expect("user").id;

    // Ordinary users cannot manage accounts.
    mallory.run(&ctx, "GET_USERS").await;
    assert_eq!(
        mallory.next_line().expect("reply"),
        "ERROR|admin role required"
    );

    admin.run(&ctx, "GET_USERS").await;
    let listing = admin.next_line().expect("reply");
    assert!(listing.starts_with("USERS|"));
    assert!(listing.contains("mallory") && listing.contains("ADMIN"));

    // Admins cannot delete themselves or the last admin.
    let admin_id = admin.session.user.as_ref().expect("user").id;
    admin.run(&ctx, &format!("DELETE_USER|{admin_id}")).await;
    assert_eq!(
        admin.next_line().expect("reply"),
        "ERROR|cannot delete your own account"
    );

    admin.run(&ctx, &format!("UPDATE_USER|{mallory_id}|Mallory|ADMIN")).await;
    assert_eq!(admin.next_line().expect("reply"), "OK|updated");
    admin.run(&ctx, &format!("UPDATE_USER|{mallory_id}|Mallory|USER")).await;
    assert_eq!(admin.next_line().expect("reply"), "OK|updated");

    // Deleting another user works; the victim's row disappears.
    admin.run(&ctx, &format!("DELETE_USER|{mallory_id}")).await;
    assert_eq!(admin.next_line().expect("reply"), "OK|deleted");
    assert!(ctx.store.user_by_id(mallory_id).await.is_err());
}

#[tokio::test]
async fn reactions_recording_and_bandwidth() {
    let ctx = test_context();
    let mut alice = signed_in(&ctx, "alice", "Alice").await;
    let mut bob = signed_in(&ctx, "bob", "Bob").await;
    let meeting_id = make_meeting(&ctx, &mut alice, "Standard").await;
    bob.drain();

    alice.run(&ctx, &format!("JOIN|{meeting_id}")).await;
    bob.run(&ctx, &format!("JOIN|{meeting_id}")).await;
    alice.drain();
    bob.drain();

    let bob_id = bob.session.user.as_ref().expect("user").id;
    bob.run(&ctx, "REACTION|thumbs_up").await;
    assert_eq!(bob.next_line().expect("reply"), "OK|noted");
    assert_eq!(
        bob.next_line().expect("push"),
        format!("REACTION|{bob_id}|thumbs_up")
    );
    assert_eq!(
        alice.next_line().expect("push"),
        format!("REACTION|{bob_id}|thumbs_up")
    );

    // Recording markers are the organizer's to send.
    bob.run(&ctx, "START_RECORDING").await;
    assert_eq!(
        bob.next_line().expect("reply"),
        "ERROR|only the organizer can control recording"
    );
    alice.run(&ctx, "START_RECORDING").await;
    assert_eq!(alice.next_line().expect("reply"), "OK|ok");
    assert_eq!(
        alice.next_line().expect("push"),
        format!("RECORDING_STARTED|{meeting_id}|Alice")
    );
    assert_eq!(
        bob.next_line().expect("push"),
        format!("RECORDING_STARTED|{meeting_id}|Alice")
    );

    bob.run(&ctx, "UPDATE_BANDWIDTH|1024|4096").await;
    assert_eq!(bob.next_line().expect("reply"), "OK");
    bob.run(&ctx, "UPDATE_BANDWIDTH|lots|4096").await;
    assert_eq!(
        bob.next_line().expect("reply"),
        "ERROR|invalid upload bytes"
    );
}

#[tokio::test]
async fn rating_is_participant_only_and_bounded() {
    let ctx = test_context();
    let mut alice = signed_in(&ctx, "alice", "Alice").await;
    let mut carol = signed_in(&ctx, "carol", "Carol").await;
    let meeting_id = make_meeting(&ctx, &mut alice, "Standard").await;
    carol.drain();

    carol
        .run(&ctx, &format!("RATE_MEETING|{meeting_id}|4|helpful"))
        .await;
    assert_eq!(
        carol.next_line().expect("reply"),
        "ERROR|only participants can rate a meeting"
    );

    alice
        .run(&ctx, &format!("RATE_MEETING|{meeting_id}|9"))
        .await;
    assert_eq!(
        alice.next_line().expect("reply"),
        "ERROR|rating must be between 1 and 5"
    );

    alice
        .run(&ctx, &format!("RATE_MEETING|{meeting_id}|5|great"))
        .await;
    assert_eq!(alice.next_line().expect("reply"), "OK|rated");
    // The organizer rated their own meeting; the notification went to them.
    let alice_id = alice.session.user.as_ref().expect("user").id;
    assert_eq!(
        alice.next_line().expect("push"),
        format!("MEETING_RATED|{meeting_id}|{alice_id}|5")
    );
}

#[tokio::test]
async fn rating_comment_keeps_field_separators() {
    let ctx = test_context();
    let mut alice = signed_in(&ctx, "alice", "Alice").await;
    let meeting_id = make_meeting(&ctx, &mut alice, "Standard").await;

    alice
        .run(
            &ctx,
            &format!("RATE_MEETING|{meeting_id}|3|useful, but ran long | next time: shorter"),
        )
        .await;
    assert_eq!(alice.next_line().expect("reply"), "OK|rated");

    let ratings = ctx.store.ratings_for_meeting(meeting_id).await.unwrap();
    assert_eq!(ratings.len(), 1);
    assert_eq!(
        ratings.first().expect("rating").comment,
        "useful, but ran long | next time: shorter"
    );
}
