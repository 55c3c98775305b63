//! Integration tests for the admission service.
//!
//! No sockets here: admission is called directly, the way an HTTP router
//! would call it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use huddle::prelude::*;
use huddle_session::{Claims, InviteClaims, SessionError, unix_now};

// =========================================================================
// Token services
// =========================================================================

const SECRET: &[u8] = b"admission-test-secret";

/// Signs nothing.
struct BrokenSigner;

impl TokenService for BrokenSigner {
    fn issue(&self, _claims: &Claims) -> Result<String, SessionError> {
        Err(SessionError::Issue("signer offline".into()))
    }

    fn verify(&self, token: &str) -> Result<Claims, SessionError> {
        JwtTokenService::new(SECRET).verify(token)
    }
}

/// Works normally until told to refuse member tokens.
struct FlakySigner {
    inner: JwtTokenService,
    refuse_members: AtomicBool,
}

impl TokenService for FlakySigner {
    fn issue(&self, claims: &Claims) -> Result<String, SessionError> {
        if let Claims::Participant(c) = claims {
            if c.role == Role::Member && self.refuse_members.load(Ordering::SeqCst) {
                return Err(SessionError::Issue("signer offline".into()));
            }
        }
        self.inner.issue(claims)
    }

    fn verify(&self, token: &str) -> Result<Claims, SessionError> {
        self.inner.verify(token)
    }
}

// =========================================================================
// Helpers
// =========================================================================

fn admission_with<T: TokenService>(tokens: T) -> Admission<T> {
    let registry = Arc::new(RoomRegistry::start(RoomConfig::default()));
    Admission::new(registry, Arc::new(tokens), SessionConfig::default())
}

fn admission() -> Admission<JwtTokenService> {
    admission_with(JwtTokenService::new(SECRET))
}

fn session(name: &str) -> SessionId {
    SessionId::new(format!("s-{name}"))
}

struct Created {
    room_id: RoomId,
    token: String,
    invite: String,
}

async fn create<T: TokenService>(admission: &Admission<T>, capacity: u8) -> Created {
    let created = admission
        .create_room(
            &session("alice"),
            CreateRoomRequest {
                username: "alice".into(),
                max_participants: capacity,
            },
        )
        .await
        .expect("create");
    let invite = admission
        .get_room(&created.room_id, &created.token)
        .await
        .expect("details")
        .invite_token
        .expect("admin sees the invite");
    Created {
        room_id: created.room_id,
        token: created.token,
        invite,
    }
}

async fn join<T: TokenService>(
    admission: &Admission<T>,
    invite: &str,
    name: &str,
) -> Result<JoinRoomResponse, AdmissionError> {
    admission
        .join_room(
            &session(name),
            invite,
            JoinRoomRequest {
                username: name.into(),
            },
        )
        .await
}

fn target(id: u32) -> ParticipantRequest {
    ParticipantRequest {
        user_id: ParticipantId(id),
    }
}

// =========================================================================
// Create
// =========================================================================

#[tokio::test]
async fn test_create_room_issues_admin_token() {
    let admission = admission();
    let created = admission
        .create_room(
            &session("alice"),
            CreateRoomRequest {
                username: "alice".into(),
                max_participants: 4,
            },
        )
        .await
        .expect("create");

    let claims = admission
        .tokens()
        .verify_participant(&created.token)
        .expect("admin token verifies");
    assert_eq!(claims.participant_id, ParticipantId::ADMIN);
    assert_eq!(claims.role, Role::Admin);
    assert_eq!(claims.username, "alice");
    assert_eq!(claims.room_id, created.room_id);

    let room = admission
        .registry()
        .get_room(&created.room_id)
        .await
        .expect("room registered");
    assert_eq!(room.capacity(), 4);
    assert_eq!(room.participant_count().await, 1);
}

#[tokio::test]
async fn test_create_room_reports_every_bad_field() {
    let admission = admission();
    let err = admission
        .create_room(
            &session("alice"),
            CreateRoomRequest {
                username: "a b".into(),
                max_participants: 9,
            },
        )
        .await
        .unwrap_err();

    assert_eq!(err.status, 400);
    assert_eq!(
        err.field_errors.get("username").map(String::as_str),
        Some("Username cannot contain spaces.")
    );
    assert_eq!(
        err.field_errors.get("maxParticipants").map(String::as_str),
        Some("Max participants must be between 2 and 5.")
    );
    assert_eq!(admission.registry().room_count().await, 0);

    let body = serde_json::to_value(&err).unwrap();
    assert!(body.get("errorMessage").is_none());
    assert!(body["fieldErrors"]["username"].is_string());
}

#[tokio::test]
async fn test_create_room_requires_session() {
    let admission = admission();
    let err = admission
        .create_room(
            &SessionId::new(""),
            CreateRoomRequest {
                username: "alice".into(),
                max_participants: 2,
            },
        )
        .await
        .unwrap_err();

    assert_eq!(err.status, 401);
    assert_eq!(
        serde_json::to_value(&err).unwrap(),
        serde_json::json!({"errorMessage": "Session ID missing."})
    );
}

#[tokio::test]
async fn test_failed_admin_token_discards_room() {
    let admission = admission_with(BrokenSigner);
    let err = admission
        .create_room(
            &session("alice"),
            CreateRoomRequest {
                username: "alice".into(),
                max_participants: 2,
            },
        )
        .await
        .unwrap_err();

    assert_eq!(err.status, 500);
    assert!(err.message.contains("signer offline"));
    assert_eq!(admission.registry().room_count().await, 0);
}

// =========================================================================
// Join
// =========================================================================

#[tokio::test]
async fn test_join_through_invite() {
    let admission = admission();
    let room = create(&admission, 3).await;

    let joined = join(&admission, &room.invite, "bob").await.expect("join");
    assert_eq!(joined.room_id, room.room_id);

    let claims = admission
        .tokens()
        .verify_participant(&joined.token)
        .expect("member token verifies");
    assert_eq!(claims.participant_id, ParticipantId(2));
    assert_eq!(claims.role, Role::Member);
    assert_eq!(claims.username, "bob");

    let details = admission
        .get_room(&room.room_id, &joined.token)
        .await
        .expect("member can inspect");
    assert_eq!(details.user_role, Role::Member);
    assert_eq!(details.invite_token, None);
    let names: Vec<_> = details.participants.iter().map(|p| p.username.as_str()).collect();
    assert_eq!(names, ["alice", "bob"]);
}

#[tokio::test]
async fn test_join_rejects_bad_invites() {
    let admission = admission();
    let room = create(&admission, 3).await;

    let err = join(&admission, "garbage", "bob").await.unwrap_err();
    assert_eq!(err.status, 401);

    // A participant token is not an invite.
    let err = join(&admission, &room.token, "bob").await.unwrap_err();
    assert_eq!(err.status, 401);

    let stale = admission
        .tokens()
        .issue(&Claims::from(InviteClaims {
            room_id: room.room_id.clone(),
            secret: "not-the-secret".into(),
            exp: unix_now() + 60,
        }))
        .unwrap();
    let err = join(&admission, &stale, "bob").await.unwrap_err();
    assert_eq!(err.status, 403);
    assert!(err.field_errors.contains_key("roomSecretKey"));

    let elsewhere = admission
        .tokens()
        .issue(&Claims::from(InviteClaims {
            room_id: RoomId::new("000000000000"),
            secret: "whatever".into(),
            exp: unix_now() + 60,
        }))
        .unwrap();
    let err = join(&admission, &elsewhere, "bob").await.unwrap_err();
    assert_eq!(err.status, 404);
}

#[tokio::test]
async fn test_join_refusals() {
    let admission = admission();
    let room = create(&admission, 3).await;
    join(&admission, &room.invite, "bob").await.expect("join");

    let err = join(&admission, &room.invite, "bob").await.unwrap_err();
    assert_eq!(err.status, 400);
    assert!(err.field_errors.contains_key("roomId"), "same session rejoining");

    let err = admission
        .join_room(
            &session("carol"),
            &room.invite,
            JoinRoomRequest {
                username: "bob".into(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.status, 400);
    assert_eq!(
        err.field_errors.get("username").map(String::as_str),
        Some("This username is taken.")
    );

    let err = join(&admission, &room.invite, "x").await.unwrap_err();
    assert_eq!(err.status, 400);
    assert!(err.field_errors.contains_key("username"));

    join(&admission, &room.invite, "carol").await.expect("last seat");
    let err = join(&admission, &room.invite, "dave").await.unwrap_err();
    assert_eq!(err.status, 409);
}

#[tokio::test]
async fn test_failed_member_token_revokes_member() {
    let admission = admission_with(FlakySigner {
        inner: JwtTokenService::new(SECRET),
        refuse_members: AtomicBool::new(false),
    });
    let room = create(&admission, 3).await;

    admission.tokens().refuse_members.store(true, Ordering::SeqCst);
    let err = join(&admission, &room.invite, "bob").await.unwrap_err();
    assert_eq!(err.status, 500);

    let live = admission.registry().get_room(&room.room_id).await.unwrap();
    assert_eq!(live.participant_count().await, 1);

    // Nothing stuck: the same session can try again.
    admission.tokens().refuse_members.store(false, Ordering::SeqCst);
    let joined = join(&admission, &room.invite, "bob").await.expect("retry");
    let claims = admission.tokens().verify_participant(&joined.token).unwrap();
    assert_eq!(claims.participant_id, ParticipantId(3), "ids are never reused");
}

// =========================================================================
// Moderation
// =========================================================================

#[tokio::test]
async fn test_kick_allows_rejoin_but_ban_does_not() {
    let admission = admission();
    let room = create(&admission, 3).await;
    join(&admission, &room.invite, "bob").await.expect("join");
    join(&admission, &room.invite, "carol").await.expect("join");

    admission
        .kick(&room.room_id, &room.token, target(2))
        .await
        .expect("kick");
    join(&admission, &room.invite, "bob").await.expect("kicked may rejoin");

    admission
        .ban(&room.room_id, &room.token, target(3))
        .await
        .expect("ban");
    let err = join(&admission, &room.invite, "carol").await.unwrap_err();
    assert_eq!(err.status, 403);
}

#[tokio::test]
async fn test_moderation_requires_admin() {
    let admission = admission();
    let room = create(&admission, 3).await;
    let bob = join(&admission, &room.invite, "bob").await.expect("join");

    let err = admission
        .kick(&room.room_id, &bob.token, target(1))
        .await
        .unwrap_err();
    assert_eq!(err.status, 403);
    assert_eq!(
        err.message,
        "You are not an admin and can't kick anyone from this room."
    );

    let err = admission.close_room(&room.room_id, &bob.token).await.unwrap_err();
    assert_eq!(err.status, 403);

    let err = admission
        .ban(&room.room_id, "garbage", target(2))
        .await
        .unwrap_err();
    assert_eq!(err.status, 401);
}

#[tokio::test]
async fn test_moderation_target_checks() {
    let admission = admission();
    let room = create(&admission, 3).await;

    let err = admission
        .kick(&room.room_id, &room.token, target(0))
        .await
        .unwrap_err();
    assert_eq!(err.status, 400);

    let err = admission
        .ban(&room.room_id, &room.token, target(1))
        .await
        .unwrap_err();
    assert_eq!(err.status, 400);
    assert_eq!(err.message, "You can not ban yourself.");

    let err = admission
        .kick(&room.room_id, &room.token, target(7))
        .await
        .unwrap_err();
    assert_eq!(err.status, 404);
}

#[tokio::test]
async fn test_token_for_another_room_is_forbidden() {
    let admission = admission();
    let first = create(&admission, 2).await;
    let second = admission
        .create_room(
            &session("zoe"),
            CreateRoomRequest {
                username: "zoe".into(),
                max_participants: 2,
            },
        )
        .await
        .expect("create");

    let err = admission
        .get_room(&second.room_id, &first.token)
        .await
        .unwrap_err();
    assert_eq!(err.status, 403);

    let err = admission
        .get_room(&RoomId::new("has space"), &first.token)
        .await
        .unwrap_err();
    assert_eq!(err.status, 400);
}

#[tokio::test]
async fn test_close_room_retires_it() {
    let admission = admission();
    let room = create(&admission, 2).await;

    admission
        .close_room(&room.room_id, &room.token)
        .await
        .expect("close");

    tokio::time::timeout(Duration::from_secs(5), async {
        while admission.registry().get_room(&room.room_id).await.is_some() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("closed room should leave the registry");

    let err = admission.get_room(&room.room_id, &room.token).await.unwrap_err();
    assert_eq!(err.status, 404);
    let err = join(&admission, &room.invite, "bob").await.unwrap_err();
    assert_eq!(err.status, 404);
}

#[tokio::test]
async fn test_invite_expires_with_room() {
    let admission = admission();
    let room = create(&admission, 2).await;
    let live = admission.registry().get_room(&room.room_id).await.unwrap();

    let invite = admission.tokens().verify_invite(&room.invite).unwrap();
    assert_eq!(invite.exp, live.expires_at());
    assert!(live.secret_matches(&invite.secret));
}
