//! The admission service: create, join, inspect, and moderate rooms.
//!
//! Admission is plain request/response. Nothing here knows about HTTP; a
//! router hands each method the caller's session id and/or bearer token
//! plus the decoded request body, and turns an [`AdmissionError`] into a
//! response with its `status` and JSON body.
//!
//! ```text
//! create_room ──→ admin token ──┐
//!                               ├──→ WebSocket upgrade (?token=…)
//! get_room (admin) ──→ invite ──→ join_room ──→ member token
//! ```
//!
//! Any step that mutates room state before issuing a token undoes that
//! mutation when issuance fails, so a failed request never leaves a room or
//! a participant behind.

use std::collections::BTreeMap;
use std::sync::Arc;

use huddle_protocol::{ParticipantId, Role, RoomId, SessionId};
use huddle_room::{Candidate, CloseCause, ParticipantView, Room, RoomError, RoomRegistry};
use huddle_session::{InviteClaims, ParticipantClaims, SessionConfig, TokenService};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Random bytes in an admission secret (hex-encoded to twice as many
/// characters).
const SECRET_BYTES: usize = 10;

const USERNAME_MIN_CHARS: usize = 3;
const USERNAME_MAX_CHARS: usize = 15;

const MIN_CAPACITY: u8 = 2;
const MAX_CAPACITY: u8 = 5;

// ---------------------------------------------------------------------------
// Request and response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    pub username: String,
    /// Room capacity including the admin, 2 to 5.
    pub max_participants: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomResponse {
    pub room_id: RoomId,
    /// Participant token for the admin.
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomResponse {
    pub room_id: RoomId,
    /// Participant token for the new member.
    pub token: String,
}

/// Names the target of a kick or ban.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantRequest {
    pub user_id: ParticipantId,
}

/// What a participant sees when inspecting their room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomDetails {
    pub room_id: RoomId,
    pub user_role: Role,
    pub max_participants: usize,
    /// Ordered by participant id.
    pub participants: Vec<ParticipantView>,
    /// Unix seconds.
    pub expires_at: i64,
    /// Invite token for sharing the room. Admins only; expires with the
    /// room.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invite_token: Option<String>,
}

// ---------------------------------------------------------------------------
// AdmissionError
// ---------------------------------------------------------------------------

/// A refused admission request.
///
/// Serializes as the response body a router should send:
///
/// ```json
/// {"errorMessage": "Chat Room not found."}
/// {"fieldErrors": {"username": "This username is taken."}}
/// ```
///
/// `status` is the HTTP status code to answer with and is not part of the
/// body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("admission refused ({status}){}", detail(.message, .field_errors))]
pub struct AdmissionError {
    #[serde(skip)]
    pub status: u16,
    #[serde(rename = "errorMessage", skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub field_errors: BTreeMap<String, String>,
}

impl AdmissionError {
    pub const BAD_REQUEST: u16 = 400;
    pub const UNAUTHORIZED: u16 = 401;
    pub const FORBIDDEN: u16 = 403;
    pub const NOT_FOUND: u16 = 404;
    pub const CONFLICT: u16 = 409;
    pub const INTERNAL: u16 = 500;

    /// An error with a message and no field detail.
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            field_errors: BTreeMap::new(),
        }
    }

    /// An error blaming a single request field.
    pub fn field(status: u16, field: &str, message: impl Into<String>) -> Self {
        Self::fields(status, BTreeMap::from([(field.to_string(), message.into())]))
    }

    /// An error blaming one or more request fields.
    pub fn fields(status: u16, field_errors: BTreeMap<String, String>) -> Self {
        Self {
            status,
            message: String::new(),
            field_errors,
        }
    }

    fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(Self::UNAUTHORIZED, message)
    }

    fn forbidden(message: impl Into<String>) -> Self {
        Self::new(Self::FORBIDDEN, message)
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(Self::NOT_FOUND, message)
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(Self::INTERNAL, message)
    }
}

/// The message, then each blamed field, as `Display` shows them.
fn detail(message: &str, field_errors: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    if !message.is_empty() {
        out.push_str(": ");
        out.push_str(message);
    }
    for (field, problem) in field_errors {
        out.push_str(&format!("; {field}: {problem}"));
    }
    out
}

/// Maps a refused [`Room::join`] onto the error the joiner sees.
fn join_refused(err: RoomError) -> AdmissionError {
    match err {
        RoomError::RoomFull => {
            AdmissionError::field(AdmissionError::CONFLICT, "roomId", "Chat Room is full.")
        }
        RoomError::Banned => AdmissionError::field(
            AdmissionError::FORBIDDEN,
            "roomId",
            "You are banned from this room.",
        ),
        RoomError::AlreadyJoined => AdmissionError::field(
            AdmissionError::BAD_REQUEST,
            "roomId",
            "You can not join a room you are already in.",
        ),
        RoomError::UsernameTaken(_) => AdmissionError::field(
            AdmissionError::BAD_REQUEST,
            "username",
            "This username is taken.",
        ),
        RoomError::Closing => {
            AdmissionError::field(AdmissionError::NOT_FOUND, "roomId", "Chat Room not found.")
        }
        other => AdmissionError::internal(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate_username(username: &str, errors: &mut BTreeMap<String, String>) {
    let problem = if username.is_empty() {
        "Username cannot be empty.".to_string()
    } else if username.contains(' ') {
        "Username cannot contain spaces.".to_string()
    } else if !(USERNAME_MIN_CHARS..=USERNAME_MAX_CHARS).contains(&username.chars().count()) {
        format!(
            "Username must be between {USERNAME_MIN_CHARS} and {USERNAME_MAX_CHARS} characters."
        )
    } else {
        return;
    };
    errors.insert("username".to_string(), problem);
}

fn validate_capacity(max_participants: u8, errors: &mut BTreeMap<String, String>) {
    if !(MIN_CAPACITY..=MAX_CAPACITY).contains(&max_participants) {
        errors.insert(
            "maxParticipants".to_string(),
            format!("Max participants must be between {MIN_CAPACITY} and {MAX_CAPACITY}."),
        );
    }
}

fn validate_room_id(room_id: &RoomId) -> Result<(), AdmissionError> {
    if room_id.as_str().is_empty() {
        return Err(AdmissionError::new(
            AdmissionError::BAD_REQUEST,
            "Chat Room Id is required.",
        ));
    }
    if room_id.as_str().contains(' ') {
        return Err(AdmissionError::new(
            AdmissionError::BAD_REQUEST,
            "Chat Room Id cannot contain spaces.",
        ));
    }
    Ok(())
}

fn require_session(session_id: &SessionId) -> Result<(), AdmissionError> {
    if session_id.as_str().is_empty() {
        return Err(AdmissionError::unauthorized("Session ID missing."));
    }
    Ok(())
}

fn check_fields(errors: BTreeMap<String, String>) -> Result<(), AdmissionError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AdmissionError::fields(AdmissionError::BAD_REQUEST, errors))
    }
}

fn random_secret() -> String {
    let bytes: [u8; SECRET_BYTES] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// ---------------------------------------------------------------------------
// Admission
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Moderation {
    Kick,
    Ban,
}

impl Moderation {
    fn verb(self) -> &'static str {
        match self {
            Moderation::Kick => "kick",
            Moderation::Ban => "ban",
        }
    }
}

/// Admission requests against one [`RoomRegistry`].
///
/// Cheap to clone; clones share the registry and token service.
pub struct Admission<T: TokenService> {
    registry: Arc<RoomRegistry>,
    tokens: Arc<T>,
    config: SessionConfig,
}

impl<T: TokenService> Clone for Admission<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            tokens: Arc::clone(&self.tokens),
            config: self.config.clone(),
        }
    }
}

impl<T: TokenService> Admission<T> {
    pub fn new(registry: Arc<RoomRegistry>, tokens: Arc<T>, config: SessionConfig) -> Self {
        Self {
            registry,
            tokens,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    pub fn tokens(&self) -> &Arc<T> {
        &self.tokens
    }

    /// Creates a room with the caller as its admin.
    ///
    /// # Errors
    /// - 400 with field errors for a bad username or capacity
    /// - 401 without a session id
    /// - 500 if the admin token cannot be issued; the room is discarded
    pub async fn create_room(
        &self,
        session_id: &SessionId,
        request: CreateRoomRequest,
    ) -> Result<CreateRoomResponse, AdmissionError> {
        require_session(session_id)?;
        let mut errors = BTreeMap::new();
        validate_username(&request.username, &mut errors);
        validate_capacity(request.max_participants, &mut errors);
        check_fields(errors)?;

        let admin = Candidate::new(session_id.clone(), request.username.clone());
        let room_id = self
            .registry
            .create_room(
                random_secret(),
                usize::from(request.max_participants),
                admin,
            )
            .await;

        let claims = ParticipantClaims::new(
            ParticipantId::ADMIN,
            request.username,
            Role::Admin,
            room_id.clone(),
            self.config.token_ttl,
        );
        match self.tokens.issue(&claims.into()) {
            Ok(token) => Ok(CreateRoomResponse { room_id, token }),
            Err(e) => {
                tracing::error!(room_id = %room_id, error = %e, "admin token not issued, discarding room");
                if let Some(room) = self.registry.delete_room(&room_id).await {
                    room.close(CloseCause::Scheduled).await;
                }
                Err(AdmissionError::internal(format!("Failed to create token: {e}")))
            }
        }
    }

    /// Joins the room an invite token points at.
    ///
    /// # Errors
    /// - 401 for a missing session id or a bad invite
    /// - 400 with field errors for a bad username, a taken username, or a
    ///   session that already joined
    /// - 403 for a stale secret or a banned session
    /// - 404 if the room is gone or closing
    /// - 409 if the room is full
    /// - 500 if the member token cannot be issued; the member is revoked
    pub async fn join_room(
        &self,
        session_id: &SessionId,
        invite_token: &str,
        request: JoinRoomRequest,
    ) -> Result<JoinRoomResponse, AdmissionError> {
        require_session(session_id)?;
        let invite = self.tokens.verify_invite(invite_token).map_err(|e| {
            tracing::debug!(error = %e, "invite rejected");
            AdmissionError::unauthorized("Invalid or expired invite.")
        })?;

        let mut errors = BTreeMap::new();
        validate_username(&request.username, &mut errors);
        check_fields(errors)?;

        let room = self.registry.get_room(&invite.room_id).await.ok_or_else(|| {
            AdmissionError::field(AdmissionError::NOT_FOUND, "roomId", "Chat Room not found.")
        })?;
        if !room.secret_matches(&invite.secret) {
            return Err(AdmissionError::field(
                AdmissionError::FORBIDDEN,
                "roomSecretKey",
                "Incorrect Secret Key.",
            ));
        }

        let id = room
            .join(Candidate::new(session_id.clone(), request.username.clone()))
            .await
            .map_err(join_refused)?;

        let claims = ParticipantClaims::new(
            id,
            request.username,
            Role::Member,
            room.id().clone(),
            self.config.token_ttl,
        );
        match self.tokens.issue(&claims.into()) {
            Ok(token) => Ok(JoinRoomResponse {
                room_id: room.id().clone(),
                token,
            }),
            Err(e) => {
                tracing::error!(room_id = %room.id(), participant_id = %id, error = %e, "member token not issued, revoking");
                room.revoke(id).await;
                Err(AdmissionError::internal(format!("Failed to create token: {e}")))
            }
        }
    }

    /// Describes the caller's room. Admins also receive an invite token.
    pub async fn get_room(
        &self,
        room_id: &RoomId,
        token: &str,
    ) -> Result<RoomDetails, AdmissionError> {
        let (claims, room) = self.authorize(room_id, token).await?;

        let invite_token = if claims.role.is_admin() {
            let invite = InviteClaims {
                room_id: room.id().clone(),
                secret: room.secret().to_string(),
                exp: room.expires_at(),
            };
            let token = self.tokens.issue(&invite.into()).map_err(|e| {
                AdmissionError::internal(format!("Failed to create invite: {e}"))
            })?;
            Some(token)
        } else {
            None
        };

        let snapshot = room.snapshot().await;
        Ok(RoomDetails {
            room_id: snapshot.room_id,
            user_role: claims.role,
            max_participants: snapshot.capacity,
            participants: snapshot.participants,
            expires_at: snapshot.expires_at,
            invite_token,
        })
    }

    /// Closes the room. Admin only.
    pub async fn close_room(&self, room_id: &RoomId, token: &str) -> Result<(), AdmissionError> {
        let (claims, room) = self.authorize(room_id, token).await?;
        if !claims.role.is_admin() {
            return Err(AdmissionError::forbidden(
                "You are not an admin and can't close this room.",
            ));
        }
        if room.close(CloseCause::AdminClosed).await {
            tracing::info!(room_id = %room_id, "room closed by admin");
        }
        Ok(())
    }

    /// Removes a participant. Admin only; they may rejoin.
    pub async fn kick(
        &self,
        room_id: &RoomId,
        token: &str,
        request: ParticipantRequest,
    ) -> Result<(), AdmissionError> {
        self.moderate(room_id, token, request.user_id, Moderation::Kick)
            .await
    }

    /// Removes a participant and bans their session. Admin only.
    pub async fn ban(
        &self,
        room_id: &RoomId,
        token: &str,
        request: ParticipantRequest,
    ) -> Result<(), AdmissionError> {
        self.moderate(room_id, token, request.user_id, Moderation::Ban)
            .await
    }

    async fn moderate(
        &self,
        room_id: &RoomId,
        token: &str,
        target: ParticipantId,
        action: Moderation,
    ) -> Result<(), AdmissionError> {
        let verb = action.verb();
        let (claims, room) = self.authorize(room_id, token).await?;
        if !claims.role.is_admin() {
            return Err(AdmissionError::forbidden(format!(
                "You are not an admin and can't {verb} anyone from this room."
            )));
        }
        if target == ParticipantId(0) {
            return Err(AdmissionError::new(
                AdmissionError::BAD_REQUEST,
                "User Id not sent in the request.",
            ));
        }
        if target == claims.participant_id {
            return Err(AdmissionError::new(
                AdmissionError::BAD_REQUEST,
                format!("You can not {verb} yourself."),
            ));
        }

        let result = match action {
            Moderation::Kick => room.kick(target).await,
            Moderation::Ban => room.ban(target).await,
        };
        result.map_err(|e| match e {
            RoomError::ParticipantNotFound(_) => AdmissionError::not_found("Participant not found."),
            RoomError::Closing => AdmissionError::not_found("Chat Room not found."),
            other => AdmissionError::internal(other.to_string()),
        })
    }

    /// Verifies a participant token against the room it claims to belong
    /// to.
    async fn authorize(
        &self,
        room_id: &RoomId,
        token: &str,
    ) -> Result<(ParticipantClaims, Arc<Room>), AdmissionError> {
        validate_room_id(room_id)?;
        let claims = self.tokens.verify_participant(token).map_err(|e| {
            tracing::debug!(room_id = %room_id, error = %e, "participant token rejected");
            AdmissionError::unauthorized("Unauthorized.")
        })?;
        let room = self
            .registry
            .get_room(room_id)
            .await
            .ok_or_else(|| AdmissionError::not_found("Chat Room not found."))?;
        if claims.room_id != *room_id {
            return Err(AdmissionError::forbidden(
                "You do not have access to this room.",
            ));
        }
        Ok((claims, room))
    }
}
