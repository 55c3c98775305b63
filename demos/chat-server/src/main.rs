use huddle::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_BIND: &str = "127.0.0.1:8080";

// ---------------------------------------------------------------------------
// Lobby
// ---------------------------------------------------------------------------

/// A room opened at startup so there is something to connect to without an
/// HTTP front end.
struct Lobby {
    room_id: RoomId,
    admin_token: String,
    invite_token: String,
}

async fn open_lobby<T: TokenService>(admission: &Admission<T>) -> Result<Lobby, AdmissionError> {
    let created = admission
        .create_room(
            &SessionId::new("demo-host"),
            CreateRoomRequest {
                username: "host".into(),
                max_participants: 5,
            },
        )
        .await?;
    let details = admission.get_room(&created.room_id, &created.token).await?;

    Ok(Lobby {
        room_id: created.room_id,
        admin_token: created.token,
        invite_token: details.invite_token.unwrap_or_default(),
    })
}

// ---------------------------------------------------------------------------
// Server bootstrap
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "huddle=info,huddle_room=info,chat_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let secret = std::env::var("HUDDLE_SECRET_KEY")
        .ok()
        .filter(|s| !s.is_empty())
        .ok_or("HUDDLE_SECRET_KEY must be set")?;
    let bind = std::env::var("HUDDLE_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());

    let server = HuddleServerBuilder::new()
        .bind(&bind)
        .build(JwtTokenService::new(secret.as_bytes()))
        .await?;

    let lobby = open_lobby(server.admission()).await?;
    tracing::info!(room_id = %lobby.room_id, "lobby open");
    println!("admin:  ws://{bind}/ws?token={}", lobby.admin_token);
    println!("invite: {}", lobby.invite_token);

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "cannot listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::time::Duration;
    use tokio_tungstenite::tungstenite::Message;

    async fn start() -> (String, Admission<JwtTokenService>) {
        let server = HuddleServerBuilder::new()
            .bind("127.0.0.1:0")
            .build(JwtTokenService::new(b"demo-test-secret"))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap().to_string();
        let admission = server.admission().clone();
        tokio::spawn(async move {
            let _ = server.run().await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        (addr, admission)
    }

    #[tokio::test]
    async fn test_lobby_invite_admits_a_guest() {
        let (_, admission) = start().await;
        let lobby = open_lobby(&admission).await.unwrap();

        let joined = admission
            .join_room(
                &SessionId::new("guest-session"),
                &lobby.invite_token,
                JoinRoomRequest {
                    username: "guest".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(joined.room_id, lobby.room_id);
    }

    #[tokio::test]
    async fn test_host_connects_to_lobby() {
        let (addr, admission) = start().await;
        let lobby = open_lobby(&admission).await.unwrap();

        let (mut ws, _) =
            tokio_tungstenite::connect_async(format!("ws://{addr}/ws?token={}", lobby.admin_token))
                .await
                .unwrap();

        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let Message::Text(text) = msg else {
            panic!("expected join event, got {msg:?}");
        };
        let event: Event = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(
            event,
            Event::Join {
                id: ParticipantId::ADMIN,
                username: "host".into(),
                role: Role::Admin,
            }
        );
    }
}
