//! Live connections: attach, the read and write tasks, and departure.
//!
//! Each attached connection is driven by two tasks:
//!
//! ```text
//!             ┌──────────── read task ◄──── FrameReader ◄── client
//!  Room ◄─────┤   text → broadcast msg, binary → ack, "leave" → depart
//!             │                 │ ack (capacity 1)
//!             └──► outbox ──► write task ────► FrameWriter ──► client
//!                  (bounded)   probes, timeout or stall → depart
//! ```
//!
//! The write task owns shutdown: when it exits for any reason the read task
//! stops too. A read task that ends without a `leave` close frame does not
//! remove anyone; a page refresh reattaches shortly and the heartbeat
//! decides otherwise.

use std::sync::Arc;
use std::time::Duration;

use huddle_protocol::{CloseReason, Event, ParticipantId, SessionId};
use huddle_transport::{
    Connection, ConnectionId, Frame, FrameReader, FrameWriter, TransportError,
};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};

use crate::Room;
use crate::participant::Link;

/// The probe payload. Clients answer any binary frame with a binary frame.
const PROBE: [u8; 1] = [0];

impl Room {
    /// Attaches `conn` as the live connection of participant `id`.
    ///
    /// Refuses the connection with `room-not-exists` if the room is
    /// closing, or `user-not-exists` if no participant matches both `id`
    /// and `username`. A connection already attached to the participant is
    /// shut down, and both its tasks have exited, before the new tasks
    /// start.
    pub async fn attach<C: Connection>(
        self: &Arc<Self>,
        id: ParticipantId,
        username: &str,
        conn: C,
    ) {
        let conn_id = conn.id();
        let (outbox_tx, outbox_rx) = mpsc::channel(self.config.outbox_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (done_tx, done_rx) = mpsc::channel(1);

        let attached = {
            let mut inner = self.inner.write().await;
            if inner.closing {
                Err(CloseReason::RoomNotExists)
            } else {
                match inner
                    .participants
                    .values_mut()
                    .find(|p| p.id == id && p.username == username)
                {
                    None => Err(CloseReason::UserNotExists),
                    Some(participant) => {
                        participant.cancel_grace();
                        let link = Link::new(conn_id, outbox_tx, shutdown_tx, done_rx);
                        let superseded = participant.link.replace(link);
                        Ok((
                            participant.session_id.clone(),
                            participant.role,
                            superseded,
                        ))
                    }
                }
            }
        };

        let (session_id, role, superseded) = match attached {
            Ok(attached) => attached,
            Err(reason) => {
                tracing::debug!(room_id = %self.id(), participant_id = %id, %reason, "connection refused");
                let (_, mut writer) = conn.split();
                close_writer(&mut writer, Some(reason), self.config.close_timeout).await;
                return;
            }
        };

        if let Some(old) = superseded {
            tracing::debug!(room_id = %self.id(), participant_id = %id, "superseding previous connection");
            old.shut_down(None).await;
        }

        tracing::info!(room_id = %self.id(), participant_id = %id, %conn_id, "participant connected");
        self.broadcast(&Event::Join {
            id,
            username: username.to_owned(),
            role,
        })
        .await;

        let (reader, writer) = conn.split();
        let (ack_tx, ack_rx) = mpsc::channel(1);
        let (stop_tx, stop_rx) = oneshot::channel();

        tokio::spawn(read_task(
            Arc::clone(self),
            Pump {
                session_id: session_id.clone(),
                conn_id,
                done: done_tx.clone(),
            },
            username.to_owned(),
            reader,
            ack_tx,
            stop_rx,
        ));
        tokio::spawn(write_task(
            Arc::clone(self),
            Pump {
                session_id,
                conn_id,
                done: done_tx,
            },
            writer,
            outbox_rx,
            ack_rx,
            shutdown_rx,
            stop_tx,
        ));
    }

    /// Removes the participant whose live link is `conn_id`.
    ///
    /// Stale calls from a superseded connection are ignored. An admin
    /// departure closes the whole room; a member departure closes that
    /// member's connection with `reason` and broadcasts `leave`.
    pub(crate) async fn depart(
        &self,
        session_id: &SessionId,
        conn_id: ConnectionId,
        reason: Option<CloseReason>,
    ) {
        let removed = {
            let mut inner = self.inner.write().await;
            if inner.closing {
                return;
            }
            let Some(participant) = inner.participants.get(session_id) else {
                return;
            };
            if participant.link.as_ref().map(|l| l.conn_id) != Some(conn_id) {
                return;
            }
            if participant.role.is_admin() {
                None
            } else {
                inner.participants.remove(session_id)
            }
        };

        let Some(participant) = removed else {
            tracing::info!(room_id = %self.id(), "admin departed");
            self.close(crate::CloseCause::AdminDeparted).await;
            return;
        };

        let id = participant.id;
        tracing::info!(room_id = %self.id(), participant_id = %id, "participant departed");
        if let Some(link) = participant.detach() {
            link.shut_down(reason).await;
        }
        self.broadcast(&Event::Leave { id }).await;
    }
}

/// What both tasks of one link carry.
struct Pump {
    session_id: SessionId,
    conn_id: ConnectionId,
    /// Dropped when the task exits; see `Link::shut_down`.
    done: mpsc::Sender<()>,
}

impl Pump {
    /// Releases the link's `done` sender, then departs if asked to.
    async fn finish(self, room: &Room, departure: Option<Option<CloseReason>>) {
        let Pump {
            session_id,
            conn_id,
            done,
        } = self;
        drop(done);
        if let Some(reason) = departure {
            room.depart(&session_id, conn_id, reason).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Read task
// ---------------------------------------------------------------------------

async fn read_task<R: FrameReader>(
    room: Arc<Room>,
    pump: Pump,
    username: String,
    mut reader: R,
    ack: mpsc::Sender<()>,
    mut stop: oneshot::Receiver<()>,
) {
    let max = room.config.max_message_bytes;

    // `Some(reason)` means depart and close with `reason`.
    let departure = loop {
        let frame = tokio::select! {
            _ = &mut stop => break None,
            frame = reader.read_frame() => frame,
        };

        match frame {
            Ok(Frame::Text(text)) if text.len() > max => {
                break Some(Some(CloseReason::MessageTooLarge));
            }
            Ok(Frame::Binary(data)) if data.len() > max => {
                break Some(Some(CloseReason::MessageTooLarge));
            }
            Ok(Frame::Text(content)) => {
                room.broadcast(&Event::Msg {
                    username: username.clone(),
                    content,
                })
                .await;
            }
            Ok(Frame::Binary(_)) => {
                // Extra acks are redundant.
                let _ = ack.try_send(());
            }
            Ok(Frame::Close(reason)) => {
                if reason.as_deref() == Some(CloseReason::Leave.as_str()) {
                    break Some(None);
                }
                tracing::debug!(room_id = %room.id(), conn_id = %pump.conn_id, "closed without leave");
                break None;
            }
            Err(e) => {
                tracing::debug!(room_id = %room.id(), conn_id = %pump.conn_id, error = %e, "read ended");
                break None;
            }
        }
    };

    drop(reader);
    pump.finish(&room, departure).await;
}

// ---------------------------------------------------------------------------
// Write task
// ---------------------------------------------------------------------------

enum Wake {
    Shutdown(Option<CloseReason>),
    Outgoing(Option<Arc<str>>),
    Ack,
    Probe,
}

async fn write_task<W: FrameWriter>(
    room: Arc<Room>,
    pump: Pump,
    mut writer: W,
    mut outbox: mpsc::Receiver<Arc<str>>,
    mut acks: mpsc::Receiver<()>,
    mut shutdown: oneshot::Receiver<Option<CloseReason>>,
    stop_reader: oneshot::Sender<()>,
) {
    let config = &room.config;
    let mut probe = tokio::time::interval_at(
        Instant::now() + config.heartbeat_interval,
        config.heartbeat_interval,
    );
    probe.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_ack = Instant::now();
    let mut probed = false;

    let departure = loop {
        // Probes and acks go ahead of the outbox so a busy room cannot
        // starve the heartbeat.
        let wake = tokio::select! {
            biased;
            reason = &mut shutdown => Wake::Shutdown(reason.ok().flatten()),
            Some(()) = acks.recv() => Wake::Ack,
            _ = probe.tick() => Wake::Probe,
            msg = outbox.recv() => Wake::Outgoing(msg),
        };

        let frame = match wake {
            Wake::Shutdown(reason) => {
                close_writer(&mut writer, reason, config.close_timeout).await;
                break None;
            }
            Wake::Outgoing(None) => {
                close_writer(&mut writer, None, config.close_timeout).await;
                break None;
            }
            Wake::Outgoing(Some(text)) => Frame::Text(text.to_string()),
            Wake::Ack => {
                last_ack = Instant::now();
                continue;
            }
            Wake::Probe => {
                if probed && last_ack.elapsed() > config.heartbeat_timeout {
                    tracing::info!(room_id = %room.id(), conn_id = %pump.conn_id, "heartbeat timed out");
                    close_writer(&mut writer, None, config.close_timeout).await;
                    break Some(None);
                }
                probed = true;
                Frame::Binary(PROBE.to_vec())
            }
        };

        match send_bounded(&mut writer, frame, &mut shutdown, config.heartbeat_timeout).await {
            Sent::Written => {}
            Sent::Failed(e) => {
                tracing::debug!(room_id = %room.id(), conn_id = %pump.conn_id, error = %e, "write failed");
                break Some(None);
            }
            Sent::Stalled => {
                tracing::info!(room_id = %room.id(), conn_id = %pump.conn_id, "peer stopped reading");
                break Some(None);
            }
            Sent::Interrupted(reason) => {
                close_writer(&mut writer, reason, config.close_timeout).await;
                break None;
            }
        }
    };

    drop(writer);
    drop(shutdown);
    drop(stop_reader);
    pump.finish(&room, departure).await;
}

/// How one bounded write ended.
enum Sent {
    Written,
    Failed(TransportError),
    /// The peer did not take the frame within the limit.
    Stalled,
    /// Shutdown arrived first; carries its close reason.
    Interrupted(Option<CloseReason>),
}

/// Writes `frame` unless shutdown arrives first or the peer holds the
/// write for longer than `limit`.
async fn send_bounded<W: FrameWriter>(
    writer: &mut W,
    frame: Frame,
    shutdown: &mut oneshot::Receiver<Option<CloseReason>>,
    limit: Duration,
) -> Sent {
    tokio::select! {
        biased;
        reason = shutdown => Sent::Interrupted(reason.ok().flatten()),
        written = tokio::time::timeout(limit, writer.write_frame(frame)) => match written {
            Ok(Ok(())) => Sent::Written,
            Ok(Err(e)) => Sent::Failed(e),
            Err(_) => Sent::Stalled,
        },
    }
}

/// Writes a close frame, giving up after `limit`.
async fn close_writer<W: FrameWriter>(writer: &mut W, reason: Option<CloseReason>, limit: Duration) {
    let reason = reason.map(CloseReason::as_str);
    match tokio::time::timeout(limit, writer.close(reason)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!(error = %e, "close frame not delivered"),
        Err(_) => tracing::debug!("close frame timed out"),
    }
}
