//! Per-connection handler: handshake, auth, and message routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive Handshake → validate version
//!   2. Authenticate token → get UserContext
//!   3. Send HandshakeAck → user is connected
//!   4. Loop: commands in, replies and room broadcasts out

use std::sync::Arc;
use std::time::Instant;

use bingohall_protocol::{Codec, Envelope, Payload, ProtocolError, SystemMessage};
use bingohall_room::Wallet;
use bingohall_session::{Authenticator, UserContext};
use bingohall_transport::{Connection, WebSocketConnection};
use tokio::time::{Instant as TokioInstant, sleep_until};

use crate::server::{PROTOCOL_VERSION, ServerState};
use crate::{Gateway, HallError, Subscriber};

/// Runs the gateway's disconnect cleanup when the handler exits.
///
/// `Drop` is synchronous, so the async cleanup is spawned.
struct DisconnectGuard<W: Wallet> {
    gateway: Gateway<W>,
    subscriber: Subscriber,
    user: UserContext,
}

impl<W: Wallet> Drop for DisconnectGuard<W> {
    fn drop(&mut self) {
        let gateway = self.gateway.clone();
        let subscriber = self.subscriber.clone();
        let user = self.user.clone();
        tokio::spawn(async move {
            gateway.on_disconnect(&subscriber, &user).await;
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<W, A>(
    conn: WebSocketConnection,
    state: Arc<ServerState<W, A>>,
) -> Result<(), HallError>
where
    W: Wallet,
    A: Authenticator,
{
    let conn_id = conn.id();
    let start = Instant::now();
    tracing::debug!(%conn_id, "handling new connection");

    let user = perform_handshake(&conn, &state, &start).await?;
    tracing::info!(%conn_id, user_id = %user.id, username = %user.username, "user authenticated");

    state.gateway.connect(&user).await;
    let (subscriber, mut outbound) = Subscriber::new(conn_id);
    let _guard = DisconnectGuard {
        gateway: state.gateway.clone(),
        subscriber: subscriber.clone(),
        user: user.clone(),
    };

    let idle = state.config.idle_timeout();
    let mut deadline = TokioInstant::now() + idle;
    let mut seq: u64 = 1;

    loop {
        tokio::select! {
            received = conn.recv() => {
                let data = match received {
                    Ok(Some(data)) => data,
                    Ok(None) => {
                        tracing::info!(user_id = %user.id, "connection closed cleanly");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(user_id = %user.id, error = %e, "recv error");
                        break;
                    }
                };
                deadline = TokioInstant::now() + idle;

                let envelope: Envelope = match state.codec.decode(&data) {
                    Ok(env) => env,
                    Err(e) => {
                        tracing::debug!(user_id = %user.id, error = %e, "failed to decode envelope");
                        let err = HallError::from(e);
                        send_payload(&conn, &state, Payload::Event(err.to_event()), &mut seq, &start).await?;
                        continue;
                    }
                };

                match envelope.payload {
                    Payload::System(SystemMessage::Heartbeat { client_time }) => {
                        let ack = SystemMessage::HeartbeatAck {
                            client_time,
                            server_time: millis_since(&start),
                        };
                        send_payload(&conn, &state, Payload::System(ack), &mut seq, &start).await?;
                    }
                    Payload::System(SystemMessage::Disconnect { reason }) => {
                        tracing::info!(user_id = %user.id, %reason, "client disconnected");
                        break;
                    }
                    Payload::System(_) => {
                        tracing::debug!(user_id = %user.id, "ignoring unexpected system message");
                    }
                    Payload::Command(command) => {
                        let reply = match state.gateway.handle(&subscriber, &user, command).await {
                            Ok(event) => event,
                            Err(err) => err.to_event(),
                        };
                        send_payload(&conn, &state, Payload::Event(reply), &mut seq, &start).await?;
                    }
                    Payload::Event(_) => {
                        let err = HallError::BadRequest("clients send commands, not events".into());
                        send_payload(&conn, &state, Payload::Event(err.to_event()), &mut seq, &start).await?;
                    }
                }
            }

            Some(event) = outbound.recv() => {
                send_payload(&conn, &state, Payload::Event(event), &mut seq, &start).await?;
            }

            _ = sleep_until(deadline) => {
                tracing::info!(user_id = %user.id, "connection timed out");
                let bye = SystemMessage::Disconnect { reason: "idle timeout".into() };
                let _ = send_payload(&conn, &state, Payload::System(bye), &mut seq, &start).await;
                break;
            }
        }
    }

    let _ = conn.close().await;
    // _guard drops here → disconnect cleanup fires.
    Ok(())
}

/// Performs the initial handshake: receive Handshake, validate, auth, send Ack.
async fn perform_handshake<W, A>(
    conn: &WebSocketConnection,
    state: &Arc<ServerState<W, A>>,
    start: &Instant,
) -> Result<UserContext, HallError>
where
    W: Wallet,
    A: Authenticator,
{
    let data = match tokio::time::timeout(state.config.handshake_timeout(), conn.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(ProtocolError::InvalidMessage("connection closed before handshake".into()).into());
        }
        Ok(Err(e)) => return Err(HallError::Transport(e)),
        Err(_) => {
            return Err(ProtocolError::InvalidMessage("handshake timed out".into()).into());
        }
    };

    let envelope: Envelope = state.codec.decode(&data)?;

    let Payload::System(SystemMessage::Handshake { version, token }) = envelope.payload else {
        send_error(conn, state, 400, "expected Handshake", start).await?;
        return Err(ProtocolError::InvalidMessage("first message must be Handshake".into()).into());
    };

    if version != PROTOCOL_VERSION {
        let message = format!("version mismatch: expected {PROTOCOL_VERSION}, got {version}");
        send_error(conn, state, 400, &message, start).await?;
        return Err(ProtocolError::InvalidMessage("protocol version mismatch".into()).into());
    }

    let user = match state.auth.authenticate(token.as_deref().unwrap_or("")).await {
        Ok(user) => user,
        Err(e) => {
            send_error(conn, state, 401, "unauthorized", start).await?;
            return Err(HallError::Session(e));
        }
    };

    let ack = Envelope {
        seq: 0,
        timestamp: millis_since(start),
        payload: Payload::System(SystemMessage::HandshakeAck {
            user_id: user.id,
            username: user.username.clone(),
            server_time: millis_since(start),
        }),
    };
    let bytes = state.codec.encode(&ack)?;
    conn.send(&bytes).await?;

    Ok(user)
}

async fn send_payload<W: Wallet, A: Authenticator>(
    conn: &WebSocketConnection,
    state: &ServerState<W, A>,
    payload: Payload,
    seq: &mut u64,
    start: &Instant,
) -> Result<(), HallError> {
    let envelope = Envelope {
        seq: next_seq(seq),
        timestamp: millis_since(start),
        payload,
    };
    let bytes = state.codec.encode(&envelope)?;
    conn.send(&bytes).await?;
    Ok(())
}

/// Sends a connection-level error before the session exists.
async fn send_error<W: Wallet, A: Authenticator>(
    conn: &WebSocketConnection,
    state: &ServerState<W, A>,
    code: u16,
    message: &str,
    start: &Instant,
) -> Result<(), HallError> {
    let envelope = Envelope {
        seq: 0,
        timestamp: millis_since(start),
        payload: Payload::System(SystemMessage::Error {
            code,
            message: message.to_string(),
        }),
    };
    let bytes = state.codec.encode(&envelope)?;
    conn.send(&bytes).await?;
    Ok(())
}

fn millis_since(start: &Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Increments and returns the next sequence number.
fn next_seq(seq: &mut u64) -> u64 {
    let current = *seq;
    *seq += 1;
    current
}
