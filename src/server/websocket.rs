use crate::agent::ChatAgent;
use crate::error::ChatError;
use crate::models::chat::{ ChatMessage, ChatMode };
use crate::models::websocket::{ ClientMessage, ServerMessage };
use crate::session::{ ChatSession, SessionRegistry };

use std::collections::HashMap;
use std::error::Error;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::io::{ AsyncRead, AsyncWrite };

use tokio_tungstenite::{ accept_hdr_async, WebSocketStream };
use tokio_tungstenite::tungstenite::handshake::server::{ Request, Response, ErrorResponse };
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::Message;

use lazy_static::lazy_static;
use governor::{ RateLimiter, Quota, state::{ InMemoryState, NotKeyed }, clock::DefaultClock };

use chrono::Utc;
use url::form_urlencoded;

use log::{ debug, info, warn, error };
use futures::{ Sink, SinkExt, StreamExt };

const MAX_MESSAGE_SIZE: usize = 1 * 1024 * 1024;
const API_KEY_HEADER: &str = "X-API-Key";

lazy_static! {
    static ref CONNECTION_LIMITER: RateLimiter<NotKeyed, InMemoryState, DefaultClock> =
        RateLimiter::direct(Quota::per_second(NonZeroU32::new(10).unwrap()));
}

pub async fn start_ws_server(
    addr: &str,
    agent: Arc<ChatAgent>,
    sessions: SessionRegistry,
    api_key: Option<String>
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    info!("WS server listening on: {}", addr);
    if api_key.as_deref().map_or(true, str::is_empty) {
        info!("No server API key set. WebSocket clients are not authenticated.");
    }

    loop {
        let (stream, peer) = listener.accept().await?;

        if CONNECTION_LIMITER.check().is_err() {
            warn!("Global connection rate limit exceeded for {}. Dropping connection.", peer);
            continue;
        }

        info!("Incoming connection from: {}", peer);
        let agent_clone = Arc::clone(&agent);
        let sessions_clone = sessions.clone();
        let required_api_key = api_key.clone();

        tokio::spawn(async move {
            if
                let Err(e) = process_connection(
                    peer,
                    stream,
                    agent_clone,
                    sessions_clone,
                    required_api_key
                ).await
            {
                error!("Failed to process connection for {}: {}", peer, e);
            }
        });
    }
}

fn unauthorized(reason: &str) -> ErrorResponse {
    let mut res = ErrorResponse::new(Some(reason.to_string()));
    *res.status_mut() = StatusCode::UNAUTHORIZED;
    res
}

/// Runs the handshake (API key check, `?session=` capture) on an accepted
/// stream, then serves the connection.
pub async fn process_connection<S>(
    peer: SocketAddr,
    stream: S,
    agent: Arc<ChatAgent>,
    sessions: SessionRegistry,
    required_api_key: Option<String>
) -> Result<(), Box<dyn Error + Send + Sync>>
    where S: AsyncRead + AsyncWrite + Unpin + Send + 'static
{
    let mut requested_session: Option<String> = None;

    let handshake_callback = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let qs = req.uri().query().unwrap_or("");
        let params: HashMap<String, String> = form_urlencoded
            ::parse(qs.as_bytes())
            .into_owned()
            .collect();

        requested_session = params.get("session").cloned();

        let secret = match &required_api_key {
            Some(k) if !k.is_empty() => k,
            _ => {
                return Ok(response);
            }
        };

        let presented = req
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .or_else(|| params.get("api_key").map(|s| s.as_str()));

        match presented {
            Some(key) if key == secret => Ok(response),
            Some(_) => {
                warn!("Rejected connection from {}: bad API key", peer);
                Err(unauthorized("bad api key"))
            }
            None => {
                warn!("Rejected connection from {}: missing API key", peer);
                Err(unauthorized("missing api key"))
            }
        }
    };

    let handshake = accept_hdr_async(stream, handshake_callback).await;
    match handshake {
        Ok(ws) => {
            handle_connection(peer, ws, agent, sessions, requested_session).await;
            Ok(())
        }
        Err(e) => {
            error!("Handshake failed for {}: {}", peer, e);
            Err(Box::new(e) as _)
        }
    }
}

async fn send_frame<W>(tx: &mut W, frame: &ServerMessage) -> Result<(), Box<dyn Error + Send + Sync>>
    where W: Sink<Message> + Unpin, W::Error: Error + Send + Sync + 'static
{
    let json = serde_json::to_string(frame)?;
    tx.send(Message::Text(json)).await?;
    Ok(())
}

enum TurnOutcome {
    Completed(ChatMessage, Option<u64>),
    Failed(ChatError),
    Disconnected(Box<dyn Error + Send + Sync>),
}

/// Streams one turn to the client as `partial` frames.
async fn run_turn<W>(
    agent: &ChatAgent,
    session: &mut ChatSession,
    content: &str,
    mode: Option<ChatMode>,
    tx: &mut W
) -> TurnOutcome
    where W: Sink<Message> + Unpin, W::Error: Error + Send + Sync + 'static
{
    let mut turn = match agent.start_turn(session, content, mode).await {
        Ok(turn) => turn,
        Err(e) => {
            return TurnOutcome::Failed(e);
        }
    };

    loop {
        match turn.next_fragment().await {
            Ok(Some(fragment)) => {
                let frame = ServerMessage::Partial { content: fragment };
                if let Err(e) = send_frame(tx, &frame).await {
                    return TurnOutcome::Disconnected(e);
                }
            }
            Ok(None) => {
                break;
            }
            Err(e) => {
                return TurnOutcome::Failed(e);
            }
        }
    }

    let eval_count = turn.stats().and_then(|s| s.eval_count);
    TurnOutcome::Completed(turn.commit(), eval_count)
}

pub async fn handle_connection<S>(
    peer: SocketAddr,
    websocket: WebSocketStream<S>,
    agent: Arc<ChatAgent>,
    sessions: SessionRegistry,
    requested_session: Option<String>
)
    where S: AsyncRead + AsyncWrite + Unpin
{
    info!("New WebSocket connection: {}", peer);

    let (mut tx, mut rx) = websocket.split();
    let (session_id, session) = sessions.attach(requested_session.as_deref()).await;
    info!("Assigned session ID {} to {}", session_id, peer);

    let history = session.lock().await.log.messages().to_vec();
    if let Err(e) = send_frame(&mut tx, &(ServerMessage::Session { id: session_id.clone() })).await {
        error!("Error sending session id to {}: {}", peer, e);
        return;
    }
    if !history.is_empty() {
        if let Err(e) = send_frame(&mut tx, &(ServerMessage::History { messages: history })).await {
            error!("Error sending history to {}: {}", peer, e);
            return;
        }
    }

    while let Some(msg) = rx.next().await {
        let message = match msg {
            Ok(message) => message,
            Err(e) => {
                error!("Error receiving message from {}: {}", peer, e);
                break;
            }
        };

        if message.len() > MAX_MESSAGE_SIZE {
            warn!(
                "Message from {} exceeds size limit ({} > {})",
                peer,
                message.len(),
                MAX_MESSAGE_SIZE
            );
            let error_msg = ServerMessage::Error {
                message: "Message too large".to_string(),
            };
            if send_frame(&mut tx, &error_msg).await.is_err() {
                error!("Failed to send size limit error to {}", peer);
            }
            break;
        }

        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => {
                info!("Client {} disconnected", peer);
                break;
            }
            Message::Binary(_) => {
                warn!("Ignoring binary message from {}", peer);
                continue;
            }
            _ => {
                continue;
            }
        };

        match serde_json::from_str::<ClientMessage>(&text) {
            Ok(ClientMessage::Chat { content, mode }) => {
                if let Err(e) = send_frame(&mut tx, &ServerMessage::Processing).await {
                    error!("Error sending processing status to {}: {}", peer, e);
                    break;
                }

                let mut guard = session.lock().await;
                let frame = match run_turn(&agent, &mut guard, &content, mode, &mut tx).await {
                    TurnOutcome::Completed(reply, eval_count) => {
                        debug!("Session {}: {}", session_id, reply.stamped());
                        ServerMessage::Done { timestamp: reply.timestamp, eval_count }
                    }
                    TurnOutcome::Failed(e) => {
                        error!("Session {}: turn failed: {}", session_id, e);
                        ServerMessage::Error { message: e.to_string() }
                    }
                    TurnOutcome::Disconnected(e) => {
                        error!("Error sending partial response to {}: {}", peer, e);
                        break;
                    }
                };
                drop(guard);

                if let Err(e) = send_frame(&mut tx, &frame).await {
                    error!("Error sending turn result to {}: {}", peer, e);
                    break;
                }
            }
            Ok(ClientMessage::Clear) => {
                let removed = agent.clear_document(&mut *session.lock().await);
                info!("Session {}: document cleared (had document: {})", session_id, removed);
                if let Err(e) = send_frame(&mut tx, &ServerMessage::Cleared).await {
                    error!("Error sending cleared status to {}: {}", peer, e);
                    break;
                }
            }
            Err(e) => {
                warn!("Invalid message format from {}: {}", peer, e);
                let error_msg = ServerMessage::Error {
                    message: format!("Invalid message format: {}", e),
                };
                if send_frame(&mut tx, &error_msg).await.is_err() {
                    break;
                }
            }
        }
    }

    drop(session);
    sessions.touch(&session_id).await;
    info!("Connection closed for {} at {}", peer, Utc::now().to_rfc3339());
}
