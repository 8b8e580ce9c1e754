//! WebSocket transport for the signaling channel.
//!
//! One socket is one connection. Inbound frames are queued and handled
//! strictly in arrival order by a per-connection task; when the actor stops
//! that task drains the queue and runs disconnect cleanup exactly once.

use crate::session::SessionBinder;
use actix::{Actor, ActorContext, AsyncContext, Handler, Message, StreamHandler};
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use discuss_protocol::ConnectionId;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Pending inbound frames per connection. A client that outruns this is
/// disconnected.
const INBOUND_BUFFER: usize = 64;

/// What happened to an inbound frame handed to the session queue.
#[derive(Debug, PartialEq, Eq)]
enum Enqueued {
    Accepted,
    /// Queue full; the frame was not queued.
    Overflow,
    /// The session task is gone.
    Closed,
}

fn enqueue(tx: Option<&mpsc::Sender<String>>, frame: String) -> Enqueued {
    let Some(tx) = tx else {
        return Enqueued::Closed;
    };
    match tx.try_send(frame) {
        Ok(()) => Enqueued::Accepted,
        Err(TrySendError::Full(_)) => Enqueued::Overflow,
        Err(TrySendError::Closed(_)) => Enqueued::Closed,
    }
}

/// Shared state for WebSocket handlers.
pub struct WsState {
    pub binder: Arc<SessionBinder>,
    pub outbound_buffer: usize,
    pub heartbeat_interval: Duration,
    pub client_timeout: Duration,
}

/// WebSocket actor for one signaling connection.
pub struct ConnectionWsActor {
    connection_id: ConnectionId,
    binder: Arc<SessionBinder>,
    /// Frames waiting for the binder. Dropped on stop to end the session.
    inbound_tx: Option<mpsc::Sender<String>>,
    inbound_rx: Option<mpsc::Receiver<String>>,
    /// Frames routed to this client.
    outbound_rx: Option<mpsc::Receiver<Arc<String>>>,
    heartbeat_interval: Duration,
    client_timeout: Duration,
    last_heartbeat: Instant,
}

/// An encoded event to write to the socket.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Outbound(pub Arc<String>);

/// The router dropped this connection.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Evicted;

impl ConnectionWsActor {
    pub fn new(
        connection_id: ConnectionId,
        binder: Arc<SessionBinder>,
        outbound_rx: mpsc::Receiver<Arc<String>>,
        heartbeat_interval: Duration,
        client_timeout: Duration,
    ) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUFFER);
        Self {
            connection_id,
            binder,
            inbound_tx: Some(inbound_tx),
            inbound_rx: Some(inbound_rx),
            outbound_rx: Some(outbound_rx),
            heartbeat_interval,
            client_timeout,
            last_heartbeat: Instant::now(),
        }
    }

    fn heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let timeout = self.client_timeout;
        ctx.run_interval(self.heartbeat_interval, move |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > timeout {
                tracing::debug!(conn = %act.connection_id, "heartbeat timeout");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn start_listeners(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        // Routed events -> socket
        if let Some(mut outbound_rx) = self.outbound_rx.take() {
            let addr = ctx.address();
            actix::spawn(async move {
                while let Some(frame) = outbound_rx.recv().await {
                    if addr.try_send(Outbound(frame)).is_err() {
                        return;
                    }
                }
                let _ = addr.try_send(Evicted);
            });
        }

        // Socket -> binder, in order, then cleanup
        if let Some(mut inbound_rx) = self.inbound_rx.take() {
            let binder = Arc::clone(&self.binder);
            let conn = self.connection_id;
            actix::spawn(async move {
                while let Some(frame) = inbound_rx.recv().await {
                    binder.handle_frame(conn, &frame).await;
                }
                binder.disconnect(conn).await;
            });
        }
    }
}

impl Actor for ConnectionWsActor {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.heartbeat(ctx);
        self.start_listeners(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        // Closing the inbound queue ends the session task, which disconnects.
        self.inbound_tx = None;
    }
}

impl Handler<Outbound> for ConnectionWsActor {
    type Result = ();

    fn handle(&mut self, msg: Outbound, ctx: &mut Self::Context) {
        ctx.text(msg.0.as_str());
    }
}

impl Handler<Evicted> for ConnectionWsActor {
    type Result = ();

    fn handle(&mut self, _msg: Evicted, ctx: &mut Self::Context) {
        ctx.close(Some(ws::CloseCode::Policy.into()));
        ctx.stop();
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ConnectionWsActor {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                if enqueue(self.inbound_tx.as_ref(), text.to_string()) == Enqueued::Overflow {
                    tracing::warn!(conn = %self.connection_id, "inbound queue full, closing");
                    ctx.close(Some(ws::CloseReason {
                        code: ws::CloseCode::Policy,
                        description: Some("inbound queue full".to_string()),
                    }));
                    ctx.stop();
                }
            }
            Ok(ws::Message::Binary(_)) => {
                self.binder.reject_malformed(self.connection_id);
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::debug!(conn = %self.connection_id, ?reason, "WebSocket close");
                ctx.close(reason);
                ctx.stop();
            }
            Ok(_) => (),
            Err(e) => {
                tracing::warn!(conn = %self.connection_id, error = %e, "WebSocket protocol error");
                ctx.stop();
            }
        }
    }
}

/// HTTP handler to upgrade to the signaling WebSocket.
pub async fn connection_ws(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<WsState>,
) -> Result<HttpResponse, actix_web::Error> {
    let (outbound_tx, outbound_rx) = mpsc::channel(state.outbound_buffer);
    let connection_id = state.binder.connect(outbound_tx).await;

    tracing::info!(conn = %connection_id, peer_addr = ?req.peer_addr(), "WebSocket connection");

    let actor = ConnectionWsActor::new(
        connection_id,
        Arc::clone(&state.binder),
        outbound_rx,
        state.heartbeat_interval,
        state.client_timeout,
    );

    match ws::start(actor, &req, stream) {
        Ok(response) => Ok(response),
        Err(e) => {
            state.binder.disconnect(connection_id).await;
            Err(e)
        }
    }
}
