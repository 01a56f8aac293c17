//! # Orchestrator Client
//!
//! The orchestrator client maintains the message link to the mission orchestrator. The zmq socket
//! is owned by a single link thread which:
//!  - reports connection changes and decoded inbound messages as [`OrchEvent`]s,
//!  - sends outbound messages queued through [`OrchClient::sender`] while connected, and
//!    discards them while disconnected,
//!  - answers undecodable messages with an `invalid message` response.
//!
//! Reconnection is handled by zmq with a fixed interval of `orch_reconnect_backoff_s`.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, info, warn};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{channel, Receiver, Sender, TryRecvError},
        Arc,
    },
    thread::{self, JoinHandle},
};

use comms_if::{
    net::{zmq, MonitoredSocket, MonitoredSocketError, NetParams, SocketOptions},
    orch::OrchMsg,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Orchestrator client
pub struct OrchClient {
    out_tx: Sender<OrchMsg>,

    shutdown: Arc<AtomicBool>,

    link_thread: Option<JoinHandle<()>>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Events produced by the orchestrator link.
#[derive(Debug, Clone, PartialEq)]
pub enum OrchEvent {
    /// The orchestrator has (re)connected
    Connected,

    /// The link to the orchestrator dropped
    Disconnected,

    /// An inbound message was received
    Msg(OrchMsg),
}

#[derive(Debug, thiserror::Error)]
pub enum OrchClientError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),

    #[error("Could not start the link thread: {0}")]
    ThreadSpawnError(std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl OrchClient {
    /// Create a new instance of the orchestrator client.
    ///
    /// This function will not block until the orchestrator connects. Events from the link are
    /// delivered on the returned receiver.
    pub fn new(
        ctx: &zmq::Context,
        params: &NetParams,
    ) -> Result<(Self, Receiver<OrchEvent>), OrchClientError> {
        let backoff_ms = (params.orch_reconnect_backoff_s * 1000.0).round() as i32;

        let socket_options = SocketOptions {
            connect_timeout: 1000,
            heartbeat_ivl: 500,
            heartbeat_ttl: 1000,
            heartbeat_timeout: 1000,
            linger: 1,
            reconnect_ivl: backoff_ms.max(1),
            recv_timeout: 10,
            send_timeout: 10,
            ..Default::default()
        };

        let socket = MonitoredSocket::new(
            ctx,
            zmq::DEALER,
            socket_options,
            &params.orch_endpoint,
        )
        .map_err(OrchClientError::SocketError)?;

        let (out_tx, out_rx) = channel();
        let (event_tx, event_rx) = channel();
        let shutdown = Arc::new(AtomicBool::new(false));

        let link_thread = {
            let shutdown = shutdown.clone();
            thread::Builder::new()
                .name("orch_link".into())
                .spawn(move || link_thread(socket, out_rx, event_tx, shutdown))
                .map_err(OrchClientError::ThreadSpawnError)?
        };

        Ok((
            Self {
                out_tx,
                shutdown,
                link_thread: Some(link_thread),
            },
            event_rx,
        ))
    }

    /// Get a sender for outbound messages.
    pub fn sender(&self) -> Sender<OrchMsg> {
        self.out_tx.clone()
    }
}

impl Drop for OrchClient {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);

        if let Some(jh) = self.link_thread.take() {
            if jh.join().is_err() {
                warn!("Orchestrator link thread panicked");
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn send_msg(socket: &MonitoredSocket, msg: &OrchMsg) {
    let msg_str = match msg.to_json() {
        Ok(s) => s,
        Err(e) => {
            warn!("Could not serialise {:?}: {}", msg, e);
            return;
        }
    };

    if let Err(e) = socket.send(&msg_str, 0) {
        warn!("Could not send message to the orchestrator: {}", e);
    }
}

fn link_thread(
    socket: MonitoredSocket,
    out_rx: Receiver<OrchMsg>,
    event_tx: Sender<OrchEvent>,
    shutdown: Arc<AtomicBool>,
) {
    let mut was_connected = false;

    while !shutdown.load(Ordering::Relaxed) {
        // ---- CONNECTION STATE ----

        let connected = socket.connected();
        if connected != was_connected {
            let event = match connected {
                true => {
                    info!(
                        "Orchestrator connected ({} connections so far)",
                        socket.num_connections()
                    );
                    OrchEvent::Connected
                }
                false => {
                    warn!("Connection to the orchestrator lost");
                    OrchEvent::Disconnected
                }
            };

            if event_tx.send(event).is_err() {
                break;
            }
            was_connected = connected;
        }

        // ---- OUTBOUND ----

        loop {
            match out_rx.try_recv() {
                Ok(msg) if connected => send_msg(&socket, &msg),
                Ok(msg) => debug!("Orchestrator not connected, discarding {:?}", msg),
                Err(TryRecvError::Empty) => break,
                // The client's own sender lives as long as the thread is wanted
                Err(TryRecvError::Disconnected) => return,
            }
        }

        // ---- INBOUND ----

        let msg_str = match socket.recv_string(0) {
            Ok(Ok(s)) => s,
            Ok(Err(_)) => {
                warn!("Orchestrator sent a message which was not valid UTF-8");
                send_msg(
                    &socket,
                    &OrchMsg::Response(String::from("invalid message: not valid UTF-8")),
                );
                continue;
            }
            Err(zmq::Error::EAGAIN) => continue,
            Err(e) => {
                warn!("Could not receive from the orchestrator: {}", e);
                continue;
            }
        };

        match OrchMsg::from_json(&msg_str) {
            Ok(msg) if msg.is_inbound() => {
                debug!("Received {:?}", msg);
                if event_tx.send(OrchEvent::Msg(msg)).is_err() {
                    break;
                }
            }
            Ok(msg) => warn!("Ignoring outbound-only message from the orchestrator: {:?}", msg),
            Err(e) => {
                warn!("Invalid message from the orchestrator: {}", e);
                send_msg(&socket, &OrchMsg::Response(format!("invalid message: {}", e)));
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
