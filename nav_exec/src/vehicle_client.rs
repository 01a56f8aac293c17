//! # Vehicle Client
//!
//! The vehicle client is the datagram link to the vehicle. Commands are sent as plain text from
//! the local command port, which is also where the vehicle sends its acknowledgements. Telemetry
//! arrives on a separate port at a much higher rate.
//!
//! Two background threads are run by the client:
//!  - the ack thread, which reports every acknowledgement upstream against the most recent
//!    command sent,
//!  - the telemetry thread, which feeds the [`TelemStore`].

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{info, trace, warn};
use std::{
    net::{SocketAddr, ToSocketAddrs, UdpSocket},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::Sender,
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use comms_if::{
    eqpt::drone::{DroneAck, DroneCmd},
    orch::OrchMsg,
};

use crate::{params::VehicleParams, telem_store::TelemStore};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Log target of the telemetry thread.
pub const TELEM_LOG_TARGET: &str = "nav_lib::vehicle_client::telem";

/// Read timeout of the listener sockets, bounds how long shutting down can take.
const LISTENER_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Largest datagram the vehicle sends.
const MAX_DATAGRAM_LEN: usize = 2048;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Something which accepts raw command strings for the vehicle.
pub trait CommandSink: Send + Sync {
    fn send_cmd(&self, cmd: &str) -> Result<(), VehicleClientError>;

    /// Put the vehicle into command mode and start its video stream.
    fn arm_session(&self) -> Result<(), VehicleClientError> {
        info!("Arming vehicle session");
        self.send_cmd(&DroneCmd::Command.to_string())?;
        self.send_cmd(&DroneCmd::StreamOn.to_string())
    }
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The vehicle client
pub struct VehicleClient {
    cmd_socket: UdpSocket,

    vehicle_addr: SocketAddr,

    telem_addr: SocketAddr,

    /// The last command sent, used to label acknowledgements
    last_cmd: Arc<Mutex<Option<String>>>,

    shutdown: Arc<AtomicBool>,

    ack_thread: Option<JoinHandle<()>>,

    telem_thread: Option<JoinHandle<()>>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum VehicleClientError {
    #[error("Could not resolve the vehicle address \"{0}\"")]
    InvalidAddress(String),

    #[error("Could not bind a socket to local port {0}: {1}")]
    BindError(u16, std::io::Error),

    #[error("Could not configure the socket: {0}")]
    SocketConfigError(std::io::Error),

    #[error("Could not start a listener thread: {0}")]
    ThreadSpawnError(std::io::Error),

    #[error("Could not send \"{0}\" to the vehicle: {1}")]
    SendError(String, std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl VehicleClient {
    /// Create a new instance of the vehicle client.
    ///
    /// Acknowledgements are sent as [`OrchMsg::Response`] on `upstream`, telemetry is written into
    /// `telem_store`.
    pub fn new(
        params: &VehicleParams,
        telem_store: Arc<TelemStore>,
        upstream: Sender<OrchMsg>,
    ) -> Result<Self, VehicleClientError> {
        let vehicle_addr = (params.address.as_str(), params.cmd_port)
            .to_socket_addrs()
            .ok()
            .and_then(|mut a| a.next())
            .ok_or_else(|| VehicleClientError::InvalidAddress(params.address.clone()))?;

        // Command socket, acks come back to the same port
        let cmd_socket = UdpSocket::bind(("0.0.0.0", params.local_cmd_port))
            .map_err(|e| VehicleClientError::BindError(params.local_cmd_port, e))?;
        let ack_socket = cmd_socket
            .try_clone()
            .map_err(VehicleClientError::SocketConfigError)?;
        ack_socket
            .set_read_timeout(Some(LISTENER_READ_TIMEOUT))
            .map_err(VehicleClientError::SocketConfigError)?;

        let telem_socket = UdpSocket::bind(("0.0.0.0", params.telem_port))
            .map_err(|e| VehicleClientError::BindError(params.telem_port, e))?;
        telem_socket
            .set_read_timeout(Some(LISTENER_READ_TIMEOUT))
            .map_err(VehicleClientError::SocketConfigError)?;
        let telem_addr = telem_socket
            .local_addr()
            .map_err(VehicleClientError::SocketConfigError)?;

        let last_cmd = Arc::new(Mutex::new(None));
        let shutdown = Arc::new(AtomicBool::new(false));

        let ack_thread = {
            let last_cmd = last_cmd.clone();
            let shutdown = shutdown.clone();
            thread::Builder::new()
                .name("vehicle_ack".into())
                .spawn(move || ack_listener(ack_socket, last_cmd, upstream, shutdown))
                .map_err(VehicleClientError::ThreadSpawnError)?
        };

        let telem_thread = {
            let shutdown = shutdown.clone();
            thread::Builder::new()
                .name("vehicle_telem".into())
                .spawn(move || telem_listener(telem_socket, telem_store, shutdown))
                .map_err(VehicleClientError::ThreadSpawnError)?
        };

        Ok(Self {
            cmd_socket,
            vehicle_addr,
            telem_addr,
            last_cmd,
            shutdown,
            ack_thread: Some(ack_thread),
            telem_thread: Some(telem_thread),
        })
    }

    /// Local address telemetry is received on.
    pub fn telem_addr(&self) -> SocketAddr {
        self.telem_addr
    }
}

impl CommandSink for VehicleClient {
    fn send_cmd(&self, cmd: &str) -> Result<(), VehicleClientError> {
        info!("Sending command \"{}\" to the vehicle", cmd);

        match self.last_cmd.lock() {
            Ok(mut l) => *l = Some(String::from(cmd)),
            Err(poisoned) => *poisoned.into_inner() = Some(String::from(cmd)),
        }

        self.cmd_socket
            .send_to(cmd.as_bytes(), self.vehicle_addr)
            .map(|_| ())
            .map_err(|e| VehicleClientError::SendError(String::from(cmd), e))
    }
}

impl Drop for VehicleClient {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);

        for jh in vec![self.ack_thread.take(), self.telem_thread.take()]
            .into_iter()
            .flatten()
        {
            if jh.join().is_err() {
                warn!("Vehicle listener thread panicked");
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Returns `Ok(None)` if nothing was received within the socket's read timeout.
fn recv_text(socket: &UdpSocket, buf: &mut [u8]) -> std::io::Result<Option<String>> {
    match socket.recv_from(buf) {
        Ok((len, _)) => Ok(Some(String::from_utf8_lossy(&buf[..len]).into_owned())),
        Err(e)
            if e.kind() == std::io::ErrorKind::WouldBlock
                || e.kind() == std::io::ErrorKind::TimedOut =>
        {
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn ack_listener(
    socket: UdpSocket,
    last_cmd: Arc<Mutex<Option<String>>>,
    upstream: Sender<OrchMsg>,
    shutdown: Arc<AtomicBool>,
) {
    let mut buf = [0u8; MAX_DATAGRAM_LEN];

    while !shutdown.load(Ordering::Relaxed) {
        let text = match recv_text(&socket, &mut buf) {
            Ok(Some(t)) => t,
            Ok(None) => continue,
            Err(e) => {
                warn!("Error receiving vehicle acknowledgement: {}", e);
                thread::sleep(LISTENER_READ_TIMEOUT);
                continue;
            }
        };

        let ack = DroneAck::parse(&text);

        // Acks are matched to the latest command only, the vehicle protocol isn't transactional
        let cmd = match last_cmd.lock() {
            Ok(l) => l.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };

        let response = match cmd {
            Some(c) => format!("{}: {}", c, ack),
            None => ack.to_string(),
        };

        match ack {
            DroneAck::Error(_) => warn!("Vehicle acknowledgement: {}", response),
            _ => info!("Vehicle acknowledgement: {}", response),
        }

        if upstream.send(OrchMsg::Response(response)).is_err() {
            // Nobody is listening any more
            break;
        }
    }
}

fn telem_listener(socket: UdpSocket, store: Arc<TelemStore>, shutdown: Arc<AtomicBool>) {
    let mut buf = [0u8; MAX_DATAGRAM_LEN];

    while !shutdown.load(Ordering::Relaxed) {
        match recv_text(&socket, &mut buf) {
            Ok(Some(t)) => {
                if let Err(e) = store.update(&t) {
                    trace!(target: TELEM_LOG_TARGET, "Dropped telemetry \"{}\": {}", t.trim(), e);
                }
            }
            Ok(None) => (),
            Err(e) => {
                warn!(target: TELEM_LOG_TARGET, "Error receiving telemetry: {}", e);
                thread::sleep(LISTENER_READ_TIMEOUT);
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::{sync::mpsc::channel, time::Instant};

    fn local_params(vehicle: &UdpSocket) -> VehicleParams {
        VehicleParams {
            address: String::from("127.0.0.1"),
            cmd_port: vehicle.local_addr().unwrap().port(),
            local_cmd_port: 0,
            telem_port: 0,
            video_port: 0,
        }
    }

    #[test]
    fn test_command_and_ack() {
        let vehicle = UdpSocket::bind("127.0.0.1:0").unwrap();
        vehicle
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();

        let (tx, rx) = channel();
        let store = Arc::new(TelemStore::new());
        let client = VehicleClient::new(&local_params(&vehicle), store, tx).unwrap();

        client.send_cmd("battery?").unwrap();

        let mut buf = [0u8; 64];
        let (len, from) = vehicle.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"battery?");

        vehicle.send_to(b"87\r\n", from).unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            OrchMsg::Response(String::from("battery?: 87"))
        );

        // Latest command wins
        client.send_cmd("cw 30").unwrap();
        vehicle.recv_from(&mut buf).unwrap();
        vehicle.send_to(b"ok", from).unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            OrchMsg::Response(String::from("cw 30: ok"))
        );
    }

    #[test]
    fn test_arm_session() {
        let vehicle = UdpSocket::bind("127.0.0.1:0").unwrap();
        vehicle
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();

        let (tx, _rx) = channel();
        let client =
            VehicleClient::new(&local_params(&vehicle), Arc::new(TelemStore::new()), tx).unwrap();
        client.arm_session().unwrap();

        let mut buf = [0u8; 64];
        let (len, _) = vehicle.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"command");
        let (len, _) = vehicle.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"streamon");
    }

    #[test]
    fn test_telemetry_feed() {
        let vehicle = UdpSocket::bind("127.0.0.1:0").unwrap();
        let (tx, _rx) = channel();
        let store = Arc::new(TelemStore::new());
        let client = VehicleClient::new(&local_params(&vehicle), store.clone(), tx).unwrap();

        let telem_addr: SocketAddr = (
            "127.0.0.1",
            client.telem_addr().port(),
        )
            .to_socket_addrs()
            .unwrap()
            .next()
            .unwrap();

        vehicle
            .send_to(b"pitch:0;roll:0;yaw:3;h:45;bat:80;tof:50;\r\n", telem_addr)
            .unwrap();
        vehicle.send_to(b"bat:80", telem_addr).unwrap();

        let start = Instant::now();
        while store.latest().is_none() && start.elapsed() < Duration::from_secs(2) {
            thread::sleep(Duration::from_millis(10));
        }

        // Let the invalid record arrive too
        thread::sleep(Duration::from_millis(100));

        let state = store.latest().unwrap();
        assert_eq!(state.height_cm, 45);
        assert_eq!(state.yaw_deg, 3);
    }
}
