//! # Detector Client
//!
//! The detector client sends frames to the object detector server and receives the boxes found
//! for the target label.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::debug;
use std::time::{Duration, Instant};

use comms_if::{
    eqpt::detect::{DetectRequest, DetectResponse, NormBox},
    net::{zmq, MonitoredSocket, MonitoredSocketError, NetParams, SocketOptions},
};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Something which finds an object in an image.
pub trait ObjectDetector: Send {
    /// Find the object labelled `label` in the JPEG `image`.
    ///
    /// Returns the first box found, or `None` if the object isn't in the image.
    fn detect(&mut self, image: &[u8], label: &str) -> Result<Option<NormBox>, DetectClientError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The detector client
pub struct DetectClient {
    socket: MonitoredSocket,

    timeout: Duration,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DetectClientError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),

    #[error("The client is not connected to the server")]
    NotConnected,

    #[error("Could not send the request to the server: {0}")]
    SendError(zmq::Error),

    #[error("Could not recieve a message from the server: {0}")]
    RecvError(zmq::Error),

    #[error("Could not serialize the request: {0}")]
    SerializationError(serde_json::Error),

    #[error("Could not deserialize the response from the server: {0}")]
    DeserializeError(serde_json::Error),

    #[error("The server responed with a message which was not valid UTF-8")]
    NonUtf8Response,

    #[error("No response from the server in {0:?}")]
    Timeout(Duration),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl DetectClient {
    /// Create a new instance of the detector client.
    pub fn new(ctx: &zmq::Context, params: &NetParams) -> Result<Self, DetectClientError> {
        // Relaxed so a new request can be made after a timed out one
        let socket_options = SocketOptions {
            connect_timeout: 1000,
            heartbeat_ivl: 500,
            heartbeat_ttl: 1000,
            heartbeat_timeout: 1000,
            linger: 1,
            recv_timeout: 10,
            send_timeout: 10,
            req_correlate: true,
            req_relaxed: true,
            ..Default::default()
        };

        let socket = MonitoredSocket::new(
            ctx,
            zmq::REQ,
            socket_options,
            &params.detector_endpoint,
        )
        .map_err(DetectClientError::SocketError)?;

        Ok(Self {
            socket,
            timeout: util::time::secs_to_duration(params.detector_timeout_s),
        })
    }

    /// Check if the client is connected to the server
    pub fn is_connected(&self) -> bool {
        self.socket.connected()
    }

    /// Send a request and wait for the full response.
    pub fn request(&self, request: &DetectRequest) -> Result<DetectResponse, DetectClientError> {
        if !self.socket.connected() {
            return Err(DetectClientError::NotConnected);
        }

        let request_str =
            serde_json::to_string(request).map_err(DetectClientError::SerializationError)?;

        self.socket
            .send(&request_str, 0)
            .map_err(DetectClientError::SendError)?;

        // Poll until the response arrives or the timeout expires
        let start = Instant::now();
        let response_str = loop {
            match self.socket.recv_string(0) {
                Ok(Ok(s)) => break s,
                Ok(Err(_)) => return Err(DetectClientError::NonUtf8Response),
                Err(zmq::Error::EAGAIN) => {
                    if start.elapsed() > self.timeout {
                        return Err(DetectClientError::Timeout(self.timeout));
                    }
                }
                Err(e) => return Err(DetectClientError::RecvError(e)),
            }
        };

        debug!(
            "Detector responded in {:.03} s",
            start.elapsed().as_secs_f64()
        );

        serde_json::from_str(&response_str).map_err(DetectClientError::DeserializeError)
    }
}

impl ObjectDetector for DetectClient {
    fn detect(&mut self, image: &[u8], label: &str) -> Result<Option<NormBox>, DetectClientError> {
        self.request(&DetectRequest::new(label, image))
            .map(|r| r.first())
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
