//! Simple detector server test
//!
//! Answers every detection request with a centred box which grows on each request, imitating a
//! vehicle closing in on its target. Useful for exercising the navigation executable without a
//! real detector.

use comms_if::{
    eqpt::detect::{DetectRequest, DetectResponse, NormBox},
    net::{MonitoredSocket, SocketOptions},
};

/// Half-size of the box on the first request
const START_HALF_SIZE: f64 = 0.05;

/// Growth of the half-size per request
const HALF_SIZE_STEP: f64 = 0.03;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let endpoint = std::env::args()
        .nth(1)
        .unwrap_or_else(|| String::from("tcp://*:5010"));

    let ctx = zmq::Context::new();

    let socket_options = SocketOptions {
        bind: true,
        ..Default::default()
    };

    let socket = MonitoredSocket::new(&ctx, zmq::REP, socket_options, &endpoint)?;

    println!("Detector server running on {}", endpoint);

    let mut half_size = START_HALF_SIZE;

    loop {
        let msg = socket.recv_msg(0)?;

        let response = match msg.as_str().map(serde_json::from_str::<DetectRequest>) {
            Some(Ok(req)) => {
                let image_len = req.image_bytes().map(|b| b.len()).unwrap_or(0);
                println!(
                    "Request for \"{}\" ({} byte {} image), half size {:.2}",
                    req.label, image_len, req.format, half_size
                );

                let h = half_size.min(0.5);
                half_size += HALF_SIZE_STEP;

                DetectResponse {
                    boxes: vec![NormBox {
                        x_min: 0.5 - h,
                        y_min: 0.5 - h,
                        x_max: 0.5 + h,
                        y_max: 0.5 + h,
                    }],
                }
            }
            Some(Err(e)) => {
                println!("Invalid request: {}", e);
                DetectResponse::default()
            }
            None => {
                println!("Received non UTF-8 request");
                DetectResponse::default()
            }
        };

        socket.send(&serde_json::to_string(&response)?, 0)?;
    }
}
