//! # Command line orchestrator
//!
//! Interactive stand-in for the mission orchestrator. Binds the orchestrator endpoint, sends the
//! commands typed at the prompt to the navigation executable and prints everything it reports.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use color_eyre::{eyre::WrapErr, Report};
use rustyline::{error::ReadlineError, DefaultEditor};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{channel, Receiver, TryRecvError},
        Arc,
    },
    thread,
};
use structopt::StructOpt;

use comms_if::{
    net::{zmq, MonitoredSocket, SocketOptions},
    orch::OrchMsg,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

const PROMPT: &str = "Orch $ ";
const HISTORY_PATH: &str = "data/orch_history.txt";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "command_line_orch", about = "Command line mission orchestrator")]
struct Opts {
    /// Endpoint to bind for the navigation executable to connect to
    #[structopt(short, long, default_value = "tcp://*:5020")]
    endpoint: String,
}

/// Commands accepted at the prompt.
#[derive(Debug, StructOpt)]
#[structopt(name = "orch")]
enum Cmd {
    /// Start a mission towards the object with the given label
    Start { label: Vec<String> },

    /// Stop the running mission
    Stop,

    /// Send a raw vehicle command, e.g. `cmd forward 50`
    Cmd { raw: Vec<String> },

    /// Exit the orchestrator
    Exit,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let opts = Opts::from_args();

    // ---- NETWORK ----

    let ctx = zmq::Context::new();
    let socket = MonitoredSocket::new(
        &ctx,
        zmq::DEALER,
        SocketOptions {
            bind: true,
            heartbeat_ivl: 500,
            heartbeat_ttl: 1000,
            heartbeat_timeout: 1000,
            linger: 1,
            recv_timeout: 50,
            send_timeout: 10,
            ..Default::default()
        },
        &opts.endpoint,
    )
    .wrap_err("Failed to bind the orchestrator socket")?;

    println!("Listening on {}", opts.endpoint);

    let (tx, rx) = channel();
    let shutdown = Arc::new(AtomicBool::new(false));
    let socket_thread = {
        let shutdown = shutdown.clone();
        thread::spawn(move || socket_thread(socket, rx, shutdown))
    };

    // ---- PROMPT ----

    let mut rl = DefaultEditor::new().wrap_err("Failed to create the line editor")?;
    if rl.load_history(HISTORY_PATH).is_err() {
        println!("No history detected");
    }

    loop {
        let line = match rl.readline(PROMPT) {
            Ok(l) => l,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                println!("Unhandled Error: {:?}", e);
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }
        rl.add_history_entry(line.as_str()).ok();

        let cmd = match Cmd::from_iter_safe(std::iter::once("orch").chain(line.split_whitespace()))
        {
            Ok(c) => c,
            Err(e) => {
                println!("{}", e.message);
                continue;
            }
        };

        let msg = match cmd {
            Cmd::Start { label } => OrchMsg::StartMission(label.join(" ")),
            Cmd::Stop => OrchMsg::StopMission,
            Cmd::Cmd { raw } => OrchMsg::Command(raw.join(" ")),
            Cmd::Exit => break,
        };

        if tx.send(msg).is_err() {
            println!("Socket thread has stopped");
            break;
        }
    }

    if let Err(e) = rl.save_history(HISTORY_PATH) {
        println!("Could not save history: {}", e);
    }

    println!("Exiting...");
    shutdown.store(true, Ordering::Relaxed);
    socket_thread.join().ok();

    Ok(())
}

fn socket_thread(socket: MonitoredSocket, rx: Receiver<OrchMsg>, shutdown: Arc<AtomicBool>) {
    let mut was_connected = false;

    while !shutdown.load(Ordering::Relaxed) {
        let connected = socket.connected();
        if connected != was_connected {
            match connected {
                true => println!("\nNavigation executable connected"),
                false => println!("\nNavigation executable disconnected"),
            }
            was_connected = connected;
        }

        loop {
            match rx.try_recv() {
                Ok(msg) => match msg.to_json() {
                    Ok(s) => {
                        if let Err(e) = socket.send(&s, 0) {
                            println!("Could not send {:?}: {}", msg, e);
                        }
                    }
                    Err(e) => println!("Could not serialise {:?}: {}", msg, e),
                },
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return,
            }
        }

        match socket.recv_string(0) {
            Ok(Ok(s)) => match OrchMsg::from_json(&s) {
                Ok(msg) => print_msg(&msg),
                Err(e) => println!("Invalid message: {}", e),
            },
            Ok(Err(_)) => println!("Received a message which was not valid UTF-8"),
            Err(zmq::Error::EAGAIN) => (),
            Err(e) => println!("Receive error: {}", e),
        }
    }
}

fn print_msg(msg: &OrchMsg) {
    match msg {
        OrchMsg::Response(r) => println!("< {}", r),
        OrchMsg::Detection(d) => {
            let found = match d.detection.object_box {
                Some(b) => format!(
                    "box ({:.0}, {:.0}, {:.0}, {:.0}) covering {}%",
                    b.x_min, b.y_min, b.x_max, b.y_max, d.detection.coverage_percent
                ),
                None => String::from("target not found"),
            };
            let telem = match d.telemetry {
                Some(t) => serde_json::to_string(&t).unwrap_or_default(),
                None => String::from("no telemetry"),
            };
            println!(
                "< cycle {}: {}, command {}, {}",
                d.cycle_count,
                found,
                d.command.as_deref().unwrap_or("none"),
                telem
            );
        }
        OrchMsg::Complete(c) => println!(
            "< mission towards \"{}\" complete after {} cycles",
            c.target, c.cycle_count
        ),
        m => println!("< unexpected {:?}", m),
    }
}
