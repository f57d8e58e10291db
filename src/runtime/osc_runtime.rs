//! OSC bridge to an external pattern evaluator
//!
//! Sends programs over UDP and waits for the evaluator to acknowledge them.
//! Protocol:
//! - `/loopdeck/eval ,siii program reset_all hush_first id` → reply required
//! - `/loopdeck/preload ,si url id` → reply required
//! - `/loopdeck/stop` and `/loopdeck/cps ,f cps` → fire and forget
//!
//! Replies are `/loopdeck/ok ,i id` or `/loopdeck/error ,is id message`, where
//! `id` echoes the request's last argument. A reply carrying any other id
//! answers a request that already timed out and is discarded.

use super::EvalRuntime;
use crate::error::SessionResult;
use rosc::{OscMessage, OscPacket, OscType};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub const EVAL_ADDR: &str = "/loopdeck/eval";
pub const PRELOAD_ADDR: &str = "/loopdeck/preload";
pub const STOP_ADDR: &str = "/loopdeck/stop";
pub const CPS_ADDR: &str = "/loopdeck/cps";
pub const OK_ADDR: &str = "/loopdeck/ok";
pub const ERROR_ADDR: &str = "/loopdeck/error";

/// Runtime that talks to an evaluator process over OSC
pub struct OscRuntime {
    socket: UdpSocket,
    target: SocketAddr,
    reply_timeout: Duration,
    /// Id of the next request; holding it serializes exchanges
    next_request: Mutex<i32>,
}

impl OscRuntime {
    /// Bind a local socket and point it at the evaluator
    pub async fn connect(host: &str, port: u16, reply_timeout: Duration) -> SessionResult<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect((host, port)).await?;
        let target = socket.peer_addr()?;
        info!("OSC runtime targeting {}", target);

        Ok(Self {
            socket,
            target,
            reply_timeout,
            next_request: Mutex::new(1),
        })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    fn encode(addr: &str, args: Vec<OscType>) -> Result<Vec<u8>, String> {
        rosc::encoder::encode(&OscPacket::Message(OscMessage {
            addr: addr.to_string(),
            args,
        }))
        .map_err(|e| format!("failed to encode {}: {}", addr, e))
    }

    /// Send without waiting for a reply
    fn send_now(&self, addr: &str, args: Vec<OscType>) -> Result<(), String> {
        let bytes = Self::encode(addr, args)?;
        self.socket
            .try_send(&bytes)
            .map(|_| ())
            .map_err(|e| format!("failed to send {} to {}: {}", addr, self.target, e))
    }

    /// Send and wait for `/loopdeck/ok` or `/loopdeck/error`
    async fn request(&self, addr: &str, mut args: Vec<OscType>) -> Result<(), String> {
        let mut next_request = self.next_request.lock().await;
        let id = *next_request;
        *next_request = next_request.wrapping_add(1);
        args.push(OscType::Int(id));

        let bytes = Self::encode(addr, args)?;
        self.socket
            .send(&bytes)
            .await
            .map_err(|e| format!("failed to send {} to {}: {}", addr, self.target, e))?;
        debug!("Sent {} #{} ({} bytes)", addr, id, bytes.len());

        let deadline = Instant::now() + self.reply_timeout;
        let mut buf = vec![0u8; 65536];

        loop {
            let size = match tokio::time::timeout_at(deadline, self.socket.recv(&mut buf)).await {
                Err(_) => {
                    return Err(format!(
                        "no reply to {} from {} within {:?}",
                        addr, self.target, self.reply_timeout
                    ))
                }
                Ok(Err(e)) => return Err(format!("evaluator unreachable: {}", e)),
                Ok(Ok(size)) => size,
            };

            match rosc::decoder::decode_udp(&buf[..size]) {
                Ok((_remaining, packet)) => {
                    if let Some(result) = Self::reply_result(packet, id) {
                        return result;
                    }
                }
                Err(e) => warn!("Failed to decode reply: {}", e),
            }
        }
    }

    /// Interpret a reply packet for request `id`; `None` for anything else
    fn reply_result(packet: OscPacket, id: i32) -> Option<Result<(), String>> {
        match packet {
            OscPacket::Message(msg) => {
                if msg.addr != OK_ADDR && msg.addr != ERROR_ADDR {
                    debug!("Ignoring OSC message {}", msg.addr);
                    return None;
                }
                match msg.args.first() {
                    Some(OscType::Int(reply_id)) if *reply_id == id => {}
                    other => {
                        debug!("Discarding {} for another request ({:?})", msg.addr, other);
                        return None;
                    }
                }
                if msg.addr == OK_ADDR {
                    return Some(Ok(()));
                }
                let message = match msg.args.get(1) {
                    Some(OscType::String(text)) => text.clone(),
                    _ => "evaluator reported an error".to_string(),
                };
                Some(Err(message))
            }
            OscPacket::Bundle(bundle) => bundle
                .content
                .into_iter()
                .find_map(|p| Self::reply_result(p, id)),
        }
    }
}

impl EvalRuntime for OscRuntime {
    async fn evaluate(&self, program: &str, reset_all: bool, hush_first: bool) -> Result<(), String> {
        self.request(
            EVAL_ADDR,
            vec![
                OscType::String(program.to_string()),
                OscType::Int(reset_all as i32),
                OscType::Int(hush_first as i32),
            ],
        )
        .await
    }

    fn stop(&self) -> Result<(), String> {
        self.send_now(STOP_ADDR, vec![])
    }

    fn set_tempo(&self, cps: f64) -> Result<(), String> {
        self.send_now(CPS_ADDR, vec![OscType::Float(cps as f32)])
    }

    async fn preload_sample(&self, url: &str) -> Result<(), String> {
        self.request(PRELOAD_ADDR, vec![OscType::String(url.to_string())])
            .await
    }
}
