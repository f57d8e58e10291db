//! OSC control listener
//!
//! Lets controllers and other programs drive the session over UDP.
//! Handles: /play, /solo, /stop, /stopall, /hush, /tempo, /param, /eval, /step

use crate::command::SessionCommand;
use rosc::{OscMessage, OscPacket, OscType};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Receives OSC messages and forwards them as session commands
pub struct OscControlServer {
    socket: UdpSocket,
    command_sender: mpsc::Sender<SessionCommand>,
}

impl OscControlServer {
    /// Bind the listener; commands arrive on the returned receiver
    pub async fn bind(
        port: u16,
    ) -> std::io::Result<(Self, mpsc::Receiver<SessionCommand>)> {
        let socket = UdpSocket::bind(("0.0.0.0", port)).await?;
        let (tx, rx) = mpsc::channel(64);
        info!("🎛️  OSC control listening on {}", socket.local_addr()?);

        Ok((
            Self {
                socket,
                command_sender: tx,
            },
            rx,
        ))
    }

    pub fn local_port(&self) -> std::io::Result<u16> {
        Ok(self.socket.local_addr()?.port())
    }

    /// Receive until the command receiver is dropped
    pub async fn run(self) {
        let mut buf = vec![0u8; 65536];

        loop {
            let (size, addr) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    error!("Socket error: {}", e);
                    continue;
                }
            };
            debug!("Received {} bytes from {}", size, addr);

            let packet = match rosc::decoder::decode_udp(&buf[..size]) {
                Ok((_remaining, packet)) => packet,
                Err(e) => {
                    error!("Failed to decode OSC packet: {}", e);
                    continue;
                }
            };

            for command in Self::handle_packet(packet) {
                if self.command_sender.send(command).await.is_err() {
                    info!("Command receiver closed, stopping OSC control");
                    return;
                }
            }
        }
    }

    /// Commands carried by a packet; bundles are processed in order
    fn handle_packet(packet: OscPacket) -> Vec<SessionCommand> {
        match packet {
            OscPacket::Message(msg) => Self::handle_message(msg).into_iter().collect(),
            OscPacket::Bundle(bundle) => bundle
                .content
                .into_iter()
                .flat_map(Self::handle_packet)
                .collect(),
        }
    }

    /// Handle OSC message
    fn handle_message(msg: OscMessage) -> Option<SessionCommand> {
        debug!("OSC message: {} with {} args", msg.addr, msg.args.len());

        let command = match msg.addr.as_str() {
            "/play" | "/solo" => {
                let exclusive = msg.addr == "/solo" || int_arg(&msg.args, 1).unwrap_or(0) != 0;
                string_arg(&msg.args, 0).map(|id| SessionCommand::Play { id, exclusive })
            }
            "/stop" => string_arg(&msg.args, 0).map(|id| SessionCommand::Stop { id }),
            "/stopall" => Some(SessionCommand::StopAll),
            "/hush" => Some(SessionCommand::Hush),
            "/tempo" => float_arg(&msg.args, 0).map(|percent| SessionCommand::Tempo { percent }),
            "/param" => match (
                string_arg(&msg.args, 0),
                int_arg(&msg.args, 1),
                float_arg(&msg.args, 2),
            ) {
                (Some(id), Some(index), Some(value)) if index >= 0 => Some(SessionCommand::Param {
                    id,
                    index: index as usize,
                    value,
                }),
                _ => None,
            },
            "/step" => match (string_arg(&msg.args, 0), int_arg(&msg.args, 1)) {
                (Some(id), Some(index)) if index >= 0 => Some(SessionCommand::Step {
                    id,
                    index: index as usize,
                }),
                _ => None,
            },
            "/eval" => match (string_arg(&msg.args, 0), string_arg(&msg.args, 1)) {
                (Some(id), Some(code)) => {
                    info!("📝 /eval {}: {} chars", id, code.len());
                    Some(SessionCommand::Eval { id, code })
                }
                _ => None,
            },
            _ => {
                debug!("Unknown OSC address: {}", msg.addr);
                return None;
            }
        };

        if command.is_none() {
            warn!("{} has missing or mistyped arguments", msg.addr);
        }
        command
    }
}

fn string_arg(args: &[OscType], index: usize) -> Option<String> {
    match args.get(index) {
        Some(OscType::String(s)) => Some(s.clone()),
        _ => None,
    }
}

fn int_arg(args: &[OscType], index: usize) -> Option<i64> {
    match args.get(index) {
        Some(OscType::Int(i)) => Some(*i as i64),
        Some(OscType::Long(i)) => Some(*i),
        Some(OscType::Bool(b)) => Some(*b as i64),
        _ => None,
    }
}

fn float_arg(args: &[OscType], index: usize) -> Option<f64> {
    match args.get(index) {
        Some(OscType::Float(f)) => Some(*f as f64),
        Some(OscType::Double(d)) => Some(*d),
        Some(OscType::Int(i)) => Some(*i as f64),
        _ => None,
    }
}
