//! OSC sniffer for debugging
//!
//! Listens on VRChat's OSC output port and prints every packet, decoded when
//! possible and as hex otherwise.

use anyhow::{Context, Result};
use colored::*;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::net::UdpSocket;

use crate::osc::{decode_packet, format_hex, OscArg, OscMessage};

/// Largest datagram we expect from VRChat
const MAX_PACKET: usize = 8 * 1024;

/// Listen on `host:port` until Ctrl+C
pub async fn run_osc_sniffer(host: &str, port: u16) -> Result<()> {
    let socket = UdpSocket::bind((host, port))
        .await
        .with_context(|| format!("Failed to bind OSC sniffer on {}:{}", host, port))?;

    println!("{}", "=== OSC Sniffer ===".bold().cyan());
    println!("Listening on {}", socket.local_addr()?.to_string().bright_white());
    println!("Press Ctrl+C to exit\n");
    println!(
        "{}",
        "Format: [timestamp] FROM | ADDRESS ARGS".dimmed()
    );
    println!("{}\n", "─".repeat(80).dimmed());

    let start = Instant::now();
    let mut buf = vec![0u8; MAX_PACKET];

    loop {
        tokio::select! {
            received = socket.recv_from(&mut buf) => {
                let (len, from) = received.context("OSC sniffer receive failed")?;
                print_packet(start.elapsed().as_millis(), from, &buf[..len]);
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    println!("\n{}", "Sniffer stopped".yellow());
    Ok(())
}

fn print_packet(timestamp_ms: u128, from: SocketAddr, data: &[u8]) {
    let timestamp = format!("{:08}", timestamp_ms);

    match decode_packet(data) {
        Ok(messages) => {
            for msg in messages {
                println!(
                    "[{}ms] {:21} | {}",
                    timestamp.dimmed(),
                    from.to_string().white(),
                    colorize(&msg)
                );
            }
        }
        Err(e) => {
            println!(
                "[{}ms] {:21} | {} {}",
                timestamp.dimmed(),
                from.to_string().white(),
                format_hex(data).bright_black(),
                format!("({})", e).red()
            );
        }
    }
}

fn colorize(msg: &OscMessage) -> String {
    let address = if msg.address.starts_with("/chatbox") {
        msg.address.bright_magenta()
    } else if msg.address.starts_with("/avatar") {
        msg.address.bright_cyan()
    } else {
        msg.address.bright_blue()
    };

    let args: Vec<String> = msg
        .args
        .iter()
        .map(|arg| match arg {
            OscArg::Str(_) => arg.to_string().bright_green().to_string(),
            OscArg::Bool(true) => arg.to_string().green().to_string(),
            OscArg::Bool(false) => arg.to_string().red().to_string(),
            OscArg::Int(_) | OscArg::Float(_) => arg.to_string().bright_yellow().to_string(),
        })
        .collect();

    if args.is_empty() {
        address.to_string()
    } else {
        format!("{} {}", address, args.join(" "))
    }
}
