//! Standalone RTSP server binary.
//!
//! Encoder capture (camera/microphone, H.265/AAC encoding) is outside
//! this crate's scope: this binary only owns the RTSP
//! listener and the two encoder taps producers feed into. Wire a real
//! `VideoEncoderTap`/`AudioEncoderTap` producer in to actually stream
//! anything; as shipped this just keeps the server listening so SETUP/
//! PLAY can be exercised against it.

use std::io;
use std::net::IpAddr;

use clap::Parser;
use rtsp::{RtspServer, ServerConfig};

#[derive(Parser)]
#[command(name = "rtsp-server", about = "Standalone RTSP server for H.265/AAC streams")]
struct Args {
    /// Address to bind the RTSP listener to.
    #[arg(long, default_value = "0.0.0.0")]
    address: IpAddr,

    /// TCP port to bind.
    #[arg(long, short, default_value_t = rtsp::config::RTSP_PORT)]
    port: u16,

    /// Disable the video track.
    #[arg(long)]
    no_video: bool,

    /// Disable the audio track.
    #[arg(long)]
    no_audio: bool,
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let config = ServerConfig {
        port: args.port,
        bind_addr: args.address,
        ..ServerConfig::default()
    };

    let server = RtspServer::new(config, !args.no_video, !args.no_audio);

    if let Err(err) = server.start() {
        eprintln!("failed to start RTSP server: {err}");
        std::process::exit(1);
    }

    let addr = server
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| format!("{}:{}", args.address, args.port));
    println!("RTSP server listening on {addr} — press Enter to stop");

    let mut input = String::new();
    let _ = io::stdin().read_line(&mut input);

    server.stop();
}
