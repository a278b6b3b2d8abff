//! Command line arguments

use std::time::Duration;

use anyhow::bail;
use clap::Parser;
use net_transport::{ChannelConfig, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_MAX_FRAME_SIZE};

#[derive(Parser, Debug)]
#[command(name = "secure-echo")]
#[command(about = "Encrypted echo over TCP: `-l <port>` to listen, `<port> <message>` to send")]
pub struct Args {
    /// Listen mode. Specify port
    #[arg(short = 'l', value_name = "PORT", conflicts_with_all = ["port", "message"])]
    pub listen: Option<u16>,

    /// Port of the echo server to send to
    #[arg(required_unless_present = "listen")]
    pub port: Option<u16>,

    /// Message to send and read back
    #[arg(required_unless_present = "listen")]
    pub message: Option<String>,

    /// Host to dial in client mode
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Maximum plaintext bytes per frame
    #[arg(long, env = "SECURE_ECHO_MAX_FRAME_SIZE", default_value_t = DEFAULT_MAX_FRAME_SIZE)]
    pub max_frame_size: usize,

    /// Public key exchange timeout in milliseconds
    #[arg(
        long,
        env = "SECURE_ECHO_HANDSHAKE_TIMEOUT_MS",
        default_value_t = DEFAULT_HANDSHAKE_TIMEOUT.as_millis() as u64
    )]
    pub handshake_timeout_ms: u64,
}

/// What the process was asked to do
#[derive(Debug, PartialEq, Eq)]
pub enum Mode {
    Listen { port: u16 },
    Send { host: String, port: u16, message: String },
}

impl Args {
    pub fn mode(&self) -> anyhow::Result<Mode> {
        match (self.listen, self.port, &self.message) {
            (Some(port), _, _) => Ok(Mode::Listen { port }),
            (None, Some(port), Some(message)) => Ok(Mode::Send {
                host: self.host.clone(),
                port,
                message: message.clone(),
            }),
            _ => bail!("Usage: secure-echo <port> <message> | secure-echo -l <port>"),
        }
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig::default()
            .with_max_frame_size(self.max_frame_size)
            .with_handshake_timeout(Duration::from_millis(self.handshake_timeout_ms))
    }
}
