//! Secure Echo
//!
//! Listener and dialer for the encrypted echo channel.

mod cli;

use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;
use net_transport::{ChannelConfig, EchoServer, dial_with_config};
use tokio::net::TcpListener;
use tracing::{info, warn};

use cli::{Args, Mode};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout carries only the echoed message
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("secure_echo=info".parse()?)
                .add_directive("net_transport=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = args.channel_config();
    config.validate()?;

    match args.mode()? {
        Mode::Listen { port } => run_server(port, config).await,
        Mode::Send {
            host,
            port,
            message,
        } => run_client(&host, port, &message, &config).await,
    }
}

async fn run_server(port: u16, config: ChannelConfig) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to listen on {addr}"))?;

    info!("Starting secure echo server on {}", addr);

    EchoServer::new(config)
        .serve_with_shutdown(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Cannot listen for Ctrl-C, running until killed");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    Ok(())
}

async fn run_client(
    host: &str,
    port: u16,
    message: &str,
    config: &ChannelConfig,
) -> anyhow::Result<()> {
    let addr = format!("{host}:{port}");
    let mut conn = dial_with_config(addr.as_str(), config)
        .await
        .with_context(|| format!("failed to open a secure channel to {addr}"))?;

    conn.write(message.as_bytes()).await?;

    let echoed = conn
        .read_frame()
        .await?
        .context("server closed the connection before echoing")?;
    println!("{}", String::from_utf8_lossy(&echoed));

    conn.shutdown().await?;

    Ok(())
}
