use core::net::{Ipv6Addr, SocketAddr};

use std::path::PathBuf;

use anyhow::Context;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::Instrument as _;
use wirecall_transport::cipher::KEY_MATERIAL_LEN;
use wirecall_transport::Server;

pub mod human;

pub async fn free_port() -> anyhow::Result<u16> {
    TcpListener::bind((Ipv6Addr::LOCALHOST, 0))
        .await
        .context("failed to start TCP listener")?
        .local_addr()
        .context("failed to query listener local address")
        .map(|v| v.port())
}

/// Writes key material to a fresh temporary directory and returns the directory along with the
/// key file path.
///
/// The file is removed once the directory is dropped.
pub fn key_file() -> anyhow::Result<(TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("failed to create temporary directory")?;
    let path = dir.path().join("wirecall.key");
    let material: Vec<u8> = (0..KEY_MATERIAL_LEN)
        .map(|i| (i as u8).wrapping_mul(37).wrapping_add(11))
        .collect();
    std::fs::write(&path, material).context("failed to write key material")?;
    Ok((dir, path))
}

/// Binds a TCP listener on the IPv6 loopback and runs the accept loop of `srv` on a spawned task
pub async fn listen(srv: &Server) -> anyhow::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind((Ipv6Addr::LOCALHOST, 0))
        .await
        .context("failed to start TCP listener")?;
    let addr = listener
        .local_addr()
        .context("failed to query listener local address")?;
    let srv = srv.clone();
    let task = tokio::spawn(async move { srv.accept_loop(listener).await }.in_current_span());
    Ok((addr, task))
}
