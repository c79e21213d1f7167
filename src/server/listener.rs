use std::time::Duration;

use anyhow::Context;
use tokio::time::{self, MissedTickBehavior};
use tracing::info;

use crate::config::Config;
use crate::fs::{DirFileSystem, FileSystem};
use crate::server::engine::Server;
use crate::server::transport::{TcpTransport, Transport};

/// Drives `server` from a tokio interval, one step per tick.
///
/// Never returns on its own; drop the future to stop.
pub async fn serve<T: Transport, F: FileSystem>(server: &mut Server<T, F>) -> anyhow::Result<()> {
    let mut ticker = time::interval(Duration::from_millis(server.config().tick_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        server.step();
    }
}

pub async fn run(cfg: &Config) -> anyhow::Result<()> {
    let transport = TcpTransport::bind(&cfg.address())?;
    let addr = transport.local_addr().context("listener has no local address")?;
    info!("Listening on {}", addr);
    info!("Serving {}", cfg.doc_root.display());

    let fs = DirFileSystem::new(&cfg.doc_root);
    let mut server = Server::new(cfg.clone(), transport, fs);
    serve(&mut server).await
}
