//! TCP transport

use core::net::SocketAddr;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tracing::{instrument, trace};

use crate::frame::Accept;

impl Accept for TcpListener {
    type Outgoing = OwnedWriteHalf;
    type Incoming = OwnedReadHalf;

    #[instrument(level = "trace", skip_all)]
    async fn accept(
        &self,
    ) -> std::io::Result<(Option<SocketAddr>, Self::Outgoing, Self::Incoming)> {
        let (stream, addr) = TcpListener::accept(self).await?;
        trace!(?addr, "accepted stream");
        if let Err(err) = stream.set_nodelay(true) {
            trace!(?err, "failed to disable Nagle's algorithm");
        }
        let (rx, tx) = stream.into_split();
        Ok((Some(addr), tx, rx))
    }
}
