use core::future::Future;
use core::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite};

/// Source of inbound stream connections
pub trait Accept {
    /// Outgoing byte stream
    type Outgoing: AsyncWrite + Send + Unpin + 'static;

    /// Incoming byte stream
    type Incoming: AsyncRead + Send + Unpin + 'static;

    /// Waits for the next connection and returns the peer address, if known, along with both
    /// halves of the stream
    fn accept(
        &self,
    ) -> impl Future<Output = std::io::Result<(Option<SocketAddr>, Self::Outgoing, Self::Incoming)>>
           + Send;
}

impl<T: Accept + Sync> Accept for &T {
    type Outgoing = T::Outgoing;
    type Incoming = T::Incoming;

    fn accept(
        &self,
    ) -> impl Future<Output = std::io::Result<(Option<SocketAddr>, Self::Outgoing, Self::Incoming)>>
           + Send {
        (**self).accept()
    }
}
