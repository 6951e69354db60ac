//! Blocking TCP listener.
//!
//! Yields accepted connections one at a time, in the order the kernel hands
//! them over. Each `accept` blocks the calling thread.

use crate::connection::Connection;
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};

const LISTEN_BACKLOG: i32 = 1024;

pub struct Listener {
    inner: TcpListener,
    next_id: u64,
}

impl Listener {
    /// Bind a blocking listener on `addr`.
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = socket2::Socket::new(
            match addr {
                SocketAddr::V4(_) => socket2::Domain::IPV4,
                SocketAddr::V6(_) => socket2::Domain::IPV6,
            },
            socket2::Type::STREAM,
            Some(socket2::Protocol::TCP),
        )?;

        socket.set_reuse_address(true)?;
        socket.set_nonblocking(false)?;
        socket.bind(&addr.into())?;
        socket.listen(LISTEN_BACKLOG)?;

        Ok(Self {
            inner: socket.into(),
            next_id: 0,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// Block until the next client connects.
    pub fn accept(&mut self) -> io::Result<Connection<TcpStream>> {
        let (stream, _) = self.inner.accept()?;
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        Ok(Connection::new(stream, id))
    }

    /// Endless sequence of accept results. Never yields `None`.
    pub fn incoming(&mut self) -> Incoming<'_> {
        Incoming { listener: self }
    }
}

/// Iterator returned by [`Listener::incoming`].
pub struct Incoming<'a> {
    listener: &'a mut Listener,
}

impl Iterator for Incoming<'_> {
    type Item = io::Result<Connection<TcpStream>>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.listener.accept())
    }
}
