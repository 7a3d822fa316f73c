//! Capture-boundary fast path: a non-blocking socket used to pull frames
//! off the tapped interface. Exposes only `recv` -- this is a passive
//! observer with no egress in scope, so the zero-copy send path the
//! teacher's version carried has no caller here.

#[cfg(unix)]
use std::io;
#[cfg(unix)]
use std::net::SocketAddr;

#[cfg(unix)]
use socket2::{Domain, Socket, Type};

#[cfg(unix)]
pub struct XdpSocket {
    socket: std::net::UdpSocket,
}

#[cfg(unix)]
impl XdpSocket {
    /// Binds a non-blocking receive socket at `bind_addr`. A real AF_XDP
    /// ring would attach to an interface name instead; this keeps the same
    /// call shape so `OptimizationManager` can fall back to it uniformly.
    ///
    /// Built through `socket2` rather than `std::net::UdpSocket::bind`
    /// directly so `SO_REUSEADDR` can be set before binding: a restarted
    /// observer re-taps the same interface address immediately instead of
    /// waiting out the previous socket's TIME_WAIT-style lingering state.
    pub fn new(bind_addr: SocketAddr) -> io::Result<Self> {
        let domain = if bind_addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
        let socket2 = Socket::new(domain, Type::DGRAM, None)?;
        socket2.set_reuse_address(true)?;
        socket2.set_nonblocking(true)?;
        socket2.bind(&bind_addr.into())?;
        Ok(Self { socket: socket2.into() })
    }

    pub fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.socket.recv(buf)
    }
}

#[cfg(not(unix))]
pub struct XdpSocket;

#[cfg(not(unix))]
impl XdpSocket {
    pub fn new(_bind: std::net::SocketAddr) -> std::io::Result<Self> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            "XDP sockets not supported",
        ))
    }

    pub fn recv(&self, _buf: &mut [u8]) -> std::io::Result<usize> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            "XDP sockets not supported",
        ))
    }
}

impl XdpSocket {
    /// Checks if XDP sockets are supported on the current platform.
    pub fn is_supported() -> bool {
        cfg!(target_os = "linux")
    }
}
