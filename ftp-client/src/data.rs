//! ## DATA CHANNEL
//!
//! Sets up and tears down the transient TCP endpoint used by one transfer.
//! Passive mode dials a server-supplied endpoint (from PASV); active mode
//! binds a local listening socket and waits for the server to connect
//! (for a PORT command). The data channel is single-use: after [close],
//! a fresh [setup_passive]/[setup_active] call is required before the
//! next transfer.
//!
//! [close]:          DataChannel::close
//! [setup_passive]:  DataChannel::setup_passive
//! [setup_active]:   DataChannel::setup_active

use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use crate::config::TRANSFER_CHUNK_SIZE;
use crate::error::FtpError;

enum Mode {
    Unconfigured,
    Passive { addr: SocketAddr },
    Active { listener: TcpListener },
    Connected(TcpStream),
}

/// ## DATA CHANNEL
///
/// Not `Sync` with itself in the sense of allowing concurrent transfers —
/// the transfer engine's concurrency slot already guarantees only one
/// worker ever touches a given [DataChannel] at a time, so this type uses
/// plain interior state rather than its own lock.
pub struct DataChannel {
    mode: Mode,
}

impl Default for DataChannel {
    fn default() -> Self {
        Self {
            mode: Mode::Unconfigured,
        }
    }
}

impl DataChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the server-supplied passive-mode endpoint from a PASV reply.
    pub fn setup_passive(&mut self, host: &str, port: u16) -> Result<(), FtpError> {
        let addr = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(ErrorKind::AddrNotAvailable, "no address resolved"))?;
        self.mode = Mode::Passive { addr };
        Ok(())
    }

    /// Binds a listening socket with address reuse enabled (`local_port`
    /// `0` requests an ephemeral port) and returns the actually-bound
    /// `(host, port)` so the caller can emit a matching PORT argument.
    pub fn setup_active(
        &mut self,
        local_host: &str,
        local_port: u16,
    ) -> Result<(String, u16), FtpError> {
        let bind_addr = (local_host, local_port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(ErrorKind::AddrNotAvailable, "no address resolved"))?;
        let listener = bind_reuseaddr(bind_addr)?;
        let bound = listener.local_addr()?;
        self.mode = Mode::Active { listener };
        Ok((bound.ip().to_string(), bound.port()))
    }

    /// Dials the recorded passive endpoint, or accepts the single
    /// incoming connection expected in active mode.
    pub fn connect(&mut self, timeout: Duration) -> Result<(), FtpError> {
        match std::mem::replace(&mut self.mode, Mode::Unconfigured) {
            Mode::Passive { addr } => {
                let stream = TcpStream::connect_timeout(&addr, timeout)
                    .map_err(crate::error::TransferError::DataConnect)?;
                self.mode = Mode::Connected(stream);
                Ok(())
            }
            Mode::Active { listener } => {
                listener.set_nonblocking(false)?;
                let (stream, _) = listener
                    .accept()
                    .map_err(crate::error::TransferError::DataConnect)?;
                self.mode = Mode::Connected(stream);
                Ok(())
            }
            Mode::Unconfigured | Mode::Connected(_) => {
                Err(FtpError::Sequence("data channel not set up for this transfer"))
            }
        }
    }

    /// Reads up to `TRANSFER_CHUNK_SIZE` bytes. Returns an empty `Vec` at
    /// end-of-stream (the peer closed the connection).
    pub fn recv_chunk(&mut self) -> Result<Vec<u8>, io::Error> {
        let stream = self.connected_mut()?;
        let mut buf = vec![0u8; TRANSFER_CHUNK_SIZE];
        let n = stream.read(&mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Reads until the peer closes the connection.
    pub fn recv_all(&mut self) -> Result<Vec<u8>, io::Error> {
        let stream = self.connected_mut()?;
        let mut data = Vec::new();
        stream.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Writes exactly `bytes`.
    pub fn send(&mut self, bytes: &[u8]) -> Result<(), io::Error> {
        let stream = self.connected_mut()?;
        stream.write_all(bytes)
    }

    /// Tears down the peer socket and, in active mode, the listening
    /// socket. After this call the data channel requires a fresh
    /// `setup_passive`/`setup_active` before the next transfer.
    pub fn close(&mut self) {
        match std::mem::replace(&mut self.mode, Mode::Unconfigured) {
            Mode::Connected(stream) => {
                let _ = stream.shutdown(Shutdown::Both);
            }
            Mode::Active { listener } => drop(listener),
            Mode::Passive { .. } | Mode::Unconfigured => {}
        }
    }

    fn connected_mut(&mut self) -> Result<&mut TcpStream, io::Error> {
        match &mut self.mode {
            Mode::Connected(stream) => Ok(stream),
            _ => Err(io::Error::new(
                ErrorKind::NotConnected,
                "data channel not connected",
            )),
        }
    }
}

fn bind_reuseaddr(addr: SocketAddr) -> io::Result<TcpListener> {
    let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(128)?;
    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn passive_mode_round_trips_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(b"hello").unwrap();
            stream.shutdown(Shutdown::Write).unwrap();
        });

        let mut channel = DataChannel::new();
        channel.setup_passive("127.0.0.1", port).unwrap();
        channel.connect(Duration::from_secs(2)).unwrap();
        let data = channel.recv_all().unwrap();
        assert_eq!(data, b"hello");
        channel.close();
        server.join().unwrap();
    }

    #[test]
    fn active_mode_binds_and_accepts() {
        let mut channel = DataChannel::new();
        let (host, port) = channel.setup_active("127.0.0.1", 0).unwrap();
        assert_eq!(host, "127.0.0.1");
        assert_ne!(port, 0);

        let client = thread::spawn(move || {
            let stream = TcpStream::connect((host.as_str(), port)).unwrap();
            stream
        });
        channel.connect(Duration::from_secs(2)).unwrap();
        let mut peer = client.join().unwrap();
        peer.write_all(b"active").unwrap();
        drop(peer);

        let data = channel.recv_all().unwrap();
        assert_eq!(data, b"active");
    }

    #[test]
    fn bind_reuseaddr_can_rebind_the_same_port_immediately() {
        let first = bind_reuseaddr("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = first.local_addr().unwrap();
        drop(first);
        // A plain `TcpListener::bind` can fail here if the port is still in
        // TIME_WAIT; `SO_REUSEADDR` is what makes an immediate rebind work.
        let second = bind_reuseaddr(addr).unwrap();
        assert_eq!(second.local_addr().unwrap(), addr);
    }

    #[test]
    fn requires_fresh_setup_after_close() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            let _ = listener.accept();
        });

        let mut channel = DataChannel::new();
        channel.setup_passive("127.0.0.1", port).unwrap();
        channel.connect(Duration::from_secs(2)).unwrap();
        channel.close();
        assert!(channel.connect(Duration::from_secs(2)).is_err());
    }
}
