// Copyright © 2026 the ftp-rs authors
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the “Software”), to
// deal in the Software without restriction, including without limitation the
// rights to use, copy, modify, merge, publish, distribute, sublicense, and/or
// sell copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS
// IN THE SOFTWARE.

//! # CONTROL CHANNEL
//!
//! Owns the persistent TCP connection to the FTP server's command port.
//! This is the most order-sensitive piece of the whole client: every
//! command written here must be paired with exactly one structured
//! [Reply] read back before the next command goes out, so the read path
//! (multiline reply assembly) must be atomic with respect to any other
//! thread that might be waiting on a reply at the same time — in
//! particular, a transfer worker reading the trailing final reply of a
//! RETR/STOR/APPE while the session caller independently issues ABOR.
//!
//! ---------------------------------------------------------------------------
//!
//! To use the [Control Channel]:
//! - [Connect] to the server's control port.
//! - [Send a Line] for any ordinary command.
//! - [Receive a Reply] to read the (possibly multiline) reply that follows.
//! - [Send an Urgent ABOR] to interrupt an in-flight transfer.
//! - [Disconnect] to tear the connection down.
//!
//! [Control Channel]:    ControlChannel
//! [Connect]:            ControlChannel::connect
//! [Send a Line]:        ControlChannel::send_line
//! [Receive a Reply]:    ControlChannel::recv_reply
//! [Send an Urgent ABOR]: ControlChannel::send_abor_urgent
//! [Disconnect]:         ControlChannel::disconnect
//! [Reply]:              ftp_reply::Reply

use std::io::{self, BufRead, BufReader, ErrorKind, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use ftp_reply::{is_multiline_start, is_multiline_terminator, parse_reply, Reply};

use crate::error::FtpError;

/// ### CONNECTION STATE
///
/// The [Control Channel]'s lifecycle: either idle, or holding a connected
/// socket split into an independently-lockable read half and write half (a
/// `TcpStream` clone shares the same underlying file descriptor, so either
/// half can be used for `shutdown`).
///
/// [Control Channel]: ControlChannel
enum ConnectionState {
    NotConnected,
    Connected(Connected),
}

struct Connected {
    reader: Mutex<BufReader<TcpStream>>,
    writer: Mutex<TcpStream>,
    raw: TcpStream,
}

/// ## CONTROL CHANNEL
///
/// See the [module documentation][self] for the full contract.
pub struct ControlChannel {
    state: RwLock<ConnectionState>,
}

impl Default for ControlChannel {
    fn default() -> Self {
        Self {
            state: RwLock::new(ConnectionState::NotConnected),
        }
    }
}

impl ControlChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// ### CONNECT
    ///
    /// Dials `host:port` with `connect_timeout`, then sets both the read
    /// and write timeouts to `io_timeout`. Replaces any existing
    /// connection state unconditionally — callers are expected to check
    /// [is_connected] first if reconnection should be refused.
    ///
    /// [is_connected]: ControlChannel::is_connected
    pub fn connect(
        &self,
        host: &str,
        port: u16,
        connect_timeout: Duration,
        io_timeout: Duration,
    ) -> Result<(), FtpError> {
        let addr: SocketAddr = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(ErrorKind::AddrNotAvailable, "no address resolved"))?;
        let stream = TcpStream::connect_timeout(&addr, connect_timeout)?;
        stream.set_read_timeout(Some(io_timeout))?;
        stream.set_write_timeout(Some(io_timeout))?;

        let writer = stream.try_clone()?;
        let reader = BufReader::new(stream.try_clone()?);

        *self.state.write().unwrap() = ConnectionState::Connected(Connected {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            raw: stream,
        });
        log::debug!("control channel connected to {addr}");
        Ok(())
    }

    /// Whether the channel currently holds a live connection. This does
    /// not probe the socket — it reflects the last known state, which is
    /// only updated by [connect], [disconnect], or an I/O failure observed
    /// by [send_line]/[recv_reply].
    ///
    /// [connect]:    ControlChannel::connect
    /// [disconnect]: ControlChannel::disconnect
    pub fn is_connected(&self) -> bool {
        matches!(&*self.state.read().unwrap(), ConnectionState::Connected(_))
    }

    /// The local address of the control socket, used by the session
    /// façade as the default host to advertise in an active-mode PORT
    /// command.
    pub fn local_addr(&self) -> Result<SocketAddr, FtpError> {
        let guard = self.state.read().unwrap();
        match &*guard {
            ConnectionState::Connected(conn) => Ok(conn.raw.local_addr()?),
            ConnectionState::NotConnected => Err(FtpError::Sequence("not connected")),
        }
    }

    /// ### DISCONNECT
    ///
    /// Shuts down the TCP connection in both directions and returns to
    /// [NOT CONNECTED]. Never fails — a socket that is already broken is
    /// simply dropped.
    ///
    /// [NOT CONNECTED]: ConnectionState::NotConnected
    pub fn disconnect(&self) {
        let mut guard = self.state.write().unwrap();
        if let ConnectionState::Connected(conn) = &*guard {
            let _ = conn.raw.shutdown(Shutdown::Both);
        }
        *guard = ConnectionState::NotConnected;
    }

    /// ### SEND LINE
    ///
    /// Writes `line` followed by CRLF. Any command written here must be
    /// followed by exactly one call to [recv_reply] before the next
    /// [send_line] — the channel does not enforce this itself; it is the
    /// [Command Dispatcher]'s responsibility.
    ///
    /// [recv_reply]:         ControlChannel::recv_reply
    /// [send_line]:          ControlChannel::send_line
    /// [Command Dispatcher]: crate::dispatch::Dispatcher
    pub fn send_line(&self, line: &str) -> Result<(), FtpError> {
        let guard = self.state.read().unwrap();
        let conn = self.require_connected(&guard)?;
        let mut writer = conn.writer.lock().unwrap();
        let message = format!("{line}\r\n");
        let result = writer.write_all(message.as_bytes());
        drop(writer);
        drop(guard);
        self.handle_io_result(result)
    }

    /// ### RECEIVE REPLY
    ///
    /// Reads a single (possibly multiline) [Reply] from the control
    /// channel. The first line is inspected for the multiline marker
    /// (fourth character `-`); if present, further lines are read until one
    /// begins with the same three-digit code followed by a space. The
    /// entire operation holds the reader lock for its duration, so two
    /// concurrent callers — e.g. the session caller and a transfer
    /// worker — can never interleave the lines of two different replies.
    ///
    /// [Reply]: ftp_reply::Reply
    pub fn recv_reply(&self) -> Result<Reply, FtpError> {
        let guard = self.state.read().unwrap();
        let conn = self.require_connected(&guard)?;
        let mut reader = conn.reader.lock().unwrap();

        let first = match self.recv_line_locked(&mut reader) {
            Ok(line) => line,
            Err(error) => {
                drop(reader);
                drop(guard);
                self.disconnect();
                return Err(error);
            }
        };

        let mut lines = vec![first.clone()];
        if is_multiline_start(&first) {
            let code: u16 = first
                .get(0..3)
                .and_then(|digits| digits.parse().ok())
                .ok_or(FtpError::Parse(ftp_reply::ParseError::MalformedStatusLine(
                    first.clone(),
                )))?;
            loop {
                let line = match self.recv_line_locked(&mut reader) {
                    Ok(line) => line,
                    Err(error) => {
                        drop(reader);
                        drop(guard);
                        self.disconnect();
                        return Err(error);
                    }
                };
                let terminator = is_multiline_terminator(&line, code);
                lines.push(line);
                if terminator {
                    break;
                }
            }
        }

        drop(reader);
        drop(guard);
        Ok(parse_reply(&lines)?)
    }

    /// ### SEND URGENT ABOR
    ///
    /// Sends the Telnet Interrupt-Process and Synch sequences as TCP
    /// urgent (out-of-band) data, followed by the literal `ABOR\r\n`
    /// command inline, atomically with respect to other writers. On
    /// platforms where out-of-band sends are unavailable, only the inline
    /// `ABOR\r\n` is sent — the documented fallback.
    pub fn send_abor_urgent(&self) -> Result<(), FtpError> {
        let guard = self.state.read().unwrap();
        let conn = self.require_connected(&guard)?;
        let mut writer = conn.writer.lock().unwrap();

        let result = (|| -> io::Result<()> {
            #[cfg(unix)]
            {
                send_oob(&conn.raw, &[0xFF, 0xF4])?;
                send_oob(&conn.raw, &[0xFF, 0xF2])?;
            }
            writer.write_all(b"ABOR\r\n")
        })();

        drop(writer);
        drop(guard);
        self.handle_io_result(result)
    }

    fn recv_line_locked(&self, reader: &mut BufReader<TcpStream>) -> Result<String, FtpError> {
        let mut buffer = String::new();
        let bytes_read = reader
            .read_line(&mut buffer)
            .map_err(|error| FtpError::Connection(error))?;
        if bytes_read == 0 {
            return Err(FtpError::Connection(io::Error::new(
                ErrorKind::ConnectionAborted,
                "control channel closed by remote",
            )));
        }
        while buffer.ends_with('\n') || buffer.ends_with('\r') {
            buffer.pop();
        }
        Ok(buffer)
    }

    fn handle_io_result(&self, result: io::Result<()>) -> Result<(), FtpError> {
        match result {
            Ok(()) => Ok(()),
            Err(error) => {
                self.disconnect();
                Err(FtpError::Connection(error))
            }
        }
    }

    fn require_connected<'a>(
        &self,
        guard: &'a ConnectionState,
    ) -> Result<&'a Connected, FtpError> {
        match guard {
            ConnectionState::Connected(conn) => Ok(conn),
            ConnectionState::NotConnected => Err(FtpError::Sequence("not connected")),
        }
    }
}

#[cfg(unix)]
fn send_oob(stream: &TcpStream, bytes: &[u8]) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;
    let fd = stream.as_raw_fd();
    let sent = unsafe {
        libc::send(
            fd,
            bytes.as_ptr() as *const libc::c_void,
            bytes.len(),
            libc::MSG_OOB,
        )
    };
    if sent < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;
    use std::thread;

    fn spawn_echo_server() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[test]
    fn connects_and_exchanges_single_line_reply() {
        let (listener, port) = spawn_echo_server();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(b"220 Welcome\r\n").unwrap();
            let mut buf = [0u8; 64];
            let n = stream.read(&mut buf).unwrap();
            assert_eq!(&buf[..n], b"NOOP\r\n");
            stream.write_all(b"200 OK\r\n").unwrap();
        });

        let channel = ControlChannel::new();
        channel
            .connect(
                "127.0.0.1",
                port,
                Duration::from_secs(2),
                Duration::from_secs(2),
            )
            .unwrap();
        let welcome = channel.recv_reply().unwrap();
        assert_eq!(welcome.code, 220);

        channel.send_line("NOOP").unwrap();
        let reply = channel.recv_reply().unwrap();
        assert_eq!(reply.code, 200);

        server.join().unwrap();
    }

    #[test]
    fn recv_reply_assembles_multiline() {
        let (listener, port) = spawn_echo_server();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream
                .write_all(b"220-Line1\r\n220-Line2\r\n220 Done\r\n")
                .unwrap();
        });

        let channel = ControlChannel::new();
        channel
            .connect(
                "127.0.0.1",
                port,
                Duration::from_secs(2),
                Duration::from_secs(2),
            )
            .unwrap();
        let reply = channel.recv_reply().unwrap();
        assert_eq!(reply.code, 220);
        assert_eq!(reply.message, "Line1\nLine2\nDone");

        server.join().unwrap();
    }

    #[test]
    fn disconnect_marks_not_connected() {
        let (listener, port) = spawn_echo_server();
        thread::spawn(move || {
            let _ = listener.accept();
        });
        let channel = ControlChannel::new();
        channel
            .connect(
                "127.0.0.1",
                port,
                Duration::from_secs(2),
                Duration::from_secs(2),
            )
            .unwrap();
        assert!(channel.is_connected());
        channel.disconnect();
        assert!(!channel.is_connected());
        assert!(channel.send_line("NOOP").is_err());
    }
}
