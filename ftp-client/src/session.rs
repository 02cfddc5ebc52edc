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

//! # SESSION
//!
//! The façade a caller actually holds: one control channel, one data
//! channel, one transfer engine, bound together with a connection-alive
//! flag, a best-effort working-directory hint, and a slot for the payload
//! of the most recently completed in-memory transfer (what a plain
//! `download("name.txt")` call with no `local_path` hands back).
//!
//! [Session] is `Send + Sync`: every field it owns is already safe to share
//! across the caller's thread and whatever transfer worker threads are in
//! flight, so callers needing to poll a transfer from a different thread
//! than the one that started it can just clone the `Arc<Session>`.
//!
//! [Session]: Session

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ftp_reply::Reply;

use crate::config::ClientConfig;
use crate::control::ControlChannel;
use crate::dispatch::Dispatcher;
use crate::error::FtpError;
use crate::transfer::{TransferHandle, TransferLaunch, TransferOptions, TransferOutcome, TransferPayload};

/// ## SESSION
///
/// See the [module documentation][self].
pub struct Session {
    control: Arc<ControlChannel>,
    dispatcher: Dispatcher,
    config: ClientConfig,
    connected: AtomicBool,
    cwd_hint: Mutex<Option<String>>,
    last_payload: Mutex<Option<TransferPayload>>,
}

impl Session {
    pub fn new(config: ClientConfig) -> Self {
        let control = Arc::new(ControlChannel::new());
        let dispatcher = Dispatcher::new(control.clone(), config.clone());
        Self {
            control,
            dispatcher,
            config,
            connected: AtomicBool::new(false),
            cwd_hint: Mutex::new(None),
            last_payload: Mutex::new(None),
        }
    }

    /// ### CONNECT
    ///
    /// Dials the control port and reads the server's welcome reply. Does
    /// not log in — call [login] next.
    ///
    /// [login]: Session::login
    pub fn connect(&self, host: &str, port: u16) -> Result<Reply, FtpError> {
        self.control
            .connect(host, port, self.config.connect_timeout, self.config.control_timeout)?;
        let welcome = self.control.recv_reply()?;
        self.connected.store(true, Ordering::SeqCst);
        log::info!("connected to {host}:{port}, server says: {welcome}");
        Ok(welcome)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.control.is_connected()
    }

    /// `USER`/`PASS`, defaulting to the session's configured anonymous
    /// credentials when not supplied.
    pub fn login(&self, user: Option<&str>, pass: Option<&str>) -> Result<Reply, FtpError> {
        let user = user.unwrap_or(&self.config.default_user);
        let pass = pass.unwrap_or(&self.config.default_pass);
        let reply = self.dispatcher.user(user)?;
        if reply.is_success() {
            return Ok(reply);
        }
        if !reply.is_preliminary() {
            return Ok(reply);
        }
        self.dispatcher.pass(pass)
    }

    pub fn cwd(&self, path: &str) -> Result<Reply, FtpError> {
        let reply = self.dispatcher.cwd(path)?;
        if reply.is_success() {
            *self.cwd_hint.lock().unwrap() = Some(path.to_string());
        }
        Ok(reply)
    }

    pub fn cdup(&self) -> Result<Reply, FtpError> {
        let reply = self.dispatcher.cdup()?;
        if reply.is_success() {
            *self.cwd_hint.lock().unwrap() = None;
        }
        Ok(reply)
    }

    /// The last directory successfully `cwd`'d into by this session, if
    /// any — a hint only, never refreshed by a live `PWD` round trip.
    pub fn cwd_hint(&self) -> Option<String> {
        self.cwd_hint.lock().unwrap().clone()
    }

    /// `PWD`, parsed into the quoted path.
    pub fn pwd(&self) -> Result<Option<String>, FtpError> {
        let reply = self.dispatcher.pwd()?;
        Ok(ftp_reply::parse_pwd_reply(&reply))
    }

    pub fn mkd(&self, path: &str) -> Result<Reply, FtpError> {
        self.dispatcher.mkd(path)
    }

    pub fn rmd(&self, path: &str) -> Result<Reply, FtpError> {
        self.dispatcher.rmd(path)
    }

    pub fn dele(&self, path: &str) -> Result<Reply, FtpError> {
        self.dispatcher.dele(path)
    }

    /// `RNFR`/`RNTO` as one atomic rename.
    pub fn rename(&self, from: &str, to: &str) -> Result<Reply, FtpError> {
        self.dispatcher.rename(from, to)
    }

    /// `SIZE`, parsed into a byte count. `None` if the server did not
    /// answer with 213 (either it lacks SIZE support, or the path does not
    /// exist).
    pub fn size(&self, path: &str) -> Result<Option<u64>, FtpError> {
        let reply = self.dispatcher.size(path)?;
        Ok(ftp_reply::parse_size_reply(&reply))
    }

    pub fn typ(&self, kind: &str) -> Result<Reply, FtpError> {
        self.dispatcher.typ(kind)
    }

    pub fn syst(&self) -> Result<Reply, FtpError> {
        self.dispatcher.syst()
    }

    pub fn noop(&self) -> Result<Reply, FtpError> {
        self.dispatcher.noop()
    }

    /// Negotiates the data channel for the next transfer: PASV if
    /// available to the caller (the common case), else PORT against the
    /// control channel's local address.
    fn negotiate_passive(&self) -> Result<Reply, FtpError> {
        self.dispatcher.pasv()
    }

    fn negotiate_active(&self) -> Result<Reply, FtpError> {
        let local: SocketAddr = self.control.local_addr()?;
        let ephemeral = SocketAddr::new(local.ip(), 0);
        self.dispatcher.port(ephemeral)
    }

    /// ### DOWNLOAD
    ///
    /// Negotiates PASV, queries SIZE for progress reporting, then issues
    /// RETR. On a synchronous, in-memory, successful completion the bytes
    /// are also retained as the session's [last transfer payload][Self::last_payload].
    pub fn download(&self, remote_path: &str, options: TransferOptions) -> Result<TransferLaunch, FtpError> {
        self.negotiate_passive()?;
        let total_size = self.size(remote_path).unwrap_or(None);
        let (_preliminary, launch) = self.dispatcher.retr(remote_path, total_size, options)?;
        self.remember_if_sync(&launch);
        Ok(launch)
    }

    /// ### DOWNLOAD (ACTIVE MODE)
    ///
    /// As [download], but advertises a local listening socket with PORT
    /// instead of negotiating PASV.
    ///
    /// [download]: Session::download
    pub fn download_active(&self, remote_path: &str, options: TransferOptions) -> Result<TransferLaunch, FtpError> {
        self.negotiate_active()?;
        let total_size = self.size(remote_path).unwrap_or(None);
        let (_preliminary, launch) = self.dispatcher.retr(remote_path, total_size, options)?;
        self.remember_if_sync(&launch);
        Ok(launch)
    }

    /// ### UPLOAD
    pub fn upload(&self, remote_path: &str, options: TransferOptions) -> Result<TransferLaunch, FtpError> {
        self.negotiate_passive()?;
        let (_preliminary, launch) = self.dispatcher.stor(remote_path, options)?;
        self.remember_if_sync(&launch);
        Ok(launch)
    }

    /// ### APPEND
    pub fn append(&self, remote_path: &str, options: TransferOptions) -> Result<TransferLaunch, FtpError> {
        self.negotiate_passive()?;
        let (_preliminary, launch) = self.dispatcher.appe(remote_path, options)?;
        self.remember_if_sync(&launch);
        Ok(launch)
    }

    /// `LIST [path]`. The listing bytes end up as the session's last
    /// transfer payload when run in-memory and synchronously.
    pub fn list(&self, path: Option<&str>, options: TransferOptions) -> Result<TransferLaunch, FtpError> {
        self.negotiate_passive()?;
        let (_preliminary, launch) = self.dispatcher.list(path, options)?;
        self.remember_if_sync(&launch);
        Ok(launch)
    }

    /// `NLST [path]`.
    pub fn nlst(&self, path: Option<&str>, options: TransferOptions) -> Result<TransferLaunch, FtpError> {
        self.negotiate_passive()?;
        let (_preliminary, launch) = self.dispatcher.nlst(path, options)?;
        self.remember_if_sync(&launch);
        Ok(launch)
    }

    fn remember_if_sync(&self, launch: &TransferLaunch) {
        if let TransferLaunch::Sync(outcome) = launch {
            self.remember_payload(outcome);
        }
    }

    /// Records a transfer's payload as the session's last-transfer slot.
    /// Intended to be wired in as a transfer's completion callback by
    /// callers who want "fire and forget, then read it back" semantics.
    pub fn remember_payload(&self, outcome: &TransferOutcome) {
        if let TransferOutcome::Completed(payload) = outcome {
            *self.last_payload.lock().unwrap() = Some(payload.clone());
        }
    }

    pub fn last_payload(&self) -> Option<TransferPayload> {
        self.last_payload.lock().unwrap().clone()
    }

    pub fn transfer(&self, id: u64) -> Option<TransferHandle> {
        self.dispatcher.transfers().get(id)
    }

    pub fn transfers(&self) -> Vec<TransferHandle> {
        self.dispatcher.transfers().list()
    }

    pub fn pause_transfer(&self, id: u64) {
        self.dispatcher.transfers().pause(id);
    }

    pub fn resume_transfer(&self, id: u64) {
        self.dispatcher.transfers().resume(id);
    }

    pub fn cancel_transfer(&self, id: u64) {
        self.dispatcher.transfers().cancel(id);
    }

    /// Cancels every transfer that has not already reached a terminal
    /// state.
    pub fn cancel_all_transfers(&self) {
        self.dispatcher.transfers().cancel_all();
    }

    pub fn wait_all_transfers(&self) {
        self.dispatcher.transfers().wait_all(self.config.shutdown_grace);
    }

    /// ### ABORT
    ///
    /// Stand-alone ABOR with no specific transfer in mind. Prefer
    /// [cancel_transfer] when a transfer id is known — it additionally
    /// drains the 426/226 reply pairing as part of that transfer's own
    /// completion sequence.
    ///
    /// [cancel_transfer]: Session::cancel_transfer
    pub fn abort(&self) -> Result<Reply, FtpError> {
        self.dispatcher.abor()
    }

    /// Sends a command this façade does not otherwise model and returns
    /// its reply verbatim.
    pub fn send_raw(&self, command: &str) -> Result<Reply, FtpError> {
        self.dispatcher.send_raw(command)
    }

    /// ### CLOSE
    ///
    /// Cancels every active transfer, waits up to `shutdown_grace` for
    /// their workers to leave the active state, sends `QUIT`, and tears
    /// down the control connection — regardless of whether any of that
    /// failed. A QUIT failure is logged and swallowed rather than
    /// returned, since the control connection is torn down either way.
    pub fn close(&self) -> Result<(), FtpError> {
        self.cancel_all_transfers();
        self.wait_all_transfers();
        if let Err(err) = self.dispatcher.quit() {
            log::warn!("QUIT failed during close: {err}");
        }
        self.connected.store(false, Ordering::SeqCst);
        self.control.disconnect();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    fn mock_server(port_tx: std::sync::mpsc::Sender<u16>) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            port_tx.send(listener.local_addr().unwrap().port()).unwrap();
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(b"220 Welcome\r\n").unwrap();

            let mut buf = [0u8; 256];
            let n = stream.read(&mut buf).unwrap();
            assert_eq!(&buf[..n], b"USER anonymous\r\n");
            stream.write_all(b"331 Need password\r\n").unwrap();

            let n = stream.read(&mut buf).unwrap();
            assert_eq!(&buf[..n], b"PASS anonymous@\r\n");
            stream.write_all(b"230 Logged in\r\n").unwrap();

            let n = stream.read(&mut buf).unwrap();
            assert_eq!(&buf[..n], b"QUIT\r\n");
            stream.write_all(b"221 Bye\r\n").unwrap();
        })
    }

    #[test]
    fn connect_login_and_close_round_trip() {
        let (tx, rx) = std::sync::mpsc::channel();
        let server = mock_server(tx);
        let port = rx.recv().unwrap();

        let session = Session::new(ClientConfig::default());
        let welcome = session.connect("127.0.0.1", port).unwrap();
        assert_eq!(welcome.code, 220);
        assert!(session.is_connected());

        let login_reply = session.login(None, None).unwrap();
        assert_eq!(login_reply.code, 230);

        session.close().unwrap();
        assert!(!session.is_connected());

        server.join().unwrap();
    }

    #[test]
    fn close_swallows_a_quit_failure() {
        let (tx, rx) = std::sync::mpsc::channel();
        let server = thread::spawn(move || {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            tx.send(listener.local_addr().unwrap().port()).unwrap();
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(b"220 Welcome\r\n").unwrap();

            let mut buf = [0u8; 256];
            let n = stream.read(&mut buf).unwrap();
            assert_eq!(&buf[..n], b"USER anonymous\r\n");
            stream.write_all(b"331 Need password\r\n").unwrap();

            let n = stream.read(&mut buf).unwrap();
            assert_eq!(&buf[..n], b"PASS anonymous@\r\n");
            stream.write_all(b"230 Logged in\r\n").unwrap();

            // Read the QUIT command and then drop the connection without
            // answering it.
            let _ = stream.read(&mut buf);
        });
        let port = rx.recv().unwrap();

        let session = Session::new(ClientConfig::default());
        session.connect("127.0.0.1", port).unwrap();
        session.login(None, None).unwrap();

        assert!(session.close().is_ok());
        assert!(!session.is_connected());

        server.join().unwrap();
    }
}
