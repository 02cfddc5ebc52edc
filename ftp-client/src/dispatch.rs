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

//! # COMMAND DISPATCHER
//!
//! Turns named operations (`user`, `pasv`, `rename`, ...) into one or more
//! control-channel command lines, pairs each with its reply, and for the
//! handful of commands that open a data channel (RETR/STOR/APPE/LIST/NLST)
//! delegates the byte-streaming phase to the [Transfer Engine].
//!
//! Deliberately a `match` over the uppercase command name rather than a
//! `HashMap<String, Box<dyn Handler>>` — the command set is fixed and small,
//! and every handler needs a slightly different shape of argument and
//! return value, so a trait-object table would just add an unused layer of
//! indirection. Anything not named below falls through to [send_raw], the
//! generic verbatim forwarder.
//!
//! [Transfer Engine]: crate::transfer::TransferEngine
//! [send_raw]:        Dispatcher::send_raw

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use ftp_reply::Reply;

use crate::config::ClientConfig;
use crate::control::ControlChannel;
use crate::data::DataChannel;
use crate::error::FtpError;
use crate::transfer::{TransferEngine, TransferLaunch, TransferOptions};

/// ## COMMAND DISPATCHER
///
/// Holds the control channel, the data channel, and the transfer engine
/// that share a single session, and exposes one method per FTP command
/// this client understands.
pub struct Dispatcher {
    control: Arc<ControlChannel>,
    data: Arc<Mutex<DataChannel>>,
    transfers: Arc<TransferEngine>,
}

impl Dispatcher {
    pub fn new(control: Arc<ControlChannel>, config: ClientConfig) -> Self {
        let data = Arc::new(Mutex::new(DataChannel::new()));
        let transfers = Arc::new(TransferEngine::new(control.clone(), data.clone(), config));
        Self {
            control,
            data,
            transfers,
        }
    }

    pub fn transfers(&self) -> &Arc<TransferEngine> {
        &self.transfers
    }

    /// Writes `command` verbatim (no uppercasing, no argument handling)
    /// and reads back the reply. The fallback for anything this dispatcher
    /// does not model explicitly.
    pub fn send_raw(&self, command: &str) -> Result<Reply, FtpError> {
        self.control.send_line(command)?;
        self.control.recv_reply()
    }

    fn command(&self, line: &str) -> Result<Reply, FtpError> {
        self.control.send_line(line)?;
        self.control.recv_reply()
    }

    /// `USER user` — a 331 invites a following PASS, a 230 means the
    /// server accepted the username alone (e.g. an account with no
    /// password).
    pub fn user(&self, user: &str) -> Result<Reply, FtpError> {
        self.command(&format!("USER {user}"))
    }

    /// `PASS pass`.
    pub fn pass(&self, pass: &str) -> Result<Reply, FtpError> {
        self.command(&format!("PASS {pass}"))
    }

    /// `PASV` — parses the server's `(h1,h2,h3,h4,p1,p2)` tuple out of the
    /// 227 reply and records it on the data channel.
    pub fn pasv(&self) -> Result<Reply, FtpError> {
        let reply = self.command("PASV")?;
        if reply.code == 227 {
            let (host, port) = ftp_reply::parse_pasv_reply(&reply)?;
            self.data.lock().unwrap().setup_passive(&host, port)?;
        }
        Ok(reply)
    }

    /// `PORT h1,h2,h3,h4,p1,p2` — binds a local listening socket first,
    /// then advertises its address. `local_addr` is typically the control
    /// channel's local address; `local_port` `0` requests an ephemeral
    /// port.
    pub fn port(&self, local_addr: SocketAddr) -> Result<Reply, FtpError> {
        let (host, port) = self
            .data
            .lock()
            .unwrap()
            .setup_active(&local_addr.ip().to_string(), local_addr.port())?;
        let argument = ftp_reply::format_port_argument(&host, port)?;
        self.command(&format!("PORT {argument}"))
    }

    /// `RETR remote_path` — delegates the transfer-initiating command and
    /// the streaming phase to the transfer engine. `total_size` should
    /// come from a preceding [size] call when the caller wants progress
    /// percentages.
    ///
    /// [size]: Dispatcher::size
    pub fn retr(
        &self,
        remote_path: &str,
        total_size: Option<u64>,
        options: TransferOptions,
    ) -> Result<(Reply, TransferLaunch), FtpError> {
        self.transfers.start_download(remote_path, total_size, options)
    }

    /// `STOR remote_path`.
    pub fn stor(
        &self,
        remote_path: &str,
        options: TransferOptions,
    ) -> Result<(Reply, TransferLaunch), FtpError> {
        self.transfers.start_upload(remote_path, options)
    }

    /// `APPE remote_path`.
    pub fn appe(
        &self,
        remote_path: &str,
        options: TransferOptions,
    ) -> Result<(Reply, TransferLaunch), FtpError> {
        self.transfers.start_append(remote_path, options)
    }

    /// `LIST [path]`.
    pub fn list(
        &self,
        path: Option<&str>,
        options: TransferOptions,
    ) -> Result<(Reply, TransferLaunch), FtpError> {
        self.transfers.start_listing("LIST", path, options)
    }

    /// `NLST [path]`.
    pub fn nlst(
        &self,
        path: Option<&str>,
        options: TransferOptions,
    ) -> Result<(Reply, TransferLaunch), FtpError> {
        self.transfers.start_listing("NLST", path, options)
    }

    /// `CWD path`.
    pub fn cwd(&self, path: &str) -> Result<Reply, FtpError> {
        self.command(&format!("CWD {path}"))
    }

    /// `CDUP`.
    pub fn cdup(&self) -> Result<Reply, FtpError> {
        self.command("CDUP")
    }

    /// `PWD` — returns the raw reply; the quoted path is extracted with
    /// [ftp_reply::parse_pwd_reply] by the caller.
    pub fn pwd(&self) -> Result<Reply, FtpError> {
        self.command("PWD")
    }

    /// `MKD path`.
    pub fn mkd(&self, path: &str) -> Result<Reply, FtpError> {
        self.command(&format!("MKD {path}"))
    }

    /// `RMD path`.
    pub fn rmd(&self, path: &str) -> Result<Reply, FtpError> {
        self.command(&format!("RMD {path}"))
    }

    /// `DELE path`.
    pub fn dele(&self, path: &str) -> Result<Reply, FtpError> {
        self.command(&format!("DELE {path}"))
    }

    /// `RNFR from` then `RNTO to` — the pair is atomic from the caller's
    /// point of view: if RNFR is not answered with 350, RNTO is never
    /// sent and the from-reply is returned as-is.
    pub fn rename(&self, from: &str, to: &str) -> Result<Reply, FtpError> {
        let rnfr_reply = self.command(&format!("RNFR {from}"))?;
        if rnfr_reply.code != 350 {
            return Ok(rnfr_reply);
        }
        self.command(&format!("RNTO {to}"))
    }

    /// `SIZE path` — returns the raw reply; use [ftp_reply::parse_size_reply]
    /// to extract the byte count from a 213.
    pub fn size(&self, path: &str) -> Result<Reply, FtpError> {
        self.command(&format!("SIZE {path}"))
    }

    /// `TYPE kind`, e.g. `"A"` or `"I"`.
    pub fn typ(&self, kind: &str) -> Result<Reply, FtpError> {
        self.command(&format!("TYPE {kind}"))
    }

    /// `SYST`.
    pub fn syst(&self) -> Result<Reply, FtpError> {
        self.command("SYST")
    }

    /// `NOOP` — used as a liveness probe; works even immediately after an
    /// ABOR, since ABOR does not close the control connection.
    pub fn noop(&self) -> Result<Reply, FtpError> {
        self.command("NOOP")
    }

    /// `QUIT`.
    pub fn quit(&self) -> Result<Reply, FtpError> {
        self.command("QUIT")
    }

    /// `REST offset` — only meaningful immediately before the very next
    /// RETR/STOR; the transfer engine sends this itself when
    /// `TransferOptions.offset > 0`, so this standalone entry point exists
    /// for callers that want to probe restart support independently.
    pub fn rest(&self, offset: u64) -> Result<Reply, FtpError> {
        self.command(&format!("REST {offset}"))
    }

    /// ### ABOR
    ///
    /// Stand-alone ABOR, not tied to any specific transfer record: sends
    /// the urgent-data sequence, then reads exactly one reply. If no
    /// transfer was in flight the server answers with a single 225/226; if
    /// one was (and the caller did not go through
    /// [TransferEngine::cancel]), the first reply may be the 426
    /// acknowledgement, in which case the caller is responsible for
    /// reading the trailing 226 itself via [send_raw]-style follow-up.
    ///
    /// For cancelling a specific in-flight transfer, prefer
    /// [TransferEngine::cancel], which performs this same urgent send and
    /// also drains the resulting reply pairing as part of the worker's
    /// own completion sequence.
    ///
    /// [TransferEngine::cancel]: crate::transfer::TransferEngine::cancel
    pub fn abor(&self) -> Result<Reply, FtpError> {
        self.control.send_abor_urgent()?;
        self.control.recv_reply()
    }
}
