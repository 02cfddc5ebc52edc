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

//! # FTP CLIENT
//!
//! A session-oriented FTP client: one control channel, one data channel,
//! and a transfer engine that streams RETR/STOR/APPE/LIST/NLST payloads on
//! a worker thread while the caller's thread stays free to poll progress,
//! pause, resume, or cancel.
//!
//! ---------------------------------------------------------------------------
//!
//! A minimal round trip:
//!
//! ```no_run
//! use ftp_client::{ClientConfig, Session, TransferOptions};
//!
//! let session = Session::new(ClientConfig::default());
//! session.connect("ftp.example.com", 21)?;
//! session.login(None, None)?;
//!
//! let _launch = session.download("README.txt", TransferOptions::default().with_async(false))?;
//! session.close()?;
//! # Ok::<(), ftp_client::FtpError>(())
//! ```
//!
//! - [Session] is the façade most callers want.
//! - [ControlChannel] and [DataChannel] are the two sockets a session owns.
//! - [Dispatcher] turns named operations into command lines and replies.
//! - [TransferEngine] runs the byte-streaming phase of a transfer.
//! - [ClientConfig] holds every timeout and default credential.
//!
//! [Session]:        session::Session
//! [ControlChannel]: control::ControlChannel
//! [DataChannel]:    data::DataChannel
//! [Dispatcher]:     dispatch::Dispatcher
//! [TransferEngine]: transfer::TransferEngine
//! [ClientConfig]:   config::ClientConfig

pub mod config;
pub mod control;
pub mod data;
pub mod dispatch;
pub mod error;
pub mod session;
pub mod transfer;

pub use config::ClientConfig;
pub use control::ControlChannel;
pub use data::DataChannel;
pub use dispatch::Dispatcher;
pub use error::{FtpError, TransferError};
pub use session::Session;
pub use transfer::{
    CompletionCallback, ProgressCallback, Transfer, TransferHandle, TransferKind, TransferLaunch,
    TransferOptions, TransferOutcome, TransferPayload, TransferStatus,
};

pub use ftp_reply::Reply;
