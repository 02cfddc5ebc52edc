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

//! End-to-end scenarios against in-process mock control/data servers built
//! on plain `std::net`, in the same spirit as the per-module socket fixture
//! tests — no mocking framework, just real TCP loopback connections.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use ftp_client::{ClientConfig, Session, TransferLaunch, TransferOptions, TransferOutcome, TransferPayload, TransferStatus};

fn expect_line(reader: &mut BufReader<TcpStream>, expected: &str) {
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    assert_eq!(line.trim_end(), expected);
}

fn pasv_reply(data_port: u16) -> String {
    format!(
        "227 Entering Passive Mode (127,0,0,1,{},{})\r\n",
        data_port >> 8,
        data_port & 0xFF
    )
}

fn connected_session(control_port: u16) -> Session {
    let session = Session::new(ClientConfig::default());
    let welcome = session.connect("127.0.0.1", control_port).unwrap();
    assert_eq!(welcome.code, 220);
    let login_reply = session.login(None, None).unwrap();
    assert_eq!(login_reply.code, 230);
    session
}

#[test]
fn welcome_and_multiline_reply_are_assembled_correctly() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut writer = stream.try_clone().unwrap();
        let mut reader = BufReader::new(stream);
        writer
            .write_all(b"220-Multi-line welcome\r\n220-Second line\r\n220 Ready\r\n")
            .unwrap();
        expect_line(&mut reader, "USER anonymous");
        writer.write_all(b"331 Need password\r\n").unwrap();
        expect_line(&mut reader, "PASS anonymous@");
        writer.write_all(b"230 Logged in\r\n").unwrap();
        expect_line(&mut reader, "QUIT");
        writer.write_all(b"221 Bye\r\n").unwrap();
    });

    let session = Session::new(ClientConfig::default());
    let welcome = session.connect("127.0.0.1", port).unwrap();
    assert_eq!(welcome.code, 220);
    assert_eq!(welcome.message, "Multi-line welcome\nSecond line\nReady");

    session.login(None, None).unwrap();
    session.close().unwrap();
    server.join().unwrap();
}

#[test]
fn upload_then_download_round_trips_bytes() {
    let content = b"the quick brown fox jumps over the lazy dog".to_vec();
    let content_for_server = content.clone();

    let data_listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let data_port = data_listener.local_addr().unwrap().port();
    let data_thread = thread::spawn(move || {
        // Upload: server receives the bytes.
        let (mut upload_stream, _) = data_listener.accept().unwrap();
        let mut received = Vec::new();
        upload_stream.read_to_end(&mut received).unwrap();
        assert_eq!(received, content_for_server);
        (data_listener, received)
    });

    // The test needs a second PASV/data round for the download; rebuild a
    // second listener on a fresh port since the first is single-use.
    let control_listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let control_port = control_listener.local_addr().unwrap().port();
    let content_for_download = content.clone();
    let control_thread = thread::spawn(move || {
        let (stream, _) = control_listener.accept().unwrap();
        let mut writer = stream.try_clone().unwrap();
        let mut reader = BufReader::new(stream);
        writer.write_all(b"220 Welcome\r\n").unwrap();
        expect_line(&mut reader, "USER anonymous");
        writer.write_all(b"331 Need password\r\n").unwrap();
        expect_line(&mut reader, "PASS anonymous@");
        writer.write_all(b"230 Logged in\r\n").unwrap();

        expect_line(&mut reader, "PASV");
        writer.write_all(pasv_reply(data_port).as_bytes()).unwrap();
        expect_line(&mut reader, "STOR upload.txt");
        writer.write_all(b"150 Ready to receive\r\n").unwrap();
        writer.write_all(b"226 Transfer complete\r\n").unwrap();

        // Second data connection for the download.
        let download_listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let download_port = download_listener.local_addr().unwrap().port();
        expect_line(&mut reader, "PASV");
        writer.write_all(pasv_reply(download_port).as_bytes()).unwrap();
        expect_line(&mut reader, "SIZE download.txt");
        writer.write_all(b"550 unknown\r\n").unwrap();
        expect_line(&mut reader, "RETR download.txt");
        writer.write_all(b"150 Opening data connection\r\n").unwrap();
        let (mut download_stream, _) = download_listener.accept().unwrap();
        download_stream.write_all(&content_for_download).unwrap();
        drop(download_stream);
        writer.write_all(b"226 Transfer complete\r\n").unwrap();

        expect_line(&mut reader, "QUIT");
        writer.write_all(b"221 Bye\r\n").unwrap();
    });

    let session = connected_session(control_port);

    let upload_launch = session
        .upload("upload.txt", TransferOptions::default().with_buffer(content.clone()).with_async(false))
        .unwrap();
    match upload_launch {
        TransferLaunch::Sync(outcome) => assert!(matches!(outcome, TransferOutcome::Completed(_))),
        TransferLaunch::Async(_) => panic!("expected sync launch"),
    }

    let download_launch = session
        .download("download.txt", TransferOptions::default().with_async(false))
        .unwrap();
    let outcome = match download_launch {
        TransferLaunch::Sync(outcome) => outcome,
        TransferLaunch::Async(_) => panic!("expected sync launch"),
    };
    match outcome {
        TransferOutcome::Completed(TransferPayload::Bytes(bytes)) => assert_eq!(bytes, content),
        other => panic!("unexpected outcome: {other:?}"),
    }

    session.close().unwrap();
    data_thread.join().unwrap();
    control_thread.join().unwrap();
}

#[test]
fn resumed_download_sends_rest_before_retr() {
    let already_have = b"first half ";
    let remaining = b"second half";

    let data_listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let data_port = data_listener.local_addr().unwrap().port();
    let data_thread = thread::spawn(move || {
        let (mut stream, _) = data_listener.accept().unwrap();
        stream.write_all(remaining).unwrap();
    });

    let control_listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let control_port = control_listener.local_addr().unwrap().port();
    let control_thread = thread::spawn(move || {
        let (stream, _) = control_listener.accept().unwrap();
        let mut writer = stream.try_clone().unwrap();
        let mut reader = BufReader::new(stream);
        writer.write_all(b"220 Welcome\r\n").unwrap();
        expect_line(&mut reader, "USER anonymous");
        writer.write_all(b"331 Need password\r\n").unwrap();
        expect_line(&mut reader, "PASS anonymous@");
        writer.write_all(b"230 Logged in\r\n").unwrap();

        expect_line(&mut reader, "PASV");
        writer.write_all(pasv_reply(data_port).as_bytes()).unwrap();
        expect_line(&mut reader, "SIZE partial.bin");
        writer.write_all(b"213 22\r\n").unwrap();
        expect_line(&mut reader, "REST 11");
        writer.write_all(b"350 Restarting at 11\r\n").unwrap();
        expect_line(&mut reader, "RETR partial.bin");
        writer.write_all(b"150 Opening data connection\r\n").unwrap();
        writer.write_all(b"226 Transfer complete\r\n").unwrap();
        expect_line(&mut reader, "QUIT");
        writer.write_all(b"221 Bye\r\n").unwrap();
    });

    let session = connected_session(control_port);
    let launch = session
        .download(
            "partial.bin",
            TransferOptions::default().with_offset(already_have.len() as u64).with_async(false),
        )
        .unwrap();
    match launch {
        TransferLaunch::Sync(TransferOutcome::Completed(TransferPayload::Bytes(bytes))) => {
            assert_eq!(bytes, remaining);
        }
        other => panic!("unexpected launch: {other:?}"),
    }

    session.close().unwrap();
    data_thread.join().unwrap();
    control_thread.join().unwrap();
}

#[test]
fn abor_during_retr_cancels_and_noop_still_works_afterward() {
    let data_listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let data_port = data_listener.local_addr().unwrap().port();
    let (close_tx, close_rx) = mpsc::channel::<()>();
    let data_thread = thread::spawn(move || {
        let (mut stream, _) = data_listener.accept().unwrap();
        stream.write_all(&[0xABu8; 8192]).unwrap();
        let _ = close_rx.recv();
        drop(stream);
    });

    let control_listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let control_port = control_listener.local_addr().unwrap().port();
    let control_thread = thread::spawn(move || {
        let (stream, _) = control_listener.accept().unwrap();
        let mut writer = stream.try_clone().unwrap();
        let mut reader = BufReader::new(stream);
        writer.write_all(b"220 Welcome\r\n").unwrap();
        expect_line(&mut reader, "USER anonymous");
        writer.write_all(b"331 Need password\r\n").unwrap();
        expect_line(&mut reader, "PASS anonymous@");
        writer.write_all(b"230 Logged in\r\n").unwrap();

        expect_line(&mut reader, "PASV");
        writer.write_all(pasv_reply(data_port).as_bytes()).unwrap();
        expect_line(&mut reader, "SIZE big.bin");
        writer.write_all(b"550 unknown\r\n").unwrap();
        expect_line(&mut reader, "RETR big.bin");
        writer.write_all(b"150 Opening data connection\r\n").unwrap();
        expect_line(&mut reader, "ABOR");
        close_tx.send(()).unwrap();
        writer.write_all(b"426 Transfer aborted\r\n").unwrap();
        writer.write_all(b"226 Abort successful\r\n").unwrap();
        expect_line(&mut reader, "NOOP");
        writer.write_all(b"200 OK\r\n").unwrap();
    });

    let session = connected_session(control_port);

    let launch = session
        .download("big.bin", TransferOptions::default().with_async(true))
        .unwrap();
    let handle = match launch {
        TransferLaunch::Async(handle) => handle,
        TransferLaunch::Sync(_) => panic!("expected async launch"),
    };

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while handle.bytes_transferred() == 0 && std::time::Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert!(handle.bytes_transferred() > 0, "worker never received the first chunk");

    session.cancel_transfer(handle.id);
    let status = handle.wait(Some(Duration::from_secs(5)));
    assert_eq!(status, TransferStatus::Cancelled);

    let noop_reply = session.noop().unwrap();
    assert_eq!(noop_reply.code, 200);

    control_thread.join().unwrap();
    data_thread.join().unwrap();
}

#[test]
fn abor_with_no_transfer_in_progress_gets_a_single_reply() {
    let control_listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let control_port = control_listener.local_addr().unwrap().port();
    let control_thread = thread::spawn(move || {
        let (stream, _) = control_listener.accept().unwrap();
        let mut writer = stream.try_clone().unwrap();
        let mut reader = BufReader::new(stream);
        writer.write_all(b"220 Welcome\r\n").unwrap();
        expect_line(&mut reader, "USER anonymous");
        writer.write_all(b"331 Need password\r\n").unwrap();
        expect_line(&mut reader, "PASS anonymous@");
        writer.write_all(b"230 Logged in\r\n").unwrap();
        expect_line(&mut reader, "ABOR");
        writer.write_all(b"225 No transfer in progress\r\n").unwrap();
        expect_line(&mut reader, "QUIT");
        writer.write_all(b"221 Bye\r\n").unwrap();
    });

    let session = connected_session(control_port);
    let reply = session.abort().unwrap();
    assert_eq!(reply.code, 225);

    session.close().unwrap();
    control_thread.join().unwrap();
}
