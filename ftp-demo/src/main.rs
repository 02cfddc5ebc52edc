use std::env;
use std::process::ExitCode;

use ftp_client::{ClientConfig, Session, TransferLaunch, TransferOptions, TransferOutcome, TransferPayload};

fn main() -> ExitCode {
    env_logger::init();

    let mut args = env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "127.0.0.1".to_string());
    let port: u16 = args.next().and_then(|s| s.parse().ok()).unwrap_or(21);
    let remote_path = args.next().unwrap_or_else(|| "README.txt".to_string());

    if let Err(err) = run(&host, port, &remote_path) {
        eprintln!("ftp-demo: {err}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn run(host: &str, port: u16, remote_path: &str) -> Result<(), ftp_client::FtpError> {
    let session = Session::new(ClientConfig::default());

    let welcome = session.connect(host, port)?;
    println!("{welcome}");

    let login_reply = session.login(None, None)?;
    println!("{login_reply}");

    if let Some(cwd) = session.pwd()? {
        println!("working directory: {cwd}");
    }

    let launch = session.download(remote_path, TransferOptions::default().with_async(false))?;
    match launch {
        TransferLaunch::Sync(TransferOutcome::Completed(TransferPayload::Bytes(bytes))) => {
            println!("downloaded {} bytes from {remote_path}", bytes.len());
        }
        TransferLaunch::Sync(TransferOutcome::Completed(_)) => {
            println!("downloaded {remote_path} to a local path");
        }
        TransferLaunch::Sync(TransferOutcome::Failed(reason)) => {
            println!("download of {remote_path} failed: {reason}");
        }
        TransferLaunch::Sync(TransferOutcome::Cancelled) => {
            println!("download of {remote_path} was cancelled");
        }
        TransferLaunch::Async(handle) => {
            // Not expected with `with_async(false)`, but poll it to
            // completion rather than leaving a dangling worker.
            let status = handle.wait(None);
            println!("download of {remote_path} finished with status {status:?}");
        }
    }

    session.close()?;
    Ok(())
}
