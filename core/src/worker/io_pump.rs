use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::WorkerError;

/// One decoded line of worker output, tagged with its stream of origin.
#[derive(Debug)]
pub struct LineTap {
    pub line: String,
    pub stream: LineStream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStream {
    Stdout,
    Stderr,
}

pub fn pump_stdout<R>(rd: R, line_tx: mpsc::Sender<LineTap>) -> JoinHandle<Result<u64, WorkerError>>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    pump(rd, "stdout", line_tx, LineStream::Stdout)
}

pub fn pump_stderr<R>(rd: R, line_tx: mpsc::Sender<LineTap>) -> JoinHandle<Result<u64, WorkerError>>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    pump(rd, "stderr", line_tx, LineStream::Stderr)
}

fn pump<R>(
    mut rd: R,
    label: &'static str,
    line_tx: mpsc::Sender<LineTap>,
    stream: LineStream,
) -> JoinHandle<Result<u64, WorkerError>>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; 16 * 1024];
        let mut total = 0u64;
        let mut line_buf: Vec<u8> = Vec::with_capacity(8 * 1024);

        loop {
            let n = rd.read(&mut buf).await.map_err(|e| WorkerError::StreamIo {
                stream: label,
                source: e,
            })?;
            if n == 0 {
                break;
            }
            total += n as u64;

            line_buf.extend_from_slice(&buf[..n]);
            while let Some(pos) = line_buf.iter().position(|&b| b == b'\n') {
                let mut one = line_buf.drain(..=pos).collect::<Vec<u8>>();
                trim_newline(&mut one);
                let line = String::from_utf8_lossy(&one).to_string();
                let _ = line_tx.send(LineTap { line, stream }).await;
            }
        }

        // EOF flush: deliver the last partial line if it doesn't end with '\n'.
        if !line_buf.is_empty() {
            trim_newline(&mut line_buf);
            if !line_buf.is_empty() {
                let line = String::from_utf8_lossy(&line_buf).to_string();
                let _ = line_tx.send(LineTap { line, stream }).await;
            }
        }

        Ok(total)
    })
}

fn trim_newline(buf: &mut Vec<u8>) {
    if buf.last() == Some(&b'\n') {
        buf.pop();
    }
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
}
