//! TCP outlet: newline-delimited JSON over plain TCP.
//!
//! Each client receives the [`StreamHeader`] as the first line, followed by one
//! [`Frame`] line per sample. Clients that fall behind skip the frames they missed.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

use super::{StreamHeader, POLL_INTERVAL};
use crate::device::SampleBlock;
use crate::error::StreamError;

/// Blocks buffered per client before it starts lagging.
const CLIENT_BACKLOG: usize = 256;

/// One sample frame on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Seconds since measurement start.
    pub t: f64,
    pub v: Vec<f32>,
}

/// Render all frames of `block` as JSON lines (each terminated by `\n`).
pub fn encode_block(block: &SampleBlock) -> String {
    let mut out = String::new();
    for (n, values) in block.frames().enumerate() {
        let frame = Frame {
            t: block.timestamp(n),
            v: values.to_vec(),
        };
        // serializing plain numbers cannot fail
        if let Ok(line) = serde_json::to_string(&frame) {
            out.push_str(&line);
            out.push('\n');
        }
    }
    out
}

pub(crate) fn spawn(
    bind: &str,
    header: StreamHeader,
    rx: Receiver<SampleBlock>,
    stop: Arc<AtomicBool>,
) -> Result<(SocketAddr, JoinHandle<Result<(), StreamError>>), StreamError> {
    let listener = std::net::TcpListener::bind(bind)
        .map_err(|error| StreamError::io(format!("cannot listen on {}", bind), error))?;
    let local_addr = listener
        .local_addr()
        .map_err(|error| StreamError::io("cannot query listen address", error))?;
    listener
        .set_nonblocking(true)
        .map_err(|error| StreamError::io("cannot configure listener", error))?;
    let mut header_line = serde_json::to_string(&header)
        .map_err(|error| StreamError::io("cannot encode stream header", error.into()))?;
    header_line.push('\n');

    let handle = thread::Builder::new()
        .name(format!("outlet-{}", header.name))
        .spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .map_err(|error| StreamError::io("cannot start outlet runtime", error))?;
            runtime.block_on(serve(listener, Arc::from(header_line), rx, stop))
        })
        .map_err(|error| StreamError::io("cannot spawn outlet thread", error))?;
    Ok((local_addr, handle))
}

async fn serve(
    listener: std::net::TcpListener,
    header_line: Arc<str>,
    rx: Receiver<SampleBlock>,
    stop: Arc<AtomicBool>,
) -> Result<(), StreamError> {
    let listener = TcpListener::from_std(listener)
        .map_err(|error| StreamError::io("cannot register listener", error))?;
    let (lines_tx, _) = broadcast::channel::<Arc<str>>(CLIENT_BACKLOG);

    let mut pump = {
        let lines_tx = lines_tx.clone();
        tokio::task::spawn_blocking(move || forward_blocks(rx, lines_tx, stop))
    };

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    log::info!("outlet client {} connected", peer);
                    tokio::spawn(client(socket, peer, header_line.clone(), lines_tx.subscribe()));
                }
                Err(error) => log::warn!("outlet accept failed: {}", error),
            },
            _ = &mut pump => break,
        }
    }
    Ok(())
}

fn forward_blocks(rx: Receiver<SampleBlock>, lines_tx: broadcast::Sender<Arc<str>>, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::Relaxed) {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(block) => {
                // no receivers is fine; the block is simply dropped
                let _ = lines_tx.send(Arc::from(encode_block(&block)));
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                log::debug!("device stopped delivering samples");
                break;
            }
        }
    }
}

async fn client(
    mut socket: TcpStream,
    peer: SocketAddr,
    header_line: Arc<str>,
    mut lines_rx: broadcast::Receiver<Arc<str>>,
) {
    if let Err(error) = socket.write_all(header_line.as_bytes()).await {
        log::debug!("outlet client {} dropped: {}", peer, error);
        return;
    }
    loop {
        match lines_rx.recv().await {
            Ok(lines) => {
                if let Err(error) = socket.write_all(lines.as_bytes()).await {
                    log::debug!("outlet client {} dropped: {}", peer, error);
                    return;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                log::warn!("outlet client {} lagging, skipped {} blocks", peer, skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    let _ = socket.shutdown().await;
    log::info!("outlet client {} disconnected", peer);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_block() {
        let block = SampleBlock {
            first_index: 2,
            sample_rate: 4.0,
            channel_count: 2,
            values: vec![1.0, 2.0, 3.0, 4.0],
        };
        let encoded = encode_block(&block);
        let frames: Vec<Frame> = encoded
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(
            frames,
            vec![
                Frame { t: 0.5, v: vec![1.0, 2.0] },
                Frame { t: 0.75, v: vec![3.0, 4.0] },
            ]
        );
        assert!(encoded.ends_with('\n'));
    }
}
