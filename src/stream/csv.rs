use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::{StreamHeader, POLL_INTERVAL};
use crate::device::SampleBlock;
use crate::error::StreamError;

/// `timestamp,<channel labels..>`
pub fn write_header<W: Write>(w: &mut W, header: &StreamHeader) -> std::io::Result<()> {
    write!(w, "timestamp")?;
    for channel in &header.channels {
        write!(w, ",{}", channel.label)?;
    }
    writeln!(w)
}

pub fn write_block<W: Write>(w: &mut W, block: &SampleBlock) -> std::io::Result<()> {
    for (n, values) in block.frames().enumerate() {
        write!(w, "{:.6}", block.timestamp(n))?;
        for value in values {
            write!(w, ",{}", value)?;
        }
        writeln!(w)?;
    }
    Ok(())
}

/// File name for a recording started now.
pub fn recording_file_name(label: &str) -> String {
    format!("{}_{}.csv", label, chrono::Local::now().format("%Y%m%d_%H%M%S"))
}

pub(crate) fn spawn(
    dir: &Path,
    header: StreamHeader,
    rx: Receiver<SampleBlock>,
    stop: Arc<AtomicBool>,
) -> Result<(PathBuf, JoinHandle<Result<(), StreamError>>), StreamError> {
    std::fs::create_dir_all(dir)
        .map_err(|error| StreamError::io(format!("cannot create {}", dir.display()), error))?;
    let path = dir.join(recording_file_name(&header.name));
    let file = File::create(&path)
        .map_err(|error| StreamError::io(format!("cannot create {}", path.display()), error))?;
    let mut w = BufWriter::new(file);
    write_header(&mut w, &header)
        .map_err(|error| StreamError::io(format!("cannot write {}", path.display()), error))?;

    let thread_path = path.clone();
    let handle = thread::Builder::new()
        .name(format!("csv-{}", header.name))
        .spawn(move || {
            let io_error = |error| StreamError::io(format!("cannot write {}", thread_path.display()), error);
            let mut rows = 0usize;
            while !stop.load(Ordering::Relaxed) {
                match rx.recv_timeout(POLL_INTERVAL) {
                    Ok(block) => {
                        write_block(&mut w, &block).map_err(io_error)?;
                        rows += block.frame_count();
                    }
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            w.flush().map_err(io_error)?;
            log::debug!("wrote {} rows to {}", rows, thread_path.display());
            Ok(())
        })
        .map_err(|error| StreamError::io("cannot spawn csv thread", error))?;
    Ok((path, handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Channel, ChannelType};

    #[test]
    fn test_writes_expected_csv() {
        let header = StreamHeader::new(
            "SAGA",
            &[
                Channel::new("BIP 01", "uVolt", ChannelType::Bip),
                Channel::new("COUNTER", "-", ChannelType::Counter),
            ],
            500.0,
        );
        let block = SampleBlock {
            first_index: 0,
            sample_rate: 500.0,
            channel_count: 2,
            values: vec![1.5, 0.0, -2.0, 1.0],
        };
        let mut buf = Vec::new();
        write_header(&mut buf, &header).unwrap();
        write_block(&mut buf, &block).unwrap();
        let s = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = s.trim().split('\n').collect();
        assert_eq!(lines, vec!["timestamp,BIP 01,COUNTER", "0.000000,1.5,0", "0.002000,-2,1"]);
    }

    #[test]
    fn test_file_name() {
        let name = recording_file_name("SAGA");
        assert!(name.starts_with("SAGA_"));
        assert!(name.ends_with(".csv"));
    }
}
