use crossbeam_channel::{unbounded, Receiver};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::TransportError;

/// Ships serialized frames to a destination.
pub trait Sender: Send {
    fn send(&mut self, data: &[u8]) -> Result<(), TransportError>;
}

/// Writes one frame per line to standard output.
pub struct StdioSender {
    stdout: io::Stdout,
}

impl StdioSender {
    pub fn new() -> Self {
        StdioSender { stdout: io::stdout() }
    }
}

impl Sender for StdioSender {
    fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let mut out = self.stdout.lock();
        out.write_all(data)?;
        out.write_all(b"\n")?;
        out.flush()?;
        Ok(())
    }
}

impl Default for StdioSender {
    fn default() -> Self {
        Self::new()
    }
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullSender;

impl Sender for NullSender {
    fn send(&mut self, _data: &[u8]) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Appends one frame per line to a file.
pub struct FileSender {
    writer: BufWriter<File>,
}

impl FileSender {
    /// Truncates the file unless `append` is set.
    pub fn open(path: &Path, append: bool) -> Result<Self, TransportError> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(path)?;
        Ok(FileSender { writer: BufWriter::new(file) })
    }
}

impl Sender for FileSender {
    fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.writer.write_all(data)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Hands frames to an in-process client.
pub struct ChannelSender {
    tx: crossbeam_channel::Sender<Vec<u8>>,
}

impl ChannelSender {
    pub fn new(tx: crossbeam_channel::Sender<Vec<u8>>) -> Self {
        ChannelSender { tx }
    }

    /// A sender and the receiver its frames arrive on.
    pub fn pair() -> (Self, Receiver<Vec<u8>>) {
        let (tx, rx) = unbounded();
        (Self::new(tx), rx)
    }
}

impl Sender for ChannelSender {
    fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.tx.send(data.to_vec()).map_err(|_| TransportError::ChannelClosed)
    }
}
