//! Writer/reader handshake.
//!
//! The extension driver and a watching reader synchronize with two tagged
//! messages: the writer sends `writer_message` before it extends, then waits
//! for `reader_message`. The core only sees the `Rendezvous` trait.

use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use eyre::{Result, WrapErr};
use tracing::debug;

use crate::config::{MESSAGE_POLL_INTERVAL_MS, MESSAGE_TIMEOUT_MS};
use crate::error::H5Error;

pub const WRITER_MESSAGE: &str = "writer_message";
pub const READER_MESSAGE: &str = "reader_message";

pub trait Rendezvous {
    fn send_message(&self, tag: &str) -> Result<()>;

    /// Blocks until `tag` arrives, consuming it.
    fn wait_message(&self, tag: &str) -> Result<()>;
}

/// In-process rendezvous over a pair of channels.
#[derive(Debug, Clone)]
pub struct ChannelRendezvous {
    tx: Sender<String>,
    rx: Receiver<String>,
    timeout: Duration,
}

impl ChannelRendezvous {
    /// Two connected endpoints: what one sends, the other receives.
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = crossbeam_channel::unbounded();
        let (b_tx, b_rx) = crossbeam_channel::unbounded();
        let timeout = Duration::from_millis(MESSAGE_TIMEOUT_MS);
        (
            Self {
                tx: a_tx,
                rx: b_rx,
                timeout,
            },
            Self {
                tx: b_tx,
                rx: a_rx,
                timeout,
            },
        )
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Rendezvous for ChannelRendezvous {
    fn send_message(&self, tag: &str) -> Result<()> {
        self.tx
            .send(tag.to_string())
            .map_err(|_| H5Error::InvalidArgument(format!("peer gone before '{}' was sent", tag)))?;
        Ok(())
    }

    fn wait_message(&self, tag: &str) -> Result<()> {
        match self.rx.recv_timeout(self.timeout) {
            Ok(got) if got == tag => Ok(()),
            Ok(got) => Err(H5Error::InvalidArgument(format!(
                "expected message '{}', received '{}'",
                tag, got
            ))
            .into()),
            Err(RecvTimeoutError::Timeout) => Err(H5Error::Timeout(tag.to_string()).into()),
            Err(RecvTimeoutError::Disconnected) => Err(H5Error::InvalidArgument(format!(
                "peer gone while waiting for '{}'",
                tag
            ))
            .into()),
        }
    }
}

/// Cross-process rendezvous through message files in a shared directory.
#[derive(Debug, Clone)]
pub struct FileRendezvous {
    dir: PathBuf,
    poll_interval: Duration,
    timeout: Duration,
}

impl FileRendezvous {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            poll_interval: Duration::from_millis(MESSAGE_POLL_INTERVAL_MS),
            timeout: Duration::from_millis(MESSAGE_TIMEOUT_MS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Rendezvous for FileRendezvous {
    fn send_message(&self, tag: &str) -> Result<()> {
        let tmp = self.dir.join(format!("{}.tmp", tag));
        let target = self.dir.join(tag);
        fs::write(&tmp, b"\n")
            .wrap_err_with(|| format!("failed to write message file '{}'", tmp.display()))?;
        fs::rename(&tmp, &target)
            .wrap_err_with(|| format!("failed to publish message '{}'", target.display()))?;
        debug!(tag, dir = %self.dir.display(), "sent message");
        Ok(())
    }

    fn wait_message(&self, tag: &str) -> Result<()> {
        let target = self.dir.join(tag);
        let deadline = Instant::now() + self.timeout;
        loop {
            match fs::remove_file(&target) {
                Ok(()) => {
                    debug!(tag, "received message");
                    return Ok(());
                }
                Err(e) if e.kind() == IoErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).wrap_err_with(|| {
                        format!("failed to consume message '{}'", target.display())
                    })
                }
            }
            if Instant::now() >= deadline {
                return Err(H5Error::Timeout(tag.to_string()).into());
            }
            thread::sleep(self.poll_interval);
        }
    }
}
