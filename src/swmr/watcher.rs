//! Polls a dataset through a `SwmrReader` and reports extent changes.

use std::thread;
use std::time::{Duration, Instant};

use eyre::Result;
use tracing::debug;

use super::reader::SwmrReader;
use crate::dataset::Hyperslab;
use crate::error::H5Error;

/// One observed change. `selection` is the region `data` covers: the
/// appended rows when only the leading axis grew, otherwise the whole
/// current extent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtentChange {
    pub generation: u64,
    pub previous: Vec<u64>,
    pub current: Vec<u64>,
    pub selection: Hyperslab,
    pub data: Vec<u8>,
}

impl ExtentChange {
    pub fn is_append(&self) -> bool {
        self.selection.offset().first().copied().unwrap_or(0) > 0
    }
}

#[derive(Debug)]
pub struct DatasetWatcher {
    reader: SwmrReader,
    dataset: String,
    last: Vec<u64>,
}

impl DatasetWatcher {
    pub fn new(reader: SwmrReader, dataset: &str) -> Result<Self> {
        let last = reader.dataset_extent(dataset)?;
        Ok(Self {
            reader,
            dataset: dataset.to_string(),
            last,
        })
    }

    pub fn extent(&self) -> &[u64] {
        &self.last
    }

    pub fn reader(&self) -> &SwmrReader {
        &self.reader
    }

    /// Refreshes once and returns the change since the previous poll, if any.
    pub fn poll(&mut self) -> Result<Option<ExtentChange>> {
        self.reader.refresh()?;
        let current = self.reader.dataset_extent(&self.dataset)?;
        if current == self.last {
            return Ok(None);
        }

        let appended_only = !current.is_empty()
            && current[0] > self.last[0]
            && current[1..] == self.last[1..];
        let selection = if appended_only {
            let mut offset = vec![0; current.len()];
            let mut count = current.clone();
            offset[0] = self.last[0];
            count[0] = current[0] - self.last[0];
            Hyperslab::new(&offset, &count)?
        } else {
            Hyperslab::all(&current)
        };
        let data = self.reader.read_region(&self.dataset, &selection)?;
        let previous = std::mem::replace(&mut self.last, current.clone());
        debug!(dataset = %self.dataset, ?previous, ?current, "extent changed");
        Ok(Some(ExtentChange {
            generation: self.reader.generation(),
            previous,
            current,
            selection,
            data,
        }))
    }

    /// Polls every `interval` until a change is seen or `timeout` passes.
    pub fn wait_for_change(&mut self, interval: Duration, timeout: Duration) -> Result<ExtentChange> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(change) = self.poll()? {
                return Ok(change);
            }
            if Instant::now() >= deadline {
                return Err(H5Error::Timeout(self.dataset.clone()).into());
            }
            thread::sleep(interval);
        }
    }
}
