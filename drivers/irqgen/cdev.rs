//! IRQ Generator character device
//!
//! Serves the latency samples to a single reader, one text line per read:
//! `<line>,<latency>,<timestamp>\n`. A read on an empty ring returns zero
//! bytes; the reader is expected to retry.

use alloc::sync::Arc;
use core::fmt::Write;
use core::sync::atomic::{AtomicBool, Ordering};

use heapless::String;

use crate::config::{MAX_LATENCIES, MIN_READ_SIZE};
use crate::drivers::irqgen::ring::{RingBuffer, Sample};
use crate::drivers::FileOperations;
use crate::{Error, Result};

/// Size of the line formatting buffer
pub const KBUF_SIZE: usize = 100;

/// Format one sample as a text line
pub fn format_sample(sample: &Sample) -> Result<String<KBUF_SIZE>> {
    let mut line = String::new();
    writeln!(line, "{},{},{}", sample.line, sample.latency, sample.timestamp)
        .map_err(|_| Error::OutOfMemory)?;
    Ok(line)
}

/// Single-open character device over a sample ring
pub struct IrqGenCdev<const N: usize = MAX_LATENCIES> {
    samples: Arc<RingBuffer<N>>,
    already_open: AtomicBool,
}

impl<const N: usize> IrqGenCdev<N> {
    /// Create a closed device reading from `samples`
    pub fn new(samples: Arc<RingBuffer<N>>) -> Self {
        Self {
            samples,
            already_open: AtomicBool::new(false),
        }
    }

    /// Whether a session is open
    pub fn is_open(&self) -> bool {
        self.already_open.load(Ordering::Acquire)
    }
}

impl<const N: usize> FileOperations for IrqGenCdev<N> {
    fn open(&self) -> Result<()> {
        log::debug!("irqgen cdev open() called");
        self.already_open
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| Error::Busy)
    }

    fn release(&self) -> Result<()> {
        log::debug!("irqgen cdev release() called");
        self.already_open
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| Error::NotOpen)
    }

    fn read(&self, buf: &mut [u8], pos: &mut u64) -> Result<usize> {
        if buf.len() < MIN_READ_SIZE {
            log::error!("read() buffer too small (<{})", MIN_READ_SIZE);
            return Err(Error::BufferTooSmall);
        }

        if !self.is_open() {
            return Err(Error::NotOpen);
        }

        let sample = match self.samples.pop() {
            Some(sample) => sample,
            None => return Ok(0),
        };

        let line = format_sample(&sample)?;
        let bytes = line.as_bytes();
        buf[..bytes.len()].copy_from_slice(bytes);
        *pos += bytes.len() as u64;

        Ok(bytes.len())
    }
}
