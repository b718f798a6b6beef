//! In-memory [`Transport`] recording every write, for tests without hardware.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};

use crate::{DeckError, ReportLengths, Result, Transport};

pub struct MockTransport {
    vendor_id: u16,
    product_id: u16,
    serial: String,
    product: String,
    lengths: ReportLengths,
    open: AtomicBool,
    /// Reads wait for input instead of failing on an empty queue
    blocking: bool,
    inputs: Mutex<VecDeque<(u8, Vec<u8>)>>,
    input_ready: Condvar,
    feature_responses: Mutex<HashMap<u8, Vec<u8>>>,
    features: Mutex<Vec<(u8, Vec<u8>)>>,
    outputs: Mutex<Vec<(u8, Vec<u8>)>>,
}

impl MockTransport {
    pub fn new(vendor_id: u16, product_id: u16, lengths: ReportLengths) -> Self {
        Self {
            vendor_id,
            product_id,
            serial: String::from("MOCK0001"),
            product: String::from("Mock Deck"),
            lengths,
            open: AtomicBool::new(false),
            blocking: false,
            inputs: Mutex::default(),
            input_ready: Condvar::new(),
            feature_responses: Mutex::default(),
            features: Mutex::default(),
            outputs: Mutex::default(),
        }
    }

    pub fn with_serial(mut self, serial: &str) -> Self {
        self.serial = serial.to_string();
        self
    }

    pub fn with_product(mut self, product: &str) -> Self {
        self.product = product.to_string();
        self
    }

    /// Block reads on an empty queue until a report is pushed or the transport is closed,
    /// like a real device
    pub fn with_blocking_reads(mut self) -> Self {
        self.blocking = true;
        self
    }

    /// Queue an input report. Once the queue runs dry, reads fail with `UnexpectedEof`
    /// unless reads are blocking.
    pub fn push_input(&self, id: u8, payload: Vec<u8>) {
        self.inputs.lock().unwrap().push_back((id, payload));
        self.input_ready.notify_all();
    }

    /// Response returned for `get_feature_report(id)`
    pub fn set_feature_response(&self, id: u8, payload: Vec<u8>) {
        self.feature_responses.lock().unwrap().insert(id, payload);
    }

    /// Feature reports written so far
    pub fn features(&self) -> Vec<(u8, Vec<u8>)> {
        self.features.lock().unwrap().clone()
    }

    /// Output reports written so far
    pub fn outputs(&self) -> Vec<(u8, Vec<u8>)> {
        self.outputs.lock().unwrap().clone()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(DeckError::AlreadyClosed)
        }
    }
}

impl Transport for MockTransport {
    fn vendor_id(&self) -> u16 {
        self.vendor_id
    }

    fn product_id(&self) -> u16 {
        self.product_id
    }

    fn serial_number(&self) -> String {
        self.serial.clone()
    }

    fn product(&self) -> String {
        self.product.clone()
    }

    fn report_lengths(&self) -> ReportLengths {
        self.lengths
    }

    fn open(&self) -> Result<()> {
        if self.open.swap(true, Ordering::SeqCst) {
            return Err(DeckError::AlreadyOpen);
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Err(DeckError::AlreadyClosed);
        }
        // wake blocked readers
        let _inputs = self.inputs.lock().unwrap();
        self.input_ready.notify_all();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn get_feature_report(&self, id: u8) -> Result<Vec<u8>> {
        self.ensure_open()?;
        let mut buf = self
            .feature_responses
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_default();
        buf.resize(self.lengths.feature, 0);
        Ok(buf)
    }

    fn set_feature_report(&self, id: u8, data: &[u8]) -> Result<()> {
        self.ensure_open()?;
        if data.len() > self.lengths.feature {
            return Err(DeckError::ReportBufferOverflow("feature report too long"));
        }
        self.features.lock().unwrap().push((id, data.to_vec()));
        Ok(())
    }

    fn get_input_report(&self) -> Result<(u8, Vec<u8>)> {
        self.ensure_open()?;
        let mut inputs = self.inputs.lock().unwrap();
        loop {
            if let Some(report) = inputs.pop_front() {
                return Ok(report);
            }
            if !self.blocking {
                return Err(
                    io::Error::new(io::ErrorKind::UnexpectedEof, "no more input reports").into(),
                );
            }
            self.ensure_open()?;
            inputs = self.input_ready.wait(inputs).unwrap();
        }
    }

    fn set_output_report(&self, id: u8, data: &[u8]) -> Result<()> {
        self.ensure_open()?;
        if data.len() != self.lengths.output {
            return Err(DeckError::ReportBufferOverflow(
                "output report length does not match",
            ));
        }
        self.outputs.lock().unwrap().push((id, data.to_vec()));
        Ok(())
    }
}
