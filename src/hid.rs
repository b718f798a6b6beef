//! [`Transport`] over hidapi, plus enumeration of connected devices.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread;
use std::time::Duration;

use hidapi::{DeviceInfo, HidApi, HidDevice};
use log::{debug, error};
use streamdeck_core::{DeckError, ReportLengths, Result, Transport};

use crate::device::select_device;
use crate::{registry, Device};

/// Time a single read waits for an input report while holding the device
const READ_TIMEOUT_MS: i32 = 20;
/// Pause between reads, letting writers take the device
const READ_BACKOFF: Duration = Duration::from_millis(1);

/// Lazy handle to hidapi
static API: LazyLock<Option<RwLock<HidApi>>> = LazyLock::new(|| match HidApi::new() {
    Ok(api) => Some(RwLock::new(api)),
    Err(e) => {
        error!("failed to init hidapi: {e}");
        None
    },
});

fn api() -> Result<&'static RwLock<HidApi>> {
    API.as_ref()
        .ok_or_else(|| DeckError::EnumerationFailed("hidapi is unavailable".into()))
}

/// One HID interface of a supported device
pub struct HidTransport {
    info: DeviceInfo,
    lengths: ReportLengths,
    device: Mutex<Option<HidDevice>>,
    /// Bumped on every open, ending reads begun against an earlier handle
    opened: AtomicU64,
}

impl HidTransport {
    pub fn new(info: DeviceInfo) -> Result<Self> {
        let model = registry::resolve(info.vendor_id(), info.product_id())?;
        Ok(Self {
            info,
            lengths: model.info().reports,
            device: Mutex::new(None),
            opened: AtomicU64::new(0),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Option<HidDevice>> {
        self.device.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_device<T>(&self, f: impl FnOnce(&HidDevice) -> Result<T>) -> Result<T> {
        let guard = self.lock();
        let device = guard.as_ref().ok_or(DeckError::AlreadyClosed)?;
        f(device)
    }
}

/// Prefix `data` with its report id
fn report(id: u8, data: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(data.len() + 1);
    buf.push(id);
    buf.extend_from_slice(data);
    buf
}

impl Transport for HidTransport {
    fn vendor_id(&self) -> u16 {
        self.info.vendor_id()
    }

    fn product_id(&self) -> u16 {
        self.info.product_id()
    }

    fn serial_number(&self) -> String {
        self.info.serial_number().unwrap_or_default().to_string()
    }

    fn product(&self) -> String {
        self.info.product_string().unwrap_or_default().to_string()
    }

    fn report_lengths(&self) -> ReportLengths {
        self.lengths
    }

    fn open(&self) -> Result<()> {
        let mut guard = self.lock();
        if guard.is_some() {
            return Err(DeckError::AlreadyOpen);
        }
        let api = api()?.read().unwrap_or_else(PoisonError::into_inner);
        let device = api
            .open_path(self.info.path())
            .map_err(|e| DeckError::OpenFailed(e.to_string()))?;
        debug!("opened {:?}", self.info.path());
        self.opened.fetch_add(1, Ordering::SeqCst);
        *guard = Some(device);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        match self.lock().take() {
            Some(_) => {
                debug!("closed {:?}", self.info.path());
                Ok(())
            },
            None => Err(DeckError::AlreadyClosed),
        }
    }

    fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    fn get_feature_report(&self, id: u8) -> Result<Vec<u8>> {
        self.with_device(|device| {
            let mut buf = vec![0u8; self.lengths.feature + 1];
            buf[0] = id;
            let len = device.get_feature_report(&mut buf)?;
            Ok(buf.get(1..len).unwrap_or_default().to_vec())
        })
    }

    fn set_feature_report(&self, id: u8, data: &[u8]) -> Result<()> {
        if data.len() > self.lengths.feature {
            return Err(DeckError::ReportBufferOverflow("feature report too long"));
        }
        self.with_device(|device| Ok(device.send_feature_report(&report(id, data))?))
    }

    fn get_input_report(&self) -> Result<(u8, Vec<u8>)> {
        let mut buf = vec![0u8; self.lengths.input + 1];
        let opened = self.opened.load(Ordering::SeqCst);
        loop {
            let len = self.with_device(|device| {
                if self.opened.load(Ordering::SeqCst) != opened {
                    return Err(DeckError::AlreadyClosed);
                }
                Ok(device.read_timeout(&mut buf, READ_TIMEOUT_MS)?)
            })?;
            if len > 0 {
                buf.truncate(len);
                let id = buf.remove(0);
                return Ok((id, buf));
            }
            thread::sleep(READ_BACKOFF);
        }
    }

    fn set_output_report(&self, id: u8, data: &[u8]) -> Result<()> {
        if data.len() > self.lengths.output {
            return Err(DeckError::ReportBufferOverflow("output report too long"));
        }
        self.with_device(|device| {
            device.write(&report(id, data))?;
            Ok(())
        })
    }
}

/// Every connected supported device, unopened
pub fn enumerate() -> Result<Vec<Device>> {
    let mut api = api()?.write().unwrap_or_else(PoisonError::into_inner);
    api.refresh_devices()
        .map_err(|e| DeckError::EnumerationFailed(e.to_string()))?;

    api.device_list()
        .filter(|info| registry::is_supported(info.vendor_id(), info.product_id()))
        .map(|info| Device::new(Arc::new(HidTransport::new(info.clone())?)))
        .collect()
}

/// Find a device by serial number. An empty serial selects the only connected device.
pub fn get_device(serial: &str) -> Result<Device> {
    select_device(enumerate()?, serial)
}
