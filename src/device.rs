//! Device handle: lifecycle, commands, display setters and the listen loop.

use std::fmt;
use std::future::Future;
use std::io::{self, BufRead, Seek};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Instant;

use image::{GenericImageView, Rgba};
use log::{debug, info};
use streamdeck_core::{
    DeckError, DialId, HasInfoBar, HasTouchPoints, HasTouchStrip, KeyId, Model, Point, Rect,
    Result, TouchPointId, TouchType, Transport,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::codec;
use crate::config::Config;
use crate::input::{
    dial_rotate_fn, dial_switch_fn, key_fn, swipe_fn, touch_fn, touch_point_fn, Dial,
    ErrorSink, HandlerError, HandlerResult, Handlers, InputDecoder, InputEvent, Key, Slots,
    TouchPoint,
};
use crate::registry;

/// Report id of every input report
const INPUT_REPORT_ID: u8 = 1;

const BLACK: [u8; 3] = [0, 0, 0];

type InputRead = JoinHandle<Result<(u8, Vec<u8>)>>;

/// State living from `open` to `close`
struct Session {
    /// Counts opens, so listeners of an earlier session can tell it ended
    generation: u64,
    stop: CancellationToken,
    /// Input read still running when the last listener stopped, resumed by the next one
    pending_read: Option<InputRead>,
}

impl Session {
    fn new(generation: u64) -> Self {
        Self {
            generation,
            stop: CancellationToken::new(),
            pending_read: None,
        }
    }

    /// Stop listening and drop any read in flight
    fn end(self) {
        self.stop.cancel();
    }
}

struct Inner {
    transport: Arc<dyn Transport>,
    model: &'static dyn Model,
    open: AtomicBool,
    slots: OnceLock<Slots>,
    decoder: Mutex<InputDecoder>,
    /// Present while open
    session: Mutex<Option<Session>>,
    opened: AtomicU64,
}

/// A connected panel.
///
/// Cheap to clone; every clone drives the same hardware. Handlers receive a clone of the
/// device that triggered them.
#[derive(Clone)]
pub struct Device {
    inner: Arc<Inner>,
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("model", &self.inner.model.info().id)
            .field("serial", &self.serial_number())
            .field("open", &self.is_open())
            .finish()
    }
}

impl Device {
    /// Wrap a transport, resolving the model from its USB identifiers
    pub fn new(transport: Arc<dyn Transport>) -> Result<Self> {
        let model = registry::resolve(transport.vendor_id(), transport.product_id())?;
        Ok(Self {
            inner: Arc::new(Inner {
                transport,
                model,
                open: AtomicBool::new(false),
                slots: OnceLock::new(),
                decoder: Mutex::new(InputDecoder::new(model)),
                session: Mutex::new(None),
                opened: AtomicU64::new(0),
            }),
        })
    }

    pub fn model(&self) -> &'static dyn Model {
        self.inner.model
    }

    fn transport(&self) -> &dyn Transport {
        &*self.inner.transport
    }

    fn slots(&self) -> &Slots {
        self.inner.slots.get_or_init(|| Slots::new(self.inner.model))
    }

    fn session(&self) -> MutexGuard<'_, Option<Session>> {
        self.inner
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // === Lifecycle ===

    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::SeqCst) && self.inner.transport.is_open()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(DeckError::AlreadyClosed)
        }
    }

    pub fn open(&self) -> Result<()> {
        if self.is_open() {
            return Err(DeckError::AlreadyOpen);
        }
        self.transport().open()?;
        self.inner.open.store(true, Ordering::SeqCst);
        let generation = self.inner.opened.fetch_add(1, Ordering::SeqCst) + 1;
        *self.session() = Some(Session::new(generation));
        info!("opened {} ({})", self.model_id(), self.serial_number());
        Ok(())
    }

    /// Clear every display, stop listening and close the transport
    pub fn close(&self) -> Result<()> {
        self.ensure_open()?;
        self.clear_displays()?;
        if let Some(session) = self.session().take() {
            session.end();
        }
        self.transport().close()?;
        self.inner.open.store(false, Ordering::SeqCst);
        info!("closed {} ({})", self.model_id(), self.serial_number());
        Ok(())
    }

    fn clear_displays(&self) -> Result<()> {
        self.for_each_key(|key| self.clear_key(key))?;
        self.for_each_touch_point(|tp| self.clear_touch_point(tp))?;
        if self.info_bar_supported() {
            self.clear_info_bar()?;
        }
        if self.touch_strip_supported() {
            self.clear_touch_strip()?;
        }
        Ok(())
    }

    /// Reboot the device. The handle is closed without further communication.
    pub fn reset(&self) -> Result<()> {
        self.ensure_open()?;
        self.inner.model.reset(self.transport())?;
        if let Some(session) = self.session().take() {
            session.end();
        }
        self.inner.open.store(false, Ordering::SeqCst);
        self.transport().close()
    }

    /// Set display brightness in percent. Values above 100 are clamped.
    pub fn set_brightness(&self, percent: u8) -> Result<()> {
        self.ensure_open()?;
        self.inner
            .model
            .set_brightness(self.transport(), percent.min(100))
    }

    /// Apply user preferences for this device
    pub fn apply_config(&self, config: &Config) -> Result<()> {
        match config.brightness_for(&self.serial_number()) {
            Some(brightness) => self.set_brightness(brightness),
            None => Ok(()),
        }
    }

    // === Information ===

    /// Product string reported by the device
    pub fn model_name(&self) -> String {
        self.inner.transport.product()
    }

    pub fn model_id(&self) -> &'static str {
        self.inner.model.info().id
    }

    pub fn serial_number(&self) -> String {
        self.inner.transport.serial_number()
    }

    pub fn firmware_version(&self) -> Result<String> {
        self.ensure_open()?;
        self.inner.model.firmware_version(self.transport())
    }

    pub fn key_count(&self) -> usize {
        self.inner.model.info().keys.count
    }

    pub fn touch_point_count(&self) -> usize {
        self.inner
            .model
            .as_touch_points()
            .map_or(0, |tp| tp.touch_points().count)
    }

    pub fn dial_count(&self) -> usize {
        self.inner.model.as_dials().map_or(0, |d| d.dials().count)
    }

    pub fn info_bar_supported(&self) -> bool {
        self.inner.model.as_info_bar().is_some()
    }

    pub fn touch_strip_supported(&self) -> bool {
        self.inner.model.as_touch_strip().is_some()
    }

    pub fn key_image_rect(&self) -> Rect {
        self.inner.model.info().key_surface.rect
    }

    pub fn info_bar_image_rect(&self) -> Result<Rect> {
        Ok(self.info_bar()?.info_bar_surface().rect)
    }

    pub fn touch_strip_image_rect(&self) -> Result<Rect> {
        Ok(self.touch_strip()?.touch_strip_surface().rect)
    }

    /// Call `f` for every key in ascending order, stopping at the first error
    pub fn for_each_key<E, F>(&self, mut f: F) -> std::result::Result<(), E>
    where
        F: FnMut(KeyId) -> std::result::Result<(), E>,
    {
        (0..self.key_count()).try_for_each(|i| f(KeyId::from_index(i)))
    }

    pub fn for_each_touch_point<E, F>(&self, mut f: F) -> std::result::Result<(), E>
    where
        F: FnMut(TouchPointId) -> std::result::Result<(), E>,
    {
        (0..self.touch_point_count()).try_for_each(|i| f(TouchPointId::from_index(i)))
    }

    pub fn for_each_dial<E, F>(&self, mut f: F) -> std::result::Result<(), E>
    where
        F: FnMut(DialId) -> std::result::Result<(), E>,
    {
        (0..self.dial_count()).try_for_each(|i| f(DialId::from_index(i)))
    }

    // === Validation ===

    fn validate_key(&self, key: KeyId) -> Result<()> {
        if key.0 == 0 || key.index() >= self.key_count() {
            return Err(DeckError::InvalidKey(key));
        }
        Ok(())
    }

    fn touch_points(&self, tp: TouchPointId) -> Result<&'static dyn HasTouchPoints> {
        let touch_points = self
            .inner
            .model
            .as_touch_points()
            .ok_or(DeckError::TouchPointNotSupported)?;
        if tp.0 == 0 || tp.index() >= touch_points.touch_points().count {
            return Err(DeckError::InvalidTouchPoint(tp));
        }
        Ok(touch_points)
    }

    fn validate_dial(&self, dial: DialId) -> Result<()> {
        let dials = self
            .inner
            .model
            .as_dials()
            .ok_or(DeckError::DialNotSupported)?;
        if dial.0 == 0 || dial.index() >= dials.dials().count {
            return Err(DeckError::InvalidDial(dial));
        }
        Ok(())
    }

    fn info_bar(&self) -> Result<&'static dyn HasInfoBar> {
        self.inner
            .model
            .as_info_bar()
            .ok_or(DeckError::InfoBarNotSupported)
    }

    fn touch_strip(&self) -> Result<&'static dyn HasTouchStrip> {
        self.inner
            .model
            .as_touch_strip()
            .ok_or(DeckError::TouchStripNotSupported)
    }

    // === Keys ===

    pub fn set_key_image<I>(&self, key: KeyId, image: &I) -> Result<()>
    where
        I: GenericImageView<Pixel = Rgba<u8>>,
    {
        self.ensure_open()?;
        self.validate_key(key)?;
        let data = codec::encode_for(image, &self.inner.model.info().key_surface)?;
        self.inner.model.send_key_image(self.transport(), key, &data)
    }

    pub fn set_key_image_from_reader<R: BufRead + Seek>(&self, key: KeyId, reader: R) -> Result<()> {
        self.ensure_open()?;
        self.validate_key(key)?;
        self.set_key_image(key, &codec::decode(reader)?)
    }

    pub fn set_key_image_from_file<P: AsRef<Path>>(&self, key: KeyId, path: P) -> Result<()> {
        self.ensure_open()?;
        self.validate_key(key)?;
        self.set_key_image(key, &codec::open(path)?)
    }

    pub fn set_key_color(&self, key: KeyId, rgb: [u8; 3]) -> Result<()> {
        self.set_key_image(key, &codec::solid(self.key_image_rect(), rgb))
    }

    pub fn clear_key(&self, key: KeyId) -> Result<()> {
        self.set_key_color(key, BLACK)
    }

    // === Info bar ===

    pub fn set_info_bar_image<I>(&self, image: &I) -> Result<()>
    where
        I: GenericImageView<Pixel = Rgba<u8>>,
    {
        self.ensure_open()?;
        let info_bar = self.info_bar()?;
        let data = codec::encode_for(image, info_bar.info_bar_surface())?;
        info_bar.send_info_bar_image(self.transport(), &data)
    }

    pub fn set_info_bar_image_from_reader<R: BufRead + Seek>(&self, reader: R) -> Result<()> {
        self.ensure_open()?;
        self.info_bar()?;
        self.set_info_bar_image(&codec::decode(reader)?)
    }

    pub fn set_info_bar_image_from_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.ensure_open()?;
        self.info_bar()?;
        self.set_info_bar_image(&codec::open(path)?)
    }

    pub fn set_info_bar_color(&self, rgb: [u8; 3]) -> Result<()> {
        let rect = self.info_bar_image_rect()?;
        self.set_info_bar_image(&codec::solid(rect, rgb))
    }

    pub fn clear_info_bar(&self) -> Result<()> {
        self.set_info_bar_color(BLACK)
    }

    // === Touch points ===

    pub fn set_touch_point_color(&self, tp: TouchPointId, rgb: [u8; 3]) -> Result<()> {
        self.ensure_open()?;
        self.touch_points(tp)?
            .set_touch_point_color(self.transport(), tp, rgb)
    }

    pub fn clear_touch_point(&self, tp: TouchPointId) -> Result<()> {
        self.set_touch_point_color(tp, BLACK)
    }

    // === Touch strip ===

    fn send_touch_strip_image<I>(&self, image: &I, rect: Option<Rect>) -> Result<()>
    where
        I: GenericImageView<Pixel = Rgba<u8>>,
    {
        self.ensure_open()?;
        let strip = self.touch_strip()?;
        let surface = strip.touch_strip_surface();
        let rect = self.touch_strip_rect(rect)?;
        let data = codec::encode(image, rect.at_origin(), surface.format, surface.transform)?;
        strip.send_touch_strip_image(self.transport(), &data, rect)
    }

    /// Whole strip, or `rect` if it lies inside the strip
    fn touch_strip_rect(&self, rect: Option<Rect>) -> Result<Rect> {
        let strip = self.touch_strip_image_rect()?;
        match rect {
            None => Ok(strip),
            Some(rect) if strip.contains(&rect) => Ok(rect),
            Some(rect) => Err(DeckError::TouchStripRectInvalid(rect)),
        }
    }

    pub fn set_touch_strip_image<I>(&self, image: &I) -> Result<()>
    where
        I: GenericImageView<Pixel = Rgba<u8>>,
    {
        self.send_touch_strip_image(image, None)
    }

    /// Update the part of the strip covered by `rect`
    pub fn set_touch_strip_image_with_rect<I>(&self, image: &I, rect: Rect) -> Result<()>
    where
        I: GenericImageView<Pixel = Rgba<u8>>,
    {
        self.send_touch_strip_image(image, Some(rect))
    }

    pub fn set_touch_strip_image_from_reader<R: BufRead + Seek>(&self, reader: R) -> Result<()> {
        self.ensure_open()?;
        self.touch_strip_rect(None)?;
        self.send_touch_strip_image(&codec::decode(reader)?, None)
    }

    pub fn set_touch_strip_image_from_reader_with_rect<R: BufRead + Seek>(
        &self,
        reader: R,
        rect: Rect,
    ) -> Result<()> {
        self.ensure_open()?;
        self.touch_strip_rect(Some(rect))?;
        self.send_touch_strip_image(&codec::decode(reader)?, Some(rect))
    }

    pub fn set_touch_strip_image_from_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.ensure_open()?;
        self.touch_strip_rect(None)?;
        self.send_touch_strip_image(&codec::open(path)?, None)
    }

    pub fn set_touch_strip_image_from_file_with_rect<P: AsRef<Path>>(
        &self,
        path: P,
        rect: Rect,
    ) -> Result<()> {
        self.ensure_open()?;
        self.touch_strip_rect(Some(rect))?;
        self.send_touch_strip_image(&codec::open(path)?, Some(rect))
    }

    pub fn set_touch_strip_color(&self, rgb: [u8; 3]) -> Result<()> {
        let rect = self.touch_strip_image_rect()?;
        self.send_touch_strip_image(&codec::solid(rect, rgb), None)
    }

    pub fn set_touch_strip_color_with_rect(&self, rgb: [u8; 3], rect: Rect) -> Result<()> {
        self.send_touch_strip_image(&codec::solid(rect, rgb), Some(rect))
    }

    pub fn clear_touch_strip(&self) -> Result<()> {
        self.set_touch_strip_color(BLACK)
    }

    pub fn clear_touch_strip_with_rect(&self, rect: Rect) -> Result<()> {
        self.set_touch_strip_color_with_rect(BLACK, rect)
    }

    // === Handlers ===

    /// Run `handler` on every press of `key`
    pub fn add_key_handler<F, Fut>(&self, key: KeyId, handler: F) -> Result<()>
    where
        F: Fn(Device, Key) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.validate_key(key)?;
        let handler = key_fn(handler);
        self.slots().inputs[key.index()].update_handlers(|handlers| {
            if let Handlers::Key(list) = handlers {
                list.push(handler);
            }
        });
        Ok(())
    }

    pub fn add_touch_point_handler<F, Fut>(&self, tp: TouchPointId, handler: F) -> Result<()>
    where
        F: Fn(Device, TouchPoint) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.touch_points(tp)?;
        let handler = touch_point_fn(handler);
        self.slots().inputs[self.key_count() + tp.index()].update_handlers(|handlers| {
            if let Handlers::TouchPoint(list) = handlers {
                list.push(handler);
            }
        });
        Ok(())
    }

    /// Run `handler` every time the switch of `dial` closes
    pub fn add_dial_switch_handler<F, Fut>(&self, dial: DialId, handler: F) -> Result<()>
    where
        F: Fn(Device, Dial) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.validate_dial(dial)?;
        let handler = dial_switch_fn(handler);
        self.slots().dials[dial.index()].update_handlers(|handlers| {
            if let Handlers::Dial { switch, .. } = handlers {
                switch.push(handler);
            }
        });
        Ok(())
    }

    /// Run `handler` with the signed step count every time `dial` turns
    pub fn add_dial_rotate_handler<F, Fut>(&self, dial: DialId, handler: F) -> Result<()>
    where
        F: Fn(Device, Dial, i8) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.validate_dial(dial)?;
        let handler = dial_rotate_fn(handler);
        self.slots().dials[dial.index()].update_handlers(|handlers| {
            if let Handlers::Dial { rotate, .. } = handlers {
                rotate.push(handler);
            }
        });
        Ok(())
    }

    pub fn add_touch_strip_touch_handler<F, Fut>(&self, handler: F) -> Result<()>
    where
        F: Fn(Device, TouchType, Point) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.touch_strip()?;
        let handler = touch_fn(handler);
        if let Some(slot) = &self.slots().touch_strip {
            slot.update_handlers(|handlers| {
                if let Handlers::TouchStrip { touch, .. } = handlers {
                    touch.push(handler);
                }
            });
        }
        Ok(())
    }

    pub fn add_touch_strip_swipe_handler<F, Fut>(&self, handler: F) -> Result<()>
    where
        F: Fn(Device, Point, Point) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.touch_strip()?;
        let handler = swipe_fn(handler);
        if let Some(slot) = &self.slots().touch_strip {
            slot.update_handlers(|handlers| {
                if let Handlers::TouchStrip { swipe, .. } = handlers {
                    swipe.push(handler);
                }
            });
        }
        Ok(())
    }

    // === Listening ===

    /// Poll input reports and dispatch handlers until the device is closed or
    /// [`Device::stop_listening`] is called.
    ///
    /// A read still in flight when listening stops is handed to the next call, so no
    /// report is lost between listeners.
    ///
    /// Handler errors are sent to `errors` without blocking, and logged when the channel is
    /// full or absent.
    pub async fn listen(&self, errors: Option<mpsc::Sender<HandlerError>>) -> Result<()> {
        self.ensure_open()?;
        let (generation, token) = self
            .session()
            .as_ref()
            .map(|session| (session.generation, session.stop.clone()))
            .ok_or(DeckError::AlreadyClosed)?;
        let errors = ErrorSink(errors);
        let slots = self.slots();
        debug!("listening on {}", self.serial_number());

        loop {
            let pending = self
                .session()
                .as_mut()
                .filter(|session| session.generation == generation)
                .and_then(|session| session.pending_read.take());
            let mut read = pending.unwrap_or_else(|| {
                let transport = self.inner.transport.clone();
                tokio::task::spawn_blocking(move || transport.get_input_report())
            });
            let report = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                report = &mut read => Some(report),
            };
            let Some(report) = report else {
                // a closed device drops the read with its session
                if let Some(session) = self
                    .session()
                    .as_mut()
                    .filter(|session| session.generation == generation)
                {
                    session.pending_read = Some(read);
                }
                debug!("stopped listening on {}", self.serial_number());
                return Ok(());
            };

            let (id, payload) = report.map_err(io::Error::other)??;
            if id != INPUT_REPORT_ID {
                return Err(DeckError::UnexpectedReportId(id));
            }

            let at = Instant::now();
            let events = self
                .inner
                .decoder
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .decode(&payload);
            for event in events {
                self.dispatch(slots, event, at, &errors);
            }
        }
    }

    /// Make a running [`Device::listen`] return. The device stays open.
    pub fn stop_listening(&self) {
        if let Some(session) = self.session().as_mut() {
            session.stop.cancel();
            session.stop = CancellationToken::new();
        }
    }

    fn dispatch(&self, slots: &Slots, event: InputEvent, at: Instant, errors: &ErrorSink) {
        match event {
            InputEvent::Press(i) => {
                if let Some(slot) = slots.inputs.get(i) {
                    slot.press(self, at, errors);
                }
            },
            InputEvent::Release(i) => {
                if let Some(slot) = slots.inputs.get(i) {
                    slot.release(at);
                }
            },
            InputEvent::DialPress(i) => {
                if let Some(slot) = slots.dials.get(i) {
                    slot.press(self, at, errors);
                }
            },
            InputEvent::DialRelease(i) => {
                if let Some(slot) = slots.dials.get(i) {
                    slot.release(at);
                }
            },
            InputEvent::Rotate(i, delta) => {
                if let Some(slot) = slots.dials.get(i) {
                    slot.rotate(self, delta, errors);
                }
            },
            InputEvent::Touch(kind, point) => {
                if let Some(slot) = &slots.touch_strip {
                    slot.touch(self, kind, point, errors);
                }
            },
            InputEvent::Swipe(origin, destination) => {
                if let Some(slot) = &slots.touch_strip {
                    slot.swipe(self, origin, destination, errors);
                }
            },
        }
    }
}

/// Pick the device matching `serial`. An empty serial matches only when there is exactly
/// one device.
pub(crate) fn select_device(mut devices: Vec<Device>, serial: &str) -> Result<Device> {
    if serial.is_empty() {
        return match devices.len() {
            0 => Err(DeckError::NoDeviceFound(String::new())),
            1 => Ok(devices.remove(0)),
            _ => Err(DeckError::MoreThanOneDeviceFound(
                devices.iter().map(Device::serial_number).collect(),
            )),
        };
    }
    devices
        .into_iter()
        .find(|device| device.serial_number() == serial)
        .ok_or_else(|| DeckError::NoDeviceFound(serial.to_string()))
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Cursor;
    use std::time::Duration;

    use image::{DynamicImage, RgbaImage};
    use streamdeck_core::mock::MockTransport;
    use streamdeck_core::{ReportLengths, ELGATO_VENDOR_ID};

    use super::*;
    use crate::input::handler_error_channel;

    pub(crate) fn mock_device(product_id: u16) -> (Device, Arc<MockTransport>) {
        let model = registry::resolve(ELGATO_VENDOR_ID, product_id).unwrap();
        let transport = Arc::new(MockTransport::new(
            ELGATO_VENDOR_ID,
            product_id,
            model.info().reports,
        ));
        let device = Device::new(transport.clone()).unwrap();
        (device, transport)
    }

    fn open_mock(product_id: u16) -> (Device, Arc<MockTransport>) {
        let (device, transport) = mock_device(product_id);
        device.open().unwrap();
        (device, transport)
    }

    /// Reassemble the images sent to the mini from its output pages
    fn mini_images(outputs: &[(u8, Vec<u8>)]) -> Vec<(u8, RgbaImage)> {
        let mut images = Vec::new();
        let mut payload = Vec::new();
        for (id, report) in outputs {
            assert_eq!(*id, 2);
            payload.extend_from_slice(&report[15..]);
            if report[3] == 1 {
                let key = report[4];
                let image = image::load_from_memory(&payload).unwrap().to_rgba8();
                images.push((key, image));
                payload.clear();
            }
        }
        images
    }

    fn mini_input(states: [u8; 6]) -> Vec<u8> {
        let mut payload = vec![0u8; 16];
        payload[..6].copy_from_slice(&states);
        payload
    }

    #[test]
    fn new_rejects_unknown_hardware() {
        let transport = Arc::new(MockTransport::new(
            ELGATO_VENDOR_ID,
            0x0fff,
            ReportLengths {
                feature: 32,
                input: 32,
                output: 1024,
            },
        ));
        let err = Device::new(transport).unwrap_err();
        assert!(matches!(err, DeckError::NotSupported { .. }));
    }

    #[test]
    fn set_key_color_then_clear() {
        let (device, transport) = open_mock(0x0063);
        assert_eq!(device.key_count(), 6);

        device.set_key_color(KeyId(1), [255, 0, 0]).unwrap();
        device.clear_key(KeyId(1)).unwrap();

        let images = mini_images(&transport.outputs());
        assert_eq!(images.len(), 2);
        for ((key, image), expected) in images.iter().zip([[255, 0, 0, 255], [0, 0, 0, 255]]) {
            assert_eq!(*key, 1);
            assert_eq!(image.dimensions(), (80, 80));
            assert!(image.pixels().all(|p| p.0 == expected));
        }
    }

    #[test]
    fn image_from_reader() {
        let (device, transport) = open_mock(0x0080);
        let mut png = Vec::new();
        DynamicImage::ImageRgba8(RgbaImage::new(10, 30))
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        device
            .set_key_image_from_reader(KeyId(15), Cursor::new(png))
            .unwrap();
        let outputs = transport.outputs();
        assert!(!outputs.is_empty());
        assert!(outputs.iter().all(|(_, r)| r[1] == 14));

        let err = device
            .set_key_image_from_reader(KeyId(1), Cursor::new(b"not an image".to_vec()))
            .unwrap_err();
        assert!(matches!(err, DeckError::Image(_)));
    }

    #[test]
    fn invalid_controls_are_rejected() {
        let (device, _) = open_mock(0x0063);
        assert!(matches!(
            device.set_key_color(KeyId(7), [0; 3]),
            Err(DeckError::InvalidKey(KeyId(7)))
        ));
        assert!(matches!(
            device.clear_key(KeyId(0)),
            Err(DeckError::InvalidKey(_))
        ));
        assert!(matches!(
            device.set_touch_point_color(TouchPointId(1), [0; 3]),
            Err(DeckError::TouchPointNotSupported)
        ));
        assert!(matches!(
            device.clear_info_bar(),
            Err(DeckError::InfoBarNotSupported)
        ));
        assert!(matches!(
            device.clear_touch_strip(),
            Err(DeckError::TouchStripNotSupported)
        ));
        assert!(matches!(
            device.add_dial_switch_handler(DialId(1), |_, _| async { HandlerResult::Ok(()) }),
            Err(DeckError::DialNotSupported)
        ));

        let (neo, _) = open_mock(0x009a);
        assert!(matches!(
            neo.clear_touch_point(TouchPointId(3)),
            Err(DeckError::InvalidTouchPoint(_))
        ));
    }

    #[test]
    fn touch_strip_rect_must_fit() {
        let (device, transport) = open_mock(0x0084);
        assert_eq!(device.touch_strip_image_rect().unwrap(), Rect::sized(800, 100));

        let rect = Rect::new(700, 0, 200, 100);
        assert!(matches!(
            device.set_touch_strip_color_with_rect([0, 0, 255], rect),
            Err(DeckError::TouchStripRectInvalid(r)) if r == rect
        ));
        assert!(transport.outputs().is_empty());

        device
            .set_touch_strip_color_with_rect([0, 0, 255], Rect::new(200, 0, 200, 100))
            .unwrap();
        let outputs = transport.outputs();
        assert_eq!(outputs[0].1[..9], [12, 200, 0, 0, 0, 200, 0, 100, 0]);
    }

    #[test]
    fn close_clears_displays_first() {
        let (device, transport) = open_mock(0x009a);
        device.close().unwrap();
        assert!(!device.is_open());
        assert!(!transport.is_open());

        // every key, then the info bar
        let outputs = transport.outputs();
        let last_pages: Vec<(u8, u8)> = outputs
            .iter()
            .filter(|(_, r)| r[2] == 1)
            .map(|(_, r)| (r[0], r[1]))
            .collect();
        let keys: Vec<(u8, u8)> = (0..8).map(|k| (0x07, k)).collect();
        assert_eq!(last_pages[..8], keys[..]);
        assert_eq!(last_pages[8..], [(0x0b, 0)]);

        let features = transport.features();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0].1[..5], [0x06, 8, 0, 0, 0]);
        assert_eq!(features[1].1[..5], [0x06, 9, 0, 0, 0]);

        assert!(matches!(device.close(), Err(DeckError::AlreadyClosed)));
    }

    #[test]
    fn closed_device_rejects_operations() {
        let (device, _) = mock_device(0x0080);
        assert!(matches!(device.set_brightness(10), Err(DeckError::AlreadyClosed)));
        assert!(matches!(device.firmware_version(), Err(DeckError::AlreadyClosed)));
        assert!(matches!(device.clear_key(KeyId(1)), Err(DeckError::AlreadyClosed)));
        assert!(matches!(device.reset(), Err(DeckError::AlreadyClosed)));

        device.open().unwrap();
        assert!(matches!(device.open(), Err(DeckError::AlreadyOpen)));
    }

    #[test]
    fn brightness_is_clamped() {
        let (device, transport) = open_mock(0x0080);
        device.set_brightness(150).unwrap();
        device.set_brightness(42).unwrap();
        let features = transport.features();
        assert_eq!(features[0].1[..2], [0x08, 100]);
        assert_eq!(features[1].1[..2], [0x08, 42]);
    }

    #[test]
    fn reset_closes_without_clearing() {
        let (device, transport) = open_mock(0x0063);
        device.reset().unwrap();
        assert!(!device.is_open());
        assert!(transport.outputs().is_empty());
        assert_eq!(transport.features(), vec![(11, {
            let mut payload = vec![0u8; 16];
            payload[0] = 0x63;
            payload
        })]);
    }

    #[test]
    fn information() {
        let (device, transport) = open_mock(0x0084);
        transport.set_feature_response(5, b"\x0c\x00\x00\x00\x001.01.000".to_vec());
        assert_eq!(device.firmware_version().unwrap(), "1.01.000");
        assert_eq!(device.model_id(), "plus");
        assert_eq!(device.model_name(), "Mock Deck");

        let named = Device::new(Arc::new(
            MockTransport::new(ELGATO_VENDOR_ID, 0x0084, registry::models()[2].info().reports)
                .with_product("Stream Deck +"),
        ))
        .unwrap();
        assert_eq!(named.model_name(), "Stream Deck +");
        assert_eq!(device.serial_number(), "MOCK0001");
        assert_eq!(device.dial_count(), 4);
        assert_eq!(device.touch_point_count(), 0);
        assert!(device.touch_strip_supported());
        assert!(!device.info_bar_supported());
        assert_eq!(device.key_image_rect(), Rect::sized(120, 120));
        assert!(device.info_bar_image_rect().is_err());
    }

    #[test]
    fn for_each_stops_at_first_error() {
        let (device, _) = mock_device(0x0080);
        let mut seen = Vec::new();
        let result = device.for_each_key(|key| {
            seen.push(key);
            if key == KeyId(3) {
                Err("stop")
            } else {
                Ok(())
            }
        });
        assert_eq!(result, Err("stop"));
        assert_eq!(seen, [KeyId(1), KeyId(2), KeyId(3)]);

        let mut dials = Vec::new();
        let (plus, _) = mock_device(0x0084);
        plus.for_each_dial(|dial| {
            dials.push(dial);
            Ok::<_, ()>(())
        })
        .unwrap();
        assert_eq!(dials.len(), 4);
    }

    #[test]
    fn select_by_serial() {
        let make = |serial: &str| {
            let transport =
                MockTransport::new(ELGATO_VENDOR_ID, 0x0080, registry::models()[1].info().reports)
                    .with_serial(serial);
            Device::new(Arc::new(transport)).unwrap()
        };

        let device = select_device(vec![make("A")], "").unwrap();
        assert_eq!(device.serial_number(), "A");

        match select_device(vec![make("A"), make("B")], "") {
            Err(DeckError::MoreThanOneDeviceFound(serials)) => assert_eq!(serials, ["A", "B"]),
            other => panic!("unexpected {other:?}"),
        }

        let device = select_device(vec![make("A"), make("B")], "B").unwrap();
        assert_eq!(device.serial_number(), "B");

        assert!(matches!(
            select_device(vec![make("A")], "C"),
            Err(DeckError::NoDeviceFound(s)) if s == "C"
        ));
        assert!(matches!(
            select_device(Vec::new(), ""),
            Err(DeckError::NoDeviceFound(_))
        ));
    }

    #[test]
    fn apply_config_brightness() {
        let (device, transport) = open_mock(0x0080);
        let config = Config::from_toml(
            r#"
            [general]
            brightness = 30

            [devices.MOCK0001]
            brightness = 80
            "#,
        )
        .unwrap();
        device.apply_config(&config).unwrap();
        assert_eq!(transport.features()[0].1[..2], [0x08, 80]);
    }

    #[tokio::test]
    async fn press_and_release_dispatch_once() {
        let (device, transport) = open_mock(0x0063);
        let (tx, mut rx) = mpsc::unbounded_channel();
        device
            .add_key_handler(KeyId(2), move |_, key| {
                let tx = tx.clone();
                async move {
                    let held = key.wait_for_release().await;
                    tx.send((key.id(), held))?;
                    HandlerResult::Ok(())
                }
            })
            .unwrap();

        transport.push_input(1, mini_input([0, 1, 0, 0, 0, 0]));
        transport.push_input(1, mini_input([0, 1, 0, 0, 0, 0]));
        transport.push_input(1, mini_input([0, 0, 0, 0, 0, 0]));
        transport.push_input(1, mini_input([0, 0, 0, 0, 0, 0]));

        // the mock runs dry after the queued reports
        let err = device.listen(None).await.unwrap_err();
        assert!(matches!(err, DeckError::Io(_)));

        let (key, held) = rx.recv().await.unwrap();
        assert_eq!(key, KeyId(2));
        assert!(held >= Duration::ZERO);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unexpected_report_id_aborts() {
        let (device, transport) = open_mock(0x0080);
        transport.push_input(3, vec![0; 511]);
        assert!(matches!(
            device.listen(None).await,
            Err(DeckError::UnexpectedReportId(3))
        ));
    }

    #[tokio::test]
    async fn dial_rotation_and_errors() {
        let (device, transport) = open_mock(0x0084);
        device
            .add_dial_rotate_handler(DialId(2), |_, dial, delta| async move {
                HandlerResult::Err(format!("{dial} turned {delta}").into())
            })
            .unwrap();

        let mut payload = vec![0u8; 511];
        payload[0] = 3;
        payload[3] = 1;
        payload[5] = 0xfe;
        transport.push_input(1, payload);

        let (tx, mut rx) = handler_error_channel();
        let _ = device.listen(Some(tx)).await;
        let err = rx.recv().await.unwrap();
        assert!(matches!(err, HandlerError::Dial { dial: DialId(2), .. }));
        assert_eq!(err.to_string(), "DIAL_2 turned -2 [DIAL_2]");
    }

    #[tokio::test]
    async fn touch_strip_swipe() {
        let (device, transport) = open_mock(0x0084);
        let (tx, mut rx) = mpsc::unbounded_channel();
        device
            .add_touch_strip_swipe_handler(move |_, origin, destination| {
                let tx = tx.clone();
                async move {
                    tx.send((origin, destination))?;
                    HandlerResult::Ok(())
                }
            })
            .unwrap();

        let mut payload = vec![0u8; 511];
        payload[0] = 2;
        payload[3] = 3;
        payload[5..13].copy_from_slice(&[10, 0, 20, 0, 0x90, 0x01, 30, 0]);
        transport.push_input(1, payload);

        let _ = device.listen(None).await;
        assert_eq!(
            rx.recv().await.unwrap(),
            (Point::new(10, 20), Point::new(400, 30))
        );
    }

    fn open_blocking_mock(product_id: u16) -> (Device, Arc<MockTransport>) {
        let model = registry::resolve(ELGATO_VENDOR_ID, product_id).unwrap();
        let transport = Arc::new(
            MockTransport::new(ELGATO_VENDOR_ID, product_id, model.info().reports)
                .with_blocking_reads(),
        );
        let device = Device::new(transport.clone()).unwrap();
        device.open().unwrap();
        (device, transport)
    }

    fn spawn_listener(device: &Device) -> tokio::task::JoinHandle<Result<()>> {
        let listener = device.clone();
        tokio::spawn(async move { listener.listen(None).await })
    }

    async fn joined(task: tokio::task::JoinHandle<Result<()>>) -> Result<()> {
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn close_stops_blocked_listener() {
        let (device, _) = open_blocking_mock(0x0080);
        let task = spawn_listener(&device);

        // let the loop park in its read
        tokio::time::sleep(Duration::from_millis(20)).await;
        device.close().unwrap();
        assert!(joined(task).await.is_ok());
        assert!(!device.is_open());
    }

    #[tokio::test]
    async fn relisten_keeps_reports_read_after_stop() {
        let (device, transport) = open_blocking_mock(0x0063);
        let (tx, mut rx) = mpsc::unbounded_channel();
        device
            .add_key_handler(KeyId(1), move |_, key| {
                let tx = tx.clone();
                async move {
                    tx.send(key.id())?;
                    HandlerResult::Ok(())
                }
            })
            .unwrap();

        let task = spawn_listener(&device);
        tokio::time::sleep(Duration::from_millis(20)).await;
        device.stop_listening();
        assert!(joined(task).await.is_ok());
        assert!(device.is_open());

        // arrives while nobody listens
        transport.push_input(1, mini_input([1, 0, 0, 0, 0, 0]));
        tokio::time::sleep(Duration::from_millis(20)).await;

        let task = spawn_listener(&device);
        let pressed = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        assert_eq!(pressed, Some(KeyId(1)));
        assert!(rx.try_recv().is_err());

        device.stop_listening();
        assert!(joined(task).await.is_ok());
        device.close().unwrap();
    }
}
