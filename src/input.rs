//! Input slots, handler dispatch and input report decoding.
//!
//! Every physical control owns one [`Slot`]. A press creates a fresh release channel and
//! spawns each registered handler on its own task; the matching release publishes the hold
//! duration and drops the channel, waking any handler parked in `wait_for_release`.

use std::error::Error;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, error, warn};
use streamdeck_core::{
    Control, DialId, InputRange, KeyId, Model, Point, TouchPointId, TouchType,
};
use tokio::sync::{mpsc, watch};

use crate::Device;

pub type BoxError = Box<dyn Error + Send + Sync>;

/// Value returned by every input handler
pub type HandlerResult = std::result::Result<(), BoxError>;

/// Error returned by an input handler, tagged with the control that triggered it
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("{source} [{key}]")]
    Key { key: KeyId, source: BoxError },
    #[error("{source} [{touch_point}]")]
    TouchPoint {
        touch_point: TouchPointId,
        source: BoxError,
    },
    #[error("{source} [{dial}]")]
    Dial { dial: DialId, source: BoxError },
    #[error("{source} [{kind}: {point}]")]
    TouchStripTouch {
        kind: TouchType,
        point: Point,
        source: BoxError,
    },
    #[error("{source} [{origin} {destination}]")]
    TouchStripSwipe {
        origin: Point,
        destination: Point,
        source: BoxError,
    },
}

/// Bounded queue handler errors are delivered to while listening
pub fn handler_error_channel() -> (mpsc::Sender<HandlerError>, mpsc::Receiver<HandlerError>) {
    mpsc::channel(1)
}

type KeyFn = Arc<dyn Fn(Device, Key) -> BoxFuture<'static, HandlerResult> + Send + Sync>;
type TouchPointFn =
    Arc<dyn Fn(Device, TouchPoint) -> BoxFuture<'static, HandlerResult> + Send + Sync>;
type DialSwitchFn = Arc<dyn Fn(Device, Dial) -> BoxFuture<'static, HandlerResult> + Send + Sync>;
type DialRotateFn =
    Arc<dyn Fn(Device, Dial, i8) -> BoxFuture<'static, HandlerResult> + Send + Sync>;
type TouchFn =
    Arc<dyn Fn(Device, TouchType, Point) -> BoxFuture<'static, HandlerResult> + Send + Sync>;
type SwipeFn =
    Arc<dyn Fn(Device, Point, Point) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

pub(crate) fn key_fn<F, Fut>(f: F) -> KeyFn
where
    F: Fn(Device, Key) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |device, key| f(device, key).boxed())
}

pub(crate) fn touch_point_fn<F, Fut>(f: F) -> TouchPointFn
where
    F: Fn(Device, TouchPoint) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |device, tp| f(device, tp).boxed())
}

pub(crate) fn dial_switch_fn<F, Fut>(f: F) -> DialSwitchFn
where
    F: Fn(Device, Dial) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |device, dial| f(device, dial).boxed())
}

pub(crate) fn dial_rotate_fn<F, Fut>(f: F) -> DialRotateFn
where
    F: Fn(Device, Dial, i8) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |device, dial, delta| f(device, dial, delta).boxed())
}

pub(crate) fn touch_fn<F, Fut>(f: F) -> TouchFn
where
    F: Fn(Device, TouchType, Point) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |device, kind, point| f(device, kind, point).boxed())
}

pub(crate) fn swipe_fn<F, Fut>(f: F) -> SwipeFn
where
    F: Fn(Device, Point, Point) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |device, origin, destination| f(device, origin, destination).boxed())
}

/// Handlers registered on a slot, by control kind
#[derive(Clone)]
pub(crate) enum Handlers {
    Key(Vec<KeyFn>),
    TouchPoint(Vec<TouchPointFn>),
    Dial {
        switch: Vec<DialSwitchFn>,
        rotate: Vec<DialRotateFn>,
    },
    TouchStrip {
        touch: Vec<TouchFn>,
        swipe: Vec<SwipeFn>,
    },
}

impl Handlers {
    fn for_control(control: Control) -> Self {
        match control {
            Control::Key(_) => Handlers::Key(Vec::new()),
            Control::TouchPoint(_) => Handlers::TouchPoint(Vec::new()),
            Control::Dial(_) => Handlers::Dial {
                switch: Vec::new(),
                rotate: Vec::new(),
            },
            Control::TouchStrip => Handlers::TouchStrip {
                touch: Vec::new(),
                swipe: Vec::new(),
            },
        }
    }
}

struct SlotState {
    /// Present from a press until its matching release
    release: Option<watch::Sender<Option<Duration>>>,
    pressed: Option<Instant>,
    released: Option<Instant>,
    duration: Duration,
    handlers: Handlers,
}

/// Per control state
pub(crate) struct Slot {
    control: Control,
    state: Mutex<SlotState>,
}

impl Slot {
    fn new(control: Control) -> Arc<Self> {
        Arc::new(Self {
            control,
            state: Mutex::new(SlotState {
                release: None,
                pressed: None,
                released: None,
                duration: Duration::ZERO,
                handlers: Handlers::for_control(control),
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn update_handlers(&self, f: impl FnOnce(&mut Handlers)) {
        f(&mut self.lock().handlers);
    }

    /// Rising edge. Spawns every switch handler of the control.
    pub(crate) fn press(self: &Arc<Self>, device: &Device, at: Instant, errors: &ErrorSink) {
        let handlers = {
            let mut state = self.lock();
            let (tx, _) = watch::channel(None);
            state.release = Some(tx);
            state.pressed = Some(at);
            state.released = None;
            state.duration = Duration::ZERO;
            state.handlers.clone()
        };
        debug!("{} pressed", self.control);

        match (handlers, self.control) {
            (Handlers::Key(handlers), Control::Key(id)) => {
                for handler in handlers {
                    let (device, view) = (device.clone(), Key::new(id, self.clone()));
                    errors.spawn(async move {
                        handler(device, view)
                            .await
                            .map_err(|source| HandlerError::Key { key: id, source })
                    });
                }
            },
            (Handlers::TouchPoint(handlers), Control::TouchPoint(id)) => {
                for handler in handlers {
                    let (device, view) = (device.clone(), TouchPoint::new(id, self.clone()));
                    errors.spawn(async move {
                        handler(device, view).await.map_err(|source| HandlerError::TouchPoint {
                            touch_point: id,
                            source,
                        })
                    });
                }
            },
            (Handlers::Dial { switch, .. }, Control::Dial(id)) => {
                for handler in switch {
                    let (device, view) = (device.clone(), Dial::new(id, self.clone()));
                    errors.spawn(async move {
                        handler(device, view)
                            .await
                            .map_err(|source| HandlerError::Dial { dial: id, source })
                    });
                }
            },
            _ => {},
        }
    }

    /// Falling edge. Publishes the hold duration exactly once per press.
    pub(crate) fn release(&self, at: Instant) {
        let mut state = self.lock();
        if state.released.is_some() {
            return;
        }
        let Some(tx) = state.release.take() else {
            // never pressed
            return;
        };
        let duration = state
            .pressed
            .take()
            .map(|pressed| at.saturating_duration_since(pressed))
            .unwrap_or_default();
        state.released = Some(at);
        state.duration = duration;
        tx.send_replace(Some(duration));
        debug!("{} released after {duration:?}", self.control);
    }

    pub(crate) fn rotate(self: &Arc<Self>, device: &Device, delta: i8, errors: &ErrorSink) {
        let (Handlers::Dial { rotate, .. }, Control::Dial(id)) =
            (self.lock().handlers.clone(), self.control)
        else {
            return;
        };
        for handler in rotate {
            let (device, view) = (device.clone(), Dial::new(id, self.clone()));
            errors.spawn(async move {
                handler(device, view, delta)
                    .await
                    .map_err(|source| HandlerError::Dial { dial: id, source })
            });
        }
    }

    pub(crate) fn touch(&self, device: &Device, kind: TouchType, point: Point, errors: &ErrorSink) {
        let Handlers::TouchStrip { touch, .. } = self.lock().handlers.clone() else {
            return;
        };
        for handler in touch {
            let device = device.clone();
            errors.spawn(async move {
                handler(device, kind, point)
                    .await
                    .map_err(|source| HandlerError::TouchStripTouch {
                        kind,
                        point,
                        source,
                    })
            });
        }
    }

    pub(crate) fn swipe(
        &self,
        device: &Device,
        origin: Point,
        destination: Point,
        errors: &ErrorSink,
    ) {
        let Handlers::TouchStrip { swipe, .. } = self.lock().handlers.clone() else {
            return;
        };
        for handler in swipe {
            let device = device.clone();
            errors.spawn(async move {
                handler(device, origin, destination)
                    .await
                    .map_err(|source| HandlerError::TouchStripSwipe {
                        origin,
                        destination,
                        source,
                    })
            });
        }
    }

    async fn wait_for_release(&self) -> Duration {
        let mut rx = {
            let state = self.lock();
            match &state.release {
                Some(tx) => tx.subscribe(),
                None => return state.duration,
            }
        };
        // a newer press drops the sender before this one is released
        let duration = match rx.wait_for(Option::is_some).await {
            Ok(duration) => (*duration).unwrap_or_default(),
            Err(_) => self.lock().duration,
        };
        duration
    }
}

/// Where handler failures end up
#[derive(Clone)]
pub(crate) struct ErrorSink(pub(crate) Option<mpsc::Sender<HandlerError>>);

impl ErrorSink {
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = std::result::Result<(), HandlerError>> + Send + 'static,
    {
        let sink = self.clone();
        tokio::spawn(async move {
            if let Err(e) = fut.await {
                sink.report(e);
            }
        });
    }

    fn report(&self, e: HandlerError) {
        match &self.0 {
            Some(tx) => {
                if let Err(e) = tx.try_send(e) {
                    error!("dropped handler error: {}", e.into_inner());
                }
            },
            None => error!("{e}"),
        }
    }
}

macro_rules! control_view {
    [$(
        $( #[doc = $doc:expr] )*
        $name:ident($id:ty);
    )+] => {
        $(
            $( #[doc = $doc] )*
            #[derive(Clone)]
            pub struct $name {
                id: $id,
                slot: Arc<Slot>,
            }

            impl $name {
                fn new(id: $id, slot: Arc<Slot>) -> Self {
                    Self { id, slot }
                }

                pub fn id(&self) -> $id {
                    self.id
                }

                /// Wait until the press that triggered this handler is released, returning how
                /// long it was held. Returns immediately if the release already happened.
                pub async fn wait_for_release(&self) -> Duration {
                    self.slot.wait_for_release().await
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    fmt::Display::fmt(&self.id, f)
                }
            }

            impl fmt::Debug for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.debug_tuple(stringify!($name)).field(&self.id).finish()
                }
            }
        )+
    };
}

control_view![
    /// A key, as seen by its handlers
    Key(KeyId);
    /// A touch point, as seen by its handlers
    TouchPoint(TouchPointId);
    /// A dial, as seen by its handlers
    Dial(DialId);
];

/// Slot table of a device, built once
pub(crate) struct Slots {
    /// Keys followed by touch points, in report order
    pub(crate) inputs: Vec<Arc<Slot>>,
    pub(crate) dials: Vec<Arc<Slot>>,
    pub(crate) touch_strip: Option<Arc<Slot>>,
}

impl Slots {
    pub(crate) fn new(model: &dyn Model) -> Self {
        let keys = (0..model.info().keys.count).map(|i| Control::Key(KeyId::from_index(i)));
        let touch_points = model
            .as_touch_points()
            .map_or(0, |tp| tp.touch_points().count);
        let touch_points =
            (0..touch_points).map(|i| Control::TouchPoint(TouchPointId::from_index(i)));
        let dials = model.as_dials().map_or(0, |d| d.dials().count);

        Self {
            inputs: keys.chain(touch_points).map(Slot::new).collect(),
            dials: (0..dials)
                .map(|i| Slot::new(Control::Dial(DialId::from_index(i))))
                .collect(),
            touch_strip: model
                .as_touch_strip()
                .map(|_| Slot::new(Control::TouchStrip)),
        }
    }
}

/// A change found in an input report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InputEvent {
    /// Index into the key and touch point slots
    Press(usize),
    Release(usize),
    DialPress(usize),
    DialRelease(usize),
    Rotate(usize, i8),
    Touch(TouchType, Point),
    Swipe(Point, Point),
}

/// Event type byte of the dial report
const EVENT_TOUCH_STRIP: u8 = 2;
const EVENT_DIAL: u8 = 3;

/// Turns input report payloads into edges against the previous report
pub(crate) struct InputDecoder {
    keys: InputRange,
    touch_points: Option<InputRange>,
    dials: Option<InputRange>,
    touch_strip: bool,
    states: Vec<u8>,
    dial_states: Vec<u8>,
}

impl InputDecoder {
    pub(crate) fn new(model: &dyn Model) -> Self {
        let keys = model.info().keys;
        let touch_points = model.as_touch_points().map(|tp| tp.touch_points());
        let dials = model.as_dials().map(|d| d.dials());
        Self {
            keys,
            touch_points,
            dials,
            touch_strip: model.as_touch_strip().is_some(),
            states: vec![0; keys.count + touch_points.map_or(0, |tp| tp.count)],
            dial_states: vec![0; dials.map_or(0, |d| d.count)],
        }
    }

    pub(crate) fn decode(&mut self, payload: &[u8]) -> Vec<InputEvent> {
        match (payload.first().copied(), self.dials) {
            (Some(EVENT_TOUCH_STRIP), _) if self.touch_strip => decode_touch_strip(payload)
                .into_iter()
                .collect(),
            (Some(EVENT_DIAL), Some(dials)) => self.decode_dials(payload, dials),
            _ => self.decode_keys(payload),
        }
    }

    fn decode_keys(&mut self, payload: &[u8]) -> Vec<InputEvent> {
        let end = self
            .touch_points
            .map_or(self.keys.end(), |tp| tp.end().max(self.keys.end()));
        if payload.len() < end {
            warn!("dropping short input report ({} bytes)", payload.len());
            return Vec::new();
        }

        let mut current = payload[self.keys.offset..self.keys.end()].to_vec();
        if let Some(tp) = self.touch_points {
            current.extend_from_slice(&payload[tp.offset..tp.end()]);
        }

        let events = edges(&self.states, &current, InputEvent::Press, InputEvent::Release);
        self.states = current;
        events
    }

    fn decode_dials(&mut self, payload: &[u8], dials: InputRange) -> Vec<InputEvent> {
        if payload.len() < dials.end().max(4) {
            warn!("dropping short dial report ({} bytes)", payload.len());
            return Vec::new();
        }
        let current = &payload[dials.offset..dials.end()];

        match payload[3] {
            0 => {
                let events = edges(
                    &self.dial_states,
                    current,
                    InputEvent::DialPress,
                    InputEvent::DialRelease,
                );
                self.dial_states = current.to_vec();
                events
            },
            1 => current
                .iter()
                .enumerate()
                .filter(|&(_, &delta)| delta != 0)
                .map(|(i, &delta)| InputEvent::Rotate(i, delta as i8))
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn edges(
    previous: &[u8],
    current: &[u8],
    press: fn(usize) -> InputEvent,
    release: fn(usize) -> InputEvent,
) -> Vec<InputEvent> {
    previous
        .iter()
        .zip(current)
        .enumerate()
        .filter(|(_, (old, new))| old != new)
        .map(|(i, (_, &new))| if new > 0 { press(i) } else { release(i) })
        .collect()
}

/// Coordinate pair at `offset`. The strip sends both values low byte first.
fn point(payload: &[u8], offset: usize) -> Point {
    Point::new(
        u16::from_le_bytes([payload[offset], payload[offset + 1]]),
        u16::from_le_bytes([payload[offset + 2], payload[offset + 3]]),
    )
}

fn decode_touch_strip(payload: &[u8]) -> Option<InputEvent> {
    let kind = match *payload.get(3)? {
        1 => TouchType::Short,
        2 => TouchType::Long,
        3 => {
            if payload.len() < 13 {
                warn!("dropping short swipe report ({} bytes)", payload.len());
                return None;
            }
            return Some(InputEvent::Swipe(point(payload, 5), point(payload, 9)));
        },
        _ => return None,
    };
    if payload.len() < 9 {
        warn!("dropping short touch report ({} bytes)", payload.len());
        return None;
    }
    Some(InputEvent::Touch(kind, point(payload, 5)))
}
