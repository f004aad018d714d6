//! The actuator sink and exclusive ownership of it.
//!
//! The sink is the only path to the hardware. It has no logic of its own:
//! callers are responsible for range safety before writing. Exactly one
//! mode (calibration acquisition or live control) may hold the sink at a
//! time; [`ActuatorBus::acquire`] enforces that.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{HandError, Result};
use crate::joint::ActuatorId;

/// Lowest pulse width accepted anywhere in the system (microseconds).
pub const PULSE_FLOOR_US: u16 = 400;

/// Highest pulse width accepted anywhere in the system (microseconds).
pub const PULSE_CEILING_US: u16 = 2800;

/// Fire-and-forget "set channel pulse width" primitive.
///
/// Implementations must not block on anything slower than a bus write.
pub trait ActuatorSink {
    /// Commands `channel` to `pulse_us` microseconds.
    fn set_channel_pulse(&mut self, channel: ActuatorId, pulse_us: u16);

    /// Stops driving `channel` (servo goes limp).
    fn release(&mut self, channel: ActuatorId) {
        let _ = channel;
    }
}

#[derive(Debug, Default)]
struct SimulatedState {
    last: BTreeMap<ActuatorId, u16>,
    released: BTreeMap<ActuatorId, bool>,
    writes: usize,
}

/// No-op sink used in simulate mode and in tests.
///
/// Clones share state, so a test can keep one handle while the bus owns
/// another.
#[derive(Debug, Clone, Default)]
pub struct SimulatedSink {
    state: Arc<Mutex<SimulatedState>>,
}

impl SimulatedSink {
    /// Creates an empty simulated sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Last pulse commanded on `channel`.
    #[must_use]
    pub fn last_pulse(&self, channel: ActuatorId) -> Option<u16> {
        self.state().last.get(&channel).copied()
    }

    /// Total number of pulse writes.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.state().writes
    }

    /// Returns true if `channel` was released and not driven since.
    #[must_use]
    pub fn is_released(&self, channel: ActuatorId) -> bool {
        self.state().released.get(&channel).copied().unwrap_or(false)
    }
}

impl ActuatorSink for SimulatedSink {
    fn set_channel_pulse(&mut self, channel: ActuatorId, pulse_us: u16) {
        let mut state = self.state();
        state.last.insert(channel, pulse_us);
        state.released.insert(channel, false);
        state.writes += 1;
    }

    fn release(&mut self, channel: ActuatorId) {
        self.state().released.insert(channel, true);
    }
}

/// Who is driving the actuators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LeaseMode {
    /// Interactive calibration (direct pulse commands).
    Acquisition,
    /// A control channel session.
    LiveControl,
}

impl fmt::Display for LeaseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Acquisition => write!(f, "calibration acquisition"),
            Self::LiveControl => write!(f, "live control"),
        }
    }
}

struct BusInner {
    sink: Box<dyn ActuatorSink + Send>,
    owner: Option<LeaseMode>,
}

/// Shared handle to the actuator sink with single-owner leasing.
pub struct ActuatorBus {
    inner: Mutex<BusInner>,
}

impl ActuatorBus {
    /// Wraps a sink.
    #[must_use]
    pub fn new(sink: impl ActuatorSink + Send + 'static) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(BusInner {
                sink: Box::new(sink),
                owner: None,
            }),
        })
    }

    fn inner(&self) -> MutexGuard<'_, BusInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes exclusive ownership of the sink for `mode`.
    ///
    /// # Errors
    ///
    /// Returns [`HandError::ActuatorBusy`] if another lease is alive.
    pub fn acquire(self: &Arc<Self>, mode: LeaseMode) -> Result<ActuatorLease> {
        let mut inner = self.inner();
        if let Some(held_by) = inner.owner {
            return Err(HandError::actuator_busy(held_by, mode));
        }
        inner.owner = Some(mode);
        Ok(ActuatorLease {
            bus: Arc::clone(self),
            mode,
        })
    }

    /// Current owner, if any.
    #[must_use]
    pub fn owner(&self) -> Option<LeaseMode> {
        self.inner().owner
    }
}

impl fmt::Debug for ActuatorBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActuatorBus")
            .field("owner", &self.owner())
            .finish_non_exhaustive()
    }
}

/// Exclusive right to write the sink. Released on drop.
#[derive(Debug)]
pub struct ActuatorLease {
    bus: Arc<ActuatorBus>,
    mode: LeaseMode,
}

impl ActuatorLease {
    /// Mode this lease was granted for.
    #[must_use]
    pub const fn mode(&self) -> LeaseMode {
        self.mode
    }

    /// Commands `channel` to `pulse_us`.
    pub fn set_channel_pulse(&self, channel: ActuatorId, pulse_us: u16) {
        self.bus.inner().sink.set_channel_pulse(channel, pulse_us);
    }

    /// Releases `channel`.
    pub fn release(&self, channel: ActuatorId) {
        self.bus.inner().sink.release(channel);
    }
}

impl Drop for ActuatorLease {
    fn drop(&mut self) {
        self.bus.inner().owner = None;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn ch(n: u8) -> ActuatorId {
        ActuatorId::new(n).unwrap()
    }

    #[test]
    fn simulated_sink_records_writes() {
        let sink = SimulatedSink::new();
        let mut handle = sink.clone();
        handle.set_channel_pulse(ch(2), 1500);
        handle.set_channel_pulse(ch(2), 1600);
        assert_eq!(sink.last_pulse(ch(2)), Some(1600));
        assert_eq!(sink.write_count(), 2);
        handle.release(ch(2));
        assert!(sink.is_released(ch(2)));
    }

    #[test]
    fn lease_is_exclusive() {
        let bus = ActuatorBus::new(SimulatedSink::new());
        let lease = bus.acquire(LeaseMode::Acquisition).unwrap();
        let err = bus.acquire(LeaseMode::LiveControl).unwrap_err();
        assert_eq!(
            err,
            HandError::actuator_busy(LeaseMode::Acquisition, LeaseMode::LiveControl)
        );
        drop(lease);
        assert_eq!(bus.owner(), None);
        assert!(bus.acquire(LeaseMode::LiveControl).is_ok());
    }

    #[test]
    fn lease_writes_reach_sink() {
        let sink = SimulatedSink::new();
        let bus = ActuatorBus::new(sink.clone());
        let lease = bus.acquire(LeaseMode::LiveControl).unwrap();
        lease.set_channel_pulse(ch(7), 1234);
        assert_eq!(sink.last_pulse(ch(7)), Some(1234));
        assert_eq!(lease.mode(), LeaseMode::LiveControl);
    }
}
