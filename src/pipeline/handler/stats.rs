//! The common base every data handler shares: latest/previous rotation,
//! the single mutex all queries and derivations go through, and rolling
//! per-session statistics.
//!
//! Mirrors `MetricStatisticsDataHandler`: every concrete handler below is
//! built on top of [`HandlerBase`] and only supplies its own `handle()`
//! derivation; stats bookkeeping is inherited, not reimplemented.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use crate::model::{DeviceId, MeasurementDatum, MetricType, SampleRecord};
use crate::pipeline::sink::PersistenceSink;

/// An opaque caller-scoped rolling-statistics session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

/// The implicit session every handler always tracks, independent of any
/// caller-created session, so `bulk_latest`/`latest_for` callers still see
/// stats computed since the handler was created.
pub const DEFAULT_SESSION: SessionId = SessionId(0);

#[derive(Debug, Clone, Copy)]
pub struct SessionStats {
    min: i64,
    max: i64,
    sum: i64,
    count: u64,
}

impl SessionStats {
    fn new() -> Self {
        Self {
            min: 0,
            max: 0,
            sum: 0,
            count: 0,
        }
    }

    fn observe(&mut self, value: i64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.sum += value;
        self.count += 1;
    }

    pub fn avg(&self) -> i64 {
        if self.count == 0 {
            0
        } else {
            self.sum / self.count as i64
        }
    }

    pub fn min(&self) -> i64 {
        self.min
    }

    pub fn max(&self) -> i64 {
        self.max
    }
}

pub type SessionMap = HashMap<(DeviceId, SessionId), SessionStats>;

struct HandlerState {
    latest: Option<SampleRecord>,
    previous: Option<SampleRecord>,
    sessions: SessionMap,
}

/// Records `value` into the device's default session plus every other
/// session already tracked for that device, and returns the default
/// session's resulting `(min, max, avg)`.
pub fn record_stat(sessions: &mut SessionMap, device: DeviceId, value: i64) -> (i64, i64, i64) {
    let mut touched: Vec<SessionId> = sessions
        .keys()
        .filter(|(d, _)| *d == device)
        .map(|(_, s)| *s)
        .collect();
    if !touched.contains(&DEFAULT_SESSION) {
        touched.push(DEFAULT_SESSION);
    }
    let mut default_result = (value, value, value);
    for session in touched {
        let entry = sessions.entry((device, session)).or_insert_with(SessionStats::new);
        entry.observe(value);
        if session == DEFAULT_SESSION {
            default_result = (entry.min(), entry.max(), entry.avg());
        }
    }
    default_result
}

fn ensure_session(sessions: &mut SessionMap, device: DeviceId, session: SessionId) {
    sessions.entry((device, session)).or_insert_with(SessionStats::new);
}

/// Microsecond-to-second conversion constant used by the counter-rate
/// derivation (`spec.md` §4.C: `current := (Δ_value · scale) / Δt`, where
/// `scale` there is this fixed unit-conversion constant, not the datum's
/// own `scale` field).
pub const US_PER_SEC: i64 = 1_000_000;

/// `Δ_value = raw_now − previous_raw`. Returns `None` (publish nothing
/// this tick, caller retains the previous published value) when there is
/// no previous raw reading, the clock did not advance, or the counter
/// appears to have gone backwards (treated as a reset).
pub fn delta_value(previous_raw: Option<i64>, raw_now: i64, delta_t_us: i64) -> Option<i64> {
    let previous_raw = previous_raw?;
    if delta_t_us <= 0 {
        return None;
    }
    let delta = raw_now - previous_raw;
    if delta < 0 {
        return None;
    }
    Some(delta)
}

/// Base state machine shared by every [`super::DataHandler`] implementor.
pub struct HandlerBase {
    metric_type: MetricType,
    sink: Arc<dyn PersistenceSink>,
    state: Mutex<HandlerState>,
}

impl HandlerBase {
    pub fn new(metric_type: MetricType, sink: Arc<dyn PersistenceSink>) -> Self {
        Self {
            metric_type,
            sink,
            state: Mutex::new(HandlerState {
                latest: None,
                previous: None,
                sessions: HashMap::new(),
            }),
        }
    }

    pub fn metric_type(&self) -> MetricType {
        self.metric_type
    }

    /// Rotate `previous <- latest`, publish the new record, then enqueue
    /// it to the sink once the mutex has been released.
    pub fn pre_handle(&self, record: SampleRecord) {
        let published = {
            let mut state = self.state.lock().unwrap();
            state.previous = state.latest.take();
            state.latest = Some(record);
            state
                .latest
                .as_ref()
                .map(|r| (r.metric_type, r.sampled_at_us, r.data.clone()))
        };
        if let Some((metric_type, timestamp_us, data)) = published {
            if let Err(e) = self.sink.append(metric_type, timestamp_us, &data) {
                tracing::warn!(error = %e, ?metric_type, "persistence sink append failed; continuing");
            }
        }
    }

    /// Runs `f` under the single mutex with the previous record
    /// (read-only), the latest record's mutable data map, and the
    /// session-stats map, so a handler's derived value and its rolling
    /// statistics update atomically together. No-op if there is no
    /// latest record yet.
    pub fn with_derivation<F>(&self, f: F)
    where
        F: FnOnce(Option<&SampleRecord>, &mut BTreeMap<DeviceId, MeasurementDatum>, &mut SessionMap),
    {
        let mut state = self.state.lock().unwrap();
        let HandlerState {
            previous,
            latest,
            sessions,
        } = &mut *state;
        if let Some(latest) = latest.as_mut() {
            f(previous.as_ref(), &mut latest.data, sessions);
        }
    }

    pub fn latest_for(&self, device_id: DeviceId) -> Option<MeasurementDatum> {
        let state = self.state.lock().unwrap();
        state.latest.as_ref()?.data.get(&device_id).cloned()
    }

    pub fn latest_stats_for(&self, device_id: DeviceId, session: SessionId) -> Option<MeasurementDatum> {
        let mut state = self.state.lock().unwrap();
        let mut datum = state.latest.as_ref()?.data.get(&device_id).cloned()?;
        ensure_session(&mut state.sessions, device_id, session);
        if let Some(stats) = state.sessions.get(&(device_id, session)) {
            datum.min = Some(stats.min());
            datum.max = Some(stats.max());
            datum.avg = Some(stats.avg());
        }
        Some(datum)
    }

    pub fn bulk_latest(&self) -> BTreeMap<DeviceId, MeasurementDatum> {
        let state = self.state.lock().unwrap();
        state.latest.as_ref().map(|r| r.data.clone()).unwrap_or_default()
    }

    pub fn reset_session(&self, session: SessionId) {
        let mut state = self.state.lock().unwrap();
        state.sessions.retain(|&(_, s), _| s != session);
    }
}
