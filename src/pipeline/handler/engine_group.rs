//! Engine-group utilization handler — the hardest handler in the family.
//!
//! Two device generations report engine activity differently:
//!
//! - ATS-like devices expose `ENGINE_GROUP_*_ALL` aggregate handles
//!   directly; the aggregate's own active-time delta already *is* the
//!   group utilization.
//! - Other devices only expose per-engine handles; the handler computes
//!   each engine's utilization independently and takes the maximum over
//!   engines of the same kind on the same subdevice.
//!
//! Which handles a device exposes is decided once, at topology-discovery
//! time, by [`is_ats_like`] inspecting the device's name property (wired
//! in by `DeviceRegistry::discover`, which stamps the result onto every
//! engine handle's `is_aggregate` field) — this handler only reacts to
//! whichever handles actually arrive each tick (if both aggregate and
//! per-engine samples show up for a device, the aggregate ones win and
//! the per-engine ones are ignored, matching the ATS-like policy).
//!
//! `Computation` reuses this same derivation with no kind filter,
//! aggregating every engine on the device. `EuActive`/`EuStall`/`EuIdle`
//! (execution-unit occupancy) and `EngineUtilization` (ungrouped
//! per-engine readings) are not implemented here: the hardware-sysman
//! capability interface has no raw EU-occupancy read, and ungrouped
//! per-engine values don't fit `MeasurementDatum`'s per-subdevice shape,
//! which already collapses same-kind engines on a subdevice to one slot.
//! `Service::start` skips these metric types if a caller configures
//! sampling for them.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::model::{DeviceId, EngineKind, EngineSample, ExtendedDatum, MeasurementDatum, MetricType, SampleRecord};
use crate::pipeline::sink::PersistenceSink;

use super::stats::{delta_value, record_stat, HandlerBase, SessionId};
use super::DataHandler;

/// Substring match on a device's `device_name` property, deciding whether
/// its topology exposes `ENGINE_GROUP_*_ALL` aggregate handles. Defaults
/// to `false` (per-engine-maximum semantics) for any unrecognized name,
/// per the open-question resolution in `DESIGN.md`.
pub fn is_ats_like(device_name: &str) -> bool {
    let upper = device_name.to_ascii_uppercase();
    upper.contains("ATS") || upper.contains("PVC")
}

pub struct EngineGroupHandler {
    base: HandlerBase,
    /// `Some(kind)` restricts derivation to engines of that kind (the five
    /// `EngineGroup*AllUtilization` variants); `None` aggregates every
    /// engine on the device regardless of kind (`Computation`, the
    /// device's overall utilization).
    kind_filter: Option<EngineKind>,
}

impl EngineGroupHandler {
    pub fn new(metric_type: MetricType, kind_filter: Option<EngineKind>, sink: Arc<dyn PersistenceSink>) -> Self {
        Self {
            base: HandlerBase::new(metric_type, sink),
            kind_filter,
        }
    }

    /// The [`EngineKind`] this handler's metric type aggregates, per the
    /// five `EngineGroup*AllUtilization` variants.
    pub fn engine_kind_for(metric_type: MetricType) -> Option<EngineKind> {
        use MetricType::*;
        match metric_type {
            EngineGroupComputeAllUtilization => Some(EngineKind::Compute),
            EngineGroupMediaAllUtilization => Some(EngineKind::Media),
            EngineGroupCopyAllUtilization => Some(EngineKind::Copy),
            EngineGroupRenderAllUtilization => Some(EngineKind::Render),
            EngineGroup3DAllUtilization => Some(EngineKind::ThreeD),
            _ => None,
        }
    }
}

impl DataHandler for EngineGroupHandler {
    fn metric_type(&self) -> MetricType {
        self.base.metric_type()
    }

    fn pre_handle(&self, record: SampleRecord) {
        self.base.pre_handle(record);
    }

    fn handle(&self) {
        self.base.with_derivation(|previous, data, sessions| {
            for (device_id, datum) in data.iter_mut() {
                let samples = match &datum.extended {
                    Some(ExtendedDatum::EngineSamples(samples)) => samples.clone(),
                    _ => continue,
                };
                let prev_by_handle: HashMap<u64, EngineSample> = previous
                    .and_then(|p| p.data.get(device_id))
                    .and_then(|d| match &d.extended {
                        Some(ExtendedDatum::EngineSamples(s)) => Some(s.iter().map(|e| (e.handle_id, *e)).collect()),
                        _ => None,
                    })
                    .unwrap_or_default();

                let scale = datum.scale.max(1);
                let relevant: Vec<&EngineSample> = samples
                    .iter()
                    .filter(|s| self.kind_filter.map_or(true, |kind| s.engine_kind == kind))
                    .collect();
                if relevant.is_empty() {
                    continue;
                }
                let use_aggregate = relevant.iter().any(|s| s.is_aggregate);

                let mut per_subdevice: BTreeMap<u32, i64> = BTreeMap::new();
                let mut device_level: Vec<i64> = Vec::new();

                for sample in &relevant {
                    if use_aggregate && !sample.is_aggregate {
                        continue;
                    }
                    let Some(prev) = prev_by_handle.get(&sample.handle_id) else {
                        continue;
                    };
                    let delta_t = sample.timestamp_us - prev.timestamp_us;
                    let Some(delta_active) = delta_value(Some(prev.active_time_us), sample.active_time_us, delta_t) else {
                        continue;
                    };
                    let util = (scale * 100 * delta_active / delta_t).clamp(0, 100 * scale);

                    if sample.on_subdevice {
                        per_subdevice
                            .entry(sample.subdevice_id)
                            .and_modify(|v| *v = (*v).max(util))
                            .or_insert(util);
                    } else {
                        device_level.push(util);
                    }
                }

                for (&subdevice_id, &value) in per_subdevice.iter() {
                    datum.set_subdevice_current(subdevice_id, value);
                }

                let overall = per_subdevice.values().copied().chain(device_level.iter().copied()).max();
                if let Some(value) = overall {
                    datum.current = value;
                    let (min, max, avg) = record_stat(sessions, *device_id, value);
                    datum.min = Some(min);
                    datum.max = Some(max);
                    datum.avg = Some(avg);
                }
            }
        });
    }

    fn latest_for(&self, device_id: DeviceId) -> Option<MeasurementDatum> {
        self.base.latest_for(device_id)
    }

    fn latest_stats_for(&self, device_id: DeviceId, session: SessionId) -> Option<MeasurementDatum> {
        self.base.latest_stats_for(device_id, session)
    }

    fn bulk_latest(&self) -> std::collections::BTreeMap<DeviceId, MeasurementDatum> {
        self.base.bulk_latest()
    }

    fn reset_session(&self, session: SessionId) {
        self.base.reset_session(session);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pipeline::sample::SampleBuilder;
    use crate::pipeline::sink::NullSink;

    fn record_with_engines(ts: i64, engines: Vec<EngineSample>) -> SampleRecord {
        let mut builder = SampleBuilder::new(MetricType::EngineGroupComputeAllUtilization, ts);
        let mut datum = MeasurementDatum::new(0, 100, ts);
        datum.extended = Some(ExtendedDatum::EngineSamples(engines));
        builder.insert(DeviceId(0), datum);
        builder.build()
    }

    fn engine(handle_id: u64, active_time_us: i64, ts: i64, is_aggregate: bool) -> EngineSample {
        EngineSample {
            handle_id,
            engine_kind: EngineKind::Compute,
            on_subdevice: true,
            subdevice_id: 0,
            active_time_us,
            timestamp_us: ts,
            is_aggregate,
        }
    }

    #[test]
    fn non_ats_takes_maximum_over_engines_on_same_subdevice() {
        let handler = EngineGroupHandler::new(
            MetricType::EngineGroupComputeAllUtilization,
            Some(EngineKind::Compute),
            Arc::new(NullSink),
        );
        handler.pre_handle(record_with_engines(0, vec![engine(1, 0, 0, false), engine(2, 0, 0, false)]));
        handler.handle();
        handler.pre_handle(record_with_engines(1_000, vec![engine(1, 600, 1_000, false), engine(2, 900, 1_000, false)]));
        handler.handle();

        let datum = handler.latest_for(DeviceId(0)).unwrap();
        assert_eq!(datum.subdevice_current(0), Some(90 * 100));
    }

    #[test]
    fn ats_like_aggregate_handle_used_directly() {
        let handler = EngineGroupHandler::new(
            MetricType::EngineGroupComputeAllUtilization,
            Some(EngineKind::Compute),
            Arc::new(NullSink),
        );
        handler.pre_handle(record_with_engines(0, vec![engine(1, 0, 0, true)]));
        handler.handle();
        handler.pre_handle(record_with_engines(1_000, vec![engine(1, 500, 1_000, true)]));
        handler.handle();

        let datum = handler.latest_for(DeviceId(0)).unwrap();
        assert_eq!(datum.current, 50 * 100);
    }

    #[test]
    fn utilization_never_exceeds_clamp() {
        let handler = EngineGroupHandler::new(
            MetricType::EngineGroupComputeAllUtilization,
            Some(EngineKind::Compute),
            Arc::new(NullSink),
        );
        handler.pre_handle(record_with_engines(0, vec![engine(1, 0, 0, true)]));
        handler.handle();
        handler.pre_handle(record_with_engines(1_000, vec![engine(1, 5_000, 1_000, true)]));
        handler.handle();

        let datum = handler.latest_for(DeviceId(0)).unwrap();
        assert_eq!(datum.current, 100 * 100);
    }

    #[test]
    fn no_kind_filter_aggregates_every_engine_kind() {
        let handler = EngineGroupHandler::new(MetricType::Computation, None, Arc::new(NullSink));
        let media = EngineSample {
            handle_id: 2,
            engine_kind: EngineKind::Media,
            on_subdevice: true,
            subdevice_id: 0,
            active_time_us: 0,
            timestamp_us: 0,
            is_aggregate: false,
        };
        handler.pre_handle(record_with_engines(0, vec![engine(1, 0, 0, false), media]));
        handler.handle();

        let media_next = EngineSample {
            handle_id: 2,
            engine_kind: EngineKind::Media,
            on_subdevice: true,
            subdevice_id: 0,
            active_time_us: 300,
            timestamp_us: 1_000,
            is_aggregate: false,
        };
        handler.pre_handle(record_with_engines(1_000, vec![engine(1, 900, 1_000, false), media_next]));
        handler.handle();

        let datum = handler.latest_for(DeviceId(0)).unwrap();
        assert_eq!(datum.subdevice_current(0), Some(90 * 100));
    }

    #[test]
    fn is_ats_like_matches_known_substrings_and_defaults_false() {
        assert!(is_ats_like("Intel(R) Data Center GPU Max (PVC)"));
        assert!(is_ats_like("Generic ATS Card"));
        assert!(!is_ats_like("Generic GPU"));
    }
}
