use std::sync::Mutex;

use distqueue_common::api::distributor::FleetReport;

/// Holds the most recent fleet size reported by a Supervisor.
///
/// The Distributor and Supervisor run as separate processes, so the
/// in-process `scaler` backreference the source kept on its `Distributor`
/// object isn't reachable here; this is its replacement — a narrow,
/// internal-only push endpoint (`POST /internal/fleet_report`) backs this
/// registry instead of a shared object reference. Absent any report,
/// `snapshot()` returns zero for both fields, matching the source's
/// behavior when `self.scaler` was never set.
#[derive(Default)]
pub struct FleetRegistry {
    latest: Mutex<Option<FleetReport>>,
}

impl FleetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self, report: FleetReport) {
        *self.latest.lock().unwrap() = Some(report);
    }

    /// Returns `(total_analyzers, active_analyzers)`, zeroed if no
    /// supervisor has ever registered.
    pub fn snapshot(&self) -> (u32, u32) {
        match &*self.latest.lock().unwrap() {
            Some(report) => (report.total_analyzers, report.active_analyzers),
            None => (0, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_is_zeroed_before_any_report() {
        let registry = FleetRegistry::new();
        assert_eq!(registry.snapshot(), (0, 0));
    }

    #[test]
    fn snapshot_reflects_latest_report() {
        let registry = FleetRegistry::new();
        registry.report(FleetReport {
            total_analyzers: 4,
            active_analyzers: 3,
        });
        assert_eq!(registry.snapshot(), (4, 3));
    }
}
