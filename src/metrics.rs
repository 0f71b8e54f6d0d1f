//! Metric instrumentation helpers. Counters/gauges/histograms are recorded
//! via the `metrics` facade at the call sites named in the external
//! interface contract; no exporter is wired up here (that HTTP surface is
//! an out-of-scope external collaborator).

use std::time::Instant;

pub fn record_put(success: bool) {
    if success {
        metrics::counter!("aqkv_writes_total", "result" => "success").increment(1);
    } else {
        metrics::counter!("aqkv_writes_total", "result" => "failure").increment(1);
    }
}

pub fn record_get(success: bool) {
    if success {
        metrics::counter!("aqkv_reads_total", "result" => "success").increment(1);
    } else {
        metrics::counter!("aqkv_reads_total", "result" => "failure").increment(1);
    }
}

pub fn record_replication_ack(result: &'static str) {
    metrics::counter!("aqkv_replication_acks_total", "result" => result).increment(1);
}

pub fn record_error(error_type: &'static str) {
    metrics::counter!("aqkv_errors_total", "type" => error_type).increment(1);
}

pub fn record_quorum_adjustment(reason: &'static str) {
    metrics::counter!("aqkv_quorum_adjustments_total", "reason" => reason).increment(1);
}

pub fn record_staleness_violation() {
    metrics::counter!("aqkv_staleness_violations_total").increment(1);
}

pub fn record_conflict_detected() {
    metrics::counter!("aqkv_conflicts_detected_total").increment(1);
}

pub fn record_conflict_resolved() {
    metrics::counter!("aqkv_conflicts_resolved_total").increment(1);
}

pub fn record_reconciliation_run() {
    metrics::counter!("aqkv_reconciliation_runs_total").increment(1);
}

pub fn record_reconciliation_latency(secs: f64) {
    metrics::histogram!("aqkv_reconciliation_latency_seconds").record(secs);
}

pub fn record_partition_healing() {
    metrics::counter!("aqkv_partition_healing_total").increment(1);
}

pub fn update_ccs_gauges(raw: f64, smoothed: f64, components: &crate::ccs::CcsComponents) {
    metrics::gauge!("aqkv_ccs_raw").set(raw);
    metrics::gauge!("aqkv_ccs_smoothed").set(smoothed);
    metrics::gauge!("aqkv_ccs_component", "component" => "rtt").set(components.rtt_health);
    metrics::gauge!("aqkv_ccs_component", "component" => "availability").set(components.avail_health);
    metrics::gauge!("aqkv_ccs_component", "component" => "variance").set(components.var_health);
    metrics::gauge!("aqkv_ccs_component", "component" => "error").set(components.error_health);
    metrics::gauge!("aqkv_ccs_component", "component" => "clock").set(components.clock_health);
}

pub fn update_hysteresis_gauge(active: bool) {
    metrics::gauge!("aqkv_hysteresis_active").set(if active { 1.0 } else { 0.0 });
}

pub fn record_peer_rtt(peer_id: &str, rtt_secs: f64) {
    metrics::gauge!("aqkv_peer_rtt_seconds", "peer" => peer_id.to_string()).set(rtt_secs);
}

pub fn record_peer_clock_drift(peer_id: &str, drift_secs: f64) {
    metrics::gauge!("aqkv_peer_clock_drift_seconds", "peer" => peer_id.to_string()).set(drift_secs);
}

/// RAII timer for an operation's latency histogram. Consuming `.success()`
/// or `.error()` records the elapsed time and the outcome together.
pub struct OpTimer {
    start: Instant,
    histogram_name: &'static str,
}

impl OpTimer {
    pub fn new(histogram_name: &'static str) -> Self {
        Self { start: Instant::now(), histogram_name }
    }

    fn record(self) {
        metrics::histogram!(self.histogram_name).record(self.start.elapsed().as_secs_f64());
    }

    pub fn success(self) {
        self.record();
    }

    pub fn error(self) {
        self.record();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_timer_records_without_panicking() {
        let timer = OpTimer::new("aqkv_put_latency_seconds");
        timer.success();
    }

    #[test]
    fn ccs_gauges_update_without_panicking() {
        let components = crate::ccs::CcsComponents {
            rtt_health: 1.0,
            avail_health: 1.0,
            var_health: 1.0,
            error_health: 1.0,
            clock_health: 1.0,
        };
        update_ccs_gauges(1.0, 1.0, &components);
    }
}
