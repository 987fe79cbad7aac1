//! Prometheus metrics for schedule compilation
//!
//! Tracks compilations by outcome, resolved slots, avails, diagnostics,
//! overrides and compile duration.
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

use crate::scheduler::schedule::ScheduleDay;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for all compiler metrics
struct CompilerMetrics {
    compilations: CounterVec,
    slots: CounterVec,
    avails: CounterVec,
    avail_minutes: CounterVec,
    diagnostics: CounterVec,
    overrides: CounterVec,
    compile_duration: HistogramVec,
}

/// Global storage for compiler metrics
static COMPILER_METRICS: OnceLock<CompilerMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// Registration failures are returned; the application can keep running and
/// every recording helper stays a no-op.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = gridcast::metrics::init_metrics() {
///     eprintln!("Warning: Metrics initialization failed: {}", e);
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = CompilerMetrics {
        compilations: register_counter_vec!(
            "gridcast_compilations_total",
            "Schedule day compilations by mode and outcome",
            &["mode", "outcome"]
        )?,
        slots: register_counter_vec!(
            "gridcast_slots_resolved_total",
            "Slots placed by committed compilations",
            &["channel"]
        )?,
        avails: register_counter_vec!(
            "gridcast_avails_total",
            "Avails emitted by committed compilations",
            &["channel", "reason"]
        )?,
        avail_minutes: register_counter_vec!(
            "gridcast_avail_minutes_total",
            "Minutes left as avail by committed compilations",
            &["channel"]
        )?,
        diagnostics: register_counter_vec!(
            "gridcast_diagnostics_total",
            "Diagnostics attached to compiled days by code",
            &["code"]
        )?,
        overrides: register_counter_vec!(
            "gridcast_overrides_total",
            "Manual override batches by outcome",
            &["outcome"]
        )?,
        compile_duration: register_histogram_vec!(
            "gridcast_compile_duration_seconds",
            "Time spent compiling one schedule day",
            &["mode"],
            vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
        )?,
    };

    COMPILER_METRICS
        .set(metrics)
        .map_err(|_| "Compiler metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    COMPILER_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record a compilation outcome (`mode` is "compile" or "preview")
pub fn record_compilation(mode: &str, outcome: &str) {
    if let Some(m) = COMPILER_METRICS.get() {
        m.compilations.with_label_values(&[mode, outcome]).inc();
    }
}

/// Record the contents of a committed day
pub fn record_schedule_day(day: &ScheduleDay) {
    let Some(m) = COMPILER_METRICS.get() else {
        return;
    };

    let channel = day.channel_id.as_str();
    let placed = day.own_slots().count();
    if placed > 0 {
        m.slots.with_label_values(&[channel]).inc_by(placed as f64);
    }
    for avail in &day.avails {
        m.avails
            .with_label_values(&[channel, avail.reason.id()])
            .inc();
        m.avail_minutes
            .with_label_values(&[channel])
            .inc_by(avail.minutes() as f64);
    }
    for diagnostic in &day.diagnostics {
        let code = format!("{:?}", diagnostic.code);
        m.diagnostics.with_label_values(&[code.as_str()]).inc();
    }
}

/// Record an override batch outcome
pub fn record_override(outcome: &str) {
    if let Some(m) = COMPILER_METRICS.get() {
        m.overrides.with_label_values(&[outcome]).inc();
    }
}

/// Histogram timer guard that records duration on drop
pub struct MetricsTimer {
    timer: Option<prometheus::HistogramTimer>,
}

impl MetricsTimer {
    fn new(timer: prometheus::HistogramTimer) -> Self {
        Self { timer: Some(timer) }
    }

    /// Create a no-op timer when metrics are not initialized
    fn noop() -> Self {
        Self { timer: None }
    }
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop_and_record();
        }
    }
}

/// Start a compile timer
pub fn start_compile_timer(mode: &str) -> MetricsTimer {
    match COMPILER_METRICS.get() {
        Some(m) => MetricsTimer::new(m.compile_duration.with_label_values(&[mode]).start_timer()),
        None => MetricsTimer::noop(),
    }
}

// ============================================================================
// Tests
// ============================================================================
