//! Structured observability hooks for pipeline lifecycle events.
//!
//! Every event is an `info!` (or `warn!`) record carrying an
//! `event = "pipeline.*"` field, so JSON log output can be filtered on it.
//! [`pipeline_span`] builds the run-scoped span the orchestrator
//! instruments its future with.

use tracing::{info, warn};

/// Span tagged with the run id and target repository.
pub fn pipeline_span(run_id: &str, target: &str) -> tracing::Span {
    tracing::info_span!("auditrepo.run", run_id = %run_id, target = %target)
}

pub fn emit_pipeline_started(run_id: &str, target: &str, sources: usize, mode: &str) {
    info!(
        event = "pipeline.started",
        run_id = %run_id,
        target = %target,
        sources = sources,
        mode = %mode,
    );
}

pub fn emit_stage_entered(stage: &str) {
    info!(event = "pipeline.stage_entered", stage = %stage);
}

pub fn emit_stage_completed(stage: &str, duration_ms: u64, detail: &str) {
    info!(
        event = "pipeline.stage_completed",
        stage = %stage,
        duration_ms = duration_ms,
        detail = %detail,
    );
}

/// Emit event: a fatal error ended the run at `stage`.
pub fn emit_pipeline_failed(stage: &str, kind: &str, error: &dyn std::fmt::Display) {
    tracing::error!(
        event = "pipeline.failed",
        stage = %stage,
        kind = %kind,
        error = %error,
    );
}

/// Emit event: a best-effort step or optional input went wrong.
pub fn emit_warning(stage: &str, message: &str) {
    warn!(event = "pipeline.warning", stage = %stage, message = %message);
}

pub fn emit_pipeline_finished(run_id: &str, final_state: &str, duration_ms: u64) {
    info!(
        event = "pipeline.finished",
        run_id = %run_id,
        final_state = %final_state,
        duration_ms = duration_ms,
    );
}
