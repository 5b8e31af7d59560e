//! Opt-in expiry sweep.
//!
//! Expiry is derived on every read and write path, so this loop is never
//! needed for correctness. It only stores `expired` on active sessions whose
//! `expires_at` has passed; completed and cancelled rows are never touched.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use otpline_core::config::ExpirySweepConfig;
use otpline_core::OtpStore;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub sessions_expired: u64,
    pub elapsed_ms: u64,
}

/// Run one sweep now.
pub async fn run_expiry_sweep(store: &dyn OtpStore) -> Result<SweepReport> {
    let start = std::time::Instant::now();
    let sessions_expired = store.expire_stale_sessions(Utc::now()).await?;
    let report = SweepReport {
        sessions_expired,
        elapsed_ms: start.elapsed().as_millis() as u64,
    };

    tracing::info!(
        "Expiry sweep complete: {} sessions expired in {}ms",
        report.sessions_expired,
        report.elapsed_ms
    );
    Ok(report)
}

pub async fn run_sweep_loop(
    store: Arc<dyn OtpStore>,
    config: ExpirySweepConfig,
    mut shutdown: broadcast::Receiver<()>,
) {
    let interval = tokio::time::Duration::from_secs(config.interval_seconds.max(1));
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    tracing::info!("Expiry sweep loop started (interval: {}s)", config.interval_seconds);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = run_expiry_sweep(store.as_ref()).await {
                    tracing::warn!("Expiry sweep error (non-fatal): {}", e);
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Expiry sweep loop shutting down");
                break;
            }
        }
    }
}
