use std::time::Duration;

use serde::Serialize;

/// Progress after one dispatch round.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundStats {
    /// 1-based.
    pub round: usize,
    pub dispatched: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub processed_total: u64,
    pub remaining: u64,
    #[serde(serialize_with = "as_secs")]
    pub round_elapsed: Duration,
    /// Documents per second since the batch started.
    pub throughput: f64,
    #[serde(serialize_with = "opt_as_secs")]
    pub eta: Option<Duration>,
}

impl RoundStats {
    /// `batch_elapsed` is measured from batch start, so throughput and ETA
    /// smooth out across rounds.
    pub fn compute(
        round: usize,
        succeeded: usize,
        failed: usize,
        processed_total: u64,
        total: u64,
        round_elapsed: Duration,
        batch_elapsed: Duration,
    ) -> Self {
        let remaining = total.saturating_sub(processed_total);
        let secs = batch_elapsed.as_secs_f64();
        let throughput = if secs > 0.0 {
            processed_total as f64 / secs
        } else {
            0.0
        };
        let eta = if remaining == 0 {
            Some(Duration::ZERO)
        } else if throughput > 0.0 {
            Some(Duration::from_secs_f64(remaining as f64 / throughput))
        } else {
            None
        };

        Self {
            round,
            dispatched: succeeded + failed,
            succeeded,
            failed,
            processed_total,
            remaining,
            round_elapsed,
            throughput,
            eta,
        }
    }
}

fn as_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

fn opt_as_secs<S: serde::Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
    match d {
        Some(d) => s.serialize_some(&d.as_secs_f64()),
        None => s.serialize_none(),
    }
}

/// `1h 02m 03s`, `4m 05s`, `12s`.
pub fn format_duration(d: Duration) -> String {
    let total = d.as_secs();
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{}h {:02}m {:02}s", h, m, s)
    } else if m > 0 {
        format!("{}m {:02}s", m, s)
    } else {
        format!("{}s", s)
    }
}
