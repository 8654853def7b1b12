use crate::model::Call;

const COMPLETED: &[&str] = &["completed", "ended", "success"];
const FAILED: &[&str] = &["failed", "error", "failed_to_start"];

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CallStats {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    /// Mean over calls with a known duration, in whole seconds.
    pub average_duration_secs: u64,
}

impl CallStats {
    pub fn average_duration(&self) -> String {
        format_duration(self.average_duration_secs)
    }
}

pub fn calculate_stats(calls: &[Call]) -> CallStats {
    let mut stats = CallStats {
        total: calls.len(),
        ..Default::default()
    };
    let mut duration_sum = 0u64;
    let mut timed = 0u64;
    for call in calls {
        let status = call.status().map(str::to_ascii_lowercase);
        match status.as_deref() {
            Some(s) if COMPLETED.contains(&s) => stats.completed += 1,
            Some(s) if FAILED.contains(&s) => stats.failed += 1,
            _ => {}
        }
        if let Some(secs) = call.duration_seconds() {
            duration_sum += secs;
            timed += 1;
        }
    }
    if timed > 0 {
        stats.average_duration_secs = duration_sum / timed;
    }
    stats
}

/// `m:ss`, minutes unbounded.
pub fn format_duration(secs: u64) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}
