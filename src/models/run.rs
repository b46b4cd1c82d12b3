use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Exited(i32),
    Failed,
}

/// Wall-clock bookkeeping for one stream attachment.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub restarts: u32,
}

impl RunRecord {
    pub fn new() -> Self {
        Self {
            status: RunStatus::Running,
            started_at: Utc::now(),
            stopped_at: None,
            restarts: 0,
        }
    }

    pub fn restarted(previous: &RunRecord) -> Self {
        Self {
            restarts: previous.restarts + 1,
            ..Self::new()
        }
    }

    pub fn duration(&self) -> chrono::Duration {
        let end = self.stopped_at.unwrap_or_else(Utc::now);
        end - self.started_at
    }

    pub fn duration_string(&self) -> String {
        let duration = self.duration();
        let hours = duration.num_hours();
        let minutes = duration.num_minutes() % 60;
        let seconds = duration.num_seconds() % 60;

        if hours > 0 {
            format!("{}h {}m", hours, minutes)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }

    pub fn mark_exited(&mut self, code: i32) {
        self.status = RunStatus::Exited(code);
        self.stopped_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self) {
        self.status = RunStatus::Failed;
        self.stopped_at = Some(Utc::now());
    }

    pub fn is_running(&self) -> bool {
        matches!(self.status, RunStatus::Running)
    }
}

impl Default for RunRecord {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_string_picks_largest_units() {
        let mut record = RunRecord::new();
        record.started_at = Utc::now() - chrono::Duration::seconds(3725);
        record.stopped_at = Some(record.started_at + chrono::Duration::seconds(3725));
        assert_eq!(record.duration_string(), "1h 2m");

        record.stopped_at = Some(record.started_at + chrono::Duration::seconds(42));
        assert_eq!(record.duration_string(), "42s");
    }

    #[test]
    fn restart_counts_accumulate() {
        let first = RunRecord::new();
        let second = RunRecord::restarted(&first);
        let third = RunRecord::restarted(&second);
        assert_eq!(third.restarts, 2);
        assert!(third.is_running());
    }
}
