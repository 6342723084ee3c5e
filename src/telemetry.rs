/// Telemetry events emitted by the report runner as each operation finishes
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    /// A read or aggregation returned documents
    DocumentsReturned {
        operation: &'static str,
        documents: u64,
        duration_ms: u64,
    },
    /// An update or delete was applied
    MutationApplied {
        operation: &'static str,
        matched: u64,
        modified: u64,
        deleted: u64,
        duration_ms: u64,
    },
    /// An index was created (or already existed)
    IndexEnsured {
        operation: &'static str,
        duration_ms: u64,
    },
    /// A query plan was explained; no documents are returned
    PlanExplained {
        operation: &'static str,
        used_index: bool,
        duration_ms: u64,
    },
}

impl TelemetryEvent {
    pub fn operation(&self) -> &'static str {
        match self {
            TelemetryEvent::DocumentsReturned { operation, .. }
            | TelemetryEvent::MutationApplied { operation, .. }
            | TelemetryEvent::IndexEnsured { operation, .. }
            | TelemetryEvent::PlanExplained { operation, .. } => operation,
        }
    }

    fn duration_ms(&self) -> u64 {
        match self {
            TelemetryEvent::DocumentsReturned { duration_ms, .. }
            | TelemetryEvent::MutationApplied { duration_ms, .. }
            | TelemetryEvent::IndexEnsured { duration_ms, .. }
            | TelemetryEvent::PlanExplained { duration_ms, .. } => *duration_ms,
        }
    }
}

/// Statistics aggregated from telemetry events
#[derive(Debug, Default, Clone)]
pub struct RunStats {
    pub operations_completed: usize,
    pub documents_returned: u64,
    pub documents_matched: u64,
    pub documents_modified: u64,
    pub documents_deleted: u64,
    pub indexes_ensured: usize,
    pub plans_explained: usize,
    pub plans_using_index: usize,
    pub operation_durations_ms: Vec<u64>,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update stats with a telemetry event
    pub fn update(&mut self, event: &TelemetryEvent) {
        self.operations_completed += 1;
        self.operation_durations_ms.push(event.duration_ms());

        match event {
            TelemetryEvent::DocumentsReturned { documents, .. } => {
                self.documents_returned += documents;
            }
            TelemetryEvent::MutationApplied {
                matched,
                modified,
                deleted,
                ..
            } => {
                self.documents_matched += matched;
                self.documents_modified += modified;
                self.documents_deleted += deleted;
            }
            TelemetryEvent::IndexEnsured { .. } => {
                self.indexes_ensured += 1;
            }
            TelemetryEvent::PlanExplained { used_index, .. } => {
                self.plans_explained += 1;
                if *used_index {
                    self.plans_using_index += 1;
                }
            }
        }
    }

    /// Calculate percentile from operation durations
    pub fn percentile(&self, p: f64) -> Option<u64> {
        if self.operation_durations_ms.is_empty() {
            return None;
        }

        let mut sorted = self.operation_durations_ms.clone();
        sorted.sort_unstable();

        let index = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
        let index = index.saturating_sub(1).min(sorted.len() - 1);

        Some(sorted[index])
    }

    /// Get p50, p90, p99 percentiles
    pub fn get_percentiles(&self) -> (Option<u64>, Option<u64>, Option<u64>) {
        (
            self.percentile(50.0),
            self.percentile(90.0),
            self.percentile(99.0),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(documents: u64, duration_ms: u64) -> TelemetryEvent {
        TelemetryEvent::DocumentsReturned {
            operation: "read",
            documents,
            duration_ms,
        }
    }

    #[test]
    fn test_update_accumulates_by_kind() {
        let mut stats = RunStats::new();
        stats.update(&read(4, 3));
        stats.update(&TelemetryEvent::MutationApplied {
            operation: "update",
            matched: 1,
            modified: 1,
            deleted: 0,
            duration_ms: 2,
        });
        stats.update(&TelemetryEvent::MutationApplied {
            operation: "delete",
            matched: 0,
            modified: 0,
            deleted: 1,
            duration_ms: 1,
        });
        stats.update(&TelemetryEvent::IndexEnsured {
            operation: "index",
            duration_ms: 5,
        });
        stats.update(&TelemetryEvent::PlanExplained {
            operation: "explain",
            used_index: true,
            duration_ms: 4,
        });
        stats.update(&TelemetryEvent::PlanExplained {
            operation: "explain",
            used_index: false,
            duration_ms: 6,
        });

        assert_eq!(stats.operations_completed, 6);
        assert_eq!(stats.documents_returned, 4);
        assert_eq!(stats.documents_matched, 1);
        assert_eq!(stats.documents_modified, 1);
        assert_eq!(stats.documents_deleted, 1);
        assert_eq!(stats.indexes_ensured, 1);
        assert_eq!(stats.plans_explained, 2);
        assert_eq!(stats.plans_using_index, 1);
        assert_eq!(stats.operation_durations_ms, vec![3, 2, 1, 5, 4, 6]);
    }

    #[test]
    fn test_percentiles() {
        let mut stats = RunStats::new();
        assert_eq!(stats.get_percentiles(), (None, None, None));

        for ms in 1..=10 {
            stats.update(&read(0, ms));
        }
        assert_eq!(stats.percentile(50.0), Some(5));
        assert_eq!(stats.percentile(90.0), Some(9));
        assert_eq!(stats.percentile(99.0), Some(10));
        assert_eq!(stats.percentile(0.0), Some(1));
    }

    #[test]
    fn test_event_operation_name() {
        assert_eq!(read(1, 1).operation(), "read");
    }
}
