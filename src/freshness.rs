use crate::iqair::MeasurementBatch;

/// Whether `candidate` holds data newer than the last forwarded batch.
///
/// Anything is newer than nothing.
pub fn is_newer(candidate: &MeasurementBatch, last_forwarded: Option<&MeasurementBatch>) -> bool {
    last_forwarded.is_none_or(|last| candidate > last)
}

/// Remembers the revision of the last batch sent downstream.
#[derive(Debug, Default)]
pub struct FreshnessTracker {
    last_forwarded: Option<i64>,
}

impl FreshnessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_forwarded(&self) -> Option<i64> {
        self.last_forwarded
    }

    pub fn is_newer(&self, candidate: &MeasurementBatch) -> bool {
        self.last_forwarded
            .is_none_or(|revision| candidate.revision() > revision)
    }

    /// Records a batch as forwarded. The tracked revision never goes backwards.
    pub fn record_forwarded(&mut self, batch: &MeasurementBatch) {
        if self.is_newer(batch) {
            self.last_forwarded = Some(batch.revision());
        }
    }
}
