use chrono::{DateTime, Utc};
use mcr_common::types::RevisionKind;
use serde::{Deserialize, Serialize};

/// Result of handling one revision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Processed,
    Skipped,
    Errored,
}

/// Counters for one backfill run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationRunState {
    pub processed_contracts: u64,
    pub processed_rates: u64,
    pub skipped_contracts: u64,
    pub skipped_rates: u64,
    pub errored_contracts: u64,
    pub errored_rates: u64,
    pub timeout_exceeded: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub elapsed_ms: u64,
}

impl Default for MigrationRunState {
    fn default() -> Self {
        Self::new()
    }
}

impl MigrationRunState {
    pub fn new() -> Self {
        Self {
            processed_contracts: 0,
            processed_rates: 0,
            skipped_contracts: 0,
            skipped_rates: 0,
            errored_contracts: 0,
            errored_rates: 0,
            timeout_exceeded: false,
            started_at: Utc::now(),
            completed_at: None,
            elapsed_ms: 0,
        }
    }

    pub fn record(&mut self, kind: RevisionKind, outcome: ItemOutcome) {
        let counter = match (kind, outcome) {
            (RevisionKind::Contract, ItemOutcome::Processed) => &mut self.processed_contracts,
            (RevisionKind::Contract, ItemOutcome::Skipped) => &mut self.skipped_contracts,
            (RevisionKind::Contract, ItemOutcome::Errored) => &mut self.errored_contracts,
            (RevisionKind::Rate, ItemOutcome::Processed) => &mut self.processed_rates,
            (RevisionKind::Rate, ItemOutcome::Skipped) => &mut self.skipped_rates,
            (RevisionKind::Rate, ItemOutcome::Errored) => &mut self.errored_rates,
        };
        *counter += 1;
    }

    /// Revisions of `kind` seen so far, whatever their outcome
    pub fn handled(&self, kind: RevisionKind) -> u64 {
        match kind {
            RevisionKind::Contract => {
                self.processed_contracts + self.skipped_contracts + self.errored_contracts
            },
            RevisionKind::Rate => self.processed_rates + self.skipped_rates + self.errored_rates,
        }
    }

    pub fn errored(&self) -> u64 {
        self.errored_contracts + self.errored_rates
    }

    pub fn complete(&mut self, elapsed_ms: u64) {
        self.completed_at = Some(Utc::now());
        self.elapsed_ms = elapsed_ms;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_record_routes_to_counters() {
        let mut stats = MigrationRunState::new();
        stats.record(RevisionKind::Contract, ItemOutcome::Processed);
        stats.record(RevisionKind::Contract, ItemOutcome::Errored);
        stats.record(RevisionKind::Rate, ItemOutcome::Skipped);

        assert_eq!(stats.processed_contracts, 1);
        assert_eq!(stats.errored_contracts, 1);
        assert_eq!(stats.skipped_rates, 1);
        assert_eq!(stats.handled(RevisionKind::Contract), 2);
        assert_eq!(stats.handled(RevisionKind::Rate), 1);
        assert_eq!(stats.errored(), 1);
    }

    #[test]
    fn test_serializes_camel_case() {
        let mut stats = MigrationRunState::new();
        stats.timeout_exceeded = true;
        stats.complete(42);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["processedContracts"], 0);
        assert_eq!(json["timeoutExceeded"], true);
        assert_eq!(json["elapsedMs"], 42);
        assert!(json["startedAt"].is_string());
    }
}
