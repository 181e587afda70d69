//! Per-record pipeline: provenance, decode, PR reference, merge.

use std::{any::Any, fmt, panic::AssertUnwindSafe};

use futures_util::FutureExt;
use merge_bridge_chain::{ProvenanceVerifier, decode_task_approved};
use merge_bridge_core::models::{ActivityEntry, ActivityRecord, WebhookEnvelope};
use merge_bridge_github::{
    MergeOrchestrator, MergeOutcome, PrReference, PullRequestApi, extract_pull_request_url,
};

pub struct Bridge<C> {
    pub verifier: ProvenanceVerifier,
    pub orchestrator: MergeOrchestrator<C>,
}

/// How one activity entry ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Malformed { index: usize, reason: String },
    ProvenanceMismatch { address: String },
    NotTaskApproved,
    InvalidPrUrl { url: String },
    Merge { pr: PrReference, outcome: MergeOutcome },
    Panicked(String),
}

impl RecordOutcome {
    pub fn merge_outcome(&self) -> Option<&MergeOutcome> {
        match self {
            Self::Merge { outcome, .. } => Some(outcome),
            _ => None,
        }
    }
}

impl fmt::Display for RecordOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed { index, reason } => write!(f, "record {index} malformed: {reason}"),
            Self::ProvenanceMismatch { address } => write!(f, "untrusted emitter {address}"),
            Self::NotTaskApproved => f.write_str("not a TaskApproved event"),
            Self::InvalidPrUrl { url } => write!(f, "invalid pull request URL {url:?}"),
            Self::Merge { pr, outcome } => match &outcome.sha {
                Some(sha) => write!(f, "{pr}: {} ({sha})", outcome.reason),
                None => write!(f, "{pr}: {}", outcome.reason),
            },
            Self::Panicked(message) => write!(f, "panicked: {message}"),
        }
    }
}

/// Counts of record outcomes for one delivery.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub merged: usize,
    pub already_merged: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl Summary {
    pub fn of(outcomes: &[RecordOutcome]) -> Self {
        outcomes.iter().fold(Self::default(), |mut summary, outcome| {
            match outcome.merge_outcome() {
                Some(o) if o.already_merged => summary.already_merged += 1,
                Some(o) if o.success => summary.merged += 1,
                Some(_) => summary.failed += 1,
                None if matches!(outcome, RecordOutcome::Panicked(_)) => summary.failed += 1,
                None => summary.skipped += 1,
            }
            summary
        })
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} merged, {} already merged, {} failed, {} skipped",
            self.merged, self.already_merged, self.failed, self.skipped
        )
    }
}

impl<C: PullRequestApi> Bridge<C> {
    pub fn new(verifier: ProvenanceVerifier, orchestrator: MergeOrchestrator<C>) -> Self {
        Self { verifier, orchestrator }
    }

    /// Process every entry in delivery order, one at a time.
    ///
    /// Each record's external calls complete before the next record starts.
    pub async fn process(&self, envelope: &WebhookEnvelope) -> Vec<RecordOutcome> {
        let mut outcomes = Vec::with_capacity(envelope.activity.len());
        for entry in &envelope.activity {
            outcomes.push(self.process_entry(entry).await);
        }
        outcomes
    }

    async fn process_entry(&self, entry: &ActivityEntry) -> RecordOutcome {
        let record = match entry {
            ActivityEntry::Record(record) => record,
            ActivityEntry::Malformed(malformed) => {
                tracing::warn!(
                    "Skipping malformed activity record {}: {}",
                    malformed.index,
                    malformed.reason
                );
                return RecordOutcome::Malformed {
                    index: malformed.index,
                    reason: malformed.reason.clone(),
                };
            }
        };
        match AssertUnwindSafe(self.process_record(record)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!("Processing {} panicked: {}", record, message);
                RecordOutcome::Panicked(message)
            }
        }
    }

    async fn process_record(&self, record: &ActivityRecord) -> RecordOutcome {
        if !self.verifier.verify(&record.log.address) {
            tracing::debug!(
                "Skipping {}: emitted by untrusted contract {}",
                record,
                record.log.address
            );
            return RecordOutcome::ProvenanceMismatch { address: record.log.address.clone() };
        }
        let Some(event) = decode_task_approved(&record.log) else {
            tracing::info!("Skipping {}: not a TaskApproved event", record);
            return RecordOutcome::NotTaskApproved;
        };
        let task_id = event.task_id.to_string();
        let worker = event.worker_string();
        tracing::info!(
            "TaskApproved in {}: task {} worker {} url {}",
            record,
            task_id,
            worker,
            event.github_pr_url
        );
        let Some(pr) = extract_pull_request_url(&event.github_pr_url) else {
            tracing::warn!(
                "Skipping task {}: {:?} is not a GitHub pull request URL",
                task_id,
                event.github_pr_url
            );
            return RecordOutcome::InvalidPrUrl { url: event.github_pr_url };
        };
        let outcome = self.orchestrator.merge(&pr, &worker, Some(&task_id)).await;
        if outcome.success {
            tracing::info!("Task {}: {} {}", task_id, pr, outcome.reason);
        } else {
            tracing::warn!("Task {}: failed to merge {}: {}", task_id, pr, outcome.reason);
        }
        RecordOutcome::Merge { pr, outcome }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
