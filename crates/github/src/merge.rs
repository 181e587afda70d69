//! Fetch-then-merge workflow for a single pull request.
//!
//! The pull request is always re-fetched before merging, so redelivered or
//! reprocessed approvals short-circuit once the first merge has landed.

use std::{future::Future, time::Duration};

use http::StatusCode;

use crate::{ApiError, MergeRequest, PrReference, PullRequestApi, PullRequestState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub success: bool,
    pub reason: String,
    pub already_merged: bool,
    /// Merge commit, when the API reported one.
    pub sha: Option<String>,
}

impl MergeOutcome {
    fn merged(sha: Option<String>) -> Self {
        Self { success: true, reason: "merged".to_string(), already_merged: false, sha }
    }

    fn already_merged() -> Self {
        Self {
            success: true,
            reason: "already merged".to_string(),
            already_merged: true,
            sha: None,
        }
    }

    fn failed(reason: impl Into<String>) -> Self {
        Self { success: false, reason: reason.into(), already_merged: false, sha: None }
    }
}

/// What the fetched state allows us to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrDisposition {
    AlreadyMerged,
    ClosedUnmerged,
    Conflict,
    Mergeable,
}

impl PrDisposition {
    pub fn classify(state: &PullRequestState) -> Self {
        if state.merged {
            Self::AlreadyMerged
        } else if !state.open {
            Self::ClosedUnmerged
        } else if state.mergeable == Some(false) {
            Self::Conflict
        } else {
            Self::Mergeable
        }
    }
}

pub struct MergeOrchestrator<C> {
    client: C,
    timeout: Duration,
}

impl<C: PullRequestApi> MergeOrchestrator<C> {
    pub fn new(client: C, timeout: Duration) -> Self { Self { client, timeout } }

    pub fn client(&self) -> &C { &self.client }

    /// Merge `pr` on behalf of `worker`. Never fails; every error becomes an outcome.
    pub async fn merge(
        &self,
        pr: &PrReference,
        worker: &str,
        task_id: Option<&str>,
    ) -> MergeOutcome {
        let state = match self.bounded(self.client.get_pull_request(pr)).await {
            Ok(state) => state,
            Err(e) if e.is_not_found_or_forbidden() => {
                return MergeOutcome::failed("not found or insufficient permissions");
            }
            Err(e) => return MergeOutcome::failed(format!("failed to fetch pull request: {e}")),
        };
        tracing::debug!(
            "Fetched {}: open={} merged={} mergeable={:?}",
            pr,
            state.open,
            state.merged,
            state.mergeable
        );

        match PrDisposition::classify(&state) {
            PrDisposition::AlreadyMerged => return MergeOutcome::already_merged(),
            PrDisposition::ClosedUnmerged => return MergeOutcome::failed("closed without merge"),
            PrDisposition::Conflict => return MergeOutcome::failed("has conflicts"),
            PrDisposition::Mergeable => {}
        }

        let request = merge_request(pr, &state, worker, task_id);
        tracing::info!("Squash-merging {} for worker {}", pr, worker);
        match self.bounded(self.client.merge_pull_request(pr, &request)).await {
            Ok(result) => MergeOutcome::merged(result.sha),
            Err(e) => MergeOutcome::failed(merge_failure_reason(&e)),
        }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, ApiError>>,
    ) -> Result<T, ApiError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .unwrap_or(Err(ApiError::Timeout(self.timeout)))
    }
}

fn merge_request(
    pr: &PrReference,
    state: &PullRequestState,
    worker: &str,
    task_id: Option<&str>,
) -> MergeRequest {
    let title = match state.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        Some(title) => format!("{title} (#{})", pr.number),
        None => format!("Merge pull request #{}", pr.number),
    };
    let mut message = format!("Approved on-chain for worker {worker}");
    if let Some(task_id) = task_id {
        message.push_str(&format!("\n\nTask ID: {task_id}"));
    }
    MergeRequest { title, message }
}

fn merge_failure_reason(err: &ApiError) -> String {
    if err.is_not_found_or_forbidden() {
        return "not found or insufficient permissions".to_string();
    }
    match err.status() {
        Some(StatusCode::METHOD_NOT_ALLOWED) => "not mergeable, checks likely pending".to_string(),
        Some(StatusCode::CONFLICT) => "merge conflicts".to_string(),
        _ => format!("merge failed: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeGitHub, FakePull};

    const WORKER: &str = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";

    fn pr(number: u64) -> PrReference {
        PrReference { owner: "acme".to_string(), repo: "repo".to_string(), number }
    }

    fn orchestrator(github: FakeGitHub) -> MergeOrchestrator<FakeGitHub> {
        MergeOrchestrator::new(github, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_merges_open_pull_request() {
        let merger = orchestrator(FakeGitHub::new().with_pull("acme", "repo", 7, FakePull::open()));
        let outcome = merger.merge(&pr(7), WORKER, Some("42")).await;
        assert!(outcome.success);
        assert!(!outcome.already_merged);
        assert_eq!(outcome.reason, "merged");
        assert!(outcome.sha.is_some());

        let merges = merger.client().merges();
        assert_eq!(merges.len(), 1);
        let (merged_pr, request) = &merges[0];
        assert_eq!(merged_pr, &pr(7));
        assert_eq!(request.title, "Add feature (#7)");
        assert!(request.message.contains(WORKER));
        assert!(request.message.contains("Task ID: 42"));
    }

    #[tokio::test]
    async fn test_merges_while_mergeability_unknown() {
        let pull = FakePull::open().with_mergeable(None);
        let merger = orchestrator(FakeGitHub::new().with_pull("acme", "repo", 7, pull));
        assert!(merger.merge(&pr(7), WORKER, None).await.success);
        assert_eq!(merger.client().merge_count(), 1);
    }

    #[tokio::test]
    async fn test_already_merged_is_idempotent() {
        let merger =
            orchestrator(FakeGitHub::new().with_pull("acme", "repo", 7, FakePull::merged()));
        for _ in 0..2 {
            let outcome = merger.merge(&pr(7), WORKER, None).await;
            assert!(outcome.success);
            assert!(outcome.already_merged);
        }
        assert_eq!(merger.client().merge_count(), 0);
        assert_eq!(merger.client().fetches().len(), 2);
    }

    #[tokio::test]
    async fn test_second_invocation_short_circuits() {
        let merger = orchestrator(FakeGitHub::new().with_pull("acme", "repo", 7, FakePull::open()));
        let first = merger.merge(&pr(7), WORKER, None).await;
        assert!(first.success && !first.already_merged);
        let second = merger.merge(&pr(7), WORKER, None).await;
        assert!(second.success && second.already_merged);
        assert_eq!(merger.client().merge_count(), 1);
    }

    #[tokio::test]
    async fn test_read_only_failures() {
        let github = FakeGitHub::new()
            .with_pull("acme", "repo", 1, FakePull::closed())
            .with_pull("acme", "repo", 2, FakePull::open().with_mergeable(Some(false)));
        let merger = orchestrator(github);

        let closed = merger.merge(&pr(1), WORKER, None).await;
        assert!(!closed.success);
        assert_eq!(closed.reason, "closed without merge");

        let conflict = merger.merge(&pr(2), WORKER, None).await;
        assert!(!conflict.success);
        assert_eq!(conflict.reason, "has conflicts");

        let missing = merger.merge(&pr(3), WORKER, None).await;
        assert!(!missing.success);
        assert_eq!(missing.reason, "not found or insufficient permissions");

        assert_eq!(merger.client().merge_count(), 0);
    }

    #[tokio::test]
    async fn test_merge_error_mapping() {
        let cases = [
            (StatusCode::NOT_FOUND, "not found or insufficient permissions"),
            (StatusCode::FORBIDDEN, "not found or insufficient permissions"),
            (StatusCode::UNAUTHORIZED, "not found or insufficient permissions"),
            (StatusCode::METHOD_NOT_ALLOWED, "not mergeable, checks likely pending"),
            (StatusCode::CONFLICT, "merge conflicts"),
            (StatusCode::UNPROCESSABLE_ENTITY, "merge failed: Validation Failed"),
        ];
        for (status, reason) in cases {
            let pull = FakePull::open().with_merge_error(status, "Validation Failed");
            let merger = orchestrator(FakeGitHub::new().with_pull("acme", "repo", 7, pull));
            let outcome = merger.merge(&pr(7), WORKER, None).await;
            assert!(!outcome.success, "{status}");
            assert!(!outcome.already_merged);
            assert_eq!(outcome.reason, reason, "{status}");
            assert_eq!(merger.client().merge_count(), 1);
        }
    }

    #[tokio::test]
    async fn test_timeout_becomes_failure() {
        let pull = FakePull::open().with_delay(Duration::from_secs(10));
        let github = FakeGitHub::new().with_pull("acme", "repo", 7, pull);
        let merger = MergeOrchestrator::new(github, Duration::from_millis(50));
        let outcome = merger.merge(&pr(7), WORKER, None).await;
        assert!(!outcome.success);
        assert_eq!(outcome.reason, "failed to fetch pull request: request timed out after 50ms");
        assert_eq!(merger.client().merge_count(), 0);
    }

    #[test]
    fn test_classify() {
        let open = FakePull::open().state;
        assert_eq!(PrDisposition::classify(&open), PrDisposition::Mergeable);
        let merged_but_open = PullRequestState { merged: true, ..open.clone() };
        assert_eq!(PrDisposition::classify(&merged_but_open), PrDisposition::AlreadyMerged);
        let closed_conflicting =
            PullRequestState { open: false, mergeable: Some(false), ..open.clone() };
        assert_eq!(PrDisposition::classify(&closed_conflicting), PrDisposition::ClosedUnmerged);
    }

    #[test]
    fn test_merge_request_without_title() {
        let state = PullRequestState { title: Some("  ".to_string()), ..FakePull::open().state };
        let request = merge_request(&pr(9), &state, WORKER, None);
        assert_eq!(request.title, "Merge pull request #9");
        assert_eq!(request.message, format!("Approved on-chain for worker {WORKER}"));
    }
}
