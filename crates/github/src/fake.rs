//! In-memory [`PullRequestApi`] that records every call.

use std::{collections::HashMap, sync::Mutex, time::Duration};

use http::StatusCode;

use crate::{ApiError, MergeRequest, MergeResult, PrReference, PullRequestApi, PullRequestState};

#[derive(Debug, Clone)]
pub struct FakePull {
    pub state: PullRequestState,
    /// Returned by the merge call instead of merging.
    pub merge_error: Option<(StatusCode, String)>,
    /// Applied before answering either call.
    pub delay: Option<Duration>,
    pub panic_on_fetch: bool,
}

impl FakePull {
    pub fn open() -> Self {
        Self {
            state: PullRequestState {
                open: true,
                merged: false,
                mergeable: Some(true),
                title: Some("Add feature".to_string()),
            },
            merge_error: None,
            delay: None,
            panic_on_fetch: false,
        }
    }

    pub fn merged() -> Self {
        let mut pull = Self::open();
        pull.state.open = false;
        pull.state.merged = true;
        pull
    }

    pub fn closed() -> Self {
        let mut pull = Self::open();
        pull.state.open = false;
        pull
    }

    pub fn with_mergeable(mut self, mergeable: Option<bool>) -> Self {
        self.state.mergeable = mergeable;
        self
    }

    pub fn with_merge_error(mut self, status: StatusCode, message: &str) -> Self {
        self.merge_error = Some((status, message.to_string()));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panic_on_fetch = true;
        self
    }
}

#[derive(Debug, Default)]
pub struct FakeGitHub {
    pulls: Mutex<HashMap<PrReference, FakePull>>,
    fetches: Mutex<Vec<PrReference>>,
    merges: Mutex<Vec<(PrReference, MergeRequest)>>,
}

impl FakeGitHub {
    pub fn new() -> Self { Self::default() }

    pub fn with_pull(self, owner: &str, repo: &str, number: u64, pull: FakePull) -> Self {
        let pr = PrReference { owner: owner.to_string(), repo: repo.to_string(), number };
        self.pulls.lock().unwrap().insert(pr, pull);
        self
    }

    pub fn fetches(&self) -> Vec<PrReference> { self.fetches.lock().unwrap().clone() }

    /// Every merge call issued, successful or not.
    pub fn merges(&self) -> Vec<(PrReference, MergeRequest)> { self.merges.lock().unwrap().clone() }

    pub fn merge_count(&self) -> usize { self.merges.lock().unwrap().len() }

    fn lookup(&self, pr: &PrReference) -> Option<FakePull> {
        self.pulls.lock().unwrap().get(pr).cloned()
    }
}

fn not_found() -> ApiError {
    ApiError::Status { status: StatusCode::NOT_FOUND, message: "Not Found".to_string() }
}

impl PullRequestApi for FakeGitHub {
    async fn get_pull_request(&self, pr: &PrReference) -> Result<PullRequestState, ApiError> {
        self.fetches.lock().unwrap().push(pr.clone());
        let pull = self.lookup(pr).ok_or_else(not_found)?;
        if let Some(delay) = pull.delay {
            tokio::time::sleep(delay).await;
        }
        if pull.panic_on_fetch {
            panic!("fake fetch panicked for {pr}");
        }
        Ok(pull.state)
    }

    async fn merge_pull_request(
        &self,
        pr: &PrReference,
        request: &MergeRequest,
    ) -> Result<MergeResult, ApiError> {
        self.merges.lock().unwrap().push((pr.clone(), request.clone()));
        let pull = self.lookup(pr).ok_or_else(not_found)?;
        if let Some(delay) = pull.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some((status, message)) = pull.merge_error {
            return Err(ApiError::Status { status, message });
        }
        let mut pulls = self.pulls.lock().unwrap();
        if let Some(pull) = pulls.get_mut(pr) {
            pull.state.open = false;
            pull.state.merged = true;
        }
        Ok(MergeResult { sha: Some(format!("{:040x}", pr.number)) })
    }
}
