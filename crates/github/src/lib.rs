pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod fake;
pub mod merge;
pub mod pull;

use std::future::Future;

use anyhow::{Context, Result};
use merge_bridge_core::config::GitHubConfig;
use octocrab::{Octocrab, models::IssueState, params};

pub use crate::{
    error::ApiError,
    merge::{MergeOrchestrator, MergeOutcome},
    pull::{PrReference, extract_pull_request_url},
};

/// Current state of a pull request as reported by the hosting API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestState {
    pub open: bool,
    pub merged: bool,
    /// `None` while GitHub is still computing mergeability.
    pub mergeable: Option<bool>,
    pub title: Option<String>,
}

/// A squash merge; the only strategy the bridge uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRequest {
    pub title: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeResult {
    pub sha: Option<String>,
}

/// The subset of the code-hosting API the bridge drives.
pub trait PullRequestApi: Send + Sync {
    fn get_pull_request(
        &self,
        pr: &PrReference,
    ) -> impl Future<Output = Result<PullRequestState, ApiError>> + Send;

    fn merge_pull_request(
        &self,
        pr: &PrReference,
        request: &MergeRequest,
    ) -> impl Future<Output = Result<MergeResult, ApiError>> + Send;
}

#[derive(Clone)]
pub struct GitHub {
    pub client: Octocrab,
}

impl GitHub {
    pub async fn new(config: &GitHubConfig) -> Result<Self> {
        let timeout = Some(config.timeout());
        let client = Octocrab::builder()
            .personal_token(config.token.clone())
            .set_connect_timeout(timeout)
            .set_read_timeout(timeout)
            .set_write_timeout(timeout)
            .build()
            .context("Failed to create GitHub client")?;
        let profile = client.current().user().await.context("Failed to fetch current user")?;
        tracing::info!("Logged in as {}", profile.login);
        Ok(Self { client })
    }
}

impl PullRequestApi for GitHub {
    async fn get_pull_request(&self, pr: &PrReference) -> Result<PullRequestState, ApiError> {
        let pull = self.client.pulls(&pr.owner, &pr.repo).get(pr.number).await?;
        Ok(PullRequestState {
            open: pull.state == Some(IssueState::Open),
            merged: pull.merged.unwrap_or(false) || pull.merged_at.is_some(),
            mergeable: pull.mergeable,
            title: pull.title,
        })
    }

    async fn merge_pull_request(
        &self,
        pr: &PrReference,
        request: &MergeRequest,
    ) -> Result<MergeResult, ApiError> {
        let pulls = self.client.pulls(&pr.owner, &pr.repo);
        let merge = pulls
            .merge(pr.number)
            .method(params::pulls::MergeMethod::Squash)
            .title(request.title.clone())
            .message(request.message.clone())
            .send()
            .await?;
        if !merge.merged {
            return Err(ApiError::Other(format!(
                "merge request returned merged=false: {}",
                merge.message.as_deref().unwrap_or("unknown reason")
            )));
        }
        Ok(MergeResult { sha: merge.sha })
    }
}
