//! Decoding of the marketplace `TaskApproved` event.

use std::str::FromStr;

use alloy_primitives::{Address, B256, Bytes, LogData, U256};
use alloy_sol_types::{SolEvent, sol};
use anyhow::{Context, Result, ensure};
use merge_bridge_core::models::RawLog;

sol! {
    #[derive(Debug)]
    event TaskApproved(uint256 indexed taskId, address indexed worker, string githubPrUrl);
}

/// Signature hash plus the two indexed arguments.
const TOPIC_COUNT: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskApprovedEvent {
    pub task_id: U256,
    pub worker: Address,
    /// Raw string payload, not validated as a URL.
    pub github_pr_url: String,
}

impl TaskApprovedEvent {
    /// Lowercase `0x`-prefixed worker address.
    pub fn worker_string(&self) -> String { format!("0x{:x}", self.worker) }
}

/// Decode a raw log as `TaskApproved`. Returns `None` for anything else.
pub fn decode_task_approved(log: &RawLog) -> Option<TaskApprovedEvent> {
    let (Some(topics), Some(data)) = (&log.topics, &log.data) else {
        tracing::debug!("Log from {} is missing topics or data", log.address);
        return None;
    };
    match try_decode(topics, data) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::debug!("Log from {} is not a TaskApproved event: {:#}", log.address, e);
            None
        }
    }
}

fn try_decode(topics: &[String], data: &str) -> Result<TaskApprovedEvent> {
    ensure!(topics.len() == TOPIC_COUNT, "expected {TOPIC_COUNT} topics, got {}", topics.len());
    let topics = topics
        .iter()
        .map(|topic| B256::from_str(topic).with_context(|| format!("invalid topic {topic}")))
        .collect::<Result<Vec<_>>>()?;
    ensure!(topics[0] == TaskApproved::SIGNATURE_HASH, "signature mismatch");
    let data = hex::decode(data.strip_prefix("0x").unwrap_or(data)).context("invalid log data")?;
    let log_data = LogData::new(topics, Bytes::from(data)).context("too many topics")?;
    let decoded = TaskApproved::decode_log_data(&log_data).context("ABI decode failed")?;
    Ok(TaskApprovedEvent {
        task_id: decoded.taskId,
        worker: decoded.worker,
        github_pr_url: decoded.githubPrUrl,
    })
}
