//! Resolution of the expected marketplace contract address.

use std::{collections::HashMap, fs, io, path::Path, str::FromStr};

use alloy_primitives::Address;
use anyhow::{Context, Result, anyhow};
use merge_bridge_core::config::MarketplaceConfig;
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(untagged)]
enum Artifact {
    /// Single-contract artifact, e.g. hardhat-deploy's `deployments/<net>/<Name>.json`.
    Contract { address: String },
    /// Deployment record listing several contracts.
    Record { contracts: HashMap<String, ContractEntry> },
}

#[derive(Deserialize)]
struct ContractEntry {
    address: String,
}

/// Resolve the expected contract address: explicit config, then deployment artifact.
///
/// Returns `None` when neither source yields an address.
pub fn resolve_contract_address(config: &MarketplaceConfig) -> Result<Option<Address>> {
    if let Some(address) = config.contract_address.as_deref().filter(|s| !s.trim().is_empty()) {
        let address = parse_address(address).context("Invalid marketplace.contract_address")?;
        tracing::info!("Using configured marketplace contract address {}", address);
        return Ok(Some(address));
    }
    let Some(path) = &config.deployment_file else {
        return Ok(None);
    };
    let Some(address) = address_from_file(path, &config.contract_name)? else {
        return Ok(None);
    };
    tracing::info!("Discovered marketplace contract address {} from {}", address, path);
    Ok(Some(address))
}

fn address_from_file(path: impl AsRef<Path>, contract_name: &str) -> Result<Option<Address>> {
    let path = path.as_ref();
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::warn!("Deployment artifact {} not found", path.display());
            return Ok(None);
        }
        Err(e) => {
            return Err(e)
                .with_context(|| format!("Failed to read deployment artifact {}", path.display()));
        }
    };
    address_from_artifact(&contents, contract_name)
        .with_context(|| format!("Failed to parse deployment artifact {}", path.display()))
}

pub fn address_from_artifact(contents: &str, contract_name: &str) -> Result<Option<Address>> {
    let address = match serde_json::from_str::<Artifact>(contents)? {
        Artifact::Contract { address } => address,
        Artifact::Record { mut contracts } => match contracts.remove(contract_name) {
            Some(entry) => entry.address,
            None => {
                tracing::warn!("Deployment record has no entry for {}", contract_name);
                return Ok(None);
            }
        },
    };
    parse_address(&address).map(Some)
}

fn parse_address(address: &str) -> Result<Address> {
    Address::from_str(address.trim()).map_err(|e| anyhow!("{address:?} is not an address: {e}"))
}
