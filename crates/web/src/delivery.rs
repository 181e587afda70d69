use std::{convert::Infallible, sync::Arc};

use axum::{
    body::Bytes,
    extract::{FromRef, FromRequest, Request},
};
use hmac::{Hmac, Mac};
use merge_bridge_core::{config::Config, models::Envelope};
use sha2::Sha256;

pub const SIGNATURE_HEADER: &str = "x-alchemy-signature";

/// Authenticate and validate a chain-event delivery.
///
/// Never rejects: an unreadable or unauthenticated delivery is still
/// acknowledged upstream, so failures are carried as [`Delivery::Rejected`].
#[derive(Debug)]
pub enum Delivery {
    Accepted(Envelope),
    Rejected(String),
}

impl<S> FromRequest<S> for Delivery
where
    Arc<Config>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let config = <Arc<Config>>::from_ref(state);
        let signature = req
            .headers()
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string());
        let body = match Bytes::from_request(req, state).await {
            Ok(body) => body,
            Err(e) => return Ok(Self::Rejected(format!("error reading body: {e}"))),
        };
        if let Some(signing_key) = &config.webhook.signing_key
            && let Err(reason) = verify_signature(signing_key, signature.as_deref(), &body)
        {
            return Ok(Self::Rejected(reason.to_string()));
        }
        Ok(Self::Accepted(Envelope::parse(&body)))
    }
}

fn verify_signature(
    signing_key: &str,
    signature: Option<&str>,
    body: &[u8],
) -> Result<(), &'static str> {
    let signature = signature.ok_or("X-Alchemy-Signature missing")?;
    let signature = hex::decode(signature).map_err(|_| "X-Alchemy-Signature malformed")?;
    let mut mac = Hmac::<Sha256>::new_from_slice(signing_key.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(body);
    mac.verify_slice(&signature).map_err(|_| "signature mismatch")
}

/// Hex HMAC-SHA256 of `body`, as the provider computes it.
#[cfg(test)]
pub fn sign(signing_key: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(signing_key.as_bytes()).unwrap();
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}
