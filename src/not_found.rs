//! 404 baseline per target
//!
//! Many sites answer unknown paths with a 200 page. The baseline records
//! what a surely-missing page looks like for each origin so plugins can
//! tell real content from "not found" pages.

use crate::error::{Error, Result};
use crate::kb::KnowledgeBase;
use crate::transport::{HttpResponse, Transport};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::RandomState;
use std::hash::BuildHasher;
use tracing::debug;
use url::Url;

/// Knowledge base namespace holding one baseline per origin
const NAMESPACE: &str = "404";

/// Relative body length difference still considered the same page
const LENGTH_TOLERANCE: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct Baseline {
    status: u16,
    length: usize,
}

/// Fetch a random missing page of the target's origin and store it as the
/// baseline; origins that already have one are skipped
pub async fn learn(transport: &dyn Transport, kb: &KnowledgeBase, target: &Url) -> Result<()> {
    let origin = target.origin().ascii_serialization();
    if kb.get(NAMESPACE, &origin).is_some() {
        return Ok(());
    }

    let token = RandomState::new().hash_one(target.as_str());
    let probe = target
        .join(&format!("/{:016x}.html", token))
        .map_err(|e| Error::InvalidUrl(e.to_string()))?;
    let response = transport.get(&probe).await?;

    let baseline = Baseline {
        status: response.status,
        length: response.body.len(),
    };
    debug!(
        "404 baseline for {}: status {}, {} bytes",
        origin, baseline.status, baseline.length
    );
    kb.save(NAMESPACE, &origin, serde_json::to_value(baseline)?);
    Ok(())
}

/// Whether the response is a "not found" page
pub fn is_404(kb: &KnowledgeBase, response: &HttpResponse) -> bool {
    if response.status == 404 {
        return true;
    }
    let origin = response.url.origin().ascii_serialization();
    let Some(baseline) = kb
        .get(NAMESPACE, &origin)
        .and_then(|value| serde_json::from_value::<Baseline>(value).ok())
    else {
        return false;
    };
    if baseline.status != response.status {
        return false;
    }
    let longest = baseline.length.max(response.body.len()).max(1) as f64;
    let difference = baseline.length.abs_diff(response.body.len()) as f64;
    difference / longest <= LENGTH_TOLERANCE
}
