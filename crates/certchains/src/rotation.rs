//! Rotation analysis over a whole chain forest.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::chains::CertificateChains;
use crate::error::Result;

/// The certificate that needs replacing first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RotationDeadline {
    pub path: Vec<String>,
    pub rotate_at: DateTime<Utc>,
}

/// Find the certificate, signer or leaf, with the earliest rotation time.
///
/// The first certificate in walk order wins ties. Returns `None` for an empty
/// forest.
pub fn when_to_rotate_at_earliest(chains: &CertificateChains) -> Result<Option<RotationDeadline>> {
    let mut earliest: Option<RotationDeadline> = None;
    chains.walk_chains(&[], |path, info| {
        let rotate_at = info.rotate_at();
        if earliest.as_ref().map_or(true, |e| rotate_at < e.rotate_at) {
            earliest = Some(RotationDeadline {
                path: path.to_vec(),
                rotate_at,
            });
        }
        Ok(())
    })?;

    if let Some(deadline) = &earliest {
        debug!(path = %deadline.path.join("/"), rotate_at = %deadline.rotate_at, "earliest rotation");
    }
    Ok(earliest)
}
