//! Wires [`KekChain`] into `audit_engine`'s [`SigningKeySource`] (§4.9):
//! the audit chain signs with whatever KEK is active at write time and
//! re-derives with whichever KEK signed a given row at verify time, and
//! never needs to know anything about the envelope hierarchy beyond that.

use crate::kek::KekChain;
use async_trait::async_trait;
use audit_engine::error::{AuditError, Result};
use audit_engine::SigningKeySource;
use std::sync::Arc;
use uuid::Uuid;
use zeroize::Zeroizing;

/// Owns a reference-counted handle to the process-wide [`KekChain`] (§9:
/// chain objects are pinned to a process-scoped runtime value) so it can
/// satisfy `Arc<dyn SigningKeySource>`'s implicit `'static` bound.
pub struct KekChainSigningKeySource {
    kek_chain: Arc<KekChain>,
}

impl KekChainSigningKeySource {
    pub fn new(kek_chain: Arc<KekChain>) -> Self {
        Self { kek_chain }
    }
}

#[async_trait]
impl SigningKeySource for KekChainSigningKeySource {
    async fn active_kek_id(&self) -> Result<Uuid> {
        self.kek_chain.active_kek_id().map_err(|e| AuditError::Validation(e.to_string()))
    }

    async fn kek_material(&self, kek_id: Uuid) -> Result<Zeroizing<[u8; 32]>> {
        let (material, _) = self.kek_chain.material(kek_id).map_err(|e| AuditError::Validation(e.to_string()))?;
        Ok(Zeroizing::new(material))
    }
}
