//! MAC allocator (C4): OUI-prefixed randomness with collision retry.
//!
//! Style grounded on `carbide-api`'s test-only
//! `tests/common/mac_address_pool.rs` (`MacAddressPool`/
//! `MacAddressPoolConfig`, panics-on-depletion framing, lazy pool
//! bookkeeping) — but that pool allocates *sequentially* via an
//! `AtomicUsize`, which spec.md §4.4 explicitly does not want here: this
//! allocator draws a fresh random 24 bits on every attempt instead.

use rand::RngCore;

use netreg_network::address::Mac;
use netreg_store::{Precondition, Store, StoreError};
use tracing::warn;

use crate::error::EngineError;
use crate::nic_engine::NIC_BUCKET;

/// Fixed per spec.md §4.4.
pub const MAC_RETRIES: u32 = 50;

/// A 24-bit OUI, e.g. `0x90b8d0`.
#[derive(Debug, Clone, Copy)]
pub struct Oui(pub u32);

impl Oui {
    pub const MASK: u32 = 0x00ff_ffff;

    fn combine(self, rand24: u32) -> u64 {
        (((self.0 & Self::MASK) as u64) << 24) | (rand24 & Self::MASK) as u64
    }
}

fn rand24() -> u32 {
    rand::rng().next_u32() & Oui::MASK
}

/// If the caller supplied a MAC, parse and use it with create-only
/// precondition. Otherwise draw `MAC_RETRIES` random candidates under `oui`
/// until one doesn't collide with an existing NIC record.
pub async fn allocate(
    store: &dyn Store,
    oui: Oui,
    requested: Option<&str>,
) -> Result<(Mac, Precondition), EngineError> {
    if let Some(raw) = requested {
        let mac = Mac::parse(raw).map_err(|e| EngineError::invalid("mac", "INVALID_MAC", e.to_string()))?;
        match store.get(NIC_BUCKET, &mac.as_u64().to_string()).await {
            Ok(_) => return Err(EngineError::DuplicateParameter("mac".into())),
            Err(StoreError::NotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }
        return Ok((mac, Precondition::CreateOnly));
    }

    for attempt in 0..MAC_RETRIES {
        let candidate = Mac::from_u64(oui.combine(rand24())).expect("OUI+rand24 fits in 48 bits");
        match store.get(NIC_BUCKET, &candidate.as_u64().to_string()).await {
            Ok(_) => {
                warn!(attempt, "generated MAC collided, redrawing");
                continue;
            }
            Err(StoreError::NotFound { .. }) => {
                return Ok((candidate, Precondition::CreateOnly));
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(EngineError::InternalError("no more free MAC addresses".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use netreg_store::memory::InMemoryStore;

    #[tokio::test]
    async fn generated_mac_carries_the_oui() {
        let store = InMemoryStore::new();
        let oui = Oui(0x90b8d0);
        let (mac, _) = allocate(&store, oui, None).await.unwrap();
        assert_eq!(mac.as_u64() >> 24, 0x90b8d0);
    }

    #[tokio::test]
    async fn explicit_mac_collision_is_a_duplicate_parameter() {
        let store = InMemoryStore::new();
        store
            .put(
                NIC_BUCKET,
                &Mac::parse("90:b8:d0:17:37:17").unwrap().as_u64().to_string(),
                serde_json::json!({}),
                Precondition::CreateOnly,
            )
            .await
            .unwrap();
        let err = allocate(&store, Oui(0x90b8d0), Some("90:b8:d0:17:37:17"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateParameter(_)));
    }
}
