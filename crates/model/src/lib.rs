//! Entity types for the network addressing service's data model (spec.md
//! §3), grounded on `carbide-api-model`'s resource structs: plain serde
//! data types with a `validate`/constructor surface rather than an ORM.

pub mod aggregation;
pub mod etag;
pub mod fabric;
pub mod ip_record;
pub mod network;
pub mod nic;
pub mod nic_tag;

pub use aggregation::{Aggregation, LacpMode};
pub use etag::Etag;
pub use fabric::{FabricVlan, Vpc};
pub use ip_record::IpRecord;
pub use network::{Network, NetworkPool};
pub use nic::{AntiSpoof, Nic, NicState};
pub use nic_tag::NicTag;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("{0}")]
    Invalid(String),
}
