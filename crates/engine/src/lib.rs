//! The allocation/validation engine (C3-C8): everything that turns a
//! validated request into a batch of store writes.

pub mod error;
pub mod ip_allocator;
pub mod mac_allocator;
pub mod nic_engine;
pub mod pool_intersection;
pub mod subnet_allocator;
pub mod validation;

pub use error::{EngineError, FieldError, UsedBy};
pub use ip_allocator::{Candidate, IpAllocationAttempt, IP_PROVISION_RETRIES};
pub use mac_allocator::{Oui, MAC_RETRIES};
pub use nic_engine::{CreateNicRequest, NicEngine, UpdateNicRequest};
pub use pool_intersection::{PoolFilter, PoolTuple};
pub use subnet_allocator::{available_subnets, SubnetPair, SubnetPairStream, MAX_CANDIDATES};
pub use validation::{ParamSpec, Rule, Validation};
