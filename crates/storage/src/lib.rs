pub mod acl;
pub mod backend;
pub mod error;
mod models;

pub use crate::acl::{AclOutcome, Grant, Grantee, GranteeKind, Permission, PublicClass, is_public};
pub use crate::backend::ObjectStore;
pub use crate::models::{ListOptions, ObjectInfo, ObjectMetadata, Page};
use std::sync::Arc;

pub type StoreHandle = Arc<dyn ObjectStore>;
