//! Custom Resource Definitions for the Etcd custodian
//!
//! This module defines the Etcd CRD whose status the custodian maintains.

mod etcd;
pub mod types;


pub use etcd::{Etcd, EtcdSpec, EtcdStatus};
pub use types::*;
