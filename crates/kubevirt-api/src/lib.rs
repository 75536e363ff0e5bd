//! Typed Rust definitions for the KubeVirt resources a machine driver touches.
//!
//! Covers the subset needed for managing VMs:
//! `VirtualMachine` (kubevirt.io/v1) and `DataVolume` (cdi.kubevirt.io/v1beta1).
//!
//! Only the fields the driver reads or writes are modelled; everything else
//! the API server returns is dropped on deserialization. Writes to existing
//! objects therefore go through patches, never full replacement.

pub mod cdi;
pub mod vm;

pub use cdi::DataVolume;
pub use vm::VirtualMachine;

/// `apiVersion` of KubeVirt core resources.
pub const KUBEVIRT_API_VERSION: &str = "kubevirt.io/v1";

/// `apiVersion` of Containerized Data Importer resources.
pub const CDI_API_VERSION: &str = "cdi.kubevirt.io/v1beta1";
