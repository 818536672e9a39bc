//! Data virtualization: sequence pointers, sidecar indexes, and the
//! read-only virtual sequence list that pages records in on demand.

pub mod list;
pub mod pointer;
pub mod sidecar;

pub use list::VirtualSequenceList;
pub use pointer::SequencePointer;
pub use sidecar::SidecarIndex;
