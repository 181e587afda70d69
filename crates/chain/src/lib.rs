pub mod abi;
pub mod deployment;
pub mod provenance;

pub use abi::{TaskApprovedEvent, decode_task_approved};
pub use provenance::ProvenanceVerifier;
