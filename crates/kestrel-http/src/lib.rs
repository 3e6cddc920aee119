//! Declarative, transport-agnostic HTTP endpoint registry. This crate
//! knows nothing about axum, hyper, or any wire format — it is a table
//! of facts an adapter projects onto whatever transport it speaks.

pub mod registry;

pub use registry::{HttpEndpointDeclaration, HttpMethod, HttpRegistryError, HttpRegistry};
