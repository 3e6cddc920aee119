//! Core in-process primitives of the Kestrel kernel: the event bus, the
//! service registry, and the state cache. None of these own any domain
//! logic; they are the fixed vocabulary every module and plugin talks
//! through.

pub mod bus;
pub mod registry;
pub mod state;

pub use bus::{EventBus, EventError, EventHandler};
pub use registry::{RegistryError, ServiceEndpoint, ServiceHandler, ServiceRegistry};
pub use state::StateCache;
