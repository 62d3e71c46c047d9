pub mod config;
pub mod errors;
pub mod memory;
pub mod models;
pub mod traits;

pub use errors::*;
pub use models::{
    AttributeValue, Attributes, Candidate, Command, Event, EventKind, OrderRequest,
    ProviderEntry, ProviderStatus, RendezvousStep,
};
pub use traits::{Channel, Payload, SelectionStrategy};
