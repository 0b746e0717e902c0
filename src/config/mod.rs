//! Static configuration: immutable client settings and the resource descriptor table.

mod client_config;
mod descriptors;

pub use client_config::ClientConfig;
pub use descriptors::{DEFAULT_RESOURCES, DescriptorTable, NestedScope, ResourceDescriptor};
