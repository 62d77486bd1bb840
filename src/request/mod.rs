//! Request descriptors.
//!
//! A [`RequestDescriptor`] is validated once, when it is built, and never
//! changes afterwards. Hosts usually build one from a JSON argument map with
//! [`RequestDescriptor::from_arguments`]; Rust callers can use the builder.

mod descriptor;
mod headers;

pub use descriptor::{
    DEFAULT_TIMEOUT_MS, DescriptorError, RequestDefaults, RequestDescriptor,
    RequestDescriptorBuilder,
};
pub use headers::Headers;
