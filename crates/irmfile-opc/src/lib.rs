//! OPC (ZIP) container access and `docProps/custom.xml` editing.
//!
//! Office documents carry their sensitivity labels as custom properties in
//! the `docProps/custom.xml` part. This crate reads and rewrites that part
//! without disturbing the rest of the package: [`ZipApi`] copies every other
//! entry raw, and [`CustomPropertiesDoc`] preserves surviving properties'
//! pids and order.

mod custom_properties;
mod error;
mod zip_api;

pub use custom_properties::{CustomPropertiesDoc, CustomProperty};
pub use error::OpcError;
pub use zip_api::ZipApi;

/// The OPC part holding user-visible custom properties.
pub const CUSTOM_PROPERTIES_PART: &str = "docProps/custom.xml";
