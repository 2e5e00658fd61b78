//! File-API layer: maps file extensions to their container family and reads
//! or writes protection label tags through the format's label store.

mod error;
mod format;
mod tags;

pub use error::FileError;
pub use format::{FileFormat, FormatKind};
pub use tags::{
    properties_from_tags, tags_from_properties, FileTag, LABEL_PROPERTY_PREFIX,
};
