use irmfile_opc::CustomProperty;

/// Prefix of the custom properties that carry a sensitivity label.
///
/// Labels are stored as `MSIP_Label_<label-id>_<attribute>` properties; the
/// label id is a GUID (no underscores), so the attribute is everything past
/// the third underscore-delimited segment.
pub const LABEL_PROPERTY_PREFIX: &str = "MSIP_Label_";

/// A protection label read from (or destined for) a document's property set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTag {
    pub label_id: String,
    /// Attribute name/value pairs in document order (e.g. `Enabled`,
    /// `Owner`, `SetDate`).
    pub attributes: Vec<(String, String)>,
}

impl FileTag {
    pub fn new(label_id: impl Into<String>) -> Self {
        Self {
            label_id: label_id.into(),
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Group label properties into tags, preserving first-seen label order.
pub fn tags_from_properties(properties: &[CustomProperty]) -> Vec<FileTag> {
    let mut tags: Vec<FileTag> = Vec::new();
    for property in properties {
        let Some(rest) = property.name.strip_prefix(LABEL_PROPERTY_PREFIX) else {
            continue;
        };
        let Some((label_id, attribute)) = rest.split_once('_') else {
            continue;
        };
        if label_id.is_empty() || attribute.is_empty() {
            continue;
        }
        let idx = match tags.iter().position(|t| t.label_id == label_id) {
            Some(idx) => idx,
            None => {
                tags.push(FileTag::new(label_id));
                tags.len() - 1
            }
        };
        tags[idx]
            .attributes
            .push((attribute.to_string(), property.value.clone()));
    }
    tags
}

/// Flatten tags back into the property names they are stored under.
pub fn properties_from_tags(tags: &[FileTag]) -> Vec<CustomProperty> {
    let mut properties = Vec::new();
    for tag in tags {
        for (attribute, value) in &tag.attributes {
            properties.push(CustomProperty::new(
                format!("{LABEL_PROPERTY_PREFIX}{}_{attribute}", tag.label_id),
                value.clone(),
            ));
        }
    }
    properties
}
