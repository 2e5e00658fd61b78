use irmfile_opc::{CustomPropertiesDoc, OpcError, ZipApi, CUSTOM_PROPERTIES_PART};
use irmfile_pdf::{WrapperDoc, PDF_PROTECTOR_WRAPPER_SUBTYPE};

use crate::error::FileError;
use crate::tags::{properties_from_tags, tags_from_properties, FileTag, LABEL_PROPERTY_PREFIX};

/// OPC (ZIP-based Office) extensions handled by the custom-properties label
/// store.
const OPC_EXTENSIONS: &[&str] = &[
    "docx", "docm", "dotx", "dotm", "xlsx", "xlsm", "xltx", "xltm", "pptx", "pptm", "potx",
    "potm", "ppsx", "ppsm", "vsdx", "vsdm",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatKind {
    Pdf,
    OpcZip,
    Generic,
}

impl FormatKind {
    /// Map a file extension (with or without the leading dot) to its
    /// container family.
    pub fn detect(extension: &str) -> FormatKind {
        let ext = extension.trim_start_matches('.').to_ascii_lowercase();
        if ext == "pdf" {
            FormatKind::Pdf
        } else if OPC_EXTENSIONS.contains(&ext.as_str()) {
            FormatKind::OpcZip
        } else {
            FormatKind::Generic
        }
    }
}

/// A file plus the format-specific reader for its protection tags.
///
/// Tags are read lazily, once, on the first [`get_tags`](Self::get_tags)
/// call; [`set_tags`](Self::set_tags) replaces the cache directly.
pub struct FileFormat {
    kind: FormatKind,
    file: Vec<u8>,
    tags: Option<Vec<FileTag>>,
}

impl FileFormat {
    pub fn new(file: Vec<u8>, extension: &str) -> Self {
        Self {
            kind: FormatKind::detect(extension),
            file,
            tags: None,
        }
    }

    pub fn kind(&self) -> FormatKind {
        self.kind
    }

    pub fn file_bytes(&self) -> &[u8] {
        &self.file
    }

    /// The file's protection tags, computed on first request.
    pub fn get_tags(&mut self) -> Result<&[FileTag], FileError> {
        if self.tags.is_none() {
            self.tags = Some(self.read_tags()?);
        }
        Ok(self.tags.as_deref().expect("tags just cached"))
    }

    pub fn set_tags(&mut self, tags: Vec<FileTag>) {
        self.tags = Some(tags);
    }

    /// Whether the file is a rights-protected container.
    pub fn is_protected(&self) -> bool {
        match self.kind {
            FormatKind::Pdf => {
                WrapperDoc::parse(&self.file).is_valid_protected(PDF_PROTECTOR_WRAPPER_SUBTYPE)
            }
            FormatKind::OpcZip | FormatKind::Generic => false,
        }
    }

    /// Persist the cached tags into the container and return the rewritten
    /// file. Formats without a label store reject the call.
    pub fn write_tags(&mut self) -> Result<Vec<u8>, FileError> {
        let tags = match &self.tags {
            Some(tags) => tags.clone(),
            None => return Err(FileError::InvalidArgument {
                context: "no tags to write; call set_tags first",
            }),
        };
        match self.kind {
            FormatKind::OpcZip => {
                let api = ZipApi::new();
                let mut doc = match api.get_entry(&self.file, CUSTOM_PROPERTIES_PART) {
                    Ok(xml) => {
                        let xml = String::from_utf8(xml).map_err(|_| {
                            FileError::Opc(OpcError::InvalidDocument {
                                context: "custom properties part is not UTF-8",
                            })
                        })?;
                        CustomPropertiesDoc::parse(&xml)?
                    }
                    Err(OpcError::EntryNotFound { .. }) => CustomPropertiesDoc::default(),
                    Err(err) => return Err(err.into()),
                };

                // Replace every existing label property with the new set.
                let removals: Vec<String> = doc
                    .properties()
                    .iter()
                    .filter(|p| p.name.starts_with(LABEL_PROPERTY_PREFIX))
                    .map(|p| p.name.clone())
                    .collect();
                doc.update_properties(&properties_from_tags(&tags), &removals);

                let rewritten =
                    api.set_entry(&self.file, CUSTOM_PROPERTIES_PART, doc.serialize().as_bytes())?;
                self.file = rewritten.clone();
                Ok(rewritten)
            }
            FormatKind::Pdf | FormatKind::Generic => Err(FileError::InvalidArgument {
                context: "format has no label store",
            }),
        }
    }

    fn read_tags(&self) -> Result<Vec<FileTag>, FileError> {
        match self.kind {
            FormatKind::OpcZip => {
                let api = ZipApi::new();
                match api.get_entry(&self.file, CUSTOM_PROPERTIES_PART) {
                    Ok(xml) => {
                        let xml = String::from_utf8(xml).map_err(|_| {
                            FileError::Opc(OpcError::InvalidDocument {
                                context: "custom properties part is not UTF-8",
                            })
                        })?;
                        let doc = CustomPropertiesDoc::parse(&xml)?;
                        Ok(tags_from_properties(&doc.properties()))
                    }
                    // An unlabeled document simply has no custom part.
                    Err(OpcError::EntryNotFound { .. }) => {
                        log::debug!("no custom properties part; document is unlabeled");
                        Ok(Vec::new())
                    }
                    Err(err) => Err(err.into()),
                }
            }
            FormatKind::Pdf | FormatKind::Generic => Ok(Vec::new()),
        }
    }
}
