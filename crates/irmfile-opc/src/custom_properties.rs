use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::OpcError;

const CUSTOM_PROPERTIES_NS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/custom-properties";
const VTYPES_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes";
const PROPERTY_FMTID: &str = "{D5CDD505-2E9C-101B-9397-08002B2CF9AE}";

/// A named custom property as seen by callers. Integer (`vt:i4`) values are
/// rendered as their decimal string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomProperty {
    pub name: String,
    pub value: String,
}

impl CustomProperty {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Lpwstr,
    I4,
}

#[derive(Debug, Clone)]
struct Entry {
    pid: u32,
    name: String,
    value: String,
    kind: ValueKind,
}

/// The `docProps/custom.xml` property set.
///
/// The parser is lenient: `<property>` elements with the wrong name, a value
/// child outside the `vt:` namespace prefix, or an unrecognized value type
/// are skipped without error. The serializer emits one canonical form with no
/// inter-element whitespace; surviving properties keep their original `pid`.
#[derive(Debug, Clone, Default)]
pub struct CustomPropertiesDoc {
    entries: Vec<Entry>,
}

/// Raw value capture while scanning a property's children.
struct PendingValue {
    kind: ValueKind,
    text: String,
}

struct PendingProperty {
    pid: u32,
    name: String,
    value: Option<PendingValue>,
}

fn local_name(e: &BytesStart<'_>) -> Vec<u8> {
    e.name().local_name().as_ref().to_vec()
}

fn prefix_is_vt(e: &BytesStart<'_>) -> bool {
    e.name()
        .prefix()
        .map(|p| p.as_ref() == b"vt")
        .unwrap_or(false)
}

fn parse_property_attrs(
    e: &BytesStart<'_>,
    reader: &Reader<&[u8]>,
) -> Result<Option<(u32, String)>, OpcError> {
    let mut pid: Option<u32> = None;
    let mut name: Option<String> = None;
    for attr in e.attributes() {
        let attr = attr.map_err(|_| OpcError::InvalidDocument {
            context: "invalid attribute",
        })?;
        let value = attr
            .decode_and_unescape_value(reader)
            .map_err(|_| OpcError::InvalidDocument {
                context: "invalid attribute encoding",
            })?;
        match attr.key.as_ref() {
            b"pid" => pid = value.parse::<u32>().ok(),
            b"name" => name = Some(value.into_owned()),
            _ => {}
        }
    }
    Ok(match (pid, name) {
        (Some(pid), Some(name)) => Some((pid, name)),
        // A property without pid/name cannot round-trip; skip it.
        _ => None,
    })
}

impl CustomPropertiesDoc {
    /// Parse a custom-properties part. Structural XML errors fail the whole
    /// document; malformed individual properties are skipped.
    pub fn parse(xml: &str) -> Result<Self, OpcError> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);
        let mut buf = Vec::new();

        let mut entries = Vec::new();
        let mut depth = 0usize;
        let mut pending: Option<PendingProperty> = None;
        let mut in_value = false;

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => {
                    depth += 1;
                    if depth == 2 {
                        pending = if local_name(&e) == b"property" {
                            let attrs = parse_property_attrs(&e, &reader)?;
                            if attrs.is_none() {
                                log::debug!("skipping property without pid/name");
                            }
                            attrs.map(|(pid, name)| PendingProperty {
                                pid,
                                name,
                                value: None,
                            })
                        } else {
                            None
                        };
                    } else if depth == 3 && !in_value {
                        if let Some(p) = pending.as_mut() {
                            if p.value.is_none() && prefix_is_vt(&e) {
                                let kind = match local_name(&e).as_slice() {
                                    b"lpwstr" => Some(ValueKind::Lpwstr),
                                    b"i4" => Some(ValueKind::I4),
                                    _ => None,
                                };
                                if let Some(kind) = kind {
                                    p.value = Some(PendingValue {
                                        kind,
                                        text: String::new(),
                                    });
                                    in_value = true;
                                }
                            }
                        }
                    }
                }
                Event::Empty(e) => {
                    if depth == 2 {
                        if let Some(p) = pending.as_mut() {
                            if p.value.is_none() && prefix_is_vt(&e) {
                                if local_name(&e) == b"lpwstr" {
                                    p.value = Some(PendingValue {
                                        kind: ValueKind::Lpwstr,
                                        text: String::new(),
                                    });
                                }
                                // An empty <vt:i4/> has no parseable value.
                            }
                        }
                    }
                }
                Event::Text(t) => {
                    if in_value && depth == 3 {
                        if let Some(v) = pending.as_mut().and_then(|p| p.value.as_mut()) {
                            v.text.push_str(&t.unescape().map_err(OpcError::CorruptXml)?);
                        }
                    }
                }
                Event::End(_) => {
                    if depth == 3 && in_value {
                        in_value = false;
                    } else if depth == 2 {
                        if let Some(p) = pending.take() {
                            if let Some(entry) = finalize_property(p) {
                                entries.push(entry);
                            }
                        }
                    }
                    depth = depth.saturating_sub(1);
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(Self { entries })
    }

    /// The recognized properties, in document order.
    pub fn properties(&self) -> Vec<CustomProperty> {
        self.entries
            .iter()
            .map(|e| CustomProperty::new(e.name.clone(), e.value.clone()))
            .collect()
    }

    /// Apply a batch edit: drop every property whose name is in `removals`
    /// (missing or repeated names are no-ops), then append `additions` in
    /// order, assigning pids after the highest surviving one.
    pub fn update_properties(
        &mut self,
        additions: &[CustomProperty],
        removals: &[impl AsRef<str>],
    ) {
        self.entries
            .retain(|e| !removals.iter().any(|r| r.as_ref() == e.name));

        let mut next_pid = self
            .entries
            .iter()
            .map(|e| e.pid)
            .max()
            .unwrap_or(1)
            .max(1)
            + 1;
        for add in additions {
            self.entries.push(Entry {
                pid: next_pid,
                name: add.name.clone(),
                value: add.value.clone(),
                kind: ValueKind::Lpwstr,
            });
            next_pid += 1;
        }
    }

    /// Canonical serialization: UTF-8 header, fixed namespace declarations,
    /// no inter-element whitespace.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        out.push_str(r#"<?xml version="1.0" encoding="utf-8" standalone="yes"?>"#);
        if self.entries.is_empty() {
            out.push_str(&format!(
                r#"<Properties xmlns="{CUSTOM_PROPERTIES_NS}" xmlns:vt="{VTYPES_NS}"/>"#
            ));
            return out;
        }
        out.push_str(&format!(
            r#"<Properties xmlns="{CUSTOM_PROPERTIES_NS}" xmlns:vt="{VTYPES_NS}">"#
        ));
        for entry in &self.entries {
            let tag = match entry.kind {
                ValueKind::Lpwstr => "vt:lpwstr",
                ValueKind::I4 => "vt:i4",
            };
            out.push_str(&format!(
                r#"<property fmtid="{PROPERTY_FMTID}" pid="{}" name="{}"><{tag}>{}</{tag}></property>"#,
                entry.pid,
                escape_xml(&entry.name),
                escape_xml(&entry.value),
            ));
        }
        out.push_str("</Properties>");
        out
    }
}

fn finalize_property(p: PendingProperty) -> Option<Entry> {
    let value = p.value?;
    match value.kind {
        ValueKind::Lpwstr => Some(Entry {
            pid: p.pid,
            name: p.name,
            value: value.text,
            kind: ValueKind::Lpwstr,
        }),
        ValueKind::I4 => {
            // Render the parsed value so "+2" and " 2 " normalize to "2".
            let parsed = value.text.trim().parse::<i32>().ok()?;
            Some(Entry {
                pid: p.pid,
                name: p.name,
                value: parsed.to_string(),
                kind: ValueKind::I4,
            })
        }
    }
}

fn escape_xml(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
