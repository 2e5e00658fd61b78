//! The IRM "unencrypted wrapper": an outer, plaintext PDF whose embedded
//! file payload is the encrypted inner document.
//!
//! [`WrapperCreator`] appends an incremental-update section to a wrapper
//! template (the page users without an IRM-aware viewer will see), attaching
//! the payload as an embedded file tagged with an `/EP` (encrypted payload)
//! dictionary. [`WrapperDoc`] is the matching reader. The writer emits one
//! canonical form; the reader is a tolerant byte scanner so that damaged or
//! foreign documents classify as unprotected instead of erroring.

use std::io::Write;

use crate::error::PdfError;
use crate::object_model::ensure_module_initialized;

pub const PDF_PROTECTOR_FILTER_NAME: &str = "MicrosoftIRMServices";
pub const PDF_PROTECTOR_WRAPPER_SUBTYPE: &str = "MicrosoftIRMServices";
pub const PDF_PROTECTOR_WRAPPER_FILENAME: &str = "MicrosoftIRMServices";
pub const PDF_PROTECTOR_WRAPPER_DES: &str =
    "This embedded file is encrypted using MicrosoftIRMServices filter";
pub const PDF_PROTECTOR_WRAPPER_VERSION: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapperType {
    Unknown,
    Irm1,
    Irm2,
}

// ---------------------------------------------------------------------------
// Byte scanning
// ---------------------------------------------------------------------------

fn is_pdf_ws(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'\x0C' | b'\0')
}

fn is_name_delim(b: u8) -> bool {
    is_pdf_ws(b) || matches!(b, b'/' | b'<' | b'>' | b'[' | b']' | b'(' | b')' | b'%')
}

fn find(bytes: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= bytes.len() {
        return None;
    }
    bytes[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

fn rfind(bytes: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > bytes.len() {
        return None;
    }
    (0..=bytes.len() - needle.len()).rev().find(|&i| &bytes[i..i + needle.len()] == needle)
}

fn skip_ws(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && is_pdf_ws(bytes[pos]) {
        pos += 1;
    }
    pos
}

/// Position just past `key` for the first occurrence followed by a delimiter.
fn find_key(dict: &[u8], key: &[u8], from: usize) -> Option<usize> {
    let mut at = from;
    while let Some(pos) = find(dict, key, at) {
        let end = pos + key.len();
        if end >= dict.len() || is_name_delim(dict[end]) {
            return Some(end);
        }
        at = pos + 1;
    }
    None
}

/// Parse a `/Name` value at `pos` (after whitespace), returning the bare name.
fn parse_name(dict: &[u8], pos: usize) -> Option<String> {
    let pos = skip_ws(dict, pos);
    if dict.get(pos) != Some(&b'/') {
        return None;
    }
    let start = pos + 1;
    let mut end = start;
    while end < dict.len() && !is_name_delim(dict[end]) {
        end += 1;
    }
    std::str::from_utf8(&dict[start..end]).ok().map(str::to_string)
}

/// Parse an unsigned decimal (with optional fraction) at `pos`.
fn parse_number(dict: &[u8], pos: usize) -> Option<(f64, usize)> {
    let start = skip_ws(dict, pos);
    let mut end = start;
    while end < dict.len() && (dict[end].is_ascii_digit() || dict[end] == b'.') {
        end += 1;
    }
    if end == start {
        return None;
    }
    std::str::from_utf8(&dict[start..end])
        .ok()?
        .parse::<f64>()
        .ok()
        .map(|n| (n, end))
}

fn name_after_key(dict: &[u8], key: &[u8]) -> Option<String> {
    parse_name(dict, find_key(dict, key, 0)?)
}

fn number_after_key(dict: &[u8], key: &[u8]) -> Option<f64> {
    parse_number(dict, find_key(dict, key, 0)?).map(|(n, _)| n)
}

/// Parse a direct integer after `key`, rejecting indirect references
/// (`N G R`).
fn direct_int_after_key(dict: &[u8], key: &[u8]) -> Option<u64> {
    let (value, end) = parse_number(dict, find_key(dict, key, 0)?)?;
    let after = skip_ws(dict, end);
    if let Some((_, gen_end)) = parse_number(dict, after) {
        let after_gen = skip_ws(dict, gen_end);
        if dict.get(after_gen) == Some(&b'R') {
            return None;
        }
    }
    Some(value as u64)
}

/// Parse `N G R` after `key`, returning the object number.
fn ref_after_key(dict: &[u8], key: &[u8]) -> Option<u32> {
    let (num, end) = parse_number(dict, find_key(dict, key, 0)?)?;
    let (_, gen_end) = parse_number(dict, skip_ws(dict, end))?;
    let after = skip_ws(dict, gen_end);
    if dict.get(after) == Some(&b'R') {
        Some(num as u32)
    } else {
        None
    }
}

/// Extent of the dictionary opening at `open` (which must point at `<<`),
/// inclusive of the delimiters.
fn balanced_dict(bytes: &[u8], open: usize) -> Option<std::ops::Range<usize>> {
    if bytes.get(open..open + 2) != Some(b"<<".as_slice()) {
        return None;
    }
    let mut depth = 0usize;
    let mut i = open;
    while i + 1 < bytes.len() {
        match &bytes[i..i + 2] {
            b"<<" => {
                depth += 1;
                i += 2;
            }
            b">>" => {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    return Some(open..i);
                }
            }
            _ => i += 1,
        }
    }
    None
}

/// Opening `<<` of the innermost dictionary containing `pos`.
fn enclosing_dict_start(bytes: &[u8], pos: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = pos;
    while i >= 1 {
        match &bytes[i - 1..=i] {
            b">>" => {
                depth += 1;
                i -= 2;
            }
            b"<<" => {
                if depth == 0 {
                    return Some(i - 1);
                }
                depth -= 1;
                i -= 2;
            }
            _ => i -= 1,
        }
    }
    None
}

fn escape_pdf_string(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            _ => out.push(c),
        }
    }
    out
}

fn format_pdf_number(value: f32) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Parsed view of a (possibly) wrapped document.
pub struct WrapperDoc {
    wrapper_type: WrapperType,
    graphic_filter: String,
    version: f32,
    payload: Vec<u8>,
}

impl WrapperDoc {
    /// Scan `bytes` for the IRM embedded-file object. Anything that does not
    /// carry one — including non-PDF input — parses as
    /// [`WrapperType::Unknown`] with an empty payload; classification into a
    /// hard failure belongs to the caller.
    pub fn parse(bytes: &[u8]) -> Self {
        ensure_module_initialized();

        let unknown = Self {
            wrapper_type: WrapperType::Unknown,
            graphic_filter: String::new(),
            version: 0.0,
            payload: Vec::new(),
        };

        if !bytes.starts_with(b"%PDF-") {
            return unknown;
        }

        let mut at = 0usize;
        while let Some(pos) = find(bytes, b"/EmbeddedFile", at) {
            at = pos + 1;
            let Some(parsed) = Self::parse_candidate(bytes, pos) else {
                continue;
            };
            return parsed;
        }
        unknown
    }

    fn parse_candidate(bytes: &[u8], marker: usize) -> Option<Self> {
        let open = enclosing_dict_start(bytes, marker)?;
        let range = balanced_dict(bytes, open)?;
        let dict = &bytes[range.clone()];

        let subtype = name_after_key(dict, b"/Subtype")?;
        let length = direct_int_after_key(dict, b"/Length")? as usize;

        let ep_key = find_key(dict, b"/EP", 0)?;
        let ep_open = skip_ws(dict, ep_key);
        let ep_range = balanced_dict(dict, ep_open)?;
        let ep = &dict[ep_range];
        let version = number_after_key(ep, b"/Version")
            .or_else(|| number_after_key(ep, b"/V"))? as f32;
        let wrapper_type = match version as u32 {
            1 => WrapperType::Irm1,
            2 => WrapperType::Irm2,
            _ => return None,
        };

        // Payload bytes follow the dictionary's `stream` keyword.
        let stream_kw = find(bytes, b"stream", range.end)?;
        if skip_ws(bytes, range.end) != stream_kw {
            return None;
        }
        let mut data_start = stream_kw + b"stream".len();
        if bytes.get(data_start) == Some(&b'\r') {
            data_start += 1;
        }
        if bytes.get(data_start) == Some(&b'\n') {
            data_start += 1;
        }
        if data_start + length > bytes.len() {
            return None;
        }
        let payload = bytes[data_start..data_start + length].to_vec();

        Some(Self {
            wrapper_type,
            graphic_filter: subtype,
            version,
            payload,
        })
    }

    pub fn wrapper_type(&self) -> WrapperType {
        self.wrapper_type
    }

    pub fn payload_size(&self) -> u64 {
        self.payload.len() as u64
    }

    /// The embedded file's subtype name and wrapper version.
    pub fn cryptographic_filter(&self) -> (&str, f32) {
        (&self.graphic_filter, self.version)
    }

    /// The wrapper tuple the protector validates before unprotecting.
    pub fn is_valid_protected(&self, expected_subtype: &str) -> bool {
        matches!(self.wrapper_type, WrapperType::Irm1 | WrapperType::Irm2)
            && self.payload_size() > 0
            && self.graphic_filter == expected_subtype
    }

    /// Stream the payload into `out`.
    pub fn start_get_payload(&self, out: &mut dyn Write) -> Result<(), PdfError> {
        out.write_all(&self.payload)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

struct PayloadInfo {
    subtype: String,
    file_name: String,
    description: String,
    version: f32,
}

/// Builds the outer wrapper by appending an incremental-update section to a
/// template PDF. The template must use a classic xref table with a `trailer`
/// dictionary; its visible pages are untouched.
pub struct WrapperCreator {
    template: Vec<u8>,
    info: Option<PayloadInfo>,
    payload: Option<Vec<u8>>,
}

impl WrapperCreator {
    pub fn new(template: Vec<u8>) -> Self {
        ensure_module_initialized();
        Self {
            template,
            info: None,
            payload: None,
        }
    }

    pub fn set_payload_info(
        &mut self,
        subtype: &str,
        file_name: &str,
        description: &str,
        version: f32,
    ) {
        self.info = Some(PayloadInfo {
            subtype: subtype.to_string(),
            file_name: file_name.to_string(),
            description: description.to_string(),
            version,
        });
    }

    pub fn set_payload(&mut self, bytes: Vec<u8>) {
        self.payload = Some(bytes);
    }

    pub fn write_to(&self) -> Result<Vec<u8>, PdfError> {
        let info = self.info.as_ref().ok_or(PdfError::InvalidArgument {
            context: "payload info not set",
        })?;
        let payload = self.payload.as_ref().ok_or(PdfError::InvalidArgument {
            context: "payload not set",
        })?;
        let template = &self.template;

        if !template.starts_with(b"%PDF-") {
            return Err(PdfError::InvalidArgument {
                context: "wrapper template is not a PDF",
            });
        }

        // Last trailer dictionary: object count and catalog reference.
        let trailer_kw = rfind(template, b"trailer").ok_or(PdfError::InvalidArgument {
            context: "wrapper template has no classic trailer",
        })?;
        let trailer_open = skip_ws(template, trailer_kw + b"trailer".len());
        let trailer_range =
            balanced_dict(template, trailer_open).ok_or(PdfError::InvalidArgument {
                context: "wrapper template trailer is malformed",
            })?;
        let trailer = &template[trailer_range];
        let size = direct_int_after_key(trailer, b"/Size").ok_or(PdfError::InvalidArgument {
            context: "wrapper template trailer has no /Size",
        })? as u32;
        let root = ref_after_key(trailer, b"/Root").ok_or(PdfError::InvalidArgument {
            context: "wrapper template trailer has no /Root",
        })?;

        // Offset of the template's last xref section, for /Prev.
        let startxref_kw = rfind(template, b"startxref").ok_or(PdfError::InvalidArgument {
            context: "wrapper template has no startxref",
        })?;
        let (prev_xref, _) = parse_number(template, startxref_kw + b"startxref".len()).ok_or(
            PdfError::InvalidArgument {
                context: "wrapper template startxref is malformed",
            },
        )?;

        // The template's catalog dictionary, to be re-emitted with the
        // embedded-file name tree and collection view added.
        let catalog_range = find_object_dict(template, root).ok_or(PdfError::InvalidArgument {
            context: "wrapper template catalog not found",
        })?;
        let catalog_src = &template[catalog_range];
        let catalog_body = std::str::from_utf8(&catalog_src[..catalog_src.len() - 2])
            .map_err(|_| PdfError::InvalidArgument {
                context: "wrapper template catalog is not ASCII",
            })?
            .trim_end();

        let ef_num = size;
        let fs_num = size + 1;
        let file_name = escape_pdf_string(&info.file_name);
        let description = escape_pdf_string(&info.description);
        let version = format_pdf_number(info.version);

        let mut out = template.clone();
        if out.last() != Some(&b'\n') {
            out.push(b'\n');
        }

        // Embedded file stream object.
        let ef_offset = out.len();
        out.extend_from_slice(
            format!(
                "{ef_num} 0 obj\n<< /Type /EmbeddedFile /Subtype /{subtype} /Length {len} \
                 /Params << /Size {len} >> \
                 /EP << /Type /EncryptedPayload /Subtype /{subtype} /Version {version} >> >>\nstream\n",
                subtype = info.subtype,
                len = payload.len(),
            )
            .as_bytes(),
        );
        out.extend_from_slice(payload);
        out.extend_from_slice(b"\nendstream\nendobj\n");

        // File specification.
        let fs_offset = out.len();
        out.extend_from_slice(
            format!(
                "{fs_num} 0 obj\n<< /Type /Filespec /F ({file_name}) /UF ({file_name}) \
                 /Desc ({description}) /AFRelationship /EncryptedPayload \
                 /EF << /F {ef_num} 0 R >> >>\nendobj\n"
            )
            .as_bytes(),
        );

        // Updated catalog (same object number, superseding the template's).
        let cat_offset = out.len();
        out.extend_from_slice(
            format!(
                "{root} 0 obj\n{catalog_body} \
                 /Names << /EmbeddedFiles << /Names [({file_name}) {fs_num} 0 R] >> >> \
                 /Collection << /Type /Collection /D ({file_name}) /View /H >> >>\nendobj\n"
            )
            .as_bytes(),
        );

        // Cross-reference section for the update.
        let xref_offset = out.len();
        out.extend_from_slice(b"xref\n");
        out.extend_from_slice(format!("{root} 1\n").as_bytes());
        out.extend_from_slice(format!("{cat_offset:010} 00000 n\r\n").as_bytes());
        out.extend_from_slice(format!("{ef_num} 2\n").as_bytes());
        out.extend_from_slice(format!("{ef_offset:010} 00000 n\r\n").as_bytes());
        out.extend_from_slice(format!("{fs_offset:010} 00000 n\r\n").as_bytes());
        out.extend_from_slice(
            format!(
                "trailer\n<< /Size {new_size} /Root {root} 0 R /Prev {prev} >>\nstartxref\n{xref_offset}\n%%EOF\n",
                new_size = size + 2,
                prev = prev_xref as u64,
            )
            .as_bytes(),
        );

        Ok(out)
    }
}

/// Extent of the dictionary of object `num` (first `num 0 obj` header whose
/// number is not part of a longer token).
fn find_object_dict(bytes: &[u8], num: u32) -> Option<std::ops::Range<usize>> {
    let header = format!("{num} 0 obj");
    let mut at = 0usize;
    while let Some(pos) = find(bytes, header.as_bytes(), at) {
        at = pos + 1;
        if pos > 0 && bytes[pos - 1].is_ascii_digit() {
            continue;
        }
        let open = skip_ws(bytes, pos + header.len());
        if let Some(range) = balanced_dict(bytes, open) {
            return Some(range);
        }
    }
    None
}
