//! Header frame: `[u32 BE len][UTF-16LE attributes][u32 LE adler32]`.

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};

use adler::adler32_slice;
use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use encoding_rs::{Encoding, GB18030, UTF_16LE, UTF_8};
use log::{debug, info};
use regex::Regex;

use crate::error::{MdictError, Result};
use crate::utils::{decode_string, read_bytes};

/// Which of the two file kinds sharing the layout is being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// Text articles (`.mdx`).
    Text,
    /// Binary resources addressed by path (`.mdd`).
    Resource,
}

/// On-disk format generation; decides the width of every integer field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    V1,
    V2,
}

impl Generation {
    pub fn from_version(version: &str) -> Self {
        if version.starts_with('1') {
            Generation::V1
        } else {
            Generation::V2
        }
    }

    pub fn number_width(self) -> u64 {
        match self {
            Generation::V1 => 4,
            Generation::V2 => 8,
        }
    }

    pub fn read_number<R: Read>(self, reader: &mut R) -> Result<u64> {
        Ok(match self {
            Generation::V1 => reader.read_u32::<BigEndian>()? as u64,
            Generation::V2 => reader.read_u64::<BigEndian>()?,
        })
    }

    /// Width of the first/last key length prefix in the key-block-info table.
    pub(crate) fn read_key_length<R: Read>(self, reader: &mut R) -> Result<u64> {
        Ok(match self {
            Generation::V1 => reader.read_u8()? as u64,
            Generation::V2 => reader.read_u16::<BigEndian>()? as u64,
        })
    }

    /// Terminator units following first/last keys in the key-block-info table.
    pub(crate) fn key_terminator_units(self) -> u64 {
        match self {
            Generation::V1 => 0,
            Generation::V2 => 1,
        }
    }
}

/// The 2-bit `Encrypted` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncryptionFlags(u8);

impl EncryptionFlags {
    pub fn new(bits: u8) -> Self {
        EncryptionFlags(bits & 0x03)
    }

    /// `No` and empty mean clear, `Yes` marks the key-block-info encrypted.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let bits = match raw {
            "" | "No" => 0,
            "Yes" => 0x02,
            _ => raw
                .parse::<u32>()
                .map_err(|_| MdictError::InvalidFormat(format!("bad Encrypted value {:?}", raw)))?
                as u8,
        };
        Ok(EncryptionFlags::new(bits))
    }

    /// The 40-byte key-index size header is Salsa20/8 encrypted.
    pub fn header_encrypted(self) -> bool {
        self.0 & 0x01 != 0
    }

    /// The key-block-info section is nibble-cipher encrypted.
    pub fn index_encrypted(self) -> bool {
        self.0 & 0x02 != 0
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct DictionaryHeader {
    attributes: HashMap<String, String>,
    generation: Generation,
    encoding: &'static Encoding,
    encryption: EncryptionFlags,
    key_index_start: u64,
}

impl DictionaryHeader {
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Resolved encoding of key and article text.
    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    pub fn encryption(&self) -> EncryptionFlags {
        self.encryption
    }

    /// Stream offset right after the header checksum.
    pub fn key_index_start(&self) -> u64 {
        self.key_index_start
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn attributes(&self) -> &HashMap<String, String> {
        &self.attributes
    }

    fn text(&self, name: &str) -> &str {
        self.attribute(name).unwrap_or("")
    }

    pub fn generated_by_engine_version(&self) -> &str {
        self.text("GeneratedByEngineVersion")
    }

    pub fn required_engine_version(&self) -> &str {
        self.text("RequiredEngineVersion")
    }

    pub fn title(&self) -> &str {
        self.text("Title")
    }

    pub fn description(&self) -> &str {
        self.text("Description")
    }

    pub fn stylesheet(&self) -> &str {
        self.text("StyleSheet")
    }

    pub fn creation_date(&self) -> &str {
        self.text("CreationDate")
    }

    pub fn format(&self) -> &str {
        self.text("Format")
    }

    /// Declared encoding name, as written in the file.
    pub fn encoding_name(&self) -> &str {
        self.text("Encoding")
    }

    pub fn encrypted(&self) -> &str {
        self.text("Encrypted")
    }

    pub fn register_by(&self) -> &str {
        self.text("RegisterBy")
    }

    pub fn strip_key(&self) -> bool {
        is_yes(self.text("StripKey"))
    }

    pub fn key_case_sensitive(&self) -> bool {
        is_yes(self.text("KeyCaseSensitive"))
    }

    #[cfg(test)]
    pub(crate) fn bare(
        generation: Generation,
        encoding: &'static Encoding,
        encryption: EncryptionFlags,
    ) -> Self {
        DictionaryHeader {
            attributes: HashMap::new(),
            generation,
            encoding,
            encryption,
            key_index_start: 0,
        }
    }
}

fn is_yes(value: &str) -> bool {
    value == "Yes" || value == "true"
}

/// Map a declared encoding name onto an `encoding_rs` encoding.
pub fn resolve_encoding(name: &str) -> &'static Encoding {
    let name = name.trim();
    if name.is_empty() {
        UTF_8
    } else if name.eq_ignore_ascii_case("GBK") || name.eq_ignore_ascii_case("GB2312") {
        GB18030
    } else if name.eq_ignore_ascii_case("UTF-16") {
        UTF_16LE
    } else {
        Encoding::for_label(name.as_bytes()).unwrap_or(UTF_8)
    }
}

/// Extract `name="value"` pairs, unescaping HTML entities in values.
pub(crate) fn parse_attributes(text: &str) -> HashMap<String, String> {
    let mut attributes = HashMap::new();
    let regex = Regex::new(r#"(?s)(\w+)="(.*?)""#).expect("static attribute pattern");
    for capture in regex.captures_iter(text) {
        let name = capture[1].to_owned();
        let value = html_escape::decode_html_entities(&capture[2]).into_owned();
        attributes.insert(name, value);
    }
    attributes
}

/// Parse the header frame at the start of `source`.
///
/// `encoding_override` replaces the declared encoding for text containers;
/// resource containers always carry UTF-16LE keys and the wide layout.
pub fn parse<R: Read + Seek>(
    source: &mut R,
    kind: ContainerKind,
    encoding_override: Option<&str>,
) -> Result<DictionaryHeader> {
    source.seek(SeekFrom::Start(0))?;
    let header_len = source.read_u32::<BigEndian>()?;
    if header_len == 0 || header_len % 2 != 0 {
        return Err(MdictError::InvalidFormat(format!(
            "header length {} is not a UTF-16 byte count",
            header_len
        )));
    }
    let header_bytes = read_bytes(source, header_len as u64)?;
    let expected = source.read_u32::<LittleEndian>()?;
    let actual = adler32_slice(&header_bytes);
    if expected != actual {
        return Err(MdictError::ChecksumMismatch {
            context: "header",
            expected,
            actual,
        });
    }
    let key_index_start = source.stream_position()?;

    let text = decode_string(UTF_16LE, &header_bytes);
    let attributes = parse_attributes(text.trim_end_matches('\0'));
    debug!("header carries {} attributes", attributes.len());

    let version = attributes
        .get("RequiredEngineVersion")
        .or_else(|| attributes.get("GeneratedByEngineVersion"))
        .map(String::as_str)
        .unwrap_or("");
    let major = version.split('.').next().and_then(|m| m.trim().parse::<u32>().ok());
    if matches!(major, Some(m) if m >= 3) {
        return Err(MdictError::InvalidFormat(format!(
            "unsupported engine version {:?}",
            version
        )));
    }
    let (generation, encoding) = match kind {
        ContainerKind::Resource => (Generation::V2, UTF_16LE),
        ContainerKind::Text => {
            let declared = attributes.get("Encoding").map(String::as_str).unwrap_or("");
            (
                Generation::from_version(version),
                resolve_encoding(encoding_override.unwrap_or(declared)),
            )
        }
    };
    let encryption = EncryptionFlags::parse(
        attributes.get("Encrypted").map(String::as_str).unwrap_or(""),
    )?;

    info!(
        "header parsed: version={:?} generation={:?} encoding={} encrypted={:#04b}",
        version,
        generation,
        encoding.name(),
        encryption.bits()
    );

    Ok(DictionaryHeader {
        attributes,
        generation,
        encoding,
        encryption,
        key_index_start,
    })
}
