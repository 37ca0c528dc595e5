// Synthetic container writer shared by the integration tests.
#![allow(dead_code)]

use std::io::Write;

use adler::adler32_slice;
use flate2::write::ZlibEncoder;
use mdict_store::{crypto, ContainerKind, Generation};
use tempfile::NamedTempFile;

pub fn init_logging() {
    env_logger::builder().is_test(true).try_init().ok();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Stored,
    Lzo,
    Deflate,
}

pub struct Container {
    pub generation: Generation,
    pub kind: ContainerKind,
    pub encoding: &'static str,
    /// Key text as written to the file, with its logical offset.
    pub entries: Vec<(String, u64)>,
    pub keys_per_block: usize,
    /// Decompressed content of each record block.
    pub records: Vec<Vec<u8>>,
    pub method: Method,
    pub header_key: Option<Vec<u8>>,
    pub info_encrypted: bool,
}

impl Container {
    pub fn text(generation: Generation, entries: &[(&str, u64)], records: Vec<Vec<u8>>) -> Self {
        Container {
            generation,
            kind: ContainerKind::Text,
            encoding: "UTF-8",
            entries: entries.iter().map(|(k, o)| (k.to_string(), *o)).collect(),
            keys_per_block: 4,
            records,
            method: Method::Stored,
            header_key: None,
            info_encrypted: false,
        }
    }

    pub fn resource(entries: &[(&str, u64)], records: Vec<Vec<u8>>) -> Self {
        Container {
            kind: ContainerKind::Resource,
            encoding: "",
            ..Container::text(Generation::V2, entries, records)
        }
    }

    /// A text container holding `items` as `(key, article)`, `per_block`
    /// articles to a record block. Each article is NUL-terminated.
    pub fn articles(
        generation: Generation,
        encoding: &'static str,
        items: &[(&str, &str)],
        per_block: usize,
    ) -> Self {
        let mut container = Container::text(generation, &[], Vec::new());
        container.encoding = encoding;
        let mut offset = 0;
        for chunk in items.chunks(per_block) {
            let mut block = Vec::new();
            for (key, article) in chunk {
                container.entries.push((key.to_string(), offset));
                let mut bytes = container.encode(article);
                bytes.extend(vec![0u8; container.unit()]);
                offset += bytes.len() as u64;
                block.extend(bytes);
            }
            container.records.push(block);
        }
        container
    }

    pub fn wide(&self) -> bool {
        self.kind == ContainerKind::Resource || self.encoding.eq_ignore_ascii_case("UTF-16")
    }

    fn unit(&self) -> usize {
        if self.wide() {
            2
        } else {
            1
        }
    }

    pub fn encode(&self, s: &str) -> Vec<u8> {
        if self.wide() {
            utf16(s)
        } else {
            s.as_bytes().to_vec()
        }
    }

    fn number(&self, value: u64) -> Vec<u8> {
        match self.generation {
            Generation::V1 => (value as u32).to_be_bytes().to_vec(),
            Generation::V2 => value.to_be_bytes().to_vec(),
        }
    }

    fn header_text(&self) -> String {
        let version = match self.generation {
            Generation::V1 => "1.2",
            Generation::V2 => "2.0",
        };
        let mut encrypted = 0;
        if self.header_key.is_some() {
            encrypted |= 1;
        }
        if self.info_encrypted {
            encrypted |= 2;
        }
        let tag = match self.kind {
            ContainerKind::Text => "Dictionary",
            ContainerKind::Resource => "Library_Data",
        };
        format!(
            r#"<{} GeneratedByEngineVersion="{}" RequiredEngineVersion="{}" Encrypted="{}" Encoding="{}" Format="Html" KeyCaseSensitive="No" Title="Synthetic &amp; Small" Description="&lt;b&gt;test&lt;/b&gt;" CreationDate="2024-1-1" StyleSheet=""/>"#,
            tag, version, version, encrypted, self.encoding
        )
    }

    pub fn build(&self) -> Vec<u8> {
        let mut header = utf16(&self.header_text());
        header.extend_from_slice(&utf16("\r\n"));
        header.extend_from_slice(&[0, 0]);
        let mut out = (header.len() as u32).to_be_bytes().to_vec();
        out.extend_from_slice(&header);
        out.extend_from_slice(&adler32_slice(&header).to_le_bytes());

        out.extend(self.key_index());
        out.extend(self.record_section());
        out
    }

    fn key_index(&self) -> Vec<u8> {
        let v2 = self.generation == Generation::V2;
        let terminator = vec![0u8; self.unit()];

        let mut info = Vec::new();
        let mut key_blocks = Vec::new();
        let chunks: Vec<&[(String, u64)]> = self.entries.chunks(self.keys_per_block.max(1)).collect();
        for chunk in &chunks {
            let mut block = Vec::new();
            for (key, offset) in chunk.iter() {
                block.extend(self.number(*offset));
                block.extend(self.encode(key));
                block.extend(&terminator);
            }
            let framed = frame(self.method, &block);

            info.extend(self.number(chunk.len() as u64));
            for key in [&chunk[0].0, &chunk[chunk.len() - 1].0] {
                let text = self.encode(key);
                let units = (text.len() / self.unit()) as u64;
                if v2 {
                    info.extend((units as u16).to_be_bytes());
                } else {
                    info.push(units as u8);
                }
                info.extend(text);
                if v2 {
                    info.extend(&terminator);
                }
            }
            info.extend(self.number(framed.len() as u64));
            info.extend(self.number(block.len() as u64));
            key_blocks.extend(framed);
        }

        let info_section = if !v2 {
            info.clone()
        } else if self.info_encrypted {
            let checksum = adler32_slice(&info);
            let key = crypto::index_key(&checksum.to_be_bytes());
            let mut section = vec![2, 0, 0, 0];
            section.extend_from_slice(&checksum.to_be_bytes());
            section.extend(crypto::fast_encrypt(&zlib(&info), &key));
            section
        } else {
            frame(Method::Deflate, &info)
        };

        let mut sizes = Vec::new();
        sizes.extend(self.number(chunks.len() as u64));
        sizes.extend(self.number(self.entries.len() as u64));
        if v2 {
            sizes.extend(self.number(info.len() as u64));
        }
        sizes.extend(self.number(info_section.len() as u64));
        sizes.extend(self.number(key_blocks.len() as u64));
        let checksum = adler32_slice(&sizes);
        if let Some(key) = &self.header_key {
            crypto::salsa20_8(&mut sizes, key).unwrap();
        }

        let mut out = sizes;
        if v2 {
            out.extend_from_slice(&checksum.to_be_bytes());
        }
        out.extend(info_section);
        out.extend(key_blocks);
        out
    }

    fn record_section(&self) -> Vec<u8> {
        let width = match self.generation {
            Generation::V1 => 4,
            Generation::V2 => 8,
        };
        let frames: Vec<Vec<u8>> = self.records.iter().map(|r| frame(self.method, r)).collect();
        let blocks_len: usize = frames.iter().map(Vec::len).sum();

        let mut out = Vec::new();
        out.extend(self.number(frames.len() as u64));
        out.extend(self.number(self.entries.len() as u64));
        out.extend(self.number(frames.len() as u64 * 2 * width));
        out.extend(self.number(blocks_len as u64));
        for (framed, record) in frames.iter().zip(&self.records) {
            out.extend(self.number(framed.len() as u64));
            out.extend(self.number(record.len() as u64));
        }
        for framed in frames {
            out.extend(framed);
        }
        out
    }

    pub fn write(&self) -> NamedTempFile {
        let suffix = match self.kind {
            ContainerKind::Text => ".mdx",
            ContainerKind::Resource => ".mdd",
        };
        let mut file = tempfile::Builder::new()
            .prefix("synthetic")
            .suffix(suffix)
            .tempfile()
            .unwrap();
        file.write_all(&self.build()).unwrap();
        file.flush().unwrap();
        file
    }
}

pub fn utf16(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

pub fn zlib(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Literal-only LZO1X stream; only lengths 4..=238 fit a single literal run.
fn lzo_literal(data: &[u8]) -> Vec<u8> {
    let mut out = vec![17 + data.len() as u8];
    out.extend_from_slice(data);
    out.extend_from_slice(&[0x11, 0x00, 0x00]);
    out
}

pub fn frame(method: Method, data: &[u8]) -> Vec<u8> {
    let (id, payload) = match method {
        Method::Lzo if (4..=238).contains(&data.len()) => (1, lzo_literal(data)),
        Method::Deflate => (2, zlib(data)),
        _ => (0, data.to_vec()),
    };
    let mut out = vec![id, 0, 0, 0];
    out.extend_from_slice(&adler32_slice(data).to_be_bytes());
    out.extend(payload);
    out
}
