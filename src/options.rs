use std::path::Path;

use crate::error::{MdictError, Result};
use crate::header::ContainerKind;

/// Load-time settings for [`Dictionary`](crate::Dictionary).
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub(crate) password: Option<Vec<u8>>,
    pub(crate) kind: Option<ContainerKind>,
    pub(crate) encoding: Option<String>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key for an encrypted key-index size header (16 or 32 bytes).
    pub fn password(mut self, password: impl Into<Vec<u8>>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Force the container kind instead of inferring it from the path.
    pub fn kind(mut self, kind: ContainerKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Override the declared text encoding. Ignored for resource containers.
    pub fn encoding(mut self, label: impl Into<String>) -> Self {
        self.encoding = Some(label.into());
        self
    }

    pub(crate) fn kind_for(&self, path: &Path) -> ContainerKind {
        self.kind.unwrap_or_else(|| kind_from_path(path))
    }
}

/// `.mdd` files hold resources; anything else is treated as text.
pub fn kind_from_path(path: &Path) -> ContainerKind {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("mdd") => ContainerKind::Resource,
        _ => ContainerKind::Text,
    }
}

/// Decode a registration-code line: the first 32 hex digits give the
/// 16-byte password.
pub fn parse_password(line: &str) -> Result<Vec<u8>> {
    let digits = line
        .trim()
        .get(..32)
        .ok_or_else(|| MdictError::DecryptionFailure("password line shorter than 32 hex digits".to_owned()))?;
    hex::decode(digits)
        .map_err(|e| MdictError::DecryptionFailure(format!("password is not hex: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_from_hex_line() {
        let line = "000102030405060708090a0b0c0d0e0fTRAILING-USER-ID\n";
        assert_eq!(parse_password(line).unwrap(), (0..16).collect::<Vec<u8>>());
        assert!(parse_password("abcd").is_err());
        assert!(parse_password(&"zz".repeat(16)).is_err());
    }

    #[test]
    fn kind_inference() {
        assert_eq!(kind_from_path(Path::new("a/b.MDD")), ContainerKind::Resource);
        assert_eq!(kind_from_path(Path::new("dict.mdx")), ContainerKind::Text);
        assert_eq!(kind_from_path(Path::new("noext")), ContainerKind::Text);
        let forced = Options::new().kind(ContainerKind::Text);
        assert_eq!(forced.kind_for(Path::new("x.mdd")), ContainerKind::Text);
    }
}
