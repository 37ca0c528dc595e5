//! Read-only access to MDict `.mdx` (text) and `.mdd` (resource) containers.
//!
//! ```no_run
//! use mdict_store::Dictionary;
//!
//! let dict = Dictionary::open("ejdic.mdx", None)?;
//! for (key, offset) in dict.entries_for("apple") {
//!     println!("{}: {}", key, dict.text_for(offset)?);
//! }
//! # Ok::<(), mdict_store::MdictError>(())
//! ```

pub mod codec;
pub mod crypto;
mod dictionary;
mod error;
pub mod header;
pub mod key_index;
mod key_store;
mod options;
pub mod record_index;
mod utils;

pub use dictionary::Dictionary;
pub use error::{MdictError, Result};
pub use header::{ContainerKind, DictionaryHeader, EncryptionFlags, Generation};
pub use key_index::KeyBlockDescriptor;
pub use key_store::{KeyStore, KeyStoreBuilder, Value};
pub use options::{kind_from_path, parse_password, Options};
pub use record_index::{RecordBlockDescriptor, RecordIndex};
