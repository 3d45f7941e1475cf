//! LDIF codec: an RFC 2849 parser and writer over a directory record model,
//! with DSML and JSON sibling writers and a DSML v2 reader.

pub mod codec;
pub mod config;
pub mod control;
pub mod data;
pub mod dsml;
pub mod error;
pub mod fold;
pub mod format;
pub mod json;
pub mod parsedsml;
pub mod parseldif;
pub mod print;
pub mod schema;

pub use control::{Control, ControlRegistry};
pub use data::{Attribute, Change, ChangeKind, ModOp, Modification, Record, Rename, Value};
pub use error::{FormatErrorKind, LdifError, Result};
pub use format::{convert, reader_for, writer_for, DirectoryReader, DirectoryWriter, Format, WriterOptions};
pub use parseldif::LdifReader;
pub use print::LdifWriter;
pub use schema::{DefaultSchema, SchemaOracle};
