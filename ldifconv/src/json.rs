//! JSON output: an array with one flat object per record.
//!
//! Each object has a `dn` key plus one key per attribute whose value is the
//! array of that attribute's values.  Binary values appear as base64 text.

use std::io::{self, Write};
use std::sync::Arc;

use tracing::debug;

use crate::codec::encode_base64;
use crate::data::{Attribute, ChangeKind, Record, Value};
use crate::error::{LdifError, Result};
use crate::format::{indent, DirectoryWriter, WriterOptions};
use crate::schema::SchemaOracle;

pub struct JsonWriter<W> {
    out: W,
    options: WriterOptions,
    schema: Arc<dyn SchemaOracle>,
    first_entry: bool,
}

impl<W: Write> JsonWriter<W> {
    pub fn new(out: W, options: WriterOptions, schema: Arc<dyn SchemaOracle>) -> Self {
        JsonWriter {
            out,
            options,
            schema,
            first_entry: true,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Quoted and escaped JSON string.
    fn string(&mut self, s: &str) -> Result<()> {
        serde_json::to_writer(&mut self.out, s).map_err(io::Error::from)?;
        Ok(())
    }
}

impl<W: Write> DirectoryWriter for JsonWriter<W> {
    fn options(&self) -> &WriterOptions {
        &self.options
    }

    fn schema(&self) -> &dyn SchemaOracle {
        self.schema.as_ref()
    }

    fn prologue(&mut self) -> Result<()> {
        self.out.write_all(b"[")?;
        Ok(())
    }

    fn entry_start(&mut self, record: &Record) -> Result<()> {
        if !matches!(record.kind(), ChangeKind::Content | ChangeKind::Add) {
            return Err(LdifError::unsupported(format!(
                "JSON cannot represent {:?} record '{}'",
                record.kind(),
                record.dn()
            )));
        }
        if !self.first_entry {
            self.out.write_all(b",")?;
        }
        self.first_entry = false;
        self.out.write_all(b"\n")?;
        indent(&mut self.out, 1)?;
        self.out.write_all(b"{\n")?;
        indent(&mut self.out, 2)?;
        self.out.write_all(b"\"dn\": ")?;
        self.string(record.dn())
    }

    fn attribute(&mut self, attribute: &Attribute) -> Result<()> {
        self.out.write_all(b",\n")?;
        indent(&mut self.out, 2)?;
        self.string(&attribute.name)?;
        self.out.write_all(b": [")?;
        if !self.options.attributes_only {
            let binary = self.schema.binary(&attribute.name);
            for (i, v) in attribute.values.iter().enumerate() {
                if i > 0 {
                    self.out.write_all(b", ")?;
                }
                match v {
                    Value::Text(s) if !binary => self.string(s)?,
                    _ => self.string(&encode_base64(v.as_bytes()))?,
                }
            }
        }
        self.out.write_all(b"]")?;
        Ok(())
    }

    fn entry_end(&mut self, record: &Record) -> Result<()> {
        self.out.write_all(b"\n")?;
        indent(&mut self.out, 1)?;
        self.out.write_all(b"}")?;
        debug!(dn = record.dn(), "wrote JSON object");
        Ok(())
    }

    fn epilogue(&mut self) -> Result<()> {
        self.out.write_all(b"\n]\n")?;
        self.out.flush()?;
        Ok(())
    }
}
