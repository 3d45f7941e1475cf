//! DSML v1/v2 output.  Both versions share one element grammar and differ
//! only in the namespace of the root element.

use std::io::Write;
use std::sync::Arc;

use tracing::debug;

use crate::codec::encode_base64;
use crate::data::{Attribute, ChangeKind, Record, Value};
use crate::error::{LdifError, Result};
use crate::format::{indent, DirectoryWriter, Format, WriterOptions};
use crate::schema::SchemaOracle;

pub const DSML1_NAMESPACE: &str = "http://www.dsml.org/DSML";
pub const DSML2_NAMESPACE: &str = "urn:oasis:names:tc:DSML:2:0:core";

/// Escape character data: `&` and `<`.
fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;")
}

/// Escape an attribute value, which additionally cannot hold `"`.
fn escape_attr(s: &str) -> String {
    escape_text(s).replace('"', "&quot;")
}

/// Characters XML 1.0 cannot carry even when escaped.
fn xml_safe(s: &str) -> bool {
    !s.chars()
        .any(|c| (c < ' ' && c != '\t' && c != '\n' && c != '\r') || c == '\u{fffe}' || c == '\u{ffff}')
}

pub struct DsmlWriter<W> {
    out: W,
    namespace: &'static str,
    options: WriterOptions,
    schema: Arc<dyn SchemaOracle>,
}

impl<W: Write> DsmlWriter<W> {
    /// `format` selects the namespace; anything but `Dsml1` writes v2.
    pub fn new(
        out: W,
        format: Format,
        options: WriterOptions,
        schema: Arc<dyn SchemaOracle>,
    ) -> Self {
        let namespace = match format {
            Format::Dsml1 => DSML1_NAMESPACE,
            _ => DSML2_NAMESPACE,
        };
        DsmlWriter {
            out,
            namespace,
            options,
            schema,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn value(&mut self, name: &str, value: &Value, level: usize, tag: &str) -> Result<()> {
        indent(&mut self.out, level)?;
        match value {
            Value::Text(s) if xml_safe(s) && !self.schema.binary(name) => {
                write!(self.out, "<dsml:{}>{}</dsml:{}>\n", tag, escape_text(s), tag)?;
            }
            _ => {
                write!(
                    self.out,
                    "<dsml:{} encoding=\"base64\">{}</dsml:{}>\n",
                    tag,
                    encode_base64(value.as_bytes()),
                    tag
                )?;
            }
        }
        Ok(())
    }
}

impl<W: Write> DirectoryWriter for DsmlWriter<W> {
    fn options(&self) -> &WriterOptions {
        &self.options
    }

    fn schema(&self) -> &dyn SchemaOracle {
        self.schema.as_ref()
    }

    fn prologue(&mut self) -> Result<()> {
        write!(
            self.out,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<dsml:dsml xmlns:dsml=\"{}\">\n",
            self.namespace
        )?;
        indent(&mut self.out, 1)?;
        self.out.write_all(b"<dsml:directory-entries>\n")?;
        Ok(())
    }

    fn entry_start(&mut self, record: &Record) -> Result<()> {
        if !matches!(record.kind(), ChangeKind::Content | ChangeKind::Add) {
            return Err(LdifError::unsupported(format!(
                "DSML cannot represent {:?} record '{}'",
                record.kind(),
                record.dn()
            )));
        }
        indent(&mut self.out, 2)?;
        write!(self.out, "<dsml:entry dn=\"{}\">\n", escape_attr(record.dn()))?;
        Ok(())
    }

    fn attribute(&mut self, attribute: &Attribute) -> Result<()> {
        let object_class = attribute.is_named("objectClass");
        indent(&mut self.out, 3)?;
        if object_class {
            if self.options.attributes_only {
                self.out.write_all(b"<dsml:objectclass/>\n")?;
                return Ok(());
            }
            self.out.write_all(b"<dsml:objectclass>\n")?;
            for v in &attribute.values {
                self.value(&attribute.name, v, 4, "oc-value")?;
            }
            indent(&mut self.out, 3)?;
            self.out.write_all(b"</dsml:objectclass>\n")?;
        } else {
            let name = escape_attr(&attribute.name);
            if self.options.attributes_only {
                write!(self.out, "<dsml:attr name=\"{}\"/>\n", name)?;
                return Ok(());
            }
            write!(self.out, "<dsml:attr name=\"{}\">\n", name)?;
            for v in &attribute.values {
                self.value(&attribute.name, v, 4, "value")?;
            }
            indent(&mut self.out, 3)?;
            self.out.write_all(b"</dsml:attr>\n")?;
        }
        Ok(())
    }

    fn entry_end(&mut self, record: &Record) -> Result<()> {
        indent(&mut self.out, 2)?;
        self.out.write_all(b"</dsml:entry>\n")?;
        debug!(dn = record.dn(), "wrote DSML entry");
        Ok(())
    }

    fn epilogue(&mut self) -> Result<()> {
        indent(&mut self.out, 1)?;
        self.out.write_all(b"</dsml:directory-entries>\n</dsml:dsml>\n")?;
        self.out.flush()?;
        Ok(())
    }
}
