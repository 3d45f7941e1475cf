//! LDIF output -- content records and change records.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::codec::{encode_base64, needs_encoding, path_to_file_url, string_to_latin1};
use crate::schema::is_attribute_description;
use crate::control::Control;
use crate::data::{Attribute, Change, Record, Value};
use crate::error::{LdifError, Result};
use crate::fold::write_folded;
use crate::format::{DirectoryWriter, WriterOptions};
use crate::schema::SchemaOracle;

/// Plain values are trimmed of bytes up to 0x20 on input, so a value that
/// starts or ends with one only survives as base64.
fn needs_base64(data: &[u8]) -> bool {
    needs_encoding(data)
        || data.first().is_some_and(|&b| b <= b' ')
        || data.last().is_some_and(|&b| b <= b' ')
}

/// `name: value` when the bytes are a safe string, `name:: base64`
/// otherwise.
fn attrval_line(name: &str, data: &[u8], force_base64: bool) -> String {
    if force_base64 || needs_base64(data) {
        format!("{}:: {}", name, encode_base64(data))
    } else {
        format!("{}: {}", name, String::from_utf8_lossy(data))
    }
}

fn control_line(control: &Control) -> String {
    let critical = if control.critical { "true" } else { "false" };
    match &control.value {
        None => format!("control: {} {}", control.oid, critical),
        Some(v) if needs_base64(v) => {
            format!("control: {} {}:: {}", control.oid, critical, encode_base64(v))
        }
        Some(v) => format!(
            "control: {} {}: {}",
            control.oid,
            critical,
            String::from_utf8_lossy(v)
        ),
    }
}

pub struct LdifWriter<W> {
    out: W,
    options: WriterOptions,
    schema: Arc<dyn SchemaOracle>,
    /// Next index to try per spilled attribute name.
    spill_index: HashMap<String, usize>,
    spill_root: Option<PathBuf>,
}

impl<W: Write> LdifWriter<W> {
    pub fn new(out: W, options: WriterOptions, schema: Arc<dyn SchemaOracle>) -> Self {
        LdifWriter {
            out,
            options,
            schema,
            spill_index: HashMap::new(),
            spill_root: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: &str) -> Result<()> {
        write_folded(&mut self.out, text, self.options.width)?;
        Ok(())
    }

    fn spill_root(&mut self) -> Result<Option<PathBuf>> {
        if self.spill_root.is_none() {
            if let Some(dir) = &self.options.spill_dir {
                let root = fs::canonicalize(dir).map_err(|source| LdifError::File {
                    path: dir.clone(),
                    source,
                })?;
                self.spill_root = Some(root);
            }
        }
        Ok(self.spill_root.clone())
    }

    /// Store `data` in the first free `<dir>/<name>.<n>` and return its URL.
    fn spill(&mut self, dir: PathBuf, name: &str, data: &[u8]) -> Result<String> {
        if !is_attribute_description(name) {
            return Err(LdifError::unsupported(format!(
                "cannot spill attribute '{}' to a file",
                name
            )));
        }
        let index = self.spill_index.entry(name.to_string()).or_insert(0);
        loop {
            let path = dir.join(format!("{}.{}", name, index));
            *index += 1;
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(data)
                        .map_err(|source| LdifError::File {
                            path: path.clone(),
                            source,
                        })?;
                    trace!(path = %path.display(), bytes = data.len(), "spilled value");
                    return path_to_file_url(&path).ok_or_else(|| LdifError::File {
                        path,
                        source: io::Error::new(io::ErrorKind::InvalidInput, "not an absolute path"),
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(source) => return Err(LdifError::File { path, source }),
            }
        }
    }

    fn value(&mut self, name: &str, value: &Value) -> Result<()> {
        let data = value.as_bytes();
        if let Some(dir) = self.spill_root()? {
            let url = self.spill(dir, name, data)?;
            return self.line(&format!("{}:< {}", name, url));
        }
        let force = value.is_binary() || self.schema.binary(name);
        let text = attrval_line(name, data, force);
        self.line(&text)
    }

    /// DN-like value, written as ISO-8859-1 because that is how the reader
    /// decodes `dn::` payloads.
    fn dn_line(&mut self, tag: &str, dn: &str) -> Result<()> {
        let bytes = string_to_latin1(dn).ok_or_else(|| {
            LdifError::unsupported(format!(
                "{} '{}' has characters outside ISO-8859-1",
                tag, dn
            ))
        })?;
        let text = attrval_line(tag, &bytes, false);
        self.line(&text)
    }

    fn modifications(&mut self, record: &Record) -> Result<()> {
        for m in record.modifications() {
            self.line(&format!("{}: {}", m.op.keyword(), m.attribute.name))?;
            // Attributes-only mode does not apply to modifications.
            for v in &m.attribute.values {
                self.value(&m.attribute.name, v)?;
            }
            self.line("-")?;
        }
        Ok(())
    }
}

impl<W: Write> DirectoryWriter for LdifWriter<W> {
    fn options(&self) -> &WriterOptions {
        &self.options
    }

    fn schema(&self) -> &dyn SchemaOracle {
        self.schema.as_ref()
    }

    fn prologue(&mut self) -> Result<()> {
        if self.options.version_line {
            self.line("version: 1")?;
        }
        Ok(())
    }

    fn entry_start(&mut self, record: &Record) -> Result<()> {
        self.dn_line("dn", record.dn())?;
        for control in record.controls() {
            let text = control_line(control);
            self.line(&text)?;
        }
        if let Some(changetype) = record.kind().changetype() {
            self.line(&format!("changetype: {}", changetype))?;
        }
        Ok(())
    }

    fn attribute(&mut self, attribute: &Attribute) -> Result<()> {
        if self.options.attributes_only {
            return self.line(&format!("{}:", attribute.name));
        }
        for v in &attribute.values {
            self.value(&attribute.name, v)?;
        }
        Ok(())
    }

    fn entry_end(&mut self, record: &Record) -> Result<()> {
        match record.change() {
            Change::Modify(_) => self.modifications(record)?,
            Change::ModifyDn(rename) => {
                self.dn_line("newrdn", &rename.new_rdn)?;
                let flag = if rename.delete_old_rdn { "1" } else { "0" };
                self.line(&format!("deleteoldrdn: {}", flag))?;
                if let Some(sup) = &rename.new_superior {
                    self.dn_line("newsuperior", sup)?;
                }
            }
            Change::Content | Change::Add | Change::Delete => {}
        }
        self.out.write_all(b"\n")?;
        debug!(dn = record.dn(), kind = ?record.kind(), "wrote LDIF record");
        Ok(())
    }

    fn epilogue(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    /// Attributes belong only to content and add records.
    fn write_record(&mut self, record: &Record) -> Result<()> {
        self.entry_start(record)?;
        if matches!(record.change(), Change::Content | Change::Add) {
            for attribute in record.attributes() {
                if self.options.omit_readonly && self.schema.readonly(&attribute.name) {
                    continue;
                }
                self.attribute(attribute)?;
            }
        }
        self.entry_end(record)
    }
}
