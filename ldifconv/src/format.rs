//! Format selection and the reader/writer capabilities shared by every
//! serialization.

use std::fmt;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use crate::control::ControlRegistry;
use crate::data::{Attribute, Record};
use crate::dsml::DsmlWriter;
use crate::error::{LdifError, Result};
use crate::fold::DEFAULT_WIDTH;
use crate::json::JsonWriter;
use crate::parsedsml::DsmlReader;
use crate::parseldif::LdifReader;
use crate::print::LdifWriter;
use crate::schema::SchemaOracle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Ldif,
    Dsml1,
    Dsml2,
    Json,
}

impl Format {
    pub fn name(self) -> &'static str {
        match self {
            Format::Ldif => "ldif",
            Format::Dsml1 => "dsml1",
            Format::Dsml2 => "dsml2",
            Format::Json => "json",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ldif" => Ok(Format::Ldif),
            "dsml1" | "dsml" => Ok(Format::Dsml1),
            "dsml2" => Ok(Format::Dsml2),
            "json" => Ok(Format::Json),
            _ => Err(format!(
                "unknown format '{}' (expected ldif, dsml1, dsml2 or json)",
                s
            )),
        }
    }
}

/// Writer settings common to all formats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterOptions {
    /// LDIF line width; 0 disables folding.
    pub width: usize,
    /// Emit attribute names without values.
    pub attributes_only: bool,
    /// Skip attributes the schema oracle reports as readonly.
    pub omit_readonly: bool,
    /// Start LDIF output with `version: 1`.
    pub version_line: bool,
    /// Write LDIF values to numbered files here instead of inline.
    pub spill_dir: Option<PathBuf>,
}

impl Default for WriterOptions {
    fn default() -> Self {
        WriterOptions {
            width: DEFAULT_WIDTH,
            attributes_only: false,
            omit_readonly: false,
            version_line: true,
            spill_dir: None,
        }
    }
}

impl WriterOptions {
    pub fn width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }

    pub fn attributes_only(mut self, yes: bool) -> Self {
        self.attributes_only = yes;
        self
    }

    pub fn omit_readonly(mut self, yes: bool) -> Self {
        self.omit_readonly = yes;
        self
    }

    pub fn version_line(mut self, yes: bool) -> Self {
        self.version_line = yes;
        self
    }

    pub fn spill_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spill_dir = Some(dir.into());
        self
    }
}

/// Pull-based record source.
pub trait DirectoryReader {
    /// Next record, or `None` once the input is exhausted.
    fn next_record(&mut self) -> Result<Option<Record>>;
}

/// Three-phase record sink: prologue, one start/attributes/end sequence per
/// record, epilogue.
pub trait DirectoryWriter {
    fn options(&self) -> &WriterOptions;
    fn schema(&self) -> &dyn SchemaOracle;

    fn prologue(&mut self) -> Result<()>;
    fn entry_start(&mut self, record: &Record) -> Result<()>;
    fn attribute(&mut self, attribute: &Attribute) -> Result<()>;
    fn entry_end(&mut self, record: &Record) -> Result<()>;
    fn epilogue(&mut self) -> Result<()>;

    /// Write one record, skipping readonly attributes when asked to.
    fn write_record(&mut self, record: &Record) -> Result<()> {
        self.entry_start(record)?;
        for attribute in record.attributes() {
            if self.options().omit_readonly && self.schema().readonly(&attribute.name) {
                continue;
            }
            self.attribute(attribute)?;
        }
        self.entry_end(record)
    }
}

/// Drain `reader` into `writer`, returning the number of records written.
pub fn convert(reader: &mut dyn DirectoryReader, writer: &mut dyn DirectoryWriter) -> Result<u64> {
    let mut count = 0;
    writer.prologue()?;
    while let Some(record) = reader.next_record()? {
        writer.write_record(&record)?;
        count += 1;
    }
    writer.epilogue()?;
    Ok(count)
}

/// Writer for `format` over `out`.
pub fn writer_for<'a, W: Write + 'a>(
    format: Format,
    out: W,
    options: WriterOptions,
    schema: Arc<dyn SchemaOracle>,
) -> Box<dyn DirectoryWriter + 'a> {
    match format {
        Format::Ldif => Box::new(LdifWriter::new(out, options, schema)),
        Format::Dsml1 | Format::Dsml2 => Box::new(DsmlWriter::new(out, format, options, schema)),
        Format::Json => Box::new(JsonWriter::new(out, options, schema)),
    }
}

/// Reader for `format` over `input`.  Only LDIF and DSML v2 can be read.
pub fn reader_for<'a, R: BufRead + 'a>(
    format: Format,
    input: R,
    schema: Arc<dyn SchemaOracle>,
    registry: Arc<ControlRegistry>,
) -> Result<Box<dyn DirectoryReader + 'a>> {
    match format {
        Format::Ldif => Ok(Box::new(
            LdifReader::new(input)
                .with_schema(schema)
                .with_registry(registry),
        )),
        Format::Dsml2 => Ok(Box::new(DsmlReader::new(input, schema, registry))),
        Format::Dsml1 | Format::Json => Err(LdifError::unsupported(format!(
            "reading {} input",
            format
        ))),
    }
}

/// Two spaces per nesting level.
pub(crate) fn indent(w: &mut dyn Write, level: usize) -> io::Result<()> {
    for _ in 0..level {
        w.write_all(b"  ")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DefaultSchema;
    use std::io::Cursor;

    fn schema() -> Arc<dyn SchemaOracle> {
        Arc::new(DefaultSchema::new())
    }

    #[test]
    fn format_names_round_trip() {
        for f in [Format::Ldif, Format::Dsml1, Format::Dsml2, Format::Json] {
            assert_eq!(f.name().parse::<Format>().unwrap(), f);
        }
        assert_eq!("DSML".parse::<Format>().unwrap(), Format::Dsml1);
        assert!("xml".parse::<Format>().is_err());
    }

    #[test]
    fn options_builder() {
        let o = WriterOptions::default()
            .width(0)
            .attributes_only(true)
            .omit_readonly(true)
            .version_line(false)
            .spill_dir("/tmp");
        assert_eq!(o.width, 0);
        assert!(o.attributes_only && o.omit_readonly && !o.version_line);
        assert_eq!(o.spill_dir, Some(PathBuf::from("/tmp")));
        assert_eq!(WriterOptions::default().width, 77);
    }

    #[test]
    fn readers_for_unreadable_formats_fail() {
        for f in [Format::Dsml1, Format::Json] {
            let r = reader_for(
                f,
                Cursor::new(&b""[..]),
                schema(),
                Arc::new(ControlRegistry::new()),
            );
            assert!(matches!(r, Err(LdifError::UnsupportedOperation(_))));
        }
    }

    #[test]
    fn convert_ldif_to_json() {
        let input = b"dn: cn=a,dc=x\ncn: a\n\ndn: cn=b,dc=x\ncn: b\n";
        let mut reader = reader_for(
            Format::Ldif,
            Cursor::new(&input[..]),
            schema(),
            Arc::new(ControlRegistry::with_defaults()),
        )
        .unwrap();
        let mut out = Vec::new();
        {
            let mut writer = writer_for(Format::Json, &mut out, WriterOptions::default(), schema());
            assert_eq!(convert(reader.as_mut(), writer.as_mut()).unwrap(), 2);
        }
        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(json[1]["dn"], "cn=b,dc=x");
        assert_eq!(json[0]["cn"][0], "a");
    }

    #[test]
    fn omit_readonly_filters_attributes() {
        let mut record = Record::content("cn=a");
        record.add_value("cn", "a").unwrap();
        record.add_value("modifyTimestamp", "20240101000000Z").unwrap();
        let mut out = Vec::new();
        {
            let options = WriterOptions::default().omit_readonly(true).version_line(false);
            let mut writer = writer_for(Format::Ldif, &mut out, options, schema());
            writer.write_record(&record).unwrap();
        }
        assert_eq!(String::from_utf8(out).unwrap(), "dn: cn=a\ncn: a\n\n");
    }

    #[test]
    fn indent_two_spaces_per_level() {
        let mut out = Vec::new();
        indent(&mut out, 3).unwrap();
        assert_eq!(out, b"      ");
    }
}
