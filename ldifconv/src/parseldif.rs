//! LDIF parser -- RFC 2849 content and change records.
//!
//! `LdifReader` pulls one record per call from any `BufRead` source.  Each
//! call consumes the record's lines up to and including the blank line that
//! ends it.

use std::io::BufRead;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::codec::{self, latin1_to_string, wire_bytes, UrlValueError};
use crate::control::{Control, ControlRegistry};
use crate::data::{Attribute, ModOp, Record, Rename, Value};
use crate::error::{FormatErrorKind, LdifError, Result};
use crate::fold::LineReader;
use crate::format::DirectoryReader;
use crate::schema::{is_attribute_description, DefaultSchema, SchemaOracle};

// ---------------------------------------------------------------------------
// Line helpers
// ---------------------------------------------------------------------------

/// Case-insensitive `tag:` prefix match, returning the text after it.
fn strip_tag<'a>(line: &'a str, tag: &str) -> Option<&'a str> {
    let head = line.get(..tag.len())?;
    if head.eq_ignore_ascii_case(tag) {
        Some(&line[tag.len()..])
    } else {
        None
    }
}

/// Trim everything up to and including U+0020 from both ends.
fn trim_value(s: &str) -> &str {
    s.trim_matches(|c: char| c <= ' ')
}

/// The three value forms after the separator colon.
enum RawValue {
    Plain(String),
    Decoded(Vec<u8>),
}

/// How a block of attribute lines ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminator {
    Blank,
    Dash,
    Eof,
}

/// Attribute lines and controls read up to a separator.
struct Block {
    /// Name, value and line number of each attribute line.
    values: Vec<(String, Value, u64)>,
    controls: Vec<Control>,
    end: Terminator,
}

// ---------------------------------------------------------------------------
// LdifReader
// ---------------------------------------------------------------------------

pub struct LdifReader<R> {
    lines: LineReader<R>,
    schema: Arc<dyn SchemaOracle>,
    registry: Arc<ControlRegistry>,
    version: Option<u32>,
}

impl<R: BufRead> LdifReader<R> {
    /// Reader using the default schema oracle and control registry.
    pub fn new(reader: R) -> Self {
        LdifReader {
            lines: LineReader::new(reader),
            schema: Arc::new(DefaultSchema::new()),
            registry: Arc::new(ControlRegistry::with_defaults()),
            version: None,
        }
    }

    pub fn with_schema(mut self, schema: Arc<dyn SchemaOracle>) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_registry(mut self, registry: Arc<ControlRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Version declared by a `version:` line, if any was seen.
    pub fn version(&self) -> Option<u32> {
        self.version
    }

    /// Line number of the logical line read last.
    pub fn line(&self) -> u64 {
        self.lines.line()
    }

    // -- low-level helpers --------------------------------------------------

    fn err(&self, kind: FormatErrorKind) -> LdifError {
        LdifError::format(self.lines.line(), kind)
    }

    fn url_err(&self, e: UrlValueError) -> LdifError {
        match e {
            UrlValueError::Malformed(url) => self.err(FormatErrorKind::InvalidUrl(url)),
            UrlValueError::UnsupportedScheme(scheme) => {
                self.err(FormatErrorKind::InvalidUrl(format!("{}:", scheme)))
            }
            UrlValueError::Io { path, source } => LdifError::File { path, source },
        }
    }

    /// Next logical line that is not a record separator.
    fn skip_blank(&mut self) -> Result<Option<String>> {
        while let Some(line) = self.lines.read_line()? {
            if !line.is_empty() {
                return Ok(Some(line));
            }
        }
        Ok(None)
    }

    /// Decode the text after a separator colon: `: plain`, `:: base64` or
    /// `:< url`.
    fn decode_value(&self, spec: &str) -> Result<RawValue> {
        if let Some(b64) = spec.strip_prefix(':') {
            let bytes = codec::decode_base64(trim_value(b64))
                .map_err(|_| self.err(FormatErrorKind::InvalidBase64))?;
            Ok(RawValue::Decoded(bytes))
        } else if let Some(url) = spec.strip_prefix('<') {
            let url = trim_value(url);
            trace!(url, line = self.lines.line(), "URL-referenced value");
            let bytes = codec::resolve_url_value(url).map_err(|e| self.url_err(e))?;
            Ok(RawValue::Decoded(bytes))
        } else {
            Ok(RawValue::Plain(trim_value(spec).to_string()))
        }
    }

    /// DN-like values: base64 payloads are read as ISO-8859-1.
    fn decode_dn_value(&self, spec: &str) -> Result<String> {
        Ok(match self.decode_value(spec)? {
            RawValue::Plain(s) => s,
            RawValue::Decoded(bytes) => latin1_to_string(&bytes),
        })
    }

    fn parse_attribute_line(&self, line: &str) -> Result<(String, Value)> {
        let colon = line
            .find(':')
            .ok_or_else(|| self.err(FormatErrorKind::ExpectingSeparator))?;
        let name = trim_value(&line[..colon]);
        if !is_attribute_description(name) {
            return Err(self.err(FormatErrorKind::Unexpected(line.to_string())));
        }
        let binary = self.schema.binary(name);
        let value = match self.decode_value(&line[colon + 1..])? {
            RawValue::Plain(text) if binary => Value::Binary(wire_bytes(&text)),
            RawValue::Plain(text) => Value::Text(text),
            RawValue::Decoded(bytes) => Value::from_bytes(bytes, binary),
        };
        Ok((name.to_string(), value))
    }

    /// `control: OID [true|false] [value-spec]`; `raw` is the text after
    /// the tag.  Criticality defaults to true.
    fn parse_control(&self, raw: &str) -> Result<Control> {
        let rest = raw.trim_start();
        let oid_end = rest.find([' ', '\t', ':']).unwrap_or(rest.len());
        let oid = &rest[..oid_end];
        if oid.is_empty() {
            return Err(self.err(FormatErrorKind::ExpectingOid));
        }

        let mut rest = rest[oid_end..].trim_start();
        let mut critical = true;
        if !rest.is_empty() && !rest.starts_with(':') {
            let end = rest.find(':').unwrap_or(rest.len());
            critical = match rest[..end].trim_end() {
                "true" => true,
                "false" => false,
                other => {
                    return Err(self.err(FormatErrorKind::ExpectingCriticality(other.to_string())))
                }
            };
            rest = &rest[end..];
        }

        let value = match rest.strip_prefix(':') {
            Some(spec) => Some(match self.decode_value(spec)? {
                RawValue::Plain(text) => wire_bytes(&text),
                RawValue::Decoded(bytes) => bytes,
            }),
            None => None,
        };

        self.registry
            .resolve(Control::new(oid, critical, value))
            .map_err(|message| {
                self.err(FormatErrorKind::InvalidControl {
                    oid: oid.to_string(),
                    message,
                })
            })
    }

    /// Attribute lines until a blank line, `-` or end of input.
    fn read_block(&mut self) -> Result<Block> {
        let mut block = Block {
            values: Vec::new(),
            controls: Vec::new(),
            end: Terminator::Eof,
        };
        while let Some(line) = self.lines.read_line()? {
            if line.is_empty() {
                block.end = Terminator::Blank;
                break;
            }
            if line == "-" {
                block.end = Terminator::Dash;
                break;
            }
            if let Some(raw) = strip_tag(&line, "control:") {
                block.controls.push(self.parse_control(raw)?);
                continue;
            }
            let (name, value) = self.parse_attribute_line(&line)?;
            block.values.push((name, value, self.lines.line()));
        }
        Ok(block)
    }

    // -- record bodies ------------------------------------------------------

    fn parse_attributes(&mut self, record: &mut Record) -> Result<()> {
        let block = self.read_block()?;
        for control in block.controls {
            record.add_control(control);
        }
        for (name, value, _) in block.values {
            if self.schema.omit(&name) {
                trace!(attribute = %name, dn = record.dn(), "omitting attribute");
                continue;
            }
            record.add_value(&name, value)?;
        }
        Ok(())
    }

    fn parse_delete(&mut self, record: &mut Record) -> Result<()> {
        while let Some(line) = self.lines.read_line()? {
            if line.is_empty() {
                break;
            }
            match strip_tag(&line, "control:") {
                Some(raw) => {
                    let control = self.parse_control(raw)?;
                    record.add_control(control);
                }
                None => return Err(self.err(FormatErrorKind::ExpectingSeparator)),
            }
        }
        Ok(())
    }

    fn parse_modify(&mut self, record: &mut Record) -> Result<()> {
        while let Some(line) = self.lines.read_line()? {
            if line.is_empty() {
                break;
            }
            let colon = line
                .find(':')
                .ok_or_else(|| self.err(FormatErrorKind::ExpectingSeparator))?;
            let keyword = &line[..colon];
            let op = ModOp::from_keyword(keyword)
                .ok_or_else(|| self.err(FormatErrorKind::UnknownOperation(keyword.to_string())))?;
            let target = trim_value(&line[colon + 1..]).to_string();
            if target.is_empty() {
                return Err(self.err(FormatErrorKind::ExpectingAttribute(String::new())));
            }
            if !is_attribute_description(&target) {
                return Err(self.err(FormatErrorKind::Unexpected(line)));
            }
            let op_line = self.lines.line();

            let block = self.read_block()?;
            for control in block.controls {
                record.add_control(control);
            }
            let mut attribute = Attribute::new(target.as_str());
            for (name, value, line) in block.values {
                if !name.eq_ignore_ascii_case(&target) {
                    return Err(LdifError::format(
                        line,
                        FormatErrorKind::AttributeMismatch {
                            expected: target,
                            found: name,
                        },
                    ));
                }
                attribute.push(value);
            }
            if op == ModOp::Add && attribute.values.is_empty() {
                return Err(LdifError::format(
                    op_line,
                    FormatErrorKind::ExpectingAttribute(target),
                ));
            }
            if self.schema.omit(&target) {
                trace!(attribute = %target, dn = record.dn(), "omitting modification");
            } else {
                record.add_modification(op, attribute)?;
            }
            if block.end != Terminator::Dash {
                break;
            }
        }
        Ok(())
    }

    fn parse_rename(&mut self, dn: String) -> Result<Record> {
        let mut new_rdn = None;
        let mut new_superior = None;
        let mut delete_old_rdn = None;
        let mut controls = Vec::new();

        while let Some(line) = self.lines.read_line()? {
            if line.is_empty() {
                break;
            }
            if let Some(spec) = strip_tag(&line, "newrdn:") {
                new_rdn = Some(self.decode_dn_value(spec)?);
            } else if let Some(spec) = strip_tag(&line, "deleteoldrdn:") {
                delete_old_rdn = Some(match trim_value(spec) {
                    "0" => false,
                    "1" => true,
                    other => return Err(self.err(FormatErrorKind::DeleteOldRdn(other.to_string()))),
                });
            } else if let Some(spec) =
                strip_tag(&line, "newsuperior:").or_else(|| strip_tag(&line, "newparent:"))
            {
                new_superior = Some(self.decode_dn_value(spec)?);
            } else if let Some(raw) = strip_tag(&line, "control:") {
                controls.push(self.parse_control(raw)?);
            } else {
                return Err(self.err(FormatErrorKind::Unexpected(line)));
            }
        }

        let new_rdn = new_rdn.ok_or_else(|| self.err(FormatErrorKind::ExpectingPrefix("newrdn:")))?;
        let delete_old_rdn = delete_old_rdn
            .ok_or_else(|| self.err(FormatErrorKind::ExpectingPrefix("deleteoldrdn:")))?;
        let mut record = Record::modify_dn(
            dn,
            Rename {
                new_rdn,
                new_superior,
                delete_old_rdn,
            },
        );
        for control in controls {
            record.add_control(control);
        }
        Ok(record)
    }

    fn parse_change(&mut self, dn: String, changetype: &str) -> Result<Record> {
        let changetype = trim_value(changetype);
        if changetype.eq_ignore_ascii_case("add") {
            let mut r = Record::add(dn);
            self.parse_attributes(&mut r)?;
            Ok(r)
        } else if changetype.eq_ignore_ascii_case("delete") {
            let mut r = Record::delete(dn);
            self.parse_delete(&mut r)?;
            Ok(r)
        } else if changetype.eq_ignore_ascii_case("modify") {
            let mut r = Record::modify(dn);
            self.parse_modify(&mut r)?;
            Ok(r)
        } else if changetype.eq_ignore_ascii_case("moddn")
            || changetype.eq_ignore_ascii_case("modrdn")
        {
            self.parse_rename(dn)
        } else {
            Err(self.err(FormatErrorKind::UnsupportedChangeType(changetype.to_string())))
        }
    }

    /// Read the next record, or `None` once the input is exhausted.
    pub fn read_record(&mut self) -> Result<Option<Record>> {
        let mut line = match self.skip_blank()? {
            Some(line) => line,
            None => return Ok(None),
        };

        if let Some(v) = strip_tag(&line, "version:") {
            let v = trim_value(v);
            if v != "1" {
                return Err(self.err(FormatErrorKind::UnsupportedVersion(v.to_string())));
            }
            self.version = Some(1);
            line = match self.skip_blank()? {
                Some(line) => line,
                None => return Ok(None),
            };
        }

        let dn = match strip_tag(&line, "dn:") {
            Some(spec) => self.decode_dn_value(spec)?,
            None => return Err(self.err(FormatErrorKind::ExpectingPrefix("dn:"))),
        };

        // Controls precede the changetype line.
        let mut leading = Vec::new();
        let mut next = self.lines.read_line()?;
        while let Some(raw) = next.as_deref().and_then(|l| strip_tag(l, "control:")) {
            leading.push(self.parse_control(raw)?);
            next = self.lines.read_line()?;
        }

        let mut record = match next {
            Some(l) if !l.is_empty() && l != "-" => match strip_tag(&l, "changetype:") {
                Some(changetype) => self.parse_change(dn, changetype)?,
                None => {
                    self.lines.unread(l);
                    let mut r = Record::content(dn);
                    self.parse_attributes(&mut r)?;
                    r
                }
            },
            _ => Record::content(dn),
        };
        record.prepend_controls(leading);

        debug!(
            dn = record.dn(),
            kind = ?record.kind(),
            line = self.lines.line(),
            "parsed LDIF record"
        );
        Ok(Some(record))
    }
}

impl<R: BufRead> DirectoryReader for LdifReader<R> {
    fn next_record(&mut self) -> Result<Option<Record>> {
        self.read_record()
    }
}

impl<R: BufRead> Iterator for LdifReader<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_record().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{ManageDsaIt, MANAGE_DSA_IT_OID};
    use crate::data::{Change, ChangeKind};
    use crate::codec::path_to_file_url;
    use std::io::{Cursor, Write};

    fn p(data: &[u8]) -> LdifReader<Cursor<&[u8]>> {
        LdifReader::new(Cursor::new(data))
    }

    fn one(data: &[u8]) -> Record {
        p(data).read_record().unwrap().unwrap()
    }

    fn fails(data: &[u8]) -> LdifError {
        let mut r = p(data);
        loop {
            match r.read_record() {
                Ok(Some(_)) => continue,
                Ok(None) => panic!("expected an error"),
                Err(e) => return e,
            }
        }
    }

    fn text(r: &Record, name: &str) -> Vec<String> {
        r.attribute(name)
            .map(|a| {
                a.values
                    .iter()
                    .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                    .collect()
            })
            .unwrap_or_default()
    }

    // ── Group 1: content records ────────────────────────────────

    #[test]
    fn simple_content_record() {
        let r = one(b"dn: cn=a,dc=x\nobjectclass: top\ncn: a\n\n");
        assert_eq!(r.dn(), "cn=a,dc=x");
        assert_eq!(r.kind(), ChangeKind::Content);
        assert_eq!(r.attributes().len(), 2);
        assert_eq!(r.attributes()[0].name, "objectclass");
        assert_eq!(text(&r, "objectclass"), vec!["top"]);
        assert_eq!(text(&r, "cn"), vec!["a"]);
    }

    #[test]
    fn multiple_records_then_none() {
        let mut r = p(b"dn: cn=a\ncn: a\n\n\n\ndn: cn=b\ncn: b\n");
        assert_eq!(r.read_record().unwrap().unwrap().dn(), "cn=a");
        assert_eq!(r.read_record().unwrap().unwrap().dn(), "cn=b");
        assert!(r.read_record().unwrap().is_none());
        assert!(r.read_record().unwrap().is_none());
    }

    #[test]
    fn empty_input_yields_none() {
        assert!(p(b"").read_record().unwrap().is_none());
        assert!(p(b"\n\n# only a comment\n").read_record().unwrap().is_none());
    }

    #[test]
    fn repeated_attribute_accumulates() {
        let r = one(b"dn: cn=a\nmail: one\ncn: a\nMAIL: two\n");
        assert_eq!(r.attributes().len(), 2);
        assert_eq!(text(&r, "mail"), vec!["one", "two"]);
    }

    #[test]
    fn plain_values_are_trimmed() {
        let r = one(b"dn:   cn=a  \ncn:\t  padded  \nsn:nospace\n");
        assert_eq!(r.dn(), "cn=a");
        assert_eq!(text(&r, "cn"), vec!["padded"]);
        assert_eq!(text(&r, "sn"), vec!["nospace"]);
    }

    #[test]
    fn continuation_reassembled() {
        let r = one(b"dn: cn=a\ncn: averylong\n value\n");
        assert_eq!(text(&r, "cn"), vec!["averylongvalue"]);
    }

    #[test]
    fn base64_values_decoded() {
        let r = one(b"dn: cn=a\ndescription:: YQpi\n");
        assert_eq!(
            r.attribute("description").unwrap().values,
            vec![Value::Text("a\nb".into())]
        );
    }

    #[test]
    fn base64_dn_decoded_as_latin1() {
        // "cn=caf\xe9"
        let r = one(b"dn:: Y249Y2Fm6Q==\ncn: x\n");
        assert_eq!(r.dn(), "cn=caf\u{e9}");
    }

    #[test]
    fn invalid_utf8_becomes_binary() {
        let r = one(b"dn: cn=a\nblob:: //79\n");
        assert_eq!(
            r.attribute("blob").unwrap().values,
            vec![Value::Binary(vec![0xff, 0xfe, 0xfd])]
        );
    }

    #[test]
    fn schema_binary_attribute_forced() {
        let r = one(b"dn: cn=a\nuserPassword: secret\njpegPhoto:: YWJj\n");
        assert_eq!(
            r.attribute("userPassword").unwrap().values,
            vec![Value::Binary(b"secret".to_vec())]
        );
        assert!(r.attribute("jpegPhoto").unwrap().values[0].is_binary());
    }

    #[test]
    fn omitted_attributes_skipped() {
        let r = one(b"dn: cn=a\ncn: a\nsubschemaSubentry: cn=schema\nnumSubordinates: 3\n");
        assert_eq!(r.attributes().len(), 1);
        assert!(r.attribute("subschemaSubentry").is_none());
    }

    #[test]
    fn custom_schema_used() {
        let mut schema = DefaultSchema::empty();
        schema.add_omit("cn");
        let mut r = p(b"dn: cn=a\ncn: a\nsn: b\n").with_schema(Arc::new(schema));
        let rec = r.read_record().unwrap().unwrap();
        assert!(rec.attribute("cn").is_none());
        assert_eq!(text(&rec, "sn"), vec!["b"]);
    }

    #[test]
    fn dn_only_record_has_no_attributes() {
        let mut r = p(b"dn: cn=a\n\ndn: cn=b\ncn: b\n");
        let first = r.read_record().unwrap().unwrap();
        assert_eq!(first.kind(), ChangeKind::Content);
        assert!(first.attributes().is_empty());
        assert_eq!(r.read_record().unwrap().unwrap().dn(), "cn=b");
    }

    #[test]
    fn url_value_read_from_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"from a file").unwrap();
        let url = path_to_file_url(f.path()).unwrap();
        let data = format!("dn: cn=a\ndescription:< {}\n", url);
        let r = one(data.as_bytes());
        assert_eq!(text(&r, "description"), vec!["from a file"]);
    }

    #[test]
    fn version_line_accepted() {
        let mut r = p(b"version: 1\n\ndn: cn=a\ncn: a\n");
        let rec = r.read_record().unwrap().unwrap();
        assert_eq!(rec.dn(), "cn=a");
        assert_eq!(r.version(), Some(1));
    }

    #[test]
    fn iterator_yields_records() {
        let dns: Vec<String> = p(b"dn: cn=a\n\ndn: cn=b\n\ndn: cn=c\n")
            .map(|r| r.unwrap().dn().to_string())
            .collect();
        assert_eq!(dns, vec!["cn=a", "cn=b", "cn=c"]);
    }

    // ── Group 2: change records ─────────────────────────────────

    #[test]
    fn delete_record() {
        let r = one(b"dn: cn=a,dc=x\nchangetype: delete\n\n");
        assert_eq!(r.kind(), ChangeKind::Delete);
        assert_eq!(r.dn(), "cn=a,dc=x");
        assert!(r.attributes().is_empty());
    }

    #[test]
    fn delete_with_attribute_is_error() {
        let e = fails(b"dn: cn=a\nchangetype: delete\ncn: a\n");
        assert_eq!(e.kind(), Some(&FormatErrorKind::ExpectingSeparator));
        assert_eq!(e.line(), Some(3));
    }

    #[test]
    fn add_record() {
        let r = one(b"dn: cn=a\nchangetype: add\nobjectClass: person\ncn: a\nsn: b\n\n");
        assert_eq!(r.kind(), ChangeKind::Add);
        assert_eq!(r.attributes().len(), 3);
        assert_eq!(text(&r, "sn"), vec!["b"]);
    }

    #[test]
    fn modify_record() {
        let r = one(b"dn: cn=a\n\
                       changetype: modify\n\
                       add: mail\n\
                       mail: a@x\n\
                       mail: b@x\n\
                       -\n\
                       delete: phone\n\
                       -\n\
                       replace: sn\n\
                       sn: new\n\
                       -\n\
                       \n");
        let mods = r.modifications();
        assert_eq!(mods.len(), 3);
        assert_eq!(mods[0].op, ModOp::Add);
        assert_eq!(mods[0].attribute.name, "mail");
        assert_eq!(
            mods[0].attribute.values,
            vec![Value::from("a@x"), Value::from("b@x")]
        );
        assert_eq!(mods[1].op, ModOp::Remove);
        assert_eq!(mods[1].attribute.name, "phone");
        assert!(mods[1].attribute.values.is_empty());
        assert_eq!(mods[2].op, ModOp::Replace);
        assert_eq!(mods[2].attribute.values, vec![Value::from("new")]);
    }

    #[test]
    fn modify_last_block_without_dash() {
        let mut r = p(b"dn: cn=a\nchangetype: modify\nreplace: sn\nsn: x\n\ndn: cn=b\n");
        let rec = r.read_record().unwrap().unwrap();
        assert_eq!(rec.modifications().len(), 1);
        assert_eq!(r.read_record().unwrap().unwrap().dn(), "cn=b");
    }

    #[test]
    fn modify_ops_case_insensitive() {
        let r = one(b"dn: cn=a\nchangetype: modify\nREPLACE: sn\nsn: x\n-\n");
        assert_eq!(r.modifications()[0].op, ModOp::Replace);
    }

    #[test]
    fn modify_add_without_values_is_error() {
        let e = fails(b"dn: cn=a\nchangetype: modify\nadd: mail\n-\n");
        assert_eq!(
            e.kind(),
            Some(&FormatErrorKind::ExpectingAttribute("mail".into()))
        );
        assert_eq!(e.line(), Some(3));
    }

    #[test]
    fn modify_unknown_op_is_error() {
        let e = fails(b"dn: cn=a\nchangetype: modify\nincrement: uid\n-\n");
        assert_eq!(
            e.kind(),
            Some(&FormatErrorKind::UnknownOperation("increment".into()))
        );
    }

    #[test]
    fn modify_attribute_mismatch_is_error() {
        let e = fails(b"dn: cn=a\nchangetype: modify\nadd: mail\ncn: x\n-\n");
        assert!(matches!(
            e.kind(),
            Some(FormatErrorKind::AttributeMismatch { .. })
        ));
        assert_eq!(e.line(), Some(4));
    }

    #[test]
    fn moddn_record() {
        let r = one(b"dn: cn=a,dc=x\n\
                       changetype: modrdn\n\
                       newrdn: cn=b\n\
                       deleteoldrdn: 1\n\
                       newsuperior: ou=people,dc=x\n\
                       \n");
        assert_eq!(r.dn(), "cn=a,dc=x");
        assert_eq!(
            r.change(),
            &Change::ModifyDn(Rename {
                new_rdn: "cn=b".into(),
                new_superior: Some("ou=people,dc=x".into()),
                delete_old_rdn: true,
            })
        );
    }

    #[test]
    fn moddn_newparent_and_any_order() {
        let r = one(b"dn: cn=a\nchangetype: moddn\ndeleteoldrdn: 0\nnewparent: dc=y\nnewrdn: cn=c\n");
        let rename = r.rename().unwrap();
        assert_eq!(rename.new_rdn, "cn=c");
        assert_eq!(rename.new_superior.as_deref(), Some("dc=y"));
        assert!(!rename.delete_old_rdn);
    }

    #[test]
    fn moddn_bad_deleteoldrdn() {
        let e = fails(b"dn: cn=a\nchangetype: modrdn\nnewrdn: cn=b\ndeleteoldrdn: yes\n");
        assert_eq!(
            e.kind(),
            Some(&FormatErrorKind::DeleteOldRdn("yes".into()))
        );
        assert_eq!(e.line(), Some(4));
    }

    #[test]
    fn moddn_missing_newrdn() {
        let e = fails(b"dn: cn=a\nchangetype: modrdn\ndeleteoldrdn: 1\n\n");
        assert_eq!(e.kind(), Some(&FormatErrorKind::ExpectingPrefix("newrdn:")));
    }

    #[test]
    fn unsupported_changetype() {
        let e = fails(b"dn: cn=a\nchangetype: frobnicate\n");
        assert_eq!(
            e.kind(),
            Some(&FormatErrorKind::UnsupportedChangeType("frobnicate".into()))
        );
        assert_eq!(e.line(), Some(2));
    }

    // ── Group 3: controls ───────────────────────────────────────

    #[test]
    fn control_with_base64_value() {
        let r = one(b"dn: cn=a\ncontrol: 1.2.3.4 true:: AAEC\nchangetype: delete\n");
        assert_eq!(r.kind(), ChangeKind::Delete);
        let c = &r.controls()[0];
        assert_eq!(c.oid, "1.2.3.4");
        assert!(c.critical);
        assert_eq!(c.value.as_deref(), Some(&[0u8, 1, 2][..]));
    }

    #[test]
    fn control_criticality_defaults_to_true() {
        let r = one(b"dn: cn=a\nchangetype: delete\ncontrol: 1.2.3.4\n");
        assert!(r.controls()[0].critical);
        assert_eq!(r.controls()[0].value, None);
    }

    #[test]
    fn control_false_with_plain_value() {
        let r = one(b"dn: cn=a\ncontrol: 1.2.3.4 false: hello\ncn: a\n");
        let c = &r.controls()[0];
        assert!(!c.critical);
        assert_eq!(c.value.as_deref(), Some(&b"hello"[..]));
        assert_eq!(text(&r, "cn"), vec!["a"]);
    }

    #[test]
    fn control_value_without_criticality() {
        let r = one(b"dn: cn=a\ncontrol: 1.2.3.4: v\nchangetype: delete\n");
        assert!(r.controls()[0].critical);
        assert_eq!(r.controls()[0].value.as_deref(), Some(&b"v"[..]));
    }

    #[test]
    fn control_fields_separated_by_tabs() {
        let r = one(b"dn: cn=a\ncontrol:\t1.2.3\tfalse\nchangetype: delete\n");
        assert_eq!(r.controls()[0].oid, "1.2.3");
        assert!(!r.controls()[0].critical);
    }

    #[test]
    fn control_bad_criticality() {
        let e = fails(b"dn: cn=a\ncontrol: 1.2.3.4 maybe\nchangetype: delete\n");
        assert_eq!(
            e.kind(),
            Some(&FormatErrorKind::ExpectingCriticality("maybe".into()))
        );
        assert_eq!(e.line(), Some(2));
    }

    #[test]
    fn control_missing_oid() {
        let e = fails(b"dn: cn=a\ncontrol:\nchangetype: delete\n");
        assert_eq!(e.kind(), Some(&FormatErrorKind::ExpectingOid));
    }

    #[test]
    fn control_decoded_through_registry() {
        let data = format!("dn: cn=a\ncontrol: {} false\nchangetype: delete\n", MANAGE_DSA_IT_OID);
        let r = one(data.as_bytes());
        assert!(r.controls()[0].downcast::<ManageDsaIt>().is_some());
    }

    #[test]
    fn control_rejected_by_registry() {
        let data = format!("dn: cn=a\ncontrol: {} true: x\nchangetype: delete\n", MANAGE_DSA_IT_OID);
        let e = fails(data.as_bytes());
        assert!(matches!(e.kind(), Some(FormatErrorKind::InvalidControl { .. })));
    }

    #[test]
    fn leading_and_body_controls_keep_order() {
        let r = one(b"dn: cn=a\ncontrol: 1.1\nchangetype: delete\ncontrol: 1.2\n");
        let oids: Vec<&str> = r.controls().iter().map(|c| c.oid.as_str()).collect();
        assert_eq!(oids, vec!["1.1", "1.2"]);
    }

    // ── Group 4: format errors ──────────────────────────────────

    #[test]
    fn missing_dn_is_error() {
        let e = fails(b"cn: a\n");
        assert_eq!(e.kind(), Some(&FormatErrorKind::ExpectingPrefix("dn:")));
        assert_eq!(e.line(), Some(1));
    }

    #[test]
    fn bad_version_is_error() {
        let e = fails(b"version: 2\ndn: cn=a\n");
        assert_eq!(
            e.kind(),
            Some(&FormatErrorKind::UnsupportedVersion("2".into()))
        );
    }

    #[test]
    fn missing_separator_is_error() {
        let e = fails(b"dn: cn=a\ncn a\n");
        assert_eq!(e.kind(), Some(&FormatErrorKind::ExpectingSeparator));
        assert_eq!(e.line(), Some(2));
    }

    #[test]
    fn path_like_attribute_name_is_error() {
        let e = fails(b"dn: cn=a\n../escaped: pwned\n");
        assert_eq!(
            e.kind(),
            Some(&FormatErrorKind::Unexpected("../escaped: pwned".into()))
        );
        assert_eq!(e.line(), Some(2));
    }

    #[test]
    fn modify_target_must_be_attribute_name() {
        let e = fails(b"dn: cn=a\nchangetype: modify\nreplace: a/b\na/b: x\n-\n");
        assert_eq!(
            e.kind(),
            Some(&FormatErrorKind::Unexpected("replace: a/b".into()))
        );
        assert_eq!(e.line(), Some(3));
    }

    #[test]
    fn leading_continuation_is_error() {
        let e = fails(b" dn: cn=a\n");
        assert_eq!(e.kind(), Some(&FormatErrorKind::LineNowhere));
        assert_eq!(e.line(), Some(1));
    }

    #[test]
    fn error_line_skips_continuations() {
        // The bad line is the 5th physical line; the folded description
        // before it spans lines 2-4.
        let e = fails(b"dn: cn=a\ndescription: one\n two\n three\nbroken\n");
        assert_eq!(e.line(), Some(5));
    }

    #[test]
    fn malformed_url_is_error() {
        let e = fails(b"dn: cn=a\nphoto:< not a url\n");
        assert!(matches!(e.kind(), Some(FormatErrorKind::InvalidUrl(_))));
    }

    #[test]
    fn unreadable_url_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let url = path_to_file_url(&dir.path().join("gone.bin")).unwrap();
        let data = format!("dn: cn=a\nphoto:< {}\n", url);
        let e = fails(data.as_bytes());
        assert!(e.is_io());
        assert_eq!(e.line(), None);
    }

    #[test]
    fn invalid_base64_is_error() {
        let e = fails(b"dn: cn=a\ncn:: !!!\n");
        assert_eq!(e.kind(), Some(&FormatErrorKind::InvalidBase64));
    }
}
