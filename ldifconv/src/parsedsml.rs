//! DSML v2 input -- reads the requests of a `batchRequest` document as
//! change records, one request per call.
//!
//! Namespace prefixes are ignored; elements are matched on their local
//! names.

use std::io::BufRead;
use std::sync::Arc;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::debug;

use crate::codec::decode_base64;
use crate::control::{Control, ControlRegistry};
use crate::data::{Attribute, ModOp, Record, Rename, Value};
use crate::error::{FormatErrorKind, LdifError, Result};
use crate::format::DirectoryReader;
use crate::schema::SchemaOracle;

/// Owned view of one XML event.
#[derive(Debug)]
enum Tag {
    Start(String, Vec<(String, String)>),
    Empty(String, Vec<(String, String)>),
    End(String),
    Text(String),
    Eof,
    Other,
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attributes(e: &BytesStart<'_>) -> std::result::Result<Vec<(String, String)>, String> {
    e.attributes()
        .map(|a| {
            let a = a.map_err(|err| err.to_string())?;
            let key = String::from_utf8_lossy(a.key.local_name().as_ref()).into_owned();
            let value = a.unescape_value().map_err(|err| err.to_string())?.into_owned();
            Ok((key, value))
        })
        .collect()
}

fn attr<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// `encoding="base64"` or an `xsi:type` naming base64Binary.
fn is_base64(attrs: &[(String, String)]) -> bool {
    attr(attrs, "encoding").is_some_and(|e| e.eq_ignore_ascii_case("base64"))
        || attr(attrs, "type").is_some_and(|t| t.ends_with("base64Binary"))
}

/// Children of a request element.
#[derive(Default)]
struct Body {
    groups: Vec<(Vec<(String, String)>, Vec<Value>)>,
    controls: Vec<Control>,
}

pub struct DsmlReader<R> {
    xml: Reader<R>,
    buf: Vec<u8>,
    schema: Arc<dyn SchemaOracle>,
    registry: Arc<ControlRegistry>,
}

impl<R: BufRead> DsmlReader<R> {
    pub fn new(input: R, schema: Arc<dyn SchemaOracle>, registry: Arc<ControlRegistry>) -> Self {
        DsmlReader {
            xml: Reader::from_reader(input),
            buf: Vec::new(),
            schema,
            registry,
        }
    }

    fn position(&self) -> u64 {
        self.xml.buffer_position() as u64
    }

    fn markup(&self, message: impl Into<String>) -> LdifError {
        LdifError::format(self.position(), FormatErrorKind::Markup(message.into()))
    }

    fn next_tag(&mut self) -> Result<Tag> {
        self.buf.clear();
        let pos = self.position();
        let bad = |message: String| LdifError::format(pos, FormatErrorKind::Markup(message));
        let event = self
            .xml
            .read_event_into(&mut self.buf)
            .map_err(|e| bad(e.to_string()))?;
        Ok(match event {
            Event::Start(e) => Tag::Start(local_name(&e), attributes(&e).map_err(bad)?),
            Event::Empty(e) => Tag::Empty(local_name(&e), attributes(&e).map_err(bad)?),
            Event::End(e) => Tag::End(String::from_utf8_lossy(e.local_name().as_ref()).into_owned()),
            Event::Text(t) => Tag::Text(t.unescape().map_err(|e| bad(e.to_string()))?.into_owned()),
            Event::CData(c) => Tag::Text(String::from_utf8_lossy(&c).into_owned()),
            Event::Eof => Tag::Eof,
            _ => Tag::Other,
        })
    }

    /// Character data up to the end tag `name`.
    fn read_text(&mut self, name: &str) -> Result<String> {
        let mut text = String::new();
        loop {
            match self.next_tag()? {
                Tag::Text(t) => text.push_str(&t),
                Tag::End(n) if n == name => return Ok(text),
                Tag::Other => {}
                other => return Err(self.markup(format!("unexpected {:?} inside <{}>", other, name))),
            }
        }
    }

    fn read_value(&mut self, attr_name: &str, attrs: &[(String, String)]) -> Result<Value> {
        let text = self.read_text("value")?;
        let binary = self.schema.binary(attr_name);
        if is_base64(attrs) {
            let bytes = decode_base64(&text)
                .map_err(|_| LdifError::format(self.position(), FormatErrorKind::InvalidBase64))?;
            Ok(Value::from_bytes(bytes, binary))
        } else if binary {
            Ok(Value::Binary(text.into_bytes()))
        } else {
            Ok(Value::Text(text))
        }
    }

    fn read_control(&mut self, attrs: &[(String, String)], empty: bool) -> Result<Control> {
        let oid = attr(attrs, "type")
            .ok_or_else(|| self.markup("control without type"))?
            .to_string();
        let critical = match attr(attrs, "criticality") {
            None | Some("true") | Some("1") => true,
            Some("false") | Some("0") => false,
            Some(other) => {
                return Err(LdifError::format(
                    self.position(),
                    FormatErrorKind::ExpectingCriticality(other.to_string()),
                ))
            }
        };
        let mut value = None;
        if !empty {
            loop {
                match self.next_tag()? {
                    Tag::Start(n, a) if n == "controlValue" => {
                        let text = self.read_text("controlValue")?;
                        value = Some(if is_base64(&a) {
                            decode_base64(&text).map_err(|_| {
                                LdifError::format(self.position(), FormatErrorKind::InvalidBase64)
                            })?
                        } else {
                            text.into_bytes()
                        });
                    }
                    Tag::End(n) if n == "control" => break,
                    Tag::Text(t) if t.trim().is_empty() => {}
                    Tag::Other => {}
                    other => return Err(self.markup(format!("unexpected {:?} in <control>", other))),
                }
            }
        }
        self.registry
            .resolve(Control::new(oid.as_str(), critical, value))
            .map_err(|message| {
                LdifError::format(
                    self.position(),
                    FormatErrorKind::InvalidControl { oid, message },
                )
            })
    }

    /// `attr`/`modification` groups and controls up to the end tag `name`.
    fn read_body(&mut self, name: &str, group: &str) -> Result<Body> {
        let mut body = Body::default();
        loop {
            match self.next_tag()? {
                Tag::End(n) if n == name => return Ok(body),
                Tag::Start(n, a) if n == "control" => body.controls.push(self.read_control(&a, false)?),
                Tag::Empty(n, a) if n == "control" => body.controls.push(self.read_control(&a, true)?),
                Tag::Empty(n, a) if n == group => body.groups.push((a, Vec::new())),
                Tag::Start(n, a) if n == group => {
                    let attr_name = attr(&a, "name").unwrap_or_default().to_string();
                    let mut values = Vec::new();
                    loop {
                        match self.next_tag()? {
                            Tag::Start(v, va) if v == "value" => {
                                values.push(self.read_value(&attr_name, &va)?)
                            }
                            Tag::Empty(v, _) if v == "value" => values.push(Value::Text(String::new())),
                            Tag::End(e) if e == group => break,
                            Tag::Text(t) if t.trim().is_empty() => {}
                            Tag::Other => {}
                            other => {
                                return Err(self.markup(format!("unexpected {:?} in <{}>", other, group)))
                            }
                        }
                    }
                    body.groups.push((a, values));
                }
                Tag::Text(t) if t.trim().is_empty() => {}
                Tag::Other => {}
                other => return Err(self.markup(format!("unexpected {:?} in <{}>", other, name))),
            }
        }
    }

    fn group_name(&self, attrs: &[(String, String)]) -> Result<String> {
        match attr(attrs, "name") {
            Some(n) if !n.is_empty() => Ok(n.to_string()),
            _ => Err(self.markup("attribute without name")),
        }
    }

    fn request(&mut self, name: &str, attrs: Vec<(String, String)>, empty: bool) -> Result<Record> {
        let dn = attr(&attrs, "dn")
            .ok_or_else(|| self.markup(format!("<{}> without dn", name)))?
            .to_string();
        let body = if empty {
            Body::default()
        } else {
            let group = if name == "modifyRequest" { "modification" } else { "attr" };
            self.read_body(name, group)?
        };

        let mut record = match name {
            "addRequest" => {
                let mut r = Record::add(dn);
                for (a, values) in &body.groups {
                    let attr_name = self.group_name(a)?;
                    if self.schema.omit(&attr_name) {
                        continue;
                    }
                    r.add_attribute(Attribute::with_values(attr_name, values.clone()))?;
                }
                r
            }
            "modifyRequest" => {
                let mut r = Record::modify(dn);
                for (a, values) in &body.groups {
                    let attr_name = self.group_name(a)?;
                    let keyword = attr(a, "operation").unwrap_or_default();
                    let op = ModOp::from_keyword(keyword).ok_or_else(|| {
                        LdifError::format(
                            self.position(),
                            FormatErrorKind::UnknownOperation(keyword.to_string()),
                        )
                    })?;
                    if self.schema.omit(&attr_name) {
                        continue;
                    }
                    r.add_modification(op, Attribute::with_values(attr_name, values.clone()))?;
                }
                r
            }
            "delRequest" => Record::delete(dn),
            _ => {
                let new_rdn = attr(&attrs, "newrdn")
                    .ok_or_else(|| self.markup("<modDNRequest> without newrdn"))?
                    .to_string();
                let delete_old_rdn = match attr(&attrs, "deleteoldrdn") {
                    None | Some("true") | Some("1") => true,
                    Some("false") | Some("0") => false,
                    Some(other) => {
                        return Err(LdifError::format(
                            self.position(),
                            FormatErrorKind::DeleteOldRdn(other.to_string()),
                        ))
                    }
                };
                Record::modify_dn(
                    dn,
                    Rename {
                        new_rdn,
                        new_superior: attr(&attrs, "newSuperior").map(str::to_string),
                        delete_old_rdn,
                    },
                )
            }
        };
        for control in body.controls {
            record.add_control(control);
        }
        debug!(dn = record.dn(), kind = ?record.kind(), "parsed DSML request");
        Ok(record)
    }
}

const REQUESTS: &[&str] = &["addRequest", "modifyRequest", "delRequest", "modDNRequest"];

impl<R: BufRead> DirectoryReader for DsmlReader<R> {
    fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            match self.next_tag()? {
                Tag::Eof => return Ok(None),
                Tag::Start(n, a) if REQUESTS.contains(&n.as_str()) => {
                    return self.request(&n, a, false).map(Some)
                }
                Tag::Empty(n, a) if REQUESTS.contains(&n.as_str()) => {
                    return self.request(&n, a, true).map(Some)
                }
                Tag::Start(n, _) if n == "batchRequest" => {}
                Tag::End(n) if n == "batchRequest" => {}
                Tag::Empty(n, _) if n == "batchRequest" => {}
                Tag::Text(t) if t.trim().is_empty() => {}
                Tag::Other => {}
                other => return Err(self.markup(format!("unexpected {:?}", other))),
            }
        }
    }
}
