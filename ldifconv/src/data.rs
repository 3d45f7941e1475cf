use crate::control::Control;
use crate::error::{LdifError, Result};

/// A single attribute value: text, or raw bytes that are not text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Text(String),
    Binary(Vec<u8>),
}

impl Value {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Value::Text(s) => s.as_bytes(),
            Value::Binary(b) => b,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            Value::Binary(_) => None,
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, Value::Binary(_))
    }

    /// Text if the bytes are UTF-8 and `force_binary` is not set.
    pub fn from_bytes(data: Vec<u8>, force_binary: bool) -> Value {
        if force_binary {
            return Value::Binary(data);
        }
        match String::from_utf8(data) {
            Ok(s) => Value::Text(s),
            Err(e) => Value::Binary(e.into_bytes()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Binary(b)
    }
}

/// An attribute: a name with its values in encounter order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub values: Vec<Value>,
}

impl Attribute {
    pub fn new(name: impl Into<String>) -> Attribute {
        Attribute {
            name: name.into(),
            values: Vec::new(),
        }
    }

    pub fn with_values<V: Into<Value>>(
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Attribute {
        Attribute {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Attribute names compare case-insensitively.
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn push(&mut self, value: impl Into<Value>) {
        self.values.push(value.into());
    }
}

/// Modify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModOp {
    Add,
    Remove,
    Replace,
}

impl ModOp {
    /// LDIF keyword (`add:`, `delete:`, `replace:`).
    pub fn keyword(self) -> &'static str {
        match self {
            ModOp::Add => "add",
            ModOp::Remove => "delete",
            ModOp::Replace => "replace",
        }
    }

    pub fn from_keyword(word: &str) -> Option<ModOp> {
        if word.eq_ignore_ascii_case("add") {
            Some(ModOp::Add)
        } else if word.eq_ignore_ascii_case("delete") {
            Some(ModOp::Remove)
        } else if word.eq_ignore_ascii_case("replace") {
            Some(ModOp::Replace)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modification {
    pub op: ModOp,
    pub attribute: Attribute,
}

/// Payload of a moddn/modrdn record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rename {
    pub new_rdn: String,
    pub new_superior: Option<String>,
    pub delete_old_rdn: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Content,
    Add,
    Delete,
    Modify,
    ModifyDn,
}

impl ChangeKind {
    /// Value of the `changetype:` line; `None` for plain content.
    pub fn changetype(self) -> Option<&'static str> {
        match self {
            ChangeKind::Content => None,
            ChangeKind::Add => Some("add"),
            ChangeKind::Delete => Some("delete"),
            ChangeKind::Modify => Some("modify"),
            ChangeKind::ModifyDn => Some("modrdn"),
        }
    }
}

/// Change-kind specific payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Content,
    Add,
    Delete,
    Modify(Vec<Modification>),
    ModifyDn(Rename),
}

/// A directory record keyed by its DN.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    dn: String,
    controls: Vec<Control>,
    attributes: Vec<Attribute>,
    change: Change,
}

impl Record {
    fn with_change(dn: impl Into<String>, change: Change) -> Record {
        Record {
            dn: dn.into(),
            controls: Vec::new(),
            attributes: Vec::new(),
            change,
        }
    }

    pub fn content(dn: impl Into<String>) -> Record {
        Record::with_change(dn, Change::Content)
    }

    pub fn add(dn: impl Into<String>) -> Record {
        Record::with_change(dn, Change::Add)
    }

    pub fn delete(dn: impl Into<String>) -> Record {
        Record::with_change(dn, Change::Delete)
    }

    pub fn modify(dn: impl Into<String>) -> Record {
        Record::with_change(dn, Change::Modify(Vec::new()))
    }

    pub fn modify_dn(dn: impl Into<String>, rename: Rename) -> Record {
        Record::with_change(dn, Change::ModifyDn(rename))
    }

    pub fn dn(&self) -> &str {
        &self.dn
    }

    pub fn kind(&self) -> ChangeKind {
        match self.change {
            Change::Content => ChangeKind::Content,
            Change::Add => ChangeKind::Add,
            Change::Delete => ChangeKind::Delete,
            Change::Modify(_) => ChangeKind::Modify,
            Change::ModifyDn(_) => ChangeKind::ModifyDn,
        }
    }

    pub fn change(&self) -> &Change {
        &self.change
    }

    pub fn controls(&self) -> &[Control] {
        &self.controls
    }

    pub fn add_control(&mut self, control: Control) {
        self.controls.push(control);
    }

    pub(crate) fn prepend_controls(&mut self, controls: Vec<Control>) {
        self.controls.splice(0..0, controls);
    }

    /// Attributes in first-seen order of their names.
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.is_named(name))
    }

    /// Merge `attr` into the record; values of a name already present are
    /// appended to the existing attribute.
    ///
    /// Delete records carry no attributes, so this fails for them.
    pub fn add_attribute(&mut self, attr: Attribute) -> Result<()> {
        if self.kind() == ChangeKind::Delete {
            return Err(LdifError::unsupported(format!(
                "cannot add attribute '{}' to delete record '{}'",
                attr.name, self.dn
            )));
        }
        match self.attributes.iter_mut().find(|a| a.is_named(&attr.name)) {
            Some(existing) => existing.values.extend(attr.values),
            None => self.attributes.push(attr),
        }
        Ok(())
    }

    pub fn add_value(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.add_attribute(Attribute::with_values(name, [value.into()]))
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<Attribute> {
        let pos = self.attributes.iter().position(|a| a.is_named(name))?;
        Some(self.attributes.remove(pos))
    }

    pub fn modifications(&self) -> &[Modification] {
        match &self.change {
            Change::Modify(mods) => mods,
            _ => &[],
        }
    }

    pub fn add_modification(&mut self, op: ModOp, attribute: Attribute) -> Result<()> {
        match &mut self.change {
            Change::Modify(mods) => {
                mods.push(Modification { op, attribute });
                Ok(())
            }
            _ => Err(LdifError::unsupported(format!(
                "record '{}' is not a modify record",
                self.dn
            ))),
        }
    }

    pub fn rename(&self) -> Option<&Rename> {
        match &self.change {
            Change::ModifyDn(r) => Some(r),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Group 1: values ─────────────────────────────────────────

    #[test]
    fn value_from_utf8_bytes_is_text() {
        assert_eq!(
            Value::from_bytes(b"foo".to_vec(), false),
            Value::Text("foo".into())
        );
    }

    #[test]
    fn value_from_invalid_utf8_is_binary() {
        let v = Value::from_bytes(vec![0xff, 0xfe], false);
        assert!(v.is_binary());
        assert_eq!(v.as_bytes(), &[0xff, 0xfe]);
        assert_eq!(v.as_text(), None);
    }

    #[test]
    fn value_forced_binary() {
        assert!(Value::from_bytes(b"text".to_vec(), true).is_binary());
    }

    // ── Group 2: attribute map ──────────────────────────────────

    #[test]
    fn repeated_names_accumulate() {
        let mut r = Record::content("cn=a,dc=x");
        r.add_value("cn", "a").unwrap();
        r.add_value("objectClass", "top").unwrap();
        r.add_value("CN", "b").unwrap();
        assert_eq!(r.attributes().len(), 2);
        assert_eq!(r.attributes()[0].name, "cn");
        assert_eq!(
            r.attribute("cn").unwrap().values,
            vec![Value::from("a"), Value::from("b")]
        );
    }

    #[test]
    fn lookup_ignores_case() {
        let mut r = Record::add("cn=a,dc=x");
        r.add_value("objectClass", "top").unwrap();
        assert!(r.attribute("OBJECTCLASS").is_some());
        assert!(r.attribute("sn").is_none());
    }

    #[test]
    fn remove_attribute_by_name() {
        let mut r = Record::content("cn=a");
        r.add_value("cn", "a").unwrap();
        r.add_value("sn", "b").unwrap();
        assert!(r.remove_attribute("CN").is_some());
        assert_eq!(r.attributes().len(), 1);
        assert!(r.remove_attribute("cn").is_none());
    }

    // ── Group 3: change kinds ───────────────────────────────────

    #[test]
    fn delete_rejects_attributes() {
        let mut r = Record::delete("cn=a,dc=x");
        for name in ["cn", "objectClass", ""] {
            let err = r.add_attribute(Attribute::new(name)).unwrap_err();
            assert!(matches!(err, LdifError::UnsupportedOperation(_)));
        }
        assert!(r.add_value("cn", "x").is_err());
        assert!(r.attributes().is_empty());
    }

    #[test]
    fn modifications_only_on_modify() {
        let mut r = Record::modify("cn=a");
        r.add_modification(ModOp::Replace, Attribute::with_values("sn", ["b"]))
            .unwrap();
        assert_eq!(r.modifications().len(), 1);
        assert_eq!(r.kind(), ChangeKind::Modify);

        let mut c = Record::content("cn=a");
        assert!(c
            .add_modification(ModOp::Add, Attribute::new("sn"))
            .is_err());
        assert!(c.modifications().is_empty());
    }

    #[test]
    fn modify_dn_payload() {
        let r = Record::modify_dn(
            "cn=a,dc=x",
            Rename {
                new_rdn: "cn=b".into(),
                new_superior: None,
                delete_old_rdn: true,
            },
        );
        assert_eq!(r.kind(), ChangeKind::ModifyDn);
        assert_eq!(r.rename().unwrap().new_rdn, "cn=b");
        assert_eq!(ChangeKind::ModifyDn.changetype(), Some("modrdn"));
        assert_eq!(ChangeKind::Content.changetype(), None);
    }

    #[test]
    fn mod_op_keywords() {
        assert_eq!(ModOp::from_keyword("REPLACE"), Some(ModOp::Replace));
        assert_eq!(ModOp::from_keyword("delete"), Some(ModOp::Remove));
        assert_eq!(ModOp::from_keyword("increment"), None);
        assert_eq!(ModOp::Remove.keyword(), "delete");
    }
}
