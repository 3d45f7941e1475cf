use std::collections::HashSet;
use std::hash::{Hash, Hasher};

// ---------------------------------------------------------------------------
// CaseFold -- case-insensitive string key for HashSet
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct CaseFold(String);

impl CaseFold {
    fn new(s: &str) -> Self {
        CaseFold(s.to_string())
    }
}

impl PartialEq for CaseFold {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for CaseFold {}

impl Hash for CaseFold {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for b in self.0.bytes() {
            state.write_u8(b.to_ascii_lowercase());
        }
    }
}

/// Strip attribute options: `userCertificate;binary` -> `userCertificate`.
pub fn remove_options(ad: &str) -> &str {
    match ad.find(';') {
        Some(i) => &ad[..i],
        None => ad,
    }
}

/// RFC 4512 attribute description: a keystring or numeric OID followed by
/// `;option`s.  Letters, digits, `-`, `.` and `;`, starting with a letter
/// or digit.
pub fn is_attribute_description(ad: &str) -> bool {
    ad.chars().next().is_some_and(|c| c.is_ascii_alphanumeric())
        && ad
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | ';'))
}

fn has_option(ad: &str, option: &str) -> bool {
    ad.split(';').skip(1).any(|o| o.eq_ignore_ascii_case(option))
}

// ---------------------------------------------------------------------------
// SchemaOracle
// ---------------------------------------------------------------------------

/// Attribute classification consulted while parsing and writing.
pub trait SchemaOracle: Send + Sync {
    /// Drop the attribute on input.
    fn omit(&self, name: &str) -> bool;
    /// Always treat values as raw bytes.
    fn binary(&self, name: &str) -> bool;
    /// Server-maintained; skipped by writers asked to omit readonly data.
    fn readonly(&self, name: &str) -> bool;
}

const OMIT: &[&str] = &[
    "hasSubordinates",
    "nsUniqueId",
    "numSubordinates",
    "structuralObjectClass",
    "subschemaSubentry",
];

const BINARY: &[&str] = &[
    "photo",
    "audio",
    "jpegPhoto",
    "userPassword",
    "cACertificate",
    "thumbnailLogo",
    "thumbnailPhoto",
    "userCertificate",
    "x500UniqueIdentifier",
    "crossCertificatePair",
    "personalSignature",
    "javaSerializedData",
    "authorityRevocationList",
    "certificateRevocationList",
];

const READONLY: &[&str] = &[
    "createTimestamp",
    "modifyTimestamp",
    "creatorsName",
    "modifiersName",
    "entryUUID",
    "entryDN",
    "entryCSN",
    "hasSubordinates",
    "numSubordinates",
    "structuralObjectClass",
    "subschemaSubentry",
];

/// Name-list oracle.  Lookups ignore case and attribute options.
#[derive(Debug, Clone)]
pub struct DefaultSchema {
    omit: HashSet<CaseFold>,
    binary: HashSet<CaseFold>,
    readonly: HashSet<CaseFold>,
}

impl Default for DefaultSchema {
    fn default() -> Self {
        let set = |names: &[&str]| -> HashSet<CaseFold> {
            names.iter().map(|n| CaseFold::new(n)).collect()
        };
        DefaultSchema {
            omit: set(OMIT),
            binary: set(BINARY),
            readonly: set(READONLY),
        }
    }
}

impl DefaultSchema {
    pub fn new() -> Self {
        DefaultSchema::default()
    }

    /// Oracle that omits nothing and forces nothing to binary.
    pub fn empty() -> Self {
        DefaultSchema {
            omit: HashSet::new(),
            binary: HashSet::new(),
            readonly: HashSet::new(),
        }
    }

    pub fn add_omit(&mut self, name: &str) {
        self.omit.insert(CaseFold::new(remove_options(name)));
    }

    pub fn add_binary(&mut self, name: &str) {
        self.binary.insert(CaseFold::new(remove_options(name)));
    }

    pub fn add_readonly(&mut self, name: &str) {
        self.readonly.insert(CaseFold::new(remove_options(name)));
    }
}

impl SchemaOracle for DefaultSchema {
    fn omit(&self, name: &str) -> bool {
        self.omit.contains(&CaseFold::new(remove_options(name)))
    }

    fn binary(&self, name: &str) -> bool {
        has_option(name, "binary") || self.binary.contains(&CaseFold::new(remove_options(name)))
    }

    fn readonly(&self, name: &str) -> bool {
        self.readonly.contains(&CaseFold::new(remove_options(name)))
    }
}
