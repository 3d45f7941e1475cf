//! Configuration profiles.
//!
//! Profiles live in an LDIF file, one record per profile, named by the
//! record's DN:
//!
//! ```text
//! dn: default
//! format: json
//! width: 0
//! binary: myBlob
//! ```

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use crate::data::Record;
use crate::error::{LdifError, Result};
use crate::format::{DirectoryReader, Format};
use crate::parseldif::LdifReader;
use crate::schema::DefaultSchema;

pub const CONFIG_ENV: &str = "LDIFCONV_CONFIG";
pub const DEFAULT_PROFILE: &str = "default";

/// Find the profile record named `name`.  A name used twice is an error.
pub fn find_profile(content: &[u8], name: &str) -> Result<Option<Record>> {
    let mut reader =
        LdifReader::new(Cursor::new(content)).with_schema(Arc::new(DefaultSchema::empty()));
    let mut found: Option<Record> = None;

    while let Some(record) = reader.next_record()? {
        if record.dn() == name {
            if found.is_some() {
                return Err(LdifError::Config(format!(
                    "duplicate configuration profile '{}'",
                    name
                )));
            }
            found = Some(record);
        }
    }

    Ok(found)
}

pub fn profile_get(profile: &Record, key: &str) -> Option<String> {
    profile_get_all(profile, key).into_iter().next()
}

pub fn profile_get_all(profile: &Record, key: &str) -> Vec<String> {
    profile
        .attribute(key)
        .map(|a| {
            a.values
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                .collect()
        })
        .unwrap_or_default()
}

pub fn profile_get_bool(profile: &Record, key: &str) -> bool {
    profile_get(profile, key).as_deref() == Some("yes")
}

/// Candidate configuration files, most specific first.
pub fn config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(p) = std::env::var_os(CONFIG_ENV) {
        paths.push(PathBuf::from(p));
    }
    if let Some(home) = std::env::var_os("HOME") {
        paths.push(PathBuf::from(home).join(".ldifconvrc"));
    }
    paths.push(PathBuf::from("/etc/ldifconv.conf"));
    paths
}

/// Read the first configuration file that exists and look up `name`
/// (defaulting to `default`).  Missing files or profiles are only errors
/// when a profile was asked for by name.
pub fn load_profile(name: Option<&str>) -> Result<Option<Record>> {
    let wanted = name.unwrap_or(DEFAULT_PROFILE);
    let found = config_paths()
        .into_iter()
        .find_map(|path| std::fs::read(&path).ok().map(|content| (path, content)));

    let (path, content) = match found {
        Some(f) => f,
        None if name.is_some() => {
            return Err(LdifError::Config("configuration file not found".to_string()))
        }
        None => return Ok(None),
    };

    let profile = find_profile(&content, wanted)
        .map_err(|e| LdifError::Config(format!("{}: {}", path.display(), e)))?;
    if profile.is_none() && name.is_some() {
        return Err(LdifError::Config(format!(
            "configuration profile not found: '{}'",
            wanted
        )));
    }
    Ok(profile)
}

/// Converter settings taken from a profile.  Command line flags override
/// them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub format: Option<Format>,
    pub input_format: Option<Format>,
    pub width: Option<usize>,
    pub attributes_only: bool,
    pub omit_readonly: bool,
    pub version_line: Option<bool>,
    pub spill_dir: Option<PathBuf>,
    pub binary: Vec<String>,
    pub omit: Vec<String>,
    pub readonly: Vec<String>,
}

impl Settings {
    pub fn from_profile(profile: &Record) -> Result<Settings> {
        let parse_format = |key: &str| -> Result<Option<Format>> {
            profile_get(profile, key)
                .map(|v| v.parse::<Format>().map_err(LdifError::Config))
                .transpose()
        };
        let width = profile_get(profile, "width")
            .map(|v| {
                v.parse::<usize>()
                    .map_err(|_| LdifError::Config(format!("invalid width '{}'", v)))
            })
            .transpose()?;
        let version_line = profile_get(profile, "version-line").map(|v| v != "no");

        Ok(Settings {
            format: parse_format("format")?,
            input_format: parse_format("input-format")?,
            width,
            attributes_only: profile_get_bool(profile, "attributes-only"),
            omit_readonly: profile_get_bool(profile, "omit-readonly"),
            version_line,
            spill_dir: profile_get(profile, "spill-dir").map(PathBuf::from),
            binary: profile_get_all(profile, "binary"),
            omit: profile_get_all(profile, "omit"),
            readonly: profile_get_all(profile, "readonly"),
        })
    }

    /// Default schema extended with the profile's attribute lists.
    pub fn schema(&self) -> DefaultSchema {
        let mut schema = DefaultSchema::new();
        for name in &self.binary {
            schema.add_binary(name);
        }
        for name in &self.omit {
            schema.add_omit(name);
        }
        for name in &self.readonly {
            schema.add_readonly(name);
        }
        schema
    }
}
