//! LDAP controls and the OID registry used to decode them.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

pub const MANAGE_DSA_IT_OID: &str = "2.16.840.1.113730.3.4.2";
pub const SUBTREE_DELETE_OID: &str = "1.2.840.113556.1.4.805";
pub const PROXIED_AUTHZ_OID: &str = "2.16.840.1.113730.3.4.18";

/// A control decoded into a specialized form by the registry.
pub trait DecodedControl: fmt::Debug + Send + Sync {
    fn oid(&self) -> &str;
    fn as_any(&self) -> &dyn Any;
}

/// OID, criticality and optional opaque value.
#[derive(Debug, Clone)]
pub struct Control {
    pub oid: String,
    pub critical: bool,
    pub value: Option<Vec<u8>>,
    decoded: Option<Arc<dyn DecodedControl>>,
}

impl Control {
    pub fn new(oid: impl Into<String>, critical: bool, value: Option<Vec<u8>>) -> Control {
        Control {
            oid: oid.into(),
            critical,
            value,
            decoded: None,
        }
    }

    pub fn decoded(&self) -> Option<&dyn DecodedControl> {
        self.decoded.as_deref()
    }

    /// The decoded form, if it is a `T`.
    pub fn downcast<T: 'static>(&self) -> Option<&T> {
        self.decoded()?.as_any().downcast_ref::<T>()
    }
}

impl PartialEq for Control {
    fn eq(&self, other: &Self) -> bool {
        self.oid == other.oid && self.critical == other.critical && self.value == other.value
    }
}

// ---------------------------------------------------------------------------
// Built-in decoded controls
// ---------------------------------------------------------------------------

/// RFC 3296 ManageDsaIT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManageDsaIt;

/// Subtree delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtreeDelete;

/// RFC 4370 proxied authorization.  The control value is the authzId.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxiedAuthorization {
    pub authz_id: String,
}

macro_rules! decoded_control {
    ($ty:ty, $oid:expr) => {
        impl DecodedControl for $ty {
            fn oid(&self) -> &str {
                $oid
            }

            fn as_any(&self) -> &dyn Any {
                self
            }
        }
    };
}

decoded_control!(ManageDsaIt, MANAGE_DSA_IT_OID);
decoded_control!(SubtreeDelete, SUBTREE_DELETE_OID);
decoded_control!(ProxiedAuthorization, PROXIED_AUTHZ_OID);

fn no_value(control: &Control) -> Result<(), String> {
    match &control.value {
        Some(v) if !v.is_empty() => Err("control takes no value".to_string()),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// ControlRegistry
// ---------------------------------------------------------------------------

pub type ControlDecoder =
    Box<dyn Fn(&Control) -> Result<Arc<dyn DecodedControl>, String> + Send + Sync>;

/// Maps control OIDs to decoders.
///
/// Populate it before parsing starts; lookups take a read lock so parsers on
/// other threads may share one registry.
#[derive(Default)]
pub struct ControlRegistry {
    decoders: RwLock<HashMap<String, ControlDecoder>>,
}

impl ControlRegistry {
    pub fn new() -> ControlRegistry {
        ControlRegistry::default()
    }

    /// Registry preloaded with ManageDsaIT, subtree delete and proxied
    /// authorization.
    pub fn with_defaults() -> ControlRegistry {
        let registry = ControlRegistry::new();
        registry.register(MANAGE_DSA_IT_OID, |c| {
            no_value(c)?;
            Ok(Arc::new(ManageDsaIt))
        });
        registry.register(SUBTREE_DELETE_OID, |c| {
            no_value(c)?;
            Ok(Arc::new(SubtreeDelete))
        });
        registry.register(PROXIED_AUTHZ_OID, |c| {
            let raw = c.value.clone().unwrap_or_default();
            let authz_id = String::from_utf8(raw)
                .map_err(|_| "authzId is not valid UTF-8".to_string())?;
            Ok(Arc::new(ProxiedAuthorization { authz_id }))
        });
        registry
    }

    /// Register (or replace) the decoder for `oid`.
    pub fn register<F>(&self, oid: &str, decoder: F)
    where
        F: Fn(&Control) -> Result<Arc<dyn DecodedControl>, String> + Send + Sync + 'static,
    {
        self.decoders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(oid.to_string(), Box::new(decoder));
    }

    pub fn contains(&self, oid: &str) -> bool {
        self.decoders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(oid)
    }

    /// Attach the decoded form when a decoder is registered for the OID.
    /// Unknown OIDs pass through untouched.
    pub fn resolve(&self, mut control: Control) -> Result<Control, String> {
        let decoders = self.decoders.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(decode) = decoders.get(&control.oid) {
            control.decoded = Some(decode(&control)?);
        }
        Ok(control)
    }
}

impl fmt::Debug for ControlRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let decoders = self.decoders.read().unwrap_or_else(PoisonError::into_inner);
        let mut oids: Vec<&String> = decoders.keys().collect();
        oids.sort();
        f.debug_struct("ControlRegistry").field("oids", &oids).finish()
    }
}
