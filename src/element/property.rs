//! Element attribute values and per-factory property schemas.

use super::Caps;
use crate::error::{Error, Result};
use std::fmt;

/// A value that can be assigned to an element attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    /// An unsigned integer value.
    UInt(u64),
    /// A text value.
    Text(String),
    /// A capability descriptor.
    Caps(Caps),
}

impl PropertyValue {
    /// The kind of this value.
    pub fn kind(&self) -> PropertyKind {
        match self {
            PropertyValue::UInt(_) => PropertyKind::UInt,
            PropertyValue::Text(_) => PropertyKind::Text,
            PropertyValue::Caps(_) => PropertyKind::Caps,
        }
    }

    /// Try to get as an unsigned integer.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            PropertyValue::UInt(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as caps.
    pub fn as_caps(&self) -> Option<&Caps> {
        match self {
            PropertyValue::Caps(c) => Some(c),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::UInt(v) => write!(f, "{v}"),
            PropertyValue::Text(s) => write!(f, "\"{s}\""),
            PropertyValue::Caps(c) => write!(f, "{c}"),
        }
    }
}

impl From<u64> for PropertyValue {
    fn from(v: u64) -> Self {
        PropertyValue::UInt(v)
    }
}

impl From<u32> for PropertyValue {
    fn from(v: u32) -> Self {
        PropertyValue::UInt(u64::from(v))
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::UInt(u64::from(v))
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::Text(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::Text(v)
    }
}

impl From<Caps> for PropertyValue {
    fn from(v: Caps) -> Self {
        PropertyValue::Caps(v)
    }
}

/// The kind of value a property accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    /// Unsigned integer.
    UInt,
    /// Text.
    Text,
    /// Capability descriptor.
    Caps,
}

impl PropertyKind {
    /// Human-readable kind label.
    pub fn label(&self) -> &'static str {
        match self {
            PropertyKind::UInt => "unsigned integer",
            PropertyKind::Text => "text",
            PropertyKind::Caps => "caps",
        }
    }
}

/// One recognized property of an element factory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySpec {
    /// Property name.
    pub name: &'static str,
    /// Accepted value kind.
    pub kind: PropertyKind,
}

impl PropertySpec {
    /// Unsigned integer property.
    pub const fn uint(name: &'static str) -> Self {
        Self {
            name,
            kind: PropertyKind::UInt,
        }
    }

    /// Text property.
    pub const fn text(name: &'static str) -> Self {
        Self {
            name,
            kind: PropertyKind::Text,
        }
    }

    /// Caps property.
    pub const fn caps(name: &'static str) -> Self {
        Self {
            name,
            kind: PropertyKind::Caps,
        }
    }
}

/// Validate `value` against a factory's closed property schema.
pub fn check_property(
    factory: &str,
    schema: &[PropertySpec],
    name: &str,
    value: &PropertyValue,
) -> Result<()> {
    let spec = schema
        .iter()
        .find(|p| p.name == name)
        .ok_or_else(|| Error::UnknownProperty {
            factory: factory.to_string(),
            property: name.to_string(),
        })?;

    if spec.kind != value.kind() {
        return Err(Error::PropertyKind {
            property: name.to_string(),
            expected: spec.kind.label(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &[PropertySpec] = &[
        PropertySpec::uint("gpu-id"),
        PropertySpec::text("src-crop"),
        PropertySpec::caps("caps"),
    ];

    #[test]
    fn test_known_property_accepted() {
        assert!(check_property("nvvideoconvert", SCHEMA, "gpu-id", &1u32.into()).is_ok());
        assert!(check_property("nvvideoconvert", SCHEMA, "src-crop", &"0:0:10:10".into()).is_ok());
    }

    #[test]
    fn test_unknown_property_rejected() {
        let err = check_property("nvvideoconvert", SCHEMA, "bogus", &1u32.into()).unwrap_err();
        assert!(matches!(err, Error::UnknownProperty { ref property, .. } if property == "bogus"));
    }

    #[test]
    fn test_wrong_kind_rejected() {
        let err = check_property("nvvideoconvert", SCHEMA, "gpu-id", &"zero".into()).unwrap_err();
        assert_eq!(
            err,
            Error::PropertyKind {
                property: "gpu-id".to_string(),
                expected: "unsigned integer",
            }
        );
    }

    #[test]
    fn test_bool_maps_to_uint() {
        assert_eq!(PropertyValue::from(true), PropertyValue::UInt(1));
        assert_eq!(PropertyValue::from(false).as_u64(), Some(0));
    }
}
