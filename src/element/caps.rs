//! Capability descriptors.
//!
//! A [`Caps`] value describes the media a pad produces or accepts, in the
//! usual `media/type(features), field=(type)value, ...` notation. The core
//! never interprets caps; it only carries them to the engine as attribute
//! values (for example on a `capsfilter`).

use std::fmt;

/// A single typed caps field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapsField {
    /// Integer field, rendered as `(int)`.
    Int(i64),
    /// Fraction field, rendered as `(fraction)`.
    Fraction(i32, i32),
    /// String field, rendered as `(string)`.
    Text(String),
}

impl fmt::Display for CapsField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapsField::Int(v) => write!(f, "(int){v}"),
            CapsField::Fraction(n, d) => write!(f, "(fraction){n}/{d}"),
            CapsField::Text(s) => write!(f, "(string){s}"),
        }
    }
}

/// A capability descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caps {
    media_type: String,
    features: Option<String>,
    fields: Vec<(String, CapsField)>,
}

impl Caps {
    /// Create caps for a media type with no fields.
    pub fn new(media_type: impl Into<String>) -> Self {
        Self {
            media_type: media_type.into(),
            features: None,
            fields: Vec::new(),
        }
    }

    /// Raw video caps in NVMM memory with the given geometry and rate.
    pub fn nvmm_video(width: u32, height: u32, fps_n: u32, fps_d: u32) -> Self {
        Self::new("video/x-raw")
            .with_features("memory:NVMM")
            .with_int("width", i64::from(width))
            .with_int("height", i64::from(height))
            .with_fraction("framerate", fps_n as i32, fps_d as i32)
    }

    /// Set the caps features (e.g. `memory:NVMM`).
    pub fn with_features(mut self, features: impl Into<String>) -> Self {
        self.features = Some(features.into());
        self
    }

    /// Add or replace an integer field.
    pub fn with_int(self, name: impl Into<String>, value: i64) -> Self {
        self.with_field(name, CapsField::Int(value))
    }

    /// Add or replace a fraction field.
    pub fn with_fraction(self, name: impl Into<String>, num: i32, den: i32) -> Self {
        self.with_field(name, CapsField::Fraction(num, den))
    }

    /// Add or replace a string field.
    pub fn with_text(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.with_field(name, CapsField::Text(value.into()))
    }

    fn with_field(mut self, name: impl Into<String>, value: CapsField) -> Self {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((name, value)),
        }
        self
    }

    /// Media type, e.g. `video/x-raw`.
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// Caps features, if any.
    pub fn features(&self) -> Option<&str> {
        self.features.as_deref()
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&CapsField> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

impl fmt::Display for Caps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.media_type)?;
        if let Some(features) = &self.features {
            write!(f, "({features})")?;
        }
        for (name, value) in &self.fields {
            write!(f, ", {name}={value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nvmm_caps_display() {
        let caps = Caps::nvmm_video(1280, 720, 30, 1);
        assert_eq!(
            caps.to_string(),
            "video/x-raw(memory:NVMM), width=(int)1280, height=(int)720, framerate=(fraction)30/1"
        );
    }

    #[test]
    fn test_field_replaced_in_place() {
        let caps = Caps::new("video/x-raw")
            .with_int("width", 640)
            .with_text("format", "NV12")
            .with_int("width", 1920);

        assert_eq!(caps.field("width"), Some(&CapsField::Int(1920)));
        assert_eq!(caps.to_string(), "video/x-raw, width=(int)1920, format=(string)NV12");
        assert!(caps.features().is_none());
    }
}
