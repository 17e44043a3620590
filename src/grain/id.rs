//! Grain identity and storage key encoding.
//!
//! A grain is addressed by its type name plus a key of one of five shapes.
//! The storage key is
//!
//! ```text
//! {len}:{grain_type}/{tag}:{body}
//! ```
//!
//! where `len` is the byte length of `grain_type` and `tag` selects the body
//! grammar:
//!
//! | tag  | shape                         | body              |
//! |------|-------------------------------|-------------------|
//! | `g`  | [`GrainKey::Guid`]            | `{uuid}`          |
//! | `i`  | [`GrainKey::Integer`]         | `{int}`           |
//! | `s`  | [`GrainKey::String`]          | `{string}`        |
//! | `gx` | [`GrainKey::GuidCompound`]    | `{uuid}+{ext}`    |
//! | `ix` | [`GrainKey::IntegerCompound`] | `{int}+{ext}`     |
//!
//! UUIDs are lowercase hyphenated and integers are plain decimal, so neither
//! contains `+`. The length prefix bounds the type name, so type names may
//! contain any character. Together these make the encoding injective, and
//! [`GrainId::from_storage_key`] inverts it.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Error returned when a grain id or storage key cannot be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GrainIdError {
    #[error("malformed grain id {0:?}")]
    Malformed(String),

    #[error("unknown key shape {0:?}")]
    UnknownShape(String),

    #[error("invalid key body {body:?} for shape {tag:?}")]
    InvalidBody { tag: String, body: String },
}

/// The key part of a grain identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GrainKey {
    Guid(Uuid),
    Integer(i64),
    String(String),
    GuidCompound(Uuid, String),
    IntegerCompound(i64, String),
}

impl GrainKey {
    fn tag(&self) -> &'static str {
        match self {
            GrainKey::Guid(_) => "g",
            GrainKey::Integer(_) => "i",
            GrainKey::String(_) => "s",
            GrainKey::GuidCompound(..) => "gx",
            GrainKey::IntegerCompound(..) => "ix",
        }
    }

    fn write_body(&self, out: &mut String) {
        use std::fmt::Write;
        // Writing into a String cannot fail.
        let _ = match self {
            GrainKey::Guid(id) => write!(out, "{}", id.hyphenated()),
            GrainKey::Integer(n) => write!(out, "{n}"),
            GrainKey::String(s) => write!(out, "{s}"),
            GrainKey::GuidCompound(id, ext) => write!(out, "{}+{ext}", id.hyphenated()),
            GrainKey::IntegerCompound(n, ext) => write!(out, "{n}+{ext}"),
        };
    }

    /// Parse a key from its shape tag and body.
    fn parse(tag: &str, body: &str) -> Result<Self, GrainIdError> {
        let invalid = || GrainIdError::InvalidBody {
            tag: tag.to_string(),
            body: body.to_string(),
        };

        match tag {
            "g" => parse_uuid(body).map(GrainKey::Guid).ok_or_else(invalid),
            "i" => parse_int(body).map(GrainKey::Integer).ok_or_else(invalid),
            "s" => Ok(GrainKey::String(body.to_string())),
            "gx" => {
                let (id, ext) = body.split_once('+').ok_or_else(invalid)?;
                let id = parse_uuid(id).ok_or_else(invalid)?;
                Ok(GrainKey::GuidCompound(id, ext.to_string()))
            }
            "ix" => {
                let (n, ext) = body.split_once('+').ok_or_else(invalid)?;
                let n = parse_int(n).ok_or_else(invalid)?;
                Ok(GrainKey::IntegerCompound(n, ext.to_string()))
            }
            other => Err(GrainIdError::UnknownShape(other.to_string())),
        }
    }
}

/// Only the canonical lowercase hyphenated form, so each UUID has one encoding.
fn parse_uuid(s: &str) -> Option<Uuid> {
    let id = Uuid::parse_str(s).ok()?;
    (id.hyphenated().to_string() == s).then_some(id)
}

/// Only canonical decimal (no `+`, no leading zeros), so each integer has one encoding.
fn parse_int(s: &str) -> Option<i64> {
    let n: i64 = s.parse().ok()?;
    (n.to_string() == s).then_some(n)
}

/// Identity of a grain: its type name and key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GrainId {
    pub grain_type: String,
    pub key: GrainKey,
}

impl GrainId {
    pub fn new(grain_type: impl Into<String>, key: GrainKey) -> Self {
        Self {
            grain_type: grain_type.into(),
            key,
        }
    }

    pub fn from_guid(grain_type: impl Into<String>, id: Uuid) -> Self {
        Self::new(grain_type, GrainKey::Guid(id))
    }

    pub fn from_integer(grain_type: impl Into<String>, n: i64) -> Self {
        Self::new(grain_type, GrainKey::Integer(n))
    }

    pub fn from_string(grain_type: impl Into<String>, key: impl Into<String>) -> Self {
        Self::new(grain_type, GrainKey::String(key.into()))
    }

    /// Encode this identity as the primary key of its storage row.
    pub fn storage_key(&self) -> String {
        let mut out = format!(
            "{}:{}/{}:",
            self.grain_type.len(),
            self.grain_type,
            self.key.tag()
        );
        self.key.write_body(&mut out);
        out
    }

    /// Decode a storage key produced by [`GrainId::storage_key`].
    pub fn from_storage_key(storage_key: &str) -> Result<Self, GrainIdError> {
        let malformed = || GrainIdError::Malformed(storage_key.to_string());

        let (len, rest) = storage_key.split_once(':').ok_or_else(malformed)?;
        let len = parse_int(len)
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(malformed)?;
        let grain_type = rest.get(..len).ok_or_else(malformed)?;
        let rest = rest.get(len..).ok_or_else(malformed)?;
        let rest = rest.strip_prefix('/').ok_or_else(malformed)?;
        let (tag, body) = rest.split_once(':').ok_or_else(malformed)?;

        Ok(Self::new(grain_type, GrainKey::parse(tag, body)?))
    }
}

/// Human-readable form `{grain_type}/{tag}:{body}`.
impl fmt::Display for GrainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut body = String::new();
        self.key.write_body(&mut body);
        write!(f, "{}/{}:{}", self.grain_type, self.key.tag(), body)
    }
}

/// Parses the human-readable form. The type name ends at the first `/`.
impl FromStr for GrainId {
    type Err = GrainIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || GrainIdError::Malformed(s.to_string());

        let (grain_type, rest) = s.split_once('/').ok_or_else(malformed)?;
        if grain_type.is_empty() {
            return Err(malformed());
        }
        let (tag, body) = rest.split_once(':').ok_or_else(malformed)?;

        Ok(Self::new(grain_type, GrainKey::parse(tag, body)?))
    }
}
