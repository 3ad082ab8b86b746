// used for persistence
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};

// used for timestamp properties
use chrono::{DateTime, NaiveDate, NaiveDateTime};
// used for decimal numbers
use bigdecimal::BigDecimal;
// used for binary properties
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};

// used when parsing a string to a number or decimal
use std::str::FromStr;
// used to print out readable forms of a value
use std::fmt;
use std::ops;

use crate::error::{Result, SeedlingError};
use crate::model::TypeInfo;

pub const ENUM_PREFIX: &str = "Enum.";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Declared type of a property value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueKind {
    String,
    Int,
    Bool,
    Byte,
    Decimal,
    Double,
    DateTime,
    Binary,
    /// An enumeration looked up by name relative to the root namespace.
    Enum(String),
    /// `name` or `name.subproperty`, resolved when the owning entity is constructed.
    Reference,
}

impl ValueKind {
    /// Parses a `type` attribute. Matching is case-insensitive and accepts the
    /// aliases commonly found in data documents.
    pub fn from_type_name(name: &str) -> Option<ValueKind> {
        let name = name.trim();
        if name.is_empty() {
            return Some(ValueKind::String);
        }
        if let Some(enum_type) = name.strip_prefix(ENUM_PREFIX) {
            return Some(ValueKind::Enum(enum_type.to_string()));
        }
        let kind = match name.to_ascii_lowercase().as_str() {
            "string" => ValueKind::String,
            "int32" | "int64" | "int" | "integer" => ValueKind::Int,
            "boolean" | "bool" => ValueKind::Bool,
            "byte" => ValueKind::Byte,
            "decimal" => ValueKind::Decimal,
            "double" => ValueKind::Double,
            "datetime" => ValueKind::DateTime,
            "binary" | "byte[]" => ValueKind::Binary,
            "reference" => ValueKind::Reference,
            _ => return None,
        };
        Some(kind)
    }
    /// Canonical name, the one written back by the serialized form.
    pub fn type_name(&self) -> String {
        match self {
            ValueKind::String => "String".into(),
            ValueKind::Int => "Int32".into(),
            ValueKind::Bool => "Boolean".into(),
            ValueKind::Byte => "Byte".into(),
            ValueKind::Decimal => "Decimal".into(),
            ValueKind::Double => "Double".into(),
            ValueKind::DateTime => "DateTime".into(),
            ValueKind::Binary => "Binary".into(),
            ValueKind::Enum(name) => format!("{ENUM_PREFIX}{name}"),
            ValueKind::Reference => "Reference".into(),
        }
    }
}
impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Read-only lookups available while coercing enum values.
pub trait ResolutionContext {
    /// Resolves a type name relative to the document namespace and assembly.
    fn resolve_type(&self, name: &str) -> Option<TypeInfo>;
}

// Special types below
#[derive(Eq, PartialEq, Hash, PartialOrd, Ord, Clone, Debug)]
pub struct Decimal(BigDecimal);

impl Decimal {
    pub fn from_str(s: &str) -> Option<Decimal> {
        match BigDecimal::from_str(s) {
            Ok(decimal) => Some(Decimal(decimal)),
            _ => None,
        }
    }
}
impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl ops::Deref for Decimal {
    type Target = BigDecimal;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
impl From<BigDecimal> for Decimal {
    fn from(d: BigDecimal) -> Self {
        Decimal(d)
    }
}

/// A property value after coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    String(String),
    Int(i64),
    Bool(bool),
    Byte(u8),
    Decimal(Decimal),
    Double(f64),
    DateTime(NaiveDateTime),
    Binary(Vec<u8>),
    Enum { type_name: String, member: String },
    Reference(String),
}

impl TypedValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            TypedValue::String(_) => ValueKind::String,
            TypedValue::Int(_) => ValueKind::Int,
            TypedValue::Bool(_) => ValueKind::Bool,
            TypedValue::Byte(_) => ValueKind::Byte,
            TypedValue::Decimal(_) => ValueKind::Decimal,
            TypedValue::Double(_) => ValueKind::Double,
            TypedValue::DateTime(_) => ValueKind::DateTime,
            TypedValue::Binary(_) => ValueKind::Binary,
            TypedValue::Enum { type_name, .. } => ValueKind::Enum(type_name.clone()),
            TypedValue::Reference(_) => ValueKind::Reference,
        }
    }
    /// The raw textual form that coerces back into this value.
    pub fn to_raw(&self) -> String {
        match self {
            TypedValue::DateTime(d) => d.format(TIMESTAMP_FORMAT).to_string(),
            TypedValue::Binary(bytes) => BASE64.encode(bytes),
            other => other.to_string(),
        }
    }
    /// Rebuilds a value read back from the store.
    pub fn from_stored(kind: &ValueKind, value: ValueRef<'_>) -> Result<TypedValue> {
        let typed = match kind {
            ValueKind::String => TypedValue::String(stored_text(value)?),
            ValueKind::Int => TypedValue::Int(stored_integer(value)?),
            ValueKind::Bool => TypedValue::Bool(stored_integer(value)? != 0),
            ValueKind::Byte => TypedValue::Byte(u8::try_from(stored_integer(value)?).map_err(
                |e| SeedlingError::Store(format!("stored byte out of range: {e}")),
            )?),
            ValueKind::Decimal => {
                let text = stored_text(value)?;
                TypedValue::Decimal(Decimal::from_str(&text).ok_or_else(|| {
                    SeedlingError::Store(format!("stored decimal is malformed: {text}"))
                })?)
            }
            ValueKind::Double => TypedValue::Double(
                value
                    .as_f64()
                    .or_else(|_| value.as_i64().map(|i| i as f64))
                    .map_err(|e| SeedlingError::Store(e.to_string()))?,
            ),
            ValueKind::DateTime => {
                let text = stored_text(value)?;
                TypedValue::DateTime(parse_timestamp(&text).ok_or_else(|| {
                    SeedlingError::Store(format!("stored timestamp is malformed: {text}"))
                })?)
            }
            ValueKind::Binary => TypedValue::Binary(
                value
                    .as_blob()
                    .map_err(|e| SeedlingError::Store(e.to_string()))?
                    .to_vec(),
            ),
            ValueKind::Enum(type_name) => TypedValue::Enum {
                type_name: type_name.clone(),
                member: stored_text(value)?,
            },
            ValueKind::Reference => TypedValue::Reference(stored_text(value)?),
        };
        Ok(typed)
    }
}
impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TypedValue::String(s) => write!(f, "{s}"),
            TypedValue::Int(i) => write!(f, "{i}"),
            TypedValue::Bool(b) => write!(f, "{b}"),
            TypedValue::Byte(b) => write!(f, "{b}"),
            TypedValue::Decimal(d) => write!(f, "{d}"),
            TypedValue::Double(d) => write!(f, "{d}"),
            TypedValue::DateTime(d) => write!(f, "{}", d.format(TIMESTAMP_FORMAT)),
            TypedValue::Binary(bytes) => write!(f, "<{} bytes>", bytes.len()),
            TypedValue::Enum { member, .. } => write!(f, "{member}"),
            TypedValue::Reference(r) => write!(f, "{r}"),
        }
    }
}
impl ToSql for TypedValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            TypedValue::String(s) => ToSqlOutput::from(s.as_str()),
            TypedValue::Int(i) => ToSqlOutput::from(*i),
            TypedValue::Bool(b) => ToSqlOutput::from(i64::from(*b)),
            TypedValue::Byte(b) => ToSqlOutput::from(i64::from(*b)),
            TypedValue::Decimal(d) => ToSqlOutput::from(d.to_string()),
            TypedValue::Double(d) => ToSqlOutput::from(*d),
            TypedValue::DateTime(_) => ToSqlOutput::from(self.to_raw()),
            TypedValue::Binary(bytes) => ToSqlOutput::from(bytes.as_slice()),
            TypedValue::Enum { member, .. } => ToSqlOutput::from(member.as_str()),
            TypedValue::Reference(r) => ToSqlOutput::from(r.as_str()),
        })
    }
}

fn stored_text(value: ValueRef<'_>) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .map_err(|e| SeedlingError::Store(e.to_string()))
}
fn stored_integer(value: ValueRef<'_>) -> Result<i64> {
    value.as_i64().map_err(|e| SeedlingError::Store(e.to_string()))
}

/// Accepts RFC 3339, ISO date-times with `T` or a space, and bare dates.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    for format in [TIMESTAMP_FORMAT, "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Coerces the raw text of a property into its declared kind.
///
/// `element` is the serialized form of the owning entity and only ends up in
/// error messages. Reference values are kept verbatim; they are resolved
/// when the entity is constructed.
pub fn coerce(
    raw: &str,
    kind: &ValueKind,
    context: &dyn ResolutionContext,
    element: &str,
) -> Result<TypedValue> {
    let failed = || SeedlingError::PropertyCoercion {
        value: raw.to_string(),
        kind: kind.type_name(),
        element: element.to_string(),
    };
    let trimmed = raw.trim();
    let value = match kind {
        ValueKind::String => TypedValue::String(raw.to_string()),
        ValueKind::Int => TypedValue::Int(trimmed.parse().map_err(|_| failed())?),
        ValueKind::Bool => match trimmed.to_ascii_lowercase().as_str() {
            "true" => TypedValue::Bool(true),
            "false" => TypedValue::Bool(false),
            _ => return Err(failed()),
        },
        ValueKind::Byte => TypedValue::Byte(trimmed.parse().map_err(|_| failed())?),
        ValueKind::Decimal => TypedValue::Decimal(Decimal::from_str(trimmed).ok_or_else(failed)?),
        // NaN and infinities do not survive a round trip through the text form
        ValueKind::Double => TypedValue::Double(
            trimmed
                .parse::<f64>()
                .ok()
                .filter(|d| d.is_finite())
                .ok_or_else(failed)?,
        ),
        ValueKind::DateTime => TypedValue::DateTime(parse_timestamp(trimmed).ok_or_else(failed)?),
        ValueKind::Binary => {
            let compact: String = trimmed.chars().filter(|c| !c.is_ascii_whitespace()).collect();
            TypedValue::Binary(BASE64.decode(compact).map_err(|_| failed())?)
        }
        ValueKind::Enum(type_name) => match context.resolve_type(type_name) {
            Some(TypeInfo::Enum(def)) => {
                if !def.has_member(raw) {
                    return Err(failed());
                }
                TypedValue::Enum {
                    type_name: type_name.clone(),
                    member: raw.to_string(),
                }
            }
            _ => {
                return Err(SeedlingError::TypeResolution {
                    type_name: kind.type_name(),
                    element: element.to_string(),
                });
            }
        },
        ValueKind::Reference => TypedValue::Reference(raw.to_string()),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EnumDef, TypeInfo};
    use std::sync::Arc;

    struct Colors;
    impl ResolutionContext for Colors {
        fn resolve_type(&self, name: &str) -> Option<TypeInfo> {
            (name == "Color").then(|| {
                TypeInfo::Enum(Arc::new(EnumDef::new("Color", ["Red", "Green"])))
            })
        }
    }

    #[test]
    fn scalars_parse_invariantly() {
        assert_eq!(coerce(" 42 ", &ValueKind::Int, &Colors, "").unwrap(), TypedValue::Int(42));
        assert_eq!(coerce("True", &ValueKind::Bool, &Colors, "").unwrap(), TypedValue::Bool(true));
        assert_eq!(coerce("255", &ValueKind::Byte, &Colors, "").unwrap(), TypedValue::Byte(255));
        assert_eq!(coerce("2.5", &ValueKind::Double, &Colors, "").unwrap(), TypedValue::Double(2.5));
        let price = coerce("125.20", &ValueKind::Decimal, &Colors, "").unwrap();
        assert_eq!(price.to_raw(), "125.20");
        let blob = coerce("aGVs\n bG8=", &ValueKind::Binary, &Colors, "").unwrap();
        assert_eq!(blob, TypedValue::Binary(b"hello".to_vec()));
    }

    #[test]
    fn strings_and_references_are_verbatim() {
        assert_eq!(
            coerce("  padded ", &ValueKind::String, &Colors, "").unwrap(),
            TypedValue::String("  padded ".into())
        );
        assert_eq!(
            coerce("a1.Code", &ValueKind::Reference, &Colors, "").unwrap(),
            TypedValue::Reference("a1.Code".into())
        );
    }

    #[test]
    fn malformed_values_carry_context() {
        let err = coerce("256", &ValueKind::Byte, &Colors, "<entity class=\"X\" />").unwrap_err();
        match err {
            SeedlingError::PropertyCoercion { value, kind, element } => {
                assert_eq!(value, "256");
                assert_eq!(kind, "Byte");
                assert!(element.contains("class=\"X\""));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(coerce("yes", &ValueKind::Bool, &Colors, "").is_err());
        assert!(coerce("not base64!", &ValueKind::Binary, &Colors, "").is_err());
        for text in ["NaN", "inf", "-infinity"] {
            assert!(coerce(text, &ValueKind::Double, &Colors, "").is_err(), "{text}");
        }
    }

    #[test]
    fn timestamps_accept_common_layouts() {
        for text in ["2024-03-01T10:20:30", "2024-03-01 10:20:30", "2024-03-01T10:20:30Z"] {
            let value = coerce(text, &ValueKind::DateTime, &Colors, "").unwrap();
            assert_eq!(value.to_raw(), "2024-03-01T10:20:30");
        }
        let midnight = coerce("2024-03-01", &ValueKind::DateTime, &Colors, "").unwrap();
        assert_eq!(midnight.to_raw(), "2024-03-01T00:00:00");
    }

    #[test]
    fn enums_resolve_case_sensitively() {
        let kind = ValueKind::Enum("Color".into());
        assert_eq!(
            coerce("Red", &kind, &Colors, "").unwrap(),
            TypedValue::Enum { type_name: "Color".into(), member: "Red".into() }
        );
        assert!(matches!(
            coerce("red", &kind, &Colors, ""),
            Err(SeedlingError::PropertyCoercion { .. })
        ));
        assert!(matches!(
            coerce("Red", &ValueKind::Enum("Shade".into()), &Colors, ""),
            Err(SeedlingError::TypeResolution { .. })
        ));
    }

    #[test]
    fn type_names_accept_aliases() {
        assert_eq!(ValueKind::from_type_name("integer"), Some(ValueKind::Int));
        assert_eq!(ValueKind::from_type_name("BOOL"), Some(ValueKind::Bool));
        assert_eq!(ValueKind::from_type_name("Byte[]"), Some(ValueKind::Binary));
        assert_eq!(ValueKind::from_type_name("Enum.Color"), Some(ValueKind::Enum("Color".into())));
        assert_eq!(ValueKind::from_type_name("Quaternion"), None);
    }
}
