//! Datatype libraries for `<data>` and `<value>` patterns.
//!
//! Two libraries are known: the built-in RelaxNG library (the empty URI),
//! with `string` and `token`, and a subset of the XML Schema datatypes.
//! Lexical checks follow the XML Schema rules closely enough for schema
//! validation; facets (`<param>`) are not applied.

use std::fmt;

/// Namespace URI of the XML Schema datatype library.
pub const XSD_DATATYPES: &str = "http://www.w3.org/2001/XMLSchema-datatypes";

/// A datatype a schema can refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Datatype {
    String,
    Token,
    NormalizedString,
    Boolean,
    Decimal,
    Integer,
    NonPositiveInteger,
    NegativeInteger,
    NonNegativeInteger,
    PositiveInteger,
    Long,
    Int,
    Short,
    Byte,
    UnsignedLong,
    UnsignedInt,
    UnsignedShort,
    UnsignedByte,
    Double,
    Float,
    Date,
    DateTime,
    Time,
    AnyUri,
    Name,
    NcName,
    NmToken,
    Id,
    IdRef,
    Language,
}

impl Datatype {
    /// Resolves a datatype name within a library URI.
    ///
    /// The built-in library (empty URI) only knows `string` and `token`.
    #[must_use]
    pub fn lookup(library: &str, name: &str) -> Option<Self> {
        match library {
            "" => match name {
                "string" => Some(Self::String),
                "token" => Some(Self::Token),
                _ => None,
            },
            XSD_DATATYPES => Self::xsd(name),
            _ => None,
        }
    }

    fn xsd(name: &str) -> Option<Self> {
        Some(match name {
            "string" => Self::String,
            "token" => Self::Token,
            "normalizedString" => Self::NormalizedString,
            "boolean" => Self::Boolean,
            "decimal" => Self::Decimal,
            "integer" => Self::Integer,
            "nonPositiveInteger" => Self::NonPositiveInteger,
            "negativeInteger" => Self::NegativeInteger,
            "nonNegativeInteger" => Self::NonNegativeInteger,
            "positiveInteger" => Self::PositiveInteger,
            "long" => Self::Long,
            "int" => Self::Int,
            "short" => Self::Short,
            "byte" => Self::Byte,
            "unsignedLong" => Self::UnsignedLong,
            "unsignedInt" => Self::UnsignedInt,
            "unsignedShort" => Self::UnsignedShort,
            "unsignedByte" => Self::UnsignedByte,
            "double" => Self::Double,
            "float" => Self::Float,
            "date" => Self::Date,
            "dateTime" => Self::DateTime,
            "time" => Self::Time,
            "anyURI" => Self::AnyUri,
            "Name" => Self::Name,
            "NCName" => Self::NcName,
            "NMTOKEN" => Self::NmToken,
            "ID" => Self::Id,
            "IDREF" => Self::IdRef,
            "language" => Self::Language,
            _ => return None,
        })
    }

    /// The local name of the datatype.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Token => "token",
            Self::NormalizedString => "normalizedString",
            Self::Boolean => "boolean",
            Self::Decimal => "decimal",
            Self::Integer => "integer",
            Self::NonPositiveInteger => "nonPositiveInteger",
            Self::NegativeInteger => "negativeInteger",
            Self::NonNegativeInteger => "nonNegativeInteger",
            Self::PositiveInteger => "positiveInteger",
            Self::Long => "long",
            Self::Int => "int",
            Self::Short => "short",
            Self::Byte => "byte",
            Self::UnsignedLong => "unsignedLong",
            Self::UnsignedInt => "unsignedInt",
            Self::UnsignedShort => "unsignedShort",
            Self::UnsignedByte => "unsignedByte",
            Self::Double => "double",
            Self::Float => "float",
            Self::Date => "date",
            Self::DateTime => "dateTime",
            Self::Time => "time",
            Self::AnyUri => "anyURI",
            Self::Name => "Name",
            Self::NcName => "NCName",
            Self::NmToken => "NMTOKEN",
            Self::Id => "ID",
            Self::IdRef => "IDREF",
            Self::Language => "language",
        }
    }

    /// Returns `true` if `value` is in the lexical space of the datatype.
    #[must_use]
    pub fn allows(self, value: &str) -> bool {
        let collapsed = collapse_whitespace(value);
        let v = collapsed.as_str();
        match self {
            Self::String | Self::Token | Self::NormalizedString => true,
            Self::Boolean => matches!(v, "true" | "false" | "1" | "0"),
            Self::Decimal => is_decimal(v),
            Self::Integer => integer_sign(v).is_some(),
            Self::NonPositiveInteger => matches!(integer_sign(v), Some(s) if s <= 0),
            Self::NegativeInteger => integer_sign(v) == Some(-1),
            Self::NonNegativeInteger => matches!(integer_sign(v), Some(s) if s >= 0),
            Self::PositiveInteger => integer_sign(v) == Some(1),
            Self::Long => in_range(v, i128::from(i64::MIN), i128::from(i64::MAX)),
            Self::Int => in_range(v, i128::from(i32::MIN), i128::from(i32::MAX)),
            Self::Short => in_range(v, i128::from(i16::MIN), i128::from(i16::MAX)),
            Self::Byte => in_range(v, i128::from(i8::MIN), i128::from(i8::MAX)),
            Self::UnsignedLong => in_range(v, 0, i128::from(u64::MAX)),
            Self::UnsignedInt => in_range(v, 0, i128::from(u32::MAX)),
            Self::UnsignedShort => in_range(v, 0, i128::from(u16::MAX)),
            Self::UnsignedByte => in_range(v, 0, i128::from(u8::MAX)),
            Self::Double | Self::Float => parse_float(v).is_some(),
            Self::Date => is_date(strip_timezone(v)),
            Self::DateTime => strip_timezone(v)
                .split_once('T')
                .is_some_and(|(date, time)| is_date(date) && is_time(time)),
            Self::Time => is_time(strip_timezone(v)),
            Self::AnyUri => !v.chars().any(|c| c.is_control()),
            Self::Name => is_name(v),
            Self::NcName | Self::Id | Self::IdRef => is_name(v) && !v.contains(':'),
            Self::NmToken => !v.is_empty() && v.chars().all(crate::parser::input::is_name_char),
            Self::Language => is_language(v),
        }
    }

    /// Compares two values in the value space of the datatype.
    ///
    /// Callers check [`Datatype::allows`] first; values outside the lexical
    /// space compare by their collapsed text.
    #[must_use]
    pub fn values_equal(self, a: &str, b: &str) -> bool {
        match self {
            Self::String => a == b,
            Self::NormalizedString => normalize_whitespace(a) == normalize_whitespace(b),
            Self::Boolean => {
                let truth = |v: &str| matches!(collapse_whitespace(v).as_str(), "true" | "1");
                truth(a) == truth(b)
            }
            Self::Double | Self::Float => {
                match (
                    parse_float(&collapse_whitespace(a)),
                    parse_float(&collapse_whitespace(b)),
                ) {
                    // NaN equals itself in the value space.
                    (Some(x), Some(y)) => x == y || (x.is_nan() && y.is_nan()),
                    _ => collapse_whitespace(a) == collapse_whitespace(b),
                }
            }
            Self::Decimal => {
                match (
                    canonical_decimal(&collapse_whitespace(a)),
                    canonical_decimal(&collapse_whitespace(b)),
                ) {
                    (Some(x), Some(y)) => x == y,
                    _ => collapse_whitespace(a) == collapse_whitespace(b),
                }
            }
            Self::Integer
            | Self::NonPositiveInteger
            | Self::NegativeInteger
            | Self::NonNegativeInteger
            | Self::PositiveInteger
            | Self::Long
            | Self::Int
            | Self::Short
            | Self::Byte
            | Self::UnsignedLong
            | Self::UnsignedInt
            | Self::UnsignedShort
            | Self::UnsignedByte => {
                match (
                    canonical_decimal(&collapse_whitespace(a)),
                    canonical_decimal(&collapse_whitespace(b)),
                ) {
                    (Some(x), Some(y)) => x == y,
                    _ => collapse_whitespace(a) == collapse_whitespace(b),
                }
            }
            _ => collapse_whitespace(a) == collapse_whitespace(b),
        }
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Trims and collapses runs of XML whitespace to single spaces.
#[must_use]
pub fn collapse_whitespace(value: &str) -> String {
    value
        .split(|c: char| matches!(c, ' ' | '\t' | '\n' | '\r'))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn normalize_whitespace(value: &str) -> String {
    value
        .chars()
        .map(|c| if matches!(c, '\t' | '\n' | '\r') { ' ' } else { c })
        .collect()
}

/// Returns the sign (-1, 0, 1) of a lexically valid integer.
fn integer_sign(value: &str) -> Option<i8> {
    let (negative, digits) = split_sign(value);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if digits.bytes().all(|b| b == b'0') {
        Some(0)
    } else if negative {
        Some(-1)
    } else {
        Some(1)
    }
}

fn in_range(value: &str, min: i128, max: i128) -> bool {
    if integer_sign(value).is_none() {
        return false;
    }
    let unsigned = value.strip_prefix('+').unwrap_or(value);
    unsigned
        .parse::<i128>()
        .is_ok_and(|n| (min..=max).contains(&n))
}

fn split_sign(value: &str) -> (bool, &str) {
    if let Some(rest) = value.strip_prefix('-') {
        (true, rest)
    } else {
        (false, value.strip_prefix('+').unwrap_or(value))
    }
}

fn is_decimal(value: &str) -> bool {
    let (_, body) = split_sign(value);
    let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));
    (!int_part.is_empty() || !frac_part.is_empty())
        && int_part.bytes().all(|b| b.is_ascii_digit())
        && frac_part.bytes().all(|b| b.is_ascii_digit())
}

/// Canonical `(negative, integer digits, fraction digits)` form of a decimal,
/// with leading and trailing zeros stripped.
fn canonical_decimal(value: &str) -> Option<(bool, String, String)> {
    if !is_decimal(value) {
        return None;
    }
    let (negative, body) = split_sign(value);
    let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));
    let int_part = int_part.trim_start_matches('0').to_owned();
    let frac_part = frac_part.trim_end_matches('0').to_owned();
    let is_zero = int_part.is_empty() && frac_part.is_empty();
    Some((negative && !is_zero, int_part, frac_part))
}

fn parse_float(value: &str) -> Option<f64> {
    match value {
        "INF" => return Some(f64::INFINITY),
        "-INF" => return Some(f64::NEG_INFINITY),
        "NaN" => return Some(f64::NAN),
        _ => {}
    }
    // Rust accepts spellings like "inf" and "infinity" that XML Schema does not.
    if value.is_empty()
        || !value
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E'))
    {
        return None;
    }
    value.parse::<f64>().ok()
}

fn strip_timezone(value: &str) -> &str {
    if let Some(s) = value.strip_suffix('Z') {
        return s;
    }
    if value.len() > 6 && value.is_char_boundary(value.len() - 6) {
        let tail = &value[value.len() - 6..];
        if (tail.starts_with('+') || tail.starts_with('-')) && tail.as_bytes().get(3) == Some(&b':')
        {
            return &value[..value.len() - 6];
        }
    }
    value
}

fn all_digits(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_digit())
}

fn is_date(value: &str) -> bool {
    let value = value.strip_prefix('-').unwrap_or(value);
    let parts: Vec<&str> = value.split('-').collect();
    let [year, month, day] = parts.as_slice() else {
        return false;
    };
    year.len() >= 4
        && year.bytes().all(|b| b.is_ascii_digit())
        && all_digits(month, 2)
        && all_digits(day, 2)
        && matches!(month.parse::<u8>(), Ok(1..=12))
        && matches!(day.parse::<u8>(), Ok(1..=31))
}

fn is_time(value: &str) -> bool {
    let parts: Vec<&str> = value.split(':').collect();
    let [hour, minute, second] = parts.as_slice() else {
        return false;
    };
    let (whole, fraction) = second.split_once('.').unwrap_or((second, "0"));
    all_digits(hour, 2)
        && all_digits(minute, 2)
        && all_digits(whole, 2)
        && !fraction.is_empty()
        && fraction.bytes().all(|b| b.is_ascii_digit())
        && matches!(hour.parse::<u8>(), Ok(0..=24))
        && matches!(minute.parse::<u8>(), Ok(0..=59))
        && matches!(whole.parse::<u8>(), Ok(0..=60))
}

fn is_name(value: &str) -> bool {
    let mut chars = value.chars();
    chars
        .next()
        .is_some_and(crate::parser::input::is_name_start_char)
        && chars.all(crate::parser::input::is_name_char)
}

fn is_language(value: &str) -> bool {
    let mut subtags = value.split('-');
    let primary_ok = subtags
        .next()
        .is_some_and(|s| (1..=8).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_alphabetic()));
    primary_ok
        && subtags.all(|s| (1..=8).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_alphanumeric()))
}
