//! Serialization helpers for the speech service wire format.

use chrono::{DateTime, Duration, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serializer};
use std::fmt::{self, Write};
use std::marker::PhantomData;

/// Enumerations that travel as their name but may arrive as an index
pub trait WireEnum: Sized {
    const TYPE_NAME: &'static str;

    fn from_index(index: u64) -> Option<Self>;
    fn from_name(name: &str) -> Option<Self>;
}

/// Accepts either the string name (any case) or the numeric index
pub struct EnumVisitor<T>(PhantomData<T>);

impl<T> EnumVisitor<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<'de, T: WireEnum> Visitor<'de> for EnumVisitor<T> {
    type Value = T;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "a {} name or index", T::TYPE_NAME)
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<T, E> {
        T::from_name(value)
            .ok_or_else(|| E::custom(format!("unknown {} `{}`", T::TYPE_NAME, value)))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<T, E> {
        T::from_index(value)
            .ok_or_else(|| E::custom(format!("{} index {} out of range", T::TYPE_NAME, value)))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<T, E> {
        u64::try_from(value)
            .map_err(|_| E::custom(format!("negative {} index {}", T::TYPE_NAME, value)))
            .and_then(|index| self.visit_u64(index))
    }
}

/// Declares an enumeration with the service's enum wire rules
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            const VARIANTS: &'static [$name] = &[$($name::$variant),+];

            /// Wire name of this value
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => stringify!($variant)),+
                }
            }
        }

        impl $crate::protocol::wire::WireEnum for $name {
            const TYPE_NAME: &'static str = stringify!($name);

            fn from_index(index: u64) -> Option<Self> {
                usize::try_from(index)
                    .ok()
                    .and_then(|index| Self::VARIANTS.get(index).copied())
            }

            fn from_name(name: &str) -> Option<Self> {
                Self::VARIANTS
                    .iter()
                    .copied()
                    .find(|variant| variant.as_str().eq_ignore_ascii_case(name))
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                deserializer.deserialize_any($crate::protocol::wire::EnumVisitor::<$name>::new())
            }
        }
    };
}

pub(crate) use wire_enum;

/// Date format used on outgoing payloads
pub const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// `Option<DateTime<Utc>>` written as `yyyy-MM-ddTHH:mm:ssZ`, read as any RFC 3339 timestamp
pub mod timestamp {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(date) => serializer.serialize_str(&date.format(DATE_FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|text| {
                DateTime::parse_from_rfc3339(&text)
                    .map(|date| date.with_timezone(&Utc))
                    .map_err(|e| <D::Error as de::Error>::custom(format!("invalid timestamp `{}`: {}", text, e)))
            })
            .transpose()
    }
}

/// `Option<chrono::Duration>` written as ISO-8601, read as ISO-8601 or `d.hh:mm:ss`
pub mod duration {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_str(&format_duration(duration)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|text| {
                parse_duration(&text)
                    .ok_or_else(|| <D::Error as de::Error>::custom(format!("invalid duration `{}`", text)))
            })
            .transpose()
    }
}

/// Format a duration as ISO-8601 with whole seconds (`P1D`, `PT12H`, `PT1M30S`)
pub fn format_duration(duration: &Duration) -> String {
    let total = duration.num_seconds().max(0);
    let days = total / 86_400;
    let hours = total % 86_400 / 3_600;
    let minutes = total % 3_600 / 60;
    let seconds = total % 60;

    let mut out = String::from("P");
    if days > 0 {
        let _ = write!(out, "{}D", days);
    }
    if days == 0 || hours > 0 || minutes > 0 || seconds > 0 {
        out.push('T');
        if hours > 0 {
            let _ = write!(out, "{}H", hours);
        }
        if minutes > 0 {
            let _ = write!(out, "{}M", minutes);
        }
        if seconds > 0 || (hours == 0 && minutes == 0) {
            let _ = write!(out, "{}S", seconds);
        }
    }
    out
}

/// Parse an ISO-8601 duration or a .NET `[-][d.]hh:mm:ss[.fff]` time span
pub fn parse_duration(text: &str) -> Option<Duration> {
    let text = text.trim();
    match text.strip_prefix('P') {
        Some(rest) => parse_iso8601(rest),
        None => parse_timespan(text),
    }
}

fn parse_iso8601(rest: &str) -> Option<Duration> {
    let (date, time) = match rest.split_once('T') {
        Some((date, time)) => (date, Some(time)),
        None => (rest, None),
    };
    if date.is_empty() && time.is_none() {
        return None;
    }

    let mut millis = parse_designators(date, &[('W', 604_800_000), ('D', 86_400_000)])?;
    if let Some(time) = time {
        if time.is_empty() {
            return None;
        }
        let time = parse_designators(time, &[('H', 3_600_000), ('M', 60_000), ('S', 1_000)])?;
        millis = millis.checked_add(time)?;
    }
    Duration::try_milliseconds(millis)
}

// Designators must appear in the given order, each at most once.
fn parse_designators(mut text: &str, units: &[(char, i64)]) -> Option<i64> {
    let mut total = 0i64;
    let mut remaining = units.iter();
    while !text.is_empty() {
        let end = text.find(|c: char| c.is_ascii_alphabetic())?;
        let value: f64 = text[..end].parse().ok()?;
        let designator = text[end..].chars().next()?;
        let (_, scale) = remaining.find(|(unit, _)| *unit == designator)?;
        total = total.checked_add(scaled_millis(value, *scale)?)?;
        text = &text[end + designator.len_utf8()..];
    }
    Some(total)
}

fn parse_timespan(text: &str) -> Option<Duration> {
    let (negative, text) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };

    let mut parts = text.split(':');
    let head = parts.next()?;
    let minutes: i64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }

    let (days, hours): (i64, i64) = match head.split_once('.') {
        Some((days, hours)) => (days.parse().ok()?, hours.parse().ok()?),
        None => (0, head.parse().ok()?),
    };

    let millis = days
        .checked_mul(24)?
        .checked_add(hours)?
        .checked_mul(60)?
        .checked_add(minutes)?
        .checked_mul(60_000)?
        .checked_add(scaled_millis(seconds, 1_000)?)?;
    Duration::try_milliseconds(if negative { millis.checked_neg()? } else { millis })
}

/// `value * scale` rounded to whole milliseconds, `None` when it does not fit an `i64`
fn scaled_millis(value: f64, scale: i64) -> Option<i64> {
    let millis = (value * scale as f64).round();
    // `i64::MAX as f64` rounds up to 2^63, which is already out of range
    (millis.is_finite() && millis >= i64::MIN as f64 && millis < i64::MAX as f64).then_some(millis as i64)
}
