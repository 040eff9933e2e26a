//! Shared types for the gaze pipeline

use serde::{Deserialize, Deserializer, Serialize};
use std::sync::OnceLock;
use std::time::Instant;

/// Newtype wrapper for zone IDs to provide type safety
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(pub String);

impl ZoneId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ZoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ZoneId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ZoneId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::borrow::Borrow<str> for ZoneId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Process-local origin for `Timestamp::now()`
static CLOCK_ORIGIN: OnceLock<Instant> = OnceLock::new();

/// Monotonic timestamp in milliseconds
///
/// Sensor timestamps are only required to be non-decreasing within one stream;
/// the absolute origin is meaningless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Milliseconds elapsed on the process monotonic clock
    pub fn now() -> Self {
        let origin = CLOCK_ORIGIN.get_or_init(Instant::now);
        Self(origin.elapsed().as_millis() as u64)
    }

    #[inline]
    pub fn as_millis(self) -> u64 {
        self.0
    }

    /// Elapsed milliseconds since `earlier`, or None if time went backwards
    #[inline]
    pub fn checked_since(self, earlier: Timestamp) -> Option<u64> {
        self.0.checked_sub(earlier.0)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Timestamp {
    fn from(ms: u64) -> Self {
        Self(ms)
    }
}

/// Accepts integer or fractional milliseconds (browser-style `performance.now()`)
impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::{self, Visitor};

        struct TimestampVisitor;

        impl<'de> Visitor<'de> for TimestampVisitor {
            type Value = Timestamp;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a non-negative millisecond timestamp")
            }

            fn visit_u64<E>(self, value: u64) -> Result<Timestamp, E>
            where
                E: de::Error,
            {
                Ok(Timestamp(value))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Timestamp, E>
            where
                E: de::Error,
            {
                u64::try_from(value)
                    .map(Timestamp)
                    .map_err(|_| E::custom(format!("negative timestamp {}", value)))
            }

            fn visit_f64<E>(self, value: f64) -> Result<Timestamp, E>
            where
                E: de::Error,
            {
                if !value.is_finite() || value < 0.0 {
                    return Err(E::custom(format!("invalid timestamp {}", value)));
                }
                Ok(Timestamp(value.round() as u64))
            }
        }

        deserializer.deserialize_any(TimestampVisitor)
    }
}

/// A single gaze/pointer sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub t: Timestamp,
}

impl Point {
    #[inline]
    pub fn new(x: f64, y: f64, t: impl Into<Timestamp>) -> Self {
        Self { x, y, t: t.into() }
    }

    /// Straight-line distance to another sample
    #[inline]
    pub fn distance_to(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Axis-aligned rectangle in the same coordinate space as `Point`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Bounds {
    #[inline]
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self { left, top, right, bottom }
    }

    /// Closed-interval containment on all four sides
    #[inline]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.left && x <= self.right && y >= self.top && y <= self.bottom
    }

    /// True if the rectangle is not inverted on either axis
    pub fn is_well_formed(&self) -> bool {
        self.left <= self.right && self.top <= self.bottom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_contains_edges() {
        let bounds = Bounds::new(0.0, 0.0, 100.0, 100.0);
        assert!(bounds.contains(0.0, 0.0));
        assert!(bounds.contains(100.0, 100.0));
        assert!(bounds.contains(50.0, 100.0));
        assert!(!bounds.contains(100.1, 50.0));
        assert!(!bounds.contains(50.0, -0.1));
    }

    #[test]
    fn test_inverted_bounds_contain_nothing() {
        let bounds = Bounds::new(100.0, 0.0, 0.0, 100.0);
        assert!(!bounds.is_well_formed());
        assert!(!bounds.contains(50.0, 50.0));
    }

    #[test]
    fn test_point_distance() {
        let a = Point::new(0.0, 0.0, 0);
        let b = Point::new(3.0, 4.0, 10);
        assert_eq!(a.distance_to(&b), 5.0);
        assert!(a.is_finite());
        assert!(!Point::new(f64::NAN, 0.0, 0).is_finite());
        assert!(!Point::new(0.0, f64::INFINITY, 0).is_finite());
    }

    #[test]
    fn test_timestamp_deserialize_integer_and_fraction() {
        let p: Point = serde_json::from_str(r#"{"x":1,"y":2,"t":1200}"#).unwrap();
        assert_eq!(p.t, Timestamp(1200));

        let p: Point = serde_json::from_str(r#"{"x":1.5,"y":2,"t":16.6}"#).unwrap();
        assert_eq!(p.t, Timestamp(17));
        assert_eq!(p.x, 1.5);
    }

    #[test]
    fn test_timestamp_rejects_negative() {
        assert!(serde_json::from_str::<Timestamp>("-5").is_err());
        assert!(serde_json::from_str::<Timestamp>("-0.5").is_err());
    }

    #[test]
    fn test_timestamp_checked_since() {
        assert_eq!(Timestamp(1200).checked_since(Timestamp(0)), Some(1200));
        assert_eq!(Timestamp(100).checked_since(Timestamp(200)), None);
    }

    #[test]
    fn test_timestamp_now_is_monotonic() {
        let a = Timestamp::now();
        let b = Timestamp::now();
        assert!(b >= a);
    }

    #[test]
    fn test_zone_id_display() {
        assert_eq!(ZoneId::from("PAY").to_string(), "PAY");
        assert_eq!(ZoneId::new(String::from("TERMS")).as_str(), "TERMS");
    }
}
