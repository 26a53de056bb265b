//! MPLS label values and label operation classes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::MplsError;
use crate::nexthop::AddressFamily;

/// A 20-bit MPLS label value.
///
/// Construction always validates the range, so every `MplsLabel` in the
/// tables is a value that can be put on the wire.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u32", into = "u32")]
pub struct MplsLabel(u32);

impl MplsLabel {
    /// IPv4 explicit null.
    pub const IPV4_EXPLICIT_NULL: Self = Self(0);
    /// Router alert.
    pub const ROUTER_ALERT: Self = Self(1);
    /// IPv6 explicit null.
    pub const IPV6_EXPLICIT_NULL: Self = Self(2);
    /// Implicit null: the previous hop pops instead of swapping (PHP).
    pub const IMPLICIT_NULL: Self = Self(3);
    /// Entropy label indicator.
    pub const ENTROPY_INDICATOR: Self = Self(7);
    /// Generic associated channel label.
    pub const GAL: Self = Self(13);
    /// OAM alert.
    pub const OAM_ALERT: Self = Self(14);
    /// Extension label.
    pub const EXTENSION: Self = Self(15);

    /// First label value that is not reserved.
    pub const MIN_UNRESERVED: u32 = 16;
    /// Largest 20-bit label value.
    pub const MAX: u32 = 1_048_575;

    /// Creates a label, rejecting values that do not fit in 20 bits.
    pub fn new(value: u32) -> Result<Self, MplsError> {
        if value > Self::MAX {
            return Err(MplsError::InvalidLabel(value));
        }
        Ok(Self(value))
    }

    /// Returns the raw label value.
    pub const fn value(&self) -> u32 {
        self.0
    }

    /// Returns true for values 0-15.
    pub const fn is_reserved(&self) -> bool {
        self.0 < Self::MIN_UNRESERVED
    }

    /// Returns true for the implicit-null value.
    pub const fn is_implicit_null(&self) -> bool {
        self.0 == Self::IMPLICIT_NULL.0
    }

    /// Explicit null for the given address family.
    pub const fn explicit_null(family: AddressFamily) -> Self {
        match family {
            AddressFamily::Ipv4 => Self::IPV4_EXPLICIT_NULL,
            AddressFamily::Ipv6 => Self::IPV6_EXPLICIT_NULL,
        }
    }

    /// Parses an outgoing label.
    ///
    /// Accepts a decimal value, `implicit-null`, or `explicit-null` (which
    /// resolves according to the nexthop family).
    pub fn parse_out_label(s: &str, family: AddressFamily) -> Result<Self, MplsError> {
        match s.trim() {
            "explicit-null" => Ok(Self::explicit_null(family)),
            other => other.parse(),
        }
    }

    /// Returns the label operation class this value implies as an out label.
    pub fn op_class(&self) -> LabelOpClass {
        LabelOpClass::from_out_label(*self)
    }
}

impl fmt::Display for MplsLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_implicit_null() {
            write!(f, "implicit-null")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl FromStr for MplsLabel {
    type Err = MplsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "implicit-null" {
            return Ok(Self::IMPLICIT_NULL);
        }
        let value: u32 = s
            .parse()
            .map_err(|_| MplsError::invalid_config("label", format!("not a label: {}", s)))?;
        Self::new(value)
    }
}

impl TryFrom<u32> for MplsLabel {
    type Error = MplsError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MplsLabel> for u32 {
    fn from(label: MplsLabel) -> Self {
        label.0
    }
}

/// Class of label operation performed by one NHLFE.
///
/// Hardware requires every ECMP member of one incoming label to share a
/// class: either all swap, or all pop (penultimate-hop popping).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LabelOpClass {
    /// Swap to an explicit outgoing label.
    Swap,
    /// Pop and forward (out label is implicit-null).
    ImplicitNull,
}

impl LabelOpClass {
    /// Classifies an outgoing label.
    pub fn from_out_label(label: MplsLabel) -> Self {
        if label.is_implicit_null() {
            LabelOpClass::ImplicitNull
        } else {
            LabelOpClass::Swap
        }
    }

    /// Returns the class name for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            LabelOpClass::Swap => "swap",
            LabelOpClass::ImplicitNull => "php",
        }
    }
}

/// Range of incoming labels accepted for static bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelRange {
    /// Lowest label (inclusive).
    pub min: u32,
    /// Highest label (inclusive).
    pub max: u32,
}

impl LabelRange {
    /// Creates a range, validating bounds against the label space.
    pub fn new(min: u32, max: u32) -> Result<Self, MplsError> {
        if min < MplsLabel::MIN_UNRESERVED {
            return Err(MplsError::invalid_config(
                "label_range",
                format!("min {} overlaps reserved labels", min),
            ));
        }
        if max > MplsLabel::MAX || min > max {
            return Err(MplsError::invalid_config(
                "label_range",
                format!("invalid range {}-{}", min, max),
            ));
        }
        Ok(Self { min, max })
    }

    /// Returns true if the label lies in the range.
    pub fn contains(&self, label: MplsLabel) -> bool {
        (self.min..=self.max).contains(&label.value())
    }

    /// Validates a label against the range.
    pub fn check(&self, label: MplsLabel) -> Result<(), MplsError> {
        if self.contains(label) {
            Ok(())
        } else {
            Err(MplsError::LabelOutOfRange {
                label,
                min: self.min,
                max: self.max,
            })
        }
    }
}

impl Default for LabelRange {
    fn default() -> Self {
        Self {
            min: MplsLabel::MIN_UNRESERVED,
            max: MplsLabel::MAX,
        }
    }
}
