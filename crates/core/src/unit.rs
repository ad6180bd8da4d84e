//! Measurement units for amount claims.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::UnitError;

/// The closed enumeration of measurement units, encoded as short string
/// tags. `@` denotes a custom, non-comparable unit and never participates in
/// numeric filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    #[serde(rename = "@")]
    Custom,
    #[serde(rename = "1")]
    None,
    #[serde(rename = "/")]
    Ratio,
    #[serde(rename = "kg")]
    Kilogram,
    #[serde(rename = "kg/m³")]
    KilogramPerCubicMetre,
    #[serde(rename = "m")]
    Metre,
    #[serde(rename = "m²")]
    SquareMetre,
    #[serde(rename = "m/s")]
    MetrePerSecond,
    #[serde(rename = "V")]
    Volt,
    #[serde(rename = "W")]
    Watt,
    #[serde(rename = "Pa")]
    Pascal,
    #[serde(rename = "C")]
    Coulomb,
    #[serde(rename = "J")]
    Joule,
    #[serde(rename = "°C")]
    Celsius,
    #[serde(rename = "rad")]
    Radian,
    #[serde(rename = "Hz")]
    Hertz,
    #[serde(rename = "$")]
    Dollar,
    #[serde(rename = "B")]
    Byte,
    #[serde(rename = "px")]
    Pixel,
    #[serde(rename = "s")]
    Second,
}

impl Unit {
    pub const ALL: [Unit; 20] = [
        Unit::Custom,
        Unit::None,
        Unit::Ratio,
        Unit::Kilogram,
        Unit::KilogramPerCubicMetre,
        Unit::Metre,
        Unit::SquareMetre,
        Unit::MetrePerSecond,
        Unit::Volt,
        Unit::Watt,
        Unit::Pascal,
        Unit::Coulomb,
        Unit::Joule,
        Unit::Celsius,
        Unit::Radian,
        Unit::Hertz,
        Unit::Dollar,
        Unit::Byte,
        Unit::Pixel,
        Unit::Second,
    ];

    /// The canonical short tag.
    pub fn tag(&self) -> &'static str {
        match self {
            Unit::Custom => "@",
            Unit::None => "1",
            Unit::Ratio => "/",
            Unit::Kilogram => "kg",
            Unit::KilogramPerCubicMetre => "kg/m³",
            Unit::Metre => "m",
            Unit::SquareMetre => "m²",
            Unit::MetrePerSecond => "m/s",
            Unit::Volt => "V",
            Unit::Watt => "W",
            Unit::Pascal => "Pa",
            Unit::Coulomb => "C",
            Unit::Joule => "J",
            Unit::Celsius => "°C",
            Unit::Radian => "rad",
            Unit::Hertz => "Hz",
            Unit::Dollar => "$",
            Unit::Byte => "B",
            Unit::Pixel => "px",
            Unit::Second => "s",
        }
    }

    /// Whether amounts in this unit can be compared and filtered numerically.
    pub fn comparable(&self) -> bool {
        *self != Unit::Custom
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Unit {
    type Err = UnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Unit::ALL.iter().find(|u| u.tag() == s).copied().ok_or_else(|| UnitError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip() {
        for unit in Unit::ALL {
            assert_eq!(unit.tag().parse::<Unit>().unwrap(), unit);
            let json = serde_json::to_string(&unit).unwrap();
            assert_eq!(json, format!("\"{}\"", unit.tag()));
            assert_eq!(serde_json::from_str::<Unit>(&json).unwrap(), unit);
        }
    }

    #[test]
    fn only_custom_is_not_comparable() {
        assert!(!Unit::Custom.comparable());
        for unit in Unit::ALL.iter().filter(|u| **u != Unit::Custom) {
            assert!(unit.comparable(), "{unit}");
        }
    }

    #[test]
    fn unknown_tags_are_rejected() {
        assert!("kilogram".parse::<Unit>().is_err());
        assert!("".parse::<Unit>().is_err());
    }
}
