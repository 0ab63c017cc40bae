#![forbid(unsafe_code)]

//! Advisory units tag for cells.
//!
//! Units are metadata only: the core never converts, checks, or otherwise
//! interprets them. They exist so external tooling (inspectors, telemetry
//! consumers) can label values.

use std::fmt;

/// Semantic unit associated with a cell's value. Abbreviations follow SI
/// where one exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Units {
    AtomicMassUnits,
    Atmospheres,
    Amperes,
    Centimeters,
    Coulombs,
    Degrees,
    DegreesCelsius,
    Farads,
    Grams,
    Hertz,
    Joules,
    Kelvin,
    Kilograms,
    Kilopascals,
    Liters,
    Lumens,
    Meters,
    MetersPerSecond,
    MetersPerSecondSquared,
    Millimeters,
    Moles,
    Nanometers,
    Newtons,
    Ohms,
    Pascals,
    Percent,
    Picometers,
    Picoseconds,
    Radians,
    RadiansPerSecond,
    Seconds,
    Tesla,
    Volts,
    Watts,
    /// Escape hatch for application-specific units.
    Custom(String),
}

impl Units {
    #[must_use]
    pub fn abbreviation(&self) -> &str {
        match self {
            Units::AtomicMassUnits => "AMU",
            Units::Atmospheres => "atm",
            Units::Amperes => "A",
            Units::Centimeters => "cm",
            Units::Coulombs => "C",
            Units::Degrees => "\u{00B0}",
            Units::DegreesCelsius => "\u{00B0}C",
            Units::Farads => "F",
            Units::Grams => "g",
            Units::Hertz => "Hz",
            Units::Joules => "J",
            Units::Kelvin => "K",
            Units::Kilograms => "kg",
            Units::Kilopascals => "kPa",
            Units::Liters => "L",
            Units::Lumens => "lm",
            Units::Meters => "m",
            Units::MetersPerSecond => "m/s",
            Units::MetersPerSecondSquared => "m/s^2",
            Units::Millimeters => "mm",
            Units::Moles => "mol",
            Units::Nanometers => "nm",
            Units::Newtons => "N",
            Units::Ohms => "\u{03A9}",
            Units::Pascals => "Pa",
            Units::Percent => "%",
            Units::Picometers => "pm",
            Units::Picoseconds => "ps",
            Units::Radians => "rad",
            Units::RadiansPerSecond => "rad/s",
            Units::Seconds => "s",
            Units::Tesla => "T",
            Units::Volts => "V",
            Units::Watts => "W",
            Units::Custom(s) => s,
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.abbreviation())
    }
}
