use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

/// The polarity of a charge
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub enum Polarity {
    /// Positive
    #[default]
    Positive,
    /// Negative
    Negative,
}

/// A charge state, the magnitude is always at least 1
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(try_from = "ChargeData")]
pub struct Charge {
    polarity: Polarity,
    magnitude: u16,
}

#[derive(Deserialize)]
struct ChargeData {
    polarity: Polarity,
    magnitude: u16,
}

impl TryFrom<ChargeData> for Charge {
    type Error = String;

    fn try_from(value: ChargeData) -> Result<Self, Self::Error> {
        Self::new(value.polarity, value.magnitude)
            .ok_or_else(|| "A charge cannot have a magnitude of zero".to_string())
    }
}

impl Charge {
    /// Create a new charge, returns None if the magnitude is 0
    pub const fn new(polarity: Polarity, magnitude: u16) -> Option<Self> {
        if magnitude == 0 {
            None
        } else {
            Some(Self {
                polarity,
                magnitude,
            })
        }
    }

    /// Create a positive charge, returns None if the magnitude is 0
    pub const fn positive(magnitude: u16) -> Option<Self> {
        Self::new(Polarity::Positive, magnitude)
    }

    /// The polarity
    pub const fn polarity(self) -> Polarity {
        self.polarity
    }

    /// The magnitude, always at least 1
    pub const fn magnitude(self) -> u16 {
        self.magnitude
    }

    /// The signed charge value
    pub fn value(self) -> i32 {
        match self.polarity {
            Polarity::Positive => i32::from(self.magnitude),
            Polarity::Negative => -i32::from(self.magnitude),
        }
    }
}

impl Display for Charge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{}",
            self.magnitude,
            match self.polarity {
                Polarity::Positive => '+',
                Polarity::Negative => '-',
            }
        )
    }
}

/// Parse a charge in the `2+`, `+2`, `3-`, or `2` (positive) notation
impl FromStr for Charge {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (digits, polarity) = if let Some(d) = s.strip_suffix('+').or_else(|| s.strip_prefix('+')) {
            (d, Polarity::Positive)
        } else if let Some(d) = s.strip_suffix('-').or_else(|| s.strip_prefix('-')) {
            (d, Polarity::Negative)
        } else {
            (s, Polarity::Positive)
        };
        let magnitude = digits
            .parse::<u16>()
            .map_err(|_| format!("The charge '{s}' is not a valid charge"))?;
        Self::new(polarity, magnitude).ok_or_else(|| format!("The charge '{s}' is zero"))
    }
}

/// The precursor of a spectrum, with only the fields that are known from identification files
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct Precursor {
    /// The retention time in seconds, not always known when reading identification results
    pub retention_time: Option<f64>,
    /// The measured neutral mass (Da)
    pub mass: f64,
    /// The charge
    pub charge: Charge,
}

impl Precursor {
    /// Create a new precursor
    pub const fn new(retention_time: Option<f64>, mass: f64, charge: Charge) -> Self {
        Self {
            retention_time,
            mass,
            charge,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_charges() {
        assert_eq!("2+".parse::<Charge>().unwrap(), Charge::positive(2).unwrap());
        assert_eq!("+3".parse::<Charge>().unwrap().value(), 3);
        assert_eq!("3-".parse::<Charge>().unwrap().value(), -3);
        assert_eq!("4".parse::<Charge>().unwrap().to_string(), "4+");
        assert!("0+".parse::<Charge>().is_err());
        assert!("Mr".parse::<Charge>().is_err());
        assert!(Charge::new(Polarity::Negative, 0).is_none());
    }

    #[test]
    fn deserialize_validates() {
        let charge: Charge =
            serde_json::from_str(r#"{"polarity": "Negative", "magnitude": 2}"#).unwrap();
        assert_eq!(charge.value(), -2);
        assert!(
            serde_json::from_str::<Charge>(r#"{"polarity": "Positive", "magnitude": 0}"#).is_err()
        );
        let json = serde_json::to_string(&Charge::positive(3).unwrap()).unwrap();
        assert_eq!(serde_json::from_str::<Charge>(&json).unwrap().value(), 3);
    }
}
