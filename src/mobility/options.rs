//! Named-option records for mobility models.
//!
//! Models are configured the way the simulator configures its helpers: a flat
//! map of option names to values (`speed`, `pause`, `bounds`, `grid_width`,
//! ...). Typed accessors convert and validate individual entries.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::model::Rect;
use super::MobilityError;

/// A single option value as written in the scenario file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Number(f64),
    String(String),
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(b) => write!(f, "{}", b),
            OptionValue::Number(n) => write!(f, "{}", n),
            OptionValue::String(s) => write!(f, "{}", s),
        }
    }
}

/// Random variable used for speeds and pause times
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Distribution {
    Constant(f64),
    Uniform { min: f64, max: f64 },
}

impl Distribution {
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match *self {
            Distribution::Constant(value) => value,
            Distribution::Uniform { min, max } if min < max => rng.gen_range(min..max),
            Distribution::Uniform { min, .. } => min,
        }
    }

    /// Rejects non-finite parameters and uniform ranges whose width overflows
    pub fn check_finite(&self) -> Result<(), String> {
        match *self {
            Distribution::Constant(value) if !value.is_finite() => {
                Err(format!("constant value {} is not finite", value))
            }
            Distribution::Uniform { min, max } if !(max - min).is_finite() => {
                Err(format!("uniform range [{}, {}] is not finite", min, max))
            }
            _ => Ok(()),
        }
    }

    /// Smallest value the distribution can produce
    pub fn min(&self) -> f64 {
        match *self {
            Distribution::Constant(value) => value,
            Distribution::Uniform { min, .. } => min,
        }
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Distribution::Constant(value) => write!(f, "constant({})", value),
            Distribution::Uniform { min, max } => write!(f, "uniform({},{})", min, max),
        }
    }
}

/// Parses `2`, `constant(2)` or `uniform(1,3)`
impl FromStr for Distribution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(value) = s.parse::<f64>() {
            let dist = Distribution::Constant(value);
            dist.check_finite()?;
            return Ok(dist);
        }
        let (name, args) = s
            .strip_suffix(')')
            .and_then(|body| body.split_once('('))
            .ok_or_else(|| format!("Invalid distribution format: {}", s))?;
        let values = args
            .split(',')
            .map(|v| v.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| format!("Invalid distribution argument in '{}': {}", s, e))?;

        let dist = match (name.trim(), values.as_slice()) {
            ("constant", [value]) => Distribution::Constant(*value),
            ("uniform", [min, max]) if min <= max => Distribution::Uniform { min: *min, max: *max },
            ("uniform", [_, _]) => return Err(format!("uniform bounds out of order in '{}'", s)),
            _ => return Err(format!("Unsupported distribution: {}", s)),
        };
        dist.check_finite()?;
        Ok(dist)
    }
}

/// Option map attached to a mobility binding
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MobilityOptions(BTreeMap<String, OptionValue>);

impl MobilityOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: &str, value: OptionValue) -> Self {
        self.0.insert(key.to_string(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &OptionValue)> {
        self.0.iter()
    }

    pub fn number(&self, key: &str, default: f64) -> Result<f64, MobilityError> {
        let value = match self.0.get(key) {
            None => default,
            Some(OptionValue::Number(n)) => *n,
            Some(OptionValue::String(s)) => s.trim().parse::<f64>().map_err(|_| invalid(key, "expected a number"))?,
            Some(OptionValue::Bool(_)) => return Err(invalid(key, "expected a number")),
        };
        if !value.is_finite() {
            return Err(invalid(key, "expected a finite number"));
        }
        Ok(value)
    }

    pub fn count(&self, key: &str, default: usize) -> Result<usize, MobilityError> {
        let value = self.number(key, default as f64)?;
        if value < 1.0 || value.fract() != 0.0 {
            return Err(invalid(key, "expected a positive integer"));
        }
        Ok(value as usize)
    }

    pub fn text<'a>(&'a self, key: &str, default: &'a str) -> Result<&'a str, MobilityError> {
        match self.0.get(key) {
            None => Ok(default),
            Some(OptionValue::String(s)) => Ok(s.as_str()),
            Some(_) => Err(invalid(key, "expected a string")),
        }
    }

    pub fn distribution(&self, key: &str, default: Distribution) -> Result<Distribution, MobilityError> {
        let dist = match self.0.get(key) {
            None => default,
            Some(OptionValue::Number(n)) => Distribution::Constant(*n),
            Some(OptionValue::String(s)) => s.parse().map_err(|e: String| invalid(key, &e))?,
            Some(OptionValue::Bool(_)) => return Err(invalid(key, "expected a distribution")),
        };
        dist.check_finite().map_err(|e| invalid(key, &e))?;
        if dist.min() < 0.0 {
            return Err(invalid(key, "values must be non-negative"));
        }
        Ok(dist)
    }

    pub fn bounds(&self, key: &str, default: Rect) -> Result<Rect, MobilityError> {
        match self.0.get(key) {
            None => Ok(default),
            Some(OptionValue::String(s)) => s.parse().map_err(|e: String| invalid(key, &e)),
            Some(_) => Err(invalid(key, "expected \"x_min,x_max,y_min,y_max\"")),
        }
    }

    /// Returns a copy of `defaults` with every entry of `self` laid on top
    pub fn merged_over(&self, defaults: &MobilityOptions) -> MobilityOptions {
        let mut merged = defaults.0.clone();
        for (k, v) in &self.0 {
            merged.insert(k.clone(), v.clone());
        }
        MobilityOptions(merged)
    }
}

impl FromIterator<(String, OptionValue)> for MobilityOptions {
    fn from_iter<I: IntoIterator<Item = (String, OptionValue)>>(iter: I) -> Self {
        MobilityOptions(iter.into_iter().collect())
    }
}

fn invalid(key: &str, reason: &str) -> MobilityError {
    MobilityError::InvalidOption {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_parse_distribution() {
        assert_eq!("2".parse::<Distribution>(), Ok(Distribution::Constant(2.0)));
        assert_eq!("constant(0.4)".parse::<Distribution>(), Ok(Distribution::Constant(0.4)));
        assert_eq!(
            "uniform(1, 3)".parse::<Distribution>(),
            Ok(Distribution::Uniform { min: 1.0, max: 3.0 })
        );
        assert!("uniform(3,1)".parse::<Distribution>().is_err());
        assert!("normal(0,1)".parse::<Distribution>().is_err());
        assert!("fast".parse::<Distribution>().is_err());
    }

    #[test]
    fn test_non_finite_distributions_rejected() {
        assert!("inf".parse::<Distribution>().is_err());
        assert!("constant(NaN)".parse::<Distribution>().is_err());
        assert!("uniform(0,inf)".parse::<Distribution>().is_err());
        assert!("uniform(-1e308,1e308)".parse::<Distribution>().is_err());

        let speed = MobilityOptions::new().with("speed", OptionValue::String("uniform(0,inf)".to_string()));
        assert!(matches!(
            speed.distribution("speed", Distribution::Constant(1.0)),
            Err(MobilityError::InvalidOption { .. })
        ));
        let pause = MobilityOptions::new().with("pause", OptionValue::Number(f64::INFINITY));
        assert!(pause.distribution("pause", Distribution::Constant(0.0)).is_err());
    }

    #[test]
    fn test_non_finite_number_rejected() {
        let options = MobilityOptions::new()
            .with("min_x", OptionValue::Number(f64::NAN))
            .with("delta_x", OptionValue::String("inf".to_string()));
        assert!(options.number("min_x", 0.0).is_err());
        assert!(options.number("delta_x", 1.0).is_err());
    }

    #[test]
    fn test_uniform_sample_in_range() {
        let mut rng = StdRng::seed_from_u64(3);
        let dist = Distribution::Uniform { min: 1.0, max: 2.0 };
        for _ in 0..100 {
            let v = dist.sample(&mut rng);
            assert!((1.0..2.0).contains(&v));
        }
    }

    #[test]
    fn test_typed_accessors() {
        let options = MobilityOptions::new()
            .with("speed", OptionValue::Number(3.0))
            .with("pause", OptionValue::String("uniform(0,1)".to_string()))
            .with("grid_width", OptionValue::Number(5.0))
            .with("bounds", OptionValue::String("-10,10,-20,20".to_string()));

        assert_eq!(options.distribution("speed", Distribution::Constant(1.0)).unwrap(), Distribution::Constant(3.0));
        assert_eq!(
            options.distribution("pause", Distribution::Constant(0.0)).unwrap(),
            Distribution::Uniform { min: 0.0, max: 1.0 }
        );
        assert_eq!(options.count("grid_width", 10).unwrap(), 5);
        assert_eq!(options.number("min_x", 20.0).unwrap(), 20.0);
        let rect = options.bounds("bounds", Rect::new(0.0, 1.0, 0.0, 1.0)).unwrap();
        assert_eq!(rect, Rect::new(-10.0, 10.0, -20.0, 20.0));
    }

    #[test]
    fn test_invalid_option_reports_key() {
        let options = MobilityOptions::new().with("speed", OptionValue::Bool(true));
        let err = options.distribution("speed", Distribution::Constant(1.0)).unwrap_err();
        assert!(err.to_string().contains("speed"));

        let negative = MobilityOptions::new().with("pause", OptionValue::Number(-1.0));
        assert!(negative.distribution("pause", Distribution::Constant(0.0)).is_err());
    }

    #[test]
    fn test_merged_over_prefers_overrides() {
        let defaults = MobilityOptions::new()
            .with("speed", OptionValue::Number(2.0))
            .with("pause", OptionValue::Number(0.2));
        let overrides = MobilityOptions::new().with("speed", OptionValue::Number(5.0));

        let merged = overrides.merged_over(&defaults);
        assert_eq!(merged.get("speed"), Some(&OptionValue::Number(5.0)));
        assert_eq!(merged.get("pause"), Some(&OptionValue::Number(0.2)));
    }

    #[test]
    fn test_yaml_option_values() {
        let yaml = "speed: 2\npause: \"uniform(0,1)\"\nlayout: row_first\n";
        let options: MobilityOptions = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(options.get("speed"), Some(&OptionValue::Number(2.0)));
        assert_eq!(options.text("layout", "column_first").unwrap(), "row_first");
    }
}
