//! Unit-interval value mappings
//!
//! A [`ValueMapping`] converts between a normalized control position in
//! `0.0..=1.0` (a knob, a fader, an automation curve) and the value stored
//! in a parameter field.
//!
//! | Mapping       | Stored type | Curve                              |
//! |---------------|-------------|------------------------------------|
//! | `Linear`      | Float32     | `min + unit * (max - min)`         |
//! | `Exponential` | Float32     | `min * (max / min)^unit`, `min > 0` |
//! | `Integer`     | Int32       | linear, rounded to nearest         |
//! | `Boolean`     | Boolean     | `unit >= 0.5`                      |

use crate::error::AdapterError;
use box_core::{PrimitiveType, PrimitiveValue};
use serde::{Deserialize, Serialize};

/// Conversion between unit positions and stored values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValueMapping {
    Linear { min: f32, max: f32 },
    /// More resolution at low values, e.g. frequencies
    Exponential { min: f32, max: f32 },
    Integer { min: i32, max: i32 },
    Boolean,
}

impl Default for ValueMapping {
    fn default() -> Self {
        Self::UNIPOLAR
    }
}

impl ValueMapping {
    /// `0.0..=1.0` stored as is
    pub const UNIPOLAR: Self = Self::Linear { min: 0.0, max: 1.0 };

    /// `-1.0..=1.0`, e.g. panning
    pub const BIPOLAR: Self = Self::Linear { min: -1.0, max: 1.0 };

    /// Linear float mapping
    ///
    /// # Errors
    /// Returns [`AdapterError::InvalidRange`] unless both bounds are finite
    pub fn linear(min: f32, max: f32) -> Result<Self, AdapterError> {
        if !min.is_finite() || !max.is_finite() {
            return Err(AdapterError::InvalidRange { min, max });
        }
        Ok(Self::Linear { min, max })
    }

    /// Exponential float mapping
    ///
    /// # Errors
    /// Returns [`AdapterError::InvalidRange`] unless `0 < min` and both bounds are finite
    pub fn exponential(min: f32, max: f32) -> Result<Self, AdapterError> {
        if !(min > 0.0 && max > 0.0 && min.is_finite() && max.is_finite()) {
            return Err(AdapterError::InvalidRange { min, max });
        }
        Ok(Self::Exponential { min, max })
    }

    #[must_use]
    pub fn integer(min: i32, max: i32) -> Self {
        Self::Integer { min, max }
    }

    /// Type of the values this mapping produces
    #[inline]
    #[must_use]
    pub fn value_type(&self) -> PrimitiveType {
        match self {
            Self::Linear { .. } | Self::Exponential { .. } => PrimitiveType::Float32,
            Self::Integer { .. } => PrimitiveType::Int32,
            Self::Boolean => PrimitiveType::Boolean,
        }
    }

    /// Stored value for a unit position; `unit` is clamped to `0.0..=1.0`
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn x(&self, unit: f32) -> PrimitiveValue {
        let unit = if unit.is_nan() { 0.0 } else { unit.clamp(0.0, 1.0) };
        match *self {
            Self::Linear { min, max } => PrimitiveValue::Float32(min + unit * (max - min)),
            Self::Exponential { min, max } => PrimitiveValue::Float32(min * (max / min).powf(unit)),
            Self::Integer { min, max } => {
                let span = f64::from(max) - f64::from(min);
                let value = f64::from(min) + (f64::from(unit) * span).round();
                PrimitiveValue::Int32(value as i32)
            }
            Self::Boolean => PrimitiveValue::Boolean(unit >= 0.5),
        }
    }

    /// Unit position of a stored value, clamped to `0.0..=1.0`
    ///
    /// `None` when the value has a different type than [`Self::value_type`].
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn y(&self, value: &PrimitiveValue) -> Option<f32> {
        let unit = match (*self, value) {
            (Self::Linear { min, max }, PrimitiveValue::Float32(v)) => {
                if max == min {
                    0.0
                } else {
                    (v - min) / (max - min)
                }
            }
            (Self::Exponential { min, max }, PrimitiveValue::Float32(v)) => {
                if *v <= 0.0 || max == min {
                    0.0
                } else {
                    (v / min).ln() / (max / min).ln()
                }
            }
            (Self::Integer { min, max }, PrimitiveValue::Int32(v)) => {
                if max == min {
                    0.0
                } else {
                    ((f64::from(*v) - f64::from(min)) / (f64::from(max) - f64::from(min))) as f32
                }
            }
            (Self::Boolean, PrimitiveValue::Boolean(v)) => {
                if *v {
                    1.0
                } else {
                    0.0
                }
            }
            _ => return None,
        };
        Some(if unit.is_nan() { 0.0 } else { unit.clamp(0.0, 1.0) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn float(value: &PrimitiveValue) -> f32 {
        value.as_f32().unwrap()
    }

    #[test]
    fn linear_endpoints() {
        assert_eq!(ValueMapping::BIPOLAR.x(0.0), PrimitiveValue::Float32(-1.0));
        assert_eq!(ValueMapping::BIPOLAR.x(0.5), PrimitiveValue::Float32(0.0));
        assert_eq!(ValueMapping::BIPOLAR.x(2.0), PrimitiveValue::Float32(1.0));
    }

    #[test]
    fn exponential_midpoint_is_geometric_mean() {
        let mapping = ValueMapping::exponential(20.0, 20_000.0).unwrap();
        let mid = float(&mapping.x(0.5));
        assert!((mid - 632.455_5).abs() < 0.01);
        assert!(ValueMapping::exponential(0.0, 1.0).is_err());
    }

    #[test]
    fn integer_rounds_to_nearest() {
        let mapping = ValueMapping::integer(0, 4);
        assert_eq!(mapping.x(0.3), PrimitiveValue::Int32(1));
        assert_eq!(mapping.x(0.4), PrimitiveValue::Int32(2));
        assert_eq!(mapping.y(&PrimitiveValue::Int32(3)), Some(0.75));
    }

    #[test]
    fn wrong_type_has_no_unit_position() {
        assert_eq!(ValueMapping::Boolean.y(&PrimitiveValue::Int32(1)), None);
        assert_eq!(ValueMapping::UNIPOLAR.y(&PrimitiveValue::Boolean(true)), None);
    }

    #[test]
    fn nan_unit_maps_to_minimum() {
        assert_eq!(ValueMapping::UNIPOLAR.x(f32::NAN), PrimitiveValue::Float32(0.0));
    }

    proptest! {
        #[test]
        fn y_inverts_x(unit in 0.0f32..=1.0) {
            for mapping in [
                ValueMapping::BIPOLAR,
                ValueMapping::exponential(20.0, 20_000.0).unwrap(),
            ] {
                let back = mapping.y(&mapping.x(unit)).unwrap();
                prop_assert!((back - unit).abs() < 1e-3, "{mapping:?}: {unit} -> {back}");
            }
        }
    }
}
