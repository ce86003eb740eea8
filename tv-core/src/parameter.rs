//! Module parameters, grounded on `src/lib/interface/parameter.hh`.
//!
//! The original models this as a class hierarchy (`Parameter` base,
//! `NumericalParameter`/`StringParameter` derived) so both kinds can share a
//! single map. An enum does the same job without the virtual-stub methods
//! that return a default on a type mismatch.

use crate::error::Error;
use crate::utils::clamp_i32;
use crate::Result;

use std::sync::Arc;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParameterKind {
    Numerical,
    String,
}

type StringVerifier = Arc<dyn Fn(&str, &str) -> bool + Send + Sync>;

enum Value {
    Numerical { min: i32, max: i32, value: i32 },
    String { value: String, verify: Option<StringVerifier> },
}

/// A single named, typed, range- or predicate-checked module setting.
pub struct Parameter {
    name: String,
    value: Value,
}

impl Parameter {
    /// A numerical parameter with an inclusive `[min, max]` range. `init`
    /// must already lie in range; this is the one place the original leaves
    /// unchecked and a module author can trivially get wrong.
    pub fn numerical(name: impl Into<String>, min: i32, max: i32, init: i32) -> Result<Self> {
        if min > max || init < min || init > max {
            return Err(Error::OutOfRange(
                format!("parameter init {init} outside [{min}, {max}]").into(),
            ));
        }
        Ok(Parameter {
            name: name.into(),
            value: Value::Numerical { min, max, value: init },
        })
    }

    /// A string parameter, optionally guarded by a verification predicate
    /// called with `(old, new)` before the assignment is accepted.
    pub fn string(name: impl Into<String>, init: impl Into<String>) -> Self {
        Parameter {
            name: name.into(),
            value: Value::String { value: init.into(), verify: None },
        }
    }

    pub fn string_with_verify<F>(name: impl Into<String>, init: impl Into<String>, verify: F) -> Self
    where
        F: Fn(&str, &str) -> bool + Send + Sync + 'static,
    {
        Parameter {
            name: name.into(),
            value: Value::String { value: init.into(), verify: Some(Arc::new(verify)) },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ParameterKind {
        match self.value {
            Value::Numerical { .. } => ParameterKind::Numerical,
            Value::String { .. } => ParameterKind::String,
        }
    }

    pub fn min(&self) -> Option<i32> {
        match self.value {
            Value::Numerical { min, .. } => Some(min),
            Value::String { .. } => None,
        }
    }

    pub fn max(&self) -> Option<i32> {
        match self.value {
            Value::Numerical { max, .. } => Some(max),
            Value::String { .. } => None,
        }
    }

    /// Set a numerical value. Returns `false` (and leaves the parameter
    /// unchanged) if `value` falls outside the registered range, or if this
    /// parameter is not numerical -- the type-mismatch case the original's
    /// virtual stubs handle by returning `false` rather than failing loudly.
    pub fn set_i32(&mut self, value: i32) -> bool {
        match &mut self.value {
            Value::Numerical { min, max, value: current } => {
                if value < *min || value > *max {
                    false
                } else {
                    *current = value;
                    true
                }
            }
            Value::String { .. } => false,
        }
    }

    /// Set and clamp in one step, for callers that want saturation instead
    /// of rejection (the scheduler's own bookkeeping, not module-facing API).
    pub fn set_i32_clamped(&mut self, value: i32) -> bool {
        match &mut self.value {
            Value::Numerical { min, max, value: current } => {
                *current = clamp_i32(value, *min, *max);
                true
            }
            Value::String { .. } => false,
        }
    }

    pub fn get_i32(&self) -> Option<i32> {
        match self.value {
            Value::Numerical { value, .. } => Some(value),
            Value::String { .. } => None,
        }
    }

    /// Set a string value, running the verifier (if any) against the current
    /// value first. Returns `false` if rejected or if this parameter is
    /// numerical.
    pub fn set_string(&mut self, value: impl Into<String>) -> bool {
        match &mut self.value {
            Value::String { value: current, verify } => {
                let new_value = value.into();
                if let Some(verify) = verify {
                    if !verify(current, &new_value) {
                        return false;
                    }
                }
                *current = new_value;
                true
            }
            Value::Numerical { .. } => false,
        }
    }

    pub fn get_string(&self) -> Option<&str> {
        match &self.value {
            Value::String { value, .. } => Some(value.as_str()),
            Value::Numerical { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numerical_rejects_out_of_range_init() {
        assert!(Parameter::numerical("period", 0, 500, 600).is_err());
    }

    #[test]
    fn numerical_set_respects_range() {
        let mut p = Parameter::numerical("period", 0, 500, 1).unwrap();
        assert!(!p.set_i32(-1));
        assert!(!p.set_i32(501));
        assert_eq!(p.get_i32(), Some(1));
        assert!(p.set_i32(42));
        assert_eq!(p.get_i32(), Some(42));
    }

    #[test]
    fn string_set_get_roundtrip() {
        let mut p = Parameter::string("tag", "default");
        assert_eq!(p.get_string(), Some("default"));
        assert!(p.set_string("updated"));
        assert_eq!(p.get_string(), Some("updated"));
    }

    #[test]
    fn string_verifier_can_reject() {
        let mut p = Parameter::string_with_verify("tag", "default", |old, _new| old == "default");
        assert!(p.set_string("first"));
        assert!(!p.set_string("second"));
        assert_eq!(p.get_string(), Some("first"));
    }

    #[test]
    fn type_mismatch_returns_false_not_panic() {
        let mut numerical = Parameter::numerical("period", 0, 500, 1).unwrap();
        assert!(!numerical.set_string("nope"));
        assert_eq!(numerical.get_string(), None);

        let mut string = Parameter::string("tag", "x");
        assert!(!string.set_i32(1));
        assert_eq!(string.get_i32(), None);
    }
}
