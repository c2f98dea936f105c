//! Hyperparameter values and the get/set contract shared by every stage

use crate::error::{KolosalError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single hyperparameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Null,
}

impl ParamValue {
    /// Get as float (integers are widened)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Get as int
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as a non-negative integer
    pub fn as_usize(&self) -> Option<usize> {
        self.as_i64().and_then(|v| usize::try_from(v).ok())
    }

    /// Get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ParamValue::Null)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Str(v) => write!(f, "'{}'", v),
            ParamValue::Null => write!(f, "null"),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Str(v)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(ParamValue::Null)
    }
}

/// Name → value mapping returned by `get_params`
pub type ParamMap = BTreeMap<String, ParamValue>;

/// Introspection and mutation of a stage's hyperparameters.
///
/// Names are local to the stage (`n_neighbors`); a [`Pipeline`](crate::pipeline::Pipeline)
/// exposes them qualified as `<stage>__<param>`.
pub trait HasParams {
    /// All parameter names accepted by `set_param`
    fn param_names(&self) -> Vec<String>;

    /// Current parameter values
    fn get_params(&self) -> ParamMap;

    /// Set one parameter
    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()>;

    /// Set several parameters, stopping at the first rejected one
    fn set_params(&mut self, params: &ParamMap) -> Result<()> {
        for (name, value) in params {
            self.set_param(name, value)?;
        }
        Ok(())
    }
}

pub(crate) fn expect_usize(name: &str, value: &ParamValue, min: usize) -> Result<usize> {
    match value.as_usize() {
        Some(v) if v >= min => Ok(v),
        _ => Err(KolosalError::invalid_value(
            name,
            value,
            &format!("expected an integer >= {}", min),
        )),
    }
}

pub(crate) fn expect_f64(name: &str, value: &ParamValue) -> Result<f64> {
    value
        .as_f64()
        .filter(|v| v.is_finite())
        .ok_or_else(|| KolosalError::invalid_value(name, value, "expected a finite number"))
}

pub(crate) fn expect_bool(name: &str, value: &ParamValue) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| KolosalError::invalid_value(name, value, "expected a boolean"))
}

pub(crate) fn expect_seed(name: &str, value: &ParamValue) -> Result<Option<u64>> {
    if value.is_null() {
        return Ok(None);
    }
    value
        .as_i64()
        .and_then(|v| u64::try_from(v).ok())
        .map(Some)
        .ok_or_else(|| KolosalError::invalid_value(name, value, "expected a non-negative seed or null"))
}
