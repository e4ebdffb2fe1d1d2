//! Plain-data parameter payloads carried by navigation requests
//!
//! Payloads are converted to JSON values at the navigation boundary. Anything
//! that cannot become plain data (such as a live surface handle, which refuses
//! to serialize) fails right there with `InvalidNavigationParameter` instead of
//! surfacing later when a screen is recreated.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Deepest nesting accepted inside a single parameter value
pub const MAX_PARAM_DEPTH: usize = 16;

/// Name used in errors when the payload as a whole is rejected
const PAYLOAD: &str = "<payload>";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NavParams(Map<String, Value>);

impl NavParams {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Convert any serializable payload into validated parameters
    ///
    /// The payload must serialize to a map (a struct or a map type); `()` and
    /// `None` produce an empty payload.
    pub fn from_serialize<T: Serialize + ?Sized>(payload: &T) -> Result<Self> {
        let value = serde_json::to_value(payload)
            .map_err(|e| Error::invalid_param(PAYLOAD, e.to_string()))?;

        match value {
            Value::Null => Ok(Self::new()),
            Value::Object(map) => {
                for (name, value) in &map {
                    validate(name, value, 1)?;
                }
                Ok(Self(map))
            }
            other => Err(Error::invalid_param(
                PAYLOAD,
                format!("expected named parameters, got {}", kind(&other)),
            )),
        }
    }

    /// Insert a single parameter, validating that it is plain data
    pub fn insert<T: Serialize + ?Sized>(
        &mut self,
        name: impl Into<String>,
        value: &T,
    ) -> Result<()> {
        let name = name.into();
        let value =
            serde_json::to_value(value).map_err(|e| Error::invalid_param(&name, e.to_string()))?;
        validate(&name, &value, 1)?;
        self.0.insert(name, value);
        Ok(())
    }

    /// Builder form of `insert`
    pub fn with<T: Serialize + ?Sized>(
        mut self,
        name: impl Into<String>,
        value: &T,
    ) -> Result<Self> {
        self.insert(name, value)?;
        Ok(self)
    }

    pub(crate) fn insert_value(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// Integer parameter; numeric strings (such as path captures) are accepted
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.0.get(name)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.0.get(name)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse `k=v&k2=v2` query text; values stay strings
    pub fn from_query(query: &str) -> Result<Self> {
        let mut params = Self::new();
        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            let (name, value) = pair
                .split_once('=')
                .ok_or_else(|| Error::invalid_param(pair, "expected name=value"))?;
            if name.is_empty() {
                return Err(Error::invalid_param(pair, "parameter name is empty"));
            }
            params.insert(name, value)?;
        }
        Ok(params)
    }
}

impl fmt::Display for NavParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Object(self.0.clone()))
    }
}

fn validate(name: &str, value: &Value, depth: usize) -> Result<()> {
    if depth > MAX_PARAM_DEPTH {
        return Err(Error::invalid_param(
            name,
            format!("nested deeper than {} levels", MAX_PARAM_DEPTH),
        ));
    }

    match value {
        Value::Array(items) => items.iter().try_for_each(|item| validate(name, item, depth + 1)),
        Value::Object(map) => map.values().try_for_each(|item| validate(name, item, depth + 1)),
        _ => Ok(()),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a map",
    }
}
