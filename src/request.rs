use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Value type for a request keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestValue {
    Str(String),
    Int(i64),
    StrList(Vec<String>),
    IntList(Vec<i64>),
}

impl From<&str> for RequestValue {
    fn from(value: &str) -> Self {
        RequestValue::Str(value.to_string())
    }
}

impl From<String> for RequestValue {
    fn from(value: String) -> Self {
        RequestValue::Str(value)
    }
}

impl From<&String> for RequestValue {
    fn from(value: &String) -> Self {
        RequestValue::Str(value.clone())
    }
}

impl From<i64> for RequestValue {
    fn from(value: i64) -> Self {
        RequestValue::Int(value)
    }
}

impl From<i32> for RequestValue {
    fn from(value: i32) -> Self {
        RequestValue::Int(value as i64)
    }
}

impl From<u32> for RequestValue {
    fn from(value: u32) -> Self {
        RequestValue::Int(value as i64)
    }
}

impl From<Vec<String>> for RequestValue {
    fn from(value: Vec<String>) -> Self {
        RequestValue::StrList(value)
    }
}

impl From<Vec<&str>> for RequestValue {
    fn from(value: Vec<&str>) -> Self {
        RequestValue::StrList(value.into_iter().map(|s| s.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for RequestValue {
    fn from(value: [&str; N]) -> Self {
        RequestValue::StrList(value.into_iter().map(|s| s.to_string()).collect())
    }
}

impl From<Vec<i64>> for RequestValue {
    fn from(value: Vec<i64>) -> Self {
        RequestValue::IntList(value)
    }
}

impl<const N: usize> From<[i32; N]> for RequestValue {
    fn from(value: [i32; N]) -> Self {
        RequestValue::IntList(value.into_iter().map(|x| x as i64).collect())
    }
}

impl RequestValue {
    pub fn as_strings(&self) -> Vec<String> {
        match self {
            RequestValue::Str(s) => vec![s.clone()],
            RequestValue::Int(i) => vec![i.to_string()],
            RequestValue::StrList(xs) => xs.clone(),
            RequestValue::IntList(xs) => xs.iter().map(|x| x.to_string()).collect(),
        }
    }

    /// Render the value the way the archive expects it: lists are `/`-separated.
    ///
    /// Strings are sent untouched, so `"165.128/41.128"` and
    /// `["165.128", "41.128"]` end up identical on the wire.
    pub fn to_wire(&self) -> String {
        match self {
            RequestValue::Str(s) => s.clone(),
            RequestValue::Int(i) => i.to_string(),
            _ => self.as_strings().join("/"),
        }
    }

    fn from_json(key: &str, value: &Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(RequestValue::Str(s.clone())),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(RequestValue::Int(i)),
                None => Ok(RequestValue::Str(n.to_string())),
            },
            Value::Array(items) => {
                if items.iter().all(|v| v.is_i64()) {
                    Ok(RequestValue::IntList(
                        items.iter().filter_map(Value::as_i64).collect(),
                    ))
                } else {
                    let mut out = Vec::with_capacity(items.len());
                    for it in items {
                        match it {
                            Value::String(s) => out.push(s.clone()),
                            Value::Number(n) => out.push(n.to_string()),
                            other => {
                                return Err(Error::InvalidRequest(format!(
                                    "unsupported list element for {key}: {other}"
                                )));
                            }
                        }
                    }
                    Ok(RequestValue::StrList(out))
                }
            }
            other => Err(Error::InvalidRequest(format!(
                "unsupported value for {key}: {other}"
            ))),
        }
    }
}

/// MARS-like retrieval request expressed as keyword/value pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    pub(crate) inner: BTreeMap<String, RequestValue>,
}

impl Request {
    pub fn new() -> Self {
        Self {
            inner: BTreeMap::new(),
        }
    }

    /// Insert a keyword/value pair (value can be a scalar or list).
    pub fn kw(mut self, key: impl Into<String>, value: impl Into<RequestValue>) -> Self {
        self.inner.insert(key.into(), value.into());
        self
    }

    /// Construct a request from an iterator of keyword/value pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<RequestValue>,
    {
        let mut r = Self::new();
        for (k, v) in pairs {
            r = r.kw(k, v);
        }
        r
    }

    /// Load a request from a file holding a single JSON object.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&text)?;
        let Value::Object(map) = value else {
            return Err(Error::InvalidRequest(format!(
                "{} does not contain a JSON object",
                path.display()
            )));
        };

        let mut r = Self::new();
        for (k, v) in &map {
            let rv = RequestValue::from_json(k, v)?;
            r.set(k.clone(), rv);
        }
        Ok(r)
    }

    pub fn set(&mut self, key: impl Into<String>, value: RequestValue) {
        self.inner.insert(key.into(), value);
    }

    pub fn class(self, v: impl Into<RequestValue>) -> Self {
        self.kw("class", v)
    }

    pub fn dataset(self, v: impl Into<RequestValue>) -> Self {
        self.kw("dataset", v)
    }

    pub fn expver(self, v: impl Into<RequestValue>) -> Self {
        self.kw("expver", v)
    }

    pub fn r#type(self, v: impl Into<RequestValue>) -> Self {
        self.kw("type", v)
    }

    pub fn stream(self, v: impl Into<RequestValue>) -> Self {
        self.kw("stream", v)
    }

    pub fn date(self, v: impl Into<RequestValue>) -> Self {
        self.kw("date", v)
    }

    pub fn time(self, v: impl Into<RequestValue>) -> Self {
        self.kw("time", v)
    }

    pub fn step(self, v: impl Into<RequestValue>) -> Self {
        self.kw("step", v)
    }

    pub fn param(self, v: impl Into<RequestValue>) -> Self {
        self.kw("param", v)
    }

    pub fn levtype(self, v: impl Into<RequestValue>) -> Self {
        self.kw("levtype", v)
    }

    pub fn grid(self, v: impl Into<RequestValue>) -> Self {
        self.kw("grid", v)
    }

    pub fn target(self, v: impl Into<RequestValue>) -> Self {
        self.kw("target", v)
    }

    pub fn get(&self, key: &str) -> Option<&RequestValue> {
        self.inner.get(key)
    }

    /// Wire form of a keyword, if present.
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.inner.get(key).map(RequestValue::to_wire)
    }

    pub fn target_path(&self) -> Option<String> {
        self.get_str("target")
    }

    pub fn dataset_name(&self) -> Option<String> {
        self.get_str("dataset")
    }

    pub fn remove(&mut self, key: &str) {
        self.inner.remove(key);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RequestValue)> {
        self.inner.iter()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// JSON body submitted to the service. Every value goes out as a string.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (k, v) in &self.inner {
            map.insert(k.clone(), Value::String(v.to_wire()));
        }
        Value::Object(map)
    }
}
