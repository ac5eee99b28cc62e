//! Call arguments with typed extraction helpers
//!
//! Build arguments on the calling side with the [`args!`](crate::args) macro:
//!
//! ```rust
//! use modwire::args;
//!
//! let args = args![10, 20; scale = 2];
//! assert_eq!(args.len(), 3);
//! ```
//!
//! and pull typed values out of them on the target side:
//!
//! ```rust
//! # use modwire::{args, Args};
//! # let args = args![10, 20; scale = 2];
//! let a: i64 = args.get(0)?;
//! let scale: i64 = args.kwarg("scale")?;
//! # Ok::<(), modwire::ObjectError>(())
//! ```

use crate::error::ObjectError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Positional and keyword arguments of one invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Args {
    pub positional: Vec<Value>,
    pub keyword: Map<String, Value>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positional(values: Vec<Value>) -> Self {
        Self {
            positional: values,
            keyword: Map::new(),
        }
    }

    pub fn with_arg(mut self, value: impl Serialize) -> Self {
        self.positional.push(to_value(value));
        self
    }

    pub fn with_kwarg(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        self.keyword.insert(key.into(), to_value(value));
        self
    }

    /// Get positional argument at index with type conversion
    pub fn get<T: DeserializeOwned>(&self, index: usize) -> Result<T, ObjectError> {
        let value = self.positional.get(index).ok_or_else(|| {
            ObjectError::application(format!("Missing argument at index {}", index))
        })?;
        serde_json::from_value(value.clone()).map_err(|e| {
            ObjectError::application(format!("Invalid argument at index {}: {}", index, e))
        })
    }

    /// Get keyword argument with type conversion
    pub fn kwarg<T: DeserializeOwned>(&self, key: &str) -> Result<T, ObjectError> {
        let value = self.keyword.get(key).ok_or_else(|| {
            ObjectError::application(format!("Missing keyword argument '{}'", key))
        })?;
        serde_json::from_value(value.clone()).map_err(|e| {
            ObjectError::application(format!("Invalid keyword argument '{}': {}", key, e))
        })
    }

    /// Keyword argument if present, positional argument at `index` otherwise
    pub fn get_or_kwarg<T: DeserializeOwned>(
        &self,
        index: usize,
        key: &str,
    ) -> Result<T, ObjectError> {
        if self.keyword.contains_key(key) {
            self.kwarg(key)
        } else {
            self.get(index)
        }
    }

    pub fn len(&self) -> usize {
        self.positional.len() + self.keyword.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keyword.is_empty()
    }
}

fn to_value(value: impl Serialize) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Renders like a call signature body: `1, "a", key=true`.
impl fmt::Display for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let positional = self.positional.iter().map(|v| v.to_string());
        let keyword = self.keyword.iter().map(|(k, v)| format!("{}={}", k, v));
        let parts: Vec<String> = positional.chain(keyword).collect();
        write!(f, "{}", parts.join(", "))
    }
}

/// Build [`Args`] from positional expressions and `key = value` pairs.
///
/// ```rust
/// use modwire::args;
///
/// let empty = args![];
/// let pos = args![1, "two"];
/// let kw = args![; verbose = true];
/// let both = args![1, 2; scale = 3, unit = "cm"];
/// # assert!(empty.is_empty());
/// # assert_eq!(pos.len() + kw.len() + both.len(), 7);
/// ```
#[macro_export]
macro_rules! args {
    () => {
        $crate::Args::new()
    };
    ($($arg:expr),* ; $($key:ident = $value:expr),+ $(,)?) => {
        $crate::Args::new()$(.with_arg($arg))*$(.with_kwarg(stringify!($key), $value))+
    };
    ($($arg:expr),+ $(,)?) => {
        $crate::Args::new()$(.with_arg($arg))+
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_args_get() {
        let args = Args::positional(vec![json!(10), json!(20)]);
        let a: i64 = args.get(0).unwrap();
        let b: i64 = args.get(1).unwrap();
        assert_eq!(a, 10);
        assert_eq!(b, 20);
    }

    #[test]
    fn test_args_missing() {
        let args = Args::positional(vec![json!(10)]);
        let result = args.get::<i64>(1);
        assert!(matches!(result, Err(ObjectError::Application(_))));
    }

    #[test]
    fn test_args_type_conversion() {
        let args = args![42, "hello", true];
        let a: i64 = args.get(0).unwrap();
        let b: String = args.get(1).unwrap();
        let c: bool = args.get(2).unwrap();
        assert_eq!(a, 42);
        assert_eq!(b, "hello");
        assert!(c);
        assert!(args.get::<bool>(0).is_err());
    }

    #[test]
    fn test_kwargs() {
        let args = args![1; scale = 3];
        assert_eq!(args.kwarg::<i64>("scale").unwrap(), 3);
        assert!(args.kwarg::<i64>("unit").is_err());
        assert_eq!(args.get_or_kwarg::<i64>(1, "scale").unwrap(), 3);
        assert_eq!(args.get_or_kwarg::<i64>(0, "base").unwrap(), 1);
    }

    #[test]
    fn test_macro_forms() {
        assert!(args![].is_empty());
        assert_eq!(args![1, 2].positional, vec![json!(1), json!(2)]);
        let kw = args![; unit = "cm"];
        assert!(kw.positional.is_empty());
        assert_eq!(kw.keyword.get("unit"), Some(&json!("cm")));
    }

    #[test]
    fn test_display() {
        assert_eq!(args![].to_string(), "");
        assert_eq!(args![1, "a"; flag = true].to_string(), "1, \"a\", flag=true");
    }
}
