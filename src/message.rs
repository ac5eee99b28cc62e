use crate::args::Args;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

const GET_ATTRIBUTE: &str = "get-attribute";
const SET_ATTRIBUTE: &str = "set-attribute";
const DELETE_ATTRIBUTE: &str = "delete-attribute";
const INVOKE: &str = "invoke";
const DIRECTORY: &str = "directory";
const LENGTH: &str = "length";

/// One step of a request chain.
///
/// On the wire every operation is a `[verb, [args...], {kwargs}]` triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawOperation", into = "RawOperation")]
pub enum Operation {
    GetAttribute(String),
    SetAttribute(String, Value),
    DeleteAttribute(String),
    Invoke(Args),
    Directory,
    Length,
    /// Literal attribute name; invoked afterwards when it carries arguments.
    Named { name: String, args: Args },
}

#[derive(Serialize, Deserialize)]
struct RawOperation(String, Vec<Value>, #[serde(default)] Map<String, Value>);

impl From<Operation> for RawOperation {
    fn from(op: Operation) -> Self {
        match op {
            Operation::GetAttribute(name) => {
                RawOperation(GET_ATTRIBUTE.into(), vec![Value::String(name)], Map::new())
            }
            Operation::SetAttribute(name, value) => RawOperation(
                SET_ATTRIBUTE.into(),
                vec![Value::String(name), value],
                Map::new(),
            ),
            Operation::DeleteAttribute(name) => {
                RawOperation(DELETE_ATTRIBUTE.into(), vec![Value::String(name)], Map::new())
            }
            Operation::Invoke(args) => RawOperation(INVOKE.into(), args.positional, args.keyword),
            Operation::Directory => RawOperation(DIRECTORY.into(), vec![], Map::new()),
            Operation::Length => RawOperation(LENGTH.into(), vec![], Map::new()),
            Operation::Named { name, args } => RawOperation(name, args.positional, args.keyword),
        }
    }
}

impl TryFrom<RawOperation> for Operation {
    type Error = String;

    fn try_from(raw: RawOperation) -> Result<Self, Self::Error> {
        let RawOperation(verb, args, kwargs) = raw;
        let keyed = |verb: &str, args: &[Value]| -> Result<String, String> {
            match args.first() {
                Some(Value::String(name)) if !name.is_empty() => Ok(name.clone()),
                _ => Err(format!("'{}' requires an attribute name", verb)),
            }
        };

        match verb.as_str() {
            GET_ATTRIBUTE | DELETE_ATTRIBUTE => {
                if args.len() != 1 || !kwargs.is_empty() {
                    return Err(format!("'{}' takes exactly one argument", verb));
                }
                let name = keyed(&verb, &args)?;
                Ok(if verb == GET_ATTRIBUTE {
                    Operation::GetAttribute(name)
                } else {
                    Operation::DeleteAttribute(name)
                })
            }
            SET_ATTRIBUTE => {
                if args.len() != 2 || !kwargs.is_empty() {
                    return Err(format!("'{}' takes exactly two arguments", verb));
                }
                let name = keyed(&verb, &args)?;
                let value = args.into_iter().nth(1).unwrap_or(Value::Null);
                Ok(Operation::SetAttribute(name, value))
            }
            INVOKE => Ok(Operation::Invoke(Args {
                positional: args,
                keyword: kwargs,
            })),
            DIRECTORY | LENGTH => {
                if !args.is_empty() || !kwargs.is_empty() {
                    return Err(format!("'{}' takes no arguments", verb));
                }
                Ok(if verb == DIRECTORY {
                    Operation::Directory
                } else {
                    Operation::Length
                })
            }
            "" => Err("empty verb".to_string()),
            _ => Ok(Operation::Named {
                name: verb,
                args: Args {
                    positional: args,
                    keyword: kwargs,
                },
            }),
        }
    }
}

impl Operation {
    pub fn get(name: impl Into<String>) -> Self {
        Operation::GetAttribute(name.into())
    }

    pub fn set(name: impl Into<String>, value: Value) -> Self {
        Operation::SetAttribute(name.into(), value)
    }

    pub fn delete(name: impl Into<String>) -> Self {
        Operation::DeleteAttribute(name.into())
    }

    pub fn invoke(args: Args) -> Self {
        Operation::Invoke(args)
    }

    pub fn named(name: impl Into<String>, args: Args) -> Self {
        Operation::Named {
            name: name.into(),
            args,
        }
    }

    /// Diagnostic path segment contributed by this step.
    pub fn render(&self) -> String {
        match self {
            Operation::GetAttribute(name)
            | Operation::SetAttribute(name, _)
            | Operation::DeleteAttribute(name) => format!(".{}", name),
            Operation::Named { name, args } if args.is_empty() => format!(".{}", name),
            Operation::Named { name, args } => format!(".{}({})", name, args),
            Operation::Invoke(args) => format!("({})", args),
            Operation::Directory | Operation::Length => String::new(),
        }
    }
}

/// Logging form, e.g. `.x = 5` or `.directory()`.
impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::SetAttribute(name, value) => write!(f, ".{} = {}", name, value),
            Operation::DeleteAttribute(name) => write!(f, ".__del__({})", name),
            Operation::Directory => write!(f, ".__dir__()"),
            Operation::Length => write!(f, ".__len__()"),
            other => write!(f, "{}", other.render()),
        }
    }
}

/// Ordered operations, applied left to right against a root target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestChain(Vec<Operation>);

impl RequestChain {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// A new chain holding this one's operations followed by `op`.
    pub fn then(&self, op: Operation) -> Self {
        let mut ops = self.0.clone();
        ops.push(op);
        Self(ops)
    }

    pub fn operations(&self) -> &[Operation] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Operation>> for RequestChain {
    fn from(ops: Vec<Operation>) -> Self {
        Self(ops)
    }
}

impl fmt::Display for RequestChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for op in &self.0 {
            write!(f, "{}", op)?;
        }
        Ok(())
    }
}

/// Response envelope: exactly one of `result`, `error` or `proxy`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reply {
    Result(Value),
    Error(String),
    Proxy(String),
}
