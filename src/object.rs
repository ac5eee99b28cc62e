//! Target-side object model.
//!
//! A module exposes its object graph through [`RemoteObject`]. Most modules
//! build their root with [`ObjectTable`], a registration table mapping exposed
//! names to fields, getters, methods and child objects.

use crate::args::Args;
use crate::error::ObjectError;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, RwLock};

pub type ObjectResult<T> = std::result::Result<T, ObjectError>;

/// Result of one interpreted step: a plain value or a live object.
///
/// Only values can travel back over the wire; objects are answered with a
/// proxy marker carrying [`RemoteObject::describe`].
#[derive(Clone)]
pub enum Target {
    Value(Value),
    Object(Arc<dyn RemoteObject>),
}

impl Target {
    pub fn value(value: impl Serialize) -> ObjectResult<Self> {
        serde_json::to_value(value)
            .map(Target::Value)
            .map_err(|e| ObjectError::unexpected(format!("value not representable: {}", e)))
    }

    pub fn object(object: impl RemoteObject) -> Self {
        Target::Object(Arc::new(object))
    }

    pub fn describe(&self) -> String {
        match self {
            Target::Value(v) => v.to_string(),
            Target::Object(o) => o.describe(),
        }
    }
}

impl From<Value> for Target {
    fn from(value: Value) -> Self {
        Target::Value(value)
    }
}

impl From<Arc<dyn RemoteObject>> for Target {
    fn from(object: Arc<dyn RemoteObject>) -> Self {
        Target::Object(object)
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Target::Object(o) => f.debug_tuple("Object").field(&o.describe()).finish(),
        }
    }
}

/// An object whose attributes can be read, written, deleted and invoked by
/// remote request chains.
#[async_trait]
pub trait RemoteObject: Send + Sync + 'static {
    /// Human-readable description, sent back in proxy markers.
    fn describe(&self) -> String;

    async fn get_attr(&self, name: &str) -> ObjectResult<Target> {
        Err(ObjectError::AttributeNotFound(name.to_string()))
    }

    async fn set_attr(&self, name: &str, _value: Value) -> ObjectResult<()> {
        Err(ObjectError::AttributeNotFound(name.to_string()))
    }

    async fn del_attr(&self, name: &str) -> ObjectResult<()> {
        Err(ObjectError::AttributeNotFound(name.to_string()))
    }

    async fn invoke(&self, _args: Args) -> ObjectResult<Target> {
        Err(ObjectError::unexpected(format!(
            "{} is not callable",
            self.describe()
        )))
    }

    fn directory(&self) -> Vec<String> {
        Vec::new()
    }

    async fn length(&self) -> ObjectResult<usize> {
        Err(ObjectError::unexpected(format!(
            "{} has no length",
            self.describe()
        )))
    }
}

type Getter = Arc<dyn Fn() -> ObjectResult<Value> + Send + Sync>;
type MethodFn = Arc<dyn Fn(Args) -> BoxFuture<'static, ObjectResult<Target>> + Send + Sync>;
type LengthFn = Arc<dyn Fn() -> ObjectResult<usize> + Send + Sync>;

const HELP: &str = "help";

#[derive(Clone)]
struct MethodEntry {
    func: MethodFn,
    doc: Option<String>,
}

/// A registered method looked up by name, callable by a later `invoke` step.
struct BoundMethod {
    owner: String,
    name: String,
    func: MethodFn,
}

#[async_trait]
impl RemoteObject for BoundMethod {
    fn describe(&self) -> String {
        format!("<method {}.{}>", self.owner, self.name)
    }

    async fn invoke(&self, args: Args) -> ObjectResult<Target> {
        (self.func)(args).await
    }
}

/// Registration table exposing a fixed set of names.
///
/// ```rust
/// use modwire::{ObjectTable, Target};
/// use serde_json::json;
///
/// let calc = ObjectTable::builder("calc")
///     .field("precision", 2)
///     .method("add", |args| {
///         let a: i64 = args.get(0)?;
///         let b: i64 = args.get(1)?;
///         Ok(json!(a + b))
///     })
///     .doc("add", "add(a, b) -> a + b")
///     .build();
/// # let _ = calc;
/// ```
pub struct ObjectTable {
    name: String,
    fields: RwLock<BTreeMap<String, Value>>,
    getters: BTreeMap<String, Getter>,
    methods: BTreeMap<String, MethodEntry>,
    children: BTreeMap<String, Arc<dyn RemoteObject>>,
    length: Option<LengthFn>,
}

impl ObjectTable {
    pub fn builder(name: impl Into<String>) -> ObjectTableBuilder {
        ObjectTableBuilder {
            table: ObjectTable {
                name: name.into(),
                fields: RwLock::new(BTreeMap::new()),
                getters: BTreeMap::new(),
                methods: BTreeMap::new(),
                children: BTreeMap::new(),
                length: None,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current value of a plain field.
    pub fn field(&self, name: &str) -> Option<Value> {
        self.fields.read().ok()?.get(name).cloned()
    }

    fn is_fixed(&self, name: &str) -> bool {
        self.getters.contains_key(name)
            || self.methods.contains_key(name)
            || self.children.contains_key(name)
            || name == HELP
    }

    fn help(&self) -> ObjectResult<Value> {
        let mut entries = Vec::new();
        for name in self.directory() {
            match self.methods.get(&name) {
                Some(entry) => entries.push(Value::Array(vec![
                    Value::String(name),
                    entry.doc.clone().map(Value::String).unwrap_or(Value::Null),
                ])),
                None if name == HELP => {}
                None => entries.push(Value::String(name)),
            }
        }
        Ok(Value::Array(entries))
    }

    fn bound(&self, name: &str, func: MethodFn) -> Target {
        Target::Object(Arc::new(BoundMethod {
            owner: self.name.clone(),
            name: name.to_string(),
            func,
        }))
    }
}

fn poisoned() -> ObjectError {
    ObjectError::unexpected("field table lock poisoned")
}

fn is_private(name: &str) -> bool {
    name.starts_with('_')
}

#[async_trait]
impl RemoteObject for ObjectTable {
    fn describe(&self) -> String {
        format!("<object {}>", self.name)
    }

    async fn get_attr(&self, name: &str) -> ObjectResult<Target> {
        if is_private(name) {
            return Err(ObjectError::AttributeNotFound(name.to_string()));
        }
        if let Some(value) = self.fields.read().map_err(|_| poisoned())?.get(name) {
            return Ok(Target::Value(value.clone()));
        }
        if let Some(getter) = self.getters.get(name) {
            return getter().map(Target::Value);
        }
        if let Some(entry) = self.methods.get(name) {
            return Ok(self.bound(name, entry.func.clone()));
        }
        if let Some(child) = self.children.get(name) {
            return Ok(Target::Object(child.clone()));
        }
        if name == HELP {
            let help = Target::Value(self.help()?);
            let func: MethodFn =
                Arc::new(move |_| futures::future::ready(Ok(help.clone())).boxed());
            return Ok(self.bound(name, func));
        }
        Err(ObjectError::AttributeNotFound(name.to_string()))
    }

    async fn set_attr(&self, name: &str, value: Value) -> ObjectResult<()> {
        if is_private(name) {
            return Err(ObjectError::AttributeNotFound(name.to_string()));
        }
        if self.is_fixed(name) {
            return Err(ObjectError::application(format!(
                "attribute '{}' of {} is read-only",
                name, self.name
            )));
        }
        self.fields
            .write()
            .map_err(|_| poisoned())?
            .insert(name.to_string(), value);
        Ok(())
    }

    async fn del_attr(&self, name: &str) -> ObjectResult<()> {
        if is_private(name) {
            return Err(ObjectError::AttributeNotFound(name.to_string()));
        }
        if self.fields.write().map_err(|_| poisoned())?.remove(name).is_some() {
            return Ok(());
        }
        if self.is_fixed(name) {
            return Err(ObjectError::application(format!(
                "attribute '{}' of {} is read-only",
                name, self.name
            )));
        }
        Err(ObjectError::AttributeNotFound(name.to_string()))
    }

    fn directory(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .fields
            .read()
            .map(|fields| fields.keys().cloned().collect())
            .unwrap_or_default();
        names.extend(self.getters.keys().cloned());
        names.extend(self.methods.keys().cloned());
        names.extend(self.children.keys().cloned());
        names.push(HELP.to_string());
        names.retain(|n| !is_private(n));
        names.sort();
        names.dedup();
        names
    }

    async fn length(&self) -> ObjectResult<usize> {
        match self.length {
            Some(ref len) => len(),
            None => Err(ObjectError::unexpected(format!(
                "{} has no length",
                self.describe()
            ))),
        }
    }
}

pub struct ObjectTableBuilder {
    table: ObjectTable,
}

impl ObjectTableBuilder {
    /// Plain value field, settable and deletable remotely.
    pub fn field(self, name: impl Into<String>, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        if let Ok(mut fields) = self.table.fields.write() {
            fields.insert(name.into(), value);
        }
        self
    }

    /// Read-only computed attribute.
    pub fn getter<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> ObjectResult<Value> + Send + Sync + 'static,
    {
        self.table.getters.insert(name.into(), Arc::new(f));
        self
    }

    pub fn method<F, R>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Args) -> ObjectResult<R> + Send + Sync + 'static,
        R: Into<Target> + 'static,
    {
        let func: MethodFn =
            Arc::new(move |args| futures::future::ready(f(args).map(Into::into)).boxed());
        self.table
            .methods
            .insert(name.into(), MethodEntry { func, doc: None });
        self
    }

    pub fn async_method<F, Fut, R>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ObjectResult<R>> + Send + 'static,
        R: Into<Target> + 'static,
    {
        let func: MethodFn = Arc::new(move |args| f(args).map(|r| r.map(Into::into)).boxed());
        self.table
            .methods
            .insert(name.into(), MethodEntry { func, doc: None });
        self
    }

    /// Attach a doc line to an already registered method.
    pub fn doc(mut self, method: &str, doc: impl Into<String>) -> Self {
        if let Some(entry) = self.table.methods.get_mut(method) {
            entry.doc = Some(doc.into());
        }
        self
    }

    pub fn child(self, name: impl Into<String>, object: impl RemoteObject) -> Self {
        self.child_arc(name, Arc::new(object))
    }

    pub fn child_arc(mut self, name: impl Into<String>, object: Arc<dyn RemoteObject>) -> Self {
        self.table.children.insert(name.into(), object);
        self
    }

    pub fn length<F>(mut self, f: F) -> Self
    where
        F: Fn() -> ObjectResult<usize> + Send + Sync + 'static,
    {
        self.table.length = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> ObjectTable {
        self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;
    use serde_json::json;
    use std::sync::atomic::{AtomicI64, Ordering};

    fn calc() -> ObjectTable {
        let counter = Arc::new(AtomicI64::new(0));
        let c = Arc::clone(&counter);
        ObjectTable::builder("calc")
            .field("precision", 2)
            .getter("count", move || Ok(json!(c.load(Ordering::SeqCst))))
            .method("add", |args| {
                let a: i64 = args.get(0)?;
                let b: i64 = args.get(1)?;
                Ok(json!(a + b))
            })
            .doc("add", "add(a, b)")
            .async_method("bump", move |_| {
                let counter = Arc::clone(&counter);
                async move { Ok(json!(counter.fetch_add(1, Ordering::SeqCst) + 1)) }
            })
            .child("memory", ObjectTable::builder("memory").field("slots", 4).build())
            .length(|| Ok(3))
            .build()
    }

    #[tokio::test]
    async fn test_get_field_and_getter() {
        let calc = calc();
        assert!(matches!(calc.get_attr("precision").await, Ok(Target::Value(v)) if v == json!(2)));
        assert!(matches!(calc.get_attr("count").await, Ok(Target::Value(v)) if v == json!(0)));
    }

    #[tokio::test]
    async fn test_method_lookup_then_invoke() {
        let calc = calc();
        let Ok(Target::Object(add)) = calc.get_attr("add").await else {
            panic!("method should resolve to an object");
        };
        assert_eq!(add.describe(), "<method calc.add>");
        let result = add.invoke(args![2, 3]).await.unwrap();
        assert!(matches!(result, Target::Value(v) if v == json!(5)));
    }

    #[tokio::test]
    async fn test_async_method() {
        let calc = calc();
        let Ok(Target::Object(bump)) = calc.get_attr("bump").await else {
            panic!("method should resolve to an object");
        };
        bump.invoke(Args::new()).await.unwrap();
        assert!(matches!(calc.get_attr("count").await, Ok(Target::Value(v)) if v == json!(1)));
    }

    #[tokio::test]
    async fn test_set_creates_and_delete_removes() {
        let calc = calc();
        calc.set_attr("x", json!(5)).await.unwrap();
        assert_eq!(calc.field("x"), Some(json!(5)));
        calc.del_attr("x").await.unwrap();
        assert_eq!(calc.field("x"), None);
        assert_eq!(
            calc.del_attr("x").await.unwrap_err(),
            ObjectError::AttributeNotFound("x".into())
        );
    }

    #[tokio::test]
    async fn test_fixed_names_are_read_only() {
        let calc = calc();
        assert!(matches!(
            calc.set_attr("add", json!(1)).await,
            Err(ObjectError::Application(_))
        ));
        assert!(matches!(
            calc.del_attr("memory").await,
            Err(ObjectError::Application(_))
        ));
    }

    #[tokio::test]
    async fn test_private_names_hidden() {
        let calc = ObjectTable::builder("calc").field("_secret", 1).build();
        assert_eq!(
            calc.get_attr("_secret").await.unwrap_err(),
            ObjectError::AttributeNotFound("_secret".into())
        );
        assert!(calc.set_attr("_secret", json!(2)).await.is_err());
        assert!(!calc.directory().contains(&"_secret".to_string()));
    }

    #[tokio::test]
    async fn test_directory_and_help() {
        let calc = calc();
        assert_eq!(
            calc.directory(),
            vec!["add", "bump", "count", "help", "memory", "precision"]
        );
        let Ok(Target::Object(help)) = calc.get_attr("help").await else {
            panic!("help should be a method");
        };
        let Target::Value(entries) = help.invoke(Args::new()).await.unwrap() else {
            panic!("help returns a value");
        };
        assert_eq!(
            entries,
            json!([["add", "add(a, b)"], ["bump", null], "count", "memory", "precision"])
        );
    }

    #[tokio::test]
    async fn test_length() {
        assert_eq!(calc().length().await.unwrap(), 3);
        let bare = ObjectTable::builder("bare").build();
        assert!(matches!(bare.length().await, Err(ObjectError::Unexpected(_))));
    }

    #[tokio::test]
    async fn test_table_is_not_callable() {
        let err = calc().invoke(Args::new()).await.unwrap_err();
        assert_eq!(err, ObjectError::Unexpected("<object calc> is not callable".into()));
    }
}
