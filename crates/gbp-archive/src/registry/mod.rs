//! Per-field type conversion for records decoded from JSON.
//!
//! JSON has no timestamps, dates or decimals, so a record written as JSON comes
//! back as strings and numbers. A [`TypeRegistry`] maps `(record kind, field)`
//! to a converter that turns the raw wire value into a typed [`FieldValue`].
//! Fields without a converter pass through unchanged as [`FieldValue::Raw`].
//! Converters for types this crate does not know (decimals, enums) return
//! [`FieldValue::Typed`], which the constructor reads back with
//! [`Fields::required_typed`].
//! The record type's constructor ([`Record::construct`]) then pulls typed
//! values out of the resulting [`Fields`].
//!
//! The registry is built once at startup and shared by reference: registration
//! needs `&mut self`, decoding only `&self`.

pub mod converters;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};
use std::any::{type_name, Any};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Conversion failure raised by a converter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ConversionError {
    pub message: String,
}

impl ConversionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<chrono::ParseError> for ConversionError {
    fn from(err: chrono::ParseError) -> Self {
        Self::new(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The decoded fields do not fit the record type's declared shape.
    #[error("{kind}: shape mismatch: {detail}")]
    ShapeMismatch { kind: &'static str, detail: String },

    /// A registered converter rejected a raw value.
    #[error("{kind}.{field}: {source}")]
    Conversion {
        kind: &'static str,
        field: String,
        #[source]
        source: ConversionError,
    },
}

impl RegistryError {
    pub fn shape(kind: &'static str, detail: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            kind,
            detail: detail.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::ShapeMismatch { .. } => "ShapeMismatch",
            Self::Conversion { .. } => "Conversion",
        }
    }
}

/// A converter's own value, of any type.
///
/// Two typed values are equal only if they are the same allocation.
#[derive(Clone)]
pub struct TypedValue {
    type_name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
}

impl TypedValue {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            type_name: type_name::<T>(),
            value: Arc::new(value),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }
}

impl fmt::Debug for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypedValue").field(&self.type_name).finish()
    }
}

impl PartialEq for TypedValue {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.value).cast::<()>(),
            Arc::as_ptr(&other.value).cast::<()>(),
        )
    }
}

/// A field value after conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Passed through from JSON untouched.
    Raw(Value),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    /// Any other converted value.
    Typed(TypedValue),
}

impl FieldValue {
    pub fn typed<T: Any + Send + Sync>(value: T) -> Self {
        Self::Typed(TypedValue::new(value))
    }

    fn describe(&self) -> &'static str {
        match self {
            Self::Raw(Value::Null) => "null",
            Self::Raw(Value::Bool(_)) => "boolean",
            Self::Raw(Value::Number(_)) => "number",
            Self::Raw(Value::String(_)) => "string",
            Self::Raw(Value::Array(_)) => "array",
            Self::Raw(Value::Object(_)) => "object",
            Self::Timestamp(_) => "timestamp",
            Self::Date(_) => "date",
            Self::Typed(typed) => typed.type_name(),
        }
    }
}

/// Converter from a raw JSON value to a typed field value.
pub type Converter = Arc<dyn Fn(Value) -> Result<FieldValue, ConversionError> + Send + Sync>;

/// A record type that can be rebuilt from converted fields.
pub trait Record: Sized {
    /// Registry key for this record type.
    const KIND: &'static str;

    /// Declared fields, in declaration order.
    const FIELDS: &'static [&'static str];

    /// Build the record, taking the fields it knows from `fields`.
    ///
    /// Fields left behind are reported as unknown by the registry.
    fn construct(fields: &mut Fields) -> Result<Self, RegistryError>;
}

/// Converted fields awaiting construction.
#[derive(Debug)]
pub struct Fields {
    kind: &'static str,
    values: BTreeMap<String, FieldValue>,
}

impl Fields {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            values: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        self.values.insert(name.into(), value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Remove and return a field.
    pub fn take(&mut self, name: &str) -> Option<FieldValue> {
        self.values.remove(name)
    }

    pub fn required(&mut self, name: &str) -> Result<FieldValue, RegistryError> {
        self.take(name)
            .ok_or_else(|| RegistryError::shape(self.kind, format!("missing field '{}'", name)))
    }

    pub fn required_str(&mut self, name: &str) -> Result<String, RegistryError> {
        match self.required(name)? {
            FieldValue::Raw(Value::String(s)) => Ok(s),
            other => Err(self.mismatch(name, "string", &other)),
        }
    }

    pub fn optional_str(&mut self, name: &str) -> Result<Option<String>, RegistryError> {
        match self.take(name) {
            None | Some(FieldValue::Raw(Value::Null)) => Ok(None),
            Some(FieldValue::Raw(Value::String(s))) => Ok(Some(s)),
            Some(other) => Err(self.mismatch(name, "string or null", &other)),
        }
    }

    pub fn bool_or(&mut self, name: &str, default: bool) -> Result<bool, RegistryError> {
        match self.take(name) {
            None => Ok(default),
            Some(FieldValue::Raw(Value::Bool(b))) => Ok(b),
            Some(other) => Err(self.mismatch(name, "boolean", &other)),
        }
    }

    pub fn optional_timestamp(&mut self, name: &str) -> Result<Option<DateTime<Utc>>, RegistryError> {
        match self.take(name) {
            None | Some(FieldValue::Raw(Value::Null)) => Ok(None),
            Some(FieldValue::Timestamp(ts)) => Ok(Some(ts)),
            Some(other) => Err(self.mismatch(name, "timestamp or null", &other)),
        }
    }

    pub fn required_date(&mut self, name: &str) -> Result<NaiveDate, RegistryError> {
        match self.required(name)? {
            FieldValue::Date(date) => Ok(date),
            other => Err(self.mismatch(name, "date", &other)),
        }
    }

    /// A value a converter produced with [`FieldValue::typed`].
    pub fn required_typed<T: Any + Clone>(&mut self, name: &str) -> Result<T, RegistryError> {
        match self.required(name)? {
            FieldValue::Typed(typed) => self.downcast(name, typed),
            other => Err(self.mismatch(name, type_name::<T>(), &other)),
        }
    }

    pub fn optional_typed<T: Any + Clone>(&mut self, name: &str) -> Result<Option<T>, RegistryError> {
        match self.take(name) {
            None | Some(FieldValue::Raw(Value::Null)) => Ok(None),
            Some(FieldValue::Typed(typed)) => self.downcast(name, typed).map(Some),
            Some(other) => Err(self.mismatch(name, type_name::<T>(), &other)),
        }
    }

    fn downcast<T: Any + Clone>(&self, name: &str, typed: TypedValue) -> Result<T, RegistryError> {
        if let Some(value) = typed.downcast_ref::<T>() {
            return Ok(value.clone());
        }
        Err(self.mismatch(name, type_name::<T>(), &FieldValue::Typed(typed)))
    }

    /// Any raw JSON value, unconverted.
    pub fn required_raw(&mut self, name: &str) -> Result<Value, RegistryError> {
        match self.required(name)? {
            FieldValue::Raw(value) => Ok(value),
            other => Err(self.mismatch(name, "raw JSON value", &other)),
        }
    }

    /// Fail if any field was not consumed by the constructor.
    pub fn finish(self) -> Result<(), RegistryError> {
        if self.values.is_empty() {
            return Ok(());
        }
        let unknown: Vec<&str> = self.values.keys().map(String::as_str).collect();
        Err(RegistryError::shape(
            self.kind,
            format!("unknown field(s): {}", unknown.join(", ")),
        ))
    }

    fn mismatch(&self, name: &str, expected: &str, found: &FieldValue) -> RegistryError {
        RegistryError::shape(
            self.kind,
            format!(
                "field '{}' expected {}, found {}",
                name,
                expected,
                found.describe()
            ),
        )
    }
}

/// Table of `(record kind, field) → converter`.
#[derive(Clone, Default)]
pub struct TypeRegistry {
    converters: HashMap<&'static str, HashMap<String, Converter>>,
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (kind, fields) in &self.converters {
            let mut names: Vec<&str> = fields.keys().map(String::as_str).collect();
            names.sort_unstable();
            map.entry(kind, &names);
        }
        map.finish()
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the converters every build record needs.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        crate::record::register_converters(&mut registry);
        registry
    }

    /// Install `converter` for `field` of record type `R`.
    ///
    /// A second registration for the same field replaces the first.
    pub fn register<R, F>(&mut self, field: impl Into<String>, converter: F) -> &mut Self
    where
        R: Record,
        F: Fn(Value) -> Result<FieldValue, ConversionError> + Send + Sync + 'static,
    {
        self.register_kind(R::KIND, field, Arc::new(converter))
    }

    pub fn register_kind(
        &mut self,
        kind: &'static str,
        field: impl Into<String>,
        converter: Converter,
    ) -> &mut Self {
        self.converters
            .entry(kind)
            .or_default()
            .insert(field.into(), converter);
        self
    }

    pub fn converter(&self, kind: &str, field: &str) -> Option<&Converter> {
        self.converters.get(kind)?.get(field)
    }

    /// Convert raw fields and construct an `R`.
    ///
    /// When exactly one field is present it is bound to the type's first
    /// declared field whatever its key; this keeps archives written by older
    /// tools readable.
    pub fn reconstruct<R: Record>(&self, raw: Map<String, Value>) -> Result<R, RegistryError> {
        let positional = raw.len() == 1;
        let mut fields = Fields::new(R::KIND);

        for (name, value) in raw {
            let value = match self.converter(R::KIND, &name) {
                Some(convert) => convert(value).map_err(|source| RegistryError::Conversion {
                    kind: R::KIND,
                    field: name.clone(),
                    source,
                })?,
                None => FieldValue::Raw(value),
            };

            let name = if positional {
                let first = R::FIELDS
                    .first()
                    .ok_or_else(|| RegistryError::shape(R::KIND, "type declares no fields"))?;
                (*first).to_string()
            } else {
                name
            };
            fields.insert(name, value);
        }

        let record = R::construct(&mut fields)?;
        fields.finish()?;
        Ok(record)
    }

    /// Like [`reconstruct`](Self::reconstruct) but for an arbitrary JSON value,
    /// which must be an object.
    pub fn reconstruct_value<R: Record>(&self, value: Value) -> Result<R, RegistryError> {
        match value {
            Value::Object(map) => self.reconstruct(map),
            other => Err(RegistryError::shape(
                R::KIND,
                format!("expected a JSON object, found {}", FieldValue::Raw(other).describe()),
            )),
        }
    }
}
