// Data transfer object contract
//
// A DTO type declares how to build itself from a plain mapping or from a
// model instance. Handlers registered with a DTO return kind get their plain
// return values coerced through the DTO before serialization, element-wise
// for iterable return kinds.

use crate::error::Error;
use serde_json::{Map, Value};
use std::sync::Arc;

pub trait Dto: Send + Sync + Sized {
    /// Build the DTO from a plain JSON mapping.
    fn from_mapping(mapping: &Map<String, Value>) -> Result<Self, Error>;

    /// Build the DTO from a model instance (any non-mapping value).
    fn from_model_instance(value: &Value) -> Result<Self, Error>;

    /// The serialized shape of this DTO.
    fn into_value(self) -> Value;
}

/// Type-erased DTO conversion bound to a route handler at registration time.
#[derive(Clone)]
pub struct DtoSpec {
    convert: Arc<dyn Fn(&Value) -> Result<Value, Error> + Send + Sync>,
    type_name: &'static str,
}

impl DtoSpec {
    pub fn of<T: Dto + 'static>() -> Self {
        Self {
            convert: Arc::new(|value: &Value| {
                let dto = match value {
                    Value::Object(mapping) => T::from_mapping(mapping)?,
                    other => T::from_model_instance(other)?,
                };
                Ok(dto.into_value())
            }),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Coerce one value through the DTO.
    pub fn coerce(&self, value: &Value) -> Result<Value, Error> {
        (self.convert)(value)
    }

    /// Coerce each element of an array value through the DTO.
    pub fn coerce_elements(&self, value: &Value) -> Result<Value, Error> {
        match value {
            Value::Array(items) => {
                let converted = items
                    .iter()
                    .map(|item| self.coerce(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Array(converted))
            }
            other => self.coerce(other),
        }
    }
}

impl std::fmt::Debug for DtoSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DtoSpec").field("type_name", &self.type_name).finish()
    }
}
