// Serialization plugin contract
//
// Plugins adapt foreign data types (ORM rows, model objects) into plain JSON
// mappings before the response body is serialized. The conversion may itself
// be asynchronous.

use crate::error::Error;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

#[async_trait]
pub trait SerializationPlugin: Send + Sync {
    /// Whether this plugin can normalize the given value.
    fn supports(&self, value: &Value) -> bool;

    /// Convert the value into a plain mapping.
    async fn to_dict(&self, value: Value) -> Result<Value, Error>;
}

/// Find the first plugin supporting the value. For arrays the first element
/// decides, so a homogeneous list is normalized element-wise by one plugin.
pub fn plugin_for_value<'a>(
    value: &Value,
    plugins: &'a [Arc<dyn SerializationPlugin>],
) -> Option<&'a Arc<dyn SerializationPlugin>> {
    let probe = match value {
        Value::Array(items) => items.first()?,
        other => other,
    };
    plugins.iter().find(|plugin| plugin.supports(probe))
}

/// Normalize response data through the registered plugins, awaiting the
/// conversion and applying it element-wise for list values. Data no plugin
/// supports passes through unchanged.
pub async fn normalize_response_data(
    data: Value,
    plugins: &[Arc<dyn SerializationPlugin>],
) -> Result<Value, Error> {
    let Some(plugin) = plugin_for_value(&data, plugins) else {
        return Ok(data);
    };

    match data {
        Value::Array(items) => {
            let mut converted = Vec::with_capacity(items.len());
            for item in items {
                converted.push(plugin.to_dict(item).await?);
            }
            Ok(Value::Array(converted))
        }
        other => plugin.to_dict(other).await,
    }
}
