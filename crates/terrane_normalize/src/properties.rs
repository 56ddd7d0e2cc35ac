//! Native property to canonical property conversion.

use terrane_model::mapping::canonical_property_name;
use terrane_model::{Dialect, PropertyValue, ResourceNode, TypeSchema, WarningKind};

use crate::fragment::Fragment;

/// Converts the native properties of one resource type.
#[derive(Debug, Clone)]
pub struct PropertyConverter {
    dialect: Dialect,
    resource_type: String,
    schema: Option<&'static TypeSchema>,
    opaque_type: bool,
}

impl PropertyConverter {
    pub fn new(dialect: Dialect, resource_type: &str) -> Self {
        Self {
            dialect,
            resource_type: resource_type.to_string(),
            schema: TypeSchema::get(resource_type),
            opaque_type: resource_type.starts_with(terrane_model::UNKNOWN_PREFIX),
        }
    }

    /// Canonical name and coerced value, or the value back when it has
    /// to stay opaque.
    ///
    /// Types without a canonical mapping keep every property under its
    /// native name as a node property, not in the metadata bag, so that
    /// references inside them take part in edge derivation and renames.
    pub fn convert(&self, native: &str, value: PropertyValue) -> Result<(String, PropertyValue), PropertyValue> {
        if self.opaque_type {
            return Ok((native.to_string(), value));
        }
        let name = match canonical_property_name(self.dialect, &self.resource_type, native) {
            Some(name) => name,
            None => return Err(value),
        };
        match self.schema.and_then(|schema| schema.property(&name)) {
            Some(spec) => spec.kind.coerce(value).map(|value| (name, value)),
            None => Ok((name, value)),
        }
    }

    /// Store a native property on `node`, as a canonical property or in
    /// the opaque bag with a warning.
    pub fn assign(&self, node: &mut ResourceNode, native: &str, value: PropertyValue, fragment: &mut Fragment) {
        match self.convert(native, value) {
            Ok((name, value)) => {
                node.properties.insert(name, value);
            }
            Err(value) => {
                fragment.warn(
                    WarningKind::OpaqueProperty,
                    Some(&node.id),
                    format!("property {} kept as opaque {} metadata", native, self.dialect),
                );
                node.metadata.opaque.insert(native.to_string(), value);
            }
        }
    }
}
