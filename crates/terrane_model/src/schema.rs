//! Per-type property schemas used for typed coercion and required-property checks.

use serde::{Deserialize, Serialize};

use crate::value::PropertyValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    String,
    Integer,
    Boolean,
    List,
    Map,
    Any,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::Integer => "integer",
            ValueKind::Boolean => "boolean",
            ValueKind::List => "list",
            ValueKind::Map => "map",
            ValueKind::Any => "any",
        }
    }

    /// Coerce a value to this kind.
    ///
    /// Non-literal values (references, templates, expressions) pass through.
    /// On mismatch the original value is handed back in `Err`.
    pub fn coerce(&self, value: PropertyValue) -> Result<PropertyValue, PropertyValue> {
        match (self, value) {
            (ValueKind::Any, v) => Ok(v),
            (_, PropertyValue::Null) => Ok(PropertyValue::Null),
            (
                _,
                v @ (PropertyValue::Reference(_)
                | PropertyValue::Template(_)
                | PropertyValue::Shared(_)
                | PropertyValue::Expression(_)),
            ) => Ok(v),

            (ValueKind::String, v @ PropertyValue::String(_)) => Ok(v),
            (ValueKind::String, PropertyValue::Int(i)) => Ok(PropertyValue::String(i.to_string())),
            (ValueKind::String, PropertyValue::Float(f)) => Ok(PropertyValue::String(f.to_string())),
            (ValueKind::String, PropertyValue::Bool(b)) => Ok(PropertyValue::String(b.to_string())),

            (ValueKind::Integer, v @ PropertyValue::Int(_)) => Ok(v),
            (ValueKind::Integer, PropertyValue::String(s)) => match s.trim().parse::<i64>() {
                Ok(i) => Ok(PropertyValue::Int(i)),
                Err(_) => Err(PropertyValue::String(s)),
            },

            (ValueKind::Boolean, v @ PropertyValue::Bool(_)) => Ok(v),
            (ValueKind::Boolean, PropertyValue::String(s)) => match s.to_lowercase().as_str() {
                "true" | "yes" => Ok(PropertyValue::Bool(true)),
                "false" | "no" => Ok(PropertyValue::Bool(false)),
                _ => Err(PropertyValue::String(s)),
            },

            (ValueKind::List, v @ PropertyValue::List(_)) => Ok(v),
            (ValueKind::Map, v @ PropertyValue::Map(_)) => Ok(v),

            (_, v) => Err(v),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertySpec {
    pub name: &'static str,
    pub kind: ValueKind,
    pub required: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct TypeSchema {
    pub canonical: &'static str,
    pub properties: &'static [PropertySpec],
}

macro_rules! req {
    ($name:expr, $kind:ident) => {
        PropertySpec {
            name: $name,
            kind: ValueKind::$kind,
            required: true,
        }
    };
}

macro_rules! opt {
    ($name:expr, $kind:ident) => {
        PropertySpec {
            name: $name,
            kind: ValueKind::$kind,
            required: false,
        }
    };
}

const WORKLOAD: &[PropertySpec] = &[
    opt!("replicas", Integer),
    req!("selector", Map),
    req!("template", Map),
    opt!("labels", Map),
];

const COMMAND: &[PropertySpec] = &[
    req!("cmd", String),
    opt!("creates", String),
    opt!("removes", String),
    opt!("chdir", String),
];

pub static SCHEMAS: &[TypeSchema] = &[
    TypeSchema {
        canonical: "compute.instance",
        properties: &[
            req!("instance_type", String),
            req!("image_id", String),
            opt!("subnet_id", String),
            opt!("key_name", String),
            opt!("security_group_ids", List),
            opt!("user_data", String),
            opt!("monitoring", Boolean),
            opt!("tags", Map),
        ],
    },
    TypeSchema {
        canonical: "compute.function",
        properties: &[
            opt!("function_name", String),
            opt!("runtime", String),
            opt!("handler", String),
            req!("role", String),
            opt!("memory_size", Integer),
            opt!("timeout", Integer),
            opt!("tags", Map),
        ],
    },
    TypeSchema {
        canonical: "network.vpc",
        properties: &[
            req!("cidr_block", String),
            opt!("enable_dns_hostnames", Boolean),
            opt!("enable_dns_support", Boolean),
            opt!("tags", Map),
        ],
    },
    TypeSchema {
        canonical: "network.subnet",
        properties: &[
            req!("cidr_block", String),
            req!("vpc_id", String),
            opt!("availability_zone", String),
            opt!("map_public_ip_on_launch", Boolean),
            opt!("tags", Map),
        ],
    },
    TypeSchema {
        canonical: "network.securitygroup",
        properties: &[
            opt!("name", String),
            opt!("description", String),
            opt!("vpc_id", String),
            opt!("ingress", List),
            opt!("egress", List),
            opt!("tags", Map),
        ],
    },
    TypeSchema {
        canonical: "storage.bucket",
        properties: &[
            opt!("bucket_name", String),
            opt!("acl", String),
            opt!("versioning", Any),
            opt!("encryption", Any),
            opt!("tags", Map),
        ],
    },
    TypeSchema {
        canonical: "storage.volume",
        properties: &[
            req!("availability_zone", String),
            opt!("size", Integer),
            opt!("encrypted", Boolean),
            opt!("tags", Map),
        ],
    },
    TypeSchema {
        canonical: "database.instance",
        properties: &[
            req!("engine", String),
            req!("instance_class", String),
            opt!("allocated_storage", Integer),
            opt!("storage_encrypted", Boolean),
            opt!("publicly_accessible", Boolean),
            opt!("multi_az", Boolean),
            opt!("username", String),
            opt!("password", String),
            opt!("tags", Map),
        ],
    },
    TypeSchema {
        canonical: "identity.role",
        properties: &[req!("assume_role_policy", Any), opt!("tags", Map)],
    },
    TypeSchema {
        canonical: "messaging.queue",
        properties: &[opt!("name", String), opt!("delay_seconds", Integer), opt!("tags", Map)],
    },
    TypeSchema {
        canonical: "workload.deployment",
        properties: WORKLOAD,
    },
    TypeSchema {
        canonical: "workload.statefulset",
        properties: WORKLOAD,
    },
    TypeSchema {
        canonical: "workload.daemonset",
        properties: WORKLOAD,
    },
    TypeSchema {
        canonical: "workload.job",
        properties: &[req!("template", Map), opt!("backoff_limit", Integer)],
    },
    TypeSchema {
        canonical: "workload.cronjob",
        properties: &[req!("schedule", String), req!("job_template", Map)],
    },
    TypeSchema {
        canonical: "workload.pod",
        properties: &[req!("containers", List)],
    },
    TypeSchema {
        canonical: "network.service",
        properties: &[opt!("selector", Map), opt!("ports", List), opt!("type", String)],
    },
    TypeSchema {
        canonical: "config.map",
        properties: &[opt!("data", Map)],
    },
    TypeSchema {
        canonical: "config.secret",
        properties: &[opt!("data", Map), opt!("string_data", Map), opt!("type", String)],
    },
    TypeSchema {
        canonical: "storage.claim",
        properties: &[opt!("access_modes", List), opt!("resources", Map)],
    },
    TypeSchema {
        canonical: "config.package",
        properties: &[req!("name", Any), opt!("state", String)],
    },
    TypeSchema {
        canonical: "config.service",
        properties: &[req!("name", String), opt!("state", String), opt!("enabled", Boolean)],
    },
    TypeSchema {
        canonical: "config.file",
        properties: &[req!("path", String), opt!("state", String), opt!("mode", Any)],
    },
    TypeSchema {
        canonical: "config.copy",
        properties: &[req!("dest", String), opt!("src", String), opt!("mode", Any)],
    },
    TypeSchema {
        canonical: "config.template",
        properties: &[req!("src", String), req!("dest", String), opt!("mode", Any)],
    },
    TypeSchema {
        canonical: "os.user",
        properties: &[req!("name", String), opt!("state", String), opt!("groups", Any)],
    },
    TypeSchema {
        canonical: "exec.command",
        properties: COMMAND,
    },
    TypeSchema {
        canonical: "exec.shell",
        properties: COMMAND,
    },
];

impl TypeSchema {
    pub fn get(canonical: &str) -> Option<&'static TypeSchema> {
        SCHEMAS.iter().find(|s| s.canonical == canonical)
    }

    pub fn property(&self, name: &str) -> Option<&'static PropertySpec> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn required(&self) -> impl Iterator<Item = &'static str> {
        self.properties.iter().filter(|p| p.required).map(|p| p.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ReferenceToken;

    #[test]
    fn test_integer_coercion() {
        assert_eq!(ValueKind::Integer.coerce("20".into()), Ok(PropertyValue::Int(20)));
        assert_eq!(ValueKind::Integer.coerce("twenty".into()), Err(PropertyValue::from("twenty")));
    }

    #[test]
    fn test_boolean_and_string_coercion() {
        assert_eq!(ValueKind::Boolean.coerce("yes".into()), Ok(PropertyValue::Bool(true)));
        assert_eq!(ValueKind::String.coerce(PropertyValue::Int(8080)), Ok("8080".into()));
        assert!(ValueKind::Map.coerce("x".into()).is_err());
    }

    #[test]
    fn test_references_pass_through() {
        let token = PropertyValue::Reference(ReferenceToken::new("aws_vpc.main"));
        assert_eq!(ValueKind::Integer.coerce(token.clone()), Ok(token));
    }

    #[test]
    fn test_required_properties() {
        let schema = TypeSchema::get("database.instance").unwrap();
        let required: Vec<_> = schema.required().collect();
        assert_eq!(required, vec!["engine", "instance_class"]);
        assert!(TypeSchema::get("unknown.thing").is_none());
    }
}
