//! Resource definitions
//!
//! A [`ResourceDefinition`] is the loaded, validated description of one
//! resource type. It doubles as the dispatch table for its operations and
//! as the read-only introspection surface used by documentation tooling.

use super::operation::{Load, Operation, OperationKind};
use crate::error::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Type of a shape member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberType {
    String,
    Integer,
    Long,
    Float,
    Double,
    Boolean,
    Timestamp,
    Blob,
    List,
    Map,
    Structure,
}

impl MemberType {
    /// Type name shown in generated documentation
    pub fn doc_type(&self) -> &'static str {
        match self {
            Self::Blob => "String<bytes>",
            Self::Boolean => "Boolean",
            Self::Float | Self::Double => "Float",
            Self::Integer | Self::Long => "Integer",
            Self::List => "Array",
            Self::Map => "Hash",
            Self::String => "String",
            Self::Structure => "Structure",
            Self::Timestamp => "Time",
        }
    }
}

/// Data shape bound to a resource type
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    pub name: String,
    pub members: IndexMap<String, MemberType>,
}

/// Static description of one resource type
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDefinition {
    name: String,
    identifiers: Vec<String>,
    shape: Option<Shape>,
    operations: IndexMap<String, Operation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeDescription {
    pub name: String,
    #[serde(rename = "type")]
    pub member_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationDescription {
    pub name: String,
    pub kind: OperationKind,
    pub group: String,
    pub requires_argument: bool,
    pub arguments: Vec<String>,
    pub plural: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub return_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_operation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescription {
    pub name: String,
    pub identifiers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shape: Option<String>,
    pub data_attributes: Vec<AttributeDescription>,
    pub operations: Vec<OperationDescription>,
}

impl ResourceDefinition {
    pub(crate) fn new(
        name: String,
        identifiers: Vec<String>,
        shape: Option<Shape>,
        operations: IndexMap<String, Operation>,
    ) -> Self {
        Self {
            name,
            identifiers,
            shape,
            operations,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
    }

    pub fn shape(&self) -> Option<&Shape> {
        self.shape.as_ref()
    }

    pub fn operations(&self) -> &IndexMap<String, Operation> {
        &self.operations
    }

    /// Look up an operation by name
    pub fn operation(&self, name: &str) -> Result<&Operation> {
        self.operations
            .get(name)
            .ok_or_else(|| Error::UnknownOperation {
                resource: self.name.clone(),
                operation: name.to_string(),
            })
    }

    /// The Load operation, if one is declared
    pub fn load(&self) -> Option<&Load> {
        self.operations.values().find_map(|op| match op {
            Operation::Load(load) => Some(load),
            _ => None,
        })
    }

    /// Data attribute names from the bound shape
    pub fn data_attributes(&self) -> Vec<&str> {
        self.shape
            .iter()
            .flat_map(|s| s.members.keys().map(String::as_str))
            .collect()
    }

    /// Undeclared attributes are only rejected when a shape is bound
    pub fn has_attribute(&self, name: &str) -> bool {
        self.shape
            .as_ref()
            .map(|s| s.members.contains_key(name))
            .unwrap_or(true)
    }

    pub fn describe(&self) -> ResourceDescription {
        let data_attributes = self
            .shape
            .iter()
            .flat_map(|s| s.members.iter())
            .map(|(name, member_type)| AttributeDescription {
                name: name.clone(),
                member_type: member_type.doc_type().to_string(),
            })
            .collect();

        let operations = self
            .operations
            .iter()
            .map(|(name, op)| self.describe_operation(name, op))
            .collect();

        ResourceDescription {
            name: self.name.clone(),
            identifiers: self.identifiers.clone(),
            shape: self.shape.as_ref().map(|s| s.name.clone()),
            data_attributes,
            operations,
        }
    }

    fn describe_operation(&self, name: &str, op: &Operation) -> OperationDescription {
        let kind = op.kind();
        let return_type = match (kind, op.target()) {
            (OperationKind::Load, _) | (OperationKind::Waiter, _) => self.name.clone(),
            (_, Some(target)) if op.is_plural() => format!("Array<{}>", target),
            (_, Some(target)) => target.to_string(),
            (_, None) => "Structure".to_string(),
        };

        OperationDescription {
            name: name.to_string(),
            kind,
            group: kind.group_name().to_string(),
            requires_argument: op.requires_argument(),
            arguments: op.argument_names().into_iter().map(String::from).collect(),
            plural: op.is_plural(),
            target: op.target().map(String::from),
            return_type,
            client_operation: op.request().map(|r| r.operation.clone()),
        }
    }
}
