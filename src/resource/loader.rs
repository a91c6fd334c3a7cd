//! Definition Loader
//!
//! Parses a resource definition document (JSON or YAML) into a validated
//! [`Model`]. Every check happens here, before any instance exists: a
//! malformed resource fails the whole model with a [`Error::Definition`]
//! naming the resource and the offending field.

use super::builder::{Builder, Request};
use super::definition::{MemberType, ResourceDefinition, Shape};
use super::operation::{
    Acceptor, AcceptorState, Action, BatchAction, Load, Matcher, Operation, Pagination, Reference,
    ResourceMapping, Waiter,
};
use super::path::Path;
use super::source::BuilderSource;
use crate::error::{Error, Result};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Name under which the Load operation is registered
pub const LOAD: &str = "load";

/// Root structure of a definition document
#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default)]
    service: Option<Value>,
    #[serde(default)]
    shapes: IndexMap<String, RawShape>,
    #[serde(default)]
    resources: IndexMap<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawShape {
    #[serde(default)]
    members: IndexMap<String, MemberType>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawIdentifier {
    Name(String),
    Named { name: String },
}

impl RawIdentifier {
    fn into_name(self) -> String {
        match self {
            Self::Name(name) | Self::Named { name } => name,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawResource {
    #[serde(default)]
    identifiers: Vec<RawIdentifier>,
    #[serde(default)]
    shape: Option<String>,
    #[serde(default)]
    load: Option<Value>,
    #[serde(default)]
    actions: IndexMap<String, Value>,
    #[serde(default)]
    has: IndexMap<String, Value>,
    #[serde(default)]
    has_many: IndexMap<String, Value>,
    #[serde(default)]
    batch_actions: IndexMap<String, Value>,
    #[serde(default)]
    waiters: IndexMap<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRequest {
    operation: String,
    #[serde(default)]
    params: Vec<BuilderSource>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawMapping {
    #[serde(rename = "type")]
    target: String,
    #[serde(default)]
    identifiers: Vec<BuilderSource>,
    #[serde(default)]
    path: Option<Path>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLoad {
    request: RawRequest,
    #[serde(default = "Path::root")]
    path: Path,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawAction {
    request: RawRequest,
    #[serde(default)]
    resource: Option<RawMapping>,
    #[serde(default)]
    path: Option<Path>,
    #[serde(default)]
    refresh: Option<Path>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawHas {
    #[serde(default)]
    request: Option<RawRequest>,
    resource: RawMapping,
    #[serde(default)]
    plural: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawPagination {
    input_token: Path,
    output_token: Path,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawHasMany {
    request: RawRequest,
    resource: RawMapping,
    #[serde(default)]
    paginate: Option<RawPagination>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBatchAction {
    request: RawRequest,
    #[serde(default)]
    resource: Option<RawMapping>,
    #[serde(default)]
    path: Option<Path>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawAcceptor {
    #[serde(default)]
    matcher: Matcher,
    #[serde(default, alias = "argument")]
    path: Option<Path>,
    expected: Value,
    state: AcceptorState,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawWaiter {
    request: RawRequest,
    acceptors: Vec<RawAcceptor>,
    max_attempts: u32,
    #[serde(default)]
    delay: f64,
}

/// What the validator needs to know about every resource type
#[derive(Debug)]
struct Outline {
    identifiers: Vec<String>,
    shape: Option<Shape>,
}

/// All resource definitions of one service
#[derive(Debug, Clone)]
pub struct Model {
    name: String,
    root: Arc<ResourceDefinition>,
    resources: IndexMap<String, Arc<ResourceDefinition>>,
}

impl Model {
    /// Load a model from a JSON document
    pub fn from_json_str(service: &str, json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| Error::definition(service, "<document>", e.to_string()))?;
        Self::from_value(service, value)
    }

    /// Load a model from a YAML document
    pub fn from_yaml_str(service: &str, yaml: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(yaml)
            .map_err(|e| Error::definition(service, "<document>", e.to_string()))?;
        Self::from_value(service, value)
    }

    /// Load a model from a file; `.yaml`/`.yml` files are read as YAML
    pub fn from_path(service: &str, path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::definition(service, path.display().to_string(), e.to_string()))?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(service, &content),
            _ => Self::from_json_str(service, &content),
        }
    }

    /// Load a model from an already parsed document
    pub fn from_value(service: &str, document: Value) -> Result<Self> {
        let document: RawDocument = serde_json::from_value(document)
            .map_err(|e| Error::definition(service, "<document>", e.to_string()))?;

        let mut raw = IndexMap::new();
        let root: RawResource = match document.service {
            Some(value) => parse(service, "service", value)?,
            None => RawResource::default(),
        };
        if !root.identifiers.is_empty() || root.shape.is_some() || root.load.is_some() {
            return Err(Error::definition(
                service,
                "service",
                "the service resource cannot declare identifiers, a shape or a load",
            ));
        }
        for (name, value) in document.resources {
            if name == service {
                return Err(Error::definition(
                    &name,
                    "resources",
                    "resource type shares the service name",
                ));
            }
            let resource: RawResource = parse(&name, "<resource>", value)?;
            raw.insert(name, resource);
        }

        // First pass: identifiers and shapes of every type
        let mut outlines = IndexMap::new();
        outlines.insert(service.to_string(), Outline {
            identifiers: Vec::new(),
            shape: None,
        });
        for (name, resource) in raw.iter_mut() {
            let outline = outline(name, resource, &document.shapes)?;
            outlines.insert(name.clone(), outline);
        }

        // Second pass: operations
        let root = Arc::new(compile(service, root, &outlines)?);
        let mut resources = IndexMap::new();
        for (name, resource) in raw {
            let definition = compile(&name, resource, &outlines)?;
            resources.insert(name, Arc::new(definition));
        }

        tracing::info!(
            "Loaded {} resource definitions for service {}",
            resources.len(),
            service
        );

        Ok(Self {
            name: service.to_string(),
            root,
            resources,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The service-level resource (no identifiers)
    pub fn root(&self) -> &Arc<ResourceDefinition> {
        &self.root
    }

    /// Look up a resource type (the service name resolves to the root)
    pub fn resource(&self, name: &str) -> Result<&Arc<ResourceDefinition>> {
        if name == self.name {
            return Ok(&self.root);
        }
        self.resources
            .get(name)
            .ok_or_else(|| Error::UnknownResource(name.to_string()))
    }

    pub fn resources(&self) -> impl Iterator<Item = &Arc<ResourceDefinition>> {
        self.resources.values()
    }

    pub fn resource_names(&self) -> Vec<&str> {
        self.resources.keys().map(String::as_str).collect()
    }
}

fn parse<T: DeserializeOwned>(resource: &str, field: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| Error::definition(resource, field, e.to_string()))
}

fn outline(
    name: &str,
    resource: &mut RawResource,
    shapes: &IndexMap<String, RawShape>,
) -> Result<Outline> {
    let mut identifiers: Vec<String> = Vec::new();
    for raw in std::mem::take(&mut resource.identifiers) {
        let identifier = raw.into_name();
        if identifier.is_empty() {
            return Err(Error::definition(name, "identifiers", "empty identifier name"));
        }
        if identifiers.contains(&identifier) {
            return Err(Error::definition(
                name,
                "identifiers",
                format!("identifier `{}' declared twice", identifier),
            ));
        }
        identifiers.push(identifier);
    }

    let shape = match &resource.shape {
        Some(shape_name) => {
            let shape = shapes.get(shape_name).ok_or_else(|| {
                Error::definition(name, "shape", format!("unknown shape `{}'", shape_name))
            })?;
            Some(Shape {
                name: shape_name.clone(),
                members: shape.members.clone(),
            })
        }
        None => None,
    };

    Ok(Outline { identifiers, shape })
}

fn compile(
    name: &str,
    resource: RawResource,
    outlines: &IndexMap<String, Outline>,
) -> Result<ResourceDefinition> {
    let Some(owner) = outlines.get(name) else {
        return Err(Error::UnknownResource(name.to_string()));
    };
    let validator = Validator {
        name,
        owner,
        outlines,
    };
    let mut operations: IndexMap<String, Operation> = IndexMap::new();

    if let Some(value) = resource.load {
        let raw: RawLoad = parse(name, LOAD, value)?;
        let request = validator.request(LOAD, raw.request, RequestSite::Internal)?;
        validator.register(&mut operations, LOAD, LOAD, Operation::Load(Load {
            request,
            path: raw.path,
        }))?;
    }

    for (op_name, value) in resource.actions {
        let field = format!("actions.{}", op_name);
        let raw: RawAction = parse(name, &field, value)?;
        let request = validator.request(&field, raw.request, RequestSite::Caller)?;
        let resource = raw
            .resource
            .map(|m| validator.mapping(&field, m, true, None))
            .transpose()?;
        validator.register(&mut operations, &field, &op_name, Operation::Action(Action {
            request,
            resource,
            path: raw.path,
            refresh: raw.refresh,
        }))?;
    }

    for (op_name, value) in resource.has {
        let field = format!("has.{}", op_name);
        let raw: RawHas = parse(name, &field, value)?;
        let request = raw
            .request
            .map(|r| validator.request(&field, r, RequestSite::Caller))
            .transpose()?;
        let mapping = validator.mapping(&field, raw.resource, request.is_some(), Some(raw.plural))?;
        validator.register(&mut operations, &field, &op_name, Operation::Reference(Reference {
            request,
            resource: mapping,
            collection: false,
            paginate: None,
        }))?;
    }

    for (op_name, value) in resource.has_many {
        let field = format!("hasMany.{}", op_name);
        let raw: RawHasMany = parse(name, &field, value)?;
        let request = validator.request(&field, raw.request, RequestSite::Caller)?;
        let mapping = validator.mapping(&field, raw.resource, true, Some(true))?;
        let paginate = raw.paginate.map(|p| Pagination {
            input_token: p.input_token,
            output_token: p.output_token,
        });
        if let Some(p) = &paginate {
            if p.input_token.is_plural() || p.input_token.is_root() {
                return Err(Error::definition(
                    name,
                    format!("{}.paginate.inputToken", field),
                    "input token must name a request member",
                ));
            }
        }
        validator.register(&mut operations, &field, &op_name, Operation::Reference(Reference {
            request: Some(request),
            resource: mapping,
            collection: true,
            paginate,
        }))?;
    }

    for (op_name, value) in resource.batch_actions {
        let field = format!("batchActions.{}", op_name);
        let raw: RawBatchAction = parse(name, &field, value)?;
        let request = validator.request(&field, raw.request, RequestSite::Batch)?;
        let resource = raw
            .resource
            .map(|m| validator.batch_mapping(&field, m))
            .transpose()?;
        validator.register(
            &mut operations,
            &field,
            &op_name,
            Operation::BatchAction(BatchAction {
                request,
                resource,
                path: raw.path,
            }),
        )?;
    }

    for (op_name, value) in resource.waiters {
        let field = format!("waiters.{}", op_name);
        let raw: RawWaiter = parse(name, &field, value)?;
        let waiter = validator.waiter(&field, raw)?;
        validator.register(&mut operations, &field, &op_name, Operation::Waiter(waiter))?;
    }

    Ok(ResourceDefinition::new(
        name.to_string(),
        owner.identifiers.clone(),
        owner.shape.clone(),
        operations,
    ))
}

/// Where a request is built, which limits the sources it may read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestSite {
    /// Called by name with caller arguments
    Caller,
    /// One request merged from many instances
    Batch,
    /// Load and waiter requests, built without caller arguments
    Internal,
}

/// Checks one resource's operations against the outlines of every type
struct Validator<'a> {
    name: &'a str,
    owner: &'a Outline,
    outlines: &'a IndexMap<String, Outline>,
}

impl Validator<'_> {
    fn error(&self, field: &str, message: impl Into<String>) -> Error {
        Error::definition(self.name, field, message)
    }

    fn register(
        &self,
        operations: &mut IndexMap<String, Operation>,
        field: &str,
        name: &str,
        operation: Operation,
    ) -> Result<()> {
        if name.is_empty() {
            return Err(self.error(field, "empty operation name"));
        }
        if operations.contains_key(name) {
            return Err(self.error(field, format!("operation `{}' declared twice", name)));
        }
        operations.insert(name.to_string(), operation);
        Ok(())
    }

    /// Sources that read from the owning instance
    fn owner_source(&self, field: &str, source: &BuilderSource) -> Result<()> {
        match source {
            BuilderSource::Identifier { name, .. } => {
                if !self.owner.identifiers.contains(name) {
                    return Err(self.error(
                        field,
                        format!("`{}' is not an identifier of {}", name, self.name),
                    ));
                }
            }
            BuilderSource::DataMember { path, .. } => {
                let Some(shape) = &self.owner.shape else {
                    return Err(self.error(
                        field,
                        format!("data path `{}' used but {} has no shape", path, self.name),
                    ));
                };
                if let Some(member) = path.first_key() {
                    if !shape.members.contains_key(member) {
                        return Err(self.error(
                            field,
                            format!("`{}' is not a member of shape {}", member, shape.name),
                        ));
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn request(&self, field: &str, raw: RawRequest, site: RequestSite) -> Result<Request> {
        let field = format!("{}.request", field);
        if raw.operation.trim().is_empty() {
            return Err(self.error(&field, "missing client operation name"));
        }
        for source in &raw.params {
            if source.needs_call() {
                return Err(self.error(
                    &field,
                    format!("`{}' sources are only valid in a resource mapping", source.kind()),
                ));
            }
            if source.target().is_plural() {
                return Err(self.error(
                    &field,
                    format!("target `{}' cannot contain a projection", source.target()),
                ));
            }
            if source.target().has_wildcard() && site != RequestSite::Batch {
                return Err(self.error(
                    &field,
                    format!("target `{}' uses `*' outside a batch action", source.target()),
                ));
            }
            if source.is_argument() && site == RequestSite::Internal {
                return Err(self.error(
                    &field,
                    format!(
                        "argument `{}' cannot be supplied to a load or waiter request",
                        source.argument_name().unwrap_or_default()
                    ),
                ));
            }
            self.owner_source(&field, source)?;
        }
        Ok(Request::new(raw.operation, Builder::new(raw.params)))
    }

    /// `plural`: declared plurality, or `None` to infer it from the paths
    fn mapping(
        &self,
        field: &str,
        raw: RawMapping,
        has_request: bool,
        plural: Option<bool>,
    ) -> Result<ResourceMapping> {
        let field = format!("{}.resource", field);
        let Some(target) = self.outlines.get(&raw.target) else {
            return Err(self.error(&field, format!("unknown resource type `{}'", raw.target)));
        };

        for source in &raw.identifiers {
            let identifier = source.target().as_str();
            if !target.identifiers.iter().any(|i| i == identifier) {
                return Err(self.error(
                    &field,
                    format!("`{}' is not an identifier of {}", identifier, raw.target),
                ));
            }
            if source.needs_call() && !has_request {
                return Err(self.error(
                    &field,
                    format!("`{}' source requires a request", source.kind()),
                ));
            }
            self.owner_source(&field, source)?;
        }

        for identifier in &target.identifiers {
            if !raw
                .identifiers
                .iter()
                .any(|s| s.target().as_str() == identifier)
            {
                return Err(self.error(
                    &field,
                    format!("identifier `{}' of {} is never set", identifier, raw.target),
                ));
            }
        }

        if let Some(path) = &raw.path {
            if !has_request {
                return Err(self.error(&field, "a data path requires a request"));
            }
            if path.has_wildcard() {
                return Err(self.error(&field, format!("`*' is not allowed in `{}'", path)));
            }
        }

        let list_shaped = raw
            .identifiers
            .iter()
            .filter_map(BuilderSource::source_path)
            .chain(raw.path.as_ref())
            .any(Path::is_plural);

        let plural = match plural {
            Some(true) if !list_shaped => {
                return Err(self.error(&field, "plural mapping needs a `[]' path"));
            }
            Some(false) if list_shaped => {
                return Err(self.error(&field, "singular reference paired with a list-shaped path"));
            }
            Some(plural) => plural,
            None => list_shaped,
        };

        Ok(ResourceMapping {
            target: raw.target,
            identifiers: Builder::new(raw.identifiers).plural(plural),
            path: raw.path,
        })
    }

    /// Batch results are mapped once for the whole batch, so nothing may be
    /// read from a single owning instance
    fn batch_mapping(&self, field: &str, raw: RawMapping) -> Result<ResourceMapping> {
        for source in &raw.identifiers {
            if matches!(
                source,
                BuilderSource::Identifier { .. } | BuilderSource::DataMember { .. }
            ) {
                return Err(self.error(
                    &format!("{}.resource", field),
                    format!(
                        "`{}' sources cannot map batch results; use requestParameter or response",
                        source.kind()
                    ),
                ));
            }
        }
        self.mapping(field, raw, true, None)
    }

    fn waiter(&self, field: &str, raw: RawWaiter) -> Result<Waiter> {
        if raw.max_attempts == 0 {
            return Err(self.error(field, "maxAttempts must be at least 1"));
        }
        if !raw.delay.is_finite() || raw.delay < 0.0 {
            return Err(self.error(field, "delay must be a non-negative number of seconds"));
        }
        if raw.acceptors.is_empty() {
            return Err(self.error(field, "a waiter needs at least one acceptor"));
        }

        let request = self.request(field, raw.request, RequestSite::Internal)?;
        let mut acceptors = Vec::with_capacity(raw.acceptors.len());
        for (idx, acceptor) in raw.acceptors.into_iter().enumerate() {
            let needs_path = acceptor.matcher != Matcher::Error;
            if needs_path && acceptor.path.is_none() {
                return Err(self.error(
                    &format!("{}.acceptors.{}", field, idx),
                    "path matchers need a path",
                ));
            }
            if !needs_path && !acceptor.expected.is_string() {
                return Err(self.error(
                    &format!("{}.acceptors.{}", field, idx),
                    "error matchers expect an error code string",
                ));
            }
            acceptors.push(Acceptor {
                matcher: acceptor.matcher,
                path: acceptor.path,
                expected: acceptor.expected,
                state: acceptor.state,
            });
        }

        Ok(Waiter {
            request,
            acceptors,
            max_attempts: raw.max_attempts,
            delay: Duration::from_secs_f64(raw.delay),
        })
    }
}
