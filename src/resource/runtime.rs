//! Resource runtime
//!
//! A [`Service`] pairs a loaded [`Model`] with a shared client. Resource
//! instances created from it keep their identifiers fixed for life and cache
//! the data of the last successful load. Operations are looked up by name in
//! the resource definition and dispatched on their kind.
//!
//! # Caching
//!
//! A successful load replaces the cached data wholesale; a failed load leaves
//! it untouched. Two loads racing on the same instance are not ordered: the
//! one that completes last wins.

use super::batch::{self, BatchItem};
use super::builder::{Args, Request};
use super::definition::{ResourceDefinition, ResourceDescription};
use super::loader::{Model, LOAD};
use super::operation::{Action, Operation, Reference, ResourceMapping};
use super::path::{Path, Resolved};
use super::source::Context;
use super::waiter::{self, Poller, WaiterOptions, WaiterState};
use crate::client::Client;
use crate::error::{Error, Result};
use futures::future::join_all;
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Result of an operation call
#[derive(Debug)]
pub enum Output {
    /// Raw response data (or the freshly loaded data)
    Data(Value),
    Resource(Resource),
    Resources(Vec<Resource>),
}

impl Output {
    pub fn into_data(self) -> Option<Value> {
        match self {
            Self::Data(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_resource(self) -> Option<Resource> {
        match self {
            Self::Resource(resource) => Some(resource),
            _ => None,
        }
    }

    pub fn into_resources(self) -> Option<Vec<Resource>> {
        match self {
            Self::Resources(resources) => Some(resources),
            _ => None,
        }
    }
}

/// A loaded model bound to a client
#[derive(Clone)]
pub struct Service {
    model: Arc<Model>,
    client: Arc<dyn Client>,
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.model.name())
            .finish_non_exhaustive()
    }
}

impl Service {
    pub fn new(model: Model, client: Arc<dyn Client>) -> Self {
        Self::from_shared(Arc::new(model), client)
    }

    pub fn from_shared(model: Arc<Model>, client: Arc<dyn Client>) -> Self {
        Self { model, client }
    }

    pub fn name(&self) -> &str {
        self.model.name()
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    pub fn client(&self) -> &Arc<dyn Client> {
        &self.client
    }

    /// The service-level resource
    pub fn root(&self) -> Resource {
        Resource {
            service: self.clone(),
            definition: self.model.root().clone(),
            identifiers: IndexMap::new(),
            data: RwLock::new(None),
        }
    }

    /// Construct an instance from caller-supplied identifiers
    pub fn resource<I, K, V>(&self, type_name: &str, identifiers: I) -> Result<Resource>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let definition = self.model.resource(type_name)?.clone();
        let identifiers = identifiers
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Resource::build(self.clone(), definition, identifiers, None)
    }

    /// Run a batch action over many instances of `type_name` with one call.
    ///
    /// An empty slice makes no call and yields an empty result.
    pub async fn batch_action(
        &self,
        type_name: &str,
        operation: &str,
        items: &[Resource],
        args: Args,
    ) -> Result<Output> {
        let items = items
            .iter()
            .map(|item| {
                if item.type_name() != type_name {
                    return Err(Error::ResourceMismatch {
                        operation: operation.to_string(),
                        expected: type_name.to_string(),
                        found: item.type_name().to_string(),
                    });
                }
                Ok(BatchItem {
                    identifiers: item.identifiers.clone(),
                    data: item.data_snapshot(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        self.run_batch(type_name, operation, items, args).await
    }

    /// Run a batch action over raw parameter maps.
    ///
    /// Each map stands in for one instance: identifier and data sources both
    /// read from it.
    pub async fn batch_action_params(
        &self,
        type_name: &str,
        operation: &str,
        items: &[Value],
        args: Args,
    ) -> Result<Output> {
        let items = items
            .iter()
            .map(|item| BatchItem {
                identifiers: object_entries(item.clone()),
                data: Some(Arc::new(item.clone())),
            })
            .collect();
        self.run_batch(type_name, operation, items, args).await
    }

    async fn run_batch(
        &self,
        type_name: &str,
        operation: &str,
        items: Vec<BatchItem>,
        args: Args,
    ) -> Result<Output> {
        let definition = self.model.resource(type_name)?;
        let Operation::BatchAction(op) = definition.operation(operation)? else {
            return Err(Error::UnknownOperation {
                resource: type_name.to_string(),
                operation: operation.to_string(),
            });
        };
        batch::run(self, type_name, operation, op, items, &args).await
    }

    /// Introspection of every resource type, root first
    pub fn describe(&self) -> Vec<ResourceDescription> {
        std::iter::once(self.model.root())
            .chain(self.model.resources())
            .map(|d| d.describe())
            .collect()
    }

    pub(crate) async fn invoke(
        &self,
        resource: &str,
        operation: &str,
        request: &Request,
        params: Value,
    ) -> Result<Value> {
        tracing::debug!(
            resource = resource,
            operation = operation,
            "invoke {}",
            request.operation
        );
        self.client
            .invoke(&request.operation, params)
            .await
            .map_err(|e| {
                tracing::error!(
                    resource = resource,
                    operation = operation,
                    "{} failed: {}",
                    request.operation,
                    e
                );
                Error::Client(e)
            })
    }

    /// Turn a mapping plus call context into instances of the target type
    pub(crate) fn map_resources(
        &self,
        mapping: &ResourceMapping,
        ctx: &Context<'_>,
    ) -> Result<Vec<Resource>> {
        let definition = self.model.resource(&mapping.target)?.clone();
        let identifiers = mapping.identifiers.build_each(ctx)?;

        let data: Option<Vec<Value>> = match (&mapping.path, ctx.response) {
            (Some(path), Some(response)) => Some(match path.get_aligned(response) {
                Resolved::One(value) => vec![value],
                Resolved::Many(values) => values,
            }),
            _ => None,
        };

        if let Some(data) = &data {
            if data.len() != identifiers.len() {
                return Err(Error::MalformedResponse {
                    resource: ctx.resource.to_string(),
                    operation: ctx.operation.to_string(),
                    message: format!(
                        "{} data entries for {} {} instances",
                        data.len(),
                        identifiers.len(),
                        mapping.target
                    ),
                });
            }
        }

        let mut data = data.map(Vec::into_iter);
        let mut resources = Vec::with_capacity(identifiers.len());
        for ids in identifiers {
            let item_data = data
                .as_mut()
                .and_then(Iterator::next)
                .filter(|v| !v.is_null());
            let Some(ids) = ids else {
                continue;
            };
            resources.push(Resource::build(
                self.clone(),
                definition.clone(),
                object_entries(ids),
                item_data,
            )?);
        }
        Ok(resources)
    }
}

/// One resource instance
pub struct Resource {
    service: Service,
    definition: Arc<ResourceDefinition>,
    identifiers: IndexMap<String, Value>,
    data: RwLock<Option<Arc<Value>>>,
}

impl Resource {
    /// Validates identifiers against the definition and orders them as declared
    pub(crate) fn build(
        service: Service,
        definition: Arc<ResourceDefinition>,
        mut identifiers: IndexMap<String, Value>,
        data: Option<Value>,
    ) -> Result<Self> {
        let mut ordered = IndexMap::with_capacity(definition.identifiers().len());
        for name in definition.identifiers() {
            match identifiers.shift_remove(name) {
                Some(value) if !value.is_null() => {
                    ordered.insert(name.clone(), value);
                }
                _ => {
                    return Err(Error::MissingIdentifier {
                        resource: definition.name().to_string(),
                        identifier: name.clone(),
                    })
                }
            }
        }
        if let Some(extra) = identifiers.keys().next() {
            return Err(Error::UnexpectedIdentifier {
                resource: definition.name().to_string(),
                identifier: extra.clone(),
            });
        }

        Ok(Self {
            service,
            definition,
            identifiers: ordered,
            data: RwLock::new(data.map(Arc::new)),
        })
    }

    pub fn type_name(&self) -> &str {
        self.definition.name()
    }

    pub fn definition(&self) -> &Arc<ResourceDefinition> {
        &self.definition
    }

    pub fn service(&self) -> &Service {
        &self.service
    }

    pub fn client(&self) -> &Arc<dyn Client> {
        self.service.client()
    }

    pub fn identifiers(&self) -> &IndexMap<String, Value> {
        &self.identifiers
    }

    pub fn identifier(&self, name: &str) -> Option<&Value> {
        self.identifiers.get(name)
    }

    pub fn is_loaded(&self) -> bool {
        self.data_snapshot().is_some()
    }

    /// The cached data
    pub fn data(&self) -> Result<Value> {
        self.data_snapshot()
            .map(|d| (*d).clone())
            .ok_or_else(|| Error::NotLoaded {
                resource: self.type_name().to_string(),
                attribute: "data".to_string(),
            })
    }

    /// Read one data attribute. Never fetches: call [`Resource::load`] first.
    pub fn attribute(&self, name: &str) -> Result<Value> {
        if !self.definition.has_attribute(name) {
            return Err(Error::UnknownAttribute {
                resource: self.type_name().to_string(),
                attribute: name.to_string(),
            });
        }
        let data = self.data_snapshot().ok_or_else(|| Error::NotLoaded {
            resource: self.type_name().to_string(),
            attribute: name.to_string(),
        })?;
        Ok(data.get(name).cloned().unwrap_or(Value::Null))
    }

    /// Run the Load operation and replace the cached data with its result.
    pub async fn load(&self) -> Result<()> {
        let load = self
            .definition
            .load()
            .ok_or_else(|| self.unknown_operation(LOAD))?;

        let data = self.data_snapshot();
        let args = Args::new();
        let ctx = self.context(LOAD, &args, data.as_deref());
        let params = load.request.build_params(&ctx)?;

        let response = self
            .service
            .invoke(self.type_name(), LOAD, &load.request, params)
            .await?;
        self.replace_data(extract(&load.path, &response));

        tracing::info!(
            resource = self.type_name(),
            "loaded {:?}",
            self.identifiers.values().collect::<Vec<_>>()
        );
        Ok(())
    }

    /// Call any declared operation by name
    pub async fn call(&self, name: &str, args: Args) -> Result<Output> {
        let op = self.definition.operation(name)?;
        self.check_arguments(name, op, &args)?;

        match op {
            Operation::Load(_) => {
                self.load().await?;
                self.data().map(Output::Data)
            }
            Operation::Action(action) => self.run_action(name, action, &args).await,
            Operation::Reference(reference) => self.run_reference(name, reference, &args).await,
            Operation::BatchAction(op) => {
                let item = BatchItem {
                    identifiers: self.identifiers.clone(),
                    data: self.data_snapshot(),
                };
                batch::run(&self.service, self.type_name(), name, op, vec![item], &args).await
            }
            Operation::Waiter(_) => self
                .wait_with(name, WaiterOptions::default())
                .await
                .map(Output::Resource),
        }
    }

    /// Block until the named waiter succeeds
    pub async fn wait(&self, name: &str) -> Result<Resource> {
        self.wait_with(name, WaiterOptions::default()).await
    }

    /// Like [`Resource::wait`], overriding the declared attempts or delay
    pub async fn wait_with(&self, name: &str, options: WaiterOptions) -> Result<Resource> {
        let Operation::Waiter(waiter) = self.definition.operation(name)? else {
            return Err(self.unknown_operation(name));
        };

        let data = self.data_snapshot();
        let args = Args::new();
        let ctx = self.context(name, &args, data.as_deref());
        let params = waiter.request.build_params(&ctx)?;

        let mut poller = Poller::new(waiter, options);
        loop {
            let result = self
                .service
                .client()
                .invoke(&waiter.request.operation, params.clone())
                .await;

            let matched = waiter::evaluate(&waiter.acceptors, &result);
            if matched.is_none() {
                if let Err(err) = result {
                    return Err(Error::Client(err));
                }
            }

            match poller.advance(matched) {
                WaiterState::Success => {
                    if let Ok(response) = &result {
                        self.refresh_from_poll(&waiter.request.operation, response);
                    }
                    tracing::info!(
                        resource = self.type_name(),
                        waiter = name,
                        "succeeded after {} attempts",
                        poller.attempts()
                    );
                    return Ok(self.clone());
                }
                WaiterState::Failure => {
                    return Err(Error::WaiterFailed {
                        resource: self.type_name().to_string(),
                        waiter: name.to_string(),
                        attempt: poller.attempts(),
                    });
                }
                WaiterState::TimedOut => {
                    return Err(Error::WaiterTimeout {
                        resource: self.type_name().to_string(),
                        waiter: name.to_string(),
                        attempts: poller.attempts(),
                    });
                }
                WaiterState::Polling => {
                    if matched.is_none() {
                        tracing::warn!(
                            resource = self.type_name(),
                            waiter = name,
                            "no acceptor matched attempt {}, retrying",
                            poller.attempts()
                        );
                    }
                    tokio::time::sleep(poller.delay()).await;
                }
            }
        }
    }

    async fn run_action(&self, name: &str, action: &Action, args: &Args) -> Result<Output> {
        let data = self.data_snapshot();
        let ctx = self.context(name, args, data.as_deref());
        let params = action.request.build_params(&ctx)?;

        let response = self
            .service
            .invoke(self.type_name(), name, &action.request, params.clone())
            .await?;
        tracing::info!(resource = self.type_name(), action = name, "action completed");

        if let Some(refresh) = &action.refresh {
            self.replace_data(extract(refresh, &response));
        }

        let Some(mapping) = &action.resource else {
            let value = match &action.path {
                Some(path) => extract(path, &response),
                None => response,
            };
            return Ok(Output::Data(value));
        };

        let ctx = ctx.with_request(&params).with_response(&response);
        let resources = self.service.map_resources(mapping, &ctx)?;
        shape_output(&ctx, mapping, resources)
    }

    async fn run_reference(&self, name: &str, reference: &Reference, args: &Args) -> Result<Output> {
        let reads_data = reference.resource.identifiers.is_data_dependent()
            || reference
                .request
                .as_ref()
                .is_some_and(|r| r.params.is_data_dependent());
        let data = if reads_data {
            self.data_for_reference().await?
        } else {
            self.data_snapshot()
        };

        let Some(request) = &reference.request else {
            let ctx = self.context(name, args, data.as_deref());
            let resources = self.service.map_resources(&reference.resource, &ctx)?;
            return shape_output(&ctx, &reference.resource, resources);
        };

        let ctx = self.context(name, args, data.as_deref());
        let mut params = request.build_params(&ctx)?;
        let mut resources = Vec::new();
        let mut last_token: Option<Value> = None;

        loop {
            let response = self
                .service
                .invoke(self.type_name(), name, request, params.clone())
                .await?;
            {
                let page = ctx.with_request(&params).with_response(&response);
                resources.extend(self.service.map_resources(&reference.resource, &page)?);
            }

            let Some(paginate) = &reference.paginate else {
                break;
            };
            let token = match paginate.output_token.get(&response) {
                Resolved::One(Value::Null) | Resolved::Many(_) => break,
                Resolved::One(token) => token,
            };
            if last_token.as_ref() == Some(&token) {
                break;
            }
            paginate
                .input_token
                .set(&mut params, token.clone())
                .map_err(|e| Error::MalformedResponse {
                    resource: self.type_name().to_string(),
                    operation: name.to_string(),
                    message: e.to_string(),
                })?;
            tracing::debug!(resource = self.type_name(), operation = name, "next page");
            last_token = Some(token);
        }

        shape_output(&ctx, &reference.resource, resources)
    }

    /// Data for a reference built from data members: the cached data, or the
    /// result of the declared Load when nothing is cached yet.
    async fn data_for_reference(&self) -> Result<Option<Arc<Value>>> {
        if let Some(data) = self.data_snapshot() {
            return Ok(Some(data));
        }
        if self.definition.load().is_some() {
            self.load().await?;
        }
        Ok(self.data_snapshot())
    }

    /// After a waiter polls the Load's own client operation, keep its answer
    fn refresh_from_poll(&self, client_operation: &str, response: &Value) {
        if let Some(load) = self.definition.load() {
            if load.request.operation == client_operation {
                self.replace_data(extract(&load.path, response));
            }
        }
    }

    fn check_arguments(&self, name: &str, op: &Operation, args: &Args) -> Result<()> {
        for argument in op.argument_names() {
            if args.get(argument).is_none() {
                return Err(Error::MissingArgument {
                    resource: self.type_name().to_string(),
                    operation: name.to_string(),
                    argument: argument.to_string(),
                });
            }
        }
        Ok(())
    }

    fn context<'a>(
        &'a self,
        operation: &'a str,
        args: &'a Args,
        data: Option<&'a Value>,
    ) -> Context<'a> {
        Context {
            resource: self.type_name(),
            operation,
            args,
            identifiers: &self.identifiers,
            data,
            request: None,
            response: None,
        }
    }

    fn unknown_operation(&self, name: &str) -> Error {
        Error::UnknownOperation {
            resource: self.type_name().to_string(),
            operation: name.to_string(),
        }
    }

    fn data_snapshot(&self) -> Option<Arc<Value>> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace_data(&self, value: Value) {
        *self.data.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(value));
    }
}

/// Clones carry a snapshot of the cached data; later loads are not shared.
impl Clone for Resource {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            definition: self.definition.clone(),
            identifiers: self.identifiers.clone(),
            data: RwLock::new(self.data_snapshot()),
        }
    }
}

/// Instances are equal when type and identifiers match
impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.type_name() == other.type_name() && self.identifiers == other.identifiers
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("type", &self.type_name())
            .field("identifiers", &self.identifiers)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

/// Load many instances concurrently, one result per instance
pub async fn load_all(resources: &[Resource]) -> Vec<Result<()>> {
    join_all(resources.iter().map(Resource::load)).await
}

/// Value at `path`; projections become a list
pub(crate) fn extract(path: &Path, value: &Value) -> Value {
    match path.get(value) {
        Resolved::One(value) => value,
        Resolved::Many(values) => Value::Array(values),
    }
}

pub(crate) fn object_entries(value: Value) -> IndexMap<String, Value> {
    match value {
        Value::Object(map) => map.into_iter().collect(),
        _ => IndexMap::new(),
    }
}

/// Plural mappings always yield a list; singular ones exactly one instance
pub(crate) fn shape_output(
    ctx: &Context<'_>,
    mapping: &ResourceMapping,
    mut resources: Vec<Resource>,
) -> Result<Output> {
    if mapping.is_plural() {
        return Ok(Output::Resources(resources));
    }
    match resources.len() {
        1 => Ok(Output::Resource(resources.remove(0))),
        n => Err(Error::MalformedResponse {
            resource: ctx.resource.to_string(),
            operation: ctx.operation.to_string(),
            message: format!("expected one {}, built {}", mapping.target, n),
        }),
    }
}
