//! Operation definitions
//!
//! Each named operation on a resource is one [`Operation`] variant pairing a
//! request [`Builder`] with a rule for turning the response into data or
//! resources.

use super::builder::{Builder, Request};
use super::path::Path;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Operation kind, as reported by introspection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    Load,
    Action,
    Reference,
    Collection,
    BatchAction,
    Waiter,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Action => "action",
            Self::Reference => "reference",
            Self::Collection => "collection",
            Self::BatchAction => "batchAction",
            Self::Waiter => "waiter",
        }
    }

    /// Heading the documentation collaborator files the operation under
    pub fn group_name(&self) -> &'static str {
        match self {
            Self::Load => "Loading",
            Self::Action => "Actions",
            Self::Reference => "Resource References",
            Self::Collection => "Collections",
            Self::BatchAction => "Batch Actions",
            Self::Waiter => "Waiters",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a response becomes one or many resource instances
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceMapping {
    /// Target resource type
    pub target: String,
    /// Builds the target's identifier map; plural when any source projects
    pub identifiers: Builder,
    /// Optional data seeded into each instance
    pub path: Option<Path>,
}

impl ResourceMapping {
    pub fn is_plural(&self) -> bool {
        self.identifiers.is_plural()
    }
}

/// Refreshes the instance's own data
#[derive(Debug, Clone, PartialEq)]
pub struct Load {
    pub request: Request,
    pub path: Path,
}

/// Mutates remote state; may return a resource or raw data
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub request: Request,
    pub resource: Option<ResourceMapping>,
    /// Part of the response returned as raw data
    pub path: Option<Path>,
    /// Response path that replaces the caller's cached data
    pub refresh: Option<Path>,
}

/// `inputToken` / `outputToken` pair for paged collections
#[derive(Debug, Clone, PartialEq)]
pub struct Pagination {
    pub input_token: Path,
    pub output_token: Path,
}

/// Related resource(s), with or without a remote call
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub request: Option<Request>,
    pub resource: ResourceMapping,
    /// Declared under `hasMany`
    pub collection: bool,
    pub paginate: Option<Pagination>,
}

impl Reference {
    /// Pure identifier composition: no call and nothing read from data
    pub fn is_local(&self) -> bool {
        self.request.is_none() && !self.resource.identifiers.is_data_dependent()
    }
}

/// One call for many instances
#[derive(Debug, Clone, PartialEq)]
pub struct BatchAction {
    pub request: Request,
    pub resource: Option<ResourceMapping>,
    pub path: Option<Path>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Matcher {
    Path,
    PathAll,
    PathAny,
    Error,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::Path
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AcceptorState {
    Success,
    Failure,
    Retry,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Acceptor {
    pub matcher: Matcher,
    pub path: Option<Path>,
    pub expected: Value,
    pub state: AcceptorState,
}

/// Bounded polling until the resource reaches a state
#[derive(Debug, Clone, PartialEq)]
pub struct Waiter {
    pub request: Request,
    pub acceptors: Vec<Acceptor>,
    pub max_attempts: u32,
    pub delay: Duration,
}

/// A named operation of a resource type
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Load(Load),
    Action(Action),
    Reference(Reference),
    BatchAction(BatchAction),
    Waiter(Waiter),
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Load(_) => OperationKind::Load,
            Self::Action(_) => OperationKind::Action,
            Self::Reference(r) if r.collection => OperationKind::Collection,
            Self::Reference(_) => OperationKind::Reference,
            Self::BatchAction(_) => OperationKind::BatchAction,
            Self::Waiter(_) => OperationKind::Waiter,
        }
    }

    /// Client request issued by this operation, if any
    pub fn request(&self) -> Option<&Request> {
        match self {
            Self::Load(op) => Some(&op.request),
            Self::Action(op) => Some(&op.request),
            Self::Reference(op) => op.request.as_ref(),
            Self::BatchAction(op) => Some(&op.request),
            Self::Waiter(op) => Some(&op.request),
        }
    }

    /// Resource mapping, for operations that produce resources
    pub fn mapping(&self) -> Option<&ResourceMapping> {
        match self {
            Self::Action(op) => op.resource.as_ref(),
            Self::Reference(op) => Some(&op.resource),
            Self::BatchAction(op) => op.resource.as_ref(),
            Self::Load(_) | Self::Waiter(_) => None,
        }
    }

    /// Every builder the operation evaluates against the caller
    fn builders(&self) -> impl Iterator<Item = &Builder> {
        self.request()
            .map(|r| &r.params)
            .into_iter()
            .chain(self.mapping().map(|m| &m.identifiers))
    }

    pub fn requires_argument(&self) -> bool {
        self.builders().any(Builder::requires_argument)
    }

    pub fn argument_names(&self) -> Vec<&str> {
        self.builders().flat_map(Builder::argument_names).collect()
    }

    pub fn is_plural(&self) -> bool {
        self.mapping().map(ResourceMapping::is_plural).unwrap_or(false)
    }

    pub fn target(&self) -> Option<&str> {
        self.mapping().map(|m| m.target.as_str())
    }
}
