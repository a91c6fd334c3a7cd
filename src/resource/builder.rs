//! Request and identifier builders
//!
//! A [`Builder`] applies its sources in definition order and writes each
//! resolved value at the source's target path.

use super::path::Resolved;
use super::source::{resolve, resolve_aligned, BuilderSource, Context};
use crate::error::{Error, Result};
use serde_json::{Map, Value};

/// Caller-supplied input for one operation call.
///
/// `arg` binds a value to an argument source by name, `value` supplies the
/// value for whichever argument is not bound by name, and `param` adds extra
/// request parameters. Built values win over extra parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    named: Map<String, Value>,
    positional: Option<Value>,
    params: Map<String, Value>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Args with a single positional value
    pub fn value(value: impl Into<Value>) -> Self {
        Self {
            positional: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn arg(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.named.insert(name.to_string(), value.into());
        self
    }

    pub fn param(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.insert(name.to_string(), value.into());
        self
    }

    /// Merge every key of a JSON object into the extra parameters
    pub fn params(mut self, params: Value) -> Self {
        if let Value::Object(map) = params {
            self.params.extend(map);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.named.get(name).or(self.positional.as_ref())
    }

    pub fn extra_params(&self) -> &Map<String, Value> {
        &self.params
    }

    pub fn is_empty(&self) -> bool {
        self.named.is_empty() && self.positional.is_none() && self.params.is_empty()
    }
}

/// Ordered list of sources assembling one structure
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Builder {
    sources: Vec<BuilderSource>,
    plural: bool,
}

impl Builder {
    pub fn new(sources: Vec<BuilderSource>) -> Self {
        Self {
            sources,
            plural: false,
        }
    }

    /// Mark the result as plural (one structure per projected element)
    pub fn plural(mut self, plural: bool) -> Self {
        self.plural = plural;
        self
    }

    pub fn sources(&self) -> &[BuilderSource] {
        &self.sources
    }

    pub fn is_plural(&self) -> bool {
        self.plural
    }

    /// True iff any source is an argument
    pub fn requires_argument(&self) -> bool {
        self.sources.iter().any(BuilderSource::is_argument)
    }

    pub fn argument_names(&self) -> Vec<&str> {
        self.sources
            .iter()
            .filter_map(BuilderSource::argument_name)
            .collect()
    }

    pub fn is_data_dependent(&self) -> bool {
        self.sources.iter().any(BuilderSource::is_data)
    }

    pub fn needs_call(&self) -> bool {
        self.sources.iter().any(BuilderSource::needs_call)
    }

    /// Build a single structure. Projected values are written as lists.
    pub fn build(&self, ctx: &Context<'_>) -> Result<Value> {
        let mut out = Value::Object(Map::new());
        for source in &self.sources {
            let value = match resolve(source, ctx)? {
                Resolved::One(value) => value,
                Resolved::Many(values) => Value::Array(values),
            };
            write(ctx, &mut out, source, value)?;
        }
        Ok(out)
    }

    /// Build one structure per projected element.
    ///
    /// Single values are repeated into every structure. Elements missing any
    /// projected value are skipped. Without any projection this is
    /// `vec![self.build(ctx)?]`.
    pub fn build_many(&self, ctx: &Context<'_>) -> Result<Vec<Value>> {
        Ok(self.build_each(ctx)?.into_iter().flatten().collect())
    }

    /// One slot per projected element, `None` where the element lacks a
    /// projected value. Slots line up with the same list read elsewhere.
    pub(crate) fn build_each(&self, ctx: &Context<'_>) -> Result<Vec<Option<Value>>> {
        let resolved = self
            .sources
            .iter()
            .map(|s| resolve_aligned(s, ctx).map(|r| (s, r)))
            .collect::<Result<Vec<_>>>()?;

        let mut count: Option<usize> = None;
        for (source, value) in &resolved {
            if let Resolved::Many(values) = value {
                match count {
                    None => count = Some(values.len()),
                    Some(n) if n != values.len() => {
                        return Err(Error::MalformedResponse {
                            resource: ctx.resource.to_string(),
                            operation: ctx.operation.to_string(),
                            message: format!(
                                "`{}' yields {} values, expected {}",
                                source.target(),
                                values.len(),
                                n
                            ),
                        });
                    }
                    Some(_) => {}
                }
            }
        }

        let Some(count) = count else {
            let mut out = Value::Object(Map::new());
            for (source, value) in resolved {
                if let Resolved::One(value) = value {
                    write(ctx, &mut out, source, value)?;
                }
            }
            return Ok(vec![Some(out)]);
        };

        let mut items = vec![Some(Value::Object(Map::new())); count];
        for (source, value) in resolved {
            match value {
                Resolved::One(value) => {
                    for item in items.iter_mut().flatten() {
                        write(ctx, item, source, value.clone())?;
                    }
                }
                Resolved::Many(values) => {
                    for (slot, value) in items.iter_mut().zip(values) {
                        if value.is_null() {
                            *slot = None;
                            continue;
                        }
                        if let Some(item) = slot {
                            write(ctx, item, source, value)?;
                        }
                    }
                }
            }
        }

        let skipped = items.iter().filter(|i| i.is_none()).count();
        if skipped > 0 {
            tracing::debug!(
                resource = ctx.resource,
                operation = ctx.operation,
                "skipped {} of {} elements with missing values",
                skipped,
                count
            );
        }
        Ok(items)
    }
}

fn write(ctx: &Context<'_>, out: &mut Value, source: &BuilderSource, value: Value) -> Result<()> {
    source
        .target()
        .set(out, value)
        .map_err(|e| Error::MalformedResponse {
            resource: ctx.resource.to_string(),
            operation: ctx.operation.to_string(),
            message: e.to_string(),
        })
}

/// A client operation plus the builder for its parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub operation: String,
    pub params: Builder,
}

impl Request {
    pub fn new(operation: impl Into<String>, params: Builder) -> Self {
        Self {
            operation: operation.into(),
            params,
        }
    }

    /// Build the parameters, then fold in the caller's extra parameters.
    pub fn build_params(&self, ctx: &Context<'_>) -> Result<Value> {
        let mut params = self.params.build(ctx)?;
        if let Value::Object(map) = &mut params {
            for (key, value) in ctx.args.extra_params() {
                map.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
        Ok(params)
    }
}
