//! Batch actions
//!
//! Parameters for every item are merged into one request. Targets holding the
//! `*` placeholder receive the item's position; other targets are shared and
//! must agree across items.

use super::builder::Args;
use super::operation::BatchAction;
use super::path::Resolved;
use super::runtime::{extract, shape_output, Output, Service};
use super::source::{resolve, Context};
use crate::error::{Error, Result};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::sync::Arc;

/// One participant of a batch
pub(crate) struct BatchItem {
    pub identifiers: IndexMap<String, Value>,
    pub data: Option<Arc<Value>>,
}

pub(crate) async fn run(
    service: &Service,
    resource: &str,
    operation: &str,
    op: &BatchAction,
    items: Vec<BatchItem>,
    args: &Args,
) -> Result<Output> {
    if items.is_empty() {
        tracing::debug!(resource = resource, operation = operation, "empty batch, no call");
        return Ok(match &op.resource {
            Some(_) => Output::Resources(Vec::new()),
            None => Output::Data(Value::Array(Vec::new())),
        });
    }

    let params = merge_params(resource, operation, op, &items, args)?;
    let response = service
        .invoke(resource, operation, &op.request, params.clone())
        .await?;
    tracing::info!(
        resource = resource,
        operation = operation,
        "batch of {} completed",
        items.len()
    );

    let Some(mapping) = &op.resource else {
        let value = match &op.path {
            Some(path) => extract(path, &response),
            None => response,
        };
        return Ok(Output::Data(value));
    };

    let empty = IndexMap::new();
    let ctx = Context {
        resource,
        operation,
        args,
        identifiers: &empty,
        data: None,
        request: Some(&params),
        response: Some(&response),
    };
    let resources = service.map_resources(mapping, &ctx)?;
    shape_output(&ctx, mapping, resources)
}

/// Evaluate the request sources for every item and merge them
pub(crate) fn merge_params(
    resource: &str,
    operation: &str,
    op: &BatchAction,
    items: &[BatchItem],
    args: &Args,
) -> Result<Value> {
    let mut params = Value::Object(Map::new());

    for (index, item) in items.iter().enumerate() {
        let ctx = Context {
            resource,
            operation,
            args,
            identifiers: &item.identifiers,
            data: item.data.as_deref(),
            request: None,
            response: None,
        };

        for source in op.request.params.sources() {
            let value = match resolve(source, &ctx)? {
                Resolved::One(value) => value,
                Resolved::Many(values) => Value::Array(values),
            };
            let target = source.target();

            if target.has_wildcard() {
                target
                    .with_index(index)
                    .set(&mut params, value)
                    .map_err(|e| malformed(resource, operation, e))?;
                continue;
            }

            if let Resolved::One(existing) = target.get(&params) {
                if !existing.is_null() && existing != value {
                    return Err(Error::BatchConflict {
                        resource: resource.to_string(),
                        operation: operation.to_string(),
                        target: target.to_string(),
                    });
                }
            }
            target
                .set(&mut params, value)
                .map_err(|e| malformed(resource, operation, e))?;
        }
    }

    if let Value::Object(map) = &mut params {
        for (key, value) in args.extra_params() {
            map.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
    Ok(params)
}

fn malformed(resource: &str, operation: &str, err: impl std::fmt::Display) -> Error {
    Error::MalformedResponse {
        resource: resource.to_string(),
        operation: operation.to_string(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::builder::{Builder, Request};
    use crate::resource::source::BuilderSource;
    use serde_json::json;

    fn delete_objects() -> BatchAction {
        let sources: Vec<BuilderSource> = serde_json::from_value(json!([
            {"target": "Bucket", "source": "identifier", "name": "BucketName"},
            {"target": "Delete.Objects.*.Key", "source": "identifier", "name": "Key"}
        ]))
        .unwrap();
        BatchAction {
            request: Request::new("DeleteObjects", Builder::new(sources)),
            resource: None,
            path: None,
        }
    }

    fn item(bucket: &str, key: &str) -> BatchItem {
        BatchItem {
            identifiers: IndexMap::from([
                ("BucketName".to_string(), json!(bucket)),
                ("Key".to_string(), json!(key)),
            ]),
            data: None,
        }
    }

    #[test]
    fn test_merge_indexes_wildcard_targets() {
        let items = vec![item("b", "k1"), item("b", "k2")];
        let params =
            merge_params("Object", "Delete", &delete_objects(), &items, &Args::new()).unwrap();
        assert_eq!(
            params,
            json!({"Bucket": "b", "Delete": {"Objects": [{"Key": "k1"}, {"Key": "k2"}]}})
        );
    }

    #[test]
    fn test_merge_rejects_conflicting_shared_target() {
        let items = vec![item("b1", "k1"), item("b2", "k2")];
        let err = merge_params("Object", "Delete", &delete_objects(), &items, &Args::new())
            .unwrap_err();
        assert!(matches!(err, Error::BatchConflict { target, .. } if target == "Bucket"));
    }

    #[test]
    fn test_merge_keeps_extra_params() {
        let items = vec![item("b", "k1")];
        let args = Args::new().param("MFA", "123");
        let params = merge_params("Object", "Delete", &delete_objects(), &items, &args).unwrap();
        assert_eq!(params["MFA"], json!("123"));
    }
}
