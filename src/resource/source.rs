//! Builder sources
//!
//! A [`BuilderSource`] says where one value comes from and where it goes.
//! [`resolve`] is the only place that knows how to evaluate each kind.

use super::builder::Args;
use super::path::{Path, Resolved};
use crate::error::{Error, Result};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

/// One parameter source, as written in a definition document:
///
/// ```json
/// {"target": "Bucket", "source": "identifier", "name": "Name"}
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "source", rename_all = "camelCase")]
pub enum BuilderSource {
    /// Caller-supplied value. `name` defaults to the target.
    #[serde(alias = "input")]
    Argument {
        target: Path,
        #[serde(default)]
        name: Option<String>,
    },
    /// One of the owning instance's identifiers
    Identifier { target: Path, name: String },
    /// Path into the owning instance's cached data
    #[serde(rename = "data")]
    DataMember { target: Path, path: Path },
    /// Constant baked into the definition
    #[serde(rename = "literal", alias = "string", alias = "integer", alias = "boolean")]
    RequestLiteral { target: Path, value: Value },
    /// Path into the request that was sent (result mapping only)
    RequestParameter { target: Path, path: Path },
    /// Path into the response that came back (result mapping only)
    #[serde(rename = "response")]
    ResponseMember { target: Path, path: Path },
}

/// Everything a source may read from while an operation runs.
#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    pub resource: &'a str,
    pub operation: &'a str,
    pub args: &'a Args,
    pub identifiers: &'a IndexMap<String, Value>,
    pub data: Option<&'a Value>,
    pub request: Option<&'a Value>,
    pub response: Option<&'a Value>,
}

impl<'a> Context<'a> {
    pub fn with_request(self, request: &'a Value) -> Self {
        Self {
            request: Some(request),
            ..self
        }
    }

    pub fn with_response(self, response: &'a Value) -> Self {
        Self {
            response: Some(response),
            ..self
        }
    }
}

impl BuilderSource {
    pub fn target(&self) -> &Path {
        match self {
            Self::Argument { target, .. }
            | Self::Identifier { target, .. }
            | Self::DataMember { target, .. }
            | Self::RequestLiteral { target, .. }
            | Self::RequestParameter { target, .. }
            | Self::ResponseMember { target, .. } => target,
        }
    }

    /// Name the caller binds an argument to
    pub fn argument_name(&self) -> Option<&str> {
        match self {
            Self::Argument { target, name } => Some(name.as_deref().unwrap_or(target.as_str())),
            _ => None,
        }
    }

    /// Path this source reads, when it reads one
    pub fn source_path(&self) -> Option<&Path> {
        match self {
            Self::DataMember { path, .. }
            | Self::RequestParameter { path, .. }
            | Self::ResponseMember { path, .. } => Some(path),
            _ => None,
        }
    }

    pub fn is_argument(&self) -> bool {
        matches!(self, Self::Argument { .. })
    }

    pub fn is_data(&self) -> bool {
        matches!(self, Self::DataMember { .. })
    }

    /// True for sources that only exist once a call has been made
    pub fn needs_call(&self) -> bool {
        matches!(
            self,
            Self::RequestParameter { .. } | Self::ResponseMember { .. }
        )
    }

    /// Kind name as written in documents
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Argument { .. } => "argument",
            Self::Identifier { .. } => "identifier",
            Self::DataMember { .. } => "data",
            Self::RequestLiteral { .. } => "literal",
            Self::RequestParameter { .. } => "requestParameter",
            Self::ResponseMember { .. } => "response",
        }
    }
}

/// Evaluate one source against a call context.
pub fn resolve(source: &BuilderSource, ctx: &Context<'_>) -> Result<Resolved> {
    evaluate(source, ctx, Path::get)
}

/// Like [`resolve`], but projected paths keep a null for every element that
/// lacks the value, so sources over the same list stay aligned.
pub(crate) fn resolve_aligned(source: &BuilderSource, ctx: &Context<'_>) -> Result<Resolved> {
    evaluate(source, ctx, Path::get_aligned)
}

fn evaluate(
    source: &BuilderSource,
    ctx: &Context<'_>,
    read: fn(&Path, &Value) -> Resolved,
) -> Result<Resolved> {
    match source {
        BuilderSource::Argument { .. } => {
            let name = source.argument_name().unwrap_or_default();
            ctx.args
                .get(name)
                .cloned()
                .map(Resolved::One)
                .ok_or_else(|| Error::MissingArgument {
                    resource: ctx.resource.to_string(),
                    operation: ctx.operation.to_string(),
                    argument: name.to_string(),
                })
        }
        BuilderSource::Identifier { name, .. } => ctx
            .identifiers
            .get(name)
            .cloned()
            .map(Resolved::One)
            .ok_or_else(|| Error::MissingIdentifier {
                resource: ctx.resource.to_string(),
                identifier: name.clone(),
            }),
        BuilderSource::DataMember { path, .. } => {
            let data = ctx.data.ok_or_else(|| Error::NotLoaded {
                resource: ctx.resource.to_string(),
                attribute: path.to_string(),
            })?;
            Ok(read(path, data))
        }
        BuilderSource::RequestLiteral { value, .. } => Ok(Resolved::One(value.clone())),
        BuilderSource::RequestParameter { path, .. } => ctx
            .request
            .map(|r| read(path, r))
            .ok_or_else(|| outside_call(source, ctx)),
        BuilderSource::ResponseMember { path, .. } => ctx
            .response
            .map(|r| read(path, r))
            .ok_or_else(|| outside_call(source, ctx)),
    }
}

fn outside_call(source: &BuilderSource, ctx: &Context<'_>) -> Error {
    Error::definition(
        ctx.resource,
        ctx.operation,
        format!("`{}' source read before any call was made", source.kind()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn source(value: Value) -> BuilderSource {
        serde_json::from_value(value).unwrap()
    }

    fn identifiers() -> IndexMap<String, Value> {
        IndexMap::from([("Name".to_string(), json!("my-bucket"))])
    }

    #[test]
    fn test_parse_every_kind() {
        let kinds = [
            json!({"target": "A", "source": "argument"}),
            json!({"target": "A", "source": "identifier", "name": "Name"}),
            json!({"target": "A", "source": "data", "path": "State.Name"}),
            json!({"target": "A", "source": "literal", "value": 10}),
            json!({"target": "A", "source": "requestParameter", "path": "Bucket"}),
            json!({"target": "A", "source": "response", "path": "Contents[].Key"}),
        ];
        let parsed: Vec<_> = kinds.into_iter().map(source).collect();
        let names: Vec<_> = parsed.iter().map(|s| s.kind()).collect();
        assert_eq!(
            names,
            ["argument", "identifier", "data", "literal", "requestParameter", "response"]
        );
    }

    #[test]
    fn test_aliases() {
        assert!(source(json!({"target": "Key", "source": "input"})).is_argument());
        assert_eq!(
            source(json!({"target": "MaxKeys", "source": "integer", "value": 5})).kind(),
            "literal"
        );
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let parsed: std::result::Result<BuilderSource, _> =
            serde_json::from_value(json!({"target": "A", "source": "magic"}));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_argument_resolves_by_name() {
        let args = Args::new().arg("ReceiptHandle", json!("abc"));
        let ids = identifiers();
        let ctx = Context {
            resource: "Queue",
            operation: "Message",
            args: &args,
            identifiers: &ids,
            data: None,
            request: None,
            response: None,
        };
        let src = source(json!({"target": "ReceiptHandle", "source": "argument"}));
        assert_eq!(resolve(&src, &ctx).unwrap(), Resolved::One(json!("abc")));
    }

    #[test]
    fn test_missing_argument() {
        let args = Args::new();
        let ids = identifiers();
        let ctx = Context {
            resource: "Queue",
            operation: "Message",
            args: &args,
            identifiers: &ids,
            data: None,
            request: None,
            response: None,
        };
        let src = source(json!({"target": "ReceiptHandle", "source": "argument"}));
        let err = resolve(&src, &ctx).unwrap_err();
        assert!(matches!(
            err,
            Error::MissingArgument { ref argument, .. } if argument == "ReceiptHandle"
        ));
    }

    #[test]
    fn test_data_requires_loaded_data() {
        let args = Args::new();
        let ids = identifiers();
        let ctx = Context {
            resource: "Bucket",
            operation: "Policy",
            args: &args,
            identifiers: &ids,
            data: None,
            request: None,
            response: None,
        };
        let src = source(json!({"target": "Region", "source": "data", "path": "Region"}));
        assert!(matches!(resolve(&src, &ctx), Err(Error::NotLoaded { .. })));

        let data = json!({"Region": "eu-west-1"});
        let ctx = Context {
            data: Some(&data),
            ..ctx
        };
        assert_eq!(resolve(&src, &ctx).unwrap(), Resolved::One(json!("eu-west-1")));
    }

    #[test]
    fn test_identifier_and_response() {
        let args = Args::new();
        let ids = identifiers();
        let response = json!({"Contents": [{"Key": "a"}, {"Key": "b"}]});
        let ctx = Context {
            resource: "Bucket",
            operation: "Objects",
            args: &args,
            identifiers: &ids,
            data: None,
            request: None,
            response: None,
        }
        .with_response(&response);

        let id = source(json!({"target": "BucketName", "source": "identifier", "name": "Name"}));
        assert_eq!(resolve(&id, &ctx).unwrap(), Resolved::One(json!("my-bucket")));

        let keys = source(json!({"target": "Key", "source": "response", "path": "Contents[].Key"}));
        assert_eq!(
            resolve(&keys, &ctx).unwrap(),
            Resolved::Many(vec![json!("a"), json!("b")])
        );
    }

    #[test]
    fn test_response_outside_call_is_an_error() {
        let args = Args::new();
        let ids = identifiers();
        let ctx = Context {
            resource: "Bucket",
            operation: "Objects",
            args: &args,
            identifiers: &ids,
            data: None,
            request: None,
            response: None,
        };
        let keys = source(json!({"target": "Key", "source": "response", "path": "Contents[].Key"}));
        assert!(resolve(&keys, &ctx).unwrap_err().is_definition());

        let bucket = source(json!({"target": "Name", "source": "requestParameter", "path": "Bucket"}));
        assert!(resolve(&bucket, &ctx).unwrap_err().is_definition());
    }

    #[test]
    fn test_aligned_resolve_keeps_missing_elements() {
        let args = Args::new();
        let ids = identifiers();
        let response = json!({"Contents": [{"Key": "a"}, {"Size": 1}]});
        let ctx = Context {
            resource: "Bucket",
            operation: "Objects",
            args: &args,
            identifiers: &ids,
            data: None,
            request: None,
            response: Some(&response),
        };
        let keys = source(json!({"target": "Key", "source": "response", "path": "Contents[].Key"}));
        assert_eq!(
            resolve_aligned(&keys, &ctx).unwrap(),
            Resolved::Many(vec![json!("a"), Value::Null])
        );
    }
}
