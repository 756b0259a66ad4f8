//! Built-in HTTP `ArgumentResolver`s (§4.3): ambient context, headers, path
//! values, pagination, and the full query view.

use std::any::TypeId;
use std::collections::HashMap;

use relay_core::context::ExecutionContext;
use relay_core::error::{HttpError, RelayError};
use relay_core::resolver::{ArgumentResolver, ParamBinding};
use relay_core::router::{ParameterKind, ParameterMeta};

/// Resolves the ambient per-request cancellation context (§4.3: `StdContext`).
pub struct StdContext(pub tokio_util::sync::CancellationToken);

pub struct StdContextResolver;

impl ArgumentResolver for StdContextResolver {
    fn supports(&self, pm: &ParameterMeta) -> bool {
        pm.type_id == TypeId::of::<StdContext>()
    }

    fn resolve(&self, ctx: &ExecutionContext, _pm: &ParameterMeta) -> Result<Box<dyn std::any::Any + Send>, RelayError> {
        Ok(Box::new(StdContext(ctx.cancellation().clone())))
    }
}

/// Resolves the request's case-insensitive header view (§4.3: `Header`).
pub struct HeaderResolver;

impl ArgumentResolver for HeaderResolver {
    fn supports(&self, pm: &ParameterMeta) -> bool {
        pm.type_id == TypeId::of::<relay_core::context::HeaderView>()
    }

    fn resolve(&self, ctx: &ExecutionContext, _pm: &ParameterMeta) -> Result<Box<dyn std::any::Any + Send>, RelayError> {
        Ok(Box::new(ctx.headers().clone()))
    }
}

/// One path segment parsed as an `i64` (§4.3: `PathInt`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathInt(pub i64);

/// One path segment, as-is (§4.3: `PathString`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathString(pub String);

/// One path segment parsed as a `bool` (§4.3: `PathBoolean`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathBoolean(pub bool);

impl ParamBinding for PathInt {
    const KIND: ParameterKind = ParameterKind::Path;
}

impl ParamBinding for PathString {
    const KIND: ParameterKind = ParameterKind::Path;
}

impl ParamBinding for PathBoolean {
    const KIND: ParameterKind = ParameterKind::Path;
}

relay_core::impl_from_resolved!(PathInt);
relay_core::impl_from_resolved!(PathString);
relay_core::impl_from_resolved!(PathBoolean);
relay_core::impl_param_binding!(StdContext);
relay_core::impl_param_binding!(Pagination);
relay_core::impl_param_binding!(QueryValues);

fn next_path_value(ctx: &ExecutionContext) -> Result<String, RelayError> {
    let key = ctx
        .next_path_key()
        .ok_or_else(|| RelayError::Http(HttpError::internal("no path key left to bind")))?;
    ctx.params()
        .get(&key)
        .cloned()
        .ok_or_else(|| RelayError::Http(HttpError::internal(format!("path key {key:?} not bound"))))
}

/// Resolves [`PathInt`]/[`PathString`]/[`PathBoolean`] parameters, consuming
/// the next unconsumed path key in declaration order (§4.3, §4.6 step 3).
pub struct PathValueResolver;

impl ArgumentResolver for PathValueResolver {
    fn supports(&self, pm: &ParameterMeta) -> bool {
        pm.type_id == TypeId::of::<PathInt>()
            || pm.type_id == TypeId::of::<PathString>()
            || pm.type_id == TypeId::of::<PathBoolean>()
    }

    fn resolve(&self, ctx: &ExecutionContext, pm: &ParameterMeta) -> Result<Box<dyn std::any::Any + Send>, RelayError> {
        let raw = next_path_value(ctx)?;
        if pm.type_id == TypeId::of::<PathInt>() {
            let value: i64 = raw
                .parse()
                .map_err(|_| RelayError::Http(HttpError::bad_request(format!("{raw:?} is not a valid integer"))))?;
            return Ok(Box::new(PathInt(value)));
        }
        if pm.type_id == TypeId::of::<PathBoolean>() {
            let value: bool = raw
                .parse()
                .map_err(|_| RelayError::Http(HttpError::bad_request(format!("{raw:?} is not a valid boolean"))))?;
            return Ok(Box::new(PathBoolean(value)));
        }
        Ok(Box::new(PathString(raw)))
    }
}

/// Paginated listing parameters (§4.3: `Pagination`). Defaults are `Page =
/// 1`, `Size = 20` when the corresponding query parameter is absent or
/// unparseable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub size: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 1, size: 20 }
    }
}

pub struct PaginationResolver;

impl ArgumentResolver for PaginationResolver {
    fn supports(&self, pm: &ParameterMeta) -> bool {
        pm.type_id == TypeId::of::<Pagination>()
    }

    fn resolve(&self, ctx: &ExecutionContext, _pm: &ParameterMeta) -> Result<Box<dyn std::any::Any + Send>, RelayError> {
        let page = ctx
            .query()
            .get("page")
            .and_then(|v| v.parse().ok())
            .unwrap_or(1);
        let size = ctx
            .query()
            .get("size")
            .and_then(|v| v.parse().ok())
            .unwrap_or(20);
        Ok(Box::new(Pagination { page, size }))
    }
}

/// The full query map, with `Int`/boolean accessor helpers from
/// `pkg/query/types.go` (`query.Values`).
#[derive(Debug, Clone, Default)]
pub struct QueryValues(HashMap<String, Vec<String>>);

impl QueryValues {
    /// Wrap a pre-parsed multi-valued query map.
    pub fn new(values: HashMap<String, Vec<String>>) -> Self {
        Self(values)
    }

    /// The first value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.first()).map(|s| s.as_str())
    }

    /// All values for `key`.
    pub fn get_all(&self, key: &str) -> &[String] {
        self.0.get(key).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Parse the first value for `key` as `i64`, falling back to `default`
    /// when absent or unparseable.
    pub fn int(&self, key: &str, default: i64) -> i64 {
        self.get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    }

    /// Parse the first value for `key` as a boolean, recognizing
    /// `true/1/yes/y/on` and `false/0/no/n/off` case-insensitively, falling
    /// back to `default` for anything else (including absence).
    pub fn get_bool_by_key(&self, key: &str, default: bool) -> bool {
        match self.get(key).map(str::to_ascii_lowercase) {
            Some(v) if matches!(v.as_str(), "true" | "1" | "yes" | "y" | "on") => true,
            Some(v) if matches!(v.as_str(), "false" | "0" | "no" | "n" | "off") => false,
            _ => default,
        }
    }
}

pub struct QueryValuesResolver;

impl ArgumentResolver for QueryValuesResolver {
    fn supports(&self, pm: &ParameterMeta) -> bool {
        pm.type_id == TypeId::of::<QueryValues>()
    }

    fn resolve(&self, ctx: &ExecutionContext, _pm: &ParameterMeta) -> Result<Box<dyn std::any::Any + Send>, RelayError> {
        Ok(Box::new(QueryValues::new(ctx.query().as_map().clone())))
    }
}

/// Resolves the multipart upload collection (§4.3: `UploadedFiles`).
pub struct UploadedFilesResolver;

impl ArgumentResolver for UploadedFilesResolver {
    fn supports(&self, pm: &ParameterMeta) -> bool {
        pm.type_id == TypeId::of::<crate::value::multipart::UploadedFiles>()
    }

    fn resolve(&self, ctx: &ExecutionContext, _pm: &ParameterMeta) -> Result<Box<dyn std::any::Any + Send>, RelayError> {
        let files = ctx
            .store()
            .get::<crate::value::multipart::UploadedFiles>(crate::value::multipart::UPLOADED_FILES_KEY)
            .cloned()
            .unwrap_or_default();
        Ok(Box::new(files))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_values_int_falls_back_to_default() {
        let mut map = HashMap::new();
        map.insert("page".to_string(), vec!["not-a-number".to_string()]);
        let values = QueryValues::new(map);
        assert_eq!(values.int("page", 1), 1);
    }

    #[test]
    fn query_values_parses_boolish_strings() {
        let mut map = HashMap::new();
        map.insert("active".to_string(), vec!["yes".to_string()]);
        let values = QueryValues::new(map);
        assert!(values.get_bool_by_key("active", false));
        assert!(!values.get_bool_by_key("missing", false));
    }
}
