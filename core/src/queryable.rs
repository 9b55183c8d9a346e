//! The request path builder every endpoint group is made of.
//!
//! # Design
//! A `Queryable` is an absolute URL under construction plus the query
//! parameters that belong to it. Deriving a child (`clone_with`) never
//! touches the receiver: the child starts from the receiver's URL and an
//! empty parameter map, and only the parent URL is shared (`Arc<str>`).
//! Endpoint groups are thin wrappers over a `Queryable`; which group a derived
//! builder becomes is decided by the factory passed to `clone_with` or
//! `get_parent`.
//!
//! Aliases such as `@v` stay in the path and are bound through the query map,
//! which is how the service expects parameter aliases. Whether every alias is
//! bound is checked only when the request is finalized.

use std::sync::{Arc, Weak};

use serde::Serialize;

use crate::batch::Batch;
use crate::call::{Call, Dispatch, Parser};
use crate::config::{ClientConfig, RequestOptions};
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest};
use crate::path;
use crate::query::QueryParams;

#[derive(Debug)]
pub struct Queryable {
    options: Arc<RequestOptions>,
    parent_url: Arc<str>,
    url: String,
    query: QueryParams,
    batch: Option<Weak<Batch>>,
}

impl Queryable {
    /// Root builder at `path` below `base_url`, with default options.
    pub fn new(base_url: &str, path: &str) -> Result<Self, ApiError> {
        Self::with_options(Arc::new(RequestOptions::default()), base_url, path)
    }

    pub fn with_options(
        options: Arc<RequestOptions>,
        base_url: &str,
        path: &str,
    ) -> Result<Self, ApiError> {
        path::validate_relative(path)?;
        let base = base_url.trim_end_matches('/');
        Ok(Self {
            options,
            parent_url: Arc::from(base),
            url: path::combine(base, path),
            query: QueryParams::new(),
            batch: None,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// URL of the resource this builder was derived from.
    pub fn parent_url(&self) -> &str {
        &self.parent_url
    }

    pub fn options(&self) -> &Arc<RequestOptions> {
        &self.options
    }

    pub fn query(&self) -> &QueryParams {
        &self.query
    }

    pub fn query_mut(&mut self) -> &mut QueryParams {
        &mut self.query
    }

    /// Derive a child builder at `relative_path` below this one.
    ///
    /// `None` or an empty path keeps the URL unchanged. The child gets its own
    /// empty query map and joins this builder's batch only if `keep_batch`.
    pub fn clone_with<T, F>(
        &self,
        factory: F,
        relative_path: Option<&str>,
        keep_batch: bool,
    ) -> Result<T, ApiError>
    where
        F: FnOnce(Queryable) -> T,
    {
        let relative = relative_path.unwrap_or("");
        path::validate_relative(relative)?;
        let child = Queryable {
            options: Arc::clone(&self.options),
            parent_url: Arc::from(self.url.as_str()),
            url: path::combine(&self.url, relative),
            query: QueryParams::new(),
            batch: if keep_batch { self.batch.clone() } else { None },
        };
        Ok(factory(child))
    }

    /// Append `suffix` to the URL without a separator, for `.method(...)`
    /// call syntax.
    ///
    /// Parameters set on this builder belong to the concatenated call, so
    /// concatenating after any have been set is rejected.
    pub fn concat(&mut self, suffix: &str) -> Result<(), ApiError> {
        if !self.query.is_empty() {
            return Err(ApiError::invalid_path(
                suffix,
                "concat must come before query parameters are set",
            ));
        }
        path::validate_fragment(suffix)?;
        self.url.push_str(suffix);
        Ok(())
    }

    /// Builder for a sibling resource at `path` below `parent_url`, which
    /// defaults to this builder's own parent. Batches are not carried over.
    pub fn get_parent<T, F>(
        &self,
        factory: F,
        parent_url: Option<&str>,
        path: &str,
    ) -> Result<T, ApiError>
    where
        F: FnOnce(Queryable) -> T,
    {
        let base = parent_url.unwrap_or(&*self.parent_url);
        Queryable::with_options(Arc::clone(&self.options), base, path).map(factory)
    }

    pub fn in_batch(mut self, batch: &Arc<Batch>) -> Self {
        self.set_batch(batch);
        self
    }

    pub fn set_batch(&mut self, batch: &Arc<Batch>) {
        self.batch = Some(Arc::downgrade(batch));
    }

    pub fn has_batch(&self) -> bool {
        self.batch.is_some()
    }

    /// The attached batch, if it is still alive.
    pub fn batch(&self) -> Option<Arc<Batch>> {
        self.batch.as_ref().and_then(Weak::upgrade)
    }

    /// URL plus serialized query string. Does not check aliases.
    pub fn to_url(&self) -> String {
        if self.query.is_empty() {
            self.url.clone()
        } else {
            format!("{}?{}", self.url, self.query.to_query_string())
        }
    }

    /// Produce the wire request, failing if an `@alias` in the path is unbound.
    pub fn finalize(
        &self,
        method: HttpMethod,
        body: Option<Vec<u8>>,
    ) -> Result<HttpRequest, ApiError> {
        if let Some(missing) = path::placeholders(&self.url)
            .into_iter()
            .find(|name| !self.query.contains(name))
        {
            return Err(ApiError::MissingParameter(missing.to_string()));
        }
        let headers = self.options.headers_for(method, body.is_some());
        let url = self.to_url();
        tracing::debug!(%method, %url, "finalized request");
        Ok(HttpRequest {
            method,
            url,
            headers,
            body,
        })
    }

    pub fn get<T>(self, parser: Parser<T>) -> Result<Call<T>, ApiError> {
        self.issue(HttpMethod::Get, None, parser)
    }

    pub fn post<T>(self, body: Option<Vec<u8>>, parser: Parser<T>) -> Result<Call<T>, ApiError> {
        self.issue(HttpMethod::Post, body, parser)
    }

    pub fn post_json<T, B: Serialize>(self, body: &B, parser: Parser<T>) -> Result<Call<T>, ApiError> {
        let bytes =
            serde_json::to_vec(body).map_err(|e| ApiError::Serialization(e.to_string()))?;
        self.post(Some(bytes), parser)
    }

    fn issue<T>(
        self,
        method: HttpMethod,
        body: Option<Vec<u8>>,
        parser: Parser<T>,
    ) -> Result<Call<T>, ApiError> {
        let request = self.finalize(method, body)?;
        let dispatch = match &self.batch {
            None => Dispatch::Immediate(request),
            Some(weak) => {
                let batch = weak.upgrade().ok_or_else(|| {
                    ApiError::Batch("batch was dropped before the call was issued".to_string())
                })?;
                Dispatch::Deferred(batch.attach(request))
            }
        };
        Ok(Call::new(dispatch, parser))
    }
}

/// An endpoint group: a `Queryable` with a fixed default path and its own
/// set of operations.
pub trait Endpoint: Sized {
    /// Relative path used when the group is created from a site URL.
    const DEFAULT_PATH: &'static str;

    fn from_queryable(queryable: Queryable) -> Self;

    fn queryable(&self) -> &Queryable;

    fn queryable_mut(&mut self) -> &mut Queryable;

    /// Group rooted at `base_url` (the site URL) under `DEFAULT_PATH`.
    fn new(base_url: &str) -> Result<Self, ApiError> {
        Queryable::new(base_url, Self::DEFAULT_PATH).map(Self::from_queryable)
    }

    fn with_config(config: &ClientConfig) -> Result<Self, ApiError> {
        Queryable::with_options(config.request_options(), &config.base_url, Self::DEFAULT_PATH)
            .map(Self::from_queryable)
    }

    fn in_batch(mut self, batch: &Arc<Batch>) -> Self {
        self.queryable_mut().set_batch(batch);
        self
    }

    fn has_batch(&self) -> bool {
        self.queryable().has_batch()
    }

    fn url(&self) -> &str {
        self.queryable().url()
    }
}
