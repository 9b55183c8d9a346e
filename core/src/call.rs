//! Terminal call descriptors returned by endpoint operations.

use std::fmt;

use crate::batch::{BatchResults, BatchTicket};
use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse};

/// Turns the raw response of one call into its declared result type.
pub type Parser<T> = fn(HttpResponse) -> Result<T, ApiError>;

/// Whether a call must be executed by the caller or was queued in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Immediate(HttpRequest),
    Deferred(BatchTicket),
}

/// A finalized operation: the request (or its batch ticket) plus the parser
/// for whatever comes back.
pub struct Call<T> {
    dispatch: Dispatch,
    parser: Parser<T>,
}

impl<T> Call<T> {
    pub(crate) fn new(dispatch: Dispatch, parser: Parser<T>) -> Self {
        Self { dispatch, parser }
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// The request to execute, or `None` if the call sits in a batch.
    pub fn request(&self) -> Option<&HttpRequest> {
        match &self.dispatch {
            Dispatch::Immediate(req) => Some(req),
            Dispatch::Deferred(_) => None,
        }
    }

    pub fn into_request(self) -> Option<HttpRequest> {
        match self.dispatch {
            Dispatch::Immediate(req) => Some(req),
            Dispatch::Deferred(_) => None,
        }
    }

    pub fn ticket(&self) -> Option<BatchTicket> {
        match &self.dispatch {
            Dispatch::Immediate(_) => None,
            Dispatch::Deferred(ticket) => Some(*ticket),
        }
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self.dispatch, Dispatch::Deferred(_))
    }

    pub fn parse(&self, response: HttpResponse) -> Result<T, ApiError> {
        (self.parser)(response)
    }

    /// Pull this call's response out of a flushed batch and parse it.
    pub fn resolve(&self, results: &mut BatchResults) -> Result<T, ApiError> {
        let ticket = self
            .ticket()
            .ok_or_else(|| ApiError::Batch("call was not queued in a batch".to_string()))?;
        self.parse(results.take(ticket)?)
    }
}

impl<T> fmt::Debug for Call<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call")
            .field("dispatch", &self.dispatch)
            .finish_non_exhaustive()
    }
}
