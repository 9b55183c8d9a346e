//! Fluent client core for the user-profile REST API.
//!
//! # Overview
//! Endpoint groups (`UserProfileQuery`, `ProfileLoader`,
//! `ClientPeoplePickerQuery`) are chains of `Queryable` builders. Each
//! operation finalizes a builder into a `Call<T>`: an `HttpRequest` plus the
//! parser for its response, or a ticket when the builder is attached to a
//! `Batch`. The caller executes the HTTP round-trip itself or hands calls to
//! a `Client` with a `Transport`.
//!
//! # Design
//! - Builders never share mutable state; a derived builder copies its
//!   parent's URL and starts with an empty query map.
//! - `@alias` placeholders are validated when the request is finalized, not
//!   while the chain is composed.
//! - Response parsers accept every OData metadata level.
//!
//! ```no_run
//! use profiles_core::{Endpoint, HttpResponse, UserProfileQuery};
//!
//! let profiles = UserProfileQuery::new("https://contoso.sharepoint.com/sites/dev")?;
//! let call = profiles.am_i_followed_by("i:0#.f|membership|alice@contoso.com")?;
//! let request = call.request().expect("not batched");
//! // ... send `request` with any HTTP client ...
//! let following = call.parse(HttpResponse::new(200, r#"{"d":{"AmIFollowedBy":true}}"#))?;
//! assert!(following);
//! # Ok::<(), profiles_core::ApiError>(())
//! ```

pub mod batch;
pub mod call;
pub mod config;
pub mod error;
pub mod http;
pub mod odata;
pub mod path;
pub mod people_picker;
pub mod profile_loader;
pub mod profiles;
pub mod query;
pub mod queryable;
pub mod transport;
pub mod types;

pub use batch::{Batch, BatchReceipt, BatchRequest, BatchResults, BatchTicket};
pub use call::{Call, Dispatch};
pub use config::{ClientConfig, ODataMode, RequestOptions};
pub use error::ApiError;
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use people_picker::ClientPeoplePickerQuery;
pub use profile_loader::ProfileLoader;
pub use profiles::UserProfileQuery;
pub use query::QueryParams;
pub use queryable::{Endpoint, Queryable};
pub use transport::{Client, ReqwestTransport, Transport};
pub use types::{
    ClientPeoplePickerQueryParameters, FollowedContent, HashTag, HashTagCollection,
    PeoplePickerEntity, PeoplePickerEntityData, PrincipalSource, PrincipalType, UrlZone,
    UserProfile,
};
