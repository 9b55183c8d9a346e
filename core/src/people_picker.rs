//! People picker web service: resolve a single principal or search for many.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::call::Call;
use crate::error::ApiError;
use crate::http::HttpResponse;
use crate::odata;
use crate::queryable::{Endpoint, Queryable};
use crate::types::{
    ClientPeoplePickerQueryParameters, PeoplePickerEntity, PEOPLE_PICKER_QUERY_PARAMETERS_TYPE,
};

#[derive(Debug)]
pub struct ClientPeoplePickerQuery {
    q: Queryable,
}

impl Endpoint for ClientPeoplePickerQuery {
    const DEFAULT_PATH: &'static str =
        "_api/sp.ui.applicationpages.clientpeoplepickerwebserviceinterface";

    fn from_queryable(queryable: Queryable) -> Self {
        Self { q: queryable }
    }

    fn queryable(&self) -> &Queryable {
        &self.q
    }

    fn queryable_mut(&mut self) -> &mut Queryable {
        &mut self.q
    }
}

impl ClientPeoplePickerQuery {
    /// Resolve `query_params.query_string` to one principal.
    pub fn client_people_picker_resolve_user(
        &self,
        query_params: &ClientPeoplePickerQueryParameters,
    ) -> Result<Call<PeoplePickerEntity>, ApiError> {
        self.invoke(".clientpeoplepickerresolveuser", query_params, parse_resolve_user)
    }

    /// Principals matching `query_params.query_string`.
    pub fn client_people_picker_search_user(
        &self,
        query_params: &ClientPeoplePickerQueryParameters,
    ) -> Result<Call<Vec<PeoplePickerEntity>>, ApiError> {
        self.invoke(".clientpeoplepickersearchuser", query_params, parse_search_user)
    }

    fn invoke<T>(
        &self,
        method: &str,
        query_params: &ClientPeoplePickerQueryParameters,
        parser: fn(HttpResponse) -> Result<T, ApiError>,
    ) -> Result<Call<T>, ApiError> {
        let mut q = self.q.clone_with(Self::from_queryable, None, true)?;
        q.q.concat(method)?;
        let body = query_parameters_body(query_params)?;
        q.q.post_json(&body, parser)
    }
}

/// `{"queryParams": {"__metadata": {...}, ...params}}`
pub fn query_parameters_body(
    query_params: &ClientPeoplePickerQueryParameters,
) -> Result<Value, ApiError> {
    let mut merged = match odata::metadata(PEOPLE_PICKER_QUERY_PARAMETERS_TYPE) {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    match serde_json::to_value(query_params) {
        Ok(Value::Object(params)) => merged.extend(params),
        Ok(_) => {}
        Err(e) => return Err(ApiError::Serialization(e.to_string())),
    }
    let mut body = Map::new();
    body.insert("queryParams".to_string(), Value::Object(merged));
    Ok(Value::Object(body))
}

fn parse_resolve_user(response: HttpResponse) -> Result<PeoplePickerEntity, ApiError> {
    parse_embedded(response, "ClientPeoplePickerResolveUser")
}

fn parse_search_user(response: HttpResponse) -> Result<Vec<PeoplePickerEntity>, ApiError> {
    parse_embedded(response, "ClientPeoplePickerSearchUser")
}

/// The picker answers with its JSON result serialized into a string.
fn parse_embedded<T: DeserializeOwned>(
    response: HttpResponse,
    function: &str,
) -> Result<T, ApiError> {
    let value = odata::unwrap_scalar(odata::parse_value(response)?, function);
    match value {
        Value::String(text) => serde_json::from_str(&text).map_err(ApiError::from),
        other => serde_json::from_value(other).map_err(ApiError::from),
    }
}
