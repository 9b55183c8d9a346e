//! Verify request building and response parsing against JSON test vectors
//! stored in `test-vectors/`.
//!
//! Each case names an operation and its arguments, the request it must build,
//! a simulated response, and either the expected parse result or the kind of
//! error. Expected results are matched as a JSON subset of the serialized
//! value, so vectors only spell out the fields they care about.

use profiles_core::{
    ApiError, Call, ClientPeoplePickerQueryParameters, Endpoint, HttpMethod, HttpRequest,
    HttpResponse, UserProfileQuery,
};
use serde::Serialize;
use serde_json::Value;

fn parse_method(s: &str) -> HttpMethod {
    match s {
        "GET" => HttpMethod::Get,
        "POST" => HttpMethod::Post,
        other => panic!("unknown method: {other}"),
    }
}

fn error_kind(err: &ApiError) -> &'static str {
    match err {
        ApiError::InvalidPath { .. } => "InvalidPath",
        ApiError::MissingParameter(_) => "MissingParameter",
        ApiError::NotFound => "NotFound",
        ApiError::Http { .. } => "Http",
        ApiError::Transport(_) => "Transport",
        ApiError::Deserialization(_) => "Deserialization",
        ApiError::Serialization(_) => "Serialization",
        ApiError::Config(_) => "Config",
        ApiError::Batch(_) => "Batch",
    }
}

/// Every key in `expected` must be present in `actual` with a matching value.
fn assert_subset(case: &str, expected: &Value, actual: &Value) {
    match (expected, actual) {
        (Value::Object(exp), Value::Object(act)) => {
            for (key, value) in exp {
                let got = act
                    .get(key)
                    .unwrap_or_else(|| panic!("{case}: missing key `{key}` in {actual}"));
                assert_subset(case, value, got);
            }
        }
        (Value::Array(exp), Value::Array(act)) => {
            assert_eq!(exp.len(), act.len(), "{case}: array length");
            for (e, a) in exp.iter().zip(act) {
                assert_subset(case, e, a);
            }
        }
        _ => assert_eq!(expected, actual, "{case}"),
    }
}

fn str_arg(args: &[Value], i: usize) -> &str {
    args[i].as_str().unwrap()
}

fn strings_arg(args: &[Value], i: usize) -> Vec<String> {
    serde_json::from_value(args[i].clone()).unwrap()
}

/// Request built by `call` and the JSON form of parsing `response` with it.
fn run<T: Serialize>(
    call: Call<T>,
    response: HttpResponse,
) -> (HttpRequest, Result<Value, ApiError>) {
    let request = call.request().cloned().expect("vector calls are immediate");
    let parsed = call
        .parse(response)
        .map(|value| serde_json::to_value(value).unwrap());
    (request, parsed)
}

fn dispatch(
    profiles: &UserProfileQuery,
    operation: &str,
    args: &[Value],
    response: HttpResponse,
) -> (HttpRequest, Result<Value, ApiError>) {
    let loader = profiles.profile_loader().unwrap();
    let picker = profiles.people_picker().unwrap();
    match operation {
        "am_i_followed_by" => run(profiles.am_i_followed_by(str_arg(args, 0)).unwrap(), response),
        "am_i_following" => run(profiles.am_i_following(str_arg(args, 0)).unwrap(), response),
        "edit_profile_link" => run(profiles.edit_profile_link().unwrap(), response),
        "is_my_people_list_public" => run(profiles.is_my_people_list_public().unwrap(), response),
        "get_followed_tags" => {
            let count = args[0].as_u64().unwrap() as u32;
            run(profiles.get_followed_tags(count).unwrap(), response)
        }
        "get_followers_for" => run(profiles.get_followers_for(str_arg(args, 0)).unwrap(), response),
        "my_followers" => run(profiles.my_followers().unwrap(), response),
        "my_properties" => run(profiles.my_properties().unwrap(), response),
        "get_people_followed_by" => {
            run(profiles.get_people_followed_by(str_arg(args, 0)).unwrap(), response)
        }
        "get_properties_for" => run(profiles.get_properties_for(str_arg(args, 0)).unwrap(), response),
        "trending_tags" => run(profiles.trending_tags().unwrap(), response),
        "get_user_profile_property_for" => run(
            profiles
                .get_user_profile_property_for(str_arg(args, 0), str_arg(args, 1))
                .unwrap(),
            response,
        ),
        "hide_suggestion" => run(profiles.hide_suggestion(str_arg(args, 0)).unwrap(), response),
        "is_following" => run(
            profiles.is_following(str_arg(args, 0), str_arg(args, 1)).unwrap(),
            response,
        ),
        "set_single_value_profile_property" => run(
            profiles
                .set_single_value_profile_property(
                    str_arg(args, 0),
                    str_arg(args, 1),
                    str_arg(args, 2),
                )
                .unwrap(),
            response,
        ),
        "set_multi_valued_profile_property" => run(
            profiles
                .set_multi_valued_profile_property(
                    str_arg(args, 0),
                    str_arg(args, 1),
                    &strings_arg(args, 2),
                )
                .unwrap(),
            response,
        ),
        "user_profile" => run(loader.user_profile().unwrap(), response),
        "owner_user_profile" => run(loader.owner_user_profile().unwrap(), response),
        "create_personal_site_enqueue_bulk" => run(
            loader
                .create_personal_site_enqueue_bulk(&strings_arg(args, 0))
                .unwrap(),
            response,
        ),
        "create_personal_site" => run(
            loader.create_personal_site(args[0].as_bool().unwrap()).unwrap(),
            response,
        ),
        "share_all_social_data" => run(
            loader.share_all_social_data(args[0].as_bool().unwrap()).unwrap(),
            response,
        ),
        "client_people_picker_resolve_user" | "client_people_picker_search_user" => {
            let params: ClientPeoplePickerQueryParameters =
                serde_json::from_value(args[0].clone()).unwrap();
            if operation == "client_people_picker_resolve_user" {
                run(picker.client_people_picker_resolve_user(&params).unwrap(), response)
            } else {
                run(picker.client_people_picker_search_user(&params).unwrap(), response)
            }
        }
        other => panic!("unknown operation: {other}"),
    }
}

fn check_request(name: &str, expected: &Value, req: &HttpRequest) {
    assert_eq!(
        req.method,
        parse_method(expected["method"].as_str().unwrap()),
        "{name}: method"
    );
    assert_eq!(req.url, expected["url"].as_str().unwrap(), "{name}: url");

    if let Some(headers) = expected.get("headers").and_then(Value::as_object) {
        for (header, value) in headers {
            assert_eq!(req.header(header), value.as_str(), "{name}: header {header}");
        }
    }

    match expected.get("body") {
        None => {}
        Some(Value::Null) => assert!(req.body.is_none(), "{name}: expected no body"),
        Some(body) => {
            let actual: Value =
                serde_json::from_slice(req.body.as_deref().expect("request body")).unwrap();
            assert_eq!(&actual, body, "{name}: body");
        }
    }
}

fn simulated_response(case: &Value) -> HttpResponse {
    let response = &case["response"];
    let status = response["status"].as_u64().unwrap() as u16;
    let body = match &response["body"] {
        Value::String(raw) => raw.clone(),
        other => other.to_string(),
    };
    HttpResponse::new(status, body)
}

fn run_vectors(raw: &str) {
    let vectors: Value = serde_json::from_str(raw).unwrap();
    let profiles = UserProfileQuery::new(vectors["base_url"].as_str().unwrap()).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let operation = case["operation"].as_str().unwrap();
        let args = case["args"].as_array().unwrap();

        let (request, parsed) = dispatch(&profiles, operation, args, simulated_response(case));
        check_request(name, &case["expected_request"], &request);

        match case.get("expected_error").and_then(Value::as_str) {
            Some(kind) => {
                let err = parsed.expect_err(name);
                assert_eq!(error_kind(&err), kind, "{name}: {err}");
            }
            None => {
                let value = parsed.unwrap_or_else(|e| panic!("{name}: {e}"));
                assert_subset(name, &case["expected"], &value);
            }
        }
    }
}

#[test]
fn people_manager_vectors() {
    run_vectors(include_str!("../../test-vectors/people_manager.json"));
}

#[test]
fn profile_loader_vectors() {
    run_vectors(include_str!("../../test-vectors/profile_loader.json"));
}

#[test]
fn people_picker_vectors() {
    run_vectors(include_str!("../../test-vectors/people_picker.json"));
}
