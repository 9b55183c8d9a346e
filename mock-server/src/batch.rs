//! `$batch` endpoint: a multipart/mixed envelope of plain HTTP requests.
//!
//! Reads from the envelope are plain parts, writes arrive inside their own
//! `changeset_*` part. Each inner request is routed like a direct call and
//! the answers go back in the same order, writes wrapped in a changeset.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::{
    body::{self, Bytes},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
};
use percent_encoding::percent_decode_str;

use crate::{route, Db};

static RESPONSE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct InnerRequest {
    pub method: Method,
    /// Path below `/_api/`, percent-decoded.
    pub rest: String,
    pub params: HashMap<String, String>,
    pub body: Bytes,
    pub in_changeset: bool,
}

pub(crate) async fn handle(
    db: &Db,
    method: &Method,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Response, StatusCode> {
    if *method != Method::POST {
        return Err(StatusCode::METHOD_NOT_ALLOWED);
    }
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::BAD_REQUEST)?;
    let boundary = boundary_of(content_type).ok_or(StatusCode::BAD_REQUEST)?;
    let text = std::str::from_utf8(body).map_err(|_| StatusCode::BAD_REQUEST)?;
    let requests = parse_envelope(text, &boundary)?;
    tracing::info!(parts = requests.len(), "mock batch");

    let id = RESPONSE_ID.fetch_add(1, Ordering::Relaxed);
    let mut out = String::new();
    for (n, request) in requests.iter().enumerate() {
        let response = route(db, &request.method, &request.rest, &request.params, &request.body).await;
        let status = response.status();
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        let payload = String::from_utf8_lossy(&bytes);

        out.push_str(&format!("--batchresponse_{id}\r\n"));
        if request.in_changeset {
            let changeset = format!("changesetresponse_{id}_{n}");
            out.push_str(&format!("Content-Type: multipart/mixed; boundary={changeset}\r\n\r\n"));
            out.push_str(&format!("--{changeset}\r\n"));
            write_part(&mut out, status, &payload);
            out.push_str(&format!("--{changeset}--\r\n"));
        } else {
            write_part(&mut out, status, &payload);
        }
    }
    out.push_str(&format!("--batchresponse_{id}--\r\n"));

    let content_type = format!("multipart/mixed; boundary=batchresponse_{id}");
    Ok(([(header::CONTENT_TYPE, content_type)], out).into_response())
}

fn write_part(out: &mut String, status: StatusCode, payload: &str) {
    out.push_str("Content-Type: application/http\r\n");
    out.push_str("Content-Transfer-Encoding: binary\r\n\r\n");
    out.push_str(&format!(
        "HTTP/1.1 {} {}\r\n",
        status.as_u16(),
        status.canonical_reason().unwrap_or("")
    ));
    if !payload.is_empty() {
        out.push_str("CONTENT-TYPE: application/json;odata=verbose;charset=utf-8\r\n");
    }
    out.push_str("\r\n");
    out.push_str(payload);
    out.push_str("\r\n");
}

/// `boundary` parameter of a multipart content type, quotes removed.
fn boundary_of(content_type: &str) -> Option<String> {
    content_type.split(';').find_map(|param| {
        let (name, value) = param.trim().split_once('=')?;
        name.eq_ignore_ascii_case("boundary")
            .then(|| value.lines().next().unwrap_or("").trim().trim_matches('"').to_string())
    })
}

/// Sections between `--boundary` delimiters, without preamble or epilogue.
fn sections<'a>(text: &'a str, boundary: &str) -> Vec<&'a str> {
    let delimiter = format!("--{boundary}");
    let mut parts = text.split(delimiter.as_str());
    parts.next();
    parts
        .take_while(|part| !part.starts_with("--"))
        .map(|part| {
            part.strip_prefix("\r\n")
                .or_else(|| part.strip_prefix('\n'))
                .unwrap_or(part)
        })
        .collect()
}

/// Split a MIME section at its first blank line into headers and content.
fn split_headers(section: &str) -> (&str, &str) {
    if let Some(content) = section
        .strip_prefix("\r\n")
        .or_else(|| section.strip_prefix('\n'))
    {
        return ("", content);
    }
    section
        .split_once("\r\n\r\n")
        .or_else(|| section.split_once("\n\n"))
        .unwrap_or((section, ""))
}

pub(crate) fn parse_envelope(text: &str, boundary: &str) -> Result<Vec<InnerRequest>, StatusCode> {
    let mut requests = Vec::new();
    for section in sections(text, boundary) {
        let (headers, content) = split_headers(section);
        match boundary_of(headers).filter(|_| headers.contains("multipart/mixed")) {
            Some(changeset) => {
                for inner in sections(content, &changeset) {
                    let (_, http) = split_headers(inner);
                    requests.push(parse_http(http, true)?);
                }
            }
            None => requests.push(parse_http(content, false)?),
        }
    }
    if requests.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    Ok(requests)
}

/// `METHOD url HTTP/1.1`, header lines, blank line, body.
fn parse_http(text: &str, in_changeset: bool) -> Result<InnerRequest, StatusCode> {
    let (head, body) = split_headers(text);
    let request_line = head.lines().next().ok_or(StatusCode::BAD_REQUEST)?;
    let (method, rest) = request_line.split_once(' ').ok_or(StatusCode::BAD_REQUEST)?;
    let url = rest
        .trim_end()
        .strip_suffix("HTTP/1.1")
        .ok_or(StatusCode::BAD_REQUEST)?
        .trim_end();
    let method = Method::from_bytes(method.as_bytes()).map_err(|_| StatusCode::BAD_REQUEST)?;

    let (_, below_api) = url.split_once("/_api/").ok_or(StatusCode::BAD_REQUEST)?;
    let (path, query) = below_api.split_once('?').unwrap_or((below_api, ""));
    let params = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (decode(k), decode(v))
        })
        .collect();

    Ok(InnerRequest {
        method,
        rest: decode(path).trim_matches('/').to_string(),
        params,
        body: Bytes::from(body.trim_end_matches(['\r', '\n']).to_string()),
        in_changeset,
    })
}

fn decode(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope() -> String {
        [
            "--batch_1",
            "Content-Type: application/http",
            "Content-Transfer-Encoding: binary",
            "",
            "GET http://h/_api/sp.userprofiles.peoplemanager/amifollowedby(@v)?@v='bob%40contoso.com' HTTP/1.1",
            "accept: application/json;odata=verbose",
            "",
            "",
            "--batch_1",
            "Content-Type: multipart/mixed; boundary=\"changeset_2\"",
            "",
            "--changeset_2",
            "Content-Type: application/http",
            "Content-Transfer-Encoding: binary",
            "",
            "POST http://h/_api/sp.userprofiles.peoplemanager/SetSingleValueProfileProperty HTTP/1.1",
            "content-type: application/json;odata=verbose;charset=utf-8",
            "",
            "{\"a\":1}",
            "",
            "--changeset_2--",
            "",
            "--batch_1--",
            "",
        ]
        .join("\r\n")
    }

    #[test]
    fn boundary_is_read_from_content_type() {
        assert_eq!(
            boundary_of("multipart/mixed; boundary=\"batch_x\"").as_deref(),
            Some("batch_x")
        );
        assert_eq!(boundary_of("multipart/mixed; boundary=b").as_deref(), Some("b"));
        assert_eq!(boundary_of("application/json"), None);
    }

    #[test]
    fn envelope_yields_plain_and_changeset_requests() {
        let requests = parse_envelope(&envelope(), "batch_1").unwrap();
        assert_eq!(requests.len(), 2);

        let get = &requests[0];
        assert_eq!(get.method, Method::GET);
        assert_eq!(get.rest, "sp.userprofiles.peoplemanager/amifollowedby(@v)");
        assert_eq!(get.params["@v"], "'bob@contoso.com'");
        assert!(get.body.is_empty());
        assert!(!get.in_changeset);

        let post = &requests[1];
        assert_eq!(post.method, Method::POST);
        assert_eq!(post.body, Bytes::from_static(b"{\"a\":1}"));
        assert!(post.in_changeset);
    }

    #[test]
    fn literal_spaces_survive_in_paths() {
        let text = "--b\r\n\r\nGET http://h/_api/x/getuserprofilepropertyfor(accountname=@v, propertyname='Title')?@v='a' HTTP/1.1\r\n\r\n\r\n--b--\r\n";
        let requests = parse_envelope(text, "b").unwrap();
        assert_eq!(
            requests[0].rest,
            "x/getuserprofilepropertyfor(accountname=@v, propertyname='Title')"
        );
    }

    #[test]
    fn empty_or_malformed_envelopes_are_rejected() {
        assert_eq!(parse_envelope("--b--\r\n", "b"), Err(StatusCode::BAD_REQUEST));
        let text = "--b\r\n\r\nnot a request line\r\n--b--\r\n";
        assert_eq!(parse_envelope(text, "b"), Err(StatusCode::BAD_REQUEST));
    }
}
