//! Deferred execution of several calls as one `$batch` request.
//!
//! # Design
//! A `Batch` is owned by the caller (through an `Arc`) and builders only keep
//! a `Weak` to it. Terminal calls on a batched builder append their finalized
//! request here and hand back a `BatchTicket`. Flushing is host-does-IO like
//! everything else: `build_request` drains the queue into one multipart
//! request plus a `BatchReceipt`, and the receipt splits the multipart answer
//! back into one `HttpResponse` per ticket, in the order the calls were
//! attached.
//!
//! Each drain starts a new generation. Calls attached while a flush is in
//! flight land in the next generation, and a ticket only resolves against the
//! results of the flush that carried it.
//!
//! GET requests go into the batch as plain parts; every other method gets its
//! own changeset, which is how the service expects writes to be framed.

use std::sync::{Arc, LazyLock, Mutex, MutexGuard};

use regex::Regex;
use uuid::Uuid;

use crate::config::RequestOptions;
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::odata;
use crate::path;

static STATUS_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^HTTP/[0-9.]+\s+([0-9]{3})\b").expect("valid regex"));

const CRLF: &str = "\r\n";

/// Position of a queued call inside one flush of its batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchTicket {
    generation: u64,
    index: usize,
}

impl BatchTicket {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Default)]
struct Queue {
    generation: u64,
    requests: Vec<HttpRequest>,
}

#[derive(Debug)]
pub struct Batch {
    id: Uuid,
    base_url: String,
    options: Arc<RequestOptions>,
    queue: Mutex<Queue>,
}

impl Batch {
    pub fn new(base_url: &str) -> Arc<Self> {
        Self::with_options(base_url, Arc::new(RequestOptions::default()))
    }

    pub fn with_options(base_url: &str, options: Arc<RequestOptions>) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            base_url: base_url.trim_end_matches('/').to_string(),
            options,
            queue: Mutex::new(Queue::default()),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn boundary(&self) -> String {
        format!("batch_{}", self.id)
    }

    /// Queue a finalized request for the next flush.
    pub fn attach(&self, request: HttpRequest) -> BatchTicket {
        let mut queue = self.queue();
        let ticket = BatchTicket {
            generation: queue.generation,
            index: queue.requests.len(),
        };
        tracing::debug!(
            batch = %self.id,
            generation = ticket.generation,
            ticket = ticket.index,
            method = %request.method,
            url = %request.url,
            "queued request in batch"
        );
        queue.requests.push(request);
        ticket
    }

    /// Number of calls waiting for the next flush.
    pub fn len(&self) -> usize {
        self.queue().requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue().requests.is_empty()
    }

    /// Drain every queued call into a single multipart request.
    ///
    /// The queue is empty afterwards; a failed send does not requeue.
    pub fn build_request(&self) -> Result<BatchRequest, ApiError> {
        let (generation, pending) = {
            let mut queue = self.queue();
            if queue.requests.is_empty() {
                return Err(ApiError::Batch("cannot flush an empty batch".to_string()));
            }
            let generation = queue.generation;
            queue.generation += 1;
            (generation, std::mem::take(&mut queue.requests))
        };

        let boundary = self.boundary();
        let mut body = String::new();

        for request in &pending {
            body.push_str(&format!("--{boundary}{CRLF}"));
            if request.method == HttpMethod::Get {
                write_part(&mut body, request);
            } else {
                let changeset = format!("changeset_{}", Uuid::new_v4());
                body.push_str(&format!(
                    "Content-Type: multipart/mixed; boundary=\"{changeset}\"{CRLF}{CRLF}"
                ));
                body.push_str(&format!("--{changeset}{CRLF}"));
                write_part(&mut body, request);
                body.push_str(&format!("--{changeset}--{CRLF}{CRLF}"));
            }
        }
        body.push_str(&format!("--{boundary}--{CRLF}"));

        let mut headers = vec![(
            "accept".to_string(),
            self.options.odata.accept().to_string(),
        )];
        headers.push((
            "content-type".to_string(),
            format!("multipart/mixed; boundary=\"{boundary}\""),
        ));
        headers.extend(self.options.headers.iter().cloned());

        tracing::debug!(batch = %self.id, generation, parts = pending.len(), "built batch request");
        Ok(BatchRequest {
            request: HttpRequest {
                method: HttpMethod::Post,
                url: path::combine(&self.base_url, "_api/$batch"),
                headers,
                body: Some(body.into_bytes()),
            },
            receipt: BatchReceipt {
                batch: self.id,
                generation,
                parts: pending.len(),
            },
        })
    }

    fn queue(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A drained batch: the request to send and the receipt that reads its answer.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub request: HttpRequest,
    pub receipt: BatchReceipt,
}

/// What was sent in one flush, used to validate and split the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchReceipt {
    batch: Uuid,
    generation: u64,
    parts: usize,
}

impl BatchReceipt {
    pub fn parts(&self) -> usize {
        self.parts
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Split the multipart answer into per-call responses.
    pub fn parse_response(&self, response: HttpResponse) -> Result<BatchResults, ApiError> {
        odata::check_status(&response)?;
        let responses = split_responses(&response.body)?;
        if responses.len() != self.parts {
            return Err(ApiError::Batch(format!(
                "expected {} responses, got {}",
                self.parts,
                responses.len()
            )));
        }
        tracing::debug!(batch = %self.batch, generation = self.generation, "parsed batch response");
        Ok(BatchResults {
            generation: self.generation,
            responses: responses.into_iter().map(Some).collect(),
        })
    }
}

fn write_part(body: &mut String, request: &HttpRequest) {
    body.push_str(&format!("Content-Type: application/http{CRLF}"));
    body.push_str(&format!("Content-Transfer-Encoding: binary{CRLF}{CRLF}"));
    body.push_str(&format!("{} {} HTTP/1.1{CRLF}", request.method, request.url));
    for (name, value) in &request.headers {
        body.push_str(&format!("{name}: {value}{CRLF}"));
    }
    body.push_str(CRLF);
    // Binary payloads are carried lossily; they are not meant to be batched.
    if let Some(text) = request.body_text() {
        body.push_str(&text);
        body.push_str(CRLF);
    }
    body.push_str(CRLF);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Preamble,
    PartHeaders,
    Status,
    StatusHeaders,
    Body,
}

struct PartialResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<String>,
}

impl PartialResponse {
    fn finish(self) -> HttpResponse {
        let body = if self.status == 204 {
            String::new()
        } else {
            self.body.join("\n").trim().to_string()
        };
        HttpResponse {
            status: self.status,
            headers: self.headers,
            body,
        }
    }
}

fn split_responses(body: &str) -> Result<Vec<HttpResponse>, ApiError> {
    let mut state = State::Preamble;
    let mut current: Option<PartialResponse> = None;
    let mut responses = Vec::new();

    for (number, raw) in body.lines().enumerate() {
        let line = raw.trim_end_matches('\r');

        if line.starts_with("--") {
            if let Some(part) = current.take() {
                responses.push(part.finish());
            }
            state = if line.ends_with("--") {
                State::Preamble
            } else {
                State::PartHeaders
            };
            continue;
        }

        match state {
            State::Preamble => {}
            State::PartHeaders => {
                if line.trim().is_empty() {
                    state = State::Status;
                }
            }
            State::Status => {
                if line.trim().is_empty() {
                    continue;
                }
                let status = STATUS_LINE
                    .captures(line)
                    .and_then(|c| c.get(1))
                    .and_then(|m| m.as_str().parse::<u16>().ok())
                    .ok_or_else(|| {
                        ApiError::Batch(format!("invalid status on line {}: {line}", number + 1))
                    })?;
                current = Some(PartialResponse {
                    status,
                    headers: Vec::new(),
                    body: Vec::new(),
                });
                state = State::StatusHeaders;
            }
            State::StatusHeaders => {
                if line.trim().is_empty() {
                    state = State::Body;
                } else if let (Some(part), Some((name, value))) = (current.as_mut(), line.split_once(':')) {
                    part.headers
                        .push((name.trim().to_string(), value.trim().to_string()));
                }
            }
            State::Body => {
                if let Some(part) = current.as_mut() {
                    part.body.push(line.to_string());
                }
            }
        }
    }

    if let Some(part) = current.take() {
        responses.push(part.finish());
    }
    Ok(responses)
}

/// Responses of a flushed batch, claimed one ticket at a time.
#[derive(Debug)]
pub struct BatchResults {
    generation: u64,
    responses: Vec<Option<HttpResponse>>,
}

impl BatchResults {
    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    pub fn take(&mut self, ticket: BatchTicket) -> Result<HttpResponse, ApiError> {
        if ticket.generation != self.generation {
            return Err(ApiError::Batch(format!(
                "ticket was queued for flush {}, these results are from flush {}",
                ticket.generation, self.generation
            )));
        }
        self.responses
            .get_mut(ticket.index)
            .and_then(Option::take)
            .ok_or_else(|| {
                ApiError::Batch(format!("no unclaimed response for ticket {}", ticket.index))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(url: &str) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            url: url.to_string(),
            headers: vec![("accept".to_string(), "application/json;odata=verbose".to_string())],
            body: None,
        }
    }

    fn post(url: &str, body: &str) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Post,
            url: url.to_string(),
            headers: Vec::new(),
            body: Some(body.as_bytes().to_vec()),
        }
    }

    fn ok_parts(count: usize) -> HttpResponse {
        let mut lines = Vec::new();
        for _ in 0..count {
            lines.extend([
                "--batchresponse_1",
                "Content-Type: application/http",
                "",
                "HTTP/1.1 200 OK",
                "",
                "{}",
            ]);
        }
        lines.push("--batchresponse_1--");
        HttpResponse::new(200, lines.join("\r\n"))
    }

    #[test]
    fn attach_hands_out_sequential_tickets() {
        let batch = Batch::new("https://contoso");
        assert!(batch.is_empty());
        let a = batch.attach(get("https://contoso/_api/a"));
        let b = batch.attach(get("https://contoso/_api/b"));
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(a.generation(), b.generation());
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn empty_batch_cannot_be_flushed() {
        let batch = Batch::new("https://contoso");
        assert!(matches!(batch.build_request(), Err(ApiError::Batch(_))));
    }

    #[test]
    fn build_request_frames_gets_and_changesets() {
        let batch = Batch::new("https://contoso/sites/dev/");
        batch.attach(get("https://contoso/sites/dev/_api/a"));
        batch.attach(post("https://contoso/sites/dev/_api/b", "{\"x\":1}"));

        let BatchRequest { request: req, receipt } = batch.build_request().unwrap();
        assert_eq!(receipt.parts(), 2);
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.url, "https://contoso/sites/dev/_api/$batch");
        let boundary = batch.boundary();
        assert_eq!(
            req.header("content-type"),
            Some(format!("multipart/mixed; boundary=\"{boundary}\"").as_str())
        );

        let body = req.body_text().unwrap().into_owned();
        assert!(body.contains("GET https://contoso/sites/dev/_api/a HTTP/1.1"));
        assert!(body.contains("POST https://contoso/sites/dev/_api/b HTTP/1.1"));
        assert!(body.contains("{\"x\":1}"));
        assert!(body.contains("boundary=\"changeset_"));
        assert_eq!(body.matches("changeset_").count(), 3);
        assert!(body.trim_end().ends_with(&format!("--{boundary}--")));
    }

    #[test]
    fn build_request_drains_the_queue() {
        let batch = Batch::new("https://contoso");
        let first = batch.attach(post("https://contoso/_api/hidesuggestion(@v)?@v='a'", "{}"));
        let flushed = batch.build_request().unwrap();
        assert!(batch.is_empty());
        assert!(matches!(batch.build_request(), Err(ApiError::Batch(_))));

        let second = batch.attach(get("https://contoso/_api/getmyproperties"));
        assert_eq!(second.index(), 0);
        assert_ne!(second.generation(), first.generation());

        let again = batch.build_request().unwrap();
        assert_eq!(again.receipt.parts(), 1);
        let body = again.request.body_text().unwrap().into_owned();
        assert!(!body.contains("hidesuggestion"));
        assert!(body.contains("getmyproperties"));
        assert_ne!(flushed.receipt.generation(), again.receipt.generation());
    }

    #[test]
    fn attach_during_flight_waits_for_next_flush() {
        let batch = Batch::new("https://contoso");
        let sent = batch.attach(post("https://contoso/_api/b", "{}"));
        let BatchRequest { receipt, .. } = batch.build_request().unwrap();
        let late = batch.attach(get("https://contoso/_api/c"));

        let mut results = receipt.parse_response(ok_parts(1)).unwrap();
        assert_eq!(results.take(sent).unwrap().status, 200);
        assert!(matches!(results.take(late), Err(ApiError::Batch(_))));
        assert_eq!(batch.len(), 1);

        let next = batch.build_request().unwrap();
        let mut results = next.receipt.parse_response(ok_parts(1)).unwrap();
        assert_eq!(results.take(late).unwrap().status, 200);
    }

    #[test]
    fn parse_response_splits_parts_in_order() {
        let batch = Batch::new("https://contoso");
        let a = batch.attach(get("https://contoso/_api/a"));
        let b = batch.attach(post("https://contoso/_api/b", "{}"));
        let c = batch.attach(get("https://contoso/_api/c"));
        let receipt = batch.build_request().unwrap().receipt;

        let body = [
            "--batchresponse_1",
            "Content-Type: application/http",
            "Content-Transfer-Encoding: binary",
            "",
            "HTTP/1.1 200 OK",
            "CONTENT-TYPE: application/json;odata=verbose;charset=utf-8",
            "",
            "{\"d\":{\"AmIFollowing\":true}}",
            "--batchresponse_1",
            "Content-Type: multipart/mixed; boundary=changesetresponse_2",
            "",
            "--changesetresponse_2",
            "Content-Type: application/http",
            "Content-Transfer-Encoding: binary",
            "",
            "HTTP/1.1 204 No Content",
            "",
            "",
            "--changesetresponse_2--",
            "--batchresponse_1",
            "Content-Type: application/http",
            "Content-Transfer-Encoding: binary",
            "",
            "HTTP/1.1 404 Not Found",
            "",
            "{\"error\":\"missing\"}",
            "--batchresponse_1--",
        ]
        .join("\r\n");

        let mut results = receipt.parse_response(HttpResponse::new(200, body)).unwrap();
        assert_eq!(results.len(), 3);

        let first = results.take(a).unwrap();
        assert_eq!(first.status, 200);
        assert_eq!(first.body, "{\"d\":{\"AmIFollowing\":true}}");
        assert_eq!(
            first.header("content-type"),
            Some("application/json;odata=verbose;charset=utf-8")
        );

        let second = results.take(b).unwrap();
        assert_eq!(second.status, 204);
        assert!(second.body.is_empty());

        let third = results.take(c).unwrap();
        assert_eq!(third.status, 404);

        assert!(matches!(results.take(a), Err(ApiError::Batch(_))));
    }

    #[test]
    fn parse_response_rejects_count_mismatch() {
        let batch = Batch::new("https://contoso");
        batch.attach(get("https://contoso/_api/a"));
        batch.attach(get("https://contoso/_api/b"));
        let receipt = batch.build_request().unwrap().receipt;
        let err = receipt.parse_response(ok_parts(1)).unwrap_err();
        assert!(matches!(err, ApiError::Batch(_)));
    }

    #[test]
    fn parse_response_rejects_garbage_status() {
        let batch = Batch::new("https://contoso");
        batch.attach(get("https://contoso/_api/a"));
        let receipt = batch.build_request().unwrap().receipt;
        let body = "--batchresponse_1\r\n\r\nnot a status line\r\n--batchresponse_1--\r\n";
        let err = receipt.parse_response(HttpResponse::new(200, body)).unwrap_err();
        assert!(matches!(err, ApiError::Batch(_)));
    }

    #[test]
    fn failed_batch_request_surfaces_http_error() {
        let batch = Batch::new("https://contoso");
        batch.attach(get("https://contoso/_api/a"));
        let receipt = batch.build_request().unwrap().receipt;
        let err = receipt.parse_response(HttpResponse::new(400, "bad")).unwrap_err();
        assert!(matches!(err, ApiError::Http { status: 400, .. }));
    }
}
