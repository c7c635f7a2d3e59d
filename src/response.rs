//! Raw HTTP responses and their normalization into JSON payloads or
//! classified errors.

use crate::errors::ApiClientError;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

/// Header carrying the server-side request identifier.
pub const REQUEST_ID_HEADER: &str = "X-REQUEST-ID";

/// Key of the collection envelope in list responses.
pub const COLLECTION_KEY: &str = "objects";

/// A fully read HTTP response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// `(name, value)` of every cookie set by this response.
    pub cookies: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Reads the whole response. Cookies are captured before the body is consumed.
    pub(crate) fn read(response: reqwest::blocking::Response) -> Result<Self, ApiClientError> {
        let url = response.url().clone();
        let status = response.status();
        let headers = response.headers().clone();
        let cookies = response
            .cookies()
            .map(|c| (c.name().to_string(), c.value().to_string()))
            .collect();
        let body = response
            .bytes()
            .map_err(ApiClientError::from_transport)?
            .to_vec();

        Ok(RawResponse {
            url,
            status,
            headers,
            cookies,
            body,
        })
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn request_id(&self) -> Option<String> {
        self.headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// The payload handed back to callers.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedResponse {
    /// A single JSON value: the body itself, or the only item of a
    /// collection envelope.
    Single(Value),
    /// The items of a collection envelope, in server order.
    List(Vec<Value>),
    /// No payload.
    Empty,
}

impl NormalizedResponse {
    pub fn is_empty(&self) -> bool {
        matches!(self, NormalizedResponse::Empty)
    }

    pub fn as_single(&self) -> Option<&Value> {
        match self {
            NormalizedResponse::Single(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            NormalizedResponse::List(items) => Some(items),
            _ => None,
        }
    }

    /// Folds the response back into one JSON value (`Null` when empty).
    pub fn into_value(self) -> Value {
        match self {
            NormalizedResponse::Single(v) => v,
            NormalizedResponse::List(items) => Value::Array(items),
            NormalizedResponse::Empty => Value::Null,
        }
    }

    /// Deserializes the payload into a typed value.
    pub fn deserialize<T: DeserializeOwned>(self) -> Result<T, ApiClientError> {
        Ok(serde_json::from_value(self.into_value())?)
    }
}

/// Classifies `response` by status and unwraps its JSON payload.
///
/// On 200/201/202 a `{"objects": [...]}` envelope becomes a list, and a list
/// of exactly one item becomes that item unless `return_list` is set.
pub fn normalize(
    response: &RawResponse,
    return_list: bool,
) -> Result<NormalizedResponse, ApiClientError> {
    let status = response.status;
    let request_id = response.request_id();

    match status.as_u16() {
        200..=202 => {
            if response.body.iter().all(u8::is_ascii_whitespace) {
                return Ok(NormalizedResponse::Empty);
            }
            // Parsed into an owned tree, so the raw body stays untouched.
            let data: Value = serde_json::from_slice(&response.body)?;
            Ok(unwrap_envelope(data, return_list))
        }
        401 => Err(ApiClientError::Auth { status, request_id }),
        403 => Err(ApiClientError::Permission {
            status,
            body: response.text(),
            request_id,
        }),
        400..=499 => Err(ApiClientError::Client {
            status,
            body: response.text(),
            request_id,
        }),
        500..=599 => Err(ApiClientError::Server {
            status,
            body: response.text(),
            request_id,
        }),
        203..=299 => Ok(NormalizedResponse::Empty),
        _ => Err(ApiClientError::UnexpectedStatus {
            status,
            body: response.text(),
            request_id,
        }),
    }
}

fn unwrap_envelope(data: Value, return_list: bool) -> NormalizedResponse {
    let data = match data {
        Value::Object(mut map) => match map.remove(COLLECTION_KEY) {
            Some(Value::Array(mut items)) => {
                if items.len() == 1 && !return_list {
                    return NormalizedResponse::Single(items.remove(0));
                }
                return NormalizedResponse::List(items);
            }
            Some(other) => other,
            None => Value::Object(map),
        },
        other => other,
    };
    NormalizedResponse::Single(data)
}
