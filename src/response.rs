//! The two responses shelld ever sends.
//!
//! Success is the command's output, byte for byte, with nothing added: no
//! content type, no framing. Failure is a one-line plain-text description of
//! what went wrong. The command's own output is never part of a failure.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderValue, X_CONTENT_TYPE_OPTIONS};
use http::StatusCode;
use http_body_util::Full;

use crate::error::CommandError;

/// The response body type used throughout the server.
pub type Body = Full<Bytes>;

/// `200 OK` carrying a copy of `output`.
///
/// The content length follows from the body; hyper writes it.
pub(crate) fn output(output: &[u8]) -> http::Response<Body> {
    let mut res = http::Response::new(Full::new(Bytes::copy_from_slice(output)));
    *res.status_mut() = StatusCode::OK;
    res
}

/// `500 Internal Server Error` with the error text as a plain-text line.
pub(crate) fn failure(err: &CommandError) -> http::Response<Body> {
    let mut res = http::Response::new(Full::new(Bytes::from(format!("{err}\n"))));
    *res.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;

    let headers = res.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn output_is_verbatim() {
        let res = output(b"\x00binary\r\n\xff");
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().get(CONTENT_TYPE).is_none());

        let body = res.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"\x00binary\r\n\xff");
    }

    #[tokio::test]
    async fn failure_is_a_single_text_line() {
        let res = failure(&CommandError::Cancelled);
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.headers()[CONTENT_TYPE], "text/plain; charset=utf-8");

        let body = res.into_body().collect().await.unwrap().to_bytes();
        let text = std::str::from_utf8(&body).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.ends_with('\n'));
        assert!(text.contains("cancelled"));
    }
}
