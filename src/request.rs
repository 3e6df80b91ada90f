//! Turning an incoming request into command arguments.
//!
//! The command sees the request as its argument list:
//!
//! ```text
//! <program> <method> <uri> [<header-name> <header-value>]...
//! ```
//!
//! The method and URI are passed exactly as received. Each distinct header
//! name contributes one pair, valued with the first value for that name;
//! further values of a repeated header are not forwarded. Header order is
//! whatever order the header map iterates in, which is not specified.

use std::ffi::OsString;

use http::request::Parts;

/// Builds `[method, uri, name, value, ...]` for one request.
///
/// The program path itself is not included; the process builder supplies it
/// as argument 0.
pub fn command_args(parts: &Parts) -> Vec<OsString> {
    let headers = &parts.headers;
    let mut args = Vec::with_capacity(2 + 2 * headers.keys_len());

    args.push(OsString::from(parts.method.as_str()));
    args.push(OsString::from(parts.uri.to_string()));

    for name in headers.keys() {
        // `keys` only yields names that are present, so `get` always hits.
        let Some(value) = headers.get(name) else { continue };
        args.push(OsString::from(name.as_str()));
        args.push(header_arg(value.as_bytes()));
    }

    args
}

/// Header values may carry arbitrary bytes; on Unix they reach the command
/// untouched.
#[cfg(unix)]
fn header_arg(value: &[u8]) -> OsString {
    use std::os::unix::ffi::OsStringExt;
    OsString::from_vec(value.to_vec())
}

#[cfg(not(unix))]
fn header_arg(value: &[u8]) -> OsString {
    OsString::from(String::from_utf8_lossy(value).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(req: http::Request<()>) -> Parts {
        req.into_parts().0
    }

    #[test]
    fn method_and_uri_come_first() {
        let p = parts(http::Request::get("/foo?x=1").body(()).unwrap());
        assert_eq!(command_args(&p), ["GET", "/foo?x=1"]);
    }

    #[test]
    fn uri_is_not_normalised() {
        let p = parts(
            http::Request::builder()
                .method("PURGE")
                .uri("/a/../b%20c?q=%2F&&x")
                .body(())
                .unwrap(),
        );
        assert_eq!(command_args(&p), ["PURGE", "/a/../b%20c?q=%2F&&x"]);
    }

    #[test]
    fn one_pair_per_header_name() {
        let p = parts(
            http::Request::post("/")
                .header("x-one", "1")
                .header("x-two", "2")
                .header("x-two", "second")
                .header("accept", "*/*")
                .body(())
                .unwrap(),
        );
        let args = command_args(&p);
        assert_eq!(args.len(), 2 + 2 * 3);

        let pairs: Vec<(OsString, OsString)> = args[2..]
            .chunks(2)
            .map(|c| (c[0].clone(), c[1].clone()))
            .collect();
        assert!(pairs.contains(&("x-one".into(), "1".into())));
        assert!(pairs.contains(&("x-two".into(), "2".into())));
        assert!(pairs.contains(&("accept".into(), "*/*".into())));
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_header_value_is_passed_through() {
        use std::os::unix::ffi::OsStrExt;

        let value = http::HeaderValue::from_bytes(b"caf\xe9").unwrap();
        let p = parts(http::Request::get("/").header("x-latin1", value).body(()).unwrap());
        let args = command_args(&p);
        assert_eq!(args[3].as_bytes(), b"caf\xe9");
    }
}
