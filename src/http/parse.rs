//! Incremental request-line and header parsing.
//!
//! Grounded on `_http_server.c`'s `GetRequestState` coroutine: method, then
//! URI, then version, then headers one at a time, each bounded by the
//! matching `MAX_*` constant. This reads one byte at a time off
//! [`StreamBuffer`] rather than handing a whole buffer to `httparse` —
//! `httparse` needs the complete head in memory before it can run, which
//! doesn't fit a design where the head may arrive a few bytes per `read(2)`
//! and the coroutine must yield back to the reactor in between.

use crate::config::{
    MAX_HEADER_NAME_SIZE, MAX_HEADER_VALUE_SIZE, MAX_LINE_SIZE, MAX_METHOD_SIZE, MAX_NUM_HEADERS,
    MAX_URI_SIZE, MAX_VERSION_SIZE,
};
use crate::error::{Error, Parse};
use crate::io::{RawIo, StreamBuffer};
use crate::Result;

use super::types::{HTTPRequestHeaders, HeaderNameBuf, HeaderPair, HeaderValueBuf};

fn too_long(kind: Parse) -> impl FnOnce(Error) -> Error {
    move |err| if err.is_exhausted() { Error::new_parse(kind) } else { err }
}

async fn expect_byte<S: RawIo>(stream: &mut StreamBuffer<S>, expected: u8, kind: Parse) -> Result<()> {
    let got = stream.getc().await?;
    if got != expected {
        return Err(Error::new_parse(kind));
    }
    Ok(())
}

/// Returns the parsed version and the number of bytes it took on the wire
/// (the token plus its terminating CRLF), so the caller can fold it into
/// the request line's cumulative length check.
async fn read_version<S: RawIo>(stream: &mut StreamBuffer<S>) -> Result<(http::Version, usize)> {
    let bytes = stream
        .read_while(MAX_VERSION_SIZE, |b| b != b'\r')
        .await
        .map_err(too_long(Parse::Version))?;
    expect_byte(stream, b'\r', Parse::Version).await?;
    expect_byte(stream, b'\n', Parse::Version).await?;

    let len = bytes.len() + 2;
    match bytes.as_slice() {
        b"HTTP/1.0" => Ok((http::Version::HTTP_10, len)),
        b"HTTP/1.1" => Ok((http::Version::HTTP_11, len)),
        _ => Err(Error::new_parse(Parse::Version)),
    }
}

async fn read_header_line<S: RawIo>(
    stream: &mut StreamBuffer<S>,
) -> Result<Option<HeaderPair>> {
    if stream.peek().await? == b'\r' {
        stream.getc().await?;
        expect_byte(stream, b'\n', Parse::Header).await?;
        return Ok(None);
    }

    let name_bytes = stream
        .read_while(MAX_HEADER_NAME_SIZE, |b| b != b':')
        .await
        .map_err(too_long(Parse::HeaderTooLong))?;
    expect_byte(stream, b':', Parse::Header).await?;

    // skip optional whitespace (OWS) after the colon
    loop {
        let b = stream.peek().await?;
        if b == b' ' || b == b'\t' {
            stream.getc().await?;
        } else {
            break;
        }
    }

    let value_bytes = stream
        .read_while(MAX_HEADER_VALUE_SIZE, |b| b != b'\r')
        .await
        .map_err(too_long(Parse::HeaderTooLong))?;
    expect_byte(stream, b'\r', Parse::Header).await?;
    expect_byte(stream, b'\n', Parse::Header).await?;

    let name = std::str::from_utf8(&name_bytes).map_err(|_| Error::new_parse(Parse::Header))?;
    let value = std::str::from_utf8(&value_bytes).map_err(|_| Error::new_parse(Parse::Header))?;

    Ok(Some(HeaderPair {
        name: HeaderNameBuf::from(name),
        value: HeaderValueBuf::from(value),
    }))
}

/// Parses one request line plus headers off `stream`.
///
/// `max_headers` lets a [`ServerConfig`](crate::config::ServerConfig) lower
/// (never raise) the default [`MAX_NUM_HEADERS`](crate::config::MAX_NUM_HEADERS).
pub async fn read_headers<S: RawIo>(
    stream: &mut StreamBuffer<S>,
    max_headers: usize,
) -> Result<HTTPRequestHeaders> {
    let method_bytes = stream
        .read_while(MAX_METHOD_SIZE, |b| b != b' ')
        .await
        .map_err(too_long(Parse::Method))?;
    if method_bytes.is_empty() {
        return Err(Error::new_parse(Parse::Method));
    }
    expect_byte(stream, b' ', Parse::Method).await?;
    let method = std::str::from_utf8(&method_bytes).map_err(|_| Error::new_parse(Parse::Method))?;

    let uri_bytes = stream
        .read_while(MAX_URI_SIZE, |b| b != b' ')
        .await
        .map_err(too_long(Parse::Uri))?;
    if uri_bytes.is_empty() {
        return Err(Error::new_parse(Parse::Uri));
    }
    expect_byte(stream, b' ', Parse::Uri).await?;
    let uri = std::str::from_utf8(&uri_bytes).map_err(|_| Error::new_parse(Parse::Uri))?;

    let (version, version_len) = read_version(stream).await?;

    let line_len = method_bytes.len() + 1 + uri_bytes.len() + 1 + version_len;
    if line_len > MAX_LINE_SIZE {
        return Err(Error::new_parse(Parse::LineTooLong));
    }

    let mut headers = HTTPRequestHeaders {
        method: method.into(),
        uri: uri.into(),
        version,
        headers: Default::default(),
    };

    loop {
        match read_header_line(stream).await? {
            None => break,
            Some(pair) => {
                if headers.headers.len() >= max_headers.min(MAX_NUM_HEADERS) {
                    return Err(Error::new_parse(Parse::TooManyHeaders));
                }
                headers.headers.push(pair);
            }
        }
    }

    Ok(headers)
}
