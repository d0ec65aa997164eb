//! Minimal `multipart/form-data` parsing for the upload form.

use anyhow::{anyhow, Result};

#[derive(Clone, Debug, PartialEq)]
pub struct Part {
    pub name: String,
    pub file_name: Option<String>,
    pub data: Vec<u8>,
}

/// Extract the boundary parameter from a `Content-Type` header value.
pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    let mut params = content_type.split(';');
    let mime = params.next()?.trim();
    if !mime.eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }
    params
        .filter_map(|param| param.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

pub fn parse_multipart(body: &[u8], boundary: &str) -> Result<Vec<Part>> {
    let delimiter = format!("--{}", boundary);
    let delimiter = delimiter.as_bytes();
    let mut closing = b"\r\n".to_vec();
    closing.extend_from_slice(delimiter);

    let mut pos = find(body, delimiter, 0).ok_or_else(|| anyhow!("multipart boundary not found"))?
        + delimiter.len();
    let mut parts = Vec::new();
    loop {
        if body[pos..].starts_with(b"--") {
            break;
        }
        if !body[pos..].starts_with(b"\r\n") {
            return Err(anyhow!("malformed multipart delimiter"));
        }
        pos += 2;

        let header_end =
            find(body, b"\r\n\r\n", pos).ok_or_else(|| anyhow!("unterminated part headers"))?;
        let headers = String::from_utf8_lossy(&body[pos..header_end]);
        let data_start = header_end + 4;
        let data_end = find(body, &closing, data_start)
            .ok_or_else(|| anyhow!("unterminated multipart part"))?;

        parts.push(build_part(&headers, body[data_start..data_end].to_vec())?);
        pos = data_end + closing.len();
    }
    Ok(parts)
}

fn build_part(headers: &str, data: Vec<u8>) -> Result<Part> {
    let mut name = None;
    let mut file_name = None;
    for line in headers.split("\r\n") {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        if key.trim().eq_ignore_ascii_case("content-disposition") {
            for param in value.split(';').skip(1) {
                if let Some((k, v)) = param.split_once('=') {
                    let v = v.trim().trim_matches('"').to_string();
                    match k.trim().to_ascii_lowercase().as_str() {
                        "name" => name = Some(v),
                        "filename" => file_name = Some(v),
                        _ => {}
                    }
                }
            }
        }
    }
    Ok(Part {
        name: name.ok_or_else(|| anyhow!("multipart part without a name"))?,
        file_name: file_name.filter(|f| !f.is_empty()),
        data,
    })
}

pub(crate) fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|idx| idx + from)
}
