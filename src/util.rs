//! Small helpers shared by the fetch, inline and serialize stages

use base64::Engine as Base64Engine;

const WOFF: &str = "application/font-woff";
const JPEG: &str = "image/jpeg";

/// Whether `url` is already an embedded data reference
pub fn is_data_url(url: &str) -> bool {
    url.starts_with("data:")
}

/// Lowercased file extension of the URL path, ignoring query and fragment
pub fn parse_extension(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let file = path.rsplit('/').next().unwrap_or_default();
    match file.rfind('.') {
        Some(idx) => file[idx + 1..].to_ascii_lowercase(),
        None => String::new(),
    }
}

/// MIME type guessed from the URL's extension; unknown extensions give ""
pub fn mime_type(url: &str) -> &'static str {
    match parse_extension(url).as_str() {
        "woff" => WOFF,
        "woff2" => "application/font-woff2",
        "ttf" => "application/font-truetype",
        "eot" => "application/vnd.ms-fontobject",
        "png" => "image/png",
        "jpg" | "jpeg" => JPEG,
        "gif" => "image/gif",
        "tiff" => "image/tiff",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        _ => "",
    }
}

/// Build a `data:<mime>;base64,<payload>` URI
pub fn data_as_url(payload: &str, mime: &str) -> String {
    format!("data:{};base64,{}", mime, payload)
}

/// Payload part of a data URI (everything after the first comma)
pub fn data_url_payload(data_url: &str) -> Option<&str> {
    if !is_data_url(data_url) {
        return None;
    }
    data_url.split_once(',').map(|(_, payload)| payload)
}

/// Decode the payload of a base64 data URI into bytes
pub fn decode_data_url(data_url: &str) -> Option<Vec<u8>> {
    let (header, payload) = data_url.strip_prefix("data:")?.split_once(',')?;
    if !header.ends_with(";base64") {
        return Some(payload.as_bytes().to_vec());
    }
    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .ok()
}

/// MIME type declared in a data URI header
pub fn data_url_mime(data_url: &str) -> Option<&str> {
    let header = data_url.strip_prefix("data:")?.split(',').next()?;
    header.split(';').next()
}

/// Base64 (standard alphabet, padded) encoding of a response body
pub fn encode_payload(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Resolve `url` against `base` when the base is known and parseable
pub fn resolve_url(url: &str, base: Option<&str>) -> String {
    match base.and_then(|b| url::Url::parse(b).ok()) {
        Some(base) => base
            .join(url)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| url.to_string()),
        None => url.to_string(),
    }
}

/// Escape characters that terminate or corrupt an unencoded SVG data URI
pub fn escape_xhtml(xhtml: &str) -> String {
    xhtml.replace('#', "%23").replace('\n', "%0A")
}

/// Numeric pixel value of a resolved length such as `12px`; anything else is 0
pub fn px_value(value: &str) -> f64 {
    let v = value.trim();
    let v = v.strip_suffix("px").unwrap_or(v).trim();
    v.parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .unwrap_or(0.0)
}
