//! Shared helpers for adapter-layer validation.

/// Longest hostname accepted by the ESP-IDF netif layer.
pub const MAX_HOSTNAME_LEN: usize = 24;

/// Returns `true` if every byte of `s` is in the printable ASCII range
/// `0x20..=0x7E` (space through tilde, inclusive).
///
/// Used to validate SSIDs before they are handed to the WiFi driver.
pub fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

/// Reduce `raw` to an RFC 952 hostname: ASCII letters, digits and `-`,
/// at most [`MAX_HOSTNAME_LEN`] characters, no leading or trailing `-`.
///
/// Anything else is dropped.  May return an empty string.
pub fn sanitize_hostname(raw: &str) -> heapless::String<MAX_HOSTNAME_LEN> {
    let mut out = heapless::String::new();
    for c in raw.chars() {
        let keep = c.is_ascii_alphanumeric() || (c == '-' && !out.is_empty());
        if keep && out.push(c).is_err() {
            break;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Decode one `application/x-www-form-urlencoded` component: `+` is a
/// space, `%XX` a byte.  Malformed escapes are kept literally; invalid
/// UTF-8 is replaced.
pub fn url_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' => {
                let hex = bytes
                    .get(i + 1..i + 3)
                    .filter(|h| h.iter().all(u8::is_ascii_hexdigit))
                    .and_then(|h| core::str::from_utf8(h).ok())
                    .and_then(|h| u8::from_str_radix(h, 16).ok());
                if let Some(b) = hex {
                    out.push(b);
                    i += 2;
                } else {
                    out.push(b'%');
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Pull the portal's `key` and `value` parameters out of a query string.
/// Missing parameters are empty, which together mean "send the form".
pub fn exchange_params(query: &str) -> (String, String) {
    let mut key = String::new();
    let mut value = String::new();
    for pair in query.split('&') {
        let (name, raw) = pair.split_once('=').unwrap_or((pair, ""));
        match name {
            "key" => key = url_decode(raw),
            "value" => value = url_decode(raw),
            _ => {}
        }
    }
    (key, value)
}
