//! UDisks2 byte-string properties are NUL terminated `ay` values.

pub fn decode_c_string_bytes(bytes: &[u8]) -> String {
    let raw = match bytes.split(|b| *b == 0).next() {
        Some(v) => v,
        None => bytes,
    };

    String::from_utf8_lossy(raw).to_string()
}

pub fn decode_mount_points(mount_points: Vec<Vec<u8>>) -> Vec<String> {
    mount_points
        .into_iter()
        .filter_map(|mp| {
            let decoded = decode_c_string_bytes(&mp);
            if decoded.is_empty() {
                None
            } else {
                Some(decoded)
            }
        })
        .collect()
}

/// First non-empty mount point, or an empty string when unmounted.
pub fn first_mount_point(mount_points: Vec<Vec<u8>>) -> String {
    decode_mount_points(mount_points)
        .into_iter()
        .next()
        .unwrap_or_default()
}
