//! Relative identifier resolution: pure string composition, no filesystem.
//!
//! Reproduces POSIX-style relative path math against a base *location*
//! (the defining unit's canonical location, not a directory): the base's
//! trailing segment is dropped first, then the id's segments are walked.

/// True when the id's first segment is `.` or `..`.
///
/// The marker is the whole segment: an id like `.hidden` is opaque and
/// passes through unchanged.
pub fn is_relative(id: &str) -> bool {
    matches!(id.split('/').next(), Some(".") | Some(".."))
}

/// Resolve `id` against the location `base`.
///
/// Non-relative ids are returned unchanged (already absolute or opaque,
/// e.g. a bare package-style name). Otherwise the base is split into an
/// optional `scheme://authority/` prefix plus path segments, its trailing
/// segment is dropped (directory-of-location rule), and the id's segments
/// are walked: `.` is a no-op, `..` pops one segment, anything else is
/// appended.
pub fn resolve_relative(base: &str, id: &str) -> String {
    if !is_relative(id) {
        return id.to_string();
    }

    let (prefix, path) = split_authority(base);

    // A trailing `/` yields an empty trailing segment, so the same pop is
    // correct for both file-ish and dir-ish bases.
    let mut segments: Vec<&str> = path.split('/').collect();
    segments.pop();

    for segment in id.split('/').filter(|s| !s.is_empty()) {
        match segment {
            "." => {}
            ".." => {
                // Popping past the start is a no-op.
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    format!("{prefix}{}", segments.join("/"))
}

/// Split off a `scheme://authority/` prefix (including the third slash)
/// when present. The remainder is the path part.
fn split_authority(base: &str) -> (String, &str) {
    let Some(scheme_end) = base.find("://") else {
        return (String::new(), base);
    };
    let after_scheme = scheme_end + 3;
    match base[after_scheme..].find('/') {
        Some(slash) => {
            let cut = after_scheme + slash + 1;
            (base[..cut].to_string(), &base[cut..])
        }
        // Authority with no path at all.
        None => (format!("{base}/"), ""),
    }
}
