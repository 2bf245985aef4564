use crate::Error;

/// Joins `base_path` and `identifier` with exactly one slash.
pub fn build_location(base_path: &str, identifier: &str) -> String {
    let base = if base_path == "/" { base_path } else { base_path.trim_end_matches('/') };
    if base.ends_with('/') {
        format!("{}{}", base, identifier)
    } else {
        format!("{}/{}", base, identifier)
    }
}

/// Identifier addressed by a path relative to the base path.
pub fn extract_identifier(request_path: &str) -> Result<&str, Error> {
    let identifier = request_path.strip_prefix('/').unwrap_or(request_path);
    if identifier.is_empty() {
        return Err(Error::NotFound);
    }
    Ok(identifier)
}

/// Strips the configured base path from an inbound request path. Paths
/// outside the base path come back unchanged.
pub fn relative_path<'p>(base_path: &str, request_path: &'p str) -> &'p str {
    let base = base_path.trim_end_matches('/');
    if base.is_empty() {
        return request_path;
    }
    match request_path.strip_prefix(base) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => request_path,
    }
}
