//! File naming helpers: URL file names, path-safety checks and content types.

/// Fallback name when a URL has no usable path segment.
const FALLBACK_FILE_NAME: &str = "download";

/// Content type used when the extension is unknown.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Extension → content type for the files the tools read and write.
const CONTENT_TYPES: &[(&str, &str)] = &[
    ("usdz", "model/vnd.usdz+zip"),
    ("usd", "model/vnd.usd"),
    ("usda", "model/vnd.usda"),
    ("usdc", "model/vnd.usdc"),
    ("obj", "model/obj"),
    ("mtl", "model/mtl"),
    ("glb", "model/gltf-binary"),
    ("gltf", "model/gltf+json"),
    ("stl", "model/stl"),
    ("ply", "application/x-ply"),
    ("fbx", "application/octet-stream"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("heic", "image/heic"),
    ("json", "application/json"),
    ("txt", "text/plain"),
];

/// Extract a filename from a URL by taking the last path segment.
///
/// Strips query parameters and fragments. Falls back to `"download"` if
/// no meaningful segment is found.
pub fn file_name_from_url(url: &str) -> String {
    let clean = url.split(['?', '#']).next().unwrap_or(url);

    let path = match clean
        .strip_prefix("https://")
        .or_else(|| clean.strip_prefix("http://"))
    {
        Some(rest) => rest.find('/').map(|i| &rest[i..]).unwrap_or(""),
        None => clean,
    };

    path.rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or(FALLBACK_FILE_NAME)
        .to_string()
}

/// A name is safe to join onto a staging directory when it is a single
/// path component that cannot climb out of it.
pub fn is_safe_file_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 255
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

/// Content type derived from a file name's extension.
pub fn content_type_for(file_name: &str) -> &'static str {
    let Some((_, ext)) = file_name.rsplit_once('.') else {
        return OCTET_STREAM;
    };
    let ext = ext.to_ascii_lowercase();
    CONTENT_TYPES
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, ct)| *ct)
        .unwrap_or(OCTET_STREAM)
}
