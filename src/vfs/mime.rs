//! Extension to MIME type table used by the VFS.

/// Fallback for unknown extensions.
pub const DEFAULT_MIME: &str = "application/octet-stream";

static TABLE: &[(&str, &str)] = &[
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("js", "application/javascript"),
    ("mjs", "application/javascript"),
    ("json", "application/json"),
    ("xml", "application/xml"),
    ("txt", "text/plain"),
    ("svg", "image/svg+xml"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("bmp", "image/bmp"),
    ("ico", "image/x-icon"),
    ("ttf", "font/ttf"),
    ("otf", "font/otf"),
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("wasm", "application/wasm"),
    ("mp3", "audio/mpeg"),
    ("ogg", "audio/ogg"),
    ("wav", "audio/wav"),
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
];

/// MIME type for `path`, based only on its extension (case-insensitive).
pub fn mime_for(path: &str) -> &'static str {
    let name = path.rsplit('/').next().unwrap_or(path);
    let Some((_, ext)) = name.rsplit_once('.') else {
        return DEFAULT_MIME;
    };
    TABLE
        .iter()
        .find(|(e, _)| e.eq_ignore_ascii_case(ext))
        .map(|(_, mime)| *mime)
        .unwrap_or(DEFAULT_MIME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_and_unknown_extensions() {
        assert_eq!(mime_for("ui/index.html"), "text/html");
        assert_eq!(mime_for("ui/STYLE.CSS"), "text/css");
        assert_eq!(mime_for("app.js"), "application/javascript");
        assert_eq!(mime_for("img/logo.png"), "image/png");
        assert_eq!(mime_for("data.bin"), DEFAULT_MIME);
        assert_eq!(mime_for("Makefile"), DEFAULT_MIME);
        assert_eq!(mime_for("dir.d/noext"), DEFAULT_MIME);
    }
}
