//! Magic-byte file type detection over the first slice of an upload.

const SNIFF_WINDOW: usize = 12_000;
const SVG_WINDOW: usize = 100;

/// `(mime, category, subtype)`.
pub type FileType = (String, String, String);

/// Examines up to the first [`SNIFF_WINDOW`] bytes of `head` against a
/// magic-byte table. Falls back to `content_type_hint`, then to an
/// extension guessed from `filename`, then to `application/octet-stream`.
pub fn detect(head: &[u8], content_type_hint: Option<&str>, filename: &str) -> FileType {
    let window = &head[..head.len().min(SNIFF_WINDOW)];
    if let Some(found) = by_magic(window) {
        return found;
    }
    if let Some(hint) = content_type_hint {
        if let Some(found) = by_mime(hint) {
            return found;
        }
    }
    if let Some(found) = by_extension(filename) {
        return found;
    }
    owned("application/octet-stream", "application", "octet-stream")
}

fn owned(mime: &str, category: &str, subtype: &str) -> FileType {
    (mime.to_string(), category.to_string(), subtype.to_string())
}

fn by_magic(window: &[u8]) -> Option<FileType> {
    if window.starts_with(b"%PDF") {
        return Some(owned("application/pdf", "application", "pdf"));
    }
    if window.starts_with(b"\x89PNG\r\n\x1a\n") {
        return Some(owned("image/png", "image", "png"));
    }
    if window.starts_with(b"\xff\xd8\xff") {
        return Some(owned("image/jpeg", "image", "jpeg"));
    }
    if window.starts_with(b"GIF87a") || window.starts_with(b"GIF89a") {
        return Some(owned("image/gif", "image", "gif"));
    }
    if window.starts_with(b"BM") {
        return Some(owned("image/bmp", "image", "bmp"));
    }
    if window.starts_with(b"II*\x00") || window.starts_with(b"MM\x00*") {
        return Some(owned("image/tiff", "image", "tiff"));
    }
    if window.starts_with(&[0x00, 0x00, 0x01, 0x00]) {
        return Some(owned("image/x-icon", "image", "x-icon"));
    }
    if window.len() >= 12 && window.starts_with(b"RIFF") && &window[8..12] == b"WEBP" {
        return Some(owned("image/webp", "image", "webp"));
    }
    if looks_like_svg(&window[..window.len().min(SVG_WINDOW)]) {
        return Some(owned("image/svg+xml", "image", "svg+xml"));
    }
    // Proprietary engine-calibration container formats this store also
    // carries: neither has a public registered MIME type.
    if window.starts_with(b"ECU1") {
        return Some(owned(
            "application/x-ecu-calibration",
            "application",
            "x-ecu-calibration",
        ));
    }
    if window.starts_with(b"\x45\x43\x55\x32") {
        return Some(owned("application/x-ecu-flash", "application", "x-ecu-flash"));
    }
    if window.starts_with(b"PK\x03\x04") || window.starts_with(b"PK\x05\x06") {
        return Some(owned("application/zip", "application", "zip"));
    }
    None
}

fn looks_like_svg(window: &[u8]) -> bool {
    let text = String::from_utf8_lossy(window);
    let trimmed = text.trim_start();
    trimmed.starts_with("<svg") || trimmed.starts_with("<?xml")
}

fn by_mime(hint: &str) -> Option<FileType> {
    let (category, subtype) = hint.split_once('/')?;
    Some(owned(hint, category, subtype))
}

fn by_extension(filename: &str) -> Option<FileType> {
    let ext = filename.rsplit_once('.')?.1.to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Some(owned("application/pdf", "application", "pdf")),
        "png" => Some(owned("image/png", "image", "png")),
        "jpg" | "jpeg" => Some(owned("image/jpeg", "image", "jpeg")),
        "gif" => Some(owned("image/gif", "image", "gif")),
        "bmp" => Some(owned("image/bmp", "image", "bmp")),
        "tif" | "tiff" => Some(owned("image/tiff", "image", "tiff")),
        "ico" => Some(owned("image/x-icon", "image", "x-icon")),
        "webp" => Some(owned("image/webp", "image", "webp")),
        "svg" => Some(owned("image/svg+xml", "image", "svg+xml")),
        "zip" => Some(owned("application/zip", "application", "zip")),
        "txt" => Some(owned("text/plain", "text", "plain")),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_png_by_magic() {
        let mut head = vec![0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];
        head.extend_from_slice(b"rest of file");
        assert_eq!(detect(&head, None, "upload.bin").0, "image/png");
    }

    #[test]
    fn detects_webp_requires_riff_and_webp_tag() {
        let mut head = b"RIFF".to_vec();
        head.extend_from_slice(&[0, 0, 0, 0]);
        head.extend_from_slice(b"WEBP");
        assert_eq!(detect(&head, None, "upload.bin").0, "image/webp");

        let mut not_webp = b"RIFF".to_vec();
        not_webp.extend_from_slice(&[0, 0, 0, 0]);
        not_webp.extend_from_slice(b"AVI ");
        assert_ne!(detect(&not_webp, None, "upload.bin").0, "image/webp");
    }

    #[test]
    fn detects_svg_by_leading_text() {
        let head = b"<svg xmlns=\"http://www.w3.org/2000/svg\"></svg>";
        assert_eq!(detect(head, None, "upload.bin").0, "image/svg+xml");
    }

    #[test]
    fn falls_back_to_content_type_hint() {
        let head = b"not a known magic at all";
        assert_eq!(detect(head, Some("audio/mpeg"), "upload.bin").0, "audio/mpeg");
    }

    #[test]
    fn falls_back_to_extension_then_octet_stream() {
        let head = b"plain bytes";
        assert_eq!(detect(head, None, "notes.txt").0, "text/plain");
        assert_eq!(detect(head, None, "noext").0, "application/octet-stream");
    }
}
