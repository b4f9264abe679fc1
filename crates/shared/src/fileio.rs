//! File helpers: upload directories, content-type checks, base64 and thumbnails.

use std::fs::{DirBuilder, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine};
use image::{imageops::FilterType, DynamicImage};
use thiserror::Error;
use tracing::debug;

/// Edge length of generated thumbnails in pixels.
pub const THUMBNAIL_SIZE: u32 = 72;

/// Number of leading bytes inspected when sniffing a file's type.
const SNIFF_LEN: u64 = 3072;

const OCTET_STREAM: &str = "application/octet-stream";

#[cfg(unix)]
const DIRECTORY_MODE: u32 = 0o751;

/// Error type for file operations.
#[derive(Debug, Error)]
pub enum FileIoError {
    #[error("Could not create user directory")]
    CreateDirectory(#[source] io::Error),

    #[error("Unsupported document type")]
    UnsupportedDocument(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Creates `path` under the directory of the running executable.
///
/// Returns the full directory path. An existing directory is left untouched.
pub fn create_directory(path: impl AsRef<Path>) -> Result<PathBuf, FileIoError> {
    let exe = std::env::current_exe()?;
    let base = exe.parent().ok_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "executable has no parent directory")
    })?;
    create_directory_in(base, path)
}

/// Creates `path` under `base`, including missing parents.
pub fn create_directory_in(
    base: impl AsRef<Path>,
    path: impl AsRef<Path>,
) -> Result<PathBuf, FileIoError> {
    let dir = base.as_ref().join(path);
    if dir.is_dir() {
        return Ok(dir);
    }

    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(DIRECTORY_MODE);
    }
    builder.create(&dir).map_err(FileIoError::CreateDirectory)?;
    debug!(dir = %dir.display(), "created directory");

    Ok(dir)
}

/// Detects a file's MIME type from its contents.
///
/// The extension is consulted only when no known signature matches, and is
/// ignored if it names a type that has a signature: a `.png` without PNG magic
/// bytes is reported as `application/octet-stream`.
pub fn detect_content_type(path: impl AsRef<Path>) -> Result<String, FileIoError> {
    let path = path.as_ref();

    let mut head = Vec::with_capacity(SNIFF_LEN as usize);
    File::open(path)?.take(SNIFF_LEN).read_to_end(&mut head)?;

    if let Some(kind) = infer::get(&head) {
        return Ok(kind.mime_type().to_string());
    }
    if let Ok(format) = image::guess_format(&head) {
        return Ok(format.to_mime_type().to_string());
    }

    let guessed = mime_guess::from_path(path).first_or_octet_stream();
    if infer::is_mime_supported(guessed.essence_str()) {
        debug!(
            path = %path.display(),
            claimed = guessed.essence_str(),
            "extension does not match file contents"
        );
        return Ok(OCTET_STREAM.to_string());
    }

    Ok(guessed.essence_str().to_string())
}

/// Returns the file's MIME type if it is one of `allowed`.
pub fn is_document_allowed<S: AsRef<str>>(
    path: impl AsRef<Path>,
    allowed: &[S],
) -> Result<String, FileIoError> {
    let content_type = detect_content_type(path)?;

    if !allowed.iter().any(|a| a.as_ref() == content_type) {
        return Err(FileIoError::UnsupportedDocument(content_type));
    }

    Ok(content_type)
}

/// Standard base64 encoding with padding.
pub fn to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Resizes an image to a 72x72 thumbnail, ignoring aspect ratio.
pub fn thumbnail(img: &DynamicImage) -> DynamicImage {
    img.resize_exact(THUMBNAIL_SIZE, THUMBNAIL_SIZE, FilterType::Lanczos3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, ImageFormat};
    use std::fs;
    use std::io::Cursor;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("shared-fileio-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut buffer = Vec::new();
        DynamicImage::new_rgb8(width, height)
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    #[test]
    fn test_create_directory_in() {
        let base = scratch_dir();

        let dir = create_directory_in(&base, "users/42/docs").unwrap();
        assert!(dir.is_dir());
        assert_eq!(dir, base.join("users/42/docs"));

        // Second call is a no-op
        assert_eq!(create_directory_in(&base, "users/42/docs").unwrap(), dir);

        fs::remove_dir_all(base).unwrap();
    }

    #[test]
    fn test_create_directory_next_to_executable() {
        let name = format!("uploads-{}", uuid::Uuid::new_v4());
        let dir = create_directory(&name).unwrap();

        let exe_dir = std::env::current_exe().unwrap().parent().unwrap().to_path_buf();
        assert_eq!(dir, exe_dir.join(&name));
        assert!(dir.is_dir());

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_create_directory_over_file_fails() {
        let base = scratch_dir();
        fs::write(base.join("occupied"), b"x").unwrap();

        let result = create_directory_in(&base, "occupied/child");
        assert!(matches!(result, Err(FileIoError::CreateDirectory(_))));
        assert_eq!(
            result.unwrap_err().to_string(),
            "Could not create user directory"
        );

        fs::remove_dir_all(base).unwrap();
    }

    #[test]
    fn test_detect_image_by_content() {
        let base = scratch_dir();
        let path = base.join("upload.bin");
        fs::write(&path, png_bytes(4, 4)).unwrap();

        assert_eq!(detect_content_type(&path).unwrap(), "image/png");

        fs::remove_dir_all(base).unwrap();
    }

    #[test]
    fn test_detect_falls_back_to_extension() {
        let base = scratch_dir();
        let text = base.join("notes.txt");
        let unknown = base.join("blob.zzz");
        fs::write(&text, b"hello").unwrap();
        fs::write(&unknown, b"hello").unwrap();

        assert_eq!(detect_content_type(&text).unwrap(), "text/plain");
        assert_eq!(
            detect_content_type(&unknown).unwrap(),
            "application/octet-stream"
        );

        fs::remove_dir_all(base).unwrap();
    }

    #[test]
    fn test_detect_document_by_content() {
        let base = scratch_dir();
        let path = base.join("report");
        fs::write(&path, b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog >>\nendobj\n").unwrap();

        assert_eq!(detect_content_type(&path).unwrap(), "application/pdf");

        fs::remove_dir_all(base).unwrap();
    }

    #[test]
    fn test_detect_ignores_spoofed_extension() {
        let base = scratch_dir();
        let pdf = base.join("evil.png");
        let text = base.join("fake.jpg");
        fs::write(&pdf, b"%PDF-1.4\n<script>alert(1)</script>\n").unwrap();
        fs::write(&text, b"#!/bin/sh\necho hi\n").unwrap();

        assert_eq!(detect_content_type(&pdf).unwrap(), "application/pdf");
        assert_ne!(detect_content_type(&text).unwrap(), "image/jpeg");

        let allowed = ["image/png", "image/jpeg"];
        assert!(matches!(
            is_document_allowed(&pdf, &allowed),
            Err(FileIoError::UnsupportedDocument(ref t)) if t == "application/pdf"
        ));
        assert!(matches!(
            is_document_allowed(&text, &allowed),
            Err(FileIoError::UnsupportedDocument(_))
        ));

        fs::remove_dir_all(base).unwrap();
    }

    #[test]
    fn test_detect_empty_file_with_image_extension() {
        let base = scratch_dir();
        let path = base.join("empty.png");
        fs::write(&path, b"").unwrap();

        assert_eq!(detect_content_type(&path).unwrap(), "application/octet-stream");

        fs::remove_dir_all(base).unwrap();
    }

    #[test]
    fn test_is_document_allowed() {
        let base = scratch_dir();
        let png = base.join("avatar.png");
        let text = base.join("notes.txt");
        fs::write(&png, png_bytes(2, 2)).unwrap();
        fs::write(&text, b"hello").unwrap();

        let allowed = ["image/png", "image/jpeg"];
        assert_eq!(is_document_allowed(&png, &allowed).unwrap(), "image/png");

        let result = is_document_allowed(&text, &allowed);
        assert!(matches!(
            result,
            Err(FileIoError::UnsupportedDocument(ref t)) if t == "text/plain"
        ));

        fs::remove_dir_all(base).unwrap();
    }

    #[test]
    fn test_is_document_allowed_missing_file() {
        let result = is_document_allowed("/nonexistent/file.png", &["image/png"]);
        assert!(matches!(result, Err(FileIoError::Io(_))));
    }

    #[test]
    fn test_to_base64() {
        assert_eq!(to_base64(b"hello"), "aGVsbG8=");
        assert_eq!(to_base64(b""), "");
    }

    #[test]
    fn test_thumbnail() {
        let img = DynamicImage::new_rgb8(300, 120);
        let thumb = thumbnail(&img);
        assert_eq!(thumb.dimensions(), (THUMBNAIL_SIZE, THUMBNAIL_SIZE));
    }
}
