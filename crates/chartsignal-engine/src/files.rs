use std::path::Path;

use anyhow::{Context, Result};

use chartsignal_contracts::errors::ChartError;
use chartsignal_contracts::upload::{ChartFile, MAX_UPLOAD_BYTES, TOO_LARGE_MESSAGE};

/// Reads a file the way a browser picker hands it over: name, declared media type, bytes.
///
/// The media type comes from the extension, then from the leading bytes, then falls back
/// to `application/octet-stream`. Files over the upload limit are refused before any
/// bytes are read; the rest of validation is left to the upload controller.
pub fn load_chart_file(path: &Path) -> Result<ChartFile> {
    let size = std::fs::metadata(path)
        .with_context(|| format!("failed reading {}", path.display()))?
        .len();
    if size > MAX_UPLOAD_BYTES as u64 {
        return Err(ChartError::Validation(TOO_LARGE_MESSAGE.to_string()).into());
    }
    let bytes = std::fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    let media_type = media_type_for(path, &bytes);
    Ok(ChartFile::new(name, media_type, bytes))
}

pub fn media_type_for(path: &Path, bytes: &[u8]) -> String {
    let by_extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .and_then(|ext| match ext.as_str() {
            "png" => Some("image/png"),
            "jpg" | "jpeg" => Some("image/jpeg"),
            "webp" => Some("image/webp"),
            "gif" => Some("image/gif"),
            "txt" | "md" => Some("text/plain"),
            "json" => Some("application/json"),
            "pdf" => Some("application/pdf"),
            _ => None,
        });
    if let Some(media_type) = by_extension {
        return media_type.to_string();
    }
    image::guess_format(bytes)
        .ok()
        .map(|format| format.to_mime_type())
        .unwrap_or("application/octet-stream")
        .to_string()
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use chartsignal_contracts::errors::ChartError;
    use chartsignal_contracts::upload::{MAX_UPLOAD_BYTES, TOO_LARGE_MESSAGE};

    use super::{load_chart_file, media_type_for};

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    #[test]
    fn extension_decides_media_type() {
        assert_eq!(media_type_for(Path::new("a.PNG"), b""), "image/png");
        assert_eq!(media_type_for(Path::new("a.jpeg"), b""), "image/jpeg");
        assert_eq!(media_type_for(Path::new("notes.txt"), PNG_MAGIC), "text/plain");
    }

    #[test]
    fn unknown_extension_falls_back_to_sniffing() {
        assert_eq!(media_type_for(Path::new("chart.bin"), PNG_MAGIC), "image/png");
        assert_eq!(
            media_type_for(Path::new("blob"), b"not an image"),
            "application/octet-stream"
        );
    }

    #[test]
    fn load_reads_name_and_bytes() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("btc-1h.png");
        fs::write(&path, PNG_MAGIC)?;
        let file = load_chart_file(&path)?;
        assert_eq!(file.name, "btc-1h.png");
        assert_eq!(file.media_type, "image/png");
        assert_eq!(file.size(), PNG_MAGIC.len());
        Ok(())
    }

    #[test]
    fn oversized_file_is_refused_from_its_metadata() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("huge.png");
        fs::File::create(&path)?.set_len(MAX_UPLOAD_BYTES as u64 + 1)?;
        let err = load_chart_file(&path)
            .err()
            .and_then(|err| err.downcast::<ChartError>().ok());
        assert_eq!(err, Some(ChartError::Validation(TOO_LARGE_MESSAGE.to_string())));

        fs::File::create(&path)?.set_len(MAX_UPLOAD_BYTES as u64)?;
        assert_eq!(load_chart_file(&path)?.size(), MAX_UPLOAD_BYTES);
        Ok(())
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = load_chart_file(Path::new("/definitely/missing.png"))
            .err()
            .map(|err| err.to_string())
            .unwrap_or_default();
        assert!(err.contains("/definitely/missing.png"));
    }
}
