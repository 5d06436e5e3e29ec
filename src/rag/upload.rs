use std::io::Write;
use tempfile::NamedTempFile;

use crate::error::ChatError;

/// Writes uploaded bytes to a fresh `.pdf` temp file. The file is removed
/// when the returned handle is dropped, whatever happens to its contents.
pub fn write_temp_upload(bytes: &[u8]) -> Result<NamedTempFile, ChatError> {
    let mut file = tempfile::Builder::new().prefix("upload-").suffix(".pdf").tempfile()?;
    file.write_all(bytes)?;
    file.flush()?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_upload_holds_bytes_until_dropped() {
        let file = write_temp_upload(b"%PDF-1.4").unwrap();
        let path = file.path().to_path_buf();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("pdf"));
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.4");

        drop(file);
        assert!(!path.exists());
    }
}
