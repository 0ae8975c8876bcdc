//! Result-archive handling for the URL adapter: download the ZIP the
//! extraction service produced and pull out its Markdown entry.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::debug;
use zip::ZipArchive;

use crate::error::OcrError;

const DOWNLOAD_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(120);

/// Name of the aggregated Markdown entry inside a result archive.
const MARKDOWN_ENTRY: &str = "full.md";

/// Download `url` to `dest`.
pub async fn download_zip(
    http: &reqwest::Client,
    url: &str,
    dest: &Path,
) -> Result<(), OcrError> {
    let response = http
        .get(url)
        .timeout(DOWNLOAD_TIMEOUT)
        .send()
        .await
        .map_err(|e| OcrError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(OcrError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {status}"),
        });
    }

    let bytes = response.bytes().await.map_err(|e| OcrError::DownloadFailed {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    tokio::fs::write(dest, &bytes)
        .await
        .map_err(|e| OcrError::io(dest, e))?;
    debug!(url, bytes = bytes.len(), dest = %dest.display(), "downloaded result archive");
    Ok(())
}

/// Extract the contents of the `full.md` entry from the archive at
/// `zip_path`. The entry may live at any depth; it is matched by basename.
pub fn extract_markdown(zip_path: &Path) -> Result<String, OcrError> {
    let file = File::open(zip_path).map_err(|e| OcrError::io(zip_path, e))?;
    let mut archive = ZipArchive::new(file)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let is_markdown = Path::new(entry.name())
            .file_name()
            .is_some_and(|n| n == MARKDOWN_ENTRY);
        if !is_markdown {
            continue;
        }
        let mut content = String::new();
        entry
            .read_to_string(&mut content)
            .map_err(|e| OcrError::io(zip_path, e))?;
        return Ok(content);
    }

    Err(OcrError::MissingArchiveEntry {
        name: MARKDOWN_ENTRY.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut writer = ZipWriter::new(file);
        for (name, content) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn extracts_markdown_entry_by_basename() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("result.zip");
        write_zip(
            &zip_path,
            &[
                ("layout.json", "{}"),
                ("images/figure1.png", "png-bytes"),
                ("task-abc/full.md", "# Extracted\n\ncontent\n"),
            ],
        );

        let md = extract_markdown(&zip_path).unwrap();
        assert_eq!(md, "# Extracted\n\ncontent\n");
    }

    #[test]
    fn missing_entry_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("empty.zip");
        write_zip(&zip_path, &[("layout.json", "{}")]);

        let err = extract_markdown(&zip_path).unwrap_err();
        assert!(matches!(err, OcrError::MissingArchiveEntry { .. }));
    }

    #[test]
    fn garbage_file_is_an_archive_error() {
        let dir = tempfile::tempdir().unwrap();
        let not_zip = dir.path().join("not.zip");
        std::fs::write(&not_zip, b"definitely not a zip").unwrap();

        let err = extract_markdown(&not_zip).unwrap_err();
        assert!(matches!(err, OcrError::Archive(_)));
    }
}
