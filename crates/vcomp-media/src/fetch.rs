//! Source resolution.
//!
//! A source reference is one of:
//! - `data:<mime>;base64,<payload>`
//! - `http(s)://...` (fetched with a bounded timeout)
//! - anything else without a URL scheme is treated as raw base64
//!
//! Other schemes, `file://` included, are refused.
//!
//! Every failure maps to [`MediaError::SourceUnavailable`].

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use url::Url;

use crate::error::{MediaError, MediaResult};

/// Default remote fetch timeout.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 120;

/// Bytes inspected when sniffing a container type.
const SNIFF_LEN: usize = 16;

/// A parsed source reference.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaSource {
    Inline {
        mime: Option<String>,
        payload: String,
    },
    Remote(Url),
    RawBase64(String),
}

impl MediaSource {
    /// Classify a reference by its prefix.
    pub fn parse(reference: &str) -> MediaResult<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(MediaError::source_unavailable("empty source reference"));
        }

        if let Some(rest) = reference.strip_prefix("data:") {
            let (header, payload) = rest
                .split_once(',')
                .ok_or_else(|| MediaError::source_unavailable("data URI has no payload"))?;
            let mime = header
                .split(';')
                .next()
                .filter(|m| !m.is_empty())
                .map(str::to_string);
            return Ok(Self::Inline {
                mime,
                payload: payload.to_string(),
            });
        }

        if reference.starts_with("http://") || reference.starts_with("https://") {
            let url = Url::parse(reference)
                .map_err(|e| MediaError::source_unavailable(format!("invalid URL: {}", e)))?;
            return Ok(Self::Remote(url));
        }

        if let Some((scheme, _)) = reference.split_once("://") {
            return Err(MediaError::source_unavailable(format!(
                "unsupported source scheme {}://",
                scheme
            )));
        }

        Ok(Self::RawBase64(reference.to_string()))
    }

    /// Short description for logs; never includes inline payloads.
    pub fn describe(&self) -> String {
        match self {
            Self::Inline { mime, payload } => format!(
                "inline {} ({} chars)",
                mime.as_deref().unwrap_or("data"),
                payload.len()
            ),
            Self::Remote(url) => url.to_string(),
            Self::RawBase64(payload) => format!("base64 ({} chars)", payload.len()),
        }
    }

    /// Extension suggested by the reference itself.
    fn extension_hint(&self) -> Option<String> {
        match self {
            Self::Inline { mime: Some(mime), .. } => extension_for_mime(mime).map(str::to_string),
            Self::Remote(url) => Path::new(url.path())
                .extension()
                .and_then(|e| e.to_str())
                .filter(|e| e.len() <= 5 && e.chars().all(|c| c.is_ascii_alphanumeric()))
                .map(|e| e.to_ascii_lowercase()),
            _ => None,
        }
    }
}

/// Extension for a MIME type.
pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    match mime.trim().to_ascii_lowercase().as_str() {
        "image/png" => Some("png"),
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/bmp" => Some("bmp"),
        "video/mp4" => Some("mp4"),
        "video/webm" => Some("webm"),
        "video/quicktime" => Some("mov"),
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/wav" | "audio/x-wav" | "audio/wave" => Some("wav"),
        "audio/ogg" => Some("ogg"),
        "audio/aac" => Some("aac"),
        "audio/mp4" | "audio/x-m4a" => Some("m4a"),
        _ => None,
    }
}

/// Detect a file type from its leading bytes.
pub fn sniff_extension(head: &[u8]) -> Option<&'static str> {
    if head.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some("png")
    } else if head.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("jpg")
    } else if head.starts_with(b"GIF8") {
        Some("gif")
    } else if head.len() >= 12 && &head[0..4] == b"RIFF" && &head[8..12] == b"WEBP" {
        Some("webp")
    } else if head.len() >= 12 && &head[0..4] == b"RIFF" && &head[8..12] == b"WAVE" {
        Some("wav")
    } else if head.starts_with(b"BM") {
        Some("bmp")
    } else if head.len() >= 8 && &head[4..8] == b"ftyp" {
        Some("mp4")
    } else if head.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        Some("webm")
    } else if head.starts_with(b"OggS") {
        Some("ogg")
    } else if head.starts_with(b"ID3") || head.starts_with(&[0xFF, 0xFB]) {
        Some("mp3")
    } else {
        None
    }
}

/// Whether an extension names a still image format.
pub fn is_image_extension(ext: &str) -> bool {
    matches!(ext, "png" | "jpg" | "jpeg" | "webp" | "gif" | "bmp")
}

/// Resolves source references into local files.
#[derive(Debug, Clone)]
pub struct MediaFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl Default for MediaFetcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS))
    }
}

impl MediaFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    /// Fetch `reference` into `dest_stem` plus a detected extension.
    ///
    /// Returns the path of the written file.
    pub async fn fetch(&self, reference: &str, dest_stem: &Path) -> MediaResult<PathBuf> {
        let source = MediaSource::parse(reference)?;
        debug!(source = %source.describe(), "Fetching media source");

        let staging = dest_stem.with_extension("part");
        if let Some(parent) = staging.parent() {
            fs::create_dir_all(parent).await?;
        }

        let head = match &source {
            MediaSource::Inline { payload, .. } | MediaSource::RawBase64(payload) => {
                let bytes = decode_base64(payload)?;
                fs::write(&staging, &bytes).await?;
                bytes.iter().take(SNIFF_LEN).copied().collect()
            }
            MediaSource::Remote(url) => {
                match tokio::time::timeout(self.timeout, self.download(url, &staging)).await {
                    Ok(result) => result?,
                    Err(_) => {
                        let _ = fs::remove_file(&staging).await;
                        warn!(url = %url, "Fetch timed out after {:?}", self.timeout);
                        return Err(MediaError::source_unavailable(format!(
                            "fetch of {} timed out after {}s",
                            url,
                            self.timeout.as_secs()
                        )));
                    }
                }
            }
        };

        if head.is_empty() {
            let _ = fs::remove_file(&staging).await;
            return Err(MediaError::source_unavailable(format!(
                "{} is empty",
                source.describe()
            )));
        }

        let ext = sniff_extension(&head)
            .map(str::to_string)
            .or_else(|| source.extension_hint())
            .unwrap_or_else(|| "bin".to_string());
        let dest = dest_stem.with_extension(ext);
        fs::rename(&staging, &dest).await?;
        Ok(dest)
    }

    /// Stream a remote body to disk, returning its first bytes.
    async fn download(&self, url: &Url, dest: &Path) -> MediaResult<Vec<u8>> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?;

        let mut stream = response.bytes_stream();
        let mut file = fs::File::create(dest).await?;
        let mut head = Vec::with_capacity(SNIFF_LEN);

        while let Some(chunk) = stream.next().await {
            let data = chunk?;
            if head.len() < SNIFF_LEN {
                let take = (SNIFF_LEN - head.len()).min(data.len());
                head.extend_from_slice(&data[..take]);
            }
            file.write_all(&data).await?;
        }
        file.flush().await?;
        Ok(head)
    }
}

fn decode_base64(payload: &str) -> MediaResult<Vec<u8>> {
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| MediaError::source_unavailable(format!("invalid base64 payload: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    #[test]
    fn test_parse_prefixes() {
        assert!(matches!(
            MediaSource::parse("data:image/png;base64,AAAA").unwrap(),
            MediaSource::Inline { mime: Some(ref m), .. } if m == "image/png"
        ));
        assert!(matches!(
            MediaSource::parse("https://cdn.example.com/a.mp4").unwrap(),
            MediaSource::Remote(_)
        ));
        assert!(matches!(
            MediaSource::parse("iVBORw0KGgo=").unwrap(),
            MediaSource::RawBase64(_)
        ));
        assert!(MediaSource::parse("   ").is_err());
        assert!(MediaSource::parse("data:image/png;base64").is_err());
    }

    #[test]
    fn test_parse_refuses_other_schemes() {
        for reference in ["file:///etc/passwd", "ftp://host/a.mp4", "s3://bucket/a.mp4"] {
            assert!(matches!(
                MediaSource::parse(reference),
                Err(MediaError::SourceUnavailable { .. })
            ));
        }
    }

    #[tokio::test]
    async fn test_host_files_are_not_fetched() {
        let dir = TempDir::new().unwrap();
        let secret = dir.path().join("secret.png");
        std::fs::write(&secret, PNG_HEADER).unwrap();
        let reference = format!("file://{}", secret.display());

        let fetcher = MediaFetcher::default();
        let err = fetcher
            .fetch(&reference, &dir.path().join("scene_0"))
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::SourceUnavailable { .. }));
        assert!(!dir.path().join("scene_0.png").exists());
        assert!(!dir.path().join("scene_0.part").exists());
    }

    #[test]
    fn test_sniff() {
        assert_eq!(sniff_extension(PNG_HEADER), Some("png"));
        assert_eq!(sniff_extension(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("jpg"));
        assert_eq!(sniff_extension(b"RIFF\0\0\0\0WEBPVP8 "), Some("webp"));
        assert_eq!(sniff_extension(b"\0\0\0\x18ftypmp42"), Some("mp4"));
        assert_eq!(sniff_extension(b"hello"), None);
        assert!(is_image_extension("webp"));
        assert!(!is_image_extension("mp4"));
    }

    #[tokio::test]
    async fn test_fetch_inline_image() {
        let dir = TempDir::new().unwrap();
        let reference = format!("data:image/png;base64,{}", STANDARD.encode(PNG_HEADER));

        let path = MediaFetcher::default()
            .fetch(&reference, &dir.path().join("scene_0"))
            .await
            .unwrap();
        assert_eq!(path.extension().unwrap(), "png");
        assert_eq!(std::fs::read(&path).unwrap(), PNG_HEADER);
    }

    #[tokio::test]
    async fn test_fetch_raw_base64_uses_sniffed_type() {
        let dir = TempDir::new().unwrap();
        let reference = STANDARD.encode(PNG_HEADER);
        let path = MediaFetcher::default()
            .fetch(&reference, &dir.path().join("still"))
            .await
            .unwrap();
        assert_eq!(path.extension().unwrap(), "png");
    }

    #[tokio::test]
    async fn test_invalid_base64_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let err = MediaFetcher::default()
            .fetch("not base64 at all!!", &dir.path().join("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::SourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_fetch_remote() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/media/clip.mp3"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3\x04\0\0\0\0\0\0".to_vec()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let url = format!("{}/media/clip.mp3", server.uri());
        let path = MediaFetcher::default()
            .fetch(&url, &dir.path().join("music"))
            .await
            .unwrap();
        assert_eq!(path.extension().unwrap(), "mp3");
    }

    #[tokio::test]
    async fn test_remote_404_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let err = MediaFetcher::default()
            .fetch(&format!("{}/missing.mp4", server.uri()), &dir.path().join("s"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::SourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_remote_timeout_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"data".to_vec())
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let fetcher = MediaFetcher::new(Duration::from_millis(200));
        let err = fetcher
            .fetch(&format!("{}/slow.mp4", server.uri()), &dir.path().join("s"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
