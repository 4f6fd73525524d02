use serde::{Deserialize, Serialize};
use super::errors::ValidationError;
use super::types::FileInfo;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Accepted-type filter in the form of an HTML `accept` attribute:
/// `video/*,image/png,.srt`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub struct AcceptFilter {
    raw: String,
    rules: Vec<AcceptRule>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AcceptRule {
    /// `*/*` or `*`
    Any,
    /// `.srt`, stored lowercase with the dot
    Extension(String),
    /// `video/*`, stored as `video/`
    MimeGroup(String),
    Mime(String),
}

impl AcceptFilter {
    pub fn parse(raw: &str) -> Self {
        let rules = raw
            .split(',')
            .map(|token| token.trim().to_ascii_lowercase())
            .filter(|token| !token.is_empty())
            .map(|token| {
                if token == "*" || token == "*/*" {
                    AcceptRule::Any
                } else if token.starts_with('.') {
                    AcceptRule::Extension(token)
                } else if let Some(group) = token.strip_suffix("/*") {
                    AcceptRule::MimeGroup(format!("{}/", group))
                } else {
                    AcceptRule::Mime(token)
                }
            })
            .collect();

        Self {
            raw: raw.trim().to_string(),
            rules,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// An empty filter accepts everything.
    pub fn accepts(&self, info: &FileInfo) -> bool {
        if self.rules.is_empty() {
            return true;
        }

        let name = info.name.to_ascii_lowercase();
        let mime = essence(&info.content_type);

        self.rules.iter().any(|rule| match rule {
            AcceptRule::Any => true,
            AcceptRule::Extension(ext) => name.ends_with(ext.as_str()),
            AcceptRule::MimeGroup(group) => mime.starts_with(group.as_str()),
            AcceptRule::Mime(exact) => mime == *exact,
        })
    }
}

impl From<String> for AcceptFilter {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<AcceptFilter> for String {
    fn from(filter: AcceptFilter) -> Self {
        filter.raw
    }
}

/// `video/mp4; codecs=avc1` -> `video/mp4`
fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Reject the file before any backend call if it breaks the size limit or
/// the type filter.
pub fn validate(
    info: &FileInfo,
    max_size_mb: Option<u64>,
    accept: Option<&AcceptFilter>,
) -> Result<(), ValidationError> {
    if let Some(max_mb) = max_size_mb {
        if info.size > max_mb.saturating_mul(BYTES_PER_MB) {
            return Err(ValidationError::TooLarge {
                size: info.size,
                max_mb,
            });
        }
    }

    if let Some(filter) = accept {
        if !filter.accepts(info) {
            return Err(ValidationError::TypeNotAccepted {
                file_name: info.name.clone(),
                content_type: info.content_type.clone(),
                filter: filter.as_str().to_string(),
            });
        }
    }

    Ok(())
}

pub fn guess_content_type(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "ts" => "video/mp2t",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "srt" => "application/x-subrip",
        "vtt" => "text/vtt",
        "ass" | "ssa" => "text/x-ssa",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str, content_type: &str, size: u64) -> FileInfo {
        FileInfo {
            name: name.to_string(),
            content_type: content_type.to_string(),
            size,
        }
    }

    #[test]
    fn test_size_limit() {
        let under = info("movie.mp4", "video/mp4", 500 * BYTES_PER_MB);
        assert!(validate(&under, Some(1024), None).is_ok());

        let over = info("movie.mp4", "video/mp4", 3000 * BYTES_PER_MB);
        assert_eq!(
            validate(&over, Some(2048), None),
            Err(ValidationError::TooLarge { size: 3000 * BYTES_PER_MB, max_mb: 2048 })
        );

        let exact = info("movie.mp4", "video/mp4", 2048 * BYTES_PER_MB);
        assert!(validate(&exact, Some(2048), None).is_ok());
        assert!(validate(&over, None, None).is_ok());
    }

    #[test]
    fn test_accept_filter() {
        let filter = AcceptFilter::parse("video/*, image/png, .SRT");

        assert!(filter.accepts(&info("a.mkv", "video/x-matroska", 1)));
        assert!(filter.accepts(&info("a.mp4", "Video/MP4; codecs=avc1", 1)));
        assert!(filter.accepts(&info("poster.png", "image/png", 1)));
        assert!(filter.accepts(&info("episode.en.srt", "application/octet-stream", 1)));
        assert!(!filter.accepts(&info("poster.jpg", "image/jpeg", 1)));
        assert!(!filter.accepts(&info("notes.txt", "text/plain", 1)));

        assert!(AcceptFilter::parse("").accepts(&info("x.bin", "application/zip", 1)));
        assert!(AcceptFilter::parse("*/*").accepts(&info("x.bin", "application/zip", 1)));
    }

    #[test]
    fn test_rejected_type_reports_filter() {
        let filter = AcceptFilter::parse("image/*");
        let err = validate(&info("clip.mp4", "video/mp4", 10), None, Some(&filter)).unwrap_err();

        assert_eq!(err, ValidationError::TypeNotAccepted {
            file_name: "clip.mp4".to_string(),
            content_type: "video/mp4".to_string(),
            filter: "image/*".to_string(),
        });
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type("Movie.MP4"), "video/mp4");
        assert_eq!(guess_content_type("cover.jpeg"), "image/jpeg");
        assert_eq!(guess_content_type("s01e01.vtt"), "text/vtt");
        assert_eq!(guess_content_type("README"), "application/octet-stream");
    }
}
