//! Object key layout and URL mapping.
//!
//! Records store the public URL of their object, not the key. The mapper
//! converts between the two so the worker can download what a record points
//! at.

use url::Url;

use crate::error::{StorageError, StorageResult};

/// Key for an original upload.
pub fn upload_key(filename: &str) -> String {
    format!("videos/{}", sanitize_filename(filename))
}

/// Key for a trimmed clip.
pub fn trimmed_key(filename: &str) -> String {
    format!("videos/trimmed/{}", sanitize_filename(filename))
}

/// Key for a render output. Stable per render so a retried upload
/// overwrites instead of duplicating.
pub fn render_key(render_id: &str, filename: &str) -> String {
    format!("videos/renders/{}_{}", render_id, sanitize_filename(filename))
}

/// Reduce a user-supplied name to a safe single path component.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "video".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Maps object keys to public URLs and back.
#[derive(Debug, Clone)]
pub struct UrlMapper {
    base_url: String,
    bucket: String,
}

impl UrlMapper {
    pub fn new(base_url: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
        }
    }

    /// Virtual-hosted AWS URL layout.
    pub fn aws(bucket: &str, region: &str) -> Self {
        Self::new(format!("https://{}.s3.{}.amazonaws.com", bucket, region), bucket)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Public URL for `key`.
    pub fn url_for(&self, key: &str) -> String {
        let encoded: Vec<String> = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!("{}/{}", self.base_url, encoded.join("/"))
    }

    /// Object key for a stored URL.
    ///
    /// URLs under the configured base map directly. Other URLs are parsed
    /// and their path used, dropping a leading bucket segment for
    /// path-style URLs.
    pub fn key_for_url(&self, stored: &str) -> StorageResult<String> {
        let path = match stored.strip_prefix(&format!("{}/", self.base_url)) {
            Some(rest) => rest.to_string(),
            None => {
                let parsed = Url::parse(stored)
                    .map_err(|e| StorageError::foreign_url(stored, e))?;
                let path = parsed.path().trim_start_matches('/');
                path.strip_prefix(&format!("{}/", self.bucket))
                    .unwrap_or(path)
                    .to_string()
            }
        };

        let key = urlencoding::decode(&path)
            .map_err(|e| StorageError::foreign_url(stored, e))?
            .into_owned();

        if key.is_empty() {
            return Err(StorageError::foreign_url(stored, "empty key"));
        }
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(upload_key("clip.mp4"), "videos/clip.mp4");
        assert_eq!(trimmed_key("trimmed_1_clip.mp4"), "videos/trimmed/trimmed_1_clip.mp4");
        assert_eq!(render_key("r1", "clip.mp4"), "videos/renders/r1_clip.mp4");
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("my clip (1).mp4"), "my_clip__1_.mp4");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("..hidden.mp4"), "hidden.mp4");
        assert_eq!(sanitize_filename(""), "video");
        assert_eq!(sanitize_filename("dir\\name.mov"), "name.mov");
    }

    #[test]
    fn test_aws_url_round_trip() {
        let mapper = UrlMapper::aws("media", "us-east-1");
        let url = mapper.url_for("videos/trimmed/a b.mp4");
        assert_eq!(
            url,
            "https://media.s3.us-east-1.amazonaws.com/videos/trimmed/a%20b.mp4"
        );
        assert_eq!(mapper.key_for_url(&url).unwrap(), "videos/trimmed/a b.mp4");
    }

    #[test]
    fn test_path_style_url() {
        let mapper = UrlMapper::new("https://cdn.example.com", "media");
        let key = mapper
            .key_for_url("http://localhost:9000/media/videos/clip.mp4")
            .unwrap();
        assert_eq!(key, "videos/clip.mp4");
    }

    #[test]
    fn test_invalid_urls() {
        let mapper = UrlMapper::aws("media", "us-east-1");
        assert!(mapper.key_for_url("not a url").is_err());
        assert!(mapper.key_for_url("https://example.com/").is_err());
    }
}
