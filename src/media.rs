//! Storage keys, extension and content-type resolution for media attachments.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::models::{MediaSource, MediaUploadJob, SourceType};

/// Extensions accepted from a URL path for Instagram and Twitter media.
const SOCIAL_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "mp4", "mov", "webm"];

/// Feeds also carry podcasts and documents.
const FEED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "mp4", "mov", "webm", "mp3", "wav", "ogg", "m4a", "pdf",
];

const EXTENSION_CONTENT_TYPES: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("mp4", "video/mp4"),
    ("mov", "video/quicktime"),
    ("webm", "video/webm"),
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("ogg", "audio/ogg"),
    ("m4a", "audio/m4a"),
    ("pdf", "application/pdf"),
];

const CONTENT_TYPE_EXTENSIONS: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/jpg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("video/mp4", "mp4"),
    ("video/quicktime", "mov"),
    ("video/webm", "webm"),
    ("audio/mpeg", "mp3"),
    ("audio/mp3", "mp3"),
    ("audio/wav", "wav"),
    ("audio/ogg", "ogg"),
    ("audio/m4a", "m4a"),
    ("application/pdf", "pdf"),
];

const MAX_KEY_ID_LEN: usize = 100;

/// Build the storage key `{source_type}/{source_id}/{post_id}/{index}.{ext}`.
///
/// The post id is sanitized to `[A-Za-z0-9_-]` since feed GUIDs are often URLs.
pub fn generate_key(source_type: SourceType, source_id: &str, post_external_id: &str, index: u32, extension: &str) -> String {
    let safe_post_id: String = post_external_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_KEY_ID_LEN)
        .collect();
    format!("{source_type}/{source_id}/{safe_post_id}/{index}.{extension}")
}

fn normalize_extension(ext: &str) -> String {
    if ext == "jpeg" { "jpg".to_string() } else { ext.to_string() }
}

fn url_path_extension(url: &str, allowed: &[&str]) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let filename = path.rsplit('/').next().unwrap_or(path);
    let (_, ext) = filename.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    allowed.contains(&ext.as_str()).then(|| normalize_extension(&ext))
}

/// Extension for Instagram/Twitter media: URL path, then the `video`
/// heuristic, then `jpg`.
pub fn extension_from_url(url: &str) -> String {
    if let Some(ext) = url_path_extension(url, SOCIAL_EXTENSIONS) {
        return ext;
    }
    if url.to_ascii_lowercase().contains("video") {
        return "mp4".to_string();
    }
    "jpg".to_string()
}

/// Extension for feed media: URL path (wider allow-list), then `jpg`.
pub fn feed_extension_from_url(url: &str) -> String {
    url_path_extension(url, FEED_EXTENSIONS).unwrap_or_else(|| "jpg".to_string())
}

/// Extension for a declared content type; unknown types map to `bin`.
pub fn extension_from_content_type(content_type: &str) -> String {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
        .to_ascii_lowercase();
    CONTENT_TYPE_EXTENSIONS
        .iter()
        .find(|(ct, _)| *ct == essence)
        .map(|(_, ext)| ext.to_string())
        .unwrap_or_else(|| "bin".to_string())
}

/// Content type for an extension; unknown extensions map to
/// `application/octet-stream`.
pub fn content_type_from_extension(extension: &str) -> String {
    let ext = extension.to_ascii_lowercase();
    EXTENSION_CONTENT_TYPES
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, ct)| ct.to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

/// Decode a base64 `data:` URL into its media type and bytes.
pub fn parse_data_url(url: &str) -> Option<(String, Vec<u8>)> {
    let rest = url.strip_prefix("data:")?;
    let (meta, data) = rest.split_once(',')?;
    let media_type = meta.strip_suffix(";base64")?;
    let media_type = if media_type.is_empty() {
        "application/octet-stream"
    } else {
        media_type
    };
    let bytes = STANDARD.decode(data.trim()).ok()?;
    Some((media_type.to_ascii_lowercase(), bytes))
}

/// How the extension of a media reference should be resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtensionHint {
    /// Known to be a video regardless of URL shape.
    Video,
    /// Declared content type (feed enclosures).
    ContentType(String),
    /// Social media URL rules.
    SocialUrl,
    /// Feed URL rules.
    FeedUrl,
}

/// Accumulates storage keys and upload jobs for one post, assigning 1-based
/// indices in the order media is added.
pub struct MediaCollector<'a> {
    source_type: SourceType,
    source_id: &'a str,
    post_external_id: &'a str,
    keys: Vec<String>,
    jobs: Vec<MediaUploadJob>,
}

impl<'a> MediaCollector<'a> {
    pub fn new(source_type: SourceType, source_id: &'a str, post_external_id: &'a str) -> Self {
        Self {
            source_type,
            source_id,
            post_external_id,
            keys: Vec::new(),
            jobs: Vec::new(),
        }
    }

    pub fn add(&mut self, url: &str, hint: ExtensionHint) {
        if url.is_empty() {
            return;
        }
        let index = self.jobs.len() as u32 + 1;

        if let Some((content_type, bytes)) = parse_data_url(url) {
            let extension = extension_from_content_type(&content_type);
            let target_path = generate_key(self.source_type, self.source_id, self.post_external_id, index, &extension);
            self.push(index, target_path, content_type, MediaSource::Buffer, None, Some(STANDARD.encode(bytes)));
            return;
        }

        let (extension, content_type) = match hint {
            ExtensionHint::Video => ("mp4".to_string(), content_type_from_extension("mp4")),
            ExtensionHint::ContentType(ct) if !ct.trim().is_empty() => (extension_from_content_type(&ct), ct),
            ExtensionHint::ContentType(_) | ExtensionHint::FeedUrl => {
                let ext = feed_extension_from_url(url);
                let ct = content_type_from_extension(&ext);
                (ext, ct)
            }
            ExtensionHint::SocialUrl => {
                let ext = extension_from_url(url);
                let ct = content_type_from_extension(&ext);
                (ext, ct)
            }
        };

        let target_path = generate_key(self.source_type, self.source_id, self.post_external_id, index, &extension);
        self.push(index, target_path, content_type, MediaSource::Url, Some(url.to_string()), None);
    }

    fn push(
        &mut self,
        index: u32,
        target_path: String,
        content_type: String,
        source: MediaSource,
        source_url: Option<String>,
        buffer: Option<String>,
    ) {
        self.keys.push(target_path.clone());
        self.jobs.push(MediaUploadJob {
            source_type: self.source_type,
            source_id: self.source_id.to_string(),
            post_external_id: self.post_external_id.to_string(),
            media_index: index,
            target_path,
            content_type,
            source,
            source_url,
            buffer,
        });
    }

    pub fn finish(self) -> (Vec<String>, Vec<MediaUploadJob>) {
        (self.keys, self.jobs)
    }
}
