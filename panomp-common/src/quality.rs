//! Quality descriptor and quality mode types
//!
//! A `QualityDescriptor` describes one rendition (bitrate/resolution/url) of a
//! logical media item. Descriptors are produced once at load time from
//! configuration and never mutated afterwards.

use serde::{Deserialize, Serialize};

/// One rendition of a media item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityDescriptor {
    /// Stable identifier, unique within a ladder
    pub id: String,

    /// Source the playback surface attaches to
    #[serde(alias = "url")]
    pub source_url: String,

    /// Container MIME type (e.g. "video/mp4")
    #[serde(default)]
    pub mime_type: String,

    /// Nominal bitrate in bits per second (0 if unknown)
    #[serde(default)]
    pub bitrate: u64,

    /// Frame width in pixels (0 if unknown)
    #[serde(default)]
    pub width: u32,

    /// Frame height in pixels (0 if unknown)
    #[serde(default)]
    pub height: u32,
}

impl QualityDescriptor {
    /// Build a descriptor from a bare URL
    ///
    /// The id is derived from the ladder position and the MIME type is guessed
    /// from the file extension. Bitrate and dimensions stay unknown.
    pub fn from_url(position: usize, url: impl Into<String>) -> Self {
        let source_url = url.into();
        let mime_type = guess_mime_type(&source_url).to_string();
        Self {
            id: format!("q{}", position),
            source_url,
            mime_type,
            bitrate: 0,
            width: 0,
            height: 0,
        }
    }

    /// Short human-readable label ("1920x1080 @ 4500 kbps", or the id)
    pub fn label(&self) -> String {
        match (self.width, self.height, self.bitrate) {
            (0, 0, 0) => self.id.clone(),
            (0, 0, bps) => format!("{} @ {} kbps", self.id, bps / 1000),
            (w, h, 0) => format!("{}x{}", w, h),
            (w, h, bps) => format!("{}x{} @ {} kbps", w, h, bps / 1000),
        }
    }
}

/// Guess a container MIME type from a URL's extension
fn guess_mime_type(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let ext = path
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase());

    match ext.as_deref() {
        Some("mp4") | Some("m4v") => "video/mp4",
        Some("webm") => "video/webm",
        Some("ogv") | Some("ogg") => "video/ogg",
        Some("mov") => "video/quicktime",
        Some("mp3") => "audio/mpeg",
        Some("m4a") => "audio/mp4",
        _ => "application/octet-stream",
    }
}

/// Who decides the rendition
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QualityMode {
    /// The auto-quality decision loop upgrades/downgrades on its own
    Auto,
    /// The host selected a rendition explicitly
    Manual,
}

impl std::fmt::Display for QualityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QualityMode::Auto => write!(f, "auto"),
            QualityMode::Manual => write!(f, "manual"),
        }
    }
}
