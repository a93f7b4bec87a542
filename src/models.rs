use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Normalized APOD entry handed to the page renderer.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct ApodResult {
    pub title: Option<String>,
    pub date: Option<String>,
    pub explanation: Option<String>,
    pub media_type: Option<String>,
    pub url: Option<String>,
    pub hdurl: Option<String>,
    pub copyright: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_url: Option<String>,
}

impl ApodResult {
    pub fn is_image(&self) -> bool {
        self.media_type.as_deref() == Some("image")
    }

    pub fn is_video(&self) -> bool {
        self.media_type.as_deref() == Some("video")
    }

    /// High definition first, then the standard URL.
    pub fn remote_media_url(&self) -> Option<&str> {
        self.hdurl.as_deref().or(self.url.as_deref())
    }

    /// Best URL to show an image from: the local mirror when present.
    pub fn display_url(&self) -> Option<&str> {
        self.local_url.as_deref().or_else(|| self.remote_media_url())
    }

    pub fn with_local_url(mut self, local_url: String) -> Self {
        self.local_url = Some(local_url);
        self
    }
}

/// Payload of the upstream API. Anything it omits stays `None`; numbers and
/// booleans are kept as text and any other shape is dropped, so one odd field
/// never costs the whole entry.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct UpstreamApod {
    #[serde(deserialize_with = "lenient_text")]
    pub title: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub date: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub explanation: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub media_type: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub url: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub hdurl: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub copyright: Option<String>,
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    })
}

impl From<UpstreamApod> for ApodResult {
    fn from(raw: UpstreamApod) -> Self {
        Self {
            title: raw.title,
            date: raw.date,
            explanation: raw.explanation,
            media_type: raw.media_type,
            url: raw.url,
            hdurl: raw.hdurl,
            copyright: raw.copyright.map(|c| c.trim().to_string()),
            local_url: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
}
