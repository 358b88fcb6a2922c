//! Video resource metadata sent when the upload session is created

use serde::Serialize;

pub const DEFAULT_TITLE: &str = "Test Title";
pub const DEFAULT_DESCRIPTION: &str = "Test Description";
/// "Education" in the platform's category list
pub const DEFAULT_CATEGORY: &str = "27";
pub const DEFAULT_PRIVACY_STATUS: &str = "public";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoMetadata {
    pub title: String,
    pub description: String,
    pub category_id: String,
    pub tags: Option<Vec<String>>,
    pub privacy_status: String,
}

impl Default for VideoMetadata {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            description: DEFAULT_DESCRIPTION.to_string(),
            category_id: DEFAULT_CATEGORY.to_string(),
            tags: None,
            privacy_status: DEFAULT_PRIVACY_STATUS.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct VideoResource<'a> {
    snippet: Snippet<'a>,
    status: Status<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Snippet<'a> {
    title: &'a str,
    description: &'a str,
    tags: Option<&'a [String]>,
    category_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Status<'a> {
    privacy_status: &'a str,
}

impl VideoMetadata {
    /// `snippet` + `status` body for the insert request
    pub fn to_json(&self) -> serde_json::Value {
        let resource = VideoResource {
            snippet: Snippet {
                title: &self.title,
                description: &self.description,
                tags: self.tags.as_deref(),
                category_id: &self.category_id,
            },
            status: Status {
                privacy_status: &self.privacy_status,
            },
        };
        serde_json::to_value(resource).unwrap_or(serde_json::Value::Null)
    }
}

/// Split a comma separated keyword list; empty input means no tags
pub fn parse_keywords(keywords: &str) -> Option<Vec<String>> {
    if keywords.is_empty() {
        return None;
    }
    Some(keywords.split(',').map(|k| k.trim().to_string()).collect())
}
