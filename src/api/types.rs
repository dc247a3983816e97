//! Timeline payload types.
//!
//! The API is unversioned, so deserialization is deliberately forgiving:
//! `null` collections become empty, malformed list elements are dropped with
//! a warning, and a page without `data` is simply an empty page.

use chrono::{DateTime, TimeZone, Utc};
use serde::de::{DeserializeOwned, Deserializer, Error as _};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    #[serde(deserialize_with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub pinned: bool,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub media_entities: Vec<MediaEntity>,
    #[serde(default)]
    pub retweeted_status: Option<RetweetedStatus>,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub conversation: Vec<Post>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetweetedStatus {
    #[serde(default)]
    pub user: Option<User>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default)]
    pub screen_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaEntity {
    #[serde(default, rename = "mediaURL")]
    pub media_url: Option<String>,
    #[serde(default)]
    pub video_info: Option<VideoInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoInfo {
    #[serde(default, deserialize_with = "null_as_default")]
    pub variants: Vec<VideoVariant>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoVariant {
    #[serde(default)]
    pub bitrate: Option<u64>,
    #[serde(default)]
    pub url: Option<String>,
}

impl Post {
    /// Screen name of the reposted author, when this post is a repost.
    pub fn reposted_author(&self) -> Option<&str> {
        self.retweeted_status
            .as_ref()
            .and_then(|rt| rt.user.as_ref())
            .and_then(|u| u.screen_name.as_deref())
    }

    pub fn author(&self) -> Option<&str> {
        self.user.as_ref().and_then(|u| u.screen_name.as_deref())
    }
}

impl MediaEntity {
    /// Resolve the single URL worth downloading for this item.
    ///
    /// Anything carrying video variants is a video, even when it also has a
    /// `mediaURL` (that one is the poster frame).
    pub fn download_url(&self) -> Option<&str> {
        match &self.video_info {
            Some(info) if !info.variants.is_empty() => {
                best_variant(&info.variants).and_then(|v| v.url.as_deref())
            }
            _ => self.media_url.as_deref(),
        }
    }
}

/// Highest-bitrate variant; the earliest one wins a tie.
///
/// Variants without a bitrate (HLS playlists) rank below everything else.
pub fn best_variant(variants: &[VideoVariant]) -> Option<&VideoVariant> {
    variants.iter().fold(None, |best: Option<&VideoVariant>, v| match best {
        Some(b) if b.bitrate >= v.bitrate => Some(b),
        _ => Some(v),
    })
}

/// One page of a user's timeline.
#[derive(Debug, Default)]
pub struct Page {
    pub posts: Vec<Post>,
    pub after: Option<String>,
}

impl Page {
    pub fn from_value(mut value: Value) -> Self {
        let posts = match value.get_mut("data").and_then(|v| v.as_array_mut()) {
            Some(items) => std::mem::take(items)
                .into_iter()
                .filter_map(|item| match serde_json::from_value::<Post>(item) {
                    Ok(post) => Some(post),
                    Err(e) => {
                        tracing::warn!("Skipping malformed post: {}", e);
                        None
                    }
                })
                .collect(),
            None => {
                tracing::debug!("No 'data' array in page response");
                Vec::new()
            }
        };

        let after = match value.get("after") {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        Self { posts, after }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw: Option<Vec<Value>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!("Skipping malformed entry: {}", e);
                None
            }
        })
        .collect())
}

/// Accepts epoch milliseconds (integer or float) or an RFC 3339 string.
fn timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let parsed = match &value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| s.parse::<i64>().ok().and_then(|ms| Utc.timestamp_millis_opt(ms).single())),
        _ => None,
    };
    parsed.ok_or_else(|| D::Error::custom(format!("unrecognized createdAt value: {}", value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn variant(bitrate: Option<u64>, url: &str) -> VideoVariant {
        VideoVariant {
            bitrate,
            url: Some(url.to_string()),
        }
    }

    #[test]
    fn test_best_variant_picks_max_bitrate() {
        let variants = vec![
            variant(Some(256_000), "https://video.example.com/low.mp4"),
            variant(Some(2_176_000), "https://video.example.com/high.mp4"),
            variant(Some(832_000), "https://video.example.com/mid.mp4"),
        ];
        assert_eq!(
            best_variant(&variants).unwrap().url.as_deref(),
            Some("https://video.example.com/high.mp4")
        );
    }

    #[test]
    fn test_best_variant_tie_keeps_first() {
        let variants = vec![
            variant(Some(832_000), "https://video.example.com/first.mp4"),
            variant(Some(832_000), "https://video.example.com/second.mp4"),
            variant(Some(256_000), "https://video.example.com/low.mp4"),
        ];
        assert_eq!(
            best_variant(&variants).unwrap().url.as_deref(),
            Some("https://video.example.com/first.mp4")
        );
    }

    #[test]
    fn test_best_variant_ranks_missing_bitrate_last() {
        let variants = vec![
            variant(None, "https://video.example.com/pl.m3u8"),
            variant(Some(1), "https://video.example.com/tiny.mp4"),
        ];
        assert_eq!(
            best_variant(&variants).unwrap().url.as_deref(),
            Some("https://video.example.com/tiny.mp4")
        );
        assert!(best_variant(&[]).is_none());
    }

    #[test]
    fn test_download_url_prefers_video_over_poster() {
        let media: MediaEntity = serde_json::from_value(json!({
            "mediaURL": "https://pbs.example.com/poster.jpg",
            "videoInfo": {"variants": [
                {"bitrate": 100, "url": "https://video.example.com/a.mp4"},
                {"bitrate": 900, "url": "https://video.example.com/b.mp4"}
            ]}
        }))
        .unwrap();
        assert_eq!(media.download_url(), Some("https://video.example.com/b.mp4"));
    }

    #[test]
    fn test_download_url_image() {
        let media: MediaEntity = serde_json::from_value(json!({
            "mediaURL": "https://pbs.example.com/media/abc.jpg",
            "imageSize": {"width": 10, "height": 10},
            "videoInfo": null
        }))
        .unwrap();
        assert_eq!(
            media.download_url(),
            Some("https://pbs.example.com/media/abc.jpg")
        );
    }

    #[test]
    fn test_download_url_none_when_empty() {
        let media: MediaEntity = serde_json::from_value(json!({})).unwrap();
        assert_eq!(media.download_url(), None);
    }

    #[test]
    fn test_created_at_accepts_millis_and_rfc3339() {
        let a: Post = serde_json::from_value(json!({"createdAt": 1717200000000u64})).unwrap();
        let b: Post =
            serde_json::from_value(json!({"createdAt": "2024-06-01T00:00:00Z"})).unwrap();
        let c: Post = serde_json::from_value(json!({"createdAt": 1717200000000.0})).unwrap();
        assert_eq!(a.created_at, b.created_at);
        assert_eq!(a.created_at, c.created_at);
        assert!(serde_json::from_value::<Post>(json!({"createdAt": true})).is_err());
    }

    #[test]
    fn test_post_null_fields_default() {
        let post: Post = serde_json::from_value(json!({
            "createdAt": 0,
            "pinned": null,
            "mediaEntities": null,
            "conversation": null
        }))
        .unwrap();
        assert!(!post.pinned);
        assert!(post.media_entities.is_empty());
        assert!(post.conversation.is_empty());
        assert!(post.reposted_author().is_none());
    }

    #[test]
    fn test_post_drops_malformed_conversation_entries() {
        let post: Post = serde_json::from_value(json!({
            "createdAt": 0,
            "conversation": [
                {"createdAt": "garbage"},
                {"createdAt": 0, "user": {"screenName": "Friend"}}
            ]
        }))
        .unwrap();
        assert_eq!(post.conversation.len(), 1);
        assert_eq!(post.conversation[0].author(), Some("Friend"));
    }

    #[test]
    fn test_page_from_value() {
        let page = Page::from_value(json!({
            "data": [
                {"createdAt": 0, "retweetedStatus": {"user": {"screenName": "Other"}}},
                {"noCreatedAt": true}
            ],
            "after": "c1"
        }));
        assert_eq!(page.posts.len(), 1);
        assert_eq!(page.posts[0].reposted_author(), Some("Other"));
        assert_eq!(page.after.as_deref(), Some("c1"));
    }

    #[test]
    fn test_page_missing_data_is_empty() {
        let page = Page::from_value(json!({"error": "rate limited"}));
        assert!(page.posts.is_empty());
        assert!(page.after.is_none());
    }

    #[test]
    fn test_page_after_null_or_empty_ends() {
        assert!(Page::from_value(json!({"data": [], "after": null})).after.is_none());
        assert!(Page::from_value(json!({"data": [], "after": ""})).after.is_none());
        assert_eq!(
            Page::from_value(json!({"data": [], "after": 42})).after.as_deref(),
            Some("42")
        );
    }
}
