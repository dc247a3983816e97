use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Url;

use crate::api::Post;

/// Container for media authored by someone other than the queried user.
pub const EXTRA_DIR: &str = "_extra";

/// Pre-`_extra` container; per-user folders found here are migrated.
pub const LEGACY_CONVERSATIONS_DIR: &str = "_conversations";

/// Where a post's media lands, relative to the media root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetFolder {
    /// `<root>/<username>`
    Primary(String),
    /// `<root>/_extra/<author>`
    Extra(String),
}

impl TargetFolder {
    pub fn is_primary(&self) -> bool {
        matches!(self, TargetFolder::Primary(_))
    }

    pub fn relative_path(&self) -> PathBuf {
        match self {
            TargetFolder::Primary(user) => PathBuf::from(user),
            TargetFolder::Extra(author) => PathBuf::from(EXTRA_DIR).join(author),
        }
    }

    /// Classify by author: the queried user gets the primary folder,
    /// anyone else goes to `_extra`. Authors come from the API and become
    /// folder names, so anything outside the screen-name alphabet is
    /// rejected.
    fn for_author(author: &str, primary: &str) -> Option<Self> {
        if !is_screen_name(author) {
            tracing::warn!("Ignoring media from invalid author name {:?}", author);
            return None;
        }
        let author = author.to_lowercase();
        if author == primary {
            Some(TargetFolder::Primary(author))
        } else {
            Some(TargetFolder::Extra(author))
        }
    }
}

impl fmt::Display for TargetFolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.relative_path().display())
    }
}

/// `[A-Za-z0-9_]+`, the alphabet screen names are drawn from.
fn is_screen_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Folder for a top-level timeline post, or `None` when the reposted author
/// is not a usable folder name. `primary` must already be lowercase.
///
/// Only reposts can be attributed elsewhere; everything else on the user's
/// own timeline is theirs.
pub fn post_folder(post: &Post, primary: &str) -> Option<TargetFolder> {
    match post.reposted_author() {
        Some(author) => TargetFolder::for_author(author, primary),
        None => Some(TargetFolder::Primary(primary.to_string())),
    }
}

/// Folder for a conversation sub-post, or `None` when it names no usable
/// author.
pub fn conversation_folder(post: &Post, primary: &str) -> Option<TargetFolder> {
    post.author()
        .and_then(|author| TargetFolder::for_author(author, primary))
}

/// Last path segment of a media URL, e.g. `abc.jpg` for
/// `https://pbs.example.com/media/abc.jpg?name=orig`.
pub fn url_basename(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .next_back()
        .map(str::to_string)
}

/// `2024-06-01_abc.jpg` for a post created on 2024-06-01 (UTC).
pub fn stored_filename(created_at: &DateTime<Utc>, basename: &str) -> String {
    format!("{}_{}", created_at.format("%Y-%m-%d"), basename)
}

/// Parse the date prefix of a stored filename.
///
/// Accepts unpadded components (`2024-1-5_x.jpg`) written by older versions.
pub fn date_prefix(filename: &str) -> Option<NaiveDate> {
    let (prefix, _) = filename.split_once('_')?;
    let mut parts = prefix.splitn(3, '-');
    let year = parts.next()?.parse::<i32>().ok()?;
    let month = parts.next()?.parse::<u32>().ok()?;
    let day = parts.next()?.parse::<u32>().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Date before which a previous run is assumed to have fetched everything.
///
/// The newest date in the folder may belong to an interrupted run, so the
/// boundary is the second-newest distinct date. Fewer than two distinct
/// dates means there is no boundary.
pub fn duplicate_boundary<I, S>(filenames: I) -> Option<NaiveDate>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut dates: Vec<NaiveDate> = filenames
        .into_iter()
        .filter_map(|name| date_prefix(name.as_ref()))
        .collect();
    dates.sort_unstable_by(|a, b| b.cmp(a));
    dates.dedup();
    dates.get(1).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn post(value: serde_json::Value) -> Post {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_post_folder_own_post() {
        let p = post(json!({"createdAt": 0}));
        assert_eq!(post_folder(&p, "alice"), Some(TargetFolder::Primary("alice".into())));
    }

    #[test]
    fn test_post_folder_repost_of_other_user() {
        let p = post(json!({
            "createdAt": 0,
            "retweetedStatus": {"user": {"screenName": "Bob_Smith"}}
        }));
        let folder = post_folder(&p, "alice").unwrap();
        assert_eq!(folder, TargetFolder::Extra("bob_smith".into()));
        assert!(!folder.is_primary());
        assert_eq!(folder.relative_path(), PathBuf::from("_extra").join("bob_smith"));
    }

    #[test]
    fn test_post_folder_self_repost_is_primary() {
        let p = post(json!({
            "createdAt": 0,
            "retweetedStatus": {"user": {"screenName": "ALICE"}}
        }));
        assert_eq!(post_folder(&p, "alice"), Some(TargetFolder::Primary("alice".into())));
    }

    #[test]
    fn test_post_folder_rejects_unsafe_author_names() {
        for name in ["../../escaped", "/etc/x", "", ".", "..", "a\\b", "a\0b", "bob smith"] {
            let p = post(json!({
                "createdAt": 0,
                "retweetedStatus": {"user": {"screenName": name}}
            }));
            assert_eq!(post_folder(&p, "alice"), None, "{:?}", name);
        }
    }

    #[test]
    fn test_conversation_folder_rejects_unsafe_author_names() {
        let p = post(json!({"createdAt": 0, "user": {"screenName": "../bob"}}));
        assert_eq!(conversation_folder(&p, "alice"), None);
    }

    #[test]
    fn test_conversation_folder() {
        let own = post(json!({"createdAt": 0, "user": {"screenName": "Alice"}}));
        let other = post(json!({"createdAt": 0, "user": {"screenName": "Carol"}}));
        let anon = post(json!({"createdAt": 0}));
        assert_eq!(
            conversation_folder(&own, "alice"),
            Some(TargetFolder::Primary("alice".into()))
        );
        assert_eq!(
            conversation_folder(&other, "alice"),
            Some(TargetFolder::Extra("carol".into()))
        );
        assert_eq!(conversation_folder(&anon, "alice"), None);
    }

    #[test]
    fn test_url_basename() {
        assert_eq!(
            url_basename("https://pbs.example.com/media/GabC123.jpg").as_deref(),
            Some("GabC123.jpg")
        );
        assert_eq!(
            url_basename("https://video.example.com/vid/720x1280/xyz.mp4?tag=12").as_deref(),
            Some("xyz.mp4")
        );
        assert_eq!(
            url_basename("https://video.example.com/dir/").as_deref(),
            Some("dir")
        );
        assert_eq!(url_basename("https://video.example.com/"), None);
        assert_eq!(url_basename("not a url"), None);
    }

    #[test]
    fn test_stored_filename() {
        let created = Utc.with_ymd_and_hms(2024, 6, 1, 23, 59, 0).unwrap();
        assert_eq!(stored_filename(&created, "abc.jpg"), "2024-06-01_abc.jpg");
    }

    #[test]
    fn test_date_prefix() {
        assert_eq!(
            date_prefix("2024-01-05_b.jpg"),
            NaiveDate::from_ymd_opt(2024, 1, 5)
        );
        assert_eq!(
            date_prefix("2024-1-5_b.jpg"),
            NaiveDate::from_ymd_opt(2024, 1, 5)
        );
        assert_eq!(date_prefix("b.jpg"), None);
        assert_eq!(date_prefix("notes_2024.txt"), None);
        assert_eq!(date_prefix("2024-13-01_x.jpg"), None);
    }

    #[test]
    fn test_duplicate_boundary_second_newest() {
        let boundary = duplicate_boundary(["2024-01-01_a.jpg", "2024-01-05_b.jpg"]);
        assert_eq!(boundary, NaiveDate::from_ymd_opt(2024, 1, 1));
    }

    #[test]
    fn test_duplicate_boundary_distinct_dates_only() {
        let boundary = duplicate_boundary([
            "2024-01-05_a.jpg",
            "2024-01-05_b.jpg",
            "2024-01-03_c.mp4",
            "2023-12-30_d.jpg",
            ".DS_Store",
        ]);
        assert_eq!(boundary, NaiveDate::from_ymd_opt(2024, 1, 3));
    }

    #[test]
    fn test_duplicate_boundary_needs_two_dates() {
        assert_eq!(duplicate_boundary(Vec::<String>::new()), None);
        assert_eq!(
            duplicate_boundary(["2024-01-05_a.jpg", "2024-01-05_b.jpg"]),
            None
        );
    }
}
