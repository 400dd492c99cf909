use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

static RE_VIDEO_IDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:"video_ids"|'video_ids')\s*:\s*(?P<ids>\[.+?\])"#)
        .expect("valid video ids pattern")
});

/// Videos embedded in one post, in page order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostExpansion {
    pub post_id: String,
    pub video_ids: Vec<String>,
}

impl PostExpansion {
    /// One `facebook:<id>` reference per child, each resolvable on its own.
    pub fn entries(&self) -> impl Iterator<Item = String> + '_ {
        self.video_ids.iter().map(|id| format!("facebook:{}", id))
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PostError {
    #[error("Could not find video ids")]
    IdsNotFound,
    #[error("Could not parse video ids")]
    InvalidIds(#[from] serde_json::Error),
}

pub fn expand(post_id: &str, html: &str) -> Result<PostExpansion, PostError> {
    let ids = RE_VIDEO_IDS
        .captures(html)
        .and_then(|c| c.name("ids"))
        .ok_or(PostError::IdsNotFound)?;

    let video_ids = serde_json::from_str::<Vec<Value>>(ids.as_str())?
        .into_iter()
        .filter_map(|id| match id {
            Value::Number(n) => Some(n.to_string()),
            Value::String(s) if !s.is_empty() => Some(s),
            _ => None,
        })
        .collect();

    Ok(PostExpansion {
        post_id: post_id.to_string(),
        video_ids,
    })
}
