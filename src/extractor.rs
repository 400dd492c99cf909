use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::{
    formats::{self, FormatCandidate, NoFormats},
    metadata,
    post::{self, PostError, PostExpansion},
    session::{Credentials, Session},
    util::{FetchError, Fetcher, Request},
    video_data::{self, LocateError},
};

pub const CHROME_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/48.0.2564.97 Safari/537.36";
const VIDEO_PAGE_URL: &str = "https://www.facebook.com/video/video.php?v=";

static RE_VIDEO_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:https?://(?:\w+\.)?facebook\.com/(?:[^#]*?#!/)?(?:(?:video/video\.php|photo\.php|video\.php|video/embed)\?(?:.*?)(?:v|video_id)=|[^/]+/videos/(?:[^/]+/)?)|facebook:)(?P<id>[0-9]+)",
    )
    .expect("valid video url pattern")
});
static RE_POST_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(?:\w+\.)?facebook\.com/[^/]+/posts/(?P<id>\d+)")
        .expect("valid post url pattern")
});

/// Video id of a bare numeric id, a `facebook:<id>` reference or a known
/// video page URL.
pub fn match_video_id(input: &str) -> Option<&str> {
    if !input.is_empty() && input.bytes().all(|b| b.is_ascii_digit()) {
        return Some(input);
    }
    RE_VIDEO_URL
        .captures(input)
        .and_then(|c| c.name("id"))
        .map(|m| m.as_str())
}

pub fn match_post_id(input: &str) -> Option<&str> {
    RE_POST_URL
        .captures(input)
        .and_then(|c| c.name("id"))
        .map(|m| m.as_str())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRecord {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploader: Option<String>,
    pub formats: Vec<FormatCandidate>,
}

#[derive(thiserror::Error, Debug)]
pub enum ExtractError {
    #[error("Unsupported URL: {0}")]
    InvalidUrl(String),
    #[error("The video is not available, Facebook said: \"{0}\"")]
    Gated(String),
    #[error("Cannot parse data")]
    Unparsable,
    #[error("Cannot find video formats")]
    NoFormats,
    #[error("Could not find video ids")]
    IdsNotFound,
    #[error("Could not parse video ids")]
    InvalidIds(#[source] serde_json::Error),
    #[error("Could not download webpage")]
    Transport(#[from] FetchError),
}

impl From<LocateError> for ExtractError {
    fn from(e: LocateError) -> Self {
        match e {
            LocateError::Gated(message) => ExtractError::Gated(message),
            LocateError::Unparsable => ExtractError::Unparsable,
        }
    }
}

impl From<NoFormats> for ExtractError {
    fn from(_: NoFormats) -> Self {
        ExtractError::NoFormats
    }
}

impl From<PostError> for ExtractError {
    fn from(e: PostError) -> Self {
        match e {
            PostError::IdsNotFound => ExtractError::IdsNotFound,
            PostError::InvalidIds(e) => ExtractError::InvalidIds(e),
        }
    }
}

/// Builds the record for `video_id` from its already downloaded page.
pub fn extract_from_html(video_id: &str, html: &str) -> Result<ResultRecord, ExtractError> {
    let video_data = video_data::locate(html)?;
    let formats = formats::enumerate(&video_data)?;

    Ok(ResultRecord {
        id: video_id.to_string(),
        title: metadata::resolve_title(html, video_id),
        uploader: metadata::resolve_uploader(html),
        formats,
    })
}

/// Facebook video and post extractor. The session is settled when the
/// extractor is built and only read afterwards.
pub struct Extractor<F: Fetcher> {
    fetcher: F,
    session: Session,
}

impl<F: Fetcher> Extractor<F> {
    /// Logs in once if `credentials` are given.
    pub async fn new(fetcher: F, credentials: Option<&Credentials>) -> Self {
        let session = Session::establish(&fetcher, credentials).await;
        Self { fetcher, session }
    }

    pub fn anonymous(fetcher: F) -> Self {
        Self {
            fetcher,
            session: Session::anonymous(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub async fn extract_video(&self, input: &str) -> Result<ResultRecord, ExtractError> {
        let video_id =
            match_video_id(input).ok_or_else(|| ExtractError::InvalidUrl(input.to_string()))?;

        info!("[facebook] {}: Downloading webpage", video_id);
        let request =
            Request::get(format!("{}{}", VIDEO_PAGE_URL, video_id)).user_agent(CHROME_USER_AGENT);
        let html = self.fetcher.fetch(&request).await?;

        extract_from_html(video_id, &html)
    }

    pub async fn extract_post(&self, input: &str) -> Result<PostExpansion, ExtractError> {
        let post_id =
            match_post_id(input).ok_or_else(|| ExtractError::InvalidUrl(input.to_string()))?;

        info!("[facebook:post] {}: Downloading webpage", post_id);
        let html = self.fetcher.fetch(&Request::get(input)).await?;

        Ok(post::expand(post_id, &html)?)
    }

    /// Expands the post, then extracts each video in turn. A failing video
    /// does not stop the others.
    pub async fn extract_post_videos(
        &self,
        input: &str,
    ) -> Result<Vec<(String, Result<ResultRecord, ExtractError>)>, ExtractError> {
        let expansion = self.extract_post(input).await?;
        info!(
            "[facebook:post] {}: Found {} videos",
            expansion.post_id,
            expansion.video_ids.len()
        );

        let mut results = Vec::with_capacity(expansion.video_ids.len());
        for (video_id, entry) in expansion.video_ids.iter().zip(expansion.entries()) {
            let result = self.extract_video(&entry).await;
            if let Err(e) = &result {
                warn!("[facebook] {}: {}", video_id, e);
            }
            results.push((video_id.clone(), result));
        }

        Ok(results)
    }
}
