use std::sync::LazyLock;

use regex::Regex;

use crate::util;

pub const MAX_CAPTION_TITLE_LENGTH: usize = 80;
const UPLOADER_ELEMENT_ID: &str = "fbPhotoPageAuthorName";

static RE_HEADER_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<h2\s+[^>]*class="uiHeaderTitle"[^>]*>([^<]*)</h2>"#)
        .expect("valid header title pattern")
});
static RE_CAPTION_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<span class="fbPhotosPhotoCaption".*?id="fbPhotoPageCaption"><span class="hasCaption">(.*?)</span>"#)
        .expect("valid caption title pattern")
});

fn search_clean(re: &Regex, html: &str) -> Option<String> {
    let text = util::clean_html(re.captures(html)?.get(1)?.as_str());
    (!text.is_empty()).then_some(text)
}

pub fn default_title(video_id: &str) -> String {
    format!("Facebook video #{}", video_id)
}

/// Video page heading, then photo page caption, then a generated title.
pub fn resolve_title(html: &str, video_id: &str) -> String {
    if let Some(title) = search_clean(&RE_HEADER_TITLE, html) {
        return title;
    }

    if let Some(caption) = search_clean(&RE_CAPTION_TITLE, html) {
        return util::limit_length(&caption, MAX_CAPTION_TITLE_LENGTH);
    }

    debug!("{}: no title found, using default", video_id);
    default_title(video_id)
}

pub fn resolve_uploader(html: &str) -> Option<String> {
    let uploader = util::clean_html(&util::get_element_by_id(UPLOADER_ELEMENT_ID, html)?);
    (!uploader.is_empty()).then_some(uploader)
}
