use std::cmp::Ordering;

use serde::Serialize;

use crate::{dash, util, video_data::VideoData};

pub const PROGRESSIVE: &str = "progressive";
pub const PROGRESSIVE_PREFERENCE: i32 = -10;
pub const DEFAULT_PREFERENCE: i32 = 0;

const QUALITIES: [&str; 2] = ["sd", "hd"];
const SOURCES: [&str; 2] = ["src", "src_no_ratelimit"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormatCandidate {
    pub format_id: String,
    pub url: String,
    pub preference: i32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
    /// Total bitrate in kbit/s.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tbr: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vcodec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acodec: Option<String>,
}

impl FormatCandidate {
    pub fn new(format_id: impl Into<String>, url: impl Into<String>, preference: i32) -> Self {
        Self {
            format_id: format_id.into(),
            url: url.into(),
            preference,
            ext: None,
            mime_type: None,
            width: None,
            height: None,
            fps: None,
            tbr: None,
            vcodec: None,
            acodec: None,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Cannot find video formats")]
pub struct NoFormats;

pub fn preference_for(stream_type: &str) -> i32 {
    if stream_type == PROGRESSIVE {
        PROGRESSIVE_PREFERENCE
    } else {
        DEFAULT_PREFERENCE
    }
}

fn push_unique(formats: &mut Vec<FormatCandidate>, format: FormatCandidate) {
    if formats.iter().any(|f| f.format_id == format.format_id) {
        debug!("Dropping duplicate format {}", format.format_id);
        return;
    }
    formats.push(format);
}

fn compare_formats(a: &FormatCandidate, b: &FormatCandidate) -> Ordering {
    b.preference
        .cmp(&a.preference)
        .then_with(|| b.height.cmp(&a.height))
        .then_with(|| b.tbr.partial_cmp(&a.tbr).unwrap_or(Ordering::Equal))
        .then_with(|| b.fps.partial_cmp(&a.fps).unwrap_or(Ordering::Equal))
}

pub fn sort_formats(formats: &mut [FormatCandidate]) {
    formats.sort_by(compare_formats);
}

/// Lists every playable stream in `video_data`, recommended default first.
///
/// Only the first descriptor of each stream type is used; the rest are
/// alternates of the same stream.
pub fn enumerate(video_data: &VideoData) -> Result<Vec<FormatCandidate>, NoFormats> {
    let mut formats = Vec::new();

    for (stream_type, variants) in video_data.iter() {
        let Some(variant) = variants.first() else {
            continue;
        };
        if variants.len() > 1 {
            debug!(
                "Ignoring {} alternate {} descriptors",
                variants.len() - 1,
                stream_type
            );
        }

        let preference = preference_for(stream_type);
        for quality in QUALITIES {
            for source in SOURCES {
                if let Some(src) = variant.get_str(&format!("{}_{}", quality, source)) {
                    push_unique(
                        &mut formats,
                        FormatCandidate::new(
                            format!("{}_{}_{}", stream_type, quality, source),
                            src,
                            preference,
                        ),
                    );
                }
            }
        }

        if let Some(manifest) = variant.dash_manifest() {
            match dash::parse_formats(&util::unquote_plus(manifest)) {
                Ok(dash_formats) => {
                    for format in dash_formats {
                        push_unique(&mut formats, format);
                    }
                }
                Err(e) => warn!("Could not parse DASH manifest of {}: {}", stream_type, e),
            }
        }
    }

    if formats.is_empty() {
        return Err(NoFormats);
    }

    sort_formats(&mut formats);
    Ok(formats)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::util::testing::get_test_html;

    fn video_data(value: serde_json::Value) -> VideoData {
        VideoData::from_value(&value)
    }

    fn manifest_param() -> String {
        let xml = get_test_html("dash_manifest.xml");
        urlencoding::encode(&xml).replace("%20", "+")
    }

    #[test]
    fn single_progressive_source() {
        let data = video_data(json!([
            {"stream_type": "progressive", "sd_src": "http://x/a.mp4"}
        ]));

        let formats = enumerate(&data).expect("formats");

        assert_eq!(formats, vec![FormatCandidate::new("progressive_sd_src", "http://x/a.mp4", -10)]);
    }

    #[test]
    fn all_quality_and_source_combinations() {
        let data = video_data(json!([{
            "stream_type": "progressive",
            "sd_src": "http://x/sd.mp4",
            "sd_src_no_ratelimit": "http://x/sd_nrl.mp4",
            "hd_src": "http://x/hd.mp4",
            "hd_src_no_ratelimit": "http://x/hd_nrl.mp4",
            "hd_tag": "ignored"
        }]));

        let ids: Vec<_> = enumerate(&data)
            .expect("formats")
            .into_iter()
            .map(|f| f.format_id)
            .collect();

        assert_eq!(
            ids,
            vec![
                "progressive_sd_src",
                "progressive_sd_src_no_ratelimit",
                "progressive_hd_src",
                "progressive_hd_src_no_ratelimit",
            ]
        );
    }

    #[test]
    fn only_first_variant_used() {
        let data = video_data(json!([
            {"stream_type": "other", "sd_src": "http://x/first.mp4"},
            {"stream_type": "other", "sd_src": "http://x/second.mp4", "hd_src": "http://x/hd.mp4"}
        ]));

        let formats = enumerate(&data).expect("formats");

        assert_eq!(formats.len(), 1);
        assert_eq!(formats[0].url, "http://x/first.mp4");
        assert_eq!(formats[0].preference, 0);
    }

    #[test]
    fn progressive_ranks_below_others() {
        let data = video_data(json!([
            {"stream_type": "progressive", "hd_src": "http://x/p_hd.mp4"},
            {"stream_type": "dash_sd", "sd_src": "http://x/d_sd.mp4"}
        ]));

        let formats = enumerate(&data).expect("formats");

        assert_eq!(formats[0].format_id, "dash_sd_sd_src");
        let worst_other = formats
            .iter()
            .filter(|f| !f.format_id.starts_with(PROGRESSIVE))
            .map(|f| f.preference)
            .min()
            .unwrap();
        assert!(formats
            .iter()
            .filter(|f| f.format_id.starts_with(PROGRESSIVE))
            .all(|f| f.preference < worst_other));
    }

    #[test]
    fn dash_manifest_formats() {
        let data = video_data(json!([{
            "stream_type": "dash",
            "sd_src": "http://x/sd.mp4",
            "dash_manifest": manifest_param()
        }]));

        let formats = enumerate(&data).expect("formats");

        assert_eq!(formats.len(), 4);
        assert_eq!(formats[0].format_id, "1080p_v", "highest resolution first");
        assert_eq!(formats[0].url, "https://video.xx.fbcdn.net/v/1080.mp4?efg=a&oh=b");
        assert!(formats.iter().any(|f| f.format_id == "dash_sd_src"));
        assert!(formats.iter().any(|f| f.format_id == "audio_a"));
    }

    #[test]
    fn manifest_under_progressive_keeps_default_preference() {
        let data = video_data(json!([
            {
                "stream_type": "progressive",
                "sd_src": "http://x/p_sd.mp4",
                "dash_manifest": manifest_param()
            },
            {"stream_type": "other", "sd_src": "http://x/o_sd.mp4"}
        ]));

        let formats = enumerate(&data).expect("formats");

        let ids: Vec<_> = formats.iter().map(|f| f.format_id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["1080p_v", "360p_v", "audio_a", "other_sd_src", "progressive_sd_src"]
        );
        for id in ["1080p_v", "360p_v", "audio_a"] {
            let format = formats.iter().find(|f| f.format_id == id).unwrap();
            assert_eq!(format.preference, DEFAULT_PREFERENCE, "{}", id);
        }
        let last = formats.last().unwrap();
        assert_eq!(last.format_id, "progressive_sd_src");
        assert_eq!(last.preference, PROGRESSIVE_PREFERENCE);
    }

    #[test]
    fn duplicate_manifest_ids_dropped() {
        let data = video_data(json!({
            "dash_a": [{"dash_manifest": manifest_param()}],
            "dash_b": [{"dash_manifest": manifest_param()}]
        }));

        let formats = enumerate(&data).expect("formats");

        let mut ids: Vec<_> = formats.iter().map(|f| f.format_id.as_str()).collect();
        let total = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), total);
        assert_eq!(total, 3);
    }

    #[test]
    fn broken_manifest_is_skipped() {
        let data = video_data(json!([{
            "stream_type": "dash",
            "hd_src": "http://x/hd.mp4",
            "dash_manifest": "%3CMPD%3E%3CRepresentation+id%3D%221%22%3E"
        }]));

        let formats = enumerate(&data).expect("formats");

        assert_eq!(formats.len(), 1);
        assert_eq!(formats[0].format_id, "dash_hd_src");
    }

    #[test]
    fn no_sources_is_no_formats() {
        let data = video_data(json!([
            {"stream_type": "progressive", "thumbnail_src": "http://x/t.jpg"}
        ]));

        assert_eq!(enumerate(&data), Err(NoFormats));
        assert_eq!(enumerate(&VideoData::default()), Err(NoFormats));
    }
}
