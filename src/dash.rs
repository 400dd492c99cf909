use quick_xml::{
    events::{BytesStart, Event},
    Reader,
};
use std::str::FromStr;

use crate::formats::{FormatCandidate, DEFAULT_PREFERENCE};

#[derive(Debug, Default)]
struct AdaptationSet {
    mime_type: Option<String>,
    codecs: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Representation {
    pub id: String,
    pub mime_type: Option<String>,
    pub codecs: Option<String>,
    pub bandwidth: Option<i64>,
    pub base_url: String,

    pub width: Option<i64>,
    pub height: Option<i64>,
    pub frame_rate: Option<f64>,
}

fn get_attr<T>(e: &BytesStart, attr: &str) -> Option<T>
where
    T: FromStr,
{
    e.try_get_attribute(attr)
        .ok()?
        .and_then(|a| a.unescape_value().ok()?.parse().ok())
}

/// `frameRate` is either a plain number or a `num/den` fraction.
fn parse_frame_rate(value: &str) -> Option<f64> {
    match value.split_once('/') {
        Some((num, den)) => {
            let (num, den) = (num.parse::<f64>().ok()?, den.parse::<f64>().ok()?);
            (den != 0.0).then(|| num / den)
        }
        None => value.parse().ok(),
    }
}

fn mime_type_to_ext(mime_type: &str) -> Option<&'static str> {
    match mime_type {
        "video/mp4" => Some("mp4"),
        "audio/mp4" => Some("m4a"),
        "video/webm" | "audio/webm" => Some("webm"),
        _ => None,
    }
}

impl Representation {
    fn from_start_event(
        e: BytesStart,
        adaptation_set: &AdaptationSet,
        reader: &mut Reader<&[u8]>,
    ) -> Result<Self, quick_xml::Error> {
        let mut repr = Self {
            id: get_attr(&e, "id").ok_or(quick_xml::Error::TextNotFound)?,
            mime_type: get_attr(&e, "mimeType").or_else(|| adaptation_set.mime_type.clone()),
            codecs: get_attr(&e, "codecs").or_else(|| adaptation_set.codecs.clone()),
            bandwidth: get_attr(&e, "bandwidth"),
            base_url: String::default(),

            width: get_attr(&e, "width"),
            height: get_attr(&e, "height"),
            frame_rate: get_attr::<String>(&e, "frameRate").and_then(|f| parse_frame_rate(&f)),
        };

        let mut is_base_url_tag = false;
        loop {
            match reader.read_event()? {
                Event::Start(e) => is_base_url_tag = e.name().as_ref() == b"BaseURL",
                Event::Text(e) => {
                    if is_base_url_tag {
                        repr.base_url = e
                            .unescape()
                            .ok()
                            .map(|u| u.trim().to_string())
                            .unwrap_or_default();
                    }
                }
                Event::End(e) => {
                    is_base_url_tag = false;
                    if e.name().as_ref() == b"Representation" {
                        break;
                    }
                }
                Event::Eof => return Err(quick_xml::Error::UnexpectedEof("Representation".into())),
                _ => (),
            }
        }

        Ok(repr)
    }

    /// Media kind from the MIME type, e.g. `video` or `audio`.
    fn content_type(&self) -> Option<&str> {
        self.mime_type.as_deref()?.split('/').next()
    }

    pub fn to_format(&self) -> FormatCandidate {
        let mut format = FormatCandidate::new(&self.id, &self.base_url, DEFAULT_PREFERENCE);
        format.ext = self
            .mime_type
            .as_deref()
            .and_then(mime_type_to_ext)
            .map(str::to_string);
        format.mime_type = self.mime_type.clone();
        format.width = self.width;
        format.height = self.height;
        format.fps = self.frame_rate;
        format.tbr = self.bandwidth.map(|b| b as f64 / 1000.0);

        match self.content_type() {
            Some("audio") => {
                format.acodec = self.codecs.clone();
                format.vcodec = Some("none".to_string());
            }
            Some("video") => {
                format.vcodec = self.codecs.clone();
            }
            _ => (),
        }

        format
    }
}

pub fn parse_manifest(manifest: &str) -> Result<Vec<Representation>, quick_xml::Error> {
    let mut reader = Reader::from_str(manifest);
    reader.trim_text(true);

    let mut adaptation_set = AdaptationSet::default();
    let mut representations = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Eof => break,
            Event::Start(e) => match e.name().as_ref() {
                b"AdaptationSet" => {
                    adaptation_set = AdaptationSet {
                        mime_type: get_attr(&e, "mimeType"),
                        codecs: get_attr(&e, "codecs"),
                    };
                }
                b"Representation" => {
                    representations.push(Representation::from_start_event(
                        e,
                        &adaptation_set,
                        &mut reader,
                    )?);
                }
                _ => (),
            },
            Event::End(e) => {
                if e.name().as_ref() == b"AdaptationSet" {
                    adaptation_set = AdaptationSet::default();
                }
            }
            _ => (),
        }
    }

    Ok(representations)
}

/// Playable formats of an MPD document. Representations without a
/// `BaseURL` are skipped, and every format carries the default preference
/// whatever stream type the manifest was found under.
pub fn parse_formats(manifest: &str) -> Result<Vec<FormatCandidate>, quick_xml::Error> {
    Ok(parse_manifest(manifest)?
        .iter()
        .filter(|r| !r.base_url.is_empty())
        .map(Representation::to_format)
        .collect())
}

#[cfg(test)]
mod tests {
    use crate::util::testing::get_test_html;

    #[test]
    fn parse_manifest() {
        let test_string = get_test_html("dash_manifest.xml");

        let representations =
            super::parse_manifest(&test_string).expect("Could not parse manifest");

        assert_eq!(representations.len(), 4, "Unexpected representation count");
        let hd = &representations[0];
        assert_eq!(hd.id, "1080p_v");
        assert_eq!(hd.mime_type.as_deref(), Some("video/mp4"));
        assert_eq!(hd.codecs.as_deref(), Some("avc1.640028"));
        assert_eq!(hd.height, Some(1080));
        assert_eq!(hd.frame_rate, Some(30.0));
        assert_eq!(
            hd.base_url,
            "https://video.xx.fbcdn.net/v/1080.mp4?efg=a&oh=b"
        );

        let sd = &representations[1];
        assert_eq!(sd.codecs.as_deref(), Some("avc1.4d401e"), "codecs inherited");
        assert!((sd.frame_rate.unwrap() - 29.97).abs() < 0.01);
    }

    #[test]
    fn parse_formats() {
        let test_string = get_test_html("dash_manifest.xml");

        let formats = super::parse_formats(&test_string).expect("Could not parse manifest");

        // The representation without a BaseURL has nothing to download.
        assert_eq!(formats.len(), 3);
        assert!(formats.iter().all(|f| f.preference == 0));
        let audio = formats.iter().find(|f| f.format_id == "audio_a").unwrap();
        assert_eq!(audio.ext.as_deref(), Some("m4a"));
        assert_eq!(audio.vcodec.as_deref(), Some("none"));
        assert_eq!(audio.acodec.as_deref(), Some("mp4a.40.5"));
        assert_eq!(audio.tbr, Some(64.0));

        let video = formats.iter().find(|f| f.format_id == "1080p_v").unwrap();
        assert_eq!(video.ext.as_deref(), Some("mp4"));
        assert_eq!(video.width, Some(1920));
        assert_eq!(video.vcodec.as_deref(), Some("avc1.640028"));
    }

    #[test]
    fn truncated_manifest() {
        let xml = r#"<MPD><Period><AdaptationSet><Representation id="1" bandwidth="1">"#;
        assert!(super::parse_manifest(xml).is_err());
    }

    #[test]
    fn frame_rates() {
        assert_eq!(super::parse_frame_rate("25"), Some(25.0));
        assert_eq!(super::parse_frame_rate("30/1"), Some(30.0));
        assert_eq!(super::parse_frame_rate("30/0"), None);
        assert_eq!(super::parse_frame_rate("abc"), None);
    }
}
