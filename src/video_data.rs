use std::{collections::BTreeMap, sync::LazyLock};

use regex::Regex;
use serde_json::{Map, Value};

use crate::util;

/// One raw stream descriptor. The shape depends on the page variant that
/// produced it, so it stays an open JSON object. Keys read by this crate are
/// `stream_type`, `{sd,hd}_{src,src_no_ratelimit}` and `dash_manifest`; all
/// others are ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamVariant(Map<String, Value>);

impl StreamVariant {
    pub fn from_value(value: &Value) -> Option<Self> {
        value.as_object().map(|m| Self(m.clone()))
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key)?.as_str().filter(|s| !s.is_empty())
    }

    pub fn stream_type(&self) -> Option<&str> {
        self.get_str("stream_type")
    }

    pub fn dash_manifest(&self) -> Option<&str> {
        self.get_str("dash_manifest")
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct VideoData {
    streams: BTreeMap<String, Vec<StreamVariant>>,
}

impl VideoData {
    pub fn from_list(items: &[Value]) -> Self {
        let mut streams: BTreeMap<String, Vec<StreamVariant>> = BTreeMap::new();

        for item in items {
            let Some(variant) = StreamVariant::from_value(item) else {
                continue;
            };
            let Some(stream_type) = variant.stream_type().map(str::to_owned) else {
                debug!("Skipping stream descriptor without stream_type");
                continue;
            };
            streams.entry(stream_type).or_default().push(variant);
        }

        Self { streams }
    }

    /// Accepts either a flat descriptor list or an object already keyed by
    /// stream type.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Array(items) => Self::from_list(items),
            Value::Object(buckets) => {
                let streams = buckets
                    .iter()
                    .filter(|(stream_type, _)| !stream_type.is_empty())
                    .filter_map(|(stream_type, bucket)| {
                        let variants: Vec<_> = bucket
                            .as_array()?
                            .iter()
                            .filter_map(StreamVariant::from_value)
                            .collect();
                        (!variants.is_empty()).then(|| (stream_type.clone(), variants))
                    })
                    .collect();
                Self { streams }
            }
            _ => Self::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn get(&self, stream_type: &str) -> Option<&[StreamVariant]> {
        self.streams.get(stream_type).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[StreamVariant])> {
        self.streams
            .iter()
            .map(|(stream_type, variants)| (stream_type.as_str(), variants.as_slice()))
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LocateError {
    #[error("The video is not available, Facebook said: \"{0}\"")]
    Gated(String),
    #[error("Cannot parse data")]
    Unparsable,
}

pub type Strategy = fn(&str) -> Option<VideoData>;

/// Tried in order; the first non-empty result wins. The player params layout
/// predates the server-rendered one and takes precedence when both are
/// present.
pub const STRATEGIES: &[(&str, Strategy)] = &[
    ("player params", from_player_params),
    ("server js", from_server_js),
];

const PARAMS_BEFORE: &str = "{swf.addParam(param[0], param[1]);});\n";
const PARAMS_AFTER: &str =
    ".forEach(function(variable) {swf.addVariable(variable[0], variable[1]);});";

static RE_PLAYER_PARAMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        "{}(.*?){}",
        regex::escape(PARAMS_BEFORE),
        regex::escape(PARAMS_AFTER)
    ))
    .expect("valid player params pattern")
});
static RE_SERVER_JS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"handleServerJS\((\{.+\})\);").expect("valid server js pattern")
});
static RE_INTERSTITIAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"class="[^"]*uiInterstitialContent[^"]*"><div>(.*?)</div>"#)
        .expect("valid interstitial pattern")
});

/// Flash player variables: a JSON list of `[name, value]` pairs whose
/// `params` entry is percent-encoded JSON holding `video_data`.
pub fn from_player_params(html: &str) -> Option<VideoData> {
    let raw = RE_PLAYER_PARAMS.captures(html)?.get(1)?.as_str();
    let pairs: Vec<(String, Value)> = serde_json::from_str(raw).ok()?;

    // Later duplicates override earlier ones.
    let (_, params) = pairs.iter().rev().find(|(name, _)| name == "params")?;
    let params: Value = serde_json::from_str(&util::unquote(params.as_str()?)).ok()?;

    Some(VideoData::from_value(params.get("video_data")?)).filter(|d| !d.is_empty())
}

/// Server-rendered page: the `VideoConfig` instance inside the
/// `handleServerJS` payload.
pub fn from_server_js(html: &str) -> Option<VideoData> {
    let raw = RE_SERVER_JS.captures(html)?.get(1)?.as_str();
    let data: Value = serde_json::from_str(raw).ok()?;

    data.get("instances")?
        .as_array()?
        .iter()
        .find(|instance| instance[1][0] == "VideoConfig")
        .map(|instance| VideoData::from_value(&instance[2][0]["videoData"]))
        .filter(|d| !d.is_empty())
}

fn interstitial_message(html: &str) -> Option<String> {
    let message = RE_INTERSTITIAL.captures(html)?.get(1)?.as_str();
    Some(util::clean_html(message))
}

/// Finds the embedded video data. Only the final outcome is reported: a
/// gated-content message if Facebook showed one, `Unparsable` otherwise.
pub fn locate(html: &str) -> Result<VideoData, LocateError> {
    for (name, strategy) in STRATEGIES {
        if let Some(video_data) = strategy(html) {
            debug!("Found video data using {} strategy", name);
            return Ok(video_data);
        }
        debug!("No video data from {} strategy", name);
    }

    match interstitial_message(html) {
        Some(message) => Err(LocateError::Gated(message)),
        None => Err(LocateError::Unparsable),
    }
}

#[cfg(test)]
pub(crate) fn player_params_html(params: &Value) -> String {
    let encoded = urlencoding::encode(&params.to_string()).into_owned();
    let pairs = serde_json::json!([["params", encoded], ["width", "720"]]);
    format!("<script>[].forEach(function(param) {PARAMS_BEFORE}{pairs}{PARAMS_AFTER}</script>")
}
