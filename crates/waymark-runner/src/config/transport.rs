//! Carrying a tutorial across page loads: inline payloads, base64 URL
//! parameters, and the session-storage key layout.

use super::schema::Tutorial;
use crate::{Error, Result};
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use url::Url;

/// URL parameter holding the step index to resume at.
pub const STEP_PARAM: &str = "_wm_step";

/// URL parameter holding the base64 compact tutorial.
pub const DATA_PARAM: &str = "_wm_data";

/// Id of the `<script type="application/json">` element a host page embeds
/// its tutorial in.
pub const EMBED_ID: &str = "waymark-tutorial";

const LENIENT: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);

/// Compact JSON payload for embedding.
pub fn encode_compact(tutorial: &Tutorial) -> Result<String> {
    Ok(serde_json::to_string(&tutorial.to_compact())?)
}

/// Base64 of the compact JSON.
pub fn encode_base64(tutorial: &Tutorial) -> Result<String> {
    Ok(STANDARD.encode(encode_compact(tutorial)?))
}

/// Script element embedding the compact payload in a host page.
pub fn embed_script(tutorial: &Tutorial) -> Result<String> {
    // `</` would close the script element early; `<\/` is the same JSON.
    let json = encode_compact(tutorial)?.replace("</", "<\\/");
    Ok(format!(
        r#"<script type="application/json" id="{}">{}</script>"#,
        EMBED_ID, json
    ))
}

/// Decode a base64 payload (standard or URL-safe alphabet, padding optional).
pub fn decode_base64(data: &str) -> Result<Tutorial> {
    let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = URL_SAFE_LENIENT
        .decode(&cleaned)
        .or_else(|_| STANDARD_LENIENT.decode(&cleaned))
        .map_err(|e| Error::Transport(format!("bad base64: {}", e)))?;
    let json = String::from_utf8(bytes)
        .map_err(|e| Error::Transport(format!("payload is not UTF-8: {}", e)))?;
    Tutorial::from_json(&json)
}

/// `base` with the resume parameters set, replacing any previous values.
pub fn with_resume_params(base: &str, step: usize, tutorial: &Tutorial) -> Result<String> {
    let mut url =
        Url::parse(base).map_err(|e| Error::Transport(format!("bad url {}: {}", base, e)))?;
    let data = encode_base64(tutorial)?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != STEP_PARAM && k != DATA_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    {
        let mut q = url.query_pairs_mut();
        q.clear();
        for (k, v) in &kept {
            q.append_pair(k, v);
        }
        q.append_pair(STEP_PARAM, &step.to_string());
        q.append_pair(DATA_PARAM, &data);
    }
    Ok(url.to_string())
}

/// What a page URL carries for playback.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResumeParams {
    pub step: Option<usize>,
    pub tutorial: Option<Tutorial>,
}

/// Read the resume parameters from a page URL. A URL without them yields
/// the default; a present but undecodable payload is an error.
pub fn resume_params(page_url: &str) -> Result<ResumeParams> {
    let Ok(url) = Url::parse(page_url) else {
        return Ok(ResumeParams::default());
    };
    let mut out = ResumeParams::default();
    for (k, v) in url.query_pairs() {
        if k == STEP_PARAM {
            out.step = v.trim().parse().ok();
        } else if k == DATA_PARAM {
            out.tutorial = Some(decode_base64(&v)?);
        }
    }
    Ok(out)
}

/// Decode whatever the user handed us: a URL with resume parameters, raw
/// JSON (either schema), or base64.
pub fn decode_any(input: &str) -> Result<Tutorial> {
    let input = input.trim();
    if input.starts_with('{') {
        return Tutorial::from_json(input);
    }
    if input.starts_with("http://") || input.starts_with("https://") {
        return resume_params(input)?
            .tutorial
            .ok_or_else(|| Error::Transport(format!("no {} parameter in url", DATA_PARAM)));
    }
    decode_base64(input)
}

/// Session storage key layout. Keys are namespaced by a prefix
/// (default `waymark`) and the tutorial's storage id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    prefix: String,
}

impl StorageKeys {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    /// `<prefix>_player_<id>`: the playback session.
    pub fn session(&self, storage_id: &str) -> String {
        format!("{}_player_{}", self.prefix, storage_id)
    }

    /// `<prefix>_player_<id>_data`: the tutorial itself.
    pub fn data(&self, storage_id: &str) -> String {
        format!("{}_data", self.session(storage_id))
    }

    /// `<prefix>_active`: pointer to the storage id of the tutorial being
    /// played. Outside the `_player_` namespace so no tutorial id can collide.
    pub fn active(&self) -> String {
        format!("{}_active", self.prefix)
    }

    /// Owned by the recorder; cleared with the rest on completion.
    pub fn recorder(&self) -> String {
        format!("{}_recorder", self.prefix)
    }
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self::new("waymark")
    }
}
