//! Per-dialect wire request construction.
//!
//! Aspect ratio is pinned to `1:1` for every dialect: generated textures are
//! always square tiles.

use std::collections::BTreeMap;
use std::path::Path;

use banana_contracts::{ConnectionProfile, GenerationRequest, ProviderDialect, Resolution};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{json, Value};

use crate::error::GenerationError;

pub const SQUARE_ASPECT_RATIO: &str = "1:1";

const GPTGOD_TIERED_MODEL: &str = "gemini-3-pro-image-preview";

/// Fully resolved HTTP POST for one generation attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct WireRequest {
    pub dialect: ProviderDialect,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Value,
}

/// Base64 payload of the optional reference image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputImage {
    pub mime_type: &'static str,
    pub data: String,
}

impl InputImage {
    pub fn load(path: &Path) -> Result<Self, GenerationError> {
        let bytes = std::fs::read(path).map_err(|source| GenerationError::InputImage {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            mime_type: mime_for_path(path),
            data: BASE64.encode(bytes),
        })
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// MIME type from the file extension alone; content is never inspected.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "webp" => "image/webp",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "image/png",
    }
}

/// Validates the profile, loads the input image (if any) and builds the request.
pub fn build_request(
    request: &GenerationRequest,
    profile: &ConnectionProfile,
) -> Result<WireRequest, GenerationError> {
    if !profile.has_credentials() {
        return Err(GenerationError::Configuration);
    }
    let input = request
        .input_image_path
        .as_deref()
        .map(InputImage::load)
        .transpose()?;
    build_request_with_input(request, profile, input.as_ref())
}

/// Same as [`build_request`] with the input image already encoded.
pub fn build_request_with_input(
    request: &GenerationRequest,
    profile: &ConnectionProfile,
    input: Option<&InputImage>,
) -> Result<WireRequest, GenerationError> {
    if !profile.has_credentials() {
        return Err(GenerationError::Configuration);
    }
    let dialect = ProviderDialect::classify(&request.provider_name, &profile.base_url);
    let wire = match dialect {
        ProviderDialect::OpenRouter => openrouter_request(request, profile, input),
        ProviderDialect::GoogleOfficial => google_official_request(request, profile, input),
        ProviderDialect::GptGod => gptgod_request(request, profile, input),
        ProviderDialect::Gemini => gemini_request(request, profile, input),
    };
    Ok(wire)
}

/// GPTGod exposes higher tiers of the Gemini image model as separate model ids.
pub fn gptgod_model(base_url: &str, model: &str, resolution: Resolution) -> String {
    if !base_url.contains("gptgod.online") || model != GPTGOD_TIERED_MODEL {
        return model.to_string();
    }
    match resolution {
        Resolution::OneK => model.to_string(),
        Resolution::TwoK => format!("{model}-2k"),
        Resolution::FourK => format!("{model}-4k"),
    }
}

fn openrouter_request(
    request: &GenerationRequest,
    profile: &ConnectionProfile,
    input: Option<&InputImage>,
) -> WireRequest {
    let body = json!({
        "model": profile.model,
        "messages": [{
            "role": "user",
            "content": chat_content(&request.prompt, input),
        }],
        "modalities": ["image", "text"],
        "image_config": {
            "aspect_ratio": SQUARE_ASPECT_RATIO,
            "image_size": request.resolution.as_str(),
        },
    });
    WireRequest {
        dialect: ProviderDialect::OpenRouter,
        url: profile.base_url.clone(),
        headers: bearer_headers(&profile.api_key),
        body,
    }
}

fn google_official_request(
    request: &GenerationRequest,
    profile: &ConnectionProfile,
    input: Option<&InputImage>,
) -> WireRequest {
    let generation_config = json!({
        "response_modalities": ["IMAGE"],
        "image_config": {
            "aspect_ratio": SQUARE_ASPECT_RATIO,
            "image_size": request.resolution.as_str(),
        },
    });
    WireRequest {
        dialect: ProviderDialect::GoogleOfficial,
        url: generate_content_url(profile),
        headers: json_headers(),
        body: generate_content_body(request, input, generation_config),
    }
}

fn gemini_request(
    request: &GenerationRequest,
    profile: &ConnectionProfile,
    input: Option<&InputImage>,
) -> WireRequest {
    let generation_config = json!({
        "responseModalities": ["image"],
        "imageConfig": {
            "aspectRatio": SQUARE_ASPECT_RATIO,
            "imageSize": request.resolution.as_str(),
        },
    });
    WireRequest {
        dialect: ProviderDialect::Gemini,
        url: generate_content_url(profile),
        headers: json_headers(),
        body: generate_content_body(request, input, generation_config),
    }
}

fn gptgod_request(
    request: &GenerationRequest,
    profile: &ConnectionProfile,
    input: Option<&InputImage>,
) -> WireRequest {
    let model = gptgod_model(&profile.base_url, &profile.model, request.resolution);
    let body = json!({
        "model": model,
        "messages": [{
            "role": "user",
            "content": chat_content(&request.prompt, input),
        }],
        "stream": false,
    });
    WireRequest {
        dialect: ProviderDialect::GptGod,
        url: profile.base_url.clone(),
        headers: bearer_headers(&profile.api_key),
        body,
    }
}

/// Plain prompt string, or a text + image_url pair when an input image is attached.
fn chat_content(prompt: &str, input: Option<&InputImage>) -> Value {
    match input {
        None => Value::String(prompt.to_string()),
        Some(image) => json!([
            { "type": "text", "text": prompt },
            { "type": "image_url", "image_url": { "url": image.data_url() } },
        ]),
    }
}

fn generate_content_url(profile: &ConnectionProfile) -> String {
    let base = profile
        .base_url
        .strip_suffix('/')
        .unwrap_or(&profile.base_url);
    format!(
        "{base}/models/{}:generateContent?key={}",
        profile.model, profile.api_key
    )
}

fn generate_content_body(
    request: &GenerationRequest,
    input: Option<&InputImage>,
    generation_config: Value,
) -> Value {
    let mut parts = vec![json!({ "text": request.prompt })];
    if let Some(image) = input {
        parts.push(json!({
            "inline_data": {
                "mime_type": image.mime_type,
                "data": image.data,
            }
        }));
    }
    let mut body = json!({
        "contents": [{ "parts": parts }],
        "generationConfig": generation_config,
    });
    if request.search_web {
        body["tools"] = json!([{ "google_search": {} }]);
    }
    body
}

fn json_headers() -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    headers.insert("Content-Type".to_string(), "application/json".to_string());
    headers
}

fn bearer_headers(api_key: &str) -> BTreeMap<String, String> {
    let mut headers = json_headers();
    headers.insert("Authorization".to_string(), format!("Bearer {api_key}"));
    headers
}
