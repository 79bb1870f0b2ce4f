//! Image extraction from provider replies.
//!
//! Each dialect owns an ordered list of strategies. Strategies are tried in
//! order and the first one that yields an image wins.

use std::sync::LazyLock;

use banana_contracts::ProviderDialect;
use regex::Regex;
use serde_json::Value;

use crate::error::GenerationError;

pub const OUTPUT_PREFIX: &str = "sd_banana_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractedImage {
    /// Base64 image bytes carried in the response body.
    Inline(String),
    /// Provider-hosted image that still has to be downloaded.
    Remote(String),
}

impl ExtractedImage {
    /// Extension for the persisted file. Only remote `.webp` URLs differ from png.
    pub fn file_extension(&self) -> &'static str {
        match self {
            Self::Remote(url) if url.to_ascii_lowercase().contains(".webp") => "webp",
            _ => "png",
        }
    }
}

pub type ExtractionStrategy = fn(&Value) -> Option<ExtractedImage>;

const OPENROUTER_STRATEGIES: &[(&str, ExtractionStrategy)] =
    &[("message_images", openrouter_message_image)];

const GENERATE_CONTENT_STRATEGIES: &[(&str, ExtractionStrategy)] =
    &[("first_inline_part", first_inline_part)];

const GPTGOD_STRATEGIES: &[(&str, ExtractionStrategy)] = &[
    ("image_field", top_level_image),
    ("images_array", first_images_entry),
    ("data_url", first_data_url),
    ("message_content_link", message_content_link),
];

/// Named strategies for `dialect`, in precedence order.
pub fn extraction_strategies(dialect: ProviderDialect) -> &'static [(&'static str, ExtractionStrategy)] {
    match dialect {
        ProviderDialect::OpenRouter => OPENROUTER_STRATEGIES,
        ProviderDialect::GoogleOfficial | ProviderDialect::Gemini => GENERATE_CONTENT_STRATEGIES,
        ProviderDialect::GptGod => GPTGOD_STRATEGIES,
    }
}

pub fn extract_image(
    response: &Value,
    dialect: ProviderDialect,
) -> Result<ExtractedImage, GenerationError> {
    extraction_strategies(dialect)
        .iter()
        .find_map(|(name, strategy)| {
            let image = strategy(response)?;
            tracing::debug!(%dialect, strategy = *name, "image located in response");
            Some(image)
        })
        .ok_or(GenerationError::Extraction)
}

/// `sd_banana_<stamp>.<ext>` where `stamp` is minute-resolution local time.
pub fn output_file_name(image: &ExtractedImage, stamp: &str) -> String {
    format!("{OUTPUT_PREFIX}{stamp}.{}", image.file_extension())
}

fn openrouter_message_image(response: &Value) -> Option<ExtractedImage> {
    let url = response
        .pointer("/choices/0/message/images/0/image_url/url")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|url| !url.is_empty())?;
    if url.starts_with("data:image") {
        let (_, payload) = url.split_once(";base64,")?;
        return Some(ExtractedImage::Inline(payload.to_string()));
    }
    Some(ExtractedImage::Remote(url.to_string()))
}

/// First part carrying inline data; later parts are never considered.
fn first_inline_part(response: &Value) -> Option<ExtractedImage> {
    let parts = response
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)?;
    let inline = parts
        .iter()
        .find_map(|part| part.get("inlineData").or_else(|| part.get("inline_data")))?;
    inline
        .get("data")
        .and_then(Value::as_str)
        .filter(|data| !data.is_empty())
        .map(|data| ExtractedImage::Inline(data.to_string()))
}

fn top_level_image(response: &Value) -> Option<ExtractedImage> {
    non_empty_str(response.get("image")).map(ExtractedImage::Remote)
}

fn first_images_entry(response: &Value) -> Option<ExtractedImage> {
    non_empty_str(response.pointer("/images/0")).map(ExtractedImage::Remote)
}

fn first_data_url(response: &Value) -> Option<ExtractedImage> {
    non_empty_str(response.pointer("/data/0/url")).map(ExtractedImage::Remote)
}

fn message_content_link(response: &Value) -> Option<ExtractedImage> {
    let content = message_content_text(response)?;
    find_image_link(&content).map(ExtractedImage::Remote)
}

/// Message content as text; array-of-parts content is flattened to its text parts.
fn message_content_text(response: &Value) -> Option<String> {
    let content = response.pointer("/choices/0/message/content")?;
    match content {
        Value::String(text) => Some(text.clone()),
        Value::Array(parts) => {
            let joined = parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<Vec<&str>>()
                .join("\n");
            (!joined.is_empty()).then_some(joined)
        }
        _ => None,
    }
}

static MARKDOWN_IMAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[.*?\]\((https?://[^)]+)\)").expect("valid markdown image regex"));

static BARE_IMAGE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(https?://\S+\.(png|jpg|jpeg|webp|gif))").expect("valid image url regex")
});

/// Markdown image link first, then a bare URL ending in a known image extension.
pub fn find_image_link(text: &str) -> Option<String> {
    MARKDOWN_IMAGE
        .captures(text)
        .or_else(|| BARE_IMAGE_URL.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|found| found.as_str().to_string())
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}
