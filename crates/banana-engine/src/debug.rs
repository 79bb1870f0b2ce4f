//! Debug-mode capture: log-safe redaction plus the unredacted payload on disk.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::Value;

pub const IMAGE_PLACEHOLDER: &str = "<BASE64_IMAGE_DATA>";

/// Clone of `body` with every embedded base64 image replaced by [`IMAGE_PLACEHOLDER`].
///
/// Covers `inline_data.data` / `inlineData.data` parts and `data:` URLs under
/// any `url` key, which spans both request and response shapes of all dialects.
pub fn redacted(body: &Value) -> Value {
    let mut copy = body.clone();
    redact_in_place(&mut copy);
    copy
}

fn redact_in_place(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map.iter_mut() {
                let is_inline = key == "inline_data" || key == "inlineData";
                if is_inline {
                    if let Some(data) = nested.get_mut("data").filter(|data| data.is_string()) {
                        *data = Value::String(IMAGE_PLACEHOLDER.to_string());
                        continue;
                    }
                }
                if key == "url" && nested.as_str().is_some_and(|url| url.starts_with("data:")) {
                    *nested = Value::String(IMAGE_PLACEHOLDER.to_string());
                    continue;
                }
                redact_in_place(nested);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact_in_place),
        _ => {}
    }
}

/// Masks the `key=` query parameter so URLs can be logged.
pub fn mask_api_key(url: &str) -> String {
    let Some((head, query)) = url.split_once('?') else {
        return url.to_string();
    };
    let masked: Vec<String> = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some(("key", _)) => "key=***".to_string(),
            _ => pair.to_string(),
        })
        .collect();
    format!("{head}?{}", masked.join("&"))
}

/// Writes the full request body to `debug_payload_<YYYYMMDDHHMMSS>.json`,
/// suffixing `-N` when a file from the same second already exists.
pub fn write_debug_payload(output_dir: &Path, body: &Value) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed creating {}", output_dir.display()))?;
    let stamp = chrono::Local::now().format("%Y%m%d%H%M%S").to_string();
    let mut path = output_dir.join(format!("debug_payload_{stamp}.json"));
    let mut attempt = 1;
    while path.exists() {
        path = output_dir.join(format!("debug_payload_{stamp}-{attempt}.json"));
        attempt += 1;
    }
    let pretty = serde_json::to_string_pretty(body)?;
    std::fs::write(&path, pretty).with_context(|| format!("failed writing {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{mask_api_key, redacted, write_debug_payload, IMAGE_PLACEHOLDER};

    #[test]
    fn redacts_generate_content_inline_data() {
        let body = json!({
            "contents": [{ "parts": [
                { "text": "tiles" },
                { "inline_data": { "mime_type": "image/png", "data": "AAAA" } },
            ]}],
        });
        let safe = redacted(&body);
        assert_eq!(safe["contents"][0]["parts"][1]["inline_data"]["data"], IMAGE_PLACEHOLDER);
        assert_eq!(safe["contents"][0]["parts"][1]["inline_data"]["mime_type"], "image/png");
        assert_eq!(safe["contents"][0]["parts"][0]["text"], "tiles");
        assert_eq!(body["contents"][0]["parts"][1]["inline_data"]["data"], "AAAA");
    }

    #[test]
    fn redacts_chat_data_urls_but_keeps_remote_urls() {
        let body = json!({
            "messages": [{ "content": [
                { "type": "text", "text": "x" },
                { "type": "image_url", "image_url": { "url": "data:image/png;base64,AAAA" } },
                { "type": "image_url", "image_url": { "url": "https://cdn.example/a.png" } },
            ]}],
        });
        let safe = redacted(&body);
        assert_eq!(safe["messages"][0]["content"][1]["image_url"]["url"], IMAGE_PLACEHOLDER);
        assert_eq!(
            safe["messages"][0]["content"][2]["image_url"]["url"],
            "https://cdn.example/a.png"
        );
    }

    #[test]
    fn redacts_response_inline_data() {
        let response = json!({
            "candidates": [{ "content": { "parts": [
                { "inlineData": { "mimeType": "image/png", "data": "AAAA" } },
            ]}}],
        });
        let safe = redacted(&response);
        assert_eq!(
            safe["candidates"][0]["content"]["parts"][0]["inlineData"]["data"],
            IMAGE_PLACEHOLDER
        );
    }

    #[test]
    fn mask_hides_only_the_key_parameter() {
        assert_eq!(
            mask_api_key("https://x/models/m:generateContent?key=secret"),
            "https://x/models/m:generateContent?key=***"
        );
        assert_eq!(mask_api_key("https://x/a?alt=sse&key=s"), "https://x/a?alt=sse&key=***");
        assert_eq!(mask_api_key("https://x/chat"), "https://x/chat");
    }

    #[test]
    fn debug_payload_is_unredacted_and_unique() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let body = json!({ "inline_data": { "data": "AAAA" } });
        let first = write_debug_payload(temp.path(), &body)?;
        let second = write_debug_payload(temp.path(), &body)?;
        assert_ne!(first, second);

        let name = first.file_name().and_then(|name| name.to_str()).unwrap_or("");
        assert!(name.starts_with("debug_payload_"));
        assert!(name.ends_with(".json"));

        let parsed: Value = serde_json::from_str(&std::fs::read_to_string(&first)?)?;
        assert_eq!(parsed, body);
        Ok(())
    }
}
