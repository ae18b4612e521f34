//! Recognized media-provider URLs: detection and title lookup.
//!
//! A text submission that embeds a YouTube or Spotify link becomes a typed
//! entry whose display text is the human-readable title fetched from the
//! provider's public oEmbed endpoint. Lookups fail gracefully: a synthetic
//! placeholder title is substituted so ingestion never blocks on a provider.

use crate::entries::EntryKind;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::time::Duration;

const OEMBED_TIMEOUT: Duration = Duration::from_secs(5);

static SPOTIFY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:https?://)?(?:open\.)?spotify\.com/(track|playlist|album|artist)/([A-Za-z0-9]+)")
        .expect("Failed to compile Spotify regex")
});

static YOUTUBE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:https?://)?(?:www\.)?(?:youtube\.com/watch\?v=|youtu\.be/|youtube\.com/shorts/|youtube\.com/embed/)([A-Za-z0-9_-]{11})",
    )
    .expect("Failed to compile YouTube regex")
});

/// A provider link recognized inside submitted text.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedUrl {
    pub kind: EntryKind,
    /// Canonical URL, scheme included even when the user omitted it
    pub url: String,
    pub id: String,
    /// Embed-player URL for the renderer
    pub embed_url: String,
    /// track/playlist/album/artist, Spotify only
    pub spotify_kind: Option<String>,
}

/// Scan text for a recognized provider URL. Spotify is checked first,
/// then YouTube; unrecognized text yields `None` and stays a plain entry.
pub fn detect_url(text: &str) -> Option<DetectedUrl> {
    if let Some(caps) = SPOTIFY_REGEX.captures(text) {
        let kind = caps.get(1).map(|m| m.as_str().to_string())?;
        let id = caps.get(2).map(|m| m.as_str().to_string())?;

        return Some(DetectedUrl {
            kind: EntryKind::Spotify,
            url: format!("https://open.spotify.com/{kind}/{id}"),
            embed_url: format!("https://open.spotify.com/embed/{kind}/{id}"),
            id,
            spotify_kind: Some(kind),
        });
    }

    if let Some(caps) = YOUTUBE_REGEX.captures(text) {
        let id = caps.get(1).map(|m| m.as_str().to_string())?;

        return Some(DetectedUrl {
            kind: EntryKind::Youtube,
            url: format!("https://www.youtube.com/watch?v={id}"),
            embed_url: format!("https://www.youtube.com/embed/{id}"),
            id,
            spotify_kind: None,
        });
    }

    None
}

/// Human-readable label of the provider kind, used in placeholder titles.
fn kind_label(detected: &DetectedUrl) -> (&'static str, String) {
    match detected.kind {
        EntryKind::Spotify => {
            let kind = detected.spotify_kind.as_deref().unwrap_or("item");
            let mut label = kind.to_string();
            if let Some(first) = label.get_mut(0..1) {
                first.make_ascii_uppercase();
            }
            ("Spotify", label)
        }
        _ => ("YouTube", "Video".to_string()),
    }
}

/// Synthetic title used when the provider lookup fails or times out.
/// Keeps an 8-char id prefix so two failed lookups stay distinguishable.
pub fn placeholder_title(detected: &DetectedUrl) -> String {
    let (provider, kind) = kind_label(detected);
    let prefix: String = detected.id.chars().take(8).collect();
    format!("{provider} {kind} ({prefix}…)")
}

/// Provider title lookup seam. The oEmbed implementation is the only real
/// one; tests substitute a canned lookup.
pub trait TitleLookup: Send + Sync {
    fn lookup(&self, detected: &DetectedUrl) -> anyhow::Result<String>;
}

#[derive(Debug, Clone, Deserialize)]
struct OembedResponse {
    title: Option<String>,
}

/// Title lookup against the providers' public oEmbed endpoints.
pub struct OembedTitles;

impl OembedTitles {
    fn endpoint(detected: &DetectedUrl) -> &'static str {
        match detected.kind {
            EntryKind::Spotify => "https://open.spotify.com/oembed",
            _ => "https://www.youtube.com/oembed",
        }
    }
}

impl TitleLookup for OembedTitles {
    fn lookup(&self, detected: &DetectedUrl) -> anyhow::Result<String> {
        let client = reqwest::blocking::Client::builder()
            .timeout(OEMBED_TIMEOUT)
            .build()?;

        let encoded_url = url::Url::parse(&detected.url)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| detected.url.clone());
        let full_url = format!("{}?url={}&format=json", Self::endpoint(detected), encoded_url);
        log::debug!("Fetching oEmbed title from: {}", full_url);

        let response = client.get(&full_url).send()?;

        if !response.status().is_success() {
            anyhow::bail!("oEmbed endpoint returned status {}", response.status());
        }

        let oembed: OembedResponse = response.json()?;

        match oembed.title {
            Some(title) if !title.trim().is_empty() => Ok(title),
            _ => anyhow::bail!("oEmbed response carried no title"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_youtube_variants() {
        let urls = vec![
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ",
            "youtube.com/watch?v=dQw4w9WgXcQ",
            "https://www.youtube.com/shorts/dQw4w9WgXcQ",
            "https://www.youtube.com/embed/dQw4w9WgXcQ",
            "check this out https://youtu.be/dQw4w9WgXcQ so good",
        ];

        for url in urls {
            let detected = detect_url(url).unwrap_or_else(|| panic!("failed to detect {url}"));
            assert_eq!(detected.kind, EntryKind::Youtube);
            assert_eq!(detected.id, "dQw4w9WgXcQ");
            assert_eq!(detected.url, "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
            assert_eq!(
                detected.embed_url,
                "https://www.youtube.com/embed/dQw4w9WgXcQ"
            );
        }
    }

    #[test]
    fn test_detect_spotify_variants() {
        let detected = detect_url("https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC").unwrap();
        assert_eq!(detected.kind, EntryKind::Spotify);
        assert_eq!(detected.spotify_kind.as_deref(), Some("track"));
        assert_eq!(detected.id, "4uLU6hMCjMI75M1A2tKUQC");
        assert_eq!(
            detected.embed_url,
            "https://open.spotify.com/embed/track/4uLU6hMCjMI75M1A2tKUQC"
        );

        for kind in ["playlist", "album", "artist"] {
            let text = format!("https://open.spotify.com/{kind}/37i9dQZF1DXcBWIGoYBM5M");
            let detected = detect_url(&text).unwrap();
            assert_eq!(detected.spotify_kind.as_deref(), Some(kind));
        }
    }

    #[test]
    fn test_detect_spotify_without_scheme() {
        let detected = detect_url("open.spotify.com/album/2noRn2Aes5aoNVsU6iWThc").unwrap();
        assert_eq!(detected.kind, EntryKind::Spotify);
        assert_eq!(
            detected.url,
            "https://open.spotify.com/album/2noRn2Aes5aoNVsU6iWThc"
        );
    }

    #[test]
    fn test_plain_text_is_not_detected() {
        assert_eq!(detect_url("hello world"), None);
        assert_eq!(detect_url("https://example.com/watch?v=abc12345678"), None);
        // too short to be a video id
        assert_eq!(detect_url("https://youtu.be/short"), None);
    }

    #[test]
    fn test_placeholder_title_youtube() {
        let detected = detect_url("https://youtu.be/abc12345678").unwrap();
        assert_eq!(placeholder_title(&detected), "YouTube Video (abc12345…)");
    }

    #[test]
    fn test_placeholder_title_spotify() {
        let detected = detect_url("https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC").unwrap();
        assert_eq!(placeholder_title(&detected), "Spotify Track (4uLU6hMC…)");
    }

    #[test]
    fn test_oembed_title_parsing() {
        let json = serde_json::json!({
            "type": "video",
            "title": "Never Gonna Give You Up",
            "provider_name": "YouTube"
        });

        let oembed: OembedResponse = serde_json::from_value(json).unwrap();
        assert_eq!(oembed.title.as_deref(), Some("Never Gonna Give You Up"));
    }
}
