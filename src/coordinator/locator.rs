//! Locator validation.
//!
//! A locator is accepted when it is either a known video-platform URL
//! (watch pages, shorts, share links, playlists) or a direct link to a
//! media file. Everything else is rejected at submission time, before
//! a job record is created.

use regex::Regex;
use std::sync::LazyLock;

static PLATFORM_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)^
        (https?://)?
        (www\.|m\.)?
        (
            (youtube|youtube-nocookie)\.com/(watch\?|playlist\?|shorts/|embed/)
          | youtu\.be/
        )
        \S+$",
    )
    .expect("platform locator regex is valid")
});

static DIRECT_MEDIA_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^https?://\S+\.(mp4|m4a|mp3|webm|mkv|mov|wav|ogg)(\?\S*)?$")
        .expect("direct media locator regex is valid")
});

/// Whether a locator names a resource the configured strategies can
/// plausibly acquire.
pub fn is_supported(locator: &str) -> bool {
    let locator = locator.trim();
    !locator.is_empty()
        && (PLATFORM_PATTERN.is_match(locator) || DIRECT_MEDIA_PATTERN.is_match(locator))
}
