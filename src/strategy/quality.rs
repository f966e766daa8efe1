//! Mode and quality resolution over the stream variants a strategy
//! actually has available.
//!
//! The policy (applied within each strategy, never across strategies):
//!
//! - `MediaMode::Video` prefers a single asset that already combines
//!   video and audio — muxing separate streams is out of scope — and
//!   only falls back to video-only assets when no combined one exists.
//! - `highest`/`lowest` pick the extreme resolution among candidates.
//! - A named tier ("720p") picks the exact match, else the nearest
//!   available resolution, else the overall highest.
//! - `MediaMode::Audio` selects an audio-only asset, preferring the
//!   container most compatible with the target audio codec (m4a/mp4).

use crate::job::{MediaMode, QualityHint};

/// One stream a provider advertises for a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamVariant {
    /// Provider-side identifier handed back when fetching.
    pub id: String,
    /// Vertical resolution, when the stream carries video.
    pub height: Option<u32>,
    pub has_video: bool,
    pub has_audio: bool,
    /// Container/extension, e.g. "mp4", "m4a", "webm".
    pub container: String,
}

impl StreamVariant {
    fn is_combined(&self) -> bool {
        self.has_video && self.has_audio
    }

    fn is_audio_only(&self) -> bool {
        self.has_audio && !self.has_video
    }
}

/// Pick the variant to fetch, or `None` when nothing satisfies the
/// requested mode at all.
pub fn select_variant<'a>(
    variants: &'a [StreamVariant],
    mode: MediaMode,
    quality: &QualityHint,
) -> Option<&'a StreamVariant> {
    match mode {
        MediaMode::Audio => select_audio(variants),
        MediaMode::Video => select_video(variants, quality),
    }
}

fn select_audio(variants: &[StreamVariant]) -> Option<&StreamVariant> {
    let audio: Vec<&StreamVariant> = variants.iter().filter(|v| v.is_audio_only()).collect();
    audio
        .iter()
        .find(|v| matches!(v.container.as_str(), "m4a" | "mp4"))
        .copied()
        .or_else(|| audio.first().copied())
}

fn select_video<'a>(
    variants: &'a [StreamVariant],
    quality: &QualityHint,
) -> Option<&'a StreamVariant> {
    // Combined assets first; video-only is a last resort.
    let combined: Vec<&StreamVariant> = variants.iter().filter(|v| v.is_combined()).collect();
    let candidates = if combined.is_empty() {
        variants.iter().filter(|v| v.has_video).collect()
    } else {
        combined
    };
    if candidates.is_empty() {
        return None;
    }

    let by_height = |v: &&StreamVariant| v.height.unwrap_or(0);
    match quality {
        QualityHint::Highest => candidates.into_iter().max_by_key(by_height),
        QualityHint::Lowest => candidates.into_iter().min_by_key(by_height),
        tier => {
            let Some(target) = tier.tier_height() else {
                // Unparseable tier name, treat as highest.
                return candidates.into_iter().max_by_key(by_height);
            };
            if let Some(exact) = candidates.iter().find(|v| v.height == Some(target)) {
                return Some(exact);
            }
            // Nearest available, then overall highest as a tiebreak.
            candidates
                .into_iter()
                .min_by_key(|v| {
                    let height = v.height.unwrap_or(0);
                    (height.abs_diff(target), u32::MAX - height)
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant(id: &str, height: Option<u32>, video: bool, audio: bool, container: &str) -> StreamVariant {
        StreamVariant {
            id: id.to_string(),
            height,
            has_video: video,
            has_audio: audio,
            container: container.to_string(),
        }
    }

    fn catalog() -> Vec<StreamVariant> {
        vec![
            variant("v1080", Some(1080), true, false, "mp4"),
            variant("c720", Some(720), true, true, "mp4"),
            variant("c360", Some(360), true, true, "mp4"),
            variant("a-webm", None, false, true, "webm"),
            variant("a-m4a", None, false, true, "m4a"),
        ]
    }

    #[test]
    fn combined_assets_beat_higher_resolution_video_only() {
        let variants = catalog();
        let pick = select_variant(&variants, MediaMode::Video, &QualityHint::Highest).unwrap();
        // 1080p is video-only, so the best combined asset wins.
        assert_eq!(pick.id, "c720");
    }

    #[test]
    fn lowest_picks_the_smallest_combined_asset() {
        let variants = catalog();
        let pick = select_variant(&variants, MediaMode::Video, &QualityHint::Lowest).unwrap();
        assert_eq!(pick.id, "c360");
    }

    #[test]
    fn exact_tier_match_wins() {
        let variants = catalog();
        let pick =
            select_variant(&variants, MediaMode::Video, &QualityHint::Tier("360p".into())).unwrap();
        assert_eq!(pick.id, "c360");
    }

    #[test]
    fn missing_tier_falls_back_to_nearest() {
        let variants = catalog();
        let pick =
            select_variant(&variants, MediaMode::Video, &QualityHint::Tier("480p".into())).unwrap();
        assert_eq!(pick.id, "c360");

        let pick =
            select_variant(&variants, MediaMode::Video, &QualityHint::Tier("2160p".into())).unwrap();
        assert_eq!(pick.id, "c720");
    }

    #[test]
    fn video_only_used_when_no_combined_asset_exists() {
        let variants = vec![
            variant("v1080", Some(1080), true, false, "mp4"),
            variant("v480", Some(480), true, false, "mp4"),
        ];
        let pick = select_variant(&variants, MediaMode::Video, &QualityHint::Highest).unwrap();
        assert_eq!(pick.id, "v1080");
    }

    #[test]
    fn audio_prefers_codec_compatible_container() {
        let variants = catalog();
        let pick = select_variant(&variants, MediaMode::Audio, &QualityHint::Highest).unwrap();
        assert_eq!(pick.id, "a-m4a");
    }

    #[test]
    fn audio_falls_back_to_any_audio_only_stream() {
        let variants = vec![variant("a-webm", None, false, true, "webm")];
        let pick = select_variant(&variants, MediaMode::Audio, &QualityHint::Highest).unwrap();
        assert_eq!(pick.id, "a-webm");
    }

    #[test]
    fn empty_catalog_selects_nothing() {
        assert!(select_variant(&[], MediaMode::Video, &QualityHint::Highest).is_none());
        let audioless = vec![variant("v1", Some(720), true, false, "mp4")];
        assert!(select_variant(&audioless, MediaMode::Audio, &QualityHint::Highest).is_none());
    }
}
