//! Transcode profile definitions

use serde::{Deserialize, Serialize};

/// Video codec family produced by a profile
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    H264,
    H265,
}

impl VideoCodec {
    /// Encoder library name passed to `-c:v`
    pub fn encoder_name(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "libx264",
            VideoCodec::H265 => "libx265",
        }
    }
}

/// Rate control for a profile: a fixed bitrate or a constant rate factor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    /// Target bitrate in encoder notation, e.g. `"4M"`
    Bitrate(String),
    /// Constant rate factor (lower is better quality)
    Crf(u8),
}

/// One independently toggleable encoding configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscodeProfile {
    /// Stable identifier used in progress events and logs
    pub id: String,
    #[serde(default = "default_profile_enabled")]
    pub enabled: bool,
    pub codec: VideoCodec,
    pub quality: Quality,
    /// Subfolder under `transcoded/` receiving this profile's outputs
    pub folder: String,
    /// Appended to the clip's file stem
    #[serde(default)]
    pub suffix: String,
    #[serde(default = "default_container")]
    pub container: String,
}

fn default_profile_enabled() -> bool {
    true
}

fn default_container() -> String {
    "mp4".to_string()
}

impl TranscodeProfile {
    pub fn new(id: &str, codec: VideoCodec, quality: Quality, suffix: &str) -> Self {
        Self {
            id: id.to_string(),
            enabled: true,
            codec,
            quality,
            folder: id.to_string(),
            suffix: suffix.to_string(),
            container: default_container(),
        }
    }
}

/// The three stock profiles: low and high bitrate H.264 plus a CRF-driven H.265
pub fn default_profiles() -> Vec<TranscodeProfile> {
    vec![
        TranscodeProfile::new(
            "H264_low",
            VideoCodec::H264,
            Quality::Bitrate("4M".to_string()),
            "_low",
        ),
        TranscodeProfile::new(
            "H264_high",
            VideoCodec::H264,
            Quality::Bitrate("8M".to_string()),
            "_high",
        ),
        TranscodeProfile::new("H265_VBR", VideoCodec::H265, Quality::Crf(23), "_crf"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        profile: TranscodeProfile,
    }

    #[test]
    fn test_default_profiles() {
        let profiles = default_profiles();
        assert_eq!(profiles.len(), 3);
        assert!(profiles.iter().all(|p| p.enabled));
        assert_eq!(profiles[0].quality, Quality::Bitrate("4M".to_string()));
        assert_eq!(profiles[1].quality, Quality::Bitrate("8M".to_string()));
        assert_eq!(profiles[2].quality, Quality::Crf(23));
        assert_eq!(profiles[2].codec, VideoCodec::H265);
    }

    #[test]
    fn test_profile_parses_with_defaults() {
        let w: Wrapper = toml::from_str(
            r#"
[profile]
id = "tiny"
codec = "h264"
quality = { bitrate = "1M" }
folder = "tiny"
"#,
        )
        .expect("profile should parse");

        assert!(w.profile.enabled);
        assert_eq!(w.profile.suffix, "");
        assert_eq!(w.profile.container, "mp4");
        assert_eq!(w.profile.quality, Quality::Bitrate("1M".to_string()));
    }

    #[test]
    fn test_profile_parses_crf() {
        let w: Wrapper = toml::from_str(
            r#"
[profile]
id = "hevc"
enabled = false
codec = "h265"
quality = { crf = 28 }
folder = "hevc"
suffix = "_hevc"
container = "mkv"
"#,
        )
        .expect("profile should parse");

        assert!(!w.profile.enabled);
        assert_eq!(w.profile.codec, VideoCodec::H265);
        assert_eq!(w.profile.quality, Quality::Crf(28));
        assert_eq!(w.profile.container, "mkv");
    }

    #[test]
    fn test_encoder_names() {
        assert_eq!(VideoCodec::H264.encoder_name(), "libx264");
        assert_eq!(VideoCodec::H265.encoder_name(), "libx265");
    }
}
