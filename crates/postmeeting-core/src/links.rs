//! Meeting link detection for calendar events.
//!
//! A bot can only join an event that carries a video-conference URL. This
//! module finds that URL in the Google `hangoutLink`, the location or the
//! description, and classifies the platform.
//!
//! ```
//! use postmeeting_core::links::{extract_meeting_url, MeetingPlatform, detect_platform};
//!
//! let description = Some("Join https://us02web.zoom.us/j/123456?pwd=Ab1");
//! let url = extract_meeting_url(None, Some("Room 4"), description);
//! assert_eq!(url.as_deref(), Some("https://us02web.zoom.us/j/123456?pwd=Ab1"));
//! assert_eq!(detect_platform(url.as_deref().unwrap_or_default()), MeetingPlatform::Zoom);
//! ```

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Zoom join URL, with or without a vanity subdomain and passcode.
static ZOOM_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)https?://([a-z0-9-]+\.)?zoom\.us/[a-z]/[0-9]+(\?pwd=[\w.-]+)?")
        .expect("Invalid Zoom regex")
});

/// Google Meet URL (`xxx-yyyy-zzz` meeting code).
static MEET_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)https?://meet\.google\.com/[a-z]{3}-[a-z]{4}-[a-z]{3}")
        .expect("Invalid Meet regex")
});

/// Microsoft Teams meetup-join URL.
static TEAMS_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)https?://teams\.(microsoft|live)\.com/l/meetup-join/[^\s<>"]+"#)
        .expect("Invalid Teams regex")
});

/// Video-conference platform of a meeting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingPlatform {
    Zoom,
    GoogleMeet,
    Teams,
    #[default]
    Unknown,
}

impl MeetingPlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Zoom => "zoom",
            Self::GoogleMeet => "google_meet",
            Self::Teams => "teams",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for MeetingPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies free text (a URL, a location, a description) by platform.
pub fn detect_platform(text: &str) -> MeetingPlatform {
    let lower = text.to_ascii_lowercase();
    if lower.contains("zoom.us") {
        MeetingPlatform::Zoom
    } else if lower.contains("meet.google.com") || lower.contains("google.com/hangouts") {
        MeetingPlatform::GoogleMeet
    } else if lower.contains("teams.microsoft.com") || lower.contains("teams.live.com") {
        MeetingPlatform::Teams
    } else {
        MeetingPlatform::Unknown
    }
}

/// Extracts the join URL for an event.
///
/// The Google `hangoutLink` wins when present; otherwise location and
/// description are searched for Zoom, then Meet, then Teams URLs.
pub fn extract_meeting_url(
    hangout_link: Option<&str>,
    location: Option<&str>,
    description: Option<&str>,
) -> Option<String> {
    if let Some(link) = hangout_link.filter(|l| !l.trim().is_empty()) {
        return Some(link.trim().to_string());
    }

    let text = format!(
        "{} {}",
        location.unwrap_or_default(),
        description.unwrap_or_default()
    );

    [&*ZOOM_URL, &*MEET_URL, &*TEAMS_URL]
        .iter()
        .find_map(|re| re.find(&text))
        .map(|m| m.as_str().to_string())
}
