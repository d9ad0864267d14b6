//! Maps status snapshots onto the activity Discord displays.
//!
//! ```text
//! details (top line)    = "<state>[ • <plugin>][ - <project>]"
//! state (bottom line)   = "<tempo> BPM"
//! small image           = lowercase state label
//! ```

use crate::status::ActivitySnapshot;
use flrp_presence_protocol::{ActivityAssets, ActivityPayload, TimestampWindow};

pub const LARGE_IMAGE_KEY: &str = "fl_studio_logo";
pub const LARGE_IMAGE_LABEL: &str = "FL Studio";
pub const STARTING_UP_STATE: &str = "Starting up...";
pub const STARTING_UP_ICON: &str = "idle";
/// Discord rejects activity text fields longer than this many characters.
pub const MAX_FIELD_CHARS: usize = 128;

/// Truncates to `MAX_FIELD_CHARS` characters, marking the cut with `…`.
pub fn clamp_field(mut text: String) -> String {
    if let Some((cut, _)) = text.char_indices().nth(MAX_FIELD_CHARS - 1) {
        if text[cut..].chars().count() > 1 {
            text.truncate(cut);
            text.push('…');
        }
    }
    text
}

pub fn details_line(snapshot: &ActivitySnapshot) -> String {
    let mut details = snapshot.state_label.clone();
    if let Some(plugin) = &snapshot.plugin_name {
        details.push_str(" • ");
        details.push_str(plugin);
    }
    if let Some(project) = &snapshot.project_name {
        details.push_str(" - ");
        details.push_str(project);
    }
    details
}

pub fn tempo_line(snapshot: &ActivitySnapshot) -> String {
    format!("{} BPM", snapshot.tempo)
}

fn session_window(session_started_at: Option<i64>) -> Option<TimestampWindow> {
    session_started_at.map(|start| TimestampWindow {
        start: Some(start),
        end: None,
    })
}

pub fn build_activity(
    snapshot: &ActivitySnapshot,
    session_started_at: Option<i64>,
) -> ActivityPayload {
    ActivityPayload {
        state: clamp_field(tempo_line(snapshot)),
        details: clamp_field(details_line(snapshot)),
        timestamps: session_window(session_started_at),
        assets: Some(ActivityAssets {
            large_image: Some(LARGE_IMAGE_KEY.to_string()),
            large_text: Some(LARGE_IMAGE_LABEL.to_string()),
            small_image: Some(clamp_field(snapshot.state_label.to_lowercase())),
            small_text: Some(clamp_field(snapshot.state_label.clone())),
        }),
    }
}

/// Placeholder shown right after the handshake, before the first status read.
pub fn starting_up_activity(session_started_at: Option<i64>) -> ActivityPayload {
    ActivityPayload {
        state: STARTING_UP_STATE.to_string(),
        details: LARGE_IMAGE_LABEL.to_string(),
        timestamps: session_window(session_started_at),
        assets: Some(ActivityAssets {
            large_image: Some(LARGE_IMAGE_KEY.to_string()),
            large_text: Some(LARGE_IMAGE_LABEL.to_string()),
            small_image: Some(STARTING_UP_ICON.to_string()),
            small_text: None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(state: &str, tempo: i64, plugin: Option<&str>, project: Option<&str>) -> ActivitySnapshot {
        ActivitySnapshot {
            state_label: state.to_string(),
            tempo,
            plugin_name: plugin.map(str::to_string),
            project_name: project.map(str::to_string),
            observed_at_unix_seconds: 0,
        }
    }

    #[test]
    fn details_include_plugin_and_project() {
        let snap = snapshot("Recording", 140, Some("Serum"), Some("Night Drive"));
        assert_eq!(details_line(&snap), "Recording • Serum - Night Drive");
    }

    #[test]
    fn details_without_plugin_keep_project_suffix() {
        let snap = snapshot("Composing", 120, None, Some("Sketch"));
        assert_eq!(details_line(&snap), "Composing - Sketch");
    }

    #[test]
    fn activity_uses_tempo_line_and_lowercase_icon() {
        let snap = snapshot("Recording", 140, Some("Serum"), None);
        let activity = build_activity(&snap, Some(1_700_000_000));

        assert_eq!(activity.state, "140 BPM");
        assert_eq!(activity.details, "Recording • Serum");
        assert_eq!(activity.timestamps.and_then(|t| t.start), Some(1_700_000_000));
        let assets = activity.assets.expect("assets");
        assert_eq!(assets.small_image.as_deref(), Some("recording"));
        assert_eq!(assets.small_text.as_deref(), Some("Recording"));
        assert_eq!(assets.large_image.as_deref(), Some(LARGE_IMAGE_KEY));
    }

    #[test]
    fn activity_without_session_has_no_timestamps() {
        let snap = snapshot("Idle", 130, None, None);
        assert!(build_activity(&snap, None).timestamps.is_none());
    }

    #[test]
    fn starting_up_activity_shape() {
        let activity = starting_up_activity(Some(10));
        assert_eq!(activity.state, STARTING_UP_STATE);
        assert_eq!(activity.details, "FL Studio");
        assert_eq!(
            activity.assets.and_then(|a| a.small_image).as_deref(),
            Some(STARTING_UP_ICON)
        );
    }

    #[test]
    fn long_fields_are_clamped_to_discord_limit() {
        let plugin = "é".repeat(70_000);
        let state = "S".repeat(300);
        let snap = snapshot(&state, 140, Some(&plugin), Some("Night Drive"));
        let activity = build_activity(&snap, None);

        assert_eq!(activity.details.chars().count(), MAX_FIELD_CHARS);
        assert!(activity.details.ends_with('…'));
        let assets = activity.assets.expect("assets");
        assert_eq!(assets.small_text.map(|t| t.chars().count()), Some(MAX_FIELD_CHARS));
        assert_eq!(assets.small_image.map(|t| t.chars().count()), Some(MAX_FIELD_CHARS));
    }

    #[test]
    fn clamp_keeps_text_at_the_limit_untouched() {
        let exact = "a".repeat(MAX_FIELD_CHARS);
        assert_eq!(clamp_field(exact.clone()), exact);
        assert_eq!(clamp_field("short".to_string()), "short");
    }
}
