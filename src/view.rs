//! presentation glue: read-only rendering of a feed snapshot

use crate::{FeedState, Timestamp};

pub fn format_timestamp(ts: Timestamp) -> String {
    ts.to_datetime().format("%Y-%m-%d %H:%M").to_string()
}

/// one line per note plus status lines, ready for a dumb list widget
pub fn render_lines(state: &FeedState) -> Vec<String> {
    let mut lines = Vec::with_capacity(state.notes.len() + 2);

    if let Some(err) = &state.error {
        lines.push(format!("! {}", err));
    }

    for note in &state.notes {
        let summary = note.content.lines().next().unwrap_or_default();
        lines.push(format!("[{}] {}", format_timestamp(note.created_at), summary));
    }

    if state.loading {
        lines.push("loading...".to_string());
    } else if state.has_more && !state.notes.is_empty() {
        lines.push("-- load more --".to_string());
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(Timestamp(0)), "1970-01-01 00:00");
        assert_eq!(format_timestamp(Timestamp(1700000000)), "2023-11-14 22:13");
    }

    #[test]
    fn test_render_lines() {
        let note: crate::Event = serde_json::from_str(&format!(
            "{{\"id\":\"{}\",\"pubkey\":\"d91191e30e00444b942c0e82cad470b32af171764c2275bee0bd99377efd4075\",\"created_at\":1700000000,\"kind\":1,\"tags\":[],\"content\":\"first line\\nsecond line\",\"sig\":\"{}\"}}",
            "a".repeat(64),
            "0".repeat(128),
        ))
        .unwrap();

        let state = FeedState {
            notes: vec![note],
            has_more: true,
            ..FeedState::default()
        };

        let lines = render_lines(&state);
        assert_eq!(
            lines,
            vec![
                "[2023-11-14 22:13] first line".to_string(),
                "-- load more --".to_string(),
            ]
        );

        let errored = FeedState {
            error: Some("Relay error: timeout".to_string()),
            ..FeedState::default()
        };
        assert_eq!(render_lines(&errored), vec!["! Relay error: timeout"]);
    }
}
