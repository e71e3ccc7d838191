use std::fmt::Write as _;

use tally::{AuthStatus, Session, Snapshot};

/// Renders the whole screen: badge, greeting and save status, then one row per counter.
pub(crate) fn render(snapshot: &Snapshot, auth: &AuthStatus) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "[{}] Items", snapshot.items_in_use());

    if auth.busy {
        let _ = writeln!(out, "Please wait...");
    }
    if let Some(error) = &auth.error {
        let _ = writeln!(out, "! {error}");
    }
    if let Session::SignedIn(user) = &snapshot.session {
        let _ = writeln!(out, "Hi {user}! {}", snapshot.save_status());
    }

    if snapshot.counters.is_empty() {
        let _ = writeln!(out, "  (no counters, `restart` brings them back)");
    }
    for counter in &snapshot.counters {
        let value = match counter.value {
            0 => "Zero".to_string(),
            n => n.to_string(),
        };
        let _ = writeln!(out, "  #{:<6} {value}", counter.id.as_str());
    }

    out
}
