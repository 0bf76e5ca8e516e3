//! Notification message templates.
//!
//! Rendering is a pure function of `(kind, primary actor, aggregate count)` and
//! is re-run on every read, since the count of an open record keeps changing.

use crate::domain::notification::NotificationKind;
use serde::{Deserialize, Serialize};

/// How the "and N others" suffix is phrased for a single other actor.
///
/// `Legacy` keeps the output existing clients already parse
/// (`"Ada and 1 others liked your design"`). `Grammatical` renders
/// `"Ada and 1 other liked your design"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OthersPhrasing {
    /// Always `"<n> others"`
    #[default]
    Legacy,
    /// `"1 other"`, `"<n> others"` otherwise
    Grammatical,
}

/// Render a message with [`OthersPhrasing::Legacy`].
///
/// # Example
/// ```
/// use interaction_throttle::{render_message, NotificationKind};
///
/// assert_eq!(
///     render_message(NotificationKind::Like, "Ada", 1),
///     "Ada liked your design"
/// );
/// assert_eq!(
///     render_message(NotificationKind::Like, "Ada", 3),
///     "Ada and 2 others liked your design"
/// );
/// ```
pub fn render_message(kind: NotificationKind, actor: &str, aggregate_count: u32) -> String {
    render_message_with(OthersPhrasing::Legacy, kind, actor, aggregate_count)
}

/// Render a message with an explicit phrasing.
pub fn render_message_with(
    phrasing: OthersPhrasing,
    kind: NotificationKind,
    actor: &str,
    aggregate_count: u32,
) -> String {
    let action = match kind {
        NotificationKind::Like => "liked your design",
        NotificationKind::Comment => "commented on your design",
        NotificationKind::Reply => "replied to your comment",
        NotificationKind::Follow => "started following you",
        NotificationKind::CommentLike => "liked your comment",
        NotificationKind::NewDesign => return format!("{} published a new design", actor),
        NotificationKind::BadgeEarned => return "You earned a new badge!".to_string(),
    };

    match aggregate_count {
        0 | 1 => format!("{} {}", actor, action),
        n => format!("{} and {} {}", actor, others(phrasing, n - 1), action),
    }
}

fn others(phrasing: OthersPhrasing, n: u32) -> String {
    match (phrasing, n) {
        (OthersPhrasing::Grammatical, 1) => "1 other".to_string(),
        _ => format!("{} others", n),
    }
}
