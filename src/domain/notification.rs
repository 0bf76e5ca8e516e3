//! Notification events, group keys and notification records.
//!
//! An event is one interaction (a like, a follow, ...) addressed to a recipient.
//! A record is what the recipient eventually sees; groupable events fold into the
//! latest open record sharing their group key.

use crate::domain::message::{render_message_with, OthersPhrasing};
use crate::domain::window::elapsed_between;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Error returned for events that fail boundary validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    /// The kind string does not name a known notification type
    #[error("unknown notification type `{0}`")]
    UnknownKind(String),
    /// The actor id is empty
    #[error("{0} event is missing an actor id")]
    MissingActor(NotificationKind),
    /// The actor display name is empty
    #[error("{0} event is missing an actor name")]
    MissingActorName(NotificationKind),
    /// The recipient id is empty
    #[error("{0} event is missing a recipient id")]
    MissingRecipient(NotificationKind),
    /// The kind needs a creation or comment id and none was given
    #[error("{0} event is missing a target id")]
    MissingTarget(NotificationKind),
}

/// Type of interaction behind a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Someone liked a creation
    Like,
    /// Someone commented on a creation
    Comment,
    /// Someone replied to a comment
    Reply,
    /// Someone followed the recipient
    Follow,
    /// Someone the recipient follows published a creation
    NewDesign,
    /// Someone liked a comment
    CommentLike,
    /// The recipient earned a badge
    BadgeEarned,
}

impl NotificationKind {
    /// Every kind, in declaration order.
    pub const ALL: [NotificationKind; 7] = [
        NotificationKind::Like,
        NotificationKind::Comment,
        NotificationKind::Reply,
        NotificationKind::Follow,
        NotificationKind::NewDesign,
        NotificationKind::CommentLike,
        NotificationKind::BadgeEarned,
    ];

    /// Wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Like => "like",
            NotificationKind::Comment => "comment",
            NotificationKind::Reply => "reply",
            NotificationKind::Follow => "follow",
            NotificationKind::NewDesign => "new_design",
            NotificationKind::CommentLike => "comment_like",
            NotificationKind::BadgeEarned => "badge_earned",
        }
    }

    /// Whether events of this kind merge into a shared record.
    pub fn is_groupable(&self) -> bool {
        matches!(
            self,
            NotificationKind::Like | NotificationKind::Follow | NotificationKind::CommentLike
        )
    }

    /// Whether events of this kind must carry a target id.
    pub fn requires_target(&self) -> bool {
        matches!(
            self,
            NotificationKind::Like
                | NotificationKind::Comment
                | NotificationKind::Reply
                | NotificationKind::NewDesign
                | NotificationKind::CommentLike
        )
    }

    /// Whether a human actor is named in the message.
    pub fn names_actor(&self) -> bool {
        !matches!(self, NotificationKind::BadgeEarned)
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NotificationKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| EventError::UnknownKind(s.to_string()))
    }
}

/// Identifier deciding which events merge into one record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupKey(String);

impl GroupKey {
    /// Derive the group key for an event, if its kind is groupable.
    ///
    /// | kind | key |
    /// |---|---|
    /// | like | `like:<target>` |
    /// | follow | `follow:<recipient>` |
    /// | comment_like | `comment_like:<target>` |
    pub fn derive(kind: NotificationKind, recipient_id: &str, target_id: Option<&str>) -> Option<Self> {
        match kind {
            NotificationKind::Follow => Some(GroupKey(format!("follow:{}", recipient_id))),
            NotificationKind::Like | NotificationKind::CommentLike => {
                target_id.map(|target| GroupKey(format!("{}:{}", kind.as_str(), target)))
            }
            _ => None,
        }
    }

    /// The key as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Index key under which the latest open record of a group is kept.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupIndexKey {
    /// Notification kind
    pub kind: NotificationKind,
    /// Recipient of the grouped notifications
    pub recipient_id: String,
    /// Derived group key
    pub group_key: GroupKey,
}

/// One interaction event, already authenticated by the intake layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    /// Interaction type
    pub kind: NotificationKind,
    /// Who performed the action
    pub actor_id: String,
    /// Display name of the actor, used in rendered messages
    pub actor_name: String,
    /// Who gets notified
    pub recipient_id: String,
    /// Creation or comment the action applies to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    /// When the interaction happened
    pub occurred_at: DateTime<Utc>,
}

impl NotificationEvent {
    /// Create an event without a target.
    pub fn new(
        kind: NotificationKind,
        actor_id: impl Into<String>,
        actor_name: impl Into<String>,
        recipient_id: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            actor_id: actor_id.into(),
            actor_name: actor_name.into(),
            recipient_id: recipient_id.into(),
            target_id: None,
            occurred_at,
        }
    }

    /// Set the creation or comment id the event applies to.
    pub fn with_target(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    /// Check that all fields required by the event's kind are present.
    ///
    /// # Errors
    /// Returns the first missing field as an `EventError`.
    pub fn validate(&self) -> Result<(), EventError> {
        if is_blank(&self.actor_id) {
            return Err(EventError::MissingActor(self.kind));
        }
        if is_blank(&self.recipient_id) {
            return Err(EventError::MissingRecipient(self.kind));
        }
        if self.kind.names_actor() && is_blank(&self.actor_name) {
            return Err(EventError::MissingActorName(self.kind));
        }
        if self.kind.requires_target() && self.target_id.as_deref().map_or(true, is_blank) {
            return Err(EventError::MissingTarget(self.kind));
        }
        Ok(())
    }

    /// Whether the actor is also the recipient.
    pub fn is_self_action(&self) -> bool {
        self.actor_id == self.recipient_id
    }

    /// The event's group key, if its kind is groupable.
    pub fn group_key(&self) -> Option<GroupKey> {
        GroupKey::derive(self.kind, &self.recipient_id, self.target_id.as_deref())
    }

    /// Index key of the group this event belongs to, if any.
    pub fn index_key(&self) -> Option<GroupIndexKey> {
        self.group_key().map(|group_key| GroupIndexKey {
            kind: self.kind,
            recipient_id: self.recipient_id.clone(),
            group_key,
        })
    }
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Process-unique identifier of a notification record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(u64);

impl RecordId {
    /// Wrap a raw id.
    pub fn new(id: u64) -> Self {
        RecordId(id)
    }

    /// Get the raw id.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A notification as the recipient sees it, possibly summarising many events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    /// Record identifier
    pub id: RecordId,
    /// Notification kind
    pub kind: NotificationKind,
    /// Who is notified
    pub recipient_id: String,
    /// Group key for mergeable kinds
    pub group_key: Option<GroupKey>,
    /// Creation or comment the notification refers to
    pub target_id: Option<String>,
    /// Most recent actor
    pub primary_actor_name: String,
    /// Number of events merged into this record (at least 1)
    pub aggregate_count: u32,
    /// When the first event happened
    pub created_at: DateTime<Utc>,
    /// When the latest merged event happened
    pub last_updated_at: DateTime<Utc>,
    /// Set by the delivery layer once the recipient acknowledged it
    pub read: bool,
}

impl NotificationRecord {
    /// Open a new record from a single event.
    pub fn open(id: RecordId, event: &NotificationEvent) -> Self {
        Self {
            id,
            kind: event.kind,
            recipient_id: event.recipient_id.clone(),
            group_key: event.group_key(),
            target_id: event.target_id.clone(),
            primary_actor_name: event.actor_name.clone(),
            aggregate_count: 1,
            created_at: event.occurred_at,
            last_updated_at: event.occurred_at,
            read: false,
        }
    }

    /// Whether an event occurring at `at` may still merge into this record.
    ///
    /// The record must be grouped, unread, and `at - last_updated_at` must be
    /// shorter than `window`.
    pub fn accepts(&self, at: DateTime<Utc>, window: Duration) -> bool {
        self.group_key.is_some()
            && !self.read
            && elapsed_between(self.last_updated_at, at) < window
    }

    /// Fold one more event into the record.
    ///
    /// The actor and timestamp only move forward; an event older than the
    /// latest merged one still counts but does not become the primary actor.
    pub fn absorb(&mut self, event: &NotificationEvent) {
        self.aggregate_count = self.aggregate_count.saturating_add(1);
        if event.occurred_at >= self.last_updated_at {
            self.primary_actor_name = event.actor_name.clone();
            self.last_updated_at = event.occurred_at;
        }
    }

    /// Index key of this record's group, if it is grouped.
    pub fn index_key(&self) -> Option<GroupIndexKey> {
        self.group_key.clone().map(|group_key| GroupIndexKey {
            kind: self.kind,
            recipient_id: self.recipient_id.clone(),
            group_key,
        })
    }

    /// Render the record's message with the default phrasing.
    pub fn message(&self) -> String {
        self.message_with(OthersPhrasing::default())
    }

    /// Render the record's message with an explicit phrasing.
    pub fn message_with(&self, phrasing: OthersPhrasing) -> String {
        render_message_with(
            phrasing,
            self.kind,
            &self.primary_actor_name,
            self.aggregate_count,
        )
    }
}
