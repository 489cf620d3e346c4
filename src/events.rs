//! Change event types shared by the detector, broadcaster, and clients.
//!
//! Event kinds are closed enums dispatched by pattern matching; registry
//! events are a distinct class from ticket-file events because they can add
//! or remove an entire watched root.

use std::path::PathBuf;

use serde::Serialize;

/// What happened to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

/// One logical change observed by the detector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A ticket file under a watched project root changed.
    Ticket {
        kind: ChangeKind,
        path: PathBuf,
        project_id: String,
    },
    /// A project-descriptor file in the global registry changed.
    Registry { kind: ChangeKind, path: PathBuf },
}

impl ChangeEvent {
    pub fn kind(&self) -> ChangeKind {
        match self {
            ChangeEvent::Ticket { kind, .. } | ChangeEvent::Registry { kind, .. } => *kind,
        }
    }

    pub fn path(&self) -> &PathBuf {
        match self {
            ChangeEvent::Ticket { path, .. } | ChangeEvent::Registry { path, .. } => path,
        }
    }
}

/// Message class on the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PushKind {
    Connection,
    FileChange,
    RegistryChange,
    Heartbeat,
}

/// Event payload carried by file-change and registry-change messages.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushData {
    pub event_type: ChangeKind,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

/// A message delivered to one subscriber.
///
/// `connection` is sent once, synchronously, on subscribe; `heartbeat` keeps
/// idle intermediaries from closing the channel; the other kinds carry data.
#[derive(Debug, Clone, Serialize)]
pub struct PushMessage {
    #[serde(rename = "type")]
    pub kind: PushKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<PushData>,
    pub timestamp: String,
}

impl PushMessage {
    fn now() -> String {
        jiff::Timestamp::now().to_string()
    }

    pub fn connection() -> Self {
        PushMessage {
            kind: PushKind::Connection,
            data: None,
            timestamp: Self::now(),
        }
    }

    pub fn heartbeat() -> Self {
        PushMessage {
            kind: PushKind::Heartbeat,
            data: None,
            timestamp: Self::now(),
        }
    }

    pub fn from_event(event: &ChangeEvent) -> Self {
        let (kind, data) = match event {
            ChangeEvent::Ticket {
                kind,
                path,
                project_id,
            } => (
                PushKind::FileChange,
                PushData {
                    event_type: *kind,
                    path: path.display().to_string(),
                    project_id: Some(project_id.clone()),
                },
            ),
            ChangeEvent::Registry { kind, path } => (
                PushKind::RegistryChange,
                PushData {
                    event_type: *kind,
                    path: path.display().to_string(),
                    project_id: None,
                },
            ),
        };
        PushMessage {
            kind,
            data: Some(data),
            timestamp: Self::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_message_wire_shape() {
        let event = ChangeEvent::Ticket {
            kind: ChangeKind::Modified,
            path: PathBuf::from("/p/tickets/MDT-1-a.md"),
            project_id: "MDT".to_string(),
        };
        let json = serde_json::to_value(PushMessage::from_event(&event)).unwrap();
        assert_eq!(json["type"], "file-change");
        assert_eq!(json["data"]["eventType"], "modified");
        assert_eq!(json["data"]["path"], "/p/tickets/MDT-1-a.md");
        assert_eq!(json["data"]["projectId"], "MDT");
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_registry_event_has_no_project_id() {
        let event = ChangeEvent::Registry {
            kind: ChangeKind::Deleted,
            path: PathBuf::from("/reg/mdt.yaml"),
        };
        let json = serde_json::to_value(PushMessage::from_event(&event)).unwrap();
        assert_eq!(json["type"], "registry-change");
        assert_eq!(json["data"]["eventType"], "deleted");
        assert!(json["data"].get("projectId").is_none());
    }

    #[test]
    fn test_connection_message_has_no_data() {
        let json = serde_json::to_value(PushMessage::connection()).unwrap();
        assert_eq!(json["type"], "connection");
        assert!(json.get("data").is_none());
    }
}
