use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Relationship between a local copy and its last-known server counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncState {
    #[default]
    Synced,
    LocalChanges,
    ServerChanges,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncState::Synced => write!(f, "synced"),
            SyncState::LocalChanges => write!(f, "localChanges"),
            SyncState::ServerChanges => write!(f, "serverChanges"),
        }
    }
}

impl FromStr for SyncState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "synced" => Ok(SyncState::Synced),
            "localchanges" => Ok(SyncState::LocalChanges),
            "serverchanges" => Ok(SyncState::ServerChanges),
            _ => Err(format!(
                "Invalid sync state '{}'. Valid options: synced, localChanges, serverChanges",
                s
            )),
        }
    }
}

/// The three sync fields carried by every book and by the notes record.
///
/// All transitions of the sync state machine live here so they can be
/// exercised without a database or a server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_updated_at: Option<DateTime<Utc>>,
    pub sync_state: SyncState,
}

impl SyncMeta {
    /// A record that is aligned with the server as of `at`.
    pub fn synced_at(at: DateTime<Utc>) -> Self {
        Self {
            local_updated_at: Some(at),
            server_updated_at: Some(at),
            sync_state: SyncState::Synced,
        }
    }

    /// Records a local mutation. `local_updated_at` strictly advances even
    /// when two touches land on the same clock reading.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        let next = match self.local_updated_at {
            Some(prev) if prev >= now => prev + Duration::milliseconds(1),
            _ => now,
        };
        self.local_updated_at = Some(next);
        self.sync_state = SyncState::LocalChanges;
    }

    /// Records a completed push or pull acknowledged by the server.
    ///
    /// Without a server timestamp only the state flag changes.
    pub fn mark_synced(&mut self, acknowledged_at: Option<DateTime<Utc>>) {
        if let Some(at) = acknowledged_at {
            self.local_updated_at = Some(at);
            self.server_updated_at = Some(at);
        }
        self.sync_state = SyncState::Synced;
    }

    /// Applies one entry of the remote listing. Never touches content.
    ///
    /// A newer server copy wins visibility over pending local changes.
    /// Returns true if anything changed.
    pub fn reconcile(&mut self, remote_updated_at: DateTime<Utc>) -> bool {
        let before = self.clone();
        self.server_updated_at = Some(remote_updated_at);

        let local = self.local_updated_at.unwrap_or(DateTime::<Utc>::MIN_UTC);
        if remote_updated_at > local {
            self.sync_state = SyncState::ServerChanges;
        } else if self.sync_state != SyncState::LocalChanges {
            self.sync_state = SyncState::Synced;
        }

        *self != before
    }

    pub fn is_dirty(&self) -> bool {
        self.sync_state == SyncState::LocalChanges
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_sync_state_display_and_parse() {
        assert_eq!(SyncState::LocalChanges.to_string(), "localChanges");
        assert_eq!(
            SyncState::from_str("serverChanges").unwrap(),
            SyncState::ServerChanges
        );
        assert_eq!(SyncState::from_str("SYNCED").unwrap(), SyncState::Synced);
        assert!(SyncState::from_str("dirty").is_err());
    }

    #[test]
    fn test_sync_state_json_uses_camel_case() {
        let json = serde_json::to_string(&SyncState::LocalChanges).unwrap();
        assert_eq!(json, "\"localChanges\"");
    }

    #[test]
    fn test_touch_marks_dirty_and_advances() {
        let mut meta = SyncMeta::synced_at(at(10));
        meta.touch(at(11));
        assert_eq!(meta.sync_state, SyncState::LocalChanges);
        assert_eq!(meta.local_updated_at, Some(at(11)));

        // Same clock reading still advances
        meta.touch(at(11));
        assert!(meta.local_updated_at.unwrap() > at(11));
    }

    #[test]
    fn test_mark_synced_sets_both_timestamps() {
        let mut meta = SyncMeta::default();
        meta.touch(at(9));
        meta.mark_synced(Some(at(12)));
        assert_eq!(meta, SyncMeta::synced_at(at(12)));
    }

    #[test]
    fn test_mark_synced_without_timestamp_only_flips_state() {
        let mut meta = SyncMeta::default();
        meta.touch(at(9));
        meta.mark_synced(None);
        assert_eq!(meta.sync_state, SyncState::Synced);
        assert_eq!(meta.local_updated_at, Some(at(9)));
        assert_eq!(meta.server_updated_at, None);
    }

    #[test]
    fn test_reconcile_newer_server_overrides_local_changes() {
        let mut meta = SyncMeta::default();
        meta.touch(at(10));
        assert!(meta.reconcile(at(11)));
        assert_eq!(meta.sync_state, SyncState::ServerChanges);
        assert_eq!(meta.server_updated_at, Some(at(11)));
    }

    #[test]
    fn test_reconcile_keeps_local_changes_when_server_older() {
        let mut meta = SyncMeta::default();
        meta.touch(at(10));
        meta.reconcile(at(9));
        assert_eq!(meta.sync_state, SyncState::LocalChanges);
    }

    #[test]
    fn test_reconcile_clears_stale_server_changes() {
        let mut meta = SyncMeta {
            local_updated_at: Some(at(10)),
            server_updated_at: Some(at(11)),
            sync_state: SyncState::ServerChanges,
        };
        meta.reconcile(at(10));
        assert_eq!(meta.sync_state, SyncState::Synced);
    }

    #[test]
    fn test_reconcile_without_local_timestamp() {
        let mut meta = SyncMeta::default();
        meta.reconcile(at(1));
        assert_eq!(meta.sync_state, SyncState::ServerChanges);
    }

    #[test]
    fn test_reconcile_reports_no_change() {
        let mut meta = SyncMeta::synced_at(at(10));
        assert!(!meta.reconcile(at(10)));
    }

    #[test]
    fn test_missing_fields_deserialize_to_defaults() {
        let meta: SyncMeta = serde_json::from_str("{}").unwrap();
        assert_eq!(meta, SyncMeta::default());
    }
}
