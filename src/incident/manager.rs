//! The incident state machine: `NORMAL -> PENDING -> ACTIVE -> NORMAL` per
//! `(device, kind)`, with a 300s debounce and at-most-one-ACTIVE-per-kind.

use super::store::AlertStore;
use super::types::{DetectionFlags, DeviceIncidentState, IncidentKind, IncidentMetadata, Transition};
use crate::constants::incident::REPORT_DELAY;
use crate::error::Result;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Single-writer-per-host incident tracker. Multiple threads within one
/// host process (the monitor's event loop, the audio detector worker) may
/// call [`IncidentManager::process_detection`] concurrently; state for each
/// device is behind its own `Mutex`, entered via `DashMap`, so calls for
/// different devices proceed independently while calls for the same device
/// are serialized.
pub struct IncidentManager {
    store: Arc<dyn AlertStore>,
    host_name: String,
    devices: DashMap<String, Mutex<DeviceIncidentState>>,
}

impl IncidentManager {
    /// Builds a manager backed by `store` (use [`super::store::NullAlertStore`]
    /// when no database is configured).
    #[must_use]
    pub fn new(store: Arc<dyn AlertStore>, host_name: impl Into<String>) -> Self {
        Self {
            store,
            host_name: host_name.into(),
            devices: DashMap::new(),
        }
    }

    /// Resolves every DB row this host currently holds active, as a cold
    /// boot: incidents re-create after another debounce window if the
    /// condition persists. Returns the number of rows resolved.
    pub fn resolve_all_on_startup(&self) -> Result<usize> {
        let rows = self.store.list_active_for_host(&self.host_name)?;
        let count = rows.len();
        for row in rows {
            self.store.resolve_alert(&row.alert_id)?;
            info!(device_id = %row.device_id, kind = %row.kind, alert_id = %row.alert_id, "resolved incident on cold boot");
        }
        Ok(count)
    }

    /// Processes one detection result for `device_id`, applying the
    /// debounce/transition rules in spec.md §4.4. `is_host_device` excludes
    /// `audio_loss` for the `host` sentinel device, which has no capture
    /// audio of its own.
    pub fn process_detection(
        &self,
        device_id: &str,
        is_host_device: bool,
        flags: &DetectionFlags,
        metadata: &IncidentMetadata,
        now: DateTime<Utc>,
    ) -> Result<HashMap<IncidentKind, Transition>> {
        let entry = self
            .devices
            .entry(device_id.to_string())
            .or_insert_with(|| Mutex::new(DeviceIncidentState::default()));
        let mut state = entry
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let mut kinds = vec![IncidentKind::Blackscreen, IncidentKind::Freeze];
        if !is_host_device {
            kinds.push(IncidentKind::AudioLoss);
        }

        let mut transitions = HashMap::new();
        for kind in kinds {
            let detected = match kind {
                IncidentKind::Blackscreen => flags.blackscreen,
                IncidentKind::Freeze => flags.freeze,
                IncidentKind::AudioLoss => !flags.audio_present,
                IncidentKind::Macroblocks => continue,
            };

            if detected {
                self.handle_detected(&mut state, device_id, kind, metadata, now, &mut transitions)?;
            } else {
                self.handle_cleared(&mut state, kind, &mut transitions)?;
            }
        }

        Ok(transitions)
    }

    fn handle_detected(
        &self,
        state: &mut DeviceIncidentState,
        device_id: &str,
        kind: IncidentKind,
        metadata: &IncidentMetadata,
        now: DateTime<Utc>,
        transitions: &mut HashMap<IncidentKind, Transition>,
    ) -> Result<()> {
        if state.active.contains_key(&kind) {
            return Ok(());
        }

        if let Some(&first_detected) = state.pending.get(&kind) {
            if now.signed_duration_since(first_detected).to_std().unwrap_or_default() >= REPORT_DELAY {
                let alert_id = self
                    .store
                    .create_alert_safe(&self.host_name, device_id, kind, metadata)?;
                if let Some(id) = alert_id {
                    info!(device_id, kind = %kind, alert_id = %id, "incident became active");
                    state.active.insert(kind, id);
                    state.pending.remove(&kind);
                } else {
                    warn!(device_id, kind = %kind, "alert store unavailable, incident stays pending");
                }
            }
        } else {
            state.pending.insert(kind, now);
            transitions.insert(kind, Transition::FirstDetected);
        }
        Ok(())
    }

    fn handle_cleared(
        &self,
        state: &mut DeviceIncidentState,
        kind: IncidentKind,
        transitions: &mut HashMap<IncidentKind, Transition>,
    ) -> Result<()> {
        if let Some(alert_id) = state.active.remove(&kind) {
            self.store.resolve_alert(&alert_id)?;
            transitions.insert(kind, Transition::Cleared);
        } else if state.pending.remove(&kind).is_some() {
            transitions.insert(kind, Transition::Cleared);
        }
        Ok(())
    }

    /// Resolves any in-memory active incident whose device is no longer in
    /// `monitored_device_ids`, dropping its state entirely. Returns the
    /// number of incidents resolved.
    pub fn cleanup_orphaned_incidents(&self, monitored_device_ids: &HashSet<String>) -> Result<usize> {
        let orphaned: Vec<String> = self
            .devices
            .iter()
            .filter(|entry| !monitored_device_ids.contains(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();

        let mut resolved = 0;
        for device_id in orphaned {
            if let Some((_, lock)) = self.devices.remove(&device_id) {
                let state = lock.into_inner().unwrap_or_else(std::sync::PoisonError::into_inner);
                for (kind, alert_id) in state.active {
                    self.store.resolve_alert(&alert_id)?;
                    info!(device_id, kind = %kind, "resolved orphaned incident");
                    resolved += 1;
                }
            }
        }
        Ok(resolved)
    }
}
