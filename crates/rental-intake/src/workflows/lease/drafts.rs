use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::signing::SigningParty;
use crate::workflows::applications::domain::ApplicationId;
use crate::workflows::applications::repository::RepositoryError;

/// Partially filled signing form, saved so a party can resume later.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LeaseDraft {
    #[serde(default)]
    pub signer_name: Option<String>,
    #[serde(default)]
    pub disclosure_acknowledgments: BTreeMap<String, bool>,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

/// In-process autosave store keyed by application and signing party.
#[derive(Debug, Default)]
pub struct LeaseDraftStore {
    drafts: Mutex<HashMap<(ApplicationId, SigningParty), LeaseDraft>>,
}

impl LeaseDraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the party's draft; the last save wins.
    pub fn save(
        &self,
        application_id: &ApplicationId,
        party: SigningParty,
        mut draft: LeaseDraft,
        now: DateTime<Utc>,
    ) -> Result<LeaseDraft, RepositoryError> {
        draft.saved_at = Some(now);
        let mut guard = self
            .drafts
            .lock()
            .map_err(|_| RepositoryError::Unavailable("lease draft store poisoned".to_string()))?;
        guard.insert((application_id.clone(), party), draft.clone());
        Ok(draft)
    }

    pub fn load(
        &self,
        application_id: &ApplicationId,
        party: SigningParty,
    ) -> Result<Option<LeaseDraft>, RepositoryError> {
        let guard = self
            .drafts
            .lock()
            .map_err(|_| RepositoryError::Unavailable("lease draft store poisoned".to_string()))?;
        Ok(guard.get(&(application_id.clone(), party)).cloned())
    }

    /// Drop a draft once its party has signed.
    pub fn discard(
        &self,
        application_id: &ApplicationId,
        party: SigningParty,
    ) -> Result<(), RepositoryError> {
        let mut guard = self
            .drafts
            .lock()
            .map_err(|_| RepositoryError::Unavailable("lease draft store poisoned".to_string()))?;
        guard.remove(&(application_id.clone(), party));
        Ok(())
    }
}
