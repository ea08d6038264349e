//! Deterministic in-memory [`ProfileSource`].
//!
//! Stands in for the user-service collaborator in tests, and backs the daemon
//! when it runs without that service (profiles seeded from a JSON file).

use std::collections::BTreeMap;

use lb_lifecycle::{KycStatus, Profile, Role};
use uuid::Uuid;

use crate::ProfileSource;

#[derive(Clone, Debug, Default)]
pub struct MemoryProfiles {
    profiles: BTreeMap<Uuid, Profile>,
}

impl MemoryProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, profile: Profile) {
        self.profiles.insert(profile.user_id, profile);
    }

    /// Convenience: register a new user and return its id.
    pub fn add(&mut self, role: Role, kyc_status: KycStatus, subscription_active: bool) -> Uuid {
        let user_id = Uuid::new_v4();
        self.insert(Profile {
            user_id,
            role,
            kyc_status,
            subscription_active,
        });
        user_id
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl ProfileSource for MemoryProfiles {
    fn profile(&self, user_id: Uuid) -> Option<Profile> {
        self.profiles.get(&user_id).copied()
    }
}
