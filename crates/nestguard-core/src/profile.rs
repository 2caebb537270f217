//! External collaborators: user profiles and the child learning profile

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::NestResult;
use crate::learning::{LearningAdaptation, SupervisionLevel};
use crate::safety::AgeGroup;

/// What the safety engine needs to know about a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub age_group: AgeGroup,
    #[serde(default)]
    pub parental_controls_enabled: bool,
    #[serde(default)]
    pub supervision_level: SupervisionLevel,
}

impl UserProfile {
    pub fn new(user_id: impl Into<String>, age_group: AgeGroup) -> Self {
        Self {
            user_id: user_id.into(),
            age_group,
            parental_controls_enabled: !age_group.is_self_governing(),
            supervision_level: SupervisionLevel::default(),
        }
    }
}

/// Resolves user profiles. `Ok(None)` means the user is unknown.
#[async_trait]
pub trait UserProfileProvider: Send + Sync {
    async fn get_profile(&self, user_id: &str) -> NestResult<Option<UserProfile>>;
}

/// Receives adaptations once a parent (or auto-approval) has approved them
#[async_trait]
pub trait ChildLearningProfileStore: Send + Sync {
    async fn apply_approved_adaptation(
        &self,
        child_id: &str,
        adaptation: &LearningAdaptation,
    ) -> NestResult<()>;
}

/// Fixed in-process profile table
#[derive(Debug, Default)]
pub struct StaticProfileProvider {
    profiles: RwLock<HashMap<String, UserProfile>>,
}

impl StaticProfileProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(self, profile: UserProfile) -> Self {
        self.insert(profile);
        self
    }

    pub fn insert(&self, profile: UserProfile) {
        self.profiles.write().insert(profile.user_id.clone(), profile);
    }
}

#[async_trait]
impl UserProfileProvider for StaticProfileProvider {
    async fn get_profile(&self, user_id: &str) -> NestResult<Option<UserProfile>> {
        Ok(self.profiles.read().get(user_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_provider_lookup() {
        let provider = StaticProfileProvider::new()
            .with_profile(UserProfile::new("kid-1", AgeGroup::Toddler));

        let profile = provider.get_profile("kid-1").await.unwrap().unwrap();
        assert_eq!(profile.age_group, AgeGroup::Toddler);
        assert!(profile.parental_controls_enabled);
        assert!(provider.get_profile("missing").await.unwrap().is_none());
    }
}
