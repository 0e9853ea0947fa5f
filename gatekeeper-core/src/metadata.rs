//! Run-scoped cache of project display metadata.

use std::collections::HashMap;

use tracing::warn;

use crate::forge::{ProjectInfo, SourceForge};

/// Project name and URL, fetched at most once per project per run.
///
/// When the forge cannot describe a project the numeric id and the forge base
/// URL stand in, and that fallback is cached like a real answer.
#[derive(Debug)]
pub struct ProjectMetadataCache {
    base_url: String,
    entries: HashMap<u64, ProjectInfo>,
}

impl ProjectMetadataCache {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            entries: HashMap::new(),
        }
    }

    pub async fn get(&mut self, forge: &dyn SourceForge, project_id: u64) -> ProjectInfo {
        if let Some(info) = self.entries.get(&project_id) {
            return info.clone();
        }
        let info = match forge.project_info(project_id).await {
            Ok(info) => info,
            Err(e) => {
                warn!("Failed to get project info for {}: {}", project_id, e);
                ProjectInfo {
                    name: project_id.to_string(),
                    web_url: self.base_url.clone(),
                }
            }
        };
        self.entries.insert(project_id, info.clone());
        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeForge;

    #[tokio::test]
    async fn test_fetches_once_per_project() {
        let forge = FakeForge::new().with_project(1, "group/app", "https://git.example.com/group/app");
        let mut cache = ProjectMetadataCache::new("https://git.example.com");

        let first = cache.get(&forge, 1).await;
        let second = cache.get(&forge, 1).await;

        assert_eq!(first, second);
        assert_eq!(first.name, "group/app");
        assert_eq!(forge.project_info_calls(), 1);
    }

    #[tokio::test]
    async fn test_falls_back_to_id_and_base_url() {
        let forge = FakeForge::new();
        let mut cache = ProjectMetadataCache::new("https://git.example.com");

        let info = cache.get(&forge, 42).await;
        cache.get(&forge, 42).await;

        assert_eq!(info.name, "42");
        assert_eq!(info.web_url, "https://git.example.com");
        assert_eq!(forge.project_info_calls(), 1);
    }
}
