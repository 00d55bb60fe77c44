use dashmap::DashMap;

/// user_id -> display name, with a fallback label for unknown users.
pub struct ProfileDirectory {
    names: DashMap<String, String>,
    fallback: String,
}

impl ProfileDirectory {
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            names: DashMap::new(),
            fallback: fallback.into(),
        }
    }

    pub fn set(&self, user_id: impl Into<String>, display_name: impl Into<String>) {
        self.names.insert(user_id.into(), display_name.into());
    }

    pub fn remove(&self, user_id: &str) {
        self.names.remove(user_id);
    }

    pub fn get(&self, user_id: &str) -> Option<String> {
        self.names.get(user_id).map(|n| n.value().clone())
    }

    /// Display name, or the fallback label. A missing profile never hides a
    /// presence row.
    pub fn display_name(&self, user_id: &str) -> String {
        self.get(user_id).unwrap_or_else(|| self.fallback.clone())
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }
}
