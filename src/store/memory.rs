use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    LoginGrant, NewUser, PendingAuthorization, Project, Store, StoreError, User, DEFAULT_ROLE,
};

#[derive(Default)]
struct Inner {
    users: Vec<User>,
    projects: Vec<Project>,
    pending: HashMap<String, PendingAuthorization>,
    grants: HashMap<String, LoginGrant>,
}

/// In-memory `Store` with the same uniqueness and expiry rules as the schema.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn user_count(&self) -> usize {
        self.inner.lock().unwrap().users.len()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().unwrap().pending.len()
    }

    pub fn grant_count(&self) -> usize {
        self.inner.lock().unwrap().grants.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.iter().find(|u| u.id == id).cloned())
    }

    async fn create_user(&self, new: NewUser<'_>) -> Result<User, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.users.iter().any(|u| u.email == new.email) {
            return Err(StoreError::EmailTaken);
        }
        let user = User {
            id: new.id,
            username: new.username.to_string(),
            email: new.email.to_string(),
            password_hash: new.password_hash.map(str::to_string),
            provider: new.provider.as_str().to_string(),
            role: DEFAULT_ROLE.to_string(),
            bookmarked: Vec::new(),
            image_url: String::new(),
            created_at: OffsetDateTime::now_utc(),
        };
        inner.users.push(user.clone());
        Ok(user)
    }

    async fn set_image_url(&self, user_id: Uuid, image_url: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.users.iter_mut().find(|u| u.id == user_id) {
            Some(user) => {
                user.image_url = image_url.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn save_pending_authorization(
        &self,
        pending: &PendingAuthorization,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let now = OffsetDateTime::now_utc();
        inner.pending.retain(|_, p| p.expires_at > now);
        inner
            .pending
            .insert(pending.csrf_state.clone(), pending.clone());
        Ok(())
    }

    async fn take_pending_authorization(
        &self,
        csrf_state: &str,
    ) -> Result<Option<PendingAuthorization>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner
            .pending
            .remove(csrf_state)
            .filter(|p| p.expires_at > OffsetDateTime::now_utc()))
    }

    async fn save_login_grant(&self, grant: &LoginGrant) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let now = OffsetDateTime::now_utc();
        inner.grants.retain(|_, g| g.expires_at > now);
        inner.grants.insert(grant.code.clone(), grant.clone());
        Ok(())
    }

    async fn take_login_grant(&self, code: &str) -> Result<Option<LoginGrant>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner
            .grants
            .remove(code)
            .filter(|g| g.expires_at > OffsetDateTime::now_utc()))
    }

    async fn insert_project(
        &self,
        user_id: Uuid,
        project_name: &str,
        project_data: &serde_json::Value,
    ) -> Result<Project, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let now = OffsetDateTime::now_utc();
        let project = Project {
            id: Uuid::new_v4(),
            user_id,
            project_name: project_name.to_string(),
            project_data: project_data.clone(),
            created_at: now,
            updated_at: now,
        };
        inner.projects.push(project.clone());
        Ok(project)
    }

    async fn update_project(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        project_name: &str,
        project_data: &serde_json::Value,
    ) -> Result<Option<Project>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(project) = inner
            .projects
            .iter_mut()
            .find(|p| p.id == project_id && p.user_id == user_id)
        else {
            return Ok(None);
        };
        project.project_name = project_name.to_string();
        project.project_data = project_data.clone();
        project.updated_at = OffsetDateTime::now_utc();
        Ok(Some(project.clone()))
    }

    async fn list_projects(&self, user_id: Uuid) -> Result<Vec<Project>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<Project> = inner
            .projects
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(rows)
    }
}
