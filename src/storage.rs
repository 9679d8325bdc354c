//! Per-user directory tree on the local filesystem.
//!
//! Every user owns `<root>/<user_id>/` with `organization/`, `canvas/` and
//! `intermediate/` underneath. The tree is created once, when the account is.

use std::path::{Path, PathBuf};

use anyhow::Context;
use bytes::Bytes;
use tracing::debug;
use uuid::Uuid;

pub const PROFILE_IMAGE_FILE: &str = "profile_image.png";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPaths {
    pub root: PathBuf,
    pub organization: PathBuf,
    pub canvas: PathBuf,
    pub intermediate: PathBuf,
}

impl UserPaths {
    fn all(&self) -> [&Path; 4] {
        [
            self.root.as_path(),
            self.organization.as_path(),
            self.canvas.as_path(),
            self.intermediate.as_path(),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct UserStorage {
    common_root: PathBuf,
    public_base: String,
}

impl UserStorage {
    pub fn new(common_root: impl Into<PathBuf>, public_base: &str) -> Self {
        Self {
            common_root: common_root.into(),
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn paths(&self, user_id: Uuid) -> UserPaths {
        let root = self.common_root.join(user_id.to_string());
        UserPaths {
            organization: root.join("organization"),
            canvas: root.join("canvas"),
            intermediate: root.join("intermediate"),
            root,
        }
    }

    /// Creates the user's tree. Existing directories are left as they are.
    pub async fn provision(&self, user_id: Uuid) -> anyhow::Result<UserPaths> {
        let paths = self.paths(user_id);
        for dir in paths.all() {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("create {}", dir.display()))?;
        }
        debug!(%user_id, root = %paths.root.display(), "user namespace provisioned");
        Ok(paths)
    }

    /// Removes the user's tree. Missing trees are fine.
    pub async fn discard(&self, user_id: Uuid) -> anyhow::Result<()> {
        let root = self.paths(user_id).root;
        match tokio::fs::remove_dir_all(&root).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove {}", root.display())),
        }
    }

    /// Writes the profile image and returns the URL it is served under.
    pub async fn put_profile_image(&self, user_id: Uuid, body: Bytes) -> anyhow::Result<String> {
        let paths = self.provision(user_id).await?;
        let target = paths.root.join(PROFILE_IMAGE_FILE);
        tokio::fs::write(&target, &body)
            .await
            .with_context(|| format!("write {}", target.display()))?;
        Ok(self.profile_image_url(user_id))
    }

    /// None when the user never uploaded one.
    pub async fn read_profile_image(&self, user_id: Uuid) -> anyhow::Result<Option<Bytes>> {
        let target = self.paths(user_id).root.join(PROFILE_IMAGE_FILE);
        match tokio::fs::read(&target).await {
            Ok(body) => Ok(Some(Bytes::from(body))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("read {}", target.display())),
        }
    }

    pub fn profile_image_url(&self, user_id: Uuid) -> String {
        format!(
            "{}/server/static/{}/{}",
            self.public_base, user_id, PROFILE_IMAGE_FILE
        )
    }
}
