use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
};

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use domain_accounting::{
    model::{
        entity::{
            Allocation, AllocationUsage, AllocationUserUsage, Association, Organization, Project,
            User,
        },
        vo::{Scope, ScopeUsage},
    },
    repository::{
        AllocationRepo, AllocationUsageRepo, AssociationRepo, DBRepository, MutableRepository,
        ReadOnlyRepository, ScopeRepo, UserRepo,
    },
};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

trait Record: Clone + Serialize + DeserializeOwned + Send + Sync {
    fn id(&self) -> Uuid;
}

macro_rules! record {
    ($($ty:ty),*) => {
        $(impl Record for $ty {
            fn id(&self) -> Uuid {
                self.id
            }
        })*
    };
}

record!(
    Allocation,
    Association,
    AllocationUsage,
    AllocationUserUsage,
    Organization,
    Project,
    User
);

/// One JSON array file.
struct Table<T> {
    file: PathBuf,
    rows: Mutex<Vec<T>>,
    /// Rows as last written to `file`.
    committed: Mutex<Vec<T>>,
}

impl<T: Record> Table<T> {
    async fn load(dir: &Path, name: &str) -> anyhow::Result<Self> {
        let file = dir.join(name);
        let rows = if file.is_file() {
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Unable to read {}", file.display()))?;
            serde_json::from_slice(&bytes)
                .with_context(|| format!("Unable to parse {}", file.display()))?
        } else {
            vec![]
        };
        Ok(Self {
            file,
            committed: Mutex::new(rows.clone()),
            rows: Mutex::new(rows),
        })
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<T> {
        self.rows
            .lock()
            .await
            .iter()
            .find(|x| x.id() == id)
            .cloned()
            .ok_or_else(|| anyhow!("No such id: {id}"))
    }

    async fn all(&self) -> Vec<T> {
        self.rows.lock().await.clone()
    }

    async fn filter(&self, predicate: impl Fn(&T) -> bool) -> Vec<T> {
        self.rows.lock().await.iter().filter(|x| predicate(x)).cloned().collect()
    }

    async fn update(&self, entity: &T) -> anyhow::Result<()> {
        let mut rows = self.rows.lock().await;
        let Some(row) = rows.iter_mut().find(|x| x.id() == entity.id()) else {
            bail!("No such id: {}", entity.id());
        };
        *row = entity.clone();
        Ok(())
    }

    async fn insert(&self, entity: &T) -> anyhow::Result<Uuid> {
        let mut rows = self.rows.lock().await;
        if rows.iter().any(|x| x.id() == entity.id()) {
            bail!("Duplicate id: {}", entity.id());
        }
        rows.push(entity.clone());
        Ok(entity.id())
    }

    async fn remove(&self, id: Uuid) -> anyhow::Result<()> {
        let mut rows = self.rows.lock().await;
        let Some(index) = rows.iter().position(|x| x.id() == id) else {
            bail!("No such id: {id}");
        };
        rows.remove(index);
        Ok(())
    }

    async fn save(&self) -> anyhow::Result<()> {
        let rows = self.rows.lock().await;
        let json = serde_json::to_vec_pretty(&*rows)?;
        tokio::fs::write(&self.file, json)
            .await
            .with_context(|| format!("Unable to write {}", self.file.display()))?;
        *self.committed.lock().await = rows.clone();
        Ok(())
    }

    async fn restore(&self) {
        let mut rows = self.rows.lock().await;
        *rows = self.committed.lock().await.clone();
    }
}

/// Every record kind kept as JSON files under one directory.
///
/// Writes stay in memory until `save_changed`, which rewrites all files, or
/// `discard_changed`, which forgets them.
pub struct JSONRepository {
    allocations: Table<Allocation>,
    associations: Table<Association>,
    usages: Table<AllocationUsage>,
    user_usages: Table<AllocationUserUsage>,
    organizations: Table<Organization>,
    projects: Table<Project>,
    users: Table<User>,
    changed: AtomicBool,
}

impl JSONRepository {
    pub async fn new(save_dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = save_dir.as_ref();
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Unable to create {}", dir.display()))?;
        Ok(Self {
            allocations: Table::load(dir, "allocations.json").await?,
            associations: Table::load(dir, "associations.json").await?,
            usages: Table::load(dir, "allocation_usages.json").await?,
            user_usages: Table::load(dir, "allocation_user_usages.json").await?,
            organizations: Table::load(dir, "organizations.json").await?,
            projects: Table::load(dir, "projects.json").await?,
            users: Table::load(dir, "users.json").await?,
            changed: AtomicBool::new(false),
        })
    }

    fn touch(&self) {
        self.changed.store(true, Ordering::Release);
    }

    async fn flush(&self) -> anyhow::Result<bool> {
        if !self.changed.swap(false, Ordering::AcqRel) {
            return Ok(false);
        }
        let saved = async {
            self.allocations.save().await?;
            self.associations.save().await?;
            self.usages.save().await?;
            self.user_usages.save().await?;
            self.organizations.save().await?;
            self.projects.save().await?;
            self.users.save().await
        }
        .await;
        if let Err(e) = saved {
            self.touch();
            return Err(e);
        }
        Ok(true)
    }

    async fn discard(&self) -> anyhow::Result<()> {
        if !self.changed.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        self.allocations.restore().await;
        self.associations.restore().await;
        self.usages.restore().await;
        self.user_usages.restore().await;
        self.organizations.restore().await;
        self.projects.restore().await;
        self.users.restore().await;
        tracing::debug!("Discarded uncommitted changes");
        Ok(())
    }
}

#[async_trait]
impl ReadOnlyRepository<Allocation> for JSONRepository {
    async fn get_by_id(&self, id: Uuid) -> anyhow::Result<Allocation> {
        self.allocations.get(id).await
    }
    async fn get_all(&self) -> anyhow::Result<Vec<Allocation>> {
        Ok(self.allocations.all().await)
    }
}

#[async_trait]
impl MutableRepository<Allocation> for JSONRepository {
    async fn update(&self, entity: &Allocation) -> anyhow::Result<()> {
        self.allocations.update(entity).await?;
        self.touch();
        Ok(())
    }
    async fn insert(&self, entity: &Allocation) -> anyhow::Result<Uuid> {
        let id = self.allocations.insert(entity).await?;
        self.touch();
        Ok(id)
    }
    async fn delete_by_id(&self, id: Uuid) -> anyhow::Result<()> {
        self.allocations.remove(id).await?;
        self.touch();
        Ok(())
    }
    async fn save_changed(&self) -> anyhow::Result<bool> {
        self.flush().await
    }
    async fn discard_changed(&self) -> anyhow::Result<()> {
        self.discard().await
    }
}

impl DBRepository<Allocation> for JSONRepository {}

#[async_trait]
impl AllocationRepo for JSONRepository {
    async fn get_provisioned(&self) -> anyhow::Result<Vec<Allocation>> {
        Ok(self.allocations.filter(|x| !x.backend_id.trim().is_empty()).await)
    }

    async fn get_by_project(&self, project_id: Uuid) -> anyhow::Result<Vec<Allocation>> {
        Ok(self.allocations.filter(|x| x.project_id == project_id).await)
    }
}

#[async_trait]
impl ReadOnlyRepository<Association> for JSONRepository {
    async fn get_by_id(&self, id: Uuid) -> anyhow::Result<Association> {
        self.associations.get(id).await
    }
    async fn get_all(&self) -> anyhow::Result<Vec<Association>> {
        Ok(self.associations.all().await)
    }
}

#[async_trait]
impl MutableRepository<Association> for JSONRepository {
    async fn update(&self, entity: &Association) -> anyhow::Result<()> {
        self.associations.update(entity).await?;
        self.touch();
        Ok(())
    }
    async fn insert(&self, entity: &Association) -> anyhow::Result<Uuid> {
        let id = self.associations.insert(entity).await?;
        self.touch();
        Ok(id)
    }
    async fn delete_by_id(&self, id: Uuid) -> anyhow::Result<()> {
        self.associations.remove(id).await?;
        self.touch();
        Ok(())
    }
    async fn save_changed(&self) -> anyhow::Result<bool> {
        self.flush().await
    }
    async fn discard_changed(&self) -> anyhow::Result<()> {
        self.discard().await
    }
}

impl DBRepository<Association> for JSONRepository {}

#[async_trait]
impl AssociationRepo for JSONRepository {
    async fn get_by_allocation(&self, allocation_id: Uuid) -> anyhow::Result<Vec<Association>> {
        Ok(self.associations.filter(|x| x.allocation_id == allocation_id).await)
    }

    async fn delete_by_username(&self, allocation_id: Uuid, username: &str) -> anyhow::Result<()> {
        let mut rows = self.associations.rows.lock().await;
        let before = rows.len();
        rows.retain(|x| !(x.allocation_id == allocation_id && x.username == username));
        if rows.len() != before {
            self.touch();
        }
        Ok(())
    }
}

#[async_trait]
impl AllocationUsageRepo for JSONRepository {
    async fn upsert_usage(&self, usage: &AllocationUsage) -> anyhow::Result<AllocationUsage> {
        let mut rows = self.usages.rows.lock().await;
        let stored = match rows.iter_mut().find(|x| {
            x.allocation_id == usage.allocation_id
                && x.year == usage.year
                && x.month == usage.month
        }) {
            Some(row) => {
                *row = AllocationUsage {
                    id: row.id,
                    ..usage.clone()
                };
                row.clone()
            }
            None => {
                rows.push(usage.clone());
                usage.clone()
            }
        };
        self.touch();
        Ok(stored)
    }

    async fn upsert_user_usage(&self, usage: &AllocationUserUsage) -> anyhow::Result<()> {
        let mut rows = self.user_usages.rows.lock().await;
        match rows.iter_mut().find(|x| {
            x.allocation_usage_id == usage.allocation_usage_id && x.username == usage.username
        }) {
            Some(row) => {
                *row = AllocationUserUsage {
                    id: row.id,
                    ..usage.clone()
                }
            }
            None => rows.push(usage.clone()),
        }
        self.touch();
        Ok(())
    }

    async fn get_usage(
        &self,
        allocation_id: Uuid,
        year: i32,
        month: u32,
    ) -> anyhow::Result<Option<AllocationUsage>> {
        Ok(self
            .usages
            .filter(|x| x.allocation_id == allocation_id && x.year == year && x.month == month)
            .await
            .pop())
    }

    async fn get_user_usages(
        &self,
        allocation_usage_id: Uuid,
    ) -> anyhow::Result<Vec<AllocationUserUsage>> {
        Ok(self
            .user_usages
            .filter(|x| x.allocation_usage_id == allocation_usage_id)
            .await)
    }
}

#[async_trait]
impl ScopeRepo for JSONRepository {
    async fn get_project(&self, id: Uuid) -> anyhow::Result<Project> {
        self.projects.get(id).await
    }

    async fn get_organization(&self, id: Uuid) -> anyhow::Result<Organization> {
        self.organizations.get(id).await
    }

    async fn get_projects_by_organization(
        &self,
        organization_id: Uuid,
    ) -> anyhow::Result<Vec<Project>> {
        Ok(self.projects.filter(|x| x.organization_id == organization_id).await)
    }

    async fn update_usage(&self, scope: Scope, usage: &ScopeUsage) -> anyhow::Result<()> {
        match scope {
            Scope::Project(id) => {
                let mut rows = self.projects.rows.lock().await;
                let row = rows
                    .iter_mut()
                    .find(|x| x.id == id)
                    .ok_or_else(|| anyhow!("No such project: {id}"))?;
                row.usage = *usage;
            }
            Scope::Organization(id) => {
                let mut rows = self.organizations.rows.lock().await;
                let row = rows
                    .iter_mut()
                    .find(|x| x.id == id)
                    .ok_or_else(|| anyhow!("No such organization: {id}"))?;
                row.usage = *usage;
            }
        }
        self.touch();
        Ok(())
    }
}

#[async_trait]
impl ReadOnlyRepository<User> for JSONRepository {
    async fn get_by_id(&self, id: Uuid) -> anyhow::Result<User> {
        self.users.get(id).await
    }
    async fn get_all(&self) -> anyhow::Result<Vec<User>> {
        Ok(self.users.all().await)
    }
}

#[async_trait]
impl UserRepo for JSONRepository {
    async fn get_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
        Ok(self.users.filter(|x| x.username == username).await.pop())
    }
}
