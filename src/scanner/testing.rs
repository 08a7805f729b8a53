//! In-memory [`Gateway`] for scanner tests.

use crate::error::{Result, ScanError};
use crate::github::Gateway;
use crate::model::{RepoFiles, RepositoryRef};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

#[derive(Default)]
pub(crate) struct InMemoryGateway {
    orgs: HashMap<String, Vec<String>>,
    users: HashMap<String, Vec<RepositoryRef>>,
    files: HashMap<String, RepoFiles>,
    failing: HashSet<String>,
    delay: Option<Duration>,
}

impl InMemoryGateway {
    pub fn with_org(mut self, org: &str, members: &[&str]) -> Self {
        self.orgs.insert(
            org.to_ascii_lowercase(),
            members.iter().map(|m| m.to_string()).collect(),
        );
        self
    }

    pub fn with_user(self, login: &str, repos: &[&str]) -> Self {
        let repos = repos
            .iter()
            .map(|name| RepositoryRef::new(login, *name, "main"))
            .collect();
        self.with_repos(login, repos)
    }

    pub fn with_repos(mut self, login: &str, repos: Vec<RepositoryRef>) -> Self {
        self.users.insert(login.to_ascii_lowercase(), repos);
        self
    }

    pub fn with_file(mut self, full_name: &str, path: &str, content: &str) -> Self {
        self.files
            .entry(full_name.to_string())
            .or_default()
            .insert(path.to_string(), content.as_bytes().to_vec());
        self
    }

    pub fn failing_repo(mut self, full_name: &str) -> Self {
        self.failing.insert(full_name.to_string());
        self
    }

    /// Every call sleeps this long first, so concurrent workers interleave.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl Gateway for InMemoryGateway {
    fn list_org_members<'a>(&'a self, org: &'a str) -> BoxStream<'a, Result<String>> {
        let members = self.orgs.get(&org.to_ascii_lowercase()).cloned();
        stream::once(async move {
            self.pause().await;
            members
                .map(|m| stream::iter(m.into_iter().map(Ok::<_, ScanError>)))
                .ok_or_else(|| ScanError::OrgNotFound(org.to_string()))
        })
        .try_flatten()
        .boxed()
    }

    fn list_user_repos<'a>(&'a self, login: &'a str) -> BoxStream<'a, Result<RepositoryRef>> {
        let repos = self.users.get(&login.to_ascii_lowercase()).cloned();
        stream::once(async move {
            self.pause().await;
            repos
                .map(|r| stream::iter(r.into_iter().map(Ok::<_, ScanError>)))
                .ok_or_else(|| ScanError::UserNotFound(login.to_string()))
        })
        .try_flatten()
        .boxed()
    }

    async fn fetch_repo_manifest_files(&self, repo: &RepositoryRef) -> Result<RepoFiles> {
        self.pause().await;
        let full_name = repo.full_name();
        if self.failing.contains(&full_name) {
            return Err(ScanError::RepoFetch {
                repo: full_name,
                source: Box::new(ScanError::Http {
                    status: 500,
                    message: "Server Error".into(),
                }),
            });
        }
        Ok(self.files.get(&full_name).cloned().unwrap_or_default())
    }
}
