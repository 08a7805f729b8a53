//! [`Gateway`] trait and its GitHub REST implementation.

use super::client::{RateLimitedClient, GITHUB_RAW};
use super::pagination::{paginate, PER_PAGE};
use super::watch::{TreeEntry, WatchList};
use crate::error::{Result, ScanError};
use crate::model::{RepoFiles, RepositoryRef};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use reqwest::Method;
use serde::Deserialize;
use tracing::{debug, warn};

/// Typed, read-only GitHub operations used by the scanner.
///
/// Listing operations return lazy streams: pages are fetched as the stream
/// is consumed, and calling the method again starts from the first page.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Logins of the organization's members.
    ///
    /// Fails with [`ScanError::OrgNotFound`] on 404 and
    /// [`ScanError::AccessDenied`] on a 403 that is not a rate limit.
    fn list_org_members<'a>(&'a self, org: &'a str) -> BoxStream<'a, Result<String>>;

    /// Public repositories owned by `login`. A user without public
    /// repositories yields an empty stream; 404 yields
    /// [`ScanError::UserNotFound`].
    fn list_user_repos<'a>(&'a self, login: &'a str) -> BoxStream<'a, Result<RepositoryRef>>;

    /// Contents of the watched files of `repo`. Any failure is wrapped in
    /// [`ScanError::RepoFetch`].
    async fn fetch_repo_manifest_files(&self, repo: &RepositoryRef) -> Result<RepoFiles>;
}

/// [`Gateway`] backed by the GitHub REST API.
pub struct GitHubApi {
    client: RateLimitedClient,
    watch: WatchList,
}

#[derive(Deserialize)]
struct Member {
    login: String,
}

#[derive(Deserialize)]
struct Owner {
    login: String,
}

#[derive(Deserialize)]
struct Repo {
    name: String,
    owner: Owner,
    default_branch: Option<String>,
    #[serde(default)]
    private: bool,
    description: Option<String>,
    html_url: Option<String>,
    pushed_at: Option<DateTime<Utc>>,
}

impl From<Repo> for RepositoryRef {
    fn from(repo: Repo) -> Self {
        Self {
            owner: repo.owner.login,
            name: repo.name,
            // Empty repositories have no default branch yet.
            default_branch: repo.default_branch.unwrap_or_else(|| "HEAD".to_string()),
            private: repo.private,
            description: repo.description,
            html_url: repo.html_url,
            pushed_at: repo.pushed_at,
        }
    }
}

#[derive(Deserialize)]
struct Tree {
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

impl GitHubApi {
    pub fn new(client: RateLimitedClient, watch: WatchList) -> Self {
        Self { client, watch }
    }

    async fn fetch_files(&self, repo: &RepositoryRef) -> Result<RepoFiles> {
        let segments = [
            "repos",
            repo.owner.as_str(),
            repo.name.as_str(),
            "git",
            "trees",
            repo.default_branch.as_str(),
        ];
        let url = self.client.endpoint(&segments, &[("recursive", "1")])?;

        let response = match self.client.request(Method::GET, url, None).await {
            Ok(response) => response,
            // 409: repository has no commits
            Err(ScanError::Http { status: 409, .. }) => return Ok(RepoFiles::new()),
            Err(e) => return Err(e),
        };
        let tree: Tree = serde_json::from_slice(&response.bytes().await?)?;
        if tree.truncated {
            warn!(
                repo = %repo.full_name(),
                "tree listing truncated, some files were not inspected"
            );
        }

        let mut files = RepoFiles::new();
        for entry in self.watch.select(repo, &tree.tree) {
            let mut segments = vec!["repos", repo.owner.as_str(), repo.name.as_str(), "contents"];
            segments.extend(entry.path.split('/'));
            let url = self
                .client
                .endpoint(&segments, &[("ref", repo.default_branch.as_str())])?;

            let content = self
                .client
                .request(Method::GET, url, Some(GITHUB_RAW))
                .await?
                .bytes()
                .await?;
            files.insert(entry.path.clone(), content.to_vec());
        }

        debug!(repo = %repo.full_name(), files = files.len(), "fetched watched files");
        Ok(files)
    }
}

fn org_error(err: ScanError, org: &str) -> ScanError {
    match err {
        ScanError::Http { status: 404, .. } => ScanError::OrgNotFound(org.to_string()),
        ScanError::Http { status: 401, .. } => ScanError::Unauthorized,
        ScanError::Http { status: 403, message } => ScanError::AccessDenied(message),
        other => other,
    }
}

fn user_error(err: ScanError, login: &str) -> ScanError {
    match err {
        ScanError::Http { status: 404, .. } => ScanError::UserNotFound(login.to_string()),
        ScanError::Http { status: 401, .. } => ScanError::Unauthorized,
        ScanError::Http { status: 403, message } => ScanError::AccessDenied(message),
        other => other,
    }
}

#[async_trait]
impl Gateway for GitHubApi {
    fn list_org_members<'a>(&'a self, org: &'a str) -> BoxStream<'a, Result<String>> {
        let url = match self
            .client
            .endpoint(&["orgs", org, "members"], &[("per_page", PER_PAGE)])
        {
            Ok(url) => url,
            Err(e) => return stream::once(async move { Err(e) }).boxed(),
        };

        paginate::<Member>(&self.client, url)
            .map_ok(|member| member.login)
            .map_err(move |e| org_error(e, org))
            .boxed()
    }

    fn list_user_repos<'a>(&'a self, login: &'a str) -> BoxStream<'a, Result<RepositoryRef>> {
        let url = match self.client.endpoint(
            &["users", login, "repos"],
            &[("per_page", PER_PAGE), ("type", "owner"), ("sort", "full_name")],
        ) {
            Ok(url) => url,
            Err(e) => return stream::once(async move { Err(e) }).boxed(),
        };

        paginate::<Repo>(&self.client, url)
            .try_filter_map(|repo| async move {
                Ok((!repo.private).then(|| RepositoryRef::from(repo)))
            })
            .map_err(move |e| user_error(e, login))
            .boxed()
    }

    async fn fetch_repo_manifest_files(&self, repo: &RepositoryRef) -> Result<RepoFiles> {
        self.fetch_files(repo)
            .await
            .map_err(|e| ScanError::RepoFetch {
                repo: repo.full_name(),
                source: Box::new(e),
            })
    }
}
