//! GitHub API access: rate-limited HTTP, pagination and typed operations.

mod client;
mod gateway;
mod pagination;
mod watch;

pub use client::{
    format_reset, ClientOptions, RateLimitHandle, RateLimitState, RateLimitedClient, RetryPolicy,
    DEFAULT_API_URL, GITHUB_JSON, GITHUB_RAW,
};
pub use gateway::{Gateway, GitHubApi};
pub use pagination::{next_link, paginate, PER_PAGE};
pub use watch::{TreeEntry, WatchList, MAX_FILES, MAX_FILE_SIZE};
