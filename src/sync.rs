//! Synchronization between the local post cache and the remote collection.
//!
//! [`SyncRepository`] is the single entry point for reading and changing
//! posts. On start it pushes every cached post missing from the remote store
//! and begins observing the remote collection. Every change is written to
//! both stores according to the configured [`SyncPolicy`]. The two writes are
//! never coordinated, so concurrent changes to one post may overwrite each
//! other.

use std::fmt;

use futures::future::join_all;
use log::{debug, error, info, warn};
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
};

use crate::{
    api::remote::RemoteStore,
    cache::PostCache,
    config::SyncPolicy,
    error::{Error, Result},
    post::{
        document::{decode_all, Document},
        Post,
    },
};

pub struct SyncRepository<R: RemoteStore> {
    cache: PostCache,
    remote: R,
    policy: SyncPolicy,
    view: Subscription,
    startup: Mutex<Startup>,
}

enum Startup {
    Running(JoinHandle<ReconcileReport>),
    Done(ReconcileReport),
}

/// Outcome of the startup reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub written: usize,
    pub present: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteKind {
    Create,
    Update,
}

impl fmt::Display for WriteKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Create => write!(f, "insert"),
            Self::Update => write!(f, "update"),
        }
    }
}

impl<R: RemoteStore> SyncRepository<R> {
    /// Start reconciling in the background and observing the remote collection.
    pub fn start(cache: PostCache, remote: R, policy: SyncPolicy) -> Self {
        let startup = tokio::spawn(reconcile(cache.clone(), remote.clone()));
        let view = Subscription::start(remote.watch());
        Self {
            cache,
            remote,
            policy,
            view,
            startup: Mutex::new(Startup::Running(startup)),
        }
    }

    /// Wait for the startup reconciliation to finish.
    pub async fn reconciled(&self) -> ReconcileReport {
        let mut startup = self.startup.lock().await;
        let report = match &mut *startup {
            Startup::Done(report) => return *report,
            Startup::Running(handle) => handle.await.unwrap_or_else(|e| {
                error!("Reconciliation task failed: {}", e);
                ReconcileReport::default()
            }),
        };
        *startup = Startup::Done(report);
        report
    }

    pub const fn cache(&self) -> &PostCache {
        &self.cache
    }

    pub const fn policy(&self) -> SyncPolicy {
        self.policy
    }

    /// Open a new live view of the remote collection.
    pub fn subscribe_remote(&self) -> Subscription {
        Subscription::start(self.remote.watch())
    }

    /// Every remote post, or the local cache when the remote store can't be
    /// listed.
    pub async fn snapshot(&self) -> Result<Vec<Post>> {
        match self.remote.list().await {
            Ok(documents) => Ok(decode_all(&documents)),
            Err(e) => {
                warn!("Remote unavailable ({}), showing local cache", e);
                self.cache.all().await
            }
        }
    }

    /// Posts closer than `radius_km` to the given point, nearest first.
    pub async fn nearby(&self, lat: f64, lon: f64, radius_km: f64) -> Result<Vec<Post>> {
        let mut posts: Vec<(f64, Post)> = self
            .snapshot()
            .await?
            .into_iter()
            .map(|post| (post.distance_km(lat, lon), post))
            .filter(|(distance, _)| *distance < radius_km)
            .collect();
        posts.sort_by(|(a, _), (b, _)| a.total_cmp(b));
        Ok(posts.into_iter().map(|(_, post)| post).collect())
    }

    /// Look a post up in the remote view, then the remote store, then the
    /// local cache.
    pub async fn find(&self, id: &str) -> Result<Post> {
        if let Some(post) = self.view.current().into_iter().find(|post| post.id() == id) {
            return Ok(post);
        }
        match self.remote.list().await {
            Ok(documents) => {
                if let Some(post) = decode_all(&documents).into_iter().find(|post| post.id() == id) {
                    return Ok(post);
                }
            }
            Err(e) => debug!("Remote lookup of {} failed: {}", id, e),
        }
        self.cache.get(id).await
    }

    pub async fn create_post(&self, post: Post) -> Result<PendingWrites> {
        post.validate()?;
        info!("Creating post {}", post.id());
        self.write(post, WriteKind::Create).await
    }

    pub async fn upvote(&self, post: &mut Post, voter: &str) -> Result<PendingWrites> {
        self.mutate(post, voter, |post| post.upvote(voter)).await
    }

    pub async fn downvote(&self, post: &mut Post, voter: &str) -> Result<PendingWrites> {
        self.mutate(post, voter, |post| post.downvote(voter)).await
    }

    pub async fn remove_upvote(&self, post: &mut Post, voter: &str) -> Result<PendingWrites> {
        self.mutate(post, voter, |post| post.remove_upvote(voter)).await
    }

    pub async fn remove_downvote(&self, post: &mut Post, voter: &str) -> Result<PendingWrites> {
        self.mutate(post, voter, |post| post.remove_downvote(voter)).await
    }

    /// Appends the rating even when `voter` already rated this post.
    pub async fn rate(&self, post: &mut Post, voter: &str, rating: u8) -> Result<PendingWrites> {
        if !(1..=5).contains(&rating) {
            return Err(Error::validation(format!(
                "rating must be between 1 and 5, got {}",
                rating
            )));
        }
        self.mutate(post, voter, |post| post.rate(voter, rating)).await
    }

    pub async fn add_comment(&self, post: &mut Post, voter: &str, text: &str) -> Result<PendingWrites> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::validation("write a comment first"));
        }
        self.mutate(post, voter, |post| post.add_comment(voter, text)).await
    }

    async fn mutate<F>(&self, post: &mut Post, voter: &str, change: F) -> Result<PendingWrites>
    where
        F: FnOnce(&mut Post) -> bool,
    {
        if voter.trim().is_empty() {
            return Err(Error::validation("missing credentials, sign in first"));
        }
        if !change(post) {
            debug!("post {} unchanged", post.id());
            return Ok(PendingWrites::default());
        }
        self.write(post.clone(), WriteKind::Update).await
    }

    async fn write(&self, post: Post, kind: WriteKind) -> Result<PendingWrites> {
        let document = Document::from_post(&post);

        if self.policy.waits() {
            write_local(&self.cache, &post, kind).await?;
            write_remote(&self.remote, &document, kind).await?;
            return Ok(PendingWrites::default());
        }

        let cache = self.cache.clone();
        let local = tokio::spawn(async move {
            if let Err(e) = write_local(&cache, &post, kind).await {
                error!("Failed to {} post {} locally: {}", kind, post.id(), e);
            }
        });

        let remote = self.remote.clone();
        let remote = tokio::spawn(async move {
            if let Err(e) = write_remote(&remote, &document, kind).await {
                error!("Failed to {} post {} remotely: {}", kind, document.id, e);
            }
        });

        Ok(PendingWrites {
            tasks: vec![local, remote],
        })
    }
}

async fn write_local(cache: &PostCache, post: &Post, kind: WriteKind) -> Result<()> {
    match kind {
        WriteKind::Create => cache.insert(post).await.map(|_| ()),
        WriteKind::Update => cache.update(post).await,
    }
}

async fn write_remote<R: RemoteStore>(remote: &R, document: &Document, kind: WriteKind) -> Result<()> {
    match kind {
        WriteKind::Create => remote.set(document).await,
        WriteKind::Update => remote.merge(document).await,
    }
}

enum Outcome {
    Written,
    Present,
    Failed,
}

async fn reconcile<R: RemoteStore>(cache: PostCache, remote: R) -> ReconcileReport {
    let mut report = ReconcileReport::default();
    let posts = match cache.all().await {
        Ok(posts) => posts,
        Err(e) => {
            error!("Failed to read local posts: {}", e);
            return report;
        }
    };
    if posts.is_empty() {
        debug!("Local cache is empty, nothing to reconcile");
        return report;
    }

    let tasks: Vec<_> = posts
        .into_iter()
        .map(|post| {
            let remote = remote.clone();
            tokio::spawn(async move { reconcile_post(&remote, &post).await })
        })
        .collect();

    for outcome in join_all(tasks).await {
        match outcome {
            Ok(Outcome::Written) => report.written += 1,
            Ok(Outcome::Present) => report.present += 1,
            Ok(Outcome::Failed) => report.failed += 1,
            Err(e) => {
                error!("Reconciliation task failed: {}", e);
                report.failed += 1;
            }
        }
    }

    info!(
        "Reconciled {} posts: {} written, {} present, {} failed",
        report.written + report.present + report.failed,
        report.written,
        report.present,
        report.failed
    );
    report
}

async fn reconcile_post<R: RemoteStore>(remote: &R, post: &Post) -> Outcome {
    match remote.exists(post.id()).await {
        Ok(true) => {
            debug!("Post {} already exists remotely", post.id());
            Outcome::Present
        }
        Ok(false) => match remote.set(&Document::from_post(post)).await {
            Ok(()) => {
                info!("Post {} synced to remote", post.id());
                Outcome::Written
            }
            Err(e) => {
                error!("Failed to insert post {} remotely: {}", post.id(), e);
                Outcome::Failed
            }
        },
        Err(e) => {
            error!("Failed to check post {} remotely: {}", post.id(), e);
            Outcome::Failed
        }
    }
}

/// Writes issued by one change. Dropping this detaches them, they still run
/// to completion.
#[derive(Debug, Default)]
pub struct PendingWrites {
    tasks: Vec<JoinHandle<()>>,
}

impl PendingWrites {
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait until every write finished, successfully or not.
    pub async fn settled(self) {
        for result in join_all(self.tasks).await {
            if let Err(e) = result {
                error!("Write task failed: {}", e);
            }
        }
    }
}

/// Live list of decoded remote posts. Stops listening when unsubscribed or
/// dropped.
#[derive(Debug)]
pub struct Subscription {
    posts: watch::Receiver<Vec<Post>>,
    task: JoinHandle<()>,
}

impl Subscription {
    fn start(mut documents: watch::Receiver<Vec<Document>>) -> Self {
        let initial = decode_all(&documents.borrow_and_update());
        let (sender, posts) = watch::channel(initial);

        let task = tokio::spawn(async move {
            while documents.changed().await.is_ok() {
                let list = decode_all(&documents.borrow_and_update());
                debug!("Remote collection changed, {} posts", list.len());
                sender.send_replace(list);
            }
        });

        Self { posts, task }
    }

    pub fn current(&self) -> Vec<Post> {
        self.posts.borrow().clone()
    }

    /// Wait for the next change, `None` once the remote stopped publishing.
    pub async fn changed(&mut self) -> Option<Vec<Post>> {
        self.posts.changed().await.ok()?;
        Some(self.posts.borrow_and_update().clone())
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
