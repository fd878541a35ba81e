use std::{
    path::Path,
    sync::{Arc, Mutex},
};

use log::{debug, info};
use rusqlite::{params, types::Type, Connection, OptionalExtension, Row};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::watch;

use crate::{
    error::{Error, Result},
    post::{Category, Post},
};

pub const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS post (
    id          TEXT PRIMARY KEY NOT NULL,
    title       TEXT NOT NULL,
    description TEXT NOT NULL,
    photo       TEXT,
    address     TEXT,
    lat         REAL NOT NULL DEFAULT 0,
    lon         REAL NOT NULL DEFAULT 0,
    lifespan    INTEGER NOT NULL DEFAULT 30,
    category    TEXT NOT NULL DEFAULT 'NORMAL',
    upvotes     INTEGER NOT NULL DEFAULT 0,
    downvotes   INTEGER NOT NULL DEFAULT 0,
    user_up     TEXT NOT NULL DEFAULT '[]',
    user_down   TEXT NOT NULL DEFAULT '[]',
    ratings     TEXT NOT NULL DEFAULT '[]',
    user_rate   TEXT NOT NULL DEFAULT '[]',
    comments    TEXT NOT NULL DEFAULT '[]'
);
";

const SELECT_SQL: &str = "SELECT id, title, description, photo, address, lat, lon, lifespan, category, user_up, user_down, ratings, user_rate, comments FROM post";

/// Local post table.
///
/// Every call runs on the blocking pool, and every successful write republishes
/// the whole table to [`PostCache::list`] observers.
#[derive(Debug, Clone)]
pub struct PostCache {
    conn: Arc<Mutex<Connection>>,
    posts: Arc<watch::Sender<Vec<Post>>>,
}

impl PostCache {
    pub fn open(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Connecting to database: {}", path.display());
        } else {
            info!("Creating database: {}", path.display());
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA_SQL)?;
        let posts = select_all(&conn)?;
        debug!("{} posts in local cache", posts.len());

        let (sender, _) = watch::channel(posts);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            posts: Arc::new(sender),
        })
    }

    async fn run<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self.conn.clone();
        let result = tokio::task::spawn_blocking(move || {
            let guard = conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            f(&guard)
        })
        .await??;
        Ok(result)
    }

    async fn publish(&self) -> Result<()> {
        let posts = self.run(select_all).await?;
        self.posts.send_replace(posts);
        Ok(())
    }

    /// Observe the table, the receiver always holds the latest full list.
    pub fn list(&self) -> watch::Receiver<Vec<Post>> {
        self.posts.subscribe()
    }

    pub async fn all(&self) -> Result<Vec<Post>> {
        self.run(select_all).await
    }

    /// Fails with [`Error::NotFound`] when no row has this id.
    pub async fn get(&self, id: &str) -> Result<Post> {
        let key = id.to_string();
        let post = self
            .run(move |conn| {
                conn.query_row(&format!("{} WHERE id = ?1", SELECT_SQL), params![key], read_post)
                    .optional()
            })
            .await?;
        post.ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Returns the new row id, or `None` when a post with the same id already
    /// exists and the insert was ignored.
    pub async fn insert(&self, post: &Post) -> Result<Option<i64>> {
        let row = PostRow::new(post)?;
        let inserted = self
            .run(move |conn| {
                let changed = conn.execute(
                    "INSERT OR IGNORE INTO post (id, title, description, photo, address, lat, lon, lifespan, category, upvotes, downvotes, user_up, user_down, ratings, user_rate, comments)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                    params![
                        row.id, row.title, row.description, row.photo, row.address, row.lat,
                        row.lon, row.lifespan, row.category, row.upvotes, row.downvotes,
                        row.user_up, row.user_down, row.ratings, row.user_rate, row.comments
                    ],
                )?;
                Ok((changed > 0).then(|| conn.last_insert_rowid()))
            })
            .await?;

        if inserted.is_some() {
            self.publish().await?;
        } else {
            debug!("post {} already cached, insert ignored", post.id());
        }
        Ok(inserted)
    }

    pub async fn update(&self, post: &Post) -> Result<()> {
        let row = PostRow::new(post)?;
        self.run(move |conn| {
            conn.execute(
                "UPDATE post SET title = ?2, description = ?3, photo = ?4, address = ?5, lat = ?6, lon = ?7, lifespan = ?8, category = ?9,
                 upvotes = ?10, downvotes = ?11, user_up = ?12, user_down = ?13, ratings = ?14, user_rate = ?15, comments = ?16
                 WHERE id = ?1",
                params![
                    row.id, row.title, row.description, row.photo, row.address, row.lat,
                    row.lon, row.lifespan, row.category, row.upvotes, row.downvotes,
                    row.user_up, row.user_down, row.ratings, row.user_rate, row.comments
                ],
            )
        })
        .await?;
        self.publish().await
    }

    /// Returns the number of rows removed.
    #[allow(unused)]
    pub async fn delete(&self, post: &Post) -> Result<usize> {
        let id = post.id().to_string();
        let removed = self
            .run(move |conn| conn.execute("DELETE FROM post WHERE id = ?1", params![id]))
            .await?;
        if removed > 0 {
            self.publish().await?;
        }
        Ok(removed)
    }
}

/// Column values of one post, lists encoded as JSON text.
struct PostRow {
    id: String,
    title: String,
    description: String,
    photo: Option<String>,
    address: Option<String>,
    lat: f64,
    lon: f64,
    lifespan: u32,
    category: &'static str,
    upvotes: u32,
    downvotes: u32,
    user_up: String,
    user_down: String,
    ratings: String,
    user_rate: String,
    comments: String,
}

impl PostRow {
    fn new(post: &Post) -> Result<Self> {
        Ok(Self {
            id: post.id().to_string(),
            title: post.title.clone(),
            description: post.description.clone(),
            photo: post.photo.clone(),
            address: post.address.clone(),
            lat: post.lat,
            lon: post.lon,
            lifespan: post.lifespan,
            category: post.category.name(),
            upvotes: post.upvotes(),
            downvotes: post.downvotes(),
            user_up: to_json(post.user_up())?,
            user_down: to_json(post.user_down())?,
            ratings: to_json(post.ratings())?,
            user_rate: to_json(post.user_rate())?,
            comments: to_json(post.comments())?,
        })
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

fn json_column<T: DeserializeOwned>(row: &Row, index: usize) -> rusqlite::Result<T> {
    let text: String = row.get(index)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e)))
}

fn read_post(row: &Row) -> rusqlite::Result<Post> {
    let category: String = row.get(8)?;
    let post = Post::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?)
        .photo(row.get(3)?)
        .address(row.get(4)?)
        .location(row.get(5)?, row.get(6)?)
        .lifespan(row.get(7)?)
        .category(Category::from_name(&category))
        .with_engagement(
            json_column(row, 9)?,
            json_column(row, 10)?,
            json_column(row, 11)?,
            json_column(row, 12)?,
            json_column(row, 13)?,
        );
    Ok(post)
}

fn select_all(conn: &Connection) -> rusqlite::Result<Vec<Post>> {
    let mut statement = conn.prepare(&format!("{} ORDER BY rowid", SELECT_SQL))?;
    let posts = statement.query_map([], read_post)?.collect();
    posts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str) -> Post {
        Post::new(id, "Fire", "near park").category(Category::Event)
    }

    #[tokio::test]
    async fn insert_and_get() {
        let cache = PostCache::open_in_memory().unwrap();
        let mut post = sample("1").address(Some("4000-001".into()));
        post.upvote("a@x.com");
        post.rate("a@x.com", 4);

        let row = cache.insert(&post).await.unwrap();
        assert!(row.is_some());
        assert_eq!(cache.get("1").await.unwrap(), post);
    }

    #[tokio::test]
    async fn insert_ignores_conflicts() {
        let cache = PostCache::open_in_memory().unwrap();
        assert!(cache.insert(&sample("1")).await.unwrap().is_some());

        let other = Post::new("1", "Flood", "river");
        assert_eq!(cache.insert(&other).await.unwrap(), None);
        assert_eq!(cache.get("1").await.unwrap().title, "Fire");
        assert_eq!(cache.all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn get_missing_fails() {
        let cache = PostCache::open_in_memory().unwrap();
        assert!(matches!(cache.get("nope").await, Err(Error::NotFound(id)) if id == "nope"));
    }

    #[tokio::test]
    async fn update_replaces_record() {
        let cache = PostCache::open_in_memory().unwrap();
        let mut post = sample("1");
        cache.insert(&post).await.unwrap();

        post.downvote("b@x.com");
        post.add_comment("b@x.com", "careful");
        cache.update(&post).await.unwrap();

        let stored = cache.get("1").await.unwrap();
        assert_eq!(stored.downvotes(), 1);
        assert_eq!(stored.comments(), ["b@x.com: careful"]);
    }

    #[tokio::test]
    async fn delete_counts_rows() {
        let cache = PostCache::open_in_memory().unwrap();
        let post = sample("1");
        cache.insert(&post).await.unwrap();
        assert_eq!(cache.delete(&post).await.unwrap(), 1);
        assert_eq!(cache.delete(&post).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn list_observes_writes() {
        let cache = PostCache::open_in_memory().unwrap();
        let mut list = cache.list();
        assert!(list.borrow().is_empty());

        cache.insert(&sample("1")).await.unwrap();
        cache.insert(&sample("2")).await.unwrap();
        assert!(list.has_changed().unwrap());
        let ids: Vec<String> = list
            .borrow_and_update()
            .iter()
            .map(|p| p.id().to_string())
            .collect();
        assert_eq!(ids, ["1", "2"]);
    }

    #[tokio::test]
    async fn reopen_keeps_posts() {
        let dir = std::env::temp_dir().join(format!("notice-sync-{}", std::process::id()));
        let path = dir.join("posts.db");
        let _ = std::fs::remove_file(&path);
        {
            let cache = PostCache::open(&path).unwrap();
            cache.insert(&sample("1")).await.unwrap();
        }
        let cache = PostCache::open(&path).unwrap();
        assert_eq!(cache.list().borrow().len(), 1);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
