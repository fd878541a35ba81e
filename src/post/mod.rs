mod category;
pub mod display;
pub mod document;
mod engagement;

pub use category::Category;

use serde::Serialize;

use crate::error::{Error, Result};

pub const DEFAULT_LIFESPAN: u32 = 30;
/// Posts closer than this to the user count as nearby.
pub const NEARBY_RADIUS_KM: f64 = 0.1;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// A geotagged community notice.
///
/// The vote counters are kept private, every change goes through the
/// engagement methods so that `upvotes == user_up.len()` and
/// `downvotes == user_down.len()` always hold.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    id: String,
    pub title: String,
    pub description: String,
    pub photo: Option<String>,
    pub address: Option<String>,
    pub lat: f64,
    pub lon: f64,
    pub lifespan: u32,
    pub category: Category,
    upvotes: u32,
    downvotes: u32,
    user_up: Vec<String>,
    user_down: Vec<String>,
    ratings: Vec<u8>,
    user_rate: Vec<String>,
    comments: Vec<String>,
}

impl Post {
    pub fn new(id: impl Into<String>, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            photo: None,
            address: None,
            lat: 0.0,
            lon: 0.0,
            lifespan: DEFAULT_LIFESPAN,
            category: Category::default(),
            upvotes: 0,
            downvotes: 0,
            user_up: vec![],
            user_down: vec![],
            ratings: vec![],
            user_rate: vec![],
            comments: vec![],
        }
    }

    /// Build an id the way new posts are keyed: creation time plus author.
    pub fn generate_id(author: &str) -> String {
        let now = chrono::Utc::now();
        let nanos = now
            .timestamp_nanos_opt()
            .unwrap_or_else(|| now.timestamp_micros() * 1000);
        format!("{}-{}", nanos, author)
    }

    pub fn photo(mut self, photo: Option<String>) -> Self {
        self.photo = photo;
        self
    }
    pub fn address(mut self, address: Option<String>) -> Self {
        self.address = address;
        self
    }
    pub fn location(mut self, lat: f64, lon: f64) -> Self {
        self.lat = lat;
        self.lon = lon;
        self
    }
    pub fn lifespan(mut self, lifespan: u32) -> Self {
        self.lifespan = lifespan;
        self
    }
    pub fn category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    /// Reject posts that must never reach either store.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::validation("post id is empty"));
        }
        if self.title.trim().is_empty() || self.description.trim().is_empty() {
            return Err(Error::validation("please enter both title and description"));
        }
        Ok(())
    }

    /// Great-circle distance from this post to a point, in kilometers.
    pub fn distance_km(&self, lat: f64, lon: f64) -> f64 {
        let d_lat = (lat - self.lat).to_radians();
        let d_lon = (lon - self.lon).to_radians();
        let a = (d_lat / 2.0).sin().powi(2)
            + (d_lon / 2.0).sin().powi(2) * self.lat.to_radians().cos() * lat.to_radians().cos();
        EARTH_RADIUS_KM * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
    }

    pub fn is_near(&self, lat: f64, lon: f64, radius_km: f64) -> bool {
        self.distance_km(lat, lon) < radius_km
    }

    pub fn id(&self) -> &str {
        &self.id
    }
    pub const fn upvotes(&self) -> u32 {
        self.upvotes
    }
    pub const fn downvotes(&self) -> u32 {
        self.downvotes
    }
    pub fn user_up(&self) -> &[String] {
        &self.user_up
    }
    pub fn user_down(&self) -> &[String] {
        &self.user_down
    }
    pub fn ratings(&self) -> &[u8] {
        &self.ratings
    }
    pub fn user_rate(&self) -> &[String] {
        &self.user_rate
    }
    pub fn comments(&self) -> &[String] {
        &self.comments
    }

    /// Restore the engagement state of a stored post.
    ///
    /// Counters are recomputed from the membership lists, a voter listed on
    /// both sides keeps only the upvote, and ratings without a matching rater
    /// (or the reverse) are dropped.
    pub(crate) fn with_engagement(
        mut self,
        user_up: Vec<String>,
        user_down: Vec<String>,
        ratings: Vec<u8>,
        user_rate: Vec<String>,
        comments: Vec<String>,
    ) -> Self {
        let mut up: Vec<String> = vec![];
        for voter in user_up {
            if !up.contains(&voter) {
                up.push(voter);
            }
        }
        let mut down: Vec<String> = vec![];
        for voter in user_down {
            if !up.contains(&voter) && !down.contains(&voter) {
                down.push(voter);
            }
        }

        let rated = ratings.len().min(user_rate.len());
        let mut ratings = ratings;
        let mut user_rate = user_rate;
        ratings.truncate(rated);
        user_rate.truncate(rated);

        self.upvotes = up.len() as u32;
        self.downvotes = down.len() as u32;
        self.user_up = up;
        self.user_down = down;
        self.ratings = ratings;
        self.user_rate = user_rate;
        self.comments = comments;
        self
    }
}
