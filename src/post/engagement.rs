use super::Post;

/// In-place engagement changes. Each returns `true` when the post changed
/// and needs to be written back.
impl Post {
    pub fn upvote(&mut self, voter: &str) -> bool {
        if self.user_up.iter().any(|v| v == voter) {
            return false;
        }
        self.user_up.push(voter.to_string());
        self.upvotes += 1;
        self.remove_downvote(voter);
        true
    }

    pub fn downvote(&mut self, voter: &str) -> bool {
        if self.user_down.iter().any(|v| v == voter) {
            return false;
        }
        self.user_down.push(voter.to_string());
        self.downvotes += 1;
        self.remove_upvote(voter);
        true
    }

    pub fn remove_upvote(&mut self, voter: &str) -> bool {
        match self.user_up.iter().position(|v| v == voter) {
            Some(index) => {
                self.user_up.remove(index);
                self.upvotes -= 1;
                true
            }
            None => false,
        }
    }

    pub fn remove_downvote(&mut self, voter: &str) -> bool {
        match self.user_down.iter().position(|v| v == voter) {
            Some(index) => {
                self.user_down.remove(index);
                self.downvotes -= 1;
                true
            }
            None => false,
        }
    }

    /// Appends a rating without checking for an earlier one by the same
    /// voter, callers enforce one rating per voter through [`Post::has_rated`].
    pub fn rate(&mut self, voter: &str, rating: u8) -> bool {
        self.ratings.push(rating);
        self.user_rate.push(voter.to_string());
        true
    }

    pub fn add_comment(&mut self, voter: &str, text: &str) -> bool {
        self.comments.push(format!("{}: {}", voter, text));
        true
    }

    pub fn has_rated(&self, voter: &str) -> bool {
        self.user_rate.iter().any(|v| v == voter)
    }

    pub fn score(&self) -> i64 {
        self.upvotes as i64 - self.downvotes as i64
    }

    pub fn average_rating(&self) -> Option<f64> {
        if self.ratings.is_empty() {
            return None;
        }
        let total: u32 = self.ratings.iter().map(|&r| r as u32).sum();
        Some(total as f64 / self.ratings.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use crate::post::{Category, Post};

    fn assert_consistent(post: &Post) {
        assert_eq!(post.upvotes() as usize, post.user_up().len());
        assert_eq!(post.downvotes() as usize, post.user_down().len());
        assert_eq!(post.ratings().len(), post.user_rate().len());
        for voter in post.user_up() {
            assert!(!post.user_down().contains(voter), "{} voted both ways", voter);
        }
    }

    fn fire() -> Post {
        Post::new("1", "Fire", "near park").category(Category::Event)
    }

    #[test]
    fn upvote_then_switch_to_downvote() {
        let mut post = fire();

        assert!(post.upvote("a@x.com"));
        assert_eq!(post.upvotes(), 1);
        assert_eq!(post.user_up(), ["a@x.com"]);

        let before = post.clone();
        assert!(!post.upvote("a@x.com"));
        assert_eq!(post, before);

        assert!(post.downvote("a@x.com"));
        assert_eq!(post.upvotes(), 0);
        assert_eq!(post.downvotes(), 1);
        assert!(post.user_up().is_empty());
        assert_eq!(post.user_down(), ["a@x.com"]);
        assert_consistent(&post);
    }

    #[test]
    fn remove_votes() {
        let mut post = fire();
        assert!(!post.remove_upvote("a"));
        assert!(!post.remove_downvote("a"));

        post.upvote("a");
        post.downvote("b");
        assert!(post.remove_upvote("a"));
        assert!(post.remove_downvote("b"));
        assert_eq!(post.upvotes(), 0);
        assert_eq!(post.downvotes(), 0);
        assert_consistent(&post);
    }

    #[test]
    fn invariants_hold_over_mixed_sequences() {
        let voters = ["a", "b", "c", "d"];
        let mut post = fire();
        // deterministic pseudo-random walk over every operation
        let mut seed: u32 = 7;
        for _ in 0..500 {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let voter = voters[(seed >> 16) as usize % voters.len()];
            match (seed >> 8) % 4 {
                0 => post.upvote(voter),
                1 => post.downvote(voter),
                2 => post.remove_upvote(voter),
                _ => post.remove_downvote(voter),
            };
            assert_consistent(&post);
        }
    }

    #[test]
    fn rate_appends_one_entry_each() {
        let mut post = fire();
        assert!(post.rate("a", 4));
        assert!(post.has_rated("a"));
        assert!(!post.has_rated("b"));

        // no guard here, the caller decides
        post.rate("a", 2);
        assert_eq!(post.ratings(), [4, 2]);
        assert_eq!(post.user_rate(), ["a", "a"]);
        assert_eq!(post.average_rating(), Some(3.0));
        assert_consistent(&post);
    }

    #[test]
    fn comments_are_prefixed_with_voter() {
        let mut post = fire();
        post.add_comment("b@x.com", "careful");
        assert_eq!(post.comments(), ["b@x.com: careful"]);

        post.add_comment("b@x.com", "careful");
        assert_eq!(post.comments().len(), 2);
    }

    #[test]
    fn score() {
        let mut post = fire();
        assert_eq!(post.average_rating(), None);
        post.upvote("a");
        post.upvote("b");
        post.downvote("c");
        assert_eq!(post.score(), 1);
    }
}
