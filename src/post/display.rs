use log::info;

use super::Post;

pub fn display_posts(posts: &[Post]) {
    if !log::log_enabled!(log::Level::Info) {
        return;
    }
    if posts.is_empty() {
        info!("No posts");
        return;
    }

    let (mut id_width, mut category_width) = (4_usize, 8_usize);
    for post in posts.iter() {
        id_width = post.id().len().max(id_width);
        category_width = post.category.name().len().max(category_width);
    }

    info!(
        "+-{:-<id_width$}-+-{:-<category_width$}-+-{:-<6}-+-{}------- - -",
        " Id ", " Category ", " Score ", " Title "
    );
    for post in posts.iter() {
        info!(
            "| {:id_width$} | {:category_width$} | {:>6} | {}",
            post.id(),
            post.category.name(),
            post.score(),
            post.title
        );
    }
    info!(
        "+-{}-+-{}-+--------+------------ - -",
        "-".repeat(id_width),
        "-".repeat(category_width)
    );
    info!("{} posts", posts.len());
}

pub fn display_post(post: &Post) {
    info!("{} [{}]", post.title, post.category);
    info!("  {}", post.description);
    info!("  id: {}", post.id());
    info!(
        "  at: {:.5}, {:.5}{}",
        post.lat,
        post.lon,
        post.address
            .as_ref()
            .map(|address| format!(" ({})", address))
            .unwrap_or_default()
    );
    if let Some(photo) = &post.photo {
        info!("  photo: {}", photo);
    }
    info!("  lifespan: {} days", post.lifespan);
    info!(
        "  votes: +{} -{} (score {})",
        post.upvotes(),
        post.downvotes(),
        post.score()
    );
    match post.average_rating() {
        Some(average) => info!(
            "  rating: {:.1} from {} ratings",
            average,
            post.ratings().len()
        ),
        None => info!("  rating: none"),
    }
    for comment in post.comments() {
        info!("  > {}", comment);
    }
}
