mod api;
mod cache;
mod config;
mod error;
mod post;
mod sync;

use api::{
    geocode::Geocoder,
    memory::MemoryRemote,
    remote::{HttpRemote, RemoteStore},
};
use cache::PostCache;
use config::{Command, Config};
use error::Error;
use log::{info, warn};
use post::{
    display::{display_post, display_posts},
    Post,
};
use sync::SyncRepository;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    config.init_logger();
    info!("# Notice Sync #");
    info!("");

    let cache = PostCache::open(config.database())?;
    let result = match config.remote() {
        Some(url) => {
            info!("Remote: {} ({})", url, config.collection());
            let remote = HttpRemote::new(&config, url);
            run(&config, SyncRepository::start(cache, remote, config.policy())).await
        }
        None => {
            warn!("No remote configured, using an in-memory collection");
            let remote = MemoryRemote::default();
            run(&config, SyncRepository::start(cache, remote, config.policy())).await
        }
    };

    match result {
        Err(Error::Validation(notice)) => {
            warn!("{}", notice);
            Ok(())
        }
        other => Ok(other?),
    }
}

async fn run<R: RemoteStore>(config: &Config, repository: SyncRepository<R>) -> error::Result<()> {
    info!("Sync policy: {}", repository.policy());
    if config.command.mutates() {
        // a reconcile still in flight would overwrite the change with the cached copy
        repository.reconciled().await;
    }
    let result = execute(config, &repository).await;

    // let the startup reconciliation finish before the runtime shuts down
    repository.reconciled().await;
    if result.is_ok() {
        info!("All done!");
    }
    result
}

async fn execute<R: RemoteStore>(config: &Config, repository: &SyncRepository<R>) -> error::Result<()> {
    match &config.command {
        Command::List => display_posts(&repository.snapshot().await?),
        Command::Show { id } => display_post(&repository.find(id).await?),
        Command::Nearby { lat, lon, radius } => {
            display_posts(&repository.nearby(*lat, *lon, *radius).await?)
        }
        Command::Watch => {
            info!("Watching remote posts, press Ctrl-C to stop");
            let mut subscription = repository.subscribe_remote();
            let mut local = repository.cache().list();
            display_posts(&subscription.current());
            loop {
                tokio::select! {
                    changed = subscription.changed() => match changed {
                        Some(posts) => display_posts(&posts),
                        None => break,
                    },
                    Ok(()) = local.changed() => {
                        info!("Local cache changed, {} posts", local.borrow_and_update().len());
                    },
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            subscription.unsubscribe();
        }
        Command::Sync => {
            let report = repository.reconciled().await;
            info!("{} written", report.written);
            info!("{} already present", report.present);
            info!("{} failed", report.failed);
        }
        Command::Create {
            title,
            description,
            lat,
            lon,
            photo,
            lifespan,
            category,
            no_geocode,
        } => {
            let user = config.user()?;
            let mut post = Post::new(Post::generate_id(user), title.as_str(), description.as_str())
                .photo(photo.clone())
                .location(*lat, *lon)
                .lifespan(*lifespan)
                .category(*category);
            post.validate()?;

            if !*no_geocode {
                post.address = Geocoder::new(config).postcode(*lat, *lon).await;
            }

            let id = post.id().to_string();
            repository.create_post(post).await?.settled().await;
            info!("Created post {}", id);
        }
        Command::Upvote { id } => {
            let user = config.user()?;
            let mut post = repository.find(id).await?;
            repository.upvote(&mut post, user).await?.settled().await;
            display_post(&post);
        }
        Command::Downvote { id } => {
            let user = config.user()?;
            let mut post = repository.find(id).await?;
            repository.downvote(&mut post, user).await?.settled().await;
            display_post(&post);
        }
        Command::Unupvote { id } => {
            let user = config.user()?;
            let mut post = repository.find(id).await?;
            repository.remove_upvote(&mut post, user).await?.settled().await;
            display_post(&post);
        }
        Command::Undownvote { id } => {
            let user = config.user()?;
            let mut post = repository.find(id).await?;
            repository.remove_downvote(&mut post, user).await?.settled().await;
            display_post(&post);
        }
        Command::Rate { id, value } => {
            let user = config.user()?;
            let mut post = repository.find(id).await?;
            if post.has_rated(user) {
                return Err(Error::validation("you already rated this post"));
            }
            repository.rate(&mut post, user, *value).await?.settled().await;
            display_post(&post);
        }
        Command::Comment { id, text } => {
            let user = config.user()?;
            let mut post = repository.find(id).await?;
            repository.add_comment(&mut post, user, text).await?.settled().await;
            display_post(&post);
        }
    }
    Ok(())
}
