use std::{sync::Arc, time::Duration};

use engine::{CodeFetcher, Engine, Sweeper};
use mailbox::ImapCodeFetcher;
use migration::{Migrator, MigratorTrait};

mod settings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let settings = settings::Settings::new()?;
    let mut tasks = tokio::task::JoinSet::new();

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "rentbot={level},telegram_bot={level},server={level},engine={level},mailbox={level}",
            level = settings.app.level
        ))
        .init();

    let db = connect_database(&settings.database).await?;
    let fetcher: Arc<dyn CodeFetcher> =
        Arc::new(ImapCodeFetcher::new(settings.mailbox.settings())?);
    let engine = Engine::builder()
        .database(db)
        .admins(settings.admins.ids.iter().copied())
        .policy(settings.rental.policy())
        .fetcher(fetcher)
        .build()
        .await?;
    if settings.admins.ids.is_empty() {
        tracing::warn!("No admins configured, nobody can approve users");
    }

    let sweeper = Sweeper::new(engine.clone())
        .with_interval(Duration::from_secs(settings.sweeper.interval_secs.max(1)));
    tasks.spawn(async move { sweeper.run().await });

    if let Some(server) = settings.server {
        tasks.spawn(async move {
            tracing::info!("Found server settings...");
            server::run(&server.bind, server.port).await;
        });
    }

    if let Some(telegram) = settings.telegram {
        let engine = engine.clone();
        tasks.spawn(async move {
            tracing::info!("Found telegram settings...");
            match telegram_bot::Bot::builder()
                .token(&telegram.token)
                .engine(engine)
                .build()
            {
                Ok(bot) => bot.run().await,
                Err(err) => tracing::error!("failed to initialize telegram bot: {err}"),
            }
        });
    } else {
        tracing::warn!("No telegram settings, running without the bot");
    }

    // The first task to finish (the bot on ctrl-c) takes the others down.
    if tasks.join_next().await.is_some() {
        tasks.shutdown().await;
    }

    Ok(())
}

async fn connect_database(
    config: &settings::Database,
) -> Result<sea_orm::DatabaseConnection, Box<dyn std::error::Error + Send + Sync>> {
    let database = sea_orm::Database::connect(config.url()).await?;
    Migrator::up(&database, None).await?;
    Ok(database)
}
