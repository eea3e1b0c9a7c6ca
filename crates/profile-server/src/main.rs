use std::net::SocketAddr;
use std::sync::Arc;

use profile_server::auth::FirebaseIdentity;
use profile_server::db::{self, migrations::Migrator};
use profile_server::{create_router, Config};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn print_usage() {
    println!("Usage: profile-server [COMMAND]");
    println!();
    println!("Commands:");
    println!("  (none)           Run the HTTP server");
    println!("  migrate up       Apply all pending migrations");
    println!("  migrate down     Revert the most recent migration");
    println!("  migrate status   List migrations and whether they are applied");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "profile_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        [] => serve().await,
        ["migrate", action] => migrate(action).await,
        ["--help"] | ["-h"] => {
            print_usage();
            Ok(())
        }
        _ => {
            print_usage();
            std::process::exit(1);
        }
    }
}

async fn serve() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let pool = db::create_pool(&config.database_url).await?;

    if config.run_migrations {
        Migrator::new(&pool).run_pending().await?;
    }

    let identity = Arc::new(FirebaseIdentity::new(
        &config.firebase_api_key,
        &config.firebase_project_id,
    ));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let app = create_router(pool, config, identity);

    tracing::info!("Server listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn migrate(action: &str) -> anyhow::Result<()> {
    let pool = db::create_pool(&Config::database_url_from_env()?).await?;
    let migrator = Migrator::new(&pool);

    match action {
        "up" => {
            let applied = migrator.run_pending().await?;
            println!("Applied {} migration(s); schema version {}", applied, migrator.version().await?);
        }
        "down" => {
            let reverted = migrator.revert_last().await?;
            println!("Reverted {} ({})", reverted.name, reverted.version);
        }
        "status" => {
            for status in migrator.status().await? {
                let mark = if status.applied { "applied" } else { "pending" };
                println!("{:>16}  {:<8} {}", status.version, mark, status.name);
            }
        }
        other => anyhow::bail!("unknown migrate action: {}", other),
    }

    Ok(())
}
