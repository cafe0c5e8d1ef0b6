use anyhow::Result;
use comicdesk::classify::count_by_type;
use comicdesk::server::DashboardServer;
use comicdesk::{AppContext, Config};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;

    // RUST_LOG wins over the configured level
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", &config.dashboard.log_level),
    )
    .init();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("serve");

    match command {
        "verify" => run_verification(&config).await?,
        "serve" => run_http_server(&config).await?,
        other => {
            anyhow::bail!("Unknown command '{}'. Use 'serve' (default) or 'verify'.", other);
        }
    }

    Ok(())
}

/// Start the dashboard HTTP server
async fn run_http_server(config: &Config) -> Result<()> {
    let ctx = AppContext::from_config(config).await?;
    let server = DashboardServer::new(ctx, &config.http_server)?;

    log::info!(
        "Catalog '{}' with {} units, failure policy {:?}",
        config.catalog.root_collection,
        config.catalog.unit_kind.doc_prefix(),
        config.upload.failure_policy
    );
    server.run(config.http_server.port).await?;
    Ok(())
}

/// Check that both backends answer, then print what they hold
async fn run_verification(config: &Config) -> Result<()> {
    let ctx = AppContext::from_config(config).await?;

    let root = ctx.storage.list("").await?;
    log::info!(
        "Object store reachable: {} top-level folders, {} loose files",
        root.folders.len(),
        root.files.len()
    );

    let titles = ctx.documents.list(&ctx.layout.root_collection).await?;
    log::info!(
        "Document store reachable: {} title records in '{}'",
        titles.len(),
        ctx.layout.root_collection
    );

    let counts = count_by_type(&ctx).await?;
    println!("Comics:    {}", counts.comics);
    println!("Webnovels: {}", counts.webnovels);
    println!("Titles:    {}", titles.len());

    ctx.shutdown().await?;
    Ok(())
}
