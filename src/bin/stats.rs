use comicdesk::catalog::load_catalog;
use comicdesk::classify::count_by_type;
use comicdesk::{AppContext, Config};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let config = Config::load()?;
    let ctx = AppContext::from_config(&config).await?;

    let counts = count_by_type(&ctx).await?;
    let catalog = load_catalog(&ctx).await?;
    let kind = ctx.layout.unit_kind;

    println!("\n=== Catalog Statistics ===\n");
    println!("Comics:    {}", counts.comics);
    println!("Webnovels: {}", counts.webnovels);
    println!("Titles:    {}", catalog.len());
    println!(
        "{}: {}",
        kind.collection(),
        catalog.iter().map(|t| t.units.len()).sum::<usize>()
    );

    if catalog.is_empty() {
        println!("\nNo titles yet. Upload one with `upload new-title`.");
        ctx.shutdown().await?;
        return Ok(());
    }

    println!();
    for title in &catalog {
        let genres = if title.record.genres.is_empty() {
            "-".to_string()
        } else {
            title.record.genres.join(", ")
        };
        println!("{} [{}] by {} ({})", title.display_title(), title.id, title.record.author, genres);

        let mut flags = Vec::new();
        if title.record.is_hero {
            flags.push("hero");
        }
        if title.record.is_new {
            flags.push("new");
        }
        if title.record.is_recommended {
            flags.push("recommended");
        }
        if !flags.is_empty() {
            println!("  flags: {}", flags.join(", "));
        }

        for unit in &title.units {
            println!(
                "  {} {:>3}  {:<40} {:>4} images",
                kind.label(),
                unit.record.number,
                unit.record.title,
                unit.record.images.len()
            );
        }
    }

    ctx.shutdown().await?;
    Ok(())
}
