use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comicdesk::submit::{submit_title, GenreList, TitleSubmission};
use comicdesk::upload::{
    collect_unit_folders, create_unit, register_unit_from_storage, upload_new_title, upload_units_in_bulk,
    FailurePolicy, NewTitleUpload, UnitRequest, UploadFile,
};
use comicdesk::{AppContext, Config};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "upload")]
#[command(about = "Upload titles and units to the catalog")]
struct Args {
    /// Finalize units even when some files failed to upload
    #[arg(long, global = true)]
    partial: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload files as the next unit of an existing title
    Unit {
        /// Title identifier (storage folder name)
        #[arg(short, long)]
        title: String,

        /// Display title of the unit
        #[arg(short, long)]
        unit_title: String,

        /// Page files, uploaded under their base names
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Register the next unit from files already in storage
    FromStorage {
        #[arg(short, long)]
        title: String,

        #[arg(short, long)]
        unit_title: String,
    },

    /// Upload every sub-folder of a directory as consecutive units
    Bulk {
        #[arg(short, long)]
        title: String,

        /// Directory whose sub-folders are units
        #[arg(short, long)]
        dir: PathBuf,
    },

    /// Upload a new title (cover, banner, units) and submit its metadata
    NewTitle {
        #[arg(short, long)]
        title: String,

        /// Display title, defaults to the identifier
        #[arg(long)]
        display_title: Option<String>,

        #[arg(long)]
        cover: PathBuf,

        #[arg(long)]
        banner: PathBuf,

        /// Directory whose sub-folders become units 1..N in storage
        #[arg(short, long)]
        dir: Option<PathBuf>,

        #[arg(short, long)]
        author: String,

        /// Genre tag, repeatable
        #[arg(short, long = "genre")]
        genres: Vec<String>,

        #[arg(long)]
        hero: bool,

        #[arg(long)]
        new: bool,

        #[arg(long)]
        recommended: bool,
    },
}

async fn read_files(paths: &[PathBuf]) -> Result<Vec<UploadFile>> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let file = UploadFile::from_path(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        files.push(file);
    }
    Ok(files)
}

async fn read_unit_dirs(dir: &Path) -> Result<Vec<Vec<UploadFile>>> {
    let mut units = Vec::new();
    for folder in collect_unit_folders(dir)? {
        log::info!("Unit {}: '{}' ({} files)", units.len() + 1, folder.name, folder.files.len());
        units.push(read_files(&folder.files).await?);
    }
    Ok(units)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "info")).init();

    let args = Args::parse();
    let config = Config::load()?;
    let mut ctx = AppContext::from_config(&config).await?;
    if args.partial {
        ctx.failure_policy = FailurePolicy::Partial;
    }

    let start = Instant::now();
    match args.command {
        Command::Unit {
            title,
            unit_title,
            files,
        } => {
            let files = read_files(&files).await?;
            let outcome = create_unit(
                &ctx,
                UnitRequest {
                    title_id: title.clone(),
                    unit_title,
                    files,
                },
            )
            .await?;
            println!(
                "Created {}/{} with {} images",
                title,
                outcome.doc_id,
                outcome.unit.images.len()
            );
            for failed in &outcome.failed {
                println!("  skipped {}: {}", failed.path, failed.error);
            }
        }
        Command::FromStorage { title, unit_title } => {
            let (doc_id, unit) = register_unit_from_storage(&ctx, &title, &unit_title).await?;
            println!("Registered {}/{} with {} images", title, doc_id, unit.images.len());
        }
        Command::Bulk { title, dir } => {
            let folders = collect_unit_folders(&dir)?;
            if folders.is_empty() {
                log::warn!("No unit folders found in {}", dir.display());
                return Ok(());
            }
            let created = upload_units_in_bulk(&ctx, &title, &folders).await?;
            for outcome in &created {
                println!("Created {}/{} '{}'", title, outcome.doc_id, outcome.unit.title);
            }
        }
        Command::NewTitle {
            title,
            display_title,
            cover,
            banner,
            dir,
            author,
            genres,
            hero,
            new,
            recommended,
        } => {
            let units = match &dir {
                Some(dir) => read_unit_dirs(dir).await?,
                None => Vec::new(),
            };
            let request = NewTitleUpload {
                title_id: title.clone(),
                cover: Some(UploadFile::from_path(&cover).await?),
                banner: Some(UploadFile::from_path(&banner).await?),
                units,
            };
            let uploaded = upload_new_title(&ctx, request).await?;
            println!("Uploaded {} files for '{}'", uploaded.uploaded, title);

            let mut genre_list = GenreList::default();
            for genre in &genres {
                genre_list.add(genre);
            }
            let submission = TitleSubmission {
                id: title.clone(),
                title: display_title.unwrap_or_default(),
                author,
                genres: genre_list.into_vec(),
                is_hero: hero,
                is_new: new,
                is_recommended: recommended,
                ..TitleSubmission::default()
            }
            .with_handoff(&uploaded.handoff);

            let record = submit_title(&ctx, &submission).await?;
            println!("Submitted '{}' by {}", record.title, record.author);
            if dir.is_some() {
                println!("Register units with `upload from-storage --title {}` or re-run with `bulk`.", title);
            }
        }
    }

    log::info!("Done in {:.2}s", start.elapsed().as_secs_f64());
    ctx.shutdown().await?;
    Ok(())
}
