use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use audiobook::app::AudiobookApp;
use audiobook::config::Config;
use audiobook::duration::{format_duration, format_position, total_minutes};
use audiobook::stats::format_listening_time;

#[derive(Parser)]
#[command(name = "audiobook")]
#[command(about = "Offline-first audiobook library for YouTube playlists", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a YouTube playlist or single video
    Import {
        /// Playlist (`list=`) or video (`watch?v=`, `youtu.be/`) URL
        url: String,
    },
    /// List imported audiobooks
    List,
    /// Show chapters in progress
    Progress,
    /// Show listening statistics
    Stats,
    /// List bookmarks, optionally for one video
    Bookmarks {
        #[arg(long)]
        video: Option<String>,
    },
    /// Print the config file path and an example configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "audiobook=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if let Commands::Config = cli.command {
        println!("# {}", Config::config_path()?.display());
        print!("{}", Config::example_config());
        return Ok(());
    }

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Failed to load config: {:#}, using defaults", e);
            let mut config = Config::default();
            config.apply_env(|key| std::env::var(key).ok());
            config
        }
    };
    let mut app = AudiobookApp::new(config).await?;

    match cli.command {
        Commands::Import { url } => {
            let playlist = app.import(&url).await?;
            println!(
                "Imported \"{}\": {} chapters, {}",
                playlist.title,
                playlist.video_count(),
                format_duration(playlist.total_duration_seconds())
            );
        }
        Commands::List => list(&app),
        Commands::Progress => progress(&app),
        Commands::Stats => stats(&app),
        Commands::Bookmarks { video } => bookmarks(&app, video.as_deref()),
        Commands::Config => {}
    }

    app.storage().flush().await;
    Ok(())
}

fn list(app: &AudiobookApp) {
    if app.playlists().is_empty() {
        println!("No audiobooks yet. Import one with `audiobook import <url>`.");
        return;
    }
    for playlist in app.playlists() {
        let done = playlist
            .videos()
            .iter()
            .filter(|v| app.tracker.progress(&v.id).is_some_and(|p| p.watched))
            .count();
        println!(
            "{}  {}  [{}/{} chapters, {} min]",
            playlist.id,
            playlist.title,
            done,
            playlist.video_count(),
            total_minutes(playlist.videos())
        );
    }
}

fn progress(app: &AudiobookApp) {
    let items = app.continue_listening();
    if items.is_empty() {
        println!("Nothing in progress.");
        return;
    }
    for item in items {
        println!(
            "{} - {} (chapter {})  {} / {}  {:.0}%",
            item.playlist.title,
            item.video.title,
            item.video_index + 1,
            format_position(item.progress.current_time),
            item.video.duration,
            item.percent_complete()
        );
    }
}

fn stats(app: &AudiobookApp) {
    let stats = app.stats();
    println!("Total listening:   {}", format_listening_time(stats.total_listening_seconds));
    println!("This week:         {}", format_listening_time(stats.week_listening_seconds));
    println!(
        "Chapters:          {}/{} completed ({}%)",
        stats.completed_chapters, stats.total_chapters, stats.completion_percentage
    );
    println!("In progress:       {}", stats.in_progress);
    println!("Completed (week):  {}", stats.week_completed);
    for achievement in &stats.achievements {
        println!("* {}", achievement);
    }
}

fn bookmarks(app: &AudiobookApp, video: Option<&str>) {
    let bookmarks = match video {
        Some(id) => app.bookmarks().for_video(id),
        None => app.bookmarks().list(),
    };
    if bookmarks.is_empty() {
        println!("No bookmarks.");
        return;
    }
    for bookmark in bookmarks {
        let title = app
            .library
            .find_video(&bookmark.video_id)
            .map(|(playlist, index)| playlist.videos()[index].title.clone())
            .unwrap_or_else(|| bookmark.video_id.clone());
        match &bookmark.note {
            Some(note) => println!("{}  @ {}  {}", title, format_position(bookmark.time), note),
            None => println!("{}  @ {}", title, format_position(bookmark.time)),
        }
    }
}
