use anyhow::Context;
use clap::CommandFactory;
use clap::FromArgMatches;
use clap::Parser;
use clap::Subcommand;
use client::ChatCompleter;
use client::OpenAiCompleter;
use config::Config;
use mood::MoodStats;
use openai_api_rust::Auth;
use openai_api_rust::OpenAI;
use orchestrator::Intervention;
use orchestrator::InterventionKind;
use preferences::WeightMap;
use session::Companion;
use session::CompanionSettings;
use session::Session;
use session::TurnOutcome;
use sources::ImageGenerator;
use sources::OpenAiImageGenerator;
use sources::Unconfigured;
use sources::VideoSource;
use sources::YouTubeSource;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use store::JsonFileStore;
use tokio::sync::mpsc;
use types::Emotion;
use types::Turn;
use types::VideoItem;

mod classifier;
mod client;
mod config;
mod conversation;
mod error;
mod images;
mod mood;
mod orchestrator;
mod preferences;
mod selector;
mod session;
mod sources;
mod store;
#[cfg(test)]
mod testing;
mod types;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Config file [default: ~/.lumeo/config.toml]
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,
    /// State file with preferences, history and mood journal
    #[arg(long, env = "LUMEO_DATA", global = true)]
    data: Option<PathBuf>,
    /// Chat model for replies
    #[arg(long, env = "LUMEO_MODEL", global = true)]
    model: Option<String>,
    #[arg(long, env = "YOUTUBE_API_KEY", hide_env_values = true, global = true)]
    youtube_api_key: Option<String>,
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    openai_api_key: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Talk with the companion
    Chat,
    /// Show mood journal statistics
    Mood,
    /// Pick videos for an emotion once
    Recommend {
        #[arg(long, short, default_value = "neutral")]
        emotion: String,
        #[arg(long, short)]
        limit: Option<usize>,
    },
}

mod world {
    use clap::Parser;

    #[derive(Parser)]
    #[command(version, about, long_about = None)]
    pub(crate) enum Command {
        /// Like a video from the last list
        Like { id: String },
        /// Never show this video again
        Dislike { id: String },
        /// Show videos for an emotion (last detected by default)
        Videos { emotion: Option<String> },
        /// Show a calming image for an emotion (last detected by default)
        Image { emotion: Option<String> },
        Mood,
        /// Show learned category weights
        Prefs {
            /// Forget every learned weight
            #[arg(long)]
            reset: bool,
        },
        Log,
        Exit,
    }
}

struct App {
    companion: Arc<Companion>,
    config: Config,
    user_name: String,
}

async fn build_app(args: &Args) -> anyhow::Result<App> {
    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => config::default_config_path()?,
    };
    let mut config =
        Config::load(&config_path).with_context(|| format!("loading {:?}", config_path))?;
    if let Some(model) = &args.model {
        config.chat_model = model.clone();
    }
    if let Some(data) = &args.data {
        config.data_path = Some(data.clone());
    }

    let data_path = config.data_path()?;
    if let Some(dir) = data_path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("creating {:?}", dir))?;
    }
    let store = Arc::new(
        JsonFileStore::open(data_path.clone())
            .await
            .with_context(|| format!("opening {:?}", data_path))?,
    );
    log::debug!("state file: {:?}", store.path());

    let http = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()?;

    let (completer, images): (Arc<dyn ChatCompleter>, Arc<dyn ImageGenerator>) =
        match &args.openai_api_key {
            Some(key) => (
                Arc::new(OpenAiCompleter::new(
                    OpenAI::new(Auth::new(key), &config.openai_base_url),
                    config.chat_model.clone(),
                )),
                Arc::new(OpenAiImageGenerator::new(
                    http.clone(),
                    config.openai_base_url.clone(),
                    key.clone(),
                )),
            ),
            None => {
                log::warn!("OPENAI_API_KEY is not set, replies and images use fallbacks");
                (
                    Arc::new(Unconfigured("OPENAI_API_KEY")),
                    Arc::new(Unconfigured("OPENAI_API_KEY")),
                )
            }
        };
    let videos: Arc<dyn VideoSource> = match &args.youtube_api_key {
        Some(key) => Arc::new(YouTubeSource::new(http, key.clone())),
        None => {
            log::warn!("YOUTUBE_API_KEY is not set, videos use the built-in list");
            Arc::new(Unconfigured("YOUTUBE_API_KEY"))
        }
    };

    let settings = CompanionSettings {
        chat_model: config.chat_model.clone(),
        classifier_model: config.classifier_model.clone(),
        max_reply_tokens: config.max_reply_tokens,
        request_timeout: config.request_timeout(),
        recent_window: config.recent_window,
        video_limit: config.video_limit,
    };

    Ok(App {
        companion: Arc::new(Companion::new(completer, videos, images, store, settings)),
        config,
        user_name: whoami::username(),
    })
}

fn prompt(user_name: &str) {
    print!("{}: ", user_name);
    let _ = std::io::stdout().flush();
}

/// Lines from stdin. The reader is a plain thread so a pending read never
/// holds up runtime shutdown.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (lines, received) = mpsc::channel(8);
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            match line {
                Ok(line) => {
                    if lines.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    log::error!("cannot read stdin: {}", err);
                    break;
                }
            }
        }
    });
    received
}

fn print_videos(items: &[VideoItem]) {
    for item in items {
        println!("world:   [{}] {} ({})", item.id, item.title, item.channel_title);
    }
    println!("world: #like <id> or #dislike <id> to tell me what helped.");
}

fn print_mood(stats: &MoodStats) {
    if stats.entries == 0 {
        println!("world: No mood entries yet.");
        return;
    }
    println!("world: {} mood entries", stats.entries);
    println!("world: average intensity {:.2}", stats.average_intensity);
    if let Some(emotion) = &stats.dominant_emotion {
        println!("world: most frequent emotion: {}", emotion);
    }
    match stats.trend {
        Some(trend) => println!("world: lately your mood is {}", trend),
        None => println!("world: not enough entries for a trend yet"),
    }
}

struct ChatState {
    last_emotion: Emotion,
    last_served: Vec<VideoItem>,
}

async fn show_videos(app: &App, state: &mut ChatState, emotion: &Emotion) {
    let items = app
        .companion
        .recommend_videos(&app.user_name, emotion, app.companion.video_limit())
        .await;
    print_videos(&items);
    state.last_served = items;
}

async fn show_image(app: &App, emotion: &Emotion) {
    let image = app.companion.therapeutic_image(&app.user_name, emotion).await;
    if image.fallback {
        println!("world: Here is a calm place to rest your eyes: {}", image.url);
    } else {
        println!("world: I made this for you: {}", image.url);
    }
}

async fn deliver(app: &App, state: &mut ChatState, intervention: &Intervention) {
    log::debug!(
        "delivering {:?} for {}",
        intervention.kind,
        intervention.trigger_emotion
    );
    match intervention.kind {
        InterventionKind::Breathing => {
            println!("world: 4-7-8 breathing, four rounds:");
            for (step, seconds) in orchestrator::breathing_steps() {
                println!("world:   {} ({} s)", step, seconds);
            }
        }
        InterventionKind::Image => show_image(app, &intervention.trigger_emotion).await,
        InterventionKind::Video => show_videos(app, state, &intervention.trigger_emotion).await,
    }
}

fn print_outcome(name: &str, outcome: &TurnOutcome) {
    log::info!(
        "detected {} ({:.2}, {:?})",
        outcome.analysis.primary_emotion,
        outcome.analysis.intensity(),
        outcome.analysis.sentiment
    );
    println!("{}: {}", name, outcome.reply);
    if let Some(lead_in) = outcome.lead_in {
        println!("{}: {}", name, lead_in);
    }
}

/// Runs one `#` command. Returns false when the chat should end.
async fn exec_command(
    app: &App,
    session: &Session,
    state: &mut ChatState,
    command: &str,
) -> bool {
    let mut sw = vec!["#".to_string()];
    match shellwords::split(command) {
        Ok(mut words) => sw.append(&mut words),
        Err(err) => {
            println!("world: {}", err);
            return true;
        }
    }

    let command = match <world::Command as CommandFactory>::command()
        .try_get_matches_from(sw)
        .and_then(|mut matches| world::Command::from_arg_matches_mut(&mut matches))
    {
        Ok(command) => command,
        Err(err) => {
            println!("world: {}", err);
            return true;
        }
    };

    let user_name = &app.user_name;
    match command {
        world::Command::Like { id } => {
            match state.last_served.iter().find(|item| item.id == id) {
                Some(item) => match app.companion.preferences().record_like(user_name, item).await {
                    Ok(_) => println!("world: Glad that helped. I'll look for more like it."),
                    Err(err) => println!("world: Could not save that: {}", err),
                },
                None => println!("world: {} is not in the last list of videos", id),
            }
        }
        world::Command::Dislike { id } => {
            match app.companion.preferences().record_dislike(user_name, &id).await {
                Ok(()) => println!("world: Got it, I won't show {} again.", id),
                Err(err) => println!("world: Could not save that: {}", err),
            }
        }
        world::Command::Videos { emotion } => {
            let emotion = emotion
                .map(|raw| Emotion::parse(&raw))
                .unwrap_or_else(|| state.last_emotion.clone());
            show_videos(app, state, &emotion).await;
        }
        world::Command::Image { emotion } => {
            let emotion = emotion
                .map(|raw| Emotion::parse(&raw))
                .unwrap_or_else(|| state.last_emotion.clone());
            show_image(app, &emotion).await;
        }
        world::Command::Mood => print_mood(&app.companion.mood_stats(user_name).await),
        world::Command::Prefs { reset: true } => {
            match app
                .companion
                .preferences()
                .replace_weights(user_name, &WeightMap::new())
                .await
            {
                Ok(()) => println!("world: Preferences cleared."),
                Err(err) => println!("world: Could not save that: {}", err),
            }
        }
        world::Command::Prefs { reset: false } => {
            let weights = app.companion.preferences().weights(user_name).await;
            if weights.is_empty() {
                println!("world: No preferences learned yet.");
            } else {
                println!("world: {} learned categories", weights.len());
            }
            for (category, weight) in weights.ranked() {
                println!("world:   {}: {:.2}", category, weight);
            }
        }
        world::Command::Log => {
            let name = &app.config.companion_name;
            for turn in session.transcript().await {
                match &turn {
                    Turn::System(message) => println!("system: {}", message.content),
                    Turn::User(message) => println!("{}: {}", user_name, message.content),
                    Turn::Assistant(message) => println!("{}: {}", name, message.content),
                }
            }
        }
        world::Command::Exit => return false,
    }
    true
}

async fn exec_chat(app: App) -> anyhow::Result<()> {
    let (session, mut delivered) = Session::start(
        Arc::clone(&app.companion),
        app.user_name.clone(),
        app.config.system_prompt(&app.user_name),
    );
    log::info!("session {} started for {}", session.id(), app.user_name);

    {
        let token = session.cancellation();
        ctrlc::set_handler(move || token.cancel()).context("setting Ctrl-C handler")?;
    }

    let token = session.cancellation();
    let mut lines = spawn_stdin_reader();
    let mut state = ChatState {
        last_emotion: Emotion::Neutral,
        last_served: Vec::new(),
    };

    prompt(&app.user_name);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            Some(intervention) = delivered.recv() => {
                println!();
                deliver(&app, &mut state, &intervention).await;
                prompt(&app.user_name);
            }
            line = lines.recv() => {
                let Some(line) = line else { break };
                let input = line.trim();
                if let Some(command) = input.strip_prefix('#') {
                    if !exec_command(&app, &session, &mut state, command).await {
                        break;
                    }
                } else if !input.is_empty() {
                    match session.submit(input).await {
                        Some(outcome) => {
                            state.last_emotion = outcome.analysis.primary_emotion.clone();
                            print_outcome(&app.config.companion_name, &outcome);
                        }
                        None => break,
                    }
                }
                prompt(&app.user_name);
            }
        }
    }

    println!();
    if let Some(conversation) = session.close().await {
        log::info!("session ended after {} turns", conversation.turns().len());
    }
    println!("world: Exiting.");
    Ok(())
}

async fn exec_recommend(app: App, emotion: &str, limit: Option<usize>) {
    let emotion = Emotion::parse(emotion);
    let limit = limit.unwrap_or_else(|| app.companion.video_limit());
    let items = app
        .companion
        .recommend_videos(&app.user_name, &emotion, limit)
        .await;
    print_videos(&items);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let app = build_app(&args).await?;
    match args.command {
        Command::Chat => exec_chat(app).await,
        Command::Mood => {
            print_mood(&app.companion.mood_stats(&app.user_name).await);
            Ok(())
        }
        Command::Recommend { emotion, limit } => {
            exec_recommend(app, &emotion, limit).await;
            Ok(())
        }
    }
}
