use comme::cli::Args;
use comme::config::{self, TimingConfig};
use comme::core::{content_list, export_all, flatten_all, playback_content};
use comme::entities::Store;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{debug, info};
use serde::Serialize;

fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String> {
    let json = if pretty { serde_json::to_string_pretty(value)? } else { serde_json::to_string(value)? };
    Ok(json)
}

fn init_logging(args: &Args, path_config: &config::PathConfig) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .as_ref()
            .cloned()
            .unwrap_or_else(|| config::data_file(config::LOG_FILE, path_config));

        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Console logging (respects RUST_LOG if set)
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let path_config = config::PathConfig::from_env_and_cli(args.config_dir.clone());
    if let Err(e) = config::ensure_dirs(&path_config) {
        eprintln!("Warning: Failed to create application directories: {}", e);
    }
    init_logging(&args, &path_config)?;
    debug!("Command-line args: {:?}", args);

    let timing = TimingConfig::load(&path_config)?.with_overrides(args.min_frame_duration, args.word_duration);
    let store_path = args
        .store
        .clone()
        .unwrap_or_else(|| config::data_file(config::STORE_FILE, &path_config));
    info!("Store: {}", store_path.display());

    let store = Store::from_json(&store_path)
        .with_context(|| format!("Failed to load store: {}", store_path.display()))?
        .with_config(&timing);

    if args.sweep {
        let report = store.sweep();
        store
            .to_json(&store_path)
            .with_context(|| format!("Failed to save store: {}", store_path.display()))?;
        info!(
            "Sweep removed {} narratives, {} frames, {} media, {} links, {} files",
            report.narratives, report.frames, report.media, report.links, report.files_removed
        );
    }

    let output = if args.all {
        if args.export {
            to_json(&export_all(&store, &timing), args.pretty)?
        } else {
            to_json(&flatten_all(&store, &timing, args.image_adjustment), args.pretty)?
        }
    } else {
        let narrative_id = match args.narrative {
            Some(id) => id,
            None => match store.narratives().first() {
                Some(n) => n.id,
                None => bail!("Store has no narratives: {}", store_path.display()),
            },
        };
        let snapshot = store.snapshot(narrative_id)?;
        if args.export {
            to_json(&content_list(&snapshot, &timing), args.pretty)?
        } else {
            let timeline = playback_content(&snapshot, args.start_frame, args.image_adjustment, &timing);
            info!("Narrative {}: {} items, {}ms", narrative_id, timeline.items.len(), timeline.duration_ms);
            to_json(&timeline, args.pretty)?
        }
    };
    println!("{}", output);
    Ok(())
}
