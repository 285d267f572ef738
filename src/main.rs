use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use waveprint::config::{AppConfig, FingerprintConfig};
use waveprint::discover::{discover_tracks, Track};
use waveprint::fingerprint;
use waveprint::modules::AnalysisModule;
use waveprint::pipeline::{self, RunOptions};
use waveprint::store;

#[derive(Parser)]
#[command(name = "waveprint", version, about = "Audio mastering metrics and fingerprint charts")]
struct Cli {
    /// Path to the config file (default: ./waveprint.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output directory root (overrides config)
    #[arg(long, global = true)]
    out: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Segment tracks, run the analysis modules and render fingerprints
    Analyze {
        /// Files or directories to analyze (defaults to config source_dirs)
        paths: Vec<PathBuf>,

        /// Re-run a module even when its results are cached (repeatable)
        #[arg(long = "force", value_name = "MODULE")]
        force: Vec<String>,

        /// Number of parallel workers (0 = auto-detect)
        #[arg(short = 'j', long, default_value = "0")]
        jobs: usize,

        /// Only process tracks whose name contains this substring
        #[arg(long)]
        filter: Option<String>,

        /// Overwrite unparseable metrics documents instead of failing
        #[arg(long)]
        discard_corrupt: bool,

        /// Skip fingerprint rendering
        #[arg(long)]
        no_render: bool,
    },

    /// Re-render fingerprints from stored metrics (no audio analysis)
    Render {
        /// Only render tracks whose name contains this substring
        #[arg(long)]
        filter: Option<String>,
    },

    /// Summarize the output tree
    Stats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    let mut config = AppConfig::load(cli.config.as_deref());
    let output_dir = cli.out.unwrap_or_else(|| config.resolve_output_dir());

    match cli.command {
        Commands::Analyze {
            paths,
            force,
            jobs,
            filter,
            discard_corrupt,
            no_render,
        } => {
            for name in &force {
                if AnalysisModule::from_name(name).is_none() {
                    anyhow::bail!(
                        "Unknown module \"{}\". Modules: {}",
                        name,
                        waveprint::modules::MODULE_ORDER
                            .iter()
                            .map(|m| m.name())
                            .collect::<Vec<_>>()
                            .join(", ")
                    );
                }
            }

            let mut tracks = resolve_tracks(&paths, &config)?;
            if let Some(ref needle) = filter {
                tracks.retain(|t| t.name.contains(needle.as_str()));
            }
            if tracks.is_empty() {
                println!("No tracks to analyze.");
                return Ok(());
            }

            if jobs > 0 {
                config.workers = jobs;
            }
            let mut always_run = config.always_run.clone();
            for name in force {
                if !always_run.contains(&name) {
                    always_run.push(name);
                }
            }
            let options = RunOptions {
                always_run,
                discard_corrupt,
            };

            let summary = pipeline::process_library(&tracks, &output_dir, &config, &options)
                .context("Analysis failed")?;
            println!(
                "Analysis complete: {} processed, {} failed",
                summary.processed, summary.failed
            );

            if !no_render {
                let (rendered, pages) =
                    render_stored(&output_dir, filter.as_deref(), &config.fingerprint)?;
                println!("Rendered {} pages for {} tracks", pages, rendered);
            }
        }

        Commands::Render { filter } => {
            let (rendered, pages) =
                render_stored(&output_dir, filter.as_deref(), &config.fingerprint)?;
            if rendered == 0 {
                println!("No stored metrics found under {}.", output_dir.display());
            } else {
                println!("Rendered {} pages for {} tracks", pages, rendered);
            }
        }

        Commands::Stats => {
            let mut docs = Vec::new();
            for root in track_output_roots(&output_dir)? {
                match store::load(&root, false) {
                    Ok(Some(doc)) => docs.push(doc),
                    Ok(None) => {}
                    Err(e) => log::warn!("{}: {}", root.display(), e),
                }
            }
            if docs.is_empty() {
                println!("No analyzed tracks under {}.", output_dir.display());
                return Ok(());
            }

            println!(
                "{:<40} {:>7} {:>6} {:>8}",
                "Track", "Chunks", "Bands", "Modules"
            );
            println!("{}", "-".repeat(65));
            for doc in &docs {
                let name = display_name(&doc.track.name, 40);
                println!(
                    "{:<40} {:>7} {:>6} {:>8}",
                    name,
                    doc.track.chunk_count,
                    doc.track.bands.len(),
                    doc.modules.len()
                );
            }
            println!();
            println!(
                "{} tracks, {} fully analyzed",
                docs.len(),
                docs.iter()
                    .filter(|d| d.modules.len() == waveprint::modules::MODULE_ORDER.len())
                    .count()
            );
        }
    }

    Ok(())
}

/// Fit a track name into `max` display characters, eliding the tail.
/// Truncation counts chars, not bytes, so multi-byte names are safe.
fn display_name(name: &str, max: usize) -> String {
    if name.chars().count() <= max {
        name.to_string()
    } else {
        let head: String = name.chars().take(max.saturating_sub(3)).collect();
        format!("{head}...")
    }
}

/// Resolve the analyze inputs: explicit paths beat config source_dirs.
/// A path that is a directory gets scanned; a file becomes one track.
fn resolve_tracks(paths: &[PathBuf], config: &AppConfig) -> Result<Vec<Track>> {
    if paths.is_empty() {
        if config.source_dirs.is_empty() {
            anyhow::bail!(
                "No inputs. Pass files or directories, or set source_dirs in the config."
            );
        }
        return discover_tracks(&config.source_dirs).context("Input discovery failed");
    }

    let mut dirs = Vec::new();
    let mut tracks = Vec::new();
    for path in paths {
        if path.is_dir() {
            dirs.push(path.clone());
        } else if let Some(track) = Track::from_path(path) {
            tracks.push(track);
        } else {
            anyhow::bail!("Not a usable input path: {}", path.display());
        }
    }
    tracks.extend(discover_tracks(&dirs).context("Input discovery failed")?);
    tracks.sort_by(|a, b| a.name.cmp(&b.name));
    tracks.dedup_by(|a, b| a.name == b.name);
    Ok(tracks)
}

/// Track output roots under the output directory, sorted by name.
fn track_output_roots(output_dir: &std::path::Path) -> Result<Vec<PathBuf>> {
    if !output_dir.exists() {
        return Ok(Vec::new());
    }
    let mut roots: Vec<PathBuf> = std::fs::read_dir(output_dir)
        .with_context(|| format!("Failed to read {}", output_dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir() && store::metrics_path(p).exists())
        .collect();
    roots.sort();
    Ok(roots)
}

/// Render fingerprints for every stored metrics document. Per-track
/// failures are logged and skipped so one bad document doesn't block
/// the rest.
fn render_stored(
    output_dir: &std::path::Path,
    filter: Option<&str>,
    config: &FingerprintConfig,
) -> Result<(usize, usize)> {
    let mut rendered = 0usize;
    let mut pages = 0usize;

    for root in track_output_roots(output_dir)? {
        if let Some(needle) = filter {
            let name = root
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if !name.contains(needle) {
                continue;
            }
        }
        let doc = match store::load(&root, false) {
            Ok(Some(doc)) => doc,
            Ok(None) => continue,
            Err(e) => {
                log::error!("{}: {}", root.display(), e);
                continue;
            }
        };
        match fingerprint::render_track(&doc, &root, config) {
            Ok(written) => {
                rendered += 1;
                pages += written.len();
            }
            Err(e) => log::error!("{}: {}", doc.track.name, e),
        }
    }

    Ok((rendered, pages))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_keeps_short_names() {
        assert_eq!(display_name("song.wav", 40), "song.wav");
        let exact = "a".repeat(40);
        assert_eq!(display_name(&exact, 40), exact);
    }

    #[test]
    fn test_display_name_elides_long_names() {
        let long = "a".repeat(50);
        let shown = display_name(&long, 40);
        assert_eq!(shown.chars().count(), 40);
        assert!(shown.ends_with("..."));
    }

    #[test]
    fn test_display_name_truncates_multibyte_names() {
        // 'é' straddles the old byte-37 cut point
        let name = format!("{}é-final-master.flac", "a".repeat(36));
        let shown = display_name(&name, 40);
        assert_eq!(shown.chars().count(), 40);
        assert!(shown.ends_with("é..."));
    }
}
