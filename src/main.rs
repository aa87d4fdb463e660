use booru_wallpaper::config::{AppPaths, SetOverrides, Settings};
use booru_wallpaper::desktop::DesktopSetter;
use booru_wallpaper::logging::{self, Verbosity};
use booru_wallpaper::record::{AcceptedImageRecord, ListChoice};
use booru_wallpaper::workflow::{resolve_display_bounds, run_set, SetContext};
use booru_wallpaper::{display, BooruClient, WallpaperError};
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Set the desktop wallpaper to a random image from a Danbooru-like imageboard
#[derive(Parser)]
#[command(name = "booru-wallpaper", version)]
struct Cli {
    /// Show debug output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only show errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file to use instead of ~/.config/booru-wallpaper/config.toml
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set the wallpaper
    ///
    /// Exclusion tags start with a hyphen, so pass them after `--`:
    ///   booru-wallpaper set short_hair -- -rating:e
    Set {
        /// Tags the image must match
        tags: Vec<String>,

        /// Imageboard to source images from
        #[arg(short, long, value_name = "URL")]
        imageboard: Option<String>,

        /// Number of times to retry getting the image
        #[arg(short, long, value_name = "N")]
        retries: Option<u32>,

        /// Minimum size of the image relative to the screen
        #[arg(short, long, value_name = "RATIO")]
        size: Option<f64>,

        /// Repeat the previous settings; anything given here overrides them
        #[arg(short, long)]
        next: bool,
    },

    /// List information about the current wallpaper
    List {
        /// What to list (default from the config, usually "all")
        #[arg(value_enum)]
        choices: Vec<ListChoice>,
    },

    /// Show the configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand, Clone, Copy)]
enum ConfigAction {
    /// Print the current configuration as TOML
    Show,
    /// Print the config file location
    Path,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::debug!("{:?}", e);
            eprintln!("{} {}", "✗".red(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), WallpaperError> {
    let config_file = cli.config.unwrap_or_else(AppPaths::default_config_file);
    let (mut settings, created) = load_settings(&config_file)?;
    let paths = AppPaths::new(config_file, &settings);

    let quiet = cli.quiet || (settings.defaults.quiet && !cli.verbose);
    let verbose = cli.verbose || (settings.defaults.verbose && !quiet);
    let verbosity = Verbosity::from_flags(verbose, quiet);
    init_logging(verbosity, &paths);
    if created {
        log::info!("Wrote default config to {}", paths.config_file.display());
    }

    match cli.command {
        Commands::Set {
            tags,
            imageboard,
            retries,
            size,
            next,
        } => {
            let overrides = SetOverrides {
                tags,
                imageboard,
                retries,
                size,
                next,
            };
            set(&mut settings, &paths, &overrides, verbosity)
        }
        Commands::List { choices } => {
            let choices = if choices.is_empty() {
                settings.defaults.list.clone()
            } else {
                choices
            };
            list(&paths, &choices)
        }
        Commands::Config { action } => {
            match action.unwrap_or(ConfigAction::Show) {
                ConfigAction::Show => print!("{}", settings.to_toml()?),
                ConfigAction::Path => println!("{}", paths.config_file.display()),
            }
            Ok(())
        }
    }
}

// The logger depends on the settings, so whether they were just created is
// reported once it is up
fn load_settings(config_file: &Path) -> Result<(Settings, bool), WallpaperError> {
    let created = !config_file.exists();
    Ok((Settings::load_or_init(config_file)?, created))
}

fn init_logging(verbosity: Verbosity, paths: &AppPaths) {
    let with_file = paths
        .ensure_dirs()
        .and_then(|()| logging::init(verbosity, Some(&paths.log_file())));

    if let Err(e) = with_file {
        // Keep going with terminal output only
        if logging::init(verbosity, None).is_ok() {
            log::warn!("Log file unavailable: {}", e);
        }
    }
}

fn set(
    settings: &mut Settings,
    paths: &AppPaths,
    overrides: &SetOverrides,
    verbosity: Verbosity,
) -> Result<(), WallpaperError> {
    let request = settings.fetch_request(overrides)?;
    let bounds = resolve_display_bounds(settings, &request, display::detect)?;

    let client = BooruClient::new(request.endpoint.clone(), settings.credentials(), settings.timeout())?;
    let setter = DesktopSetter;
    let ctx = SetContext {
        paths,
        source: &client,
        http: client.http(),
        setter: &setter,
    };

    let record = run_set(&ctx, settings, &request, bounds)?;

    if verbosity != Verbosity::Quiet {
        println!(
            "{} Wallpaper set to post #{} ({}x{})",
            "✓".green(),
            record.post.id,
            record.post.width,
            record.post.height
        );
        println!("  {}", record.page.dimmed());
    }
    Ok(())
}

fn list(paths: &AppPaths, choices: &[ListChoice]) -> Result<(), WallpaperError> {
    let record = AcceptedImageRecord::load(&paths.record_file())?;
    log::debug!("data = {:?}", record);

    for (label, value) in record.list_lines(choices) {
        println!("{}: {}", label.yellow(), value);
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_settings_reports_creation_once() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        let (settings, created) = load_settings(&path).unwrap();
        assert!(created);
        assert_eq!(settings, Settings::default());

        let (_, created) = load_settings(&path).unwrap();
        assert!(!created);
    }

    #[test]
    fn test_cli_parses_set() {
        let cli = Cli::try_parse_from([
            "booru-wallpaper", "-q", "set", "short_hair", "-r", "4", "-s", "0.5", "--", "-rating:e",
        ])
        .unwrap();

        assert!(cli.quiet);
        match cli.command {
            Commands::Set { tags, retries, size, next, .. } => {
                assert_eq!(tags, vec!["short_hair", "-rating:e"]);
                assert_eq!(retries, Some(4));
                assert_eq!(size, Some(0.5));
                assert!(!next);
            }
            _ => panic!("expected set"),
        }
    }

    #[test]
    fn test_cli_rejects_verbose_and_quiet() {
        assert!(Cli::try_parse_from(["booru-wallpaper", "-v", "-q", "list"]).is_err());
    }
}
