use crate::WallpaperError;
use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::filter::threshold::ThresholdFilter;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

impl Verbosity {
    pub const fn from_flags(verbose: bool, quiet: bool) -> Self {
        if verbose {
            Self::Verbose
        } else if quiet {
            Self::Quiet
        } else {
            Self::Normal
        }
    }

    pub const fn terminal_level(self) -> LevelFilter {
        match self {
            Self::Quiet => LevelFilter::Error,
            Self::Normal => LevelFilter::Info,
            Self::Verbose => LevelFilter::Debug,
        }
    }
}

// Build the logger configuration; the file appender is skipped when
// `log_file` is `None`.
pub fn build_config(verbosity: Verbosity, log_file: Option<&Path>) -> Result<Config, WallpaperError> {
    let terminal = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new("{l}: {m}{n}")))
        .build();

    let mut builder = Config::builder().appender(
        Appender::builder()
            .filter(Box::new(ThresholdFilter::new(verbosity.terminal_level())))
            .build("terminal", Box::new(terminal)),
    );
    let mut root = Root::builder().appender("terminal");

    if let Some(log_file) = log_file {
        let file = FileAppender::builder()
            .append(false)
            .encoder(Box::new(PatternEncoder::new(
                "{d(%Y-%m-%d %H:%M:%S)} - {t}:{l}: {m}{n}",
            )))
            .build(log_file)?;
        builder = builder.appender(Appender::builder().build("main_log", Box::new(file)));
        root = root.appender("main_log");
    }

    builder
        .build(root.build(LevelFilter::Debug))
        .map_err(|e| WallpaperError::Config(format!("logger: {}", e)))
}

/// Install the process-wide logger. Call once, before anything logs.
pub fn init(verbosity: Verbosity, log_file: Option<&Path>) -> Result<(), WallpaperError> {
    let config = build_config(verbosity, log_file)?;
    log4rs::init_config(config).map_err(|e| WallpaperError::Config(format!("logger: {}", e)))?;
    Ok(())
}
