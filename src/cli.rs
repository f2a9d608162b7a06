use std::{fmt::Display, str::FromStr};

use argh::FromArgs;
use godot::prelude::{Dictionary, GodotString, PackedStringArray};
use log::LevelFilter;

const VISEME_SEPARATOR: char = ',';

#[derive(Debug, Clone)]
pub enum CliError {
    ParseFailure(argh::EarlyExit),
    EmptyVisemeList { input: String },
    InvalidDuration { input: String },
}

impl Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ParseFailure(e) => write!(f, "{e:?}"),
            Self::EmptyVisemeList { input } => write!(f, "No visemes in: {input}"),
            Self::InvalidDuration { input } => write!(f, "Invalid duration: {input}"),
        }
    }
}

impl std::error::Error for CliError {}

/// talking head command line interface
#[derive(Debug, FromArgs)]
pub struct Args {
    /// enable verbose logging, overridden by "quiet" if passed
    #[argh(switch, short = 'v', long = "verbose")]
    verbose: bool,
    /// disable all logging, overrides verbose
    #[argh(switch, short = 'q', long = "quiet")]
    quiet: bool,
    /// path to an animation config json file
    #[argh(option, short = 'c')]
    config: Option<String>,
    #[argh(subcommand)]
    commands: Option<Commands>,
}

impl Args {
    /// Parse some `args`. Args are expected to come from Godot user args.
    pub fn parse(args: &[&str]) -> Result<Self, CliError> {
        Self::from_args(&[env!("CARGO_PKG_NAME")], args).map_err(CliError::ParseFailure)
    }

    pub fn log_level(&self) -> LevelFilter {
        if self.quiet {
            LevelFilter::Off
        } else if self.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        }
    }

    pub fn config_path(&self) -> Option<&str> {
        self.config.as_deref()
    }

    pub fn command(&self) -> Option<&Commands> {
        self.commands.as_ref()
    }

    /// Convert self to a [Dictionary].
    ///
    /// # Note
    /// **All keys must always be provided!**
    pub fn to_dict(&self) -> Dictionary {
        let mut r = Dictionary::new();

        r.insert("verbose", self.verbose);
        r.insert("quiet", self.quiet);
        r.insert(
            "config",
            match &self.config {
                Some(v) => GodotString::from(v),
                None => GodotString::new(),
            },
        );

        if let Some(c) = &self.commands {
            r.insert("has_command", true);

            match c {
                Commands::Timeline(c) => c.populate_dict(&mut r),
                Commands::Pattern(c) => c.populate_dict(&mut r),
            }
        } else {
            r.insert("has_command", false);
        }

        r
    }
}

trait GodotCommand {
    fn populate_dict(&self, dict: &mut Dictionary);
}

/// Demo sessions to run once the model is ready.
#[derive(Debug, FromArgs)]
#[argh(subcommand)]
pub enum Commands {
    Timeline(TimelineCommand),
    Pattern(PatternCommand),
}

/// A non-negative duration in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DurationMs(pub f64);

impl FromStr for DurationMs {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().parse::<f64>() {
            Ok(v) if v.is_finite() && v >= 0.0 => Ok(Self(v)),
            _ => Err(CliError::InvalidDuration {
                input: s.to_string(),
            }),
        }
    }
}

/// Comma separated viseme codes, e.g. `sil,aa,E,O`.
#[derive(Debug, Clone, PartialEq)]
pub struct VisemeList(pub Vec<String>);

impl FromStr for VisemeList {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let codes = s
            .split(VISEME_SEPARATOR)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
            .collect::<Vec<_>>();

        if codes.is_empty() {
            return Err(CliError::EmptyVisemeList {
                input: s.to_string(),
            });
        }

        Ok(Self(codes))
    }
}

/// Speak a viseme timeline
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "timeline")]
pub struct TimelineCommand {
    /// comma separated viseme codes
    #[argh(positional)]
    pub visemes: VisemeList,
    /// duration of the whole timeline in milliseconds
    #[argh(option, short = 'd')]
    pub duration: Option<DurationMs>,
}

impl GodotCommand for TimelineCommand {
    fn populate_dict(&self, dict: &mut Dictionary) {
        dict.insert("command", "timeline");

        let mut visemes = PackedStringArray::new();
        for code in self.visemes.0.iter() {
            visemes.push(GodotString::from(code));
        }
        dict.insert("visemes", visemes);
        dict.insert("duration", self.duration.map(|v| v.0).unwrap_or_default());
    }
}

/// Speak with the generic talking pattern for an audio payload size
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "pattern")]
pub struct PatternCommand {
    /// size of the pretend audio payload in bytes
    #[argh(positional)]
    pub bytes: usize,
    /// override the duration estimated from the payload size
    #[argh(option, short = 'd')]
    pub duration: Option<DurationMs>,
}

impl GodotCommand for PatternCommand {
    fn populate_dict(&self, dict: &mut Dictionary) {
        dict.insert("command", "pattern");

        dict.insert("bytes", self.bytes as i64);
        dict.insert("duration", self.duration.map(|v| v.0).unwrap_or_default());
    }
}
