//! Command-line argument parsing.
//!
//! Arguments are scanned by hand: global flags (`--debug`, `--config`) may
//! appear anywhere, the first non-flag argument selects the command, and
//! anything unrecognised falls back to the help screen.

use crate::brightness::LevelScale;

/// What the binary should do after parsing.
#[derive(Debug, PartialEq)]
pub enum CliAction {
    /// Run the daemon, reading host events from stdin
    Run {
        debug_enabled: bool,
        config_dir: Option<String>,
        log_file: Option<String>,
    },
    /// Make one decision from explicit signals and print the message
    Decide {
        debug_enabled: bool,
        config_dir: Option<String>,
        activity: String,
        latitude: Option<f64>,
        longitude: Option<f64>,
        lux: Option<f32>,
        at: Option<String>,
    },
    /// Print the daytime window for a location
    Solar {
        debug_enabled: bool,
        config_dir: Option<String>,
        latitude: f64,
        longitude: f64,
        date: Option<String>,
    },
    /// Apply brightness message lines from stdin as the paired display would
    Receive {
        debug_enabled: bool,
        scale: LevelScale,
        automatic: bool,
    },
    /// Display help information and exit
    ShowHelp,
    /// Display version information and exit
    ShowVersion,
    /// Show help due to unknown or malformed arguments and exit
    ShowHelpDueToError,
}

/// Result of parsing command-line arguments.
pub struct ParsedArgs {
    pub action: CliAction,
}

/// Options shared by every command.
#[derive(Default)]
struct GlobalFlags {
    debug_enabled: bool,
    config_dir: Option<String>,
}

fn parse_number<T: std::str::FromStr>(flag: &str, value: Option<&String>) -> Option<T> {
    let Some(value) = value else {
        log_warning!("{} requires a value", flag);
        return None;
    };
    match value.parse() {
        Ok(number) => Some(number),
        Err(_) => {
            log_warning!("Invalid value for {}: {}", flag, value);
            None
        }
    }
}

impl ParsedArgs {
    /// Parse command-line arguments into a structured result.
    ///
    /// `args` includes the program name as its first element, the way
    /// `std::env::args()` yields it.
    pub fn parse<I, S>(args: I) -> ParsedArgs
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args_vec: Vec<String> = args
            .into_iter()
            .skip(1)
            .map(|s| s.as_ref().to_string())
            .collect();

        // Help and version take precedence over everything else
        if args_vec
            .iter()
            .any(|arg| arg == "--version" || arg == "-V" || arg == "-v")
        {
            return ParsedArgs {
                action: CliAction::ShowVersion,
            };
        }
        if args_vec.iter().any(|arg| arg == "--help" || arg == "-h") {
            return ParsedArgs {
                action: CliAction::ShowHelp,
            };
        }

        let mut globals = GlobalFlags::default();
        let mut command: Option<String> = None;
        let mut rest: Vec<String> = Vec::new();

        let mut idx = 0;
        while idx < args_vec.len() {
            let arg = &args_vec[idx];
            match arg.as_str() {
                "--debug" | "-d" => globals.debug_enabled = true,
                "--config" | "-c" => {
                    let Some(dir) = args_vec.get(idx + 1) else {
                        log_warning!("--config requires a directory");
                        return ParsedArgs {
                            action: CliAction::ShowHelpDueToError,
                        };
                    };
                    globals.config_dir = Some(dir.clone());
                    idx += 1;
                }
                _ if command.is_none() && !arg.starts_with('-') => command = Some(arg.clone()),
                _ => rest.push(arg.clone()),
            }
            idx += 1;
        }

        let action = match command.as_deref() {
            None | Some("run") => Self::parse_run(globals, &rest),
            Some("decide") => Self::parse_decide(globals, &rest),
            Some("solar") => Self::parse_solar(globals, &rest),
            Some("receive") => Self::parse_receive(globals, &rest),
            Some("help") => CliAction::ShowHelp,
            Some("version") => CliAction::ShowVersion,
            Some(other) => {
                log_warning!("Unknown command: {}", other);
                CliAction::ShowHelpDueToError
            }
        };

        ParsedArgs { action }
    }

    fn parse_run(globals: GlobalFlags, rest: &[String]) -> CliAction {
        let mut log_file = None;
        let mut idx = 0;
        while idx < rest.len() {
            match rest[idx].as_str() {
                "--log" | "-l" => {
                    let Some(path) = rest.get(idx + 1) else {
                        log_warning!("--log requires a file path");
                        return CliAction::ShowHelpDueToError;
                    };
                    log_file = Some(path.clone());
                    idx += 1;
                }
                other => {
                    log_warning!("Unknown argument for run: {}", other);
                    return CliAction::ShowHelpDueToError;
                }
            }
            idx += 1;
        }

        CliAction::Run {
            debug_enabled: globals.debug_enabled,
            config_dir: globals.config_dir,
            log_file,
        }
    }

    fn parse_decide(globals: GlobalFlags, rest: &[String]) -> CliAction {
        let mut activity = None;
        let mut latitude = None;
        let mut longitude = None;
        let mut lux = None;
        let mut at = None;

        let mut idx = 0;
        while idx < rest.len() {
            let arg = rest[idx].as_str();
            let value = rest.get(idx + 1);
            match arg {
                "--lat" => match parse_number::<f64>(arg, value) {
                    Some(v) => latitude = Some(v),
                    None => return CliAction::ShowHelpDueToError,
                },
                "--lon" => match parse_number::<f64>(arg, value) {
                    Some(v) => longitude = Some(v),
                    None => return CliAction::ShowHelpDueToError,
                },
                "--lux" => match parse_number::<f32>(arg, value) {
                    Some(v) => lux = Some(v),
                    None => return CliAction::ShowHelpDueToError,
                },
                "--at" => match value {
                    Some(v) => at = Some(v.clone()),
                    None => {
                        log_warning!("--at requires a time (YYYY-MM-DD HH:MM:SS)");
                        return CliAction::ShowHelpDueToError;
                    }
                },
                _ if activity.is_none() && !arg.starts_with('-') => {
                    activity = Some(arg.to_string());
                    idx += 1;
                    continue;
                }
                _ => {
                    log_warning!("Unknown argument for decide: {}", arg);
                    return CliAction::ShowHelpDueToError;
                }
            }
            idx += 2;
        }

        let Some(activity) = activity else {
            log_warning!("decide requires an activity");
            return CliAction::ShowHelpDueToError;
        };
        if latitude.is_some() != longitude.is_some() {
            log_warning!("--lat and --lon must be given together");
            return CliAction::ShowHelpDueToError;
        }

        CliAction::Decide {
            debug_enabled: globals.debug_enabled,
            config_dir: globals.config_dir,
            activity,
            latitude,
            longitude,
            lux,
            at,
        }
    }

    fn parse_solar(globals: GlobalFlags, rest: &[String]) -> CliAction {
        let (Some(lat), Some(lon)) = (rest.first(), rest.get(1)) else {
            log_warning!("solar requires a latitude and a longitude");
            return CliAction::ShowHelpDueToError;
        };
        let (Ok(latitude), Ok(longitude)) = (lat.parse::<f64>(), lon.parse::<f64>()) else {
            log_warning!("Invalid coordinates: {} {}", lat, lon);
            return CliAction::ShowHelpDueToError;
        };
        if rest.len() > 3 {
            log_warning!("Too many arguments for solar");
            return CliAction::ShowHelpDueToError;
        }

        CliAction::Solar {
            debug_enabled: globals.debug_enabled,
            config_dir: globals.config_dir,
            latitude,
            longitude,
            date: rest.get(2).cloned(),
        }
    }

    fn parse_receive(globals: GlobalFlags, rest: &[String]) -> CliAction {
        let mut scale = LevelScale::default();
        let mut automatic = false;
        let mut idx = 0;
        while idx < rest.len() {
            match rest[idx].as_str() {
                "--scale" => {
                    let Some(value) = rest.get(idx + 1) else {
                        log_warning!("--scale requires three or five");
                        return CliAction::ShowHelpDueToError;
                    };
                    match value.parse() {
                        Ok(parsed) => scale = parsed,
                        Err(e) => {
                            log_warning!("{}", e);
                            return CliAction::ShowHelpDueToError;
                        }
                    }
                    idx += 1;
                }
                "--automatic" => automatic = true,
                other => {
                    log_warning!("Unknown argument for receive: {}", other);
                    return CliAction::ShowHelpDueToError;
                }
            }
            idx += 1;
        }

        CliAction::Receive {
            debug_enabled: globals.debug_enabled,
            scale,
            automatic,
        }
    }

    /// Convenience method to parse from std::env::args()
    pub fn from_env() -> ParsedArgs {
        Self::parse(std::env::args())
    }
}

/// Displays version information using custom logging style.
pub fn display_version_info() {
    log_version!();
    log_decorated!("{}", env!("CARGO_PKG_DESCRIPTION"));
    log_end!();
}

/// Displays custom help message using logger methods.
pub fn display_help() {
    log_version!();
    log_block_start!(env!("CARGO_PKG_DESCRIPTION"));
    log_block_start!("Usage:");
    log_indented!("wearlux [OPTIONS] [COMMAND]");
    log_block_start!("Options:");
    log_indented!("-c, --config <dir>     Use custom configuration directory");
    log_indented!("-d, --debug            Enable detailed debug output");
    log_indented!("-h, --help             Print help information");
    log_indented!("-V, --version          Print version information");
    log_block_start!("Commands:");
    log_indented!("run [--log <file>]     Read host events from stdin (default)");
    log_indented!("decide <activity>      Make one decision and print the message");
    log_indented!("    [--lat <deg> --lon <deg>] [--lux <lux>] [--at <YYYY-MM-DD HH:MM:SS>]");
    log_indented!("solar <lat> <lon> [YYYY-MM-DD]");
    log_indented!("                       Show the daytime window for a location");
    log_indented!("receive [--scale three|five] [--automatic]");
    log_indented!("                       Apply message lines from stdin as the display would");
    log_end!();
}
