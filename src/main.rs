//! uart-fingerprint - command line front end for UART fingerprint modules.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use uart_fingerprint as app;

use app::config::{AppConfig, ConfigLoadResult, LoggingConfig};
use app::fp::{AckCode, AddMode, EnrollState, FingerprintReader, Privilege, User, UserId};
use app::{AppError, Result};

/// Drive a UART fingerprint module over a serial port.
#[derive(Parser)]
#[command(name = "uart-fingerprint", version)]
struct Cli {
    /// Config file (default: platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serial port, overrides the config file
    #[arg(long)]
    port: Option<String>,

    /// Baud rate, overrides the config file
    #[arg(long)]
    baud: Option<u32>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Number of enrolled users
    Count,
    /// Enroll a finger with three captures
    Enroll {
        /// Numeric id (0-4095) or a two-character tag
        id: UserId,
        #[arg(long, default_value = "low")]
        privilege: Privilege,
    },
    /// Delete one user
    Delete { id: UserId },
    /// Delete every enrolled user
    DeleteAll,
    /// Capture a finger and compare it with one user
    Verify { id: UserId },
    /// Capture a finger and search the whole database
    Identify {
        /// Keep identifying, logging misses instead of stopping
        #[arg(long)]
        watch: bool,
    },
    /// Privilege tier of a user
    Privilege { id: UserId },
    /// List all enrolled users
    Users,
    /// Show or change the comparison level (0-9)
    Level {
        #[command(subcommand)]
        action: Option<SetValue>,
    },
    /// Show or change the finger acquisition timeout
    Timeout {
        #[command(subcommand)]
        action: Option<SetValue>,
    },
    /// Show or change the duplicate-finger policy
    Mode {
        #[arg(value_enum)]
        policy: Option<RepeatPolicy>,
    },
    /// Put the module to sleep
    Sleep,
    /// Module firmware version
    Version,
    /// Capture a finger and save the raw image
    Image { file: PathBuf },
    /// Capture a finger and save its eigenvalue
    Extract { file: PathBuf },
    /// Read or store user templates
    Template {
        #[command(subcommand)]
        action: TemplateAction,
    },
    /// Compare a template file with the module
    CompareTemplate {
        file: PathBuf,
        /// Compare against this user only
        #[arg(long, conflicts_with = "capture")]
        id: Option<UserId>,
        /// Compare against a freshly captured finger
        #[arg(long)]
        capture: bool,
    },
    /// Push the [sensor] settings from the config file to the module
    Apply,
    /// Write the effective settings (file plus overrides) to the config file
    Init {
        /// Replace an existing config file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum SetValue {
    /// Change the value
    Set { value: u8 },
}

#[derive(Subcommand)]
enum TemplateAction {
    /// Save the stored template of a user to a file
    Get { id: UserId, file: PathBuf },
    /// Store a template file under a user id
    Put {
        id: UserId,
        file: PathBuf,
        #[arg(long, default_value = "low")]
        privilege: Privilege,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum RepeatPolicy {
    Allow,
    Reject,
}

impl From<RepeatPolicy> for AddMode {
    fn from(policy: RepeatPolicy) -> Self {
        match policy {
            RepeatPolicy::Allow => AddMode::AllowRepeat,
            RepeatPolicy::Reject => AddMode::RejectRepeat,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_path);
    let (mut config, missing) = match AppConfig::try_load(&config_path) {
        ConfigLoadResult::Loaded(config) => (config, false),
        ConfigLoadResult::Missing => (AppConfig::default(), true),
        ConfigLoadResult::Invalid(e) => {
            return Err(e).with_context(|| format!("Invalid config file {}", config_path.display()));
        }
    };

    let _guard = init_logging(&config.logging);
    if missing {
        tracing::info!("Config {:?} missing, using defaults", config_path);
    } else {
        tracing::debug!("Config loaded from {:?}", config_path);
    }

    if let Some(port) = &cli.port {
        config.serial.port = port.clone();
    }
    if let Some(baud) = cli.baud {
        config.serial.baud_rate = baud;
    }
    config.validate().context("Invalid serial settings")?;

    if let Commands::Init { force } = &cli.command {
        if !missing && !*force {
            anyhow::bail!("{} already exists, pass --force to replace it", config_path.display());
        }
        config
            .save(&config_path)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        tracing::info!("Config written to {:?}", config_path);
        println!("{}", config_path.display());
        return Ok(());
    }

    let reader = FingerprintReader::open(
        &config.serial.port,
        config.serial.baud_rate,
        config.serial.poll_interval(),
        config.timeouts.to_timeouts(),
    )
    .with_context(|| format!("Failed to open {}", config.serial.port))?;

    let out = Output { json: cli.json };
    run(&cli.command, &reader, &config, &out).map_err(|e| {
        if e.is_timeout() {
            tracing::warn!("No finger or no reply in time, try again");
        }
        anyhow::Error::new(e)
    })
}

/// Console logging on stderr plus an optional daily log file.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let (file_layer, guard) = match &config.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "uart-fingerprint.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    guard
}

/// Result printer; JSON goes to stdout unchanged so it can be piped.
struct Output {
    json: bool,
}

impl Output {
    fn emit(&self, value: serde_json::Value, text: impl FnOnce() -> String) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(&value)?);
        } else {
            println!("{}", text());
        }
        Ok(())
    }

    fn done(&self, text: &str) -> Result<()> {
        self.emit(json!({ "ok": true }), || text.to_string())
    }

    fn user(&self, user: &User) -> Result<()> {
        self.emit(serde_json::to_value(user)?, || describe(user))
    }
}

fn run(command: &Commands, reader: &FingerprintReader, config: &AppConfig, out: &Output) -> Result<()> {
    match command {
        Commands::Count => {
            let count = reader.user_count()?;
            out.emit(json!({ "count": count }), || format!("{count} users enrolled"))
        }
        Commands::Enroll { id, privilege } => {
            let user = reader.enroll_with(*id, *privilege, prompt)?;
            out.user(&user)
        }
        Commands::Delete { id } => {
            reader.delete_user(*id)?;
            out.done(&format!("User {id} deleted"))
        }
        Commands::DeleteAll => {
            reader.delete_all()?;
            out.done("All users deleted")
        }
        Commands::Verify { id } => {
            eprintln!("Place finger on the sensor");
            let user = reader.compare_one(*id)?;
            out.user(&user)
        }
        Commands::Identify { watch: false } => {
            eprintln!("Place finger on the sensor");
            let user = reader.identify()?;
            out.user(&user)
        }
        Commands::Identify { watch: true } => watch(reader, out),
        Commands::Privilege { id } => {
            let user = reader.user_privilege(*id)?;
            out.user(&user)
        }
        Commands::Users => {
            let users = reader.list_users()?;
            out.emit(serde_json::to_value(&users)?, || {
                users.iter().map(describe).collect::<Vec<_>>().join("\n")
            })
        }
        Commands::Level { action } => match action {
            Some(SetValue::Set { value }) => {
                reader.set_comparison_level(*value)?;
                out.done("Comparison level updated")
            }
            None => {
                let level = reader.comparison_level()?;
                out.emit(json!({ "level": level }), || format!("Comparison level: {level}"))
            }
        },
        Commands::Timeout { action } => match action {
            Some(SetValue::Set { value }) => {
                reader.set_acquisition_timeout(*value)?;
                out.done("Acquisition timeout updated")
            }
            None => {
                let value = reader.acquisition_timeout()?;
                out.emit(json!({ "timeout": value }), || format!("Acquisition timeout: {value}"))
            }
        },
        Commands::Mode { policy } => match policy {
            Some(policy) => {
                reader.set_add_mode((*policy).into())?;
                out.done("Add mode updated")
            }
            None => {
                let allow = reader.add_mode()? == AddMode::AllowRepeat;
                let text = if allow { "Repeat enrollment allowed" } else { "Repeat enrollment rejected" };
                out.emit(json!({ "allow_repeat": allow }), || text.to_string())
            }
        },
        Commands::Sleep => {
            reader.sleep()?;
            out.done("Module is dormant")
        }
        Commands::Version => {
            let version = reader.version()?;
            out.emit(json!({ "version": version }), || version.clone())
        }
        Commands::Image { file } => {
            eprintln!("Place finger on the sensor");
            let image = reader.acquire_image()?;
            write_file(file, &image)?;
            out.emit(json!({ "file": file, "bytes": image.len() }), || {
                format!("Saved {} image bytes to {}", image.len(), file.display())
            })
        }
        Commands::Extract { file } => {
            eprintln!("Place finger on the sensor");
            let eigenvalue = reader.extract_eigenvalue()?;
            write_file(file, &eigenvalue)?;
            out.emit(json!({ "file": file, "bytes": eigenvalue.len() }), || {
                format!("Saved {} eigenvalue bytes to {}", eigenvalue.len(), file.display())
            })
        }
        Commands::Template { action } => match action {
            TemplateAction::Get { id, file } => {
                let user = reader.upload_template(*id)?;
                let template = user.template.as_deref().unwrap_or_default();
                write_file(file, template)?;
                out.emit(
                    json!({ "id": user.id, "privilege": user.privilege, "file": file, "bytes": template.len() }),
                    || format!("Saved template of {} to {}", describe(&user), file.display()),
                )
            }
            TemplateAction::Put { id, file, privilege } => {
                let template = read_template(file)?;
                reader.download_and_save(*id, *privilege, &template)?;
                out.done(&format!("Stored template as user {id} ({privilege})"))
            }
        },
        Commands::CompareTemplate { file, id, capture } => {
            let template = read_template(file)?;
            if let Some(id) = id {
                reader.download_compare_one(*id, &template)?;
                out.emit(json!({ "matched": true, "id": id }), || format!("Template matches user {id}"))
            } else if *capture {
                eprintln!("Place finger on the sensor");
                reader.download_compare_immediate(&template)?;
                out.emit(json!({ "matched": true }), || "Template matches the finger".to_string())
            } else {
                let user = reader.download_compare_many(&template)?;
                out.user(&user)
            }
        }
        Commands::Apply => apply(reader, config, out),
        Commands::Init { .. } => Err(AppError::validation("init does not talk to the module")),
    }
}

/// Unattended identification loop; only non-retryable errors end it.
fn watch(reader: &FingerprintReader, out: &Output) -> Result<()> {
    tracing::info!("Watching for fingers, Ctrl+C to stop");
    loop {
        match reader.identify() {
            Ok(user) => out.user(&user)?,
            Err(e) if e.is_retryable() || e.ack_code() == Some(AckCode::NoSuchUser) => {
                tracing::debug!("No match: {e}");
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn apply(reader: &FingerprintReader, config: &AppConfig, out: &Output) -> Result<()> {
    let sensor = &config.sensor;
    let mut applied = Vec::new();

    if let Some(level) = sensor.comparison_level {
        reader.set_comparison_level(level)?;
        applied.push(format!("comparison_level = {level}"));
    }
    if let Some(timeout) = sensor.acquisition_timeout {
        reader.set_acquisition_timeout(timeout)?;
        applied.push(format!("acquisition_timeout = {timeout}"));
    }
    if let Some(mode) = sensor.add_mode() {
        reader.set_add_mode(mode)?;
        applied.push(format!("allow_repeat = {}", mode == AddMode::AllowRepeat));
    }

    tracing::info!("Applied {} sensor settings", applied.len());
    out.emit(json!({ "applied": applied }), || {
        if applied.is_empty() {
            "No [sensor] settings configured".to_string()
        } else {
            applied.join("\n")
        }
    })
}

/// Operator prompts between enrollment captures.
fn prompt(state: EnrollState) {
    match state {
        EnrollState::CaptureOne => eprintln!("Place finger on the sensor (1/3)"),
        EnrollState::CaptureTwo => eprintln!("Lift and place the same finger again (2/3)"),
        EnrollState::CaptureThree => eprintln!("Lift and place the same finger once more (3/3)"),
        EnrollState::Failed => eprintln!("Enrollment failed"),
        EnrollState::Idle | EnrollState::Complete => {}
    }
}

fn describe(user: &User) -> String {
    let name = match user.id.as_tag() {
        Some(tag) => format!("{} ('{tag}')", user.id),
        None => user.id.to_string(),
    };
    match user.privilege {
        Some(privilege) => format!("User {name}, privilege {privilege}"),
        None => format!("User {name}"),
    }
}

fn read_template(path: &Path) -> Result<Vec<u8>> {
    let template = fs::read(path)?;
    if template.is_empty() {
        return Err(AppError::validation(format!("Template file {} is empty", path.display())));
    }
    Ok(template)
}

fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, data)?;
    Ok(())
}
