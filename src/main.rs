//! sealpoll - Zero-knowledge encrypted surveys
//!
//! Usage:
//!   sealpoll init                               - Write a default configuration
//!   sealpoll id                                 - Print fresh identifiers
//!   sealpoll create --survey <file>             - Seal and register a survey
//!   sealpoll show <response_id>                 - Decrypt a survey
//!   sealpoll respond <response_id> --answers f  - Seal and submit answers
//!   sealpoll responses <analysis_id>            - Decrypt all responses
//!   sealpoll stats <analysis_id>                - Show response statistics
//!   sealpoll delete <analysis_id>               - Delete a survey
//!   sealpoll sweep                              - Remove expired surveys

use clap::{Parser, Subcommand};
use sealpoll::{
    access::{AnalysisScopeId, ResponseScopeId},
    codec::ArtifactCodec,
    config::Config,
    crypto::{CryptoProvider, Fingerprint},
    id::IdentifierGenerator,
    service::SurveyService,
    store::SledStore,
    survey::{ResponseBody, Survey},
    Error, Result,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;
use zeroize::Zeroizing;

#[derive(Parser)]
#[command(name = "sealpoll")]
#[command(author = "sealpoll Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Zero-knowledge encrypted surveys")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "~/.config/sealpoll/config.json")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print freshly generated identifiers
    Id {
        /// How many to generate
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
    },

    /// Seal a survey definition (JSON) and register it
    Create {
        /// Survey JSON file
        #[arg(long)]
        survey: PathBuf,

        /// Read the survey password from file
        #[arg(long)]
        password_file: Option<PathBuf>,
    },

    /// Decrypt and print a survey
    Show {
        /// Response-scope identifier
        response_id: String,

        #[arg(long)]
        password_file: Option<PathBuf>,
    },

    /// Seal and submit answers (JSON) to a survey
    Respond {
        /// Response-scope identifier
        response_id: String,

        /// Answers JSON file
        #[arg(long)]
        answers: PathBuf,

        #[arg(long)]
        password_file: Option<PathBuf>,
    },

    /// Decrypt all responses of a survey
    Responses {
        /// Analysis-scope identifier
        analysis_id: String,

        #[arg(long)]
        password_file: Option<PathBuf>,
    },

    /// Show response statistics
    Stats {
        /// Analysis-scope identifier
        analysis_id: String,

        #[arg(long)]
        password_file: Option<PathBuf>,
    },

    /// Delete a survey and all of its responses
    Delete {
        /// Analysis-scope identifier
        analysis_id: String,

        #[arg(long)]
        password_file: Option<PathBuf>,
    },

    /// Remove surveys past their retention period
    Sweep,
}

fn main() {
    let cli = Cli::parse();

    // Expand ~ in config path
    let config_path = expand_tilde(&cli.config);

    // Logging level comes from --verbose, else the config file if it loads
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Config::load(&config_path)
            .ok()
            .and_then(|c| c.logging.level.parse::<Level>().ok())
            .unwrap_or(Level::INFO)
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");

    if let Err(e) = run_command(cli.command, &config_path) {
        error!("Error: {}", e);
        eprintln!("sealpoll: {}", e.user_message());
        std::process::exit(1);
    }
}

fn run_command(command: Commands, config_path: &Path) -> Result<()> {
    match command {
        Commands::Init { force } => cmd_init(config_path, force),
        Commands::Id { count } => cmd_id(count),
        Commands::Create {
            survey,
            password_file,
        } => cmd_create(config_path, &survey, password_file),
        Commands::Show {
            response_id,
            password_file,
        } => cmd_show(config_path, &response_id, password_file),
        Commands::Respond {
            response_id,
            answers,
            password_file,
        } => cmd_respond(config_path, &response_id, &answers, password_file),
        Commands::Responses {
            analysis_id,
            password_file,
        } => cmd_responses(config_path, &analysis_id, password_file),
        Commands::Stats {
            analysis_id,
            password_file,
        } => cmd_stats(config_path, &analysis_id, password_file),
        Commands::Delete {
            analysis_id,
            password_file,
        } => cmd_delete(config_path, &analysis_id, password_file),
        Commands::Sweep => cmd_sweep(config_path),
    }
}

/// Everything a command needs, built once from the config
struct App {
    codec: ArtifactCodec,
    service: SurveyService<SledStore>,
}

impl App {
    fn open(config_path: &Path) -> Result<Self> {
        let config = load_config(config_path)?;
        config.ensure_directories()?;

        let provider = Arc::new(CryptoProvider::from_config(&config.encryption)?);
        let codec = ArtifactCodec::new(provider, config.password.clone());
        let store = Arc::new(SledStore::open(config.database_path())?);
        let service = SurveyService::new(
            store,
            codec.ids().clone(),
            config.retention.clone(),
            config.storage.clone(),
        );

        Ok(App { codec, service })
    }

    /// Derive the creator's proof for an analysis scope
    fn proof(&self, analysis_id: &AnalysisScopeId, password: &str) -> Result<Fingerprint> {
        let pkg = self.service.challenge(analysis_id)?;
        self.codec.prove(&pkg, password)
    }

    fn close(self) -> Result<()> {
        self.service.store().flush()
    }
}

fn load_config(config_path: &Path) -> Result<Config> {
    if config_path.exists() {
        Config::load(config_path)
    } else {
        info!("No config at {:?}, using defaults", config_path);
        Config::from_env()
    }
}

fn cmd_init(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(format!(
            "{} (use --force to overwrite)",
            config_path.display()
        )));
    }

    let config = Config::from_env()?;
    config.save(config_path)?;
    config.ensure_directories()?;

    println!("Configuration written to {}", config_path.display());
    println!("Data directory: {}", config.data_dir.display());
    println!(
        "Argon2id: {} KiB, {} iterations, {} lanes",
        config.encryption.argon2_memory_kib,
        config.encryption.argon2_iterations,
        config.encryption.argon2_parallelism
    );
    Ok(())
}

fn cmd_id(count: usize) -> Result<()> {
    let ids = IdentifierGenerator::default();
    for _ in 0..count {
        println!("{}", ids.generate());
    }
    Ok(())
}

fn cmd_create(config_path: &Path, survey_path: &Path, password_file: Option<PathBuf>) -> Result<()> {
    let app = App::open(config_path)?;

    let survey: Survey = read_json(survey_path)?;
    survey.validate().into_result()?;

    let password = read_password(password_file, "Survey password: ")?;
    let package = app.codec.seal_artifact(&survey, &password)?;
    drop(password);

    let created = app.service.create_survey(package)?;
    app.close()?;

    println!("Survey created");
    println!("  Share with respondents: {}", created.response_id);
    println!("  Keep private (results): {}", created.analysis_id);
    println!("  Expires: {}", created.expires_at.to_rfc3339());
    Ok(())
}

fn cmd_show(config_path: &Path, response_id: &str, password_file: Option<PathBuf>) -> Result<()> {
    let app = App::open(config_path)?;
    let response_id: ResponseScopeId = response_id.parse()?;

    let shell = app.service.fetch_shell(&response_id)?;
    let password = read_password(password_file, "Survey password: ")?;
    let survey: Survey = app.codec.open_artifact(&shell.package, &password)?;

    println!("{}", serde_json::to_string_pretty(&survey)?);
    println!("({} responses so far)", shell.response_count);
    Ok(())
}

fn cmd_respond(
    config_path: &Path,
    response_id: &str,
    answers_path: &Path,
    password_file: Option<PathBuf>,
) -> Result<()> {
    let app = App::open(config_path)?;
    let response_id: ResponseScopeId = response_id.parse()?;

    let shell = app.service.fetch_shell(&response_id)?;
    let password = read_password(password_file, "Survey password: ")?;
    let survey: Survey = app.codec.open_artifact(&shell.package, &password)?;

    let answers: ResponseBody = read_json(answers_path)?;
    let answers = answers.validate_against(&survey)?;
    let sealed = app.codec.seal_response(&answers, &shell.package, &password)?;
    drop(password);

    let count = app.service.submit_response(&response_id, sealed)?;
    app.close()?;

    println!("Response recorded ({} total)", count);
    Ok(())
}

fn cmd_responses(config_path: &Path, analysis_id: &str, password_file: Option<PathBuf>) -> Result<()> {
    let app = App::open(config_path)?;
    let analysis_id: AnalysisScopeId = analysis_id.parse()?;

    let password = read_password(password_file, "Survey password: ")?;
    let pkg = app.service.challenge(&analysis_id)?;
    let proof = app.codec.prove(&pkg, &password)?;
    let survey: Survey = app.codec.open_artifact(&pkg, &password)?;

    let records = app.service.list_responses(&analysis_id, &proof)?;
    println!("{} ({} responses)", survey.title, records.len());

    for record in records {
        let body: ResponseBody =
            app.codec
                .open_response(record.id, &record.ciphertext, &pkg, &password)?;
        println!();
        println!("Response {} at {}", record.id, record.submitted_at.to_rfc3339());
        for question in &survey.questions {
            println!(
                "  {}: {}",
                question.text,
                serde_json::to_string(body.answer(&question.id))?
            );
        }
    }
    Ok(())
}

fn cmd_stats(config_path: &Path, analysis_id: &str, password_file: Option<PathBuf>) -> Result<()> {
    let app = App::open(config_path)?;
    let analysis_id: AnalysisScopeId = analysis_id.parse()?;

    let password = read_password(password_file, "Survey password: ")?;
    let proof = app.proof(&analysis_id, &password)?;
    let stats = app.service.stats(&analysis_id, &proof)?;

    println!("Responses: {}", stats.response_count);
    println!("Created: {}", stats.created_at.to_rfc3339());
    match stats.last_response_at {
        Some(at) => println!("Last response: {}", at.to_rfc3339()),
        None => println!("Last response: none"),
    }
    println!("Expires: {}", stats.expires_at.to_rfc3339());
    Ok(())
}

fn cmd_delete(config_path: &Path, analysis_id: &str, password_file: Option<PathBuf>) -> Result<()> {
    let app = App::open(config_path)?;
    let analysis_id: AnalysisScopeId = analysis_id.parse()?;

    let password = read_password(password_file, "Survey password: ")?;
    let proof = app.proof(&analysis_id, &password)?;
    drop(password);

    let removed = app.service.delete_survey(&analysis_id, &proof)?;
    app.close()?;

    println!("Deleted survey and {} responses", removed.saturating_sub(1));
    Ok(())
}

fn cmd_sweep(config_path: &Path) -> Result<()> {
    let app = App::open(config_path)?;
    let removed = app.service.sweep_expired(chrono::Utc::now())?;
    app.close()?;

    println!("Removed {} expired surveys", removed);
    Ok(())
}

/// Read a password from a file or prompt for it
fn read_password(password_file: Option<PathBuf>, prompt: &str) -> Result<Zeroizing<String>> {
    let password = if let Some(path) = password_file {
        let raw = Zeroizing::new(
            std::fs::read_to_string(&path)
                .map_err(|e| Error::Internal(format!("Failed to read password file: {}", e)))?,
        );
        raw.trim().to_string()
    } else {
        rpassword::prompt_password(prompt).map_err(|e| Error::Internal(e.to_string()))?
    };
    Ok(Zeroizing::new(password))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| Error::Serialization(format!("{}: {}", path.display(), e)))
}

/// Expand ~ to home directory
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
