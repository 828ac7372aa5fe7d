use std::{
    io::BufRead,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    config::{load_settings, Settings},
    panels::PanelOutcome,
    selection::RestoreOutcome,
    workspace::DEFAULT_SHARE_EXPIRY_HOURS,
    AccessGate, AnalysisApi, FileTokenStore, HttpAnalysisClient, TokenStore, UploadFile,
    Workspace, FILE_ID_QUERY_KEY,
};
use shared::{
    domain::{ExportFormat, FileId, Locale, SessionId, ShareId},
    protocol::EmailReportRequest,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use url::Url;

mod render;

const APP_ORIGIN: &str = "http://localhost/";

#[derive(Parser, Debug)]
#[command(name = "analyst", about = "Command-line client for the data analysis backend")]
struct Cli {
    /// Backend base URL including the API prefix, e.g. https://host/api
    #[arg(long, global = true)]
    api_url: Option<String>,
    #[arg(long, global = true)]
    locale: Option<Locale>,
    #[arg(long, global = true)]
    token_path: Option<PathBuf>,
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reads the password from `ANALYST_PASSWORD`, else one line of stdin.
    Login {
        username: String,
        #[arg(long, env = "ANALYST_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    Logout,
    Files,
    /// Uploads one file, or merges several into one artifact.
    Upload {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    Delete {
        file_id: String,
    },
    Analyze {
        file_id: String,
        #[arg(long)]
        prompt: Option<String>,
    },
    Dashboard {
        file_id: String,
        /// Load even when the quality check asks for refinement.
        #[arg(long, conflicts_with = "refine")]
        proceed: bool,
        /// Refine the data first when the quality check asks for it.
        #[arg(long)]
        refine: bool,
        /// Reorder charts, e.g. --move chart-2:chart-0
        #[arg(long = "move", value_name = "SOURCE:TARGET")]
        moves: Vec<String>,
    },
    Clean {
        file_id: String,
    },
    Chat {
        file_id: String,
        question: String,
        /// Continue a saved session.
        #[arg(long)]
        session: Option<String>,
    },
    Sessions {
        file_id: String,
        #[arg(long)]
        delete: Option<String>,
    },
    Compare {
        file_id: String,
        /// Files to upload and compare against FILE_ID.
        #[arg(long = "with", required = true)]
        with: Vec<PathBuf>,
        #[arg(long)]
        prompt: Option<String>,
    },
    Share {
        file_id: String,
        #[arg(long)]
        no_analysis: bool,
        #[arg(long)]
        no_dashboard: bool,
        #[arg(long, default_value_t = DEFAULT_SHARE_EXPIRY_HOURS)]
        hours: u32,
    },
    Shared {
        share_id: String,
    },
    Export {
        file_id: String,
        #[arg(long, default_value = "pdf")]
        format: ExportFormat,
        #[arg(long)]
        no_charts: bool,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    DetectLanguage {
        file_id: String,
    },
    Email {
        file_id: String,
        to: String,
        #[arg(long)]
        no_charts: bool,
    },
    ApiKey {
        #[command(subcommand)]
        action: ApiKeyAction,
    },
}

#[derive(Subcommand, Debug)]
enum ApiKeyAction {
    Status,
    Set { key: String },
    Remove,
}

impl Command {
    /// Route the command would open in the web client; drives the login gate.
    fn route(&self, locale: Locale) -> Option<String> {
        match self {
            Command::Login { .. } | Command::Logout => None,
            Command::Shared { share_id } => Some(format!("/shared/{share_id}")),
            _ => Some(format!("/{}", locale.code())),
        }
    }
}

fn read_password(input: &mut impl BufRead) -> Result<String> {
    eprint!("Password: ");
    let mut line = String::new();
    input.read_line(&mut line).context("failed to read password")?;
    let password = line.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        bail!("no password given");
    }
    Ok(password.to_string())
}

fn apply_cli_overrides(mut settings: Settings, cli: &Cli) -> Settings {
    if let Some(v) = &cli.api_url {
        settings.api_base_url = v.clone();
    }
    if let Some(v) = cli.locale {
        settings.locale = v;
    }
    if let Some(v) = &cli.token_path {
        settings.token_path = Some(v.clone());
    }
    if let Some(v) = cli.timeout_secs {
        settings.request_timeout_secs = v;
    }
    settings
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = apply_cli_overrides(load_settings()?, &cli);
    debug!(api = %settings.api_base_url, locale = %settings.locale, "cli: settings loaded");

    let tokens: Arc<dyn TokenStore> = Arc::new(FileTokenStore::new(settings.token_store_path()));
    let client = Arc::new(
        HttpAnalysisClient::new(&settings.api_base_url, settings.timeout(), tokens.clone())
            .context("failed to build HTTP client")?,
    );

    if let Some(route) = cli.command.route(settings.locale) {
        if !AccessGate::new(tokens.clone()).allows(&route) {
            bail!("not signed in; run `analyst login <username> --password <password>` first");
        }
    }

    let app = App {
        api: client.clone(),
        settings,
    };

    match cli.command {
        Command::Login { username, password } => {
            let password = match password {
                Some(password) => password,
                None => read_password(&mut std::io::stdin().lock())?,
            };
            client
                .login(&username, &password)
                .await
                .context("login failed")?;
            println!("Signed in as {username}");
        }
        Command::Logout => {
            client.logout();
            println!("Signed out");
        }
        Command::Files => app.files().await?,
        Command::Upload { paths } => app.upload(paths).await?,
        Command::Delete { file_id } => app.delete(FileId::new(file_id)).await?,
        Command::Analyze { file_id, prompt } => app.analyze(FileId::new(file_id), prompt).await?,
        Command::Dashboard {
            file_id,
            proceed,
            refine,
            moves,
        } => {
            app.dashboard(FileId::new(file_id), proceed, refine, &moves)
                .await?
        }
        Command::Clean { file_id } => app.clean(FileId::new(file_id)).await?,
        Command::Chat {
            file_id,
            question,
            session,
        } => {
            app.chat(FileId::new(file_id), &question, session.map(SessionId::new))
                .await?
        }
        Command::Sessions { file_id, delete } => {
            app.sessions(FileId::new(file_id), delete.map(SessionId::new))
                .await?
        }
        Command::Compare {
            file_id,
            with,
            prompt,
        } => app.compare(FileId::new(file_id), with, prompt).await?,
        Command::Share {
            file_id,
            no_analysis,
            no_dashboard,
            hours,
        } => {
            app.share(FileId::new(file_id), !no_analysis, !no_dashboard, hours)
                .await?
        }
        Command::Shared { share_id } => {
            let report = client
                .shared_report(&ShareId::new(share_id))
                .await
                .context("failed to open shared report")?;
            render::shared_report(&report);
        }
        Command::Export {
            file_id,
            format,
            no_charts,
            out_dir,
        } => {
            app.export(FileId::new(file_id), format, !no_charts, &out_dir)
                .await?
        }
        Command::DetectLanguage { file_id } => {
            let detected = client
                .detect_language(&FileId::new(file_id))
                .await
                .context("language detection failed")?;
            println!(
                "{} (confidence {:.0}%)",
                detected.detected_language,
                detected.confidence * 100.0
            );
        }
        Command::Email {
            file_id,
            to,
            no_charts,
        } => {
            client
                .email_report(EmailReportRequest {
                    file_id: FileId::new(file_id),
                    email: to.clone(),
                    include_charts: !no_charts,
                })
                .await
                .context("failed to email report")?;
            println!("Report sent to {to}");
        }
        Command::ApiKey { action } => match action {
            ApiKeyAction::Status => {
                render::api_key(&client.api_key_status().await.context("failed to read API key status")?)
            }
            ApiKeyAction::Set { key } => {
                render::api_key(&client.set_api_key(&key).await.context("failed to store API key")?)
            }
            ApiKeyAction::Remove => {
                client
                    .remove_api_key()
                    .await
                    .context("failed to remove API key")?;
                println!("API key removed");
            }
        },
    }

    Ok(())
}

struct App {
    api: Arc<HttpAnalysisClient>,
    settings: Settings,
}

impl App {
    fn workspace(&self) -> Result<Arc<Workspace>> {
        let origin = Url::parse(APP_ORIGIN).context("invalid app origin")?;
        let location = origin
            .join(self.settings.locale.code())
            .context("invalid locale route")?;
        Ok(Workspace::new(
            self.api.clone(),
            location,
            self.settings.locale,
            self.settings.retry_policy(),
        ))
    }

    /// A workspace whose selection was restored from a `fileId` location.
    async fn workspace_for(&self, file_id: &FileId) -> Result<Arc<Workspace>> {
        let workspace = self.workspace()?;
        let mut location = workspace.location().await;
        location
            .query_pairs_mut()
            .append_pair(FILE_ID_QUERY_KEY, file_id.as_str());

        match workspace.restore(location).await {
            RestoreOutcome::Restored(artifact) => {
                debug!(file_id = %artifact.file_id, filename = %artifact.filename, "cli: artifact restored");
                Ok(workspace)
            }
            _ => bail!("file '{file_id}' was not found in your library"),
        }
    }

    async fn files(&self) -> Result<()> {
        let workspace = self.workspace()?;
        let library = workspace.library();
        if library.refresh().await == PanelOutcome::Failed {
            bail!("could not list files");
        }
        render::files(&library.files().await);
        Ok(())
    }

    async fn upload(&self, paths: Vec<PathBuf>) -> Result<()> {
        let mut files = Vec::with_capacity(paths.len());
        for path in &paths {
            files.push(read_upload(path).await?);
        }

        if files.len() == 1 {
            let workspace = self.workspace()?;
            let file = files.remove(0);
            let artifact = workspace
                .upload_and_select(file)
                .await
                .context("upload failed")?;
            render::uploaded(&artifact.file_id, &artifact.filename, artifact.num_chunks, &artifact.preview);
            println!("Open: {}", workspace.location().await);
        } else {
            let uploaded = self.api.upload_files(files).await.context("upload failed")?;
            render::uploaded(&uploaded.file_id, &uploaded.filename, uploaded.num_chunks, &uploaded.preview);
        }
        Ok(())
    }

    async fn delete(&self, file_id: FileId) -> Result<()> {
        let workspace = self.workspace()?;
        if workspace.delete_file(&file_id).await == PanelOutcome::Failed {
            let message = workspace.library().snapshot().await.error.unwrap_or_default();
            bail!("{message}");
        }
        println!("Deleted {file_id}");
        Ok(())
    }

    async fn analyze(&self, file_id: FileId, prompt: Option<String>) -> Result<()> {
        let workspace = self.workspace_for(&file_id).await?;
        match workspace.load_analysis(prompt.as_deref()).await {
            PanelOutcome::Skipped => bail!("the custom prompt is empty"),
            PanelOutcome::Failed => {
                bail!("{}", workspace.analysis().snapshot().await.error.unwrap_or_default())
            }
            _ => {}
        }
        if let Some(analysis) = workspace.analysis().snapshot().await.data {
            render::analysis(&analysis);
        }
        Ok(())
    }

    async fn dashboard(
        &self,
        file_id: FileId,
        proceed: bool,
        refine: bool,
        moves: &[String],
    ) -> Result<()> {
        let workspace = self.workspace_for(&file_id).await?;
        let mut outcome = workspace.load_dashboard().await;

        if outcome == PanelOutcome::Blocked {
            let state = workspace.dashboard().snapshot().await;
            if let Some(report) = state.quality_report() {
                render::quality_report(report);
            }
            outcome = if refine {
                workspace.remediate_dashboard().await
            } else if proceed {
                workspace.proceed_dashboard().await
            } else {
                println!("Re-run with --refine to clean the data first, or --proceed to continue anyway.");
                return Ok(());
            };
        }

        if outcome == PanelOutcome::Failed {
            bail!("{}", workspace.dashboard().snapshot().await.error.unwrap_or_default());
        }

        for spec in moves {
            let Some((source, target)) = spec.split_once(':') else {
                bail!("invalid --move '{spec}', expected SOURCE:TARGET");
            };
            if !workspace.reorder_chart(source, target).await {
                info!(source, target, "cli: chart move ignored");
            }
        }

        render::dashboard(&workspace.dashboard().snapshot().await);
        Ok(())
    }

    async fn clean(&self, file_id: FileId) -> Result<()> {
        let workspace = self.workspace_for(&file_id).await?;
        if workspace.load_cleaning().await == PanelOutcome::Failed {
            bail!("{}", workspace.cleaning().snapshot().await.error.unwrap_or_default());
        }
        if let Some(report) = workspace.cleaning().snapshot().await.data {
            render::cleaning(&report);
        }
        Ok(())
    }

    async fn chat(&self, file_id: FileId, question: &str, session: Option<SessionId>) -> Result<()> {
        let workspace = self.workspace_for(&file_id).await?;
        if let Some(session_id) = session {
            if workspace.chat().fetch_session(&session_id).await == PanelOutcome::Failed {
                bail!("could not open chat session {session_id}");
            }
        }

        let outcome = workspace.ask(question).await;
        if outcome == PanelOutcome::Skipped {
            bail!("the question is empty");
        }
        let state = workspace.chat().snapshot().await;
        render::chat_reply(&state);
        if outcome == PanelOutcome::Failed {
            bail!("the assistant could not answer");
        }
        Ok(())
    }

    async fn sessions(&self, file_id: FileId, delete: Option<SessionId>) -> Result<()> {
        let workspace = self.workspace_for(&file_id).await?;
        let chat = workspace.chat();
        if let Some(session_id) = delete {
            if chat.delete_session(&session_id).await == PanelOutcome::Failed {
                bail!("could not delete chat session {session_id}");
            }
            println!("Deleted session {session_id}");
        }
        chat.refresh_sessions(&file_id).await;
        render::sessions(&chat.snapshot().await.sessions);
        Ok(())
    }

    async fn compare(&self, file_id: FileId, with: Vec<PathBuf>, prompt: Option<String>) -> Result<()> {
        let workspace = self.workspace_for(&file_id).await?;
        for path in &with {
            let file = read_upload(path).await?;
            if workspace.compare_panel().add_file(file).await == PanelOutcome::Failed {
                let message = workspace
                    .compare_panel()
                    .snapshot()
                    .await
                    .result
                    .error
                    .unwrap_or_default();
                bail!("failed to upload '{}': {message}", path.display());
            }
        }

        if workspace.compare(prompt.as_deref()).await == PanelOutcome::Failed {
            let message = workspace
                .compare_panel()
                .snapshot()
                .await
                .result
                .error
                .unwrap_or_default();
            bail!("{message}");
        }
        if let Some(result) = workspace.compare_panel().snapshot().await.result.data {
            render::comparison(&result);
        }
        Ok(())
    }

    async fn share(
        &self,
        file_id: FileId,
        include_analysis: bool,
        include_dashboard: bool,
        hours: u32,
    ) -> Result<()> {
        let workspace = self.workspace_for(&file_id).await?;
        let shared = workspace
            .share(include_analysis, include_dashboard, hours)
            .await
            .context("failed to create share link")?;
        println!("Share link: {}", shared.share_url);
        println!("Expires:    {}", render::timestamp(&shared.expires_at));
        Ok(())
    }

    async fn export(
        &self,
        file_id: FileId,
        format: ExportFormat,
        include_charts: bool,
        out_dir: &Path,
    ) -> Result<()> {
        let workspace = self.workspace_for(&file_id).await?;
        let artifact = workspace
            .export(format, include_charts)
            .await
            .context("export failed")?;

        tokio::fs::create_dir_all(out_dir)
            .await
            .with_context(|| format!("failed to create '{}'", out_dir.display()))?;
        let path = out_dir.join(&artifact.filename);
        tokio::fs::write(&path, &artifact.bytes)
            .await
            .with_context(|| format!("failed to write '{}'", path.display()))?;
        println!("Saved {} ({} bytes)", path.display(), artifact.bytes.len());
        Ok(())
    }
}

async fn read_upload(path: &Path) -> Result<UploadFile> {
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload.csv")
        .to_string();
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read '{}'", path.display()))?;
    let mime_type = mime_guess::from_path(path).first_raw().map(str::to_string);
    Ok(UploadFile {
        filename,
        mime_type,
        bytes,
    })
}
