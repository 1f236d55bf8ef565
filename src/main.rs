use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use portal::admin::console::{AdminConsole, ConsoleStream};
use portal::config::{ConfigError, PortalConfig};
use portal::net::api::{ApiError, HttpApi};
use portal::net::directory::{DEFAULT_PAGE_SIZE, Directory};
use portal::net::engagement::{EngagementApi, parse_channel_ids, parse_member_ids};
use portal::net::reports::ReportApi;
use portal::net::types::{Member, MemberUpdate, ReportBody, ReportType, SocialField};
use portal::state::session::{Session, SessionManager};
use portal::state::verification::{
    PollPhase, SessionVerification, VerificationPoller, logout_during_verification,
};
use portal::util::route_guard::{AuthView, GateDecision, HOME_ROUTE, RouteAccess, auth_entry, gate};

/// Extra time allowed after the success grace period for the session refresh.
const REFRESH_SETTLE: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("api call failed: {0}")]
    Api(#[from] ApiError),
    #[error("{0}")]
    Rejected(String),
    #[error("admin commands require an admin account")]
    NotAdmin,
    #[error("account is not verified yet; run `portal verify` first")]
    NotVerified,
    #[error("verification did not complete; run `portal verify` to retry")]
    VerificationFailed,
    #[error("verification poller stopped unexpectedly")]
    PollerStopped,
    #[error("verified, but the session did not pick up the new group in time; run `portal session`")]
    RefreshTimedOut,
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "portal", about = "Member portal session, verification and admin CLI")]
struct Cli {
    #[arg(long, env = "PORTAL_API_BASE_URL")]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct Credentials {
    #[arg(long, env = "PORTAL_USERNAME")]
    username: String,

    #[arg(long, env = "PORTAL_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check the stored session and print it.
    Session,
    Login(Credentials),
    Register(RegisterArgs),
    /// Log in and poll until the Discord link is confirmed.
    Verify(VerifyArgs),
    Directory(DirectoryCommand),
    Profile(ProfileCommand),
    /// Finish a password reset from the emailed link.
    ResetPassword(ResetPasswordArgs),
    Reports(ReportsCommand),
    Engagement(EngagementCommand),
    /// Interactive admin console over stdin.
    Console(Credentials),
}

#[derive(Args, Debug)]
struct VerifyArgs {
    #[command(flatten)]
    credentials: Credentials,

    /// Print whether the account is verified instead of polling.
    #[arg(long)]
    status: bool,
}

#[derive(Args, Debug)]
struct RegisterArgs {
    #[arg(long)]
    first_name: String,
    #[arg(long)]
    last_name: String,
    #[arg(long, env = "PORTAL_USERNAME")]
    username: String,
    #[arg(long)]
    email: String,
    #[arg(long, env = "PORTAL_PASSWORD", hide_env_values = true)]
    password: String,
    #[arg(long)]
    discord_username: String,
}

#[derive(Args, Debug)]
struct DirectoryCommand {
    #[command(flatten)]
    credentials: Credentials,

    #[command(subcommand)]
    command: DirectorySubcommand,
}

#[derive(Subcommand, Debug)]
enum DirectorySubcommand {
    Search {
        query: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: u32,
    },
    Recommended,
    Show {
        member_id: i64,
    },
}

#[derive(Args, Debug)]
struct ProfileCommand {
    #[command(flatten)]
    credentials: Credentials,

    #[command(subcommand)]
    command: ProfileSubcommand,
}

#[derive(Subcommand, Debug)]
enum ProfileSubcommand {
    /// Print the logged-in member's profile.
    Show,
    /// Print another member's profile.
    Member { member_id: i64 },
    /// Change fields of the logged-in member's profile.
    Update(ProfileUpdateArgs),
    /// Upload a JPEG, PNG or GIF of at most 5MB.
    Picture { path: PathBuf },
}

#[derive(Args, Debug)]
struct ProfileUpdateArgs {
    #[arg(long)]
    first_name: Option<String>,
    #[arg(long)]
    last_name: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    discord_username: Option<String>,
    #[arg(long)]
    major: Option<String>,
    /// `YYYY-MM-DD`.
    #[arg(long)]
    grad_date: Option<String>,
    #[arg(long)]
    linkedin: Option<String>,
    #[arg(long)]
    github: Option<String>,
    #[arg(long)]
    leetcode: Option<String>,
    /// Hide the social accounts set in this update from other members.
    #[arg(long)]
    private_socials: bool,
    #[arg(long)]
    resume_url: Option<String>,
    #[arg(long)]
    local: Option<String>,
    #[arg(long)]
    bio: Option<String>,
}

impl ProfileUpdateArgs {
    fn into_update(self) -> MemberUpdate {
        let is_private = self.private_socials;
        let social = |username: Option<String>| username.map(|username| SocialField { username, is_private });
        MemberUpdate {
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            discord_username: self.discord_username,
            major: self.major,
            grad_date: self.grad_date,
            linkedin: social(self.linkedin),
            github: social(self.github),
            leetcode: social(self.leetcode),
            resume_url: self.resume_url,
            local: self.local,
            bio: self.bio,
        }
    }
}

#[derive(Args, Debug)]
struct ResetPasswordArgs {
    #[arg(long)]
    uid: String,
    #[arg(long)]
    token: String,
    #[arg(long, env = "PORTAL_NEW_PASSWORD", hide_env_values = true)]
    new_password: String,
}

#[derive(Args, Debug)]
struct ReportsCommand {
    #[command(flatten)]
    credentials: Credentials,

    #[command(subcommand)]
    command: ReportsSubcommand,
}

#[derive(Subcommand, Debug)]
enum ReportsSubcommand {
    /// Report an interview, question or member.
    Create {
        /// `interview`, `question` or `member`.
        #[arg(long = "type")]
        report_type: ReportType,
        #[arg(long)]
        associated_id: String,
        #[arg(long)]
        reason: String,
    },
    /// Reports filed by the logged-in member.
    Mine,
    /// Every report (admin only).
    All,
    Show { report_id: String },
}

#[derive(Args, Debug)]
struct EngagementCommand {
    #[command(flatten)]
    credentials: Credentials,

    #[command(subcommand)]
    command: EngagementSubcommand,
}

#[derive(Subcommand, Debug)]
enum EngagementSubcommand {
    /// List attendance sessions and whether each is still open.
    Attendance,
    /// Discord message counts (admin only).
    Messages {
        /// Comma-separated member ids; empty matches all.
        #[arg(long, default_value = "")]
        members: String,
        /// Comma-separated channel ids; empty matches all.
        #[arg(long, default_value = "")]
        channels: String,
    },
    /// Coding-platform stats for a member, or for yourself.
    Stats { member_id: Option<i64> },
}

struct CliContext {
    config: PortalConfig,
    api: Arc<HttpApi>,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = PortalConfig::from_env()?;
    if let Some(base_url) = cli.base_url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        config.api.base_url = base_url.trim_end_matches('/').to_owned();
    }
    let api = Arc::new(HttpApi::new(&config.api)?);
    debug!(base_url = %config.api.base_url, "portal cli starting");
    let ctx = CliContext { config, api };

    match cli.command {
        Command::Session => run_session(&ctx).await,
        Command::Login(creds) => run_login(&ctx, &creds).await,
        Command::Register(args) => run_register(&ctx, args).await,
        Command::Verify(args) if args.status => run_verify_status(&ctx, &args.credentials).await,
        Command::Verify(args) => run_verify(&ctx, &args.credentials).await,
        Command::Directory(dir) => run_directory(&ctx, dir).await,
        Command::Profile(profile) => run_profile(&ctx, profile).await,
        Command::ResetPassword(args) => run_reset_password(&ctx, &args).await,
        Command::Reports(reports) => run_reports(&ctx, reports).await,
        Command::Engagement(engagement) => run_engagement(&ctx, engagement).await,
        Command::Console(creds) => run_console(&ctx, &creds).await,
    }
}

// =============================================================================
// SESSION
// =============================================================================

async fn run_session(ctx: &CliContext) -> Result<(), CliError> {
    let session = SessionManager::new(ctx.api.clone());
    session.start().await;
    print_json(&session_json(&session.snapshot()))
}

async fn run_login(ctx: &CliContext, creds: &Credentials) -> Result<(), CliError> {
    let session = login(ctx, creds).await?;
    print_json(&session_json(&session.snapshot()))
}

async fn run_register(ctx: &CliContext, args: RegisterArgs) -> Result<(), CliError> {
    let session = SessionManager::new(ctx.api.clone());
    let id = session
        .register(
            &args.first_name,
            &args.last_name,
            &args.username,
            &args.email,
            &args.password,
            &args.discord_username,
        )
        .await;
    let message = session.snapshot().error.unwrap_or_default();
    match id {
        Some(id) => {
            println!("{message}");
            print_json(&json!({ "id": id }))
        }
        None => Err(CliError::Rejected(message)),
    }
}

/// Log in and require an authenticated session afterwards.
async fn login(ctx: &CliContext, creds: &Credentials) -> Result<Arc<SessionManager>, CliError> {
    let session = Arc::new(SessionManager::new(ctx.api.clone()));
    session.login(&creds.username, &creds.password).await;
    let snapshot = session.snapshot();
    if !snapshot.is_authenticated {
        return Err(CliError::Rejected(snapshot.error.unwrap_or_else(|| "login failed".to_owned())));
    }
    Ok(session)
}

/// Log in and apply the route gate for `access`.
async fn login_for(ctx: &CliContext, creds: &Credentials, access: RouteAccess) -> Result<Arc<SessionManager>, CliError> {
    let session = login(ctx, creds).await?;
    match gate(&session.snapshot(), access) {
        GateDecision::Allow => Ok(session),
        GateDecision::Redirect(HOME_ROUTE) => Err(CliError::NotAdmin),
        GateDecision::Redirect(_) | GateDecision::Pending => Err(CliError::NotVerified),
    }
}

fn session_json(session: &Session) -> Value {
    json!({
        "is_authenticated": session.is_authenticated,
        "is_admin": session.is_admin(),
        "is_verified": session.is_verified(),
        "member": session.member,
        "error": session.error,
    })
}

// =============================================================================
// VERIFY
// =============================================================================

async fn run_verify(ctx: &CliContext, creds: &Credentials) -> Result<(), CliError> {
    let session = login(ctx, creds).await?;
    match auth_entry(&session.snapshot()) {
        AuthView::Home => {
            println!("already verified");
            return Ok(());
        }
        AuthView::Form => return Err(CliError::Rejected("member profile unavailable".to_owned())),
        AuthView::Verification => {}
    }

    let poller = VerificationPoller::new(Arc::new(SessionVerification::new(Arc::clone(&session))), ctx.config.verification);
    let timing = poller.timing();
    let mut poll_rx = poller.subscribe();
    println!("type /verify in the swecc server and enter {}", creds.username);
    poller.start_checking();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut reported_attempt = 0;
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                logout_during_verification(&poller, &session).await;
                println!("verification cancelled; logged out");
                return Ok(());
            }
            changed = poll_rx.changed() => {
                changed.map_err(|_| CliError::PollerStopped)?;
                let state = poll_rx.borrow_and_update().clone();
                if state.attempt_count != reported_attempt && state.attempt_count > 0 {
                    reported_attempt = state.attempt_count;
                    println!("checking ({reported_attempt}/{})", timing.max_attempts);
                }
                match state.phase {
                    PollPhase::Succeeded => break,
                    PollPhase::Failed => return Err(CliError::VerificationFailed),
                    PollPhase::Idle | PollPhase::Polling => {}
                }
            }
        }
    }

    println!("verified");
    let mut session_rx = session.subscribe();
    let settled = tokio::time::timeout(timing.success_delay + REFRESH_SETTLE, session_rx.wait_for(Session::is_verified)).await;
    if !matches!(settled, Ok(Ok(_))) {
        return Err(CliError::RefreshTimedOut);
    }
    print_json(&session_json(&session.snapshot()))
}

/// One-shot check; a failed profile fetch reads as unverified.
async fn run_verify_status(ctx: &CliContext, creds: &Credentials) -> Result<(), CliError> {
    login(ctx, creds).await?;
    let verified = ctx.api.is_current_member_verified().await;
    print_json(&json!({ "is_verified": verified }))
}

// =============================================================================
// DIRECTORY
// =============================================================================

async fn run_directory(ctx: &CliContext, dir: DirectoryCommand) -> Result<(), CliError> {
    login_for(ctx, &dir.credentials, RouteAccess::Member).await?;
    let directory = Directory::new(ctx.api.clone(), ctx.config.directory_cache_ttl);

    match dir.command {
        DirectorySubcommand::Search { query, page, page_size } => {
            let results = directory.search_members(&query, page, page_size, true).await?;
            print_json(&serde_json::to_value(results)?)
        }
        DirectorySubcommand::Recommended => {
            let members = directory.recommended_members(true).await?;
            print_json(&serde_json::to_value(members)?)
        }
        DirectorySubcommand::Show { member_id } => {
            let member = directory.member_by_id(member_id, false).await?;
            print_json(&serde_json::to_value(member)?)
        }
    }
}

// =============================================================================
// PROFILE
// =============================================================================

async fn run_profile(ctx: &CliContext, profile: ProfileCommand) -> Result<(), CliError> {
    let session = login(ctx, &profile.credentials).await?;

    match profile.command {
        ProfileSubcommand::Show => {
            let member = current_member(&session)?;
            print_json(&member_json(&member))
        }
        ProfileSubcommand::Member { member_id } => {
            let member = ctx.api.member_profile(member_id).await?;
            print_json(&member_json(&member))
        }
        ProfileSubcommand::Update(args) => {
            let member = ctx.api.update_profile(&args.into_update()).await?;
            session.refresh().await;
            print_json(&member_json(&member))
        }
        ProfileSubcommand::Picture { path } => {
            let file_name = path
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| CliError::Rejected(format!("{} is not a file", path.display())))?
                .to_owned();
            let bytes = tokio::fs::read(&path).await?;
            let upload = ctx.api.upload_profile_picture(&file_name, bytes).await?;
            session.refresh().await;
            print_json(&serde_json::to_value(upload)?)
        }
    }
}

async fn run_reset_password(ctx: &CliContext, args: &ResetPasswordArgs) -> Result<(), CliError> {
    ctx.api.reset_password(&args.uid, &args.token, &args.new_password).await?;
    println!("password updated; log in with the new password");
    Ok(())
}

fn current_member(session: &SessionManager) -> Result<Member, CliError> {
    session
        .snapshot()
        .member
        .ok_or_else(|| CliError::Rejected("member profile unavailable".to_owned()))
}

fn member_json(member: &Member) -> Value {
    json!({ "display_name": member.display_name(), "member": member })
}

// =============================================================================
// REPORTS
// =============================================================================

async fn run_reports(ctx: &CliContext, reports: ReportsCommand) -> Result<(), CliError> {
    let access = match reports.command {
        ReportsSubcommand::All => RouteAccess::Admin,
        _ => RouteAccess::Member,
    };
    let session = login_for(ctx, &reports.credentials, access).await?;

    match reports.command {
        ReportsSubcommand::Create { report_type, associated_id, reason } => {
            let body = ReportBody {
                associated_id,
                reporter_user_id: Some(current_member(&session)?.id),
                report_type,
                reason,
            };
            let report = ctx.api.create_report(&body).await?;
            print_json(&serde_json::to_value(report)?)
        }
        ReportsSubcommand::Mine => {
            let reports = ctx.api.member_reports(current_member(&session)?.id).await?;
            print_json(&serde_json::to_value(reports)?)
        }
        ReportsSubcommand::All => print_json(&serde_json::to_value(ctx.api.all_reports().await?)?),
        ReportsSubcommand::Show { report_id } => {
            print_json(&serde_json::to_value(ctx.api.report_detail(&report_id).await?)?)
        }
    }
}

// =============================================================================
// ENGAGEMENT
// =============================================================================

async fn run_engagement(ctx: &CliContext, engagement: EngagementCommand) -> Result<(), CliError> {
    let access = match engagement.command {
        EngagementSubcommand::Messages { .. } => RouteAccess::Admin,
        _ => RouteAccess::Member,
    };
    login_for(ctx, &engagement.credentials, access).await?;

    match engagement.command {
        EngagementSubcommand::Attendance => {
            let sessions = ctx.api.attendance_sessions().await?;
            let rows: Vec<Value> = sessions
                .iter()
                .map(|session| json!({ "active": session.is_active(), "session": session }))
                .collect();
            print_json(&Value::Array(rows))
        }
        EngagementSubcommand::Messages { members, channels } => {
            let stats = ctx
                .api
                .message_stats(&parse_member_ids(&members), &parse_channel_ids(&channels))
                .await?;
            print_json(&serde_json::to_value(stats)?)
        }
        EngagementSubcommand::Stats { member_id } => {
            print_json(&serde_json::to_value(ctx.api.user_stats(member_id).await?)?)
        }
    }
}

// =============================================================================
// CONSOLE
// =============================================================================

async fn run_console(ctx: &CliContext, creds: &Credentials) -> Result<(), CliError> {
    login_for(ctx, creds, RouteAccess::Admin).await?;
    let mut console = AdminConsole::new(ctx.api.clone());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut printed = 0;

    eprintln!("admin console ready; `help` lists commands, ctrl-d exits");
    while let Some(line) = lines.next_line().await? {
        console.execute(&line).await;
        for event in &console.events()[printed..] {
            match event.stream {
                ConsoleStream::Input => {}
                ConsoleStream::Output => println!("{}", event.content),
                ConsoleStream::Error => eprintln!("[{}] {}: {}", event.timestamp, event.stream.as_str(), event.content),
            }
        }
        printed = console.events().len();
    }
    Ok(())
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
