//! Subcommand implementations.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use herald_monitor::{
    AgentId, AgentSettings, CliAgentRunner, CycleOutcome, Dispatcher, InstanceLock,
    LOCK_FILE_NAME, MessageBus, MonitorError, MonitorOptions, Persona, SlackBus, StopReason,
};
use herald_ratelimits::format_backoff_status;
use herald_slack::{SlackClient, SlackConfig, markdown_to_mrkdwn};
use tokio::signal;
use tracing::{info, warn};

use crate::cli::{AgentsArgs, Cli, Commands, MonitorArgs, SayArgs};

/// Run the selected subcommand; no subcommand means `monitor`.
pub async fn dispatch_command(cli: Cli) -> Result<()> {
    match cli.command {
        Some(Commands::Monitor(args)) => run_monitor(args).await,
        Some(Commands::Say(args)) => run_say(args).await,
        Some(Commands::Agents(args)) => run_agents(args),
        None => run_monitor(cli.monitor).await,
    }
}

fn settings_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(AgentSettings::default_path)
}

/// Resolve the agent or fail with remediation steps.
fn require_agent(
    settings: &AgentSettings,
    explicit: Option<&str>,
    settings_file: &Path,
) -> Result<AgentId> {
    match settings.resolve_agent(explicit)? {
        Some(agent) => Ok(agent),
        None => bail!(
            "No agent configured.\n  Available agents: {}\n  Pass --agent <id>, or set \"default_agent\" in {}",
            AgentId::valid_ids(),
            settings_file.display()
        ),
    }
}

fn require_channel(
    settings: &AgentSettings,
    explicit: Option<&str>,
    settings_file: &Path,
) -> Result<String> {
    match settings.resolve_channel(explicit) {
        Some(channel) => Ok(channel),
        None => bail!(
            "No channel configured.\n  Pass --channel <id>, or set \"default_channel_id\" in {}",
            settings_file.display()
        ),
    }
}

fn slack_bus(token_file: Option<&Path>, settings: &AgentSettings, agent: AgentId) -> Result<SlackBus> {
    let config = SlackConfig::load(token_file).context("Slack credentials are not configured")?;
    let client = SlackClient::new(config)?;
    let profile = agent.profile();

    Ok(SlackBus::new(client).with_persona(Persona {
        username: profile.name.to_string(),
        icon_url: settings.avatar_url(agent),
        icon_emoji: Some(profile.icon_emoji.to_string()),
    }))
}

/// Split `"claude -p"` into the executable and its leading arguments.
pub fn split_agent_command(command: &str) -> Option<(String, Vec<String>)> {
    let mut parts = command.split_whitespace().map(str::to_string);
    let program = parts.next()?;
    Some((program, parts.collect()))
}

/// Build dispatcher options from arguments over the defaults.
pub fn monitor_options(args: &MonitorArgs, workdir: PathBuf) -> Result<MonitorOptions> {
    let mut options = MonitorOptions {
        state_dir: args.state_dir.clone().unwrap_or_else(|| workdir.clone()),
        workdir,
        ..Default::default()
    };

    if let Some(secs) = args.interval {
        options.poll_interval = Duration::from_secs(secs);
    }
    if let Some(secs) = args.max_runtime {
        options.max_runtime = (secs > 0).then(|| Duration::from_secs(secs));
    }
    if let Some(command) = &args.agent_command {
        let Some((program, leading)) = split_agent_command(command) else {
            bail!("--agent-command is empty");
        };
        options.agent_command = program;
        options.agent_args = leading;
    }

    options.validate()?;
    Ok(options)
}

async fn run_monitor(args: MonitorArgs) -> Result<()> {
    let workdir = std::env::current_dir().context("Cannot determine the working directory")?;
    let options = monitor_options(&args, workdir)?;

    let mut lock = match InstanceLock::acquire(options.state_dir.join(LOCK_FILE_NAME)) {
        Ok(lock) => lock,
        Err(MonitorError::AlreadyRunning {
            pid,
            agent,
            started_at,
            lock_path,
        }) => bail!(
            "Another monitor is already running.\n  PID: {}\n  Agent: {}\n  Started: {}\n  Lock file: {}\n  Stop it first, or remove the lock file if that process is gone.",
            pid,
            agent.as_deref().unwrap_or("unknown"),
            started_at.to_rfc3339(),
            lock_path.display()
        ),
        Err(e) => return Err(e.into()),
    };

    let settings_file = settings_path(args.settings.as_deref());
    let settings = AgentSettings::load(&settings_file);
    let agent = require_agent(&settings, args.agent.as_deref(), &settings_file)?;
    let profile = agent.profile();
    lock.set_agent(profile.name)?;

    let channel = require_channel(&settings, args.channel.as_deref(), &settings_file)?;
    let bus = slack_bus(args.token_file.as_deref(), &settings, agent)?;
    verify_token(&bus).await?;

    print_banner(&options, profile.name, profile.role, profile.emoji, profile.mentions, &channel);

    let runner = CliAgentRunner::new(
        options.agent_command.clone(),
        options.agent_args.clone(),
        options.workdir.clone(),
    );
    let mut dispatcher = Dispatcher::new(profile, channel, options, bus, runner);

    if args.once {
        let Some(report) = dispatcher.run_once(shutdown_signal()).await? else {
            eprintln!("{} {} monitor stopped: interrupted", profile.emoji, profile.name);
            return Ok(());
        };
        if let CycleOutcome::RateLimited { .. } | CycleOutcome::BackingOff { .. } = report.outcome {
            warn!(status = %format_backoff_status(dispatcher.rate_limits()), "Cycle skipped");
        }
        eprintln!(
            "{} {} new message(s), {} mention(s), {} thread reply(ies)",
            profile.emoji, report.new_messages, report.mentions, report.thread_replies
        );
        return Ok(());
    }

    let summary = dispatcher.run(shutdown_signal()).await?;
    let reason = match summary.stop {
        StopReason::Interrupted => "interrupted",
        StopReason::MaxRuntime => "max runtime reached",
    };
    info!(
        cycles = summary.cycles,
        dispatches = summary.dispatches,
        items = summary.items_dispatched,
        "Monitor stopped ({})",
        reason
    );
    eprintln!("{} {} monitor stopped: {}", profile.emoji, profile.name, reason);
    drop(lock);
    Ok(())
}

async fn verify_token(bus: &SlackBus) -> Result<()> {
    match bus.verify().await {
        Ok(identity) => {
            info!(
                user = identity.user.as_deref().unwrap_or("unknown"),
                team = identity.team.as_deref().unwrap_or("unknown"),
                "Slack token verified"
            );
            Ok(())
        }
        Err(e) if e.is_rate_limited() => {
            warn!("Could not verify the Slack token yet: {}", e);
            Ok(())
        }
        Err(e) => Err(anyhow::Error::new(e).context("Slack rejected the configured token")),
    }
}

fn print_banner(
    options: &MonitorOptions,
    name: &str,
    role: &str,
    emoji: &str,
    mentions: &[&str],
    channel: &str,
) {
    let runtime = match options.max_runtime {
        Some(limit) => format!("{}s", limit.as_secs()),
        None => "until interrupted".to_string(),
    };
    eprintln!(
        "\n╔══════════════════════════════════════════════════════════════╗\n\
         ║  {emoji} {name} Monitor - Watching for Slack mentions\n\
         ╠══════════════════════════════════════════════════════════════╣\n\
         ║  Agent: {name} ({role})\n\
         ║  Channel: {channel}\n\
         ║  Polling: Every {}s (+{}s jitter)\n\
         ║  Mentions: {}\n\
         ║  Runtime: {runtime}\n\
         ╚══════════════════════════════════════════════════════════════╝\n",
        options.poll_interval.as_secs(),
        options.poll_jitter.as_secs(),
        mentions.join(", "),
    );
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

async fn run_say(args: SayArgs) -> Result<()> {
    let settings_file = settings_path(args.settings.as_deref());
    let settings = AgentSettings::load(&settings_file);
    let agent = require_agent(&settings, args.agent.as_deref(), &settings_file)?;
    let channel = require_channel(&settings, args.channel.as_deref(), &settings_file)?;
    let bus = slack_bus(args.token_file.as_deref(), &settings, agent)?;

    let text = markdown_to_mrkdwn(&args.text.join(" "));
    if text.trim().is_empty() {
        bail!("Refusing to post an empty message");
    }

    let ts = bus
        .post_message(&channel, &text, args.thread.as_deref())
        .await
        .context("Failed to post message")?;
    println!("{}", ts);
    Ok(())
}

fn run_agents(args: AgentsArgs) -> Result<()> {
    let settings_file = settings_path(args.settings.as_deref());
    let settings = AgentSettings::load(&settings_file);
    let default = match settings.resolve_agent(None) {
        Ok(agent) => agent,
        Err(e) => {
            warn!("{}", e);
            None
        }
    };

    for id in AgentId::ALL {
        let profile = id.profile();
        let marker = if default == Some(id) { "*" } else { " " };
        println!(
            "{} {:<6} {} {:<8} {}",
            marker, id, profile.emoji, profile.name, profile.role
        );
    }
    if default.is_none() {
        println!("\nNo default agent set in {}", settings_file.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_split_agent_command() {
        assert_eq!(
            split_agent_command("claude -p"),
            Some(("claude".to_string(), vec!["-p".to_string()]))
        );
        assert_eq!(split_agent_command("   "), None);
    }

    #[test]
    fn test_monitor_options_from_args() {
        let dir = TempDir::new().unwrap();
        let args = MonitorArgs {
            interval: Some(20),
            max_runtime: Some(0),
            agent_command: Some("my-agent --batch".to_string()),
            ..Default::default()
        };
        let options = monitor_options(&args, dir.path().to_path_buf()).unwrap();
        assert_eq!(options.poll_interval, Duration::from_secs(20));
        assert_eq!(options.max_runtime, None);
        assert_eq!(options.agent_command, "my-agent");
        assert_eq!(options.agent_args, vec!["--batch".to_string()]);
        assert_eq!(options.state_dir, dir.path());
    }

    #[test]
    fn test_missing_agent_has_remediation() {
        let err = require_agent(
            &AgentSettings::default(),
            None,
            Path::new("/home/op/.agent_settings.json"),
        )
        .unwrap_err()
        .to_string();
        assert!(err.contains("nova, pixel, bolt, scout"));
        assert!(err.contains("--agent"));
    }

    #[test]
    fn test_unknown_agent_is_an_error() {
        assert!(require_agent(&AgentSettings::default(), Some("zed"), Path::new("x")).is_err());
    }
}
