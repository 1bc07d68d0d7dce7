//! tracetime - command-line client for tracetimed

mod render;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracetime_api::{Command, ConnectionSettings, ResponsePayload};
use tracetime_ipc::{IpcClient, IpcError};
use tracetime_util::{
    socket_path_without_env, GroupId, IssueId, ProjectId, SessionId, TRACETIME_SOCKET_ENV,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tracetime")]
#[command(about = "Control the tracetimed session timer", long_about = None)]
struct Args {
    /// Socket path for daemon connection
    #[arg(short, long, env = TRACETIME_SOCKET_ENV, default_value_os_t = socket_path_without_env())]
    socket: PathBuf,

    /// Print raw JSON payloads instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Log level
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Start timing an issue
    Start {
        #[arg(long)]
        group: i64,
        #[arg(long)]
        project: i64,
        #[arg(long)]
        issue: i64,
        /// Time-type label, e.g. `dev`
        #[arg(long)]
        label: String,
    },
    Pause {
        session: i64,
    },
    Resume {
        session: i64,
    },
    /// Finish a session
    Stop {
        session: i64,
    },
    /// Elapsed time of a session
    Time {
        session: i64,
    },
    /// Show the session left open by a previous run
    ResumeLast,
    /// Service state and the open session
    Status,
    History {
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },
    Health,
    /// Tracker connection settings
    #[command(subcommand)]
    Config(ConfigCmd),
    /// Check a tracker URL and token without saving them
    TestGitlab {
        #[arg(long)]
        url: String,
        #[arg(long)]
        token: String,
    },
    Groups,
    Projects {
        group: i64,
    },
    Issues {
        project: i64,
    },
    /// Print service events until interrupted
    Watch,
    Ping,
}

#[derive(Subcommand, Debug)]
enum ConfigCmd {
    Show,
    /// Save connection settings; the user is resolved from the token
    Save {
        #[arg(long)]
        url: String,
        #[arg(long)]
        token: String,
        /// Comma-separated time-type labels
        #[arg(long, value_delimiter = ',')]
        labels: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(IpcError::Remote { code, message }) = e.downcast_ref::<IpcError>() {
                eprintln!("error ({}): {}", render::error_code_name(*code), message);
            } else {
                eprintln!("error: {:#}", e);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    debug!(socket = %args.socket.display(), "Connecting to daemon");

    let mut client = IpcClient::connect(&args.socket)
        .await
        .with_context(|| format!("Failed to connect to tracetimed at {:?}", args.socket))?;

    let command = match args.command {
        Cmd::Watch => return watch(client, args.json).await,
        Cmd::Config(ConfigCmd::Save { url, token, labels }) => {
            let user = match client
                .request(Command::TestGitlab {
                    url: url.clone(),
                    token: token.clone(),
                })
                .await?
            {
                ResponsePayload::TrackerUser(user) => user,
                other => anyhow::bail!("Unexpected response: {:?}", other),
            };
            Command::SaveConfig {
                settings: ConnectionSettings {
                    url,
                    token,
                    labels,
                    username: user.username,
                    user_id: user.id,
                },
            }
        }
        other => to_command(other),
    };

    let payload = client.request(command).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("{}", render::payload(&payload));
    }
    Ok(())
}

fn to_command(cmd: Cmd) -> Command {
    match cmd {
        Cmd::Start {
            group,
            project,
            issue,
            label,
        } => Command::StartTimer {
            group_id: GroupId::new(group),
            project_id: ProjectId::new(project),
            issue_id: IssueId::new(issue),
            label,
        },
        Cmd::Pause { session } => Command::PauseTimer {
            session_id: SessionId::new(session),
        },
        Cmd::Resume { session } => Command::ResumeTimer {
            session_id: SessionId::new(session),
        },
        Cmd::Stop { session } => Command::StopTimer {
            session_id: SessionId::new(session),
        },
        Cmd::Time { session } => Command::GetSessionTime {
            session_id: SessionId::new(session),
        },
        Cmd::ResumeLast => Command::ResumeLastSession,
        Cmd::Status => Command::GetState,
        Cmd::History { limit } => Command::GetHistory { limit },
        Cmd::Health => Command::GetHealth,
        Cmd::Config(ConfigCmd::Show) => Command::LoadConfig,
        // Save needs a tracker round trip first and is built in `run`
        Cmd::Config(ConfigCmd::Save { .. }) | Cmd::Watch | Cmd::Ping => Command::Ping,
        Cmd::TestGitlab { url, token } => Command::TestGitlab { url, token },
        Cmd::Groups => Command::GitlabGroups,
        Cmd::Projects { group } => Command::GitlabProjects {
            group_id: GroupId::new(group),
        },
        Cmd::Issues { project } => Command::GitlabIssues {
            project_id: ProjectId::new(project),
        },
    }
}

async fn watch(client: IpcClient, json: bool) -> Result<()> {
    let mut events = client.subscribe().await?;
    loop {
        let event = match events.next().await {
            Ok(event) => event,
            Err(IpcError::ConnectionClosed) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if json {
            println!("{}", serde_json::to_string(&event)?);
        } else {
            println!(
                "{} {}",
                event.timestamp.format("%H:%M:%S"),
                render::event(&event.payload)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_start() {
        let args = Args::try_parse_from([
            "tracetime", "start", "--group", "1", "--project", "2", "--issue", "3", "--label",
            "dev",
        ])
        .unwrap();
        match to_command(args.command) {
            Command::StartTimer {
                issue_id, label, ..
            } => {
                assert_eq!(issue_id, IssueId::new(3));
                assert_eq!(label, "dev");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn splits_labels() {
        let args = Args::try_parse_from([
            "tracetime",
            "config",
            "save",
            "--url",
            "https://gitlab.example.com",
            "--token",
            "t",
            "--labels",
            "dev,review",
        ])
        .unwrap();
        match args.command {
            Cmd::Config(ConfigCmd::Save { labels, .. }) => assert_eq!(labels, ["dev", "review"]),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn history_default_limit() {
        let args = Args::try_parse_from(["tracetime", "--json", "history"]).unwrap();
        assert!(args.json);
        assert!(matches!(
            to_command(args.command),
            Command::GetHistory { limit: 20 }
        ));
    }
}
