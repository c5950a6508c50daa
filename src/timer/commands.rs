//! Console commands the host maps onto the timer.

use anyhow::{anyhow, bail, Result};
use chrono::Utc;

use crate::{
    store::SessionStore,
    summary::{load_summary, SummaryPeriod, SummaryRange, WorkSummary},
};

use super::{format_elapsed, FinalStatus, TimerController, TimerState, Visibility};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCommand {
    Start {
        activity_label: String,
        linked_project: Option<String>,
    },
    Pause,
    Resume,
    Stop(FinalStatus),
    Status,
    Visibility(Visibility),
    Login(String),
    Logout,
    /// `offset` steps back (negative) or forward from the current period.
    Summary { period: SummaryPeriod, offset: i32 },
    Quit,
}

impl HostCommand {
    /// `start <label> [@project]`, `pause`, `resume`, `stop`, `abort`,
    /// `status`, `hide`, `show`, `login <owner>`, `logout`,
    /// `summary [week|month] [offset]`, `quit`.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "start" => {
                let (label, project) = match rest.rsplit_once(" @") {
                    Some((label, project)) if !project.trim().is_empty() => {
                        (label.trim(), Some(project.trim().to_string()))
                    }
                    _ => (rest, None),
                };
                if label.is_empty() {
                    bail!("usage: start <activity> [@project]");
                }
                HostCommand::Start {
                    activity_label: label.to_string(),
                    linked_project: project,
                }
            }
            "pause" => HostCommand::Pause,
            "resume" => HostCommand::Resume,
            "stop" => HostCommand::Stop(FinalStatus::Completed),
            "abort" => HostCommand::Stop(FinalStatus::Aborted),
            "status" | "" => HostCommand::Status,
            "hide" => HostCommand::Visibility(Visibility::Hidden),
            "show" => HostCommand::Visibility(Visibility::Visible),
            "login" => {
                if rest.is_empty() {
                    bail!("usage: login <owner>");
                }
                HostCommand::Login(rest.to_string())
            }
            "logout" => HostCommand::Logout,
            "summary" => {
                const USAGE: &str = "usage: summary [week|month] [offset]";
                let mut args = rest.split_whitespace();
                let period = match args.next() {
                    Some(raw) => SummaryPeriod::parse(raw).ok_or_else(|| anyhow!(USAGE))?,
                    None => SummaryPeriod::Week,
                };
                let offset = match args.next() {
                    Some(raw) => raw.parse::<i32>().map_err(|_| anyhow!(USAGE))?,
                    None => 0,
                };
                if args.next().is_some() {
                    bail!(USAGE);
                }
                HostCommand::Summary { period, offset }
            }
            "quit" | "exit" => HostCommand::Quit,
            other => bail!("unknown command '{other}'"),
        };
        Ok(command)
    }
}

pub fn describe_state(state: &TimerState) -> String {
    let label = state.activity_label.as_deref().unwrap_or("-");
    format!(
        "{:?} {} {}",
        state.status,
        format_elapsed(state.elapsed_ms),
        label
    )
}

pub fn describe_summary(summary: &WorkSummary) -> String {
    let mut out = format!(
        "{} .. {}: {} active, {} completed, {} aborted",
        summary.range.from.format("%Y-%m-%d"),
        summary.range.to.format("%Y-%m-%d"),
        format_elapsed(summary.total_active_ms),
        summary.completed_sessions,
        summary.aborted_sessions
    );
    for activity in &summary.by_activity {
        out.push_str(&format!(
            "\n  {:>8}  {}",
            format_elapsed(activity.active_ms),
            activity.activity_label
        ));
    }
    out
}

/// Runs one command and returns the line to print. `None` means quit.
pub async fn run_command(
    controller: &TimerController,
    store: &dyn SessionStore,
    command: HostCommand,
) -> Result<Option<String>> {
    let state = match command {
        HostCommand::Start {
            activity_label,
            linked_project,
        } => controller.start_timer(&activity_label, linked_project).await?,
        HostCommand::Pause => controller.pause_timer().await,
        HostCommand::Resume => controller.resume_timer().await,
        HostCommand::Stop(final_status) => controller.stop_timer(final_status).await,
        HostCommand::Status => controller.snapshot().await,
        HostCommand::Visibility(visibility) => controller.set_visibility(visibility).await,
        HostCommand::Login(owner) => controller.set_owner(Some(owner)).await,
        HostCommand::Logout => controller.set_owner(None).await,
        HostCommand::Summary { period, offset } => {
            let owner = controller
                .owner()
                .await
                .ok_or_else(|| anyhow!("log in to see a summary"))?;
            let day = period
                .shift(Utc::now().date_naive(), offset)
                .ok_or_else(|| anyhow!("summary offset {offset} is out of range"))?;
            let range = SummaryRange::for_period(period, day);
            let summary = load_summary(store, &owner, range).await?;
            return Ok(Some(describe_summary(&summary)));
        }
        HostCommand::Quit => return Ok(None),
    };
    Ok(Some(describe_state(&state)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_start_with_project() {
        assert_eq!(
            HostCommand::parse("start write chapter two @book").unwrap(),
            HostCommand::Start {
                activity_label: "write chapter two".into(),
                linked_project: Some("book".into()),
            }
        );
        assert_eq!(
            HostCommand::parse("  START email ").unwrap(),
            HostCommand::Start {
                activity_label: "email".into(),
                linked_project: None,
            }
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert!(HostCommand::parse("start").is_err());
        assert!(HostCommand::parse("login").is_err());
        assert!(HostCommand::parse("summary year").is_err());
        assert!(HostCommand::parse("summary week last").is_err());
        assert!(HostCommand::parse("summary week -1 extra").is_err());
        assert!(HostCommand::parse("dance").is_err());
    }

    #[test]
    fn parses_summary_offsets() {
        assert_eq!(
            HostCommand::parse("summary month -2").unwrap(),
            HostCommand::Summary {
                period: SummaryPeriod::Month,
                offset: -2
            }
        );
        assert_eq!(
            HostCommand::parse("summary week 1").unwrap(),
            HostCommand::Summary {
                period: SummaryPeriod::Week,
                offset: 1
            }
        );
    }

    #[test]
    fn parses_simple_verbs() {
        assert_eq!(
            HostCommand::parse("abort").unwrap(),
            HostCommand::Stop(FinalStatus::Aborted)
        );
        assert_eq!(
            HostCommand::parse("hide").unwrap(),
            HostCommand::Visibility(Visibility::Hidden)
        );
        assert_eq!(
            HostCommand::parse("summary").unwrap(),
            HostCommand::Summary {
                period: SummaryPeriod::Week,
                offset: 0
            }
        );
        assert_eq!(
            HostCommand::parse("login owner-9").unwrap(),
            HostCommand::Login("owner-9".into())
        );
    }
}
