use std::str::FromStr;

use serde::Serialize;
use tokio::sync::watch;

use crate::{models::HostState, wallet::ClaimKind};

use super::SessionController;

/// One line of input to the interactive driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Duration(u64),
    Stake(f64),
    Start,
    Cancel,
    Host(HostState),
    Resume,
    Decline,
    Claim(ClaimKind),
    Acknowledge,
    Dismiss,
    Revalidate,
    Status,
    Balance,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  duration <secs>          pick a session length
  stake <amount>           set the stake
  start                    commit the stake and start the countdown
  cancel                   back out before starting
  host <active|background|inactive>
  resume | decline         answer the resume prompt
  claim <token|tree>       collect a completed session
  ack                      acknowledge a forfeited session
  dismiss                  dismiss the current notice
  check                    re-check the grace deadline now
  status | balance | help | quit";

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let name = parts
            .next()
            .ok_or_else(|| "empty command".to_string())?
            .to_ascii_lowercase();
        let arg = parts.next();

        let required = |what: &str| arg.ok_or_else(|| format!("{name} needs {what}"));

        let command = match name.as_str() {
            "duration" => Command::Duration(
                required("a number of seconds")?
                    .parse()
                    .map_err(|_| "duration must be a whole number of seconds".to_string())?,
            ),
            "stake" => Command::Stake(
                required("an amount")?
                    .parse()
                    .map_err(|_| "stake must be a number".to_string())?,
            ),
            "start" => Command::Start,
            "cancel" => Command::Cancel,
            "host" => Command::Host(required("a state")?.parse()?),
            "background" | "foreground" => Command::Host(name.parse()?),
            "resume" => Command::Resume,
            "decline" => Command::Decline,
            "claim" => Command::Claim(required("token or tree")?.parse()?),
            "ack" | "acknowledge" => Command::Acknowledge,
            "dismiss" => Command::Dismiss,
            "check" => Command::Revalidate,
            "status" => Command::Status,
            "balance" => Command::Balance,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(format!("unknown command '{other}' (try 'help')")),
        };
        Ok(command)
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| e.to_string())
}

/// Runs one command and renders its result for the terminal.
pub async fn execute(
    controller: &SessionController,
    host: &watch::Sender<HostState>,
    command: Command,
) -> Result<String, String> {
    match command {
        Command::Duration(secs) => to_json(
            &controller
                .select_duration(secs)
                .await
                .map_err(|e| e.to_string())?,
        ),
        Command::Stake(amount) => to_json(
            &controller
                .set_stake(amount)
                .await
                .map_err(|e| e.to_string())?,
        ),
        Command::Start => to_json(&controller.start_session().await.map_err(|e| e.to_string())?),
        Command::Cancel => to_json(
            &controller
                .cancel_configuration()
                .await
                .map_err(|e| e.to_string())?,
        ),
        Command::Host(state) => {
            // The subscription applies it; the event stream shows the effect.
            host.send_replace(state);
            Ok(format!("host -> {state}"))
        }
        Command::Resume => to_json(&controller.resume().await.map_err(|e| e.to_string())?),
        Command::Decline => to_json(&controller.decline_resume().await.map_err(|e| e.to_string())?),
        Command::Claim(kind) => {
            let tx = controller.claim(kind).await.map_err(|e| e.to_string())?;
            Ok(format!("claimed ({tx})"))
        }
        Command::Acknowledge => to_json(
            &controller
                .acknowledge_forfeit()
                .await
                .map_err(|e| e.to_string())?,
        ),
        Command::Dismiss => to_json(&controller.dismiss_notice().await.map_err(|e| e.to_string())?),
        Command::Revalidate => to_json(&controller.revalidate().await.map_err(|e| e.to_string())?),
        Command::Status => to_json(&controller.snapshot().await),
        Command::Balance => {
            let balance = controller.refresh_balance().await.map_err(|e| e.to_string())?;
            Ok(format!("balance of {}: {}", controller.address(), balance))
        }
        Command::Help => Ok(HELP.to_string()),
        Command::Quit => Ok("bye".to_string()),
    }
}
