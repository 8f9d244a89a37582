use crate::common::{RelayIndex, Task};
use anyhow::{anyhow, bail};
use log::{info, warn};
use std::io::BufRead;
use tokio::sync::mpsc::UnboundedSender;

pub const HELP: &str = "commands:
  status                                  show readings and relays
  toggle <relay>                          flip a relay
  on <relay> | off <relay>                switch a relay
  run <relay> <hours> <minutes>           switch a relay on for a while
  routine <relay> <hour> <minute> <min>   set the daily routine of a relay
  help                                    this text
  quit                                    leave the dashboard
relays are numbered from 1";

#[derive(Debug, PartialEq)]
pub enum Command {
    Status,
    Toggle(RelayIndex),
    Switch(RelayIndex, bool),
    Run {
        relay: RelayIndex,
        hours: String,
        minutes: String,
    },
    Routine {
        relay: RelayIndex,
        hour: String,
        minute: String,
        duration_min: String,
    },
    Help,
    Quit,
    Invalid(String),
}

fn expect_args(name: &str, args: &[&str], count: usize) -> anyhow::Result<()> {
    if args.len() != count {
        bail!("{} takes {} argument(s), got {}.", name, count, args.len());
    }
    Ok(())
}

/// `None` for a blank line. Numeric form fields stay as typed.
pub fn parse_command(line: &str) -> Option<anyhow::Result<Command>> {
    let mut words = line.split_whitespace();
    let name = words.next()?;
    let args: Vec<&str> = words.collect();

    let command = || -> anyhow::Result<Command> {
        match name.to_lowercase().as_str() {
            "status" => {
                expect_args(name, &args, 0)?;
                Ok(Command::Status)
            }
            "toggle" => {
                expect_args(name, &args, 1)?;
                Ok(Command::Toggle(args[0].parse()?))
            }
            "on" | "off" => {
                expect_args(name, &args, 1)?;
                Ok(Command::Switch(args[0].parse()?, name.eq_ignore_ascii_case("on")))
            }
            "run" => {
                expect_args(name, &args, 3)?;
                Ok(Command::Run {
                    relay: args[0].parse()?,
                    hours: args[1].to_string(),
                    minutes: args[2].to_string(),
                })
            }
            "routine" => {
                expect_args(name, &args, 4)?;
                Ok(Command::Routine {
                    relay: args[0].parse()?,
                    hour: args[1].to_string(),
                    minute: args[2].to_string(),
                    duration_min: args[3].to_string(),
                })
            }
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            _ => Err(anyhow!("unknown command {}.", name)),
        }
    };

    Some(command())
}

/// `false` once the dashboard is gone.
fn send_command(sender: &UnboundedSender<Task>, command: Command) -> bool {
    if let Err(e) = sender.send(Task::Command(command)) {
        warn!("send to dashboard failed ({:?})", e);
        return false;
    }
    true
}

/// Forwards operator lines to the dashboard; end of input quits. Blocks,
/// so it gets a thread of its own rather than a runtime task.
pub fn read_commands<R: BufRead>(input: R, sender: UnboundedSender<Task>) {
    let mut lines = input.lines();

    loop {
        let command = match lines.next() {
            Some(Ok(line)) => match parse_command(&line) {
                Some(Ok(command)) => command,
                Some(Err(e)) => Command::Invalid(e.to_string()),
                None => continue,
            },
            None => {
                info!("console input closed");
                Command::Quit
            }
            Some(Err(e)) => {
                warn!("console read failed ({:?})", e);
                Command::Quit
            }
        };

        let quit = command == Command::Quit;
        if !send_command(&sender, command) || quit {
            break;
        }
    }
}

pub async fn quit_on_ctrl_c(sender: UnboundedSender<Task>) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("interrupted");
            send_command(&sender, Command::Quit);
        }
        Err(e) => warn!("listen for ctrl-c failed ({:?})", e),
    }
}
