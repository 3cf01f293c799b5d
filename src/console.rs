use std::io::Write;
use std::str::FromStr;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::error::{Error, Result};
use crate::form::ParameterForm;
use crate::models::Field;
use crate::output::Formatter;
use crate::service::SimulationService;
use crate::session::{PushEvent, SessionClient};

const HELP: &str = concat!(
    "Commands:\n",
    "  set <field> <value>  edit a parameter (e.g. set totalTickets 200)\n",
    "  start                submit parameters and start a run\n",
    "  stop                 stop the running simulation\n",
    "  fetch | refresh      fetch current details\n",
    "  show                 print parameters and session state\n",
    "  quit                 leave the console\n",
);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsoleCommand {
    Set(Field, String),
    Start,
    Stop,
    Fetch,
    Show,
    Help,
    Quit,
}

impl FromStr for ConsoleCommand {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let command = words.next().unwrap_or("");
        let parsed = match command {
            "set" => {
                let (Some(field), Some(value)) = (words.next(), words.next()) else {
                    return Err(Error::Cli("usage: set <field> <value>".to_string()));
                };
                let field = field.parse::<Field>().map_err(Error::Cli)?;
                ConsoleCommand::Set(field, value.to_string())
            }
            "start" => ConsoleCommand::Start,
            "stop" => ConsoleCommand::Stop,
            "fetch" | "refresh" => ConsoleCommand::Fetch,
            "show" => ConsoleCommand::Show,
            "help" | "?" => ConsoleCommand::Help,
            "quit" | "exit" => ConsoleCommand::Quit,
            other => {
                return Err(Error::Cli(format!(
                    "unknown command '{}'; type 'help'",
                    other
                )))
            }
        };
        if words.next().is_some() {
            return Err(Error::Cli(format!("unexpected arguments after '{}'", command)));
        }
        Ok(parsed)
    }
}

pub async fn run_console<S, R, W>(
    session: &mut SessionClient<S>,
    form: &mut ParameterForm,
    input: R,
    out: &mut W,
    formatter: &dyn Formatter,
) -> Result<()>
where
    S: SimulationService,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    session.attach();
    write!(out, "{}", formatter.session(&session.view()))?;
    let mut lines = input.lines();

    loop {
        tokio::select! {
            biased;
            event = session.next_push() => match event {
                PushEvent::Merged => write!(out, "{}", formatter.session(&session.view()))?,
                PushEvent::ChannelFailed(message) => writeln!(out, "Live updates stopped: {}", message)?,
                PushEvent::ChannelClosed => writeln!(out, "Live updates ended")?,
            },
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !handle_line(session, form, &line, out, formatter).await? {
                    break;
                }
            }
        }
        out.flush()?;
    }

    session.close();
    Ok(())
}

async fn handle_line<S, W>(
    session: &mut SessionClient<S>,
    form: &mut ParameterForm,
    line: &str,
    out: &mut W,
    formatter: &dyn Formatter,
) -> Result<bool>
where
    S: SimulationService,
    W: Write,
{
    if line.trim().is_empty() {
        return Ok(true);
    }
    let command = match line.parse::<ConsoleCommand>() {
        Ok(command) => command,
        Err(err) => {
            writeln!(out, "{}", err)?;
            return Ok(true);
        }
    };

    match command {
        ConsoleCommand::Set(field, value) => match form.edit(field, &value) {
            Ok(()) => writeln!(out, "{} = {}", field, form.draft().get(field))?,
            Err(err) => writeln!(out, "{}", err)?,
        },
        ConsoleCommand::Start => match form.submit(session.service()).await {
            Ok(parameters) => {
                session.start(parameters);
                writeln!(out, "Simulation started")?;
            }
            Err(err) => writeln!(out, "{}", err)?,
        },
        ConsoleCommand::Stop => match session.stop().await {
            Ok(()) => write!(out, "{}", formatter.session(&session.view()))?,
            Err(err) => writeln!(out, "{}", err)?,
        },
        ConsoleCommand::Fetch => match session.fetch().await {
            Ok(()) => write!(out, "{}", formatter.session(&session.view()))?,
            Err(err) => writeln!(out, "{}", err)?,
        },
        ConsoleCommand::Show => {
            write!(out, "{}", formatter.parameters(form.draft(), None))?;
            write!(out, "{}", formatter.session(&session.view()))?;
        }
        ConsoleCommand::Help => write!(out, "{}", HELP)?,
        ConsoleCommand::Quit => return Ok(false),
    }
    Ok(true)
}
