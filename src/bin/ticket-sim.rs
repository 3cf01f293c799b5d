use std::io;

use ticket_sim::config::{self, Command, FormatArg, ParameterArgs, Settings};
use ticket_sim::console;
use ticket_sim::error::{Error, Operation, Result};
use ticket_sim::form::ParameterForm;
use ticket_sim::output::{Formatter, HumanFormatter, JsonFormatter};
use ticket_sim::service::{HttpSimulationService, SimulationService};
use ticket_sim::session::{PushEvent, SessionClient};
use ticket_sim::state::SessionStatus;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        match err {
            Error::Failed { .. } => eprintln!("{}", err),
            _ => eprintln!("Error: {}", err),
        }
        std::process::exit(1);
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();
}

async fn run() -> Result<()> {
    let args = config::parse_args()?;
    let formatter = formatter_for(&args.format);

    match &args.command {
        Command::Start {
            parameters,
            watch,
            keep_running,
            stop_when_sold_out,
        } => {
            let settings =
                config::build_settings(&args, *keep_running || *stop_when_sold_out)?;
            let service = HttpSimulationService::new(settings.client.clone())?;
            let mut form = form_from(&settings, parameters)?;
            let submitted = form.submit(&service).await?;
            println!("Simulation started");

            if *watch {
                let mut session = SessionClient::new(service, settings.parameters)
                    .with_push_rule(settings.push_rule);
                session.start(submitted);
                follow(&mut session, formatter.as_ref(), *stop_when_sold_out).await?;
            }
        }
        Command::Stop => {
            let settings = config::build_settings(&args, false)?;
            let service = HttpSimulationService::new(settings.client)?;
            let details = service
                .stop()
                .await
                .map_err(|err| Error::failed(Operation::Stop, err))?;
            print!("{}", formatter.details(&details));
        }
        Command::Fetch => {
            let settings = config::build_settings(&args, false)?;
            let service = HttpSimulationService::new(settings.client)?;
            let details = service
                .fetch_details()
                .await
                .map_err(|err| Error::failed(Operation::Fetch, err))?;
            print!("{}", formatter.details(&details));
        }
        Command::Watch { keep_running } => {
            let settings = config::build_settings(&args, *keep_running)?;
            let service = HttpSimulationService::new(settings.client)?;
            let mut session =
                SessionClient::new(service, settings.parameters).with_push_rule(settings.push_rule);
            session.attach();
            follow(&mut session, formatter.as_ref(), false).await?;
        }
        Command::Console {
            parameters,
            keep_running,
        } => {
            let settings = config::build_settings(&args, *keep_running)?;
            let service = HttpSimulationService::new(settings.client.clone())?;
            let mut form = form_from(&settings, parameters)?;
            let mut session =
                SessionClient::new(service, *form.draft()).with_push_rule(settings.push_rule);
            let input = tokio::io::BufReader::new(tokio::io::stdin());
            let mut out = io::stdout();
            console::run_console(&mut session, &mut form, input, &mut out, formatter.as_ref())
                .await?;
        }
        Command::ShowConfig { parameters } => {
            let settings = config::build_settings(&args, false)?;
            let form = form_from(&settings, parameters)?;
            print!(
                "{}",
                formatter.parameters(form.draft(), Some(&settings.client.base_url))
            );
        }
    }

    Ok(())
}

fn form_from(settings: &Settings, parameters: &ParameterArgs) -> Result<ParameterForm> {
    let mut form = ParameterForm::new(settings.parameters);
    for (field, value) in parameters.edits() {
        form.edit(field, value)?;
    }
    Ok(form)
}

async fn follow<S: SimulationService>(
    session: &mut SessionClient<S>,
    formatter: &dyn Formatter,
    stop_when_sold_out: bool,
) -> Result<()> {
    if session.channel_id().is_none() {
        println!("No live updates: totalTickets is 0");
        return Ok(());
    }

    loop {
        tokio::select! {
            event = session.next_push() => match event {
                PushEvent::Merged => {
                    if let Some(details) = session.details() {
                        print!("{}", formatter.details(details));
                    }
                    if stop_when_sold_out && sold_out(session) {
                        break;
                    }
                }
                PushEvent::ChannelFailed(message) => return Err(Error::PushChannel(message)),
                PushEvent::ChannelClosed => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    session.close();
    if stop_when_sold_out && sold_out(session) && session.status() == SessionStatus::Running {
        session.stop().await?;
        println!("Simulation stopped");
        print!("{}", formatter.session(&session.view()));
    }
    Ok(())
}

fn sold_out<S: SimulationService>(session: &SessionClient<S>) -> bool {
    session
        .details()
        .and_then(|details| details.tickets_remaining)
        .is_some_and(|remaining| remaining <= 0)
}

fn formatter_for(format: &FormatArg) -> Box<dyn Formatter> {
    match format {
        FormatArg::Human => Box::new(HumanFormatter),
        FormatArg::Json => Box::new(JsonFormatter),
    }
}
