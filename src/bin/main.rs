use std::{
    error::Error,
    process::ExitCode,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use subman::{
    Supervisor, SupervisorConfig,
    cli::{Cli, Commands, parse_args},
    config::{load_config, parse_duration},
};

fn main() -> Result<ExitCode, Box<dyn Error>> {
    let args = parse_args();
    init_logging(&args);

    let interrupted = register_signal_handler()?;

    match args.command {
        Commands::Run {
            completion,
            poll_interval,
            command,
        } => {
            let mut config = SupervisorConfig::default();
            if let Some(raw) = poll_interval {
                config.poll_interval = parse_duration(&raw)?;
            }

            let supervisor = Supervisor::new(config);
            let (program, rest) = command
                .split_first()
                .ok_or("no command specified to run")?;

            if let Err(err) = supervisor.start(program, rest, completion.as_deref()) {
                error!("{err}");
                return Ok(ExitCode::FAILURE);
            }

            wait_until_idle(&supervisor, &interrupted);
        }
        Commands::Up { config } => {
            let config = load_config(Some(config.as_str()))?;
            let supervisor = Supervisor::new(config.supervisor_config()?);

            let mut started = 0;
            for (name, process) in &config.processes {
                match supervisor
                    .start_command_line(&process.command, process.completion.as_deref())
                {
                    Ok(handle) => {
                        info!("Started '{name}' (pid: {})", handle.pid);
                        started += 1;
                    }
                    Err(err) => error!("Failed to start '{name}': {err}"),
                }
            }

            if started == 0 && !config.processes.is_empty() {
                return Ok(ExitCode::FAILURE);
            }

            wait_until_idle(&supervisor, &interrupted);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn init_logging(args: &Cli) {
    let filter = if let Some(level) = args.log_level {
        EnvFilter::default().add_directive(level.filter().into())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Blocks until the supervisor has nothing left to track, or until Ctrl-C.
/// Tracked processes are killed and reaped when `supervisor` is dropped.
fn wait_until_idle(supervisor: &Supervisor, interrupted: &AtomicBool) {
    while !interrupted.load(Ordering::SeqCst) {
        if supervisor.wait_idle(Some(Duration::from_millis(200))) {
            info!("All supervised processes have exited");
            return;
        }
    }

    warn!(
        "Interrupted; terminating {} supervised process(es)",
        supervisor.len()
    );
    supervisor.shutdown();
}

fn register_signal_handler() -> Result<Arc<AtomicBool>, Box<dyn Error>> {
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);

    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })?;

    Ok(interrupted)
}
