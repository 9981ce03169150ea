use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::broadcast;

use droidpilot_lib::agent_engine::{
    load_trajectory, AgentEngine, LinePrompter, NoPrompter, TaskEvent, TaskResult, UserPrompter,
};
use droidpilot_lib::config::{self, AppConfig};
use droidpilot_lib::device::{adb, AdbTransport};
use droidpilot_lib::errors::{PilotError, PilotResult};
use droidpilot_lib::llm::providers::OpenAiCompatibleClient;

#[derive(Parser, Debug)]
#[clap(
    name = "droidpilot",
    version,
    about = "Drive an Android device with a vision-language model."
)]
struct Cli {
    /// Path to config.toml.
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging.
    #[clap(long, global = true)]
    debug: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a task on the device.
    Run(RunOpts),
    /// List attached devices.
    Devices,
    /// Create or print the configuration.
    Config {
        #[clap(subcommand)]
        action: ConfigCommand,
    },
    /// Summarize a saved trajectory.
    Inspect {
        path: PathBuf,
        /// Print every step.
        #[clap(long)]
        steps: bool,
    },
}

#[derive(Parser, Debug)]
struct RunOpts {
    /// What the agent should do, in natural language.
    instruction: String,

    /// Device serial, as listed by `adb devices`.
    #[clap(long = "device-id", short = 'd')]
    device_id: Option<String>,

    /// OpenAI-compatible base URL, e.g. http://localhost:8000/v1
    #[clap(long)]
    model_url: Option<String>,

    #[clap(long)]
    model_name: Option<String>,

    #[clap(long)]
    max_steps: Option<u32>,

    /// Where trajectories are written.
    #[clap(long)]
    output_dir: Option<PathBuf>,

    /// Leave screenshots out of the trajectory.
    #[clap(long)]
    no_screenshots: bool,

    /// Never wait for the user; questions go unanswered.
    #[clap(long)]
    unattended: bool,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write a config.toml with default values.
    Init {
        #[clap(long)]
        force: bool,
    },
    /// Print the effective configuration.
    Show,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match config::load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(2);
        }
    };
    init_tracing(&config, cli.debug);

    let outcome = match cli.command {
        Command::Run(opts) => run(&mut config, opts).await,
        Command::Devices => devices(&config).await,
        Command::Config { action } => config_command(&config, cli.config.as_deref(), action),
        Command::Inspect { path, steps } => inspect(&path, steps),
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("error: {e}");
            ExitCode::from(2)
        }
    }
}

fn init_tracing(config: &AppConfig, debug: bool) {
    let fallback = if debug {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback)),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run(config: &mut AppConfig, opts: RunOpts) -> PilotResult<ExitCode> {
    if let Some(serial) = opts.device_id {
        config.device.serial = Some(serial);
    }
    if let Some(url) = opts.model_url {
        config.model.base_url = url;
    }
    if let Some(name) = opts.model_name {
        config.model.name = name;
    }
    if let Some(steps) = opts.max_steps {
        config.execution.max_steps = steps;
    }
    if let Some(dir) = opts.output_dir {
        config.logging.output_dir = dir;
    }
    if opts.no_screenshots {
        config.logging.save_screenshots = false;
    }
    config.validate()?;

    let transport = AdbTransport::connect(&config.device).await?;
    let model = OpenAiCompatibleClient::new(&config.model)?;
    let prompter: Arc<dyn UserPrompter> = if opts.unattended {
        Arc::new(NoPrompter)
    } else {
        Arc::new(LinePrompter::stdio())
    };

    let mut engine = AgentEngine::new(config.clone(), Box::new(transport), Arc::new(model), prompter);

    let cancel = engine.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, abandoning the current step");
            cancel.cancel();
        }
    });
    let printer = tokio::spawn(print_progress(engine.subscribe()));

    let result = engine.run(&opts.instruction).await;
    drop(engine);
    let _ = printer.await;

    print_summary(&result);
    Ok(if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn print_progress(mut rx: broadcast::Receiver<TaskEvent>) {
    loop {
        match rx.recv().await {
            Ok(TaskEvent::TaskStarted {
                task_id, max_steps, ..
            }) => println!("task {task_id} (budget {max_steps} steps)"),
            Ok(TaskEvent::StepRecorded {
                step,
                action,
                outcome,
                error,
            }) => {
                let action = action.unwrap_or_else(|| "-".into());
                match error {
                    Some(e) => println!("  step {step:>3}  {action:<14} {outcome:?}  ({e})"),
                    None => println!("  step {step:>3}  {action:<14} {outcome:?}"),
                }
            }
            Ok(TaskEvent::LoopBreaker { after_step, action }) => {
                println!("  repeated '{action}' three times after step {after_step}, pausing")
            }
            Ok(TaskEvent::TaskFinished { trajectory, .. }) => {
                if let Some(path) = trajectory {
                    println!("trajectory: {}", path.display());
                }
                break;
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::debug!(skipped = n, "progress printer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_summary(result: &TaskResult) {
    println!(
        "\n{}: {} after {} step(s) in {:.1}s",
        result.task_id, result.status, result.total_steps, result.duration_seconds
    );
    if let Some(msg) = &result.final_message {
        println!("  {msg}");
    }
    if let Some(err) = &result.error {
        println!("  error: {err}");
    }
}

async fn devices(config: &AppConfig) -> PilotResult<ExitCode> {
    let timeout = Duration::from_secs(config.device.command_timeout_secs);
    let devices = adb::list_devices(&config.device.adb_path, timeout).await?;
    if devices.is_empty() {
        println!("no devices attached");
        return Ok(ExitCode::FAILURE);
    }
    for d in devices {
        println!(
            "{:<24} {:<12} {:<20} Android {}",
            d.serial, d.state, d.model, d.android_version
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn config_command(
    config: &AppConfig,
    explicit: Option<&Path>,
    action: ConfigCommand,
) -> PilotResult<ExitCode> {
    match action {
        ConfigCommand::Init { force } => {
            let path = match explicit {
                Some(p) => p.to_path_buf(),
                None => config::user_config_path().ok_or_else(|| {
                    PilotError::Config("cannot determine the user config directory".into())
                })?,
            };
            if path.exists() && !force {
                return Err(PilotError::Config(format!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                )));
            }
            config::save_config(&AppConfig::default(), &path)?;
            println!("wrote {}", path.display());
        }
        ConfigCommand::Show => {
            let mut shown = config.clone();
            if shown.model.api_key.is_some() {
                shown.model.api_key = Some("<redacted>".into());
            }
            print!("{}", toml::to_string_pretty(&shown)?);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn inspect(path: &Path, steps: bool) -> PilotResult<ExitCode> {
    let result = load_trajectory(path)?;
    println!("task:        {}", result.task_id);
    println!("instruction: {}", result.instruction);
    print_summary(&result);
    if steps {
        for s in &result.trajectory {
            let action = s
                .action
                .as_ref()
                .map(|a| a.to_value().to_string())
                .unwrap_or_else(|| "-".into());
            println!(
                "  #{:<3} {:?} {:>6}ms {}",
                s.step_number, s.outcome, s.execution_time_ms, action
            );
            if let Some(thinking) = &s.reasoning {
                println!("        {}", thinking.replace('\n', " "));
            }
            if let Some(err) = &s.error {
                println!("        error: {err}");
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}
