use chrono::Utc;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;

use stb_harness::config::{
    Config, ENV_CONTROL, ENV_SINK_PIPELINE, ENV_SOURCE_PIPELINE, Tool, settle_duration,
};
use stb_harness::harness::report::error_chain;
use stb_harness::harness::{EXIT_FAILURE, EXIT_SESSION_INIT, EXIT_SUCCESS, ExitStatus, RunConfig, StepScript, execute};
use stb_harness::logging;
use stb_harness::record::{RecordConfig, RecordError, record};
use stb_harness::runner::RunSummary;

/// stbt - Automated testing of set-top boxes
#[derive(Parser, Debug)]
#[command(
    name = "stbt",
    version,
    about = "Run and record set-top-box test scripts",
    after_help = "ENVIRONMENT VARIABLES:\n\
        STBT_SOURCE_PIPELINE    Video source description\n\
        STBT_SINK_PIPELINE      Video sink description\n\
        STBT_CONTROL            Remote control URI\n\
        STBT_CONFIG_FILE        Extra config file, read last\n\
        RUST_LOG                Log filter (overrides -v)\n\n\
        EXIT STATUS:\n\
        0  the script passed\n\
        1  a wait_for_match or wait_for_motion timed out\n\
        2  any other failure\n\
        3  the session could not be started"
)]
struct Cli {
    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Flags that override the configured session
#[derive(Args, Debug)]
struct SessionArgs {
    /// Video source, e.g. "videotestsrc pattern=0" or "multifilesrc location=frames/"
    #[arg(long, env = ENV_SOURCE_PIPELINE)]
    source_pipeline: Option<String>,

    /// Video sink, e.g. "fakesink" or "multifilesink location=out/"
    #[arg(long, env = ENV_SINK_PIPELINE)]
    sink_pipeline: Option<String>,

    /// Remote control URI: none, test, vr:HOST[:PORT] or lirc:[SOCKET]:NAME
    #[arg(long, env = ENV_CONTROL)]
    control: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a test script
    Run {
        /// YAML script to run
        script: PathBuf,

        #[command(flatten)]
        session: SessionArgs,

        /// Directory for screenshot.png
        #[arg(long, default_value = ".")]
        artifact_dir: PathBuf,

        /// Print a JSON run summary on stdout
        #[arg(long)]
        json: bool,
    },

    /// Record a test script by pressing keys on a real remote
    Record {
        #[command(flatten)]
        session: SessionArgs,

        /// Where key presses come from: file://PATH, vr:HOST[:PORT] or lirc:[SOCKET]:NAME
        #[arg(long)]
        control_recorder: Option<String>,

        /// Script to write
        #[arg(short, long, default_value = "test.yaml")]
        output_file: PathBuf,

        /// Seconds to wait after each key press before saving the screen
        #[arg(long)]
        settle_secs: Option<f64>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let code = match cli.command {
        Commands::Run {
            script,
            session,
            artifact_dir,
            json,
        } => run(script, session, artifact_dir, json),
        Commands::Record {
            session,
            control_recorder,
            output_file,
            settle_secs,
        } => record_script(session, control_recorder, output_file, settle_secs),
    };
    ExitCode::from(code)
}

fn load_config(tool: Tool) -> Option<Config> {
    match Config::load(tool) {
        Ok(config) => Some(config),
        Err(e) => {
            eprintln!("ERROR: {}", error_chain(&e));
            None
        }
    }
}

fn run(script_path: PathBuf, args: SessionArgs, artifact_dir: PathBuf, json: bool) -> u8 {
    let Some(config) = load_config(Tool::Run) else {
        return EXIT_FAILURE;
    };
    let session = config.session_config(
        args.source_pipeline.as_deref(),
        args.sink_pipeline.as_deref(),
        args.control.as_deref(),
    );
    debug!("Session: {:?}", session);

    let script = match StepScript::load(&script_path) {
        Ok(script) => script,
        Err(e) => {
            let exit = ExitStatus::from_load_error(&script_path.display().to_string(), &e);
            if let Some(message) = &exit.message {
                eprintln!("{}", message);
            }
            return exit.code;
        }
    };

    let started_at = Utc::now();
    let report = execute(&script, &RunConfig::new(session).artifact_dir(artifact_dir));
    let summary = RunSummary::from_report(&report, started_at, Utc::now());

    if let Some(message) = &report.exit.message {
        eprintln!("{}", message);
    }
    if json {
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Warning: failed to serialize run summary: {}", e),
        }
    }
    report.exit.code
}

fn record_script(
    args: SessionArgs,
    control_recorder: Option<String>,
    output_file: PathBuf,
    settle_secs: Option<f64>,
) -> u8 {
    let Some(config) = load_config(Tool::Record) else {
        return EXIT_FAILURE;
    };
    let settle = match settle_secs {
        Some(secs) => settle_duration("--settle-secs", secs),
        None => settle_duration("config", config.settle_secs),
    };
    let settle = match settle {
        Ok(settle) => settle,
        Err(e) => {
            eprintln!("ERROR: {}", error_chain(&e));
            return EXIT_FAILURE;
        }
    };
    let record_config = RecordConfig {
        session: config.session_config(
            args.source_pipeline.as_deref(),
            args.sink_pipeline.as_deref(),
            args.control.as_deref(),
        ),
        control_recorder: control_recorder.unwrap_or_else(|| config.control_recorder.clone()),
        output_file,
        settle,
    };

    match record(&record_config) {
        Ok(script) => {
            println!(
                "Recorded {} steps to {}",
                script.steps.len(),
                script.path().display()
            );
            EXIT_SUCCESS
        }
        Err(e) => {
            eprintln!("ERROR: {}", error_chain(&e));
            match e {
                RecordError::Session(_) => EXIT_SESSION_INIT,
                _ => EXIT_FAILURE,
            }
        }
    }
}
