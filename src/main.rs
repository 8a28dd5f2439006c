use clap::Parser;
use vision_runner::args::Args;
use vision_runner::automation::{AutomationConfig, AutomationRunner, VariableStore, describe_plan};
use vision_runner::browser::ChromeDriverLauncher;
use vision_runner::desktop::SystemDesktop;

const EXIT_FAILURE: i32 = 1;
const EXIT_CONFIG_ERROR: i32 = 2;
const EXIT_INTERRUPTED: i32 = 130;

fn main() {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(args.log_filter()))
        .format_target(false)
        .init();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build();
    let code = match runtime {
        Ok(runtime) => runtime.block_on(run(args)),
        Err(e) => {
            log::error!("❌ Failed to start async runtime: {}", e);
            EXIT_FAILURE
        }
    };
    std::process::exit(code);
}

async fn run(args: Args) -> i32 {
    let config = match AutomationConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ config validation failed: {e}");
            return EXIT_CONFIG_ERROR;
        }
    };

    if args.dry_run {
        print!("{}", describe_plan(&config));
        return 0;
    }

    let store = VariableStore::new(config.resolve_variables_path(&args.config, args.vars.as_deref()));
    let launcher = ChromeDriverLauncher::new(config.browser.clone());
    let mut runner =
        AutomationRunner::from_config(config, SystemDesktop::new(), launcher, store, args.headless)
            .await;

    let outcome = tokio::select! {
        state = runner.run() => Some(state),
        _ = tokio::signal::ctrl_c() => None,
    };
    runner.shutdown().await;

    match outcome {
        Some(state) => {
            log::info!("🏁 Finished with {:?} after {} round(s)", state, runner.round().attempts);
            state.exit_code()
        }
        None => {
            log::warn!("🛑 Interrupted after {} round(s)", runner.round().attempts);
            EXIT_INTERRUPTED
        }
    }
}
