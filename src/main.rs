// src/main.rs

use dockwatch::{cli, load_config, logging, run};

#[tokio::main]
async fn main() {
    if let Err(err) = run_main().await {
        eprintln!("dockwatch error: {err:?}");
        std::process::exit(1);
    }
}

async fn run_main() -> anyhow::Result<()> {
    let args = cli::parse();
    let cfg = load_config(&args)?;
    let _log_flush = logging::init_logging(args.log_level, &cfg.logging)?;
    run(args, cfg).await
}
