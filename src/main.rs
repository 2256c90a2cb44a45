use anyhow::{Context as _, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use saltfreeze::{
    build,
    cli::{Args, Command, ReportMode},
    context::write_default_config_stub,
    report, Config, ContextEnv,
};

fn main() -> Result<()> {
    let args = Args::parse();

    // stdout carries plan/render output, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut ctx = ContextEnv::new()?;

    if let Command::Init { force } = &args.command {
        let p = args
            .config
            .clone()
            .unwrap_or_else(|| ctx.default_config_path());
        write_default_config_stub(&p, *force)?;
        tracing::info!(path = %p.display(), "wrote config stub");
        return Ok(());
    }

    let cfg_path = ctx.locate_config(args.config.as_deref())?;
    let cfg = Config::load_from_path(&cfg_path)?;

    let plan = match &args.command {
        Command::Freeze { build: b } => build::prepare_freeze(&ctx, &cfg, &b.overrides())?,
        Command::Plan { build: b, .. } | Command::Render { build: b, .. } => {
            build::prepare(&ctx, &cfg, &b.overrides())?
        }
        Command::Init { .. } => return Ok(()),
    };

    if args.report != ReportMode::Off {
        eprint!("{}", report::build_report(&plan, args.report));
    }

    match &args.command {
        Command::Plan { out, .. } => {
            let json = serde_json::to_string_pretty(&plan.summary())?;
            match out {
                Some(p) => std::fs::write(p, format!("{json}\n"))
                    .with_context(|| format!("failed to write plan to {}", p.display()))?,
                None => println!("{json}"),
            }
        }
        Command::Render { name, .. } => {
            print!("{}", plan.render(name)?);
        }
        Command::Freeze { .. } => {
            build::freeze(&ctx, &cfg, &plan)?;
        }
        Command::Init { .. } => {}
    }

    Ok(())
}
