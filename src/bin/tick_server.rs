use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use gametick::clock::GameClock;
use gametick::config::SchedulerConfig;
use gametick::core::create_server_state;
use gametick::game_loop::GameLoop;
use gametick::timer::{GameTimer, OwnerId};

/// Owner id used for the server's own housekeeping timers
const SERVER_OWNER: OwnerId = OwnerId(0);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_ansi(std::io::IsTerminal::is_terminal(&std::io::stderr()))
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut conf_file = "conf/scheduler.yaml".to_string();
    let mut conf_given = false;

    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "--h" | "--?" | "/?" => {
                println!("Usage: tick_server [--conf FILE]");
                return Ok(());
            }
            "--conf" => {
                if i + 1 < args.len() {
                    i += 1;
                    conf_file = args[i].clone();
                    conf_given = true;
                } else {
                    eprintln!("Error: --conf requires a FILE argument");
                    return Ok(());
                }
            }
            _ => {}
        }
        i += 1;
    }

    let config = if conf_given || Path::new(&conf_file).exists() {
        SchedulerConfig::from_file(&conf_file)
            .with_context(|| format!("Cannot load config: {}", conf_file))?
    } else {
        tracing::info!("[tick] no {} found, using defaults", conf_file);
        SchedulerConfig::default()
    };

    let clock = Arc::new(GameClock::new());
    let mut game_loop = GameLoop::new(clock, config);
    let state = create_server_state();

    // Heartbeat: logs uptime every 10s, counting beats in its property bag.
    let heartbeat = GameTimer::with_callback(game_loop.handle(), SERVER_OWNER, |timer| {
        let beats = timer.properties().get_or::<u64>("beats", 0) + 1;
        timer.properties().set("beats", beats);
        tracing::info!(
            "[tick] [heartbeat] beat={} tick={}",
            beats,
            timer.start_tick()
        );
        Ok(10_000)
    });
    heartbeat.start_with(10_000);

    {
        let heartbeat = heartbeat.clone();
        let mut st = state
            .lock()
            .map_err(|_| anyhow::anyhow!("server state lock poisoned"))?;
        st.set_term_func(move || {
            tracing::info!("[tick] Shutting down...");
            heartbeat.stop();
        });
    }

    {
        let s = Arc::clone(&state);
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            if let Ok(mut st) = s.lock() {
                st.request_shutdown();
            }
        });
    }

    tracing::info!("[tick] [ready] Tick Server Started");
    let frames = game_loop.run(state).await;
    // one more pass drains the stops queued by the term func
    let stats = game_loop.step();
    tracing::info!(
        "[tick] [done] ran {} frames, {} timers left live",
        frames,
        stats.live
    );
    Ok(())
}
