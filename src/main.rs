// ██████╗ ██╗      █████╗ ████████╗███████╗ ██████╗ ██████╗ ███╗   ███╗
// ██╔══██╗██║     ██╔══██╗╚══██╔══╝██╔════╝██╔═══██╗██╔══██╗████╗ ████║
// ██████╔╝██║     ███████║   ██║   █████╗  ██║   ██║██████╔╝██╔████╔██║
// ██╔═══╝ ██║     ██╔══██║   ██║   ██╔══╝  ██║   ██║██╔══██╗██║╚██╔╝██║
// ██║     ███████╗██║  ██║   ██║   ██║     ╚██████╔╝██║  ██║██║ ╚═╝ ██║
// ╚═╝     ╚══════╝╚═╝  ╚═╝   ╚═╝   ╚═╝      ╚═════╝ ╚═╝  ╚═╝╚═╝     ╚═╝
//
// M O N I T O R
//
// Product Hunt, Launch HN and bank bonus listings in, one ranked digest out.
// Runs once and exits; schedule it with cron or a systemd timer.

mod config;
mod dedup;
mod extractors;
mod metrics;
mod models;
mod notifier;
mod pipeline;
mod scoring;
mod transport;

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;
use crate::pipeline::Pipeline;
use crate::transport::HttpTransport;

fn print_banner() {
    let banner = r#"
    ╔══════════════════════════════════════════════════════════╗
    ║   🚀 PLATFORM MONITOR                                     ║
    ║                                                          ║
    ║   Sources:  Product Hunt | Launch HN | Bank Bonuses      ║
    ║   Ranking:  Aho-Corasick keywords + amounts + votes      ║
    ║   Digest:   Telegram, or stdout when no bot is set up    ║
    ╚══════════════════════════════════════════════════════════╝
    "#;
    println!("{}", banner);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("PLATFORM_MONITOR_LOG_JSON").is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));

    if json {
        fmt().json().with_env_filter(filter).with_target(true).with_current_span(false).init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .init();
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    // `.env` first, so RUST_LOG and friends from it reach the subscriber.
    let _ = dotenvy::dotenv();
    init_tracing();
    print_banner();

    let config = Config::from_env().context("invalid configuration")?;
    info!(
        sources = ?config.sources.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
        digest_size = config.digest_size,
        min_bonus = config.min_bonus,
        telegram = config.telegram.credentials().is_some(),
        "✅ Configuration loaded"
    );
    info!("Categories: {}", config.scoring.category_keywords.join(", "));
    info!("Bonus words: {}", config.scoring.bonus_keywords.join(", "));

    let transport = HttpTransport::new(&config.transport).context("could not build HTTP transport")?;
    let pipeline = Pipeline::new(config, Arc::new(transport)).context("invalid configuration")?;

    let report = pipeline.run().await;

    if let Err(e) = &report.delivery {
        // Reported, not fatal: the digest was still produced.
        error!(error = %e, "❌ Digest was not delivered");
    }
    for failed in report.summary.failed_sources() {
        error!(source = %failed.source, "❌ Source contributed nothing this run");
    }

    info!(
        run_id = %report.summary.run_id,
        ranked = report.ranked.len(),
        "✅ Done"
    );
    Ok(())
}
