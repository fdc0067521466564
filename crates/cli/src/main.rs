use anyhow::{Context, Result};
use arb_core::{
    ArbitrageConfig, ArbitrageEngine, EventHub, Exchange, InMemoryTradeSink, Market, MarketPair,
    MockExchangeClient, OutcomeToken, PositionMonitor, RiskManager, Side,
};
use chrono::Utc;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "arb", version, about = "Prediction-market arbitrage core")]
struct Cli {
    /// Path to a TOML config file; defaults are used for any key it omits.
    #[arg(long, global = true, default_value = "config/arb.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Runs the detection + execution loop against the configured exchanges.
    Run {
        /// Number of 250ms ticks to run before exiting; omit to run until
        /// the process is killed.
        #[arg(long)]
        ticks: Option<u64>,
    },
    /// Lists markets the configured exchange(s) currently expose, with
    /// cross-platform pairs flagged where applicable.
    Scan,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let app_config = arb_core::config_loader::ConfigLoader::load(
        cli.config
            .to_str()
            .context("config path is not valid UTF-8")?,
    )?;

    match cli.command {
        Command::Run { ticks } => run(app_config.arbitrage, ticks).await,
        Command::Scan => scan(app_config.arbitrage).await,
    }
}

/// Projects the matcher's venue-agnostic market shape into the full
/// `Market` the engine trades against. `UnifiedMarket` carries no volume
/// figure, so it defaults to zero here rather than being guessed at.
fn to_market(unified: &arb_core::UnifiedMarket) -> Market {
    Market {
        market_id: unified.market_id.clone(),
        exchange: unified.exchange,
        title: unified.title.clone(),
        close_time: unified.close_time,
        volume: Decimal::ZERO,
        yes_token: OutcomeToken { token_id: unified.yes_token_id.clone(), side: Side::Yes },
        no_token: OutcomeToken { token_id: unified.no_token_id.clone(), side: Side::No },
    }
}

async fn run(config: ArbitrageConfig, ticks: Option<u64>) -> Result<()> {
    let exchange = Arc::new(MockExchangeClient::new(Exchange::Kalshi, vec![], config.trading_fee_percent));
    exchange.set_balance("USD", config.fallback_balance).await;

    let risk = Arc::new(RiskManager::new(config.stop_loss, config.take_profit, config.max_daily_loss));
    let events = EventHub::default();
    let positions = Arc::new(PositionMonitor::new(risk.clone(), events.clone()));
    let sink = Arc::new(InMemoryTradeSink::new());

    let mut subscriber = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = subscriber.recv().await {
            tracing::info!(?event, "observed");
        }
    });

    let engine = Arc::new(ArbitrageEngine::new(
        config,
        risk,
        positions.clone(),
        events,
        exchange.clone(),
        sink,
    ));

    let markets: Vec<Market> = arb_core::ExchangeClient::list_markets(exchange.as_ref())
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .iter()
        .map(to_market)
        .collect();

    // Register each market's book and spawn its two per-token ingestion
    // tasks before the scheduler starts ticking, so the first tick already
    // has live book state to evaluate.
    for market in &markets {
        engine
            .reset_book(market, vec![], vec![], vec![], vec![], 0)
            .await?;

        for (token_id, want_yes) in [(&market.yes_token.token_id, true), (&market.no_token.token_id, false)] {
            match arb_core::ExchangeClient::subscribe_book(exchange.as_ref(), token_id).await {
                Ok(rx) => {
                    let engine = engine.clone();
                    let market_id = market.market_id.clone();
                    tokio::spawn(async move { engine.ingest_book(&market_id, want_yes, rx).await });
                }
                Err(err) => tracing::warn!(token_id, error = %err, "failed to subscribe to book feed"),
            }
        }
    }

    let market_by_id: HashMap<String, Market> =
        markets.iter().cloned().map(|m| (m.market_id.clone(), m)).collect();

    let mut tick_count = 0u64;
    let mut interval = tokio::time::interval(std::time::Duration::from_millis(250));
    loop {
        interval.tick().await;
        tick_count += 1;
        tracing::debug!(tick_count, "scheduler tick");

        for market in &markets {
            let quality_score = arb_core::scorer::score(arb_core::scorer::ScoringInput {
                volume: market.volume,
                top5_liquidity: Decimal::ZERO,
                spread: Decimal::ZERO,
                hours_to_resolution: (market.close_time - Utc::now()).num_minutes() as f64 / 60.0,
            });
            match engine.evaluate_and_execute(market, quality_score).await {
                Ok(outcome) => tracing::debug!(market_id = %market.market_id, ?outcome, "tick evaluated"),
                Err(err) => tracing::debug!(market_id = %market.market_id, error = %err, "tick evaluation aborted"),
            }
        }

        for market_id in positions.open_market_ids().await {
            let Some(market) = market_by_id.get(&market_id) else {
                continue;
            };
            let best_bid_yes = engine.best_bid(&market_id, Side::Yes).await.unwrap_or(Decimal::ZERO);
            let best_bid_no = engine.best_bid(&market_id, Side::No).await.unwrap_or(Decimal::ZERO);
            positions
                .tick(
                    &market_id,
                    best_bid_yes,
                    best_bid_no,
                    exchange.as_ref(),
                    &market.yes_token.token_id,
                    &market.no_token.token_id,
                    Utc::now(),
                )
                .await;
        }

        if let Some(max) = ticks {
            if tick_count >= max {
                break;
            }
        }
    }

    Ok(())
}

async fn scan(config: ArbitrageConfig) -> Result<()> {
    let exchange = MockExchangeClient::new(Exchange::Kalshi, vec![], config.trading_fee_percent);
    let markets = arb_core::ExchangeClient::list_markets(&exchange).await.map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let mut matcher = arb_core::matcher::MarketMatcher::new(arb_core::matcher::MatchConfig {
        min_similarity: config.min_match_similarity,
        max_settlement_skew_hours: 24,
    });
    let mut pairs: Vec<MarketPair> = Vec::new();
    for market in &markets {
        println!("{} [{}] {}", market.market_id, market.exchange, market.title);
        pairs.extend(matcher.register(market.clone()));
    }

    for pair in pairs {
        println!(
            "cross-venue pair: {} <-> {} (similarity {:.2})",
            pair.market_a.market_id, pair.market_b.market_id, pair.similarity
        );
    }

    Ok(())
}
