pub mod allocator;
pub mod cache;
pub mod config;
pub mod config_loader;
pub mod config_watcher;
pub mod cooldown;
pub mod engine;
pub mod errors;
pub mod events;
pub mod exchange;
pub mod execution_lock;
pub mod impact;
pub mod matcher;
pub mod orderbook;
pub mod position;
pub mod rate_limiter;
pub mod risk;
pub mod scorer;
pub mod types;

pub use config::{AppConfig, ArbitrageConfig, ServerConfig};
pub use engine::{ArbitrageEngine, EngineOutcome, SkipReason};
pub use errors::CoreError;
pub use events::{ArbitrageEvent, EventHub};
pub use exchange::{BookEvent, ExchangeClient, InMemoryTradeSink, MockExchangeClient, TradeSink};
pub use orderbook::{BookSide, OrderBook};
pub use position::{ExitOutcome, Position, PositionMonitor};
pub use risk::{ExitSignal, RiskManager, RiskState};
pub use types::{Exchange, Market, MarketPair, Opportunity, OrderResult, OutcomeToken, Side, Trade, UnifiedMarket, UnifiedOrderBook};
